//! Configuration for the launch toolkit
//!
//! Everything is carried in one structure constructed per invocation; no
//! process-wide mutable state backs the engine. Loaded from a TOML file with
//! environment overrides via dotenv.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::pubkey::Pubkey;

use crate::errors::EngineError;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// RPC endpoint configuration
    pub rpc: RpcConfig,

    /// Wallet configuration
    pub wallet: WalletConfig,

    /// Retry policy for the broadcast engine
    #[serde(default)]
    pub retry: RetryConfig,

    /// On-chain program addresses
    #[serde(default)]
    pub programs: ProgramConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcConfig {
    /// RPC endpoint URL
    pub endpoint: String,

    /// Request timeout in seconds
    #[serde(default = "default_rpc_timeout")]
    pub timeout_secs: u64,

    /// Commitment level ("processed", "confirmed", "finalized")
    #[serde(default = "default_commitment")]
    pub commitment: String,
}

impl RpcConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn commitment_config(&self) -> Result<CommitmentConfig, EngineError> {
        CommitmentConfig::from_str(&self.commitment).map_err(|_| {
            EngineError::MalformedRequest(format!("unknown commitment '{}'", self.commitment))
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletConfig {
    /// Path to the authority keypair file
    pub keypair_path: String,

    /// Optional separate fee-payer keypair file (mint flow)
    #[serde(default)]
    pub payer_keypair_path: Option<String>,
}

/// Retry behavior of the broadcast engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum full cycles before surfacing the last retryable failure.
    /// 0 means retry indefinitely.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base backoff delay in milliseconds
    #[serde(default = "default_base_delay")]
    pub base_delay_ms: u64,

    /// Backoff ceiling in milliseconds
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,

    /// Exponential multiplier between attempts
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    /// Jitter factor (0.0 - 1.0)
    #[serde(default = "default_jitter")]
    pub jitter_factor: f64,
}

impl RetryConfig {
    /// Delay before retry cycle `attempt` (1-based: the delay taken after
    /// attempt N failed). Exponential with jitter, clamped to the ceiling.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exp = self.multiplier.powi(attempt.saturating_sub(1) as i32);
        let raw = (self.base_delay_ms as f64 * exp).min(self.max_delay_ms as f64);
        let jitter = (fastrand::f64() - 0.5) * 2.0 * self.jitter_factor;
        let with_jitter = (raw * (1.0 + jitter)).max(0.0) as u64;
        Duration::from_millis(with_jitter)
    }

    /// Whether another cycle is allowed after `attempt` cycles have run
    pub fn allows_another(&self, attempt: u32) -> bool {
        self.max_attempts == 0 || attempt < self.max_attempts
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay(),
            max_delay_ms: default_max_delay(),
            multiplier: default_multiplier(),
            jitter_factor: default_jitter(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgramConfig {
    /// Launch (candy machine) program address
    #[serde(default = "default_launch_program")]
    pub launch_program: String,

    /// Token metadata program address
    #[serde(default = "default_token_metadata_program")]
    pub token_metadata_program: String,
}

impl Default for ProgramConfig {
    fn default() -> Self {
        Self {
            launch_program: default_launch_program(),
            token_metadata_program: default_token_metadata_program(),
        }
    }
}

impl ProgramConfig {
    pub fn resolve(&self) -> Result<ProgramSet, EngineError> {
        Ok(ProgramSet {
            launch_program: parse_address("launch_program", &self.launch_program)?,
            token_metadata_program: parse_address(
                "token_metadata_program",
                &self.token_metadata_program,
            )?,
        })
    }
}

/// Parsed program addresses used by the composer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgramSet {
    pub launch_program: Pubkey,
    pub token_metadata_program: Pubkey,
}

fn parse_address(what: &str, value: &str) -> Result<Pubkey, EngineError> {
    value
        .parse()
        .map_err(|_| EngineError::MalformedRequest(format!("invalid {what} address '{value}'")))
}

// Default value functions
fn default_rpc_timeout() -> u64 {
    30
}
fn default_commitment() -> String {
    "confirmed".to_string()
}
fn default_max_attempts() -> u32 {
    8
}
fn default_base_delay() -> u64 {
    200
}
fn default_max_delay() -> u64 {
    10_000
}
fn default_multiplier() -> f64 {
    2.0
}
fn default_jitter() -> f64 {
    0.1
}
fn default_launch_program() -> String {
    "cndy3Z4yapfJBmL3ShUp5exZKqR3z33thTzeNMm2gRZ".to_string()
}
fn default_token_metadata_program() -> String {
    "metaqbxxUerdq28cj1RbAWkYQm3ybzjb6a8bt518x1s".to_string()
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration with environment variable overrides
    pub fn from_file_with_env(path: &str) -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        let mut config = Self::from_file(path)?;
        if let Ok(endpoint) = std::env::var("LAUNCHKIT_RPC_URL") {
            config.rpc.endpoint = endpoint;
        }
        if let Ok(keypair_path) = std::env::var("LAUNCHKIT_KEYPAIR") {
            config.wallet.keypair_path = keypair_path;
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_defaults_are_bounded() {
        let retry = RetryConfig::default();
        assert_eq!(retry.max_attempts, 8);
        assert!(retry.allows_another(1));
        assert!(retry.allows_another(7));
        assert!(!retry.allows_another(8));
    }

    #[test]
    fn zero_ceiling_means_unbounded() {
        let retry = RetryConfig {
            max_attempts: 0,
            ..RetryConfig::default()
        };
        assert!(retry.allows_another(u32::MAX - 1));
    }

    #[test]
    fn backoff_grows_and_clamps() {
        let retry = RetryConfig {
            jitter_factor: 0.0,
            ..RetryConfig::default()
        };
        let d1 = retry.delay_after(1);
        let d3 = retry.delay_after(3);
        assert!(d3 >= d1);
        assert!(retry.delay_after(30) <= Duration::from_millis(retry.max_delay_ms));
    }

    #[test]
    fn default_programs_resolve() {
        let programs = ProgramConfig::default().resolve().unwrap();
        assert_ne!(programs.launch_program, programs.token_metadata_program);
    }

    #[test]
    fn minimal_toml_parses_with_defaults() {
        let toml = r#"
            [rpc]
            endpoint = "https://api.devnet.solana.com"

            [wallet]
            keypair_path = "/tmp/id.json"
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.rpc.timeout_secs, 30);
        assert_eq!(config.retry.max_attempts, 8);
        assert!(config.programs.resolve().is_ok());
    }
}
