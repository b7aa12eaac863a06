//! Typed ledger error taxonomy
//!
//! All classification of raw RPC failures happens here, at the adapter
//! boundary. Call sites never match on error message strings.

use solana_client::client_error::{ClientError, ClientErrorKind};
use solana_rpc_client_api::custom_error;
use solana_rpc_client_api::request::RpcError;
use solana_sdk::instruction::InstructionError;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::transaction::TransactionError;
use thiserror::Error;

/// Failure observed while talking to the ledger
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LedgerError {
    /// The recency token attached to the transaction is no longer accepted
    #[error("Blockhash not found")]
    BlockhashNotFound,

    /// The observing node reports lagging state; the client should be
    /// reconnected in place before the next cycle
    #[error("Node is behind")]
    NodeBehind,

    /// The confirmation window closed (block height exceeded)
    #[error("Recency window expired")]
    RecencyExpired,

    /// Transport-level failure (connection, DNS, TLS)
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Rate limit exceeded")]
    RateLimited,

    /// The receiving program returned a defined error code
    #[error("Program error code {code}")]
    Program { code: u32 },

    #[error("Insufficient funds")]
    InsufficientFunds,

    #[error("Account not found: {0}")]
    AccountNotFound(Pubkey),

    /// Request the ledger could never accept (encoding, size, signature set)
    #[error("Malformed request: {0}")]
    Malformed(String),

    /// Any other RPC response error
    #[error("RPC error: {0}")]
    Rpc(String),
}

impl LedgerError {
    /// Whether a fresh cycle against the same (or a reconnected) node may
    /// succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::BlockhashNotFound
            | Self::NodeBehind
            | Self::RecencyExpired
            | Self::Transport(_)
            | Self::Timeout { .. }
            | Self::RateLimited
            | Self::Rpc(_) => true,
            Self::Program { .. }
            | Self::InsufficientFunds
            | Self::AccountNotFound(_)
            | Self::Malformed(_) => false,
        }
    }

    /// Whether the adapter should swap in a fresh RPC connection before the
    /// next cycle
    pub fn should_reconnect(&self) -> bool {
        matches!(self, Self::NodeBehind | Self::Transport(_))
    }

    /// Classify a raw client error. The only place in the crate that inspects
    /// error message text.
    pub fn from_client_error(err: ClientError) -> Self {
        // Structured transaction errors first: these carry the program's
        // error code without string matching.
        if let Some(tx_err) = err.get_transaction_error() {
            return Self::from_transaction_error(&tx_err);
        }

        // Node-health failures arrive with well-known response codes
        if let ClientErrorKind::RpcError(RpcError::RpcResponseError { code, .. }) = err.kind() {
            if matches!(
                *code,
                custom_error::JSON_RPC_SERVER_ERROR_NODE_UNHEALTHY
                    | custom_error::JSON_RPC_SERVER_ERROR_SLOT_SKIPPED
                    | custom_error::JSON_RPC_SERVER_ERROR_MIN_CONTEXT_SLOT_NOT_REACHED
            ) {
                return Self::NodeBehind;
            }
        }

        let msg = err.to_string();
        let lower = msg.to_lowercase();

        if lower.contains("blockhash not found") {
            Self::BlockhashNotFound
        } else if lower.contains("node is behind") || lower.contains("slot was skipped") {
            Self::NodeBehind
        } else if lower.contains("block height exceeded") || lower.contains("transaction expired") {
            Self::RecencyExpired
        } else if lower.contains("insufficient funds") || lower.contains("insufficient lamports") {
            Self::InsufficientFunds
        } else if lower.contains("rate limit")
            || lower.contains("too many requests")
            || lower.contains("429")
        {
            Self::RateLimited
        } else if lower.contains("timed out") || lower.contains("timeout") {
            Self::Timeout { timeout_ms: 0 }
        } else if lower.contains("connection")
            || lower.contains("dns")
            || lower.contains("transport")
        {
            Self::Transport(msg)
        } else if let Some(code) = parse_custom_error_code(&lower) {
            Self::Program { code }
        } else {
            Self::Rpc(msg)
        }
    }

    /// Classify a structured transaction error returned by submission or
    /// confirmation
    pub fn from_transaction_error(err: &TransactionError) -> Self {
        match err {
            TransactionError::BlockhashNotFound => Self::BlockhashNotFound,
            TransactionError::InstructionError(_, InstructionError::Custom(code)) => {
                Self::Program { code: *code }
            }
            TransactionError::InsufficientFundsForFee
            | TransactionError::InsufficientFundsForRent { .. } => Self::InsufficientFunds,
            TransactionError::SignatureFailure | TransactionError::SanitizeFailure => {
                Self::Malformed(err.to_string())
            }
            other => Self::Rpc(other.to_string()),
        }
    }
}

/// Extract the hex code from a "custom program error: 0x.." message
fn parse_custom_error_code(lower: &str) -> Option<u32> {
    let tail = lower.split("custom program error: 0x").nth(1)?;
    let hex: String = tail.chars().take_while(|c| c.is_ascii_hexdigit()).collect();
    u32::from_str_radix(&hex, 16).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn custom_error_code_parsing() {
        assert_eq!(
            parse_custom_error_code("failed: custom program error: 0x1"),
            Some(1)
        );
        assert_eq!(
            parse_custom_error_code("custom program error: 0x1772 at ix 1"),
            Some(0x1772)
        );
        assert_eq!(parse_custom_error_code("some other error"), None);
    }

    #[test]
    fn transaction_error_classification() {
        assert_eq!(
            LedgerError::from_transaction_error(&TransactionError::BlockhashNotFound),
            LedgerError::BlockhashNotFound
        );
        assert_eq!(
            LedgerError::from_transaction_error(&TransactionError::InstructionError(
                0,
                InstructionError::Custom(6004)
            )),
            LedgerError::Program { code: 6004 }
        );
        assert_eq!(
            LedgerError::from_transaction_error(&TransactionError::InsufficientFundsForFee),
            LedgerError::InsufficientFunds
        );
    }

    #[test]
    fn reconnect_policy() {
        assert!(LedgerError::NodeBehind.should_reconnect());
        assert!(LedgerError::Transport("reset".into()).should_reconnect());
        assert!(!LedgerError::BlockhashNotFound.should_reconnect());
        assert!(!LedgerError::Program { code: 6000 }.should_reconnect());
    }
}
