//! Launchkit CLI
//!
//! Composes and broadcasts candy-machine transactions: create a machine,
//! mint from one, rewrite its sale parameters or drain its funds. All flows
//! run through the same retry engine; a single Ctrl-C requests cooperative
//! cancellation, a second one aborts.

#![deny(unused_imports)]
#![deny(unused_mut)]
#![warn(unused_must_use)]

use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use solana_sdk::pubkey::Pubkey;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use launchkit::config::Config;
use launchkit::engine::Engine;
use launchkit::ledger::RpcLedger;
use launchkit::types::{
    CreateFlow, FlowRequest, MintFlow, ModuleInit, SaleParams, SaleUpdate, UpdateFlow,
    WithdrawFlow,
};
use launchkit::wallet::WalletManager;

/// Command line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a new machine from a sale parameters file
    Create {
        /// Path to a TOML file holding the sale parameters
        #[arg(long, default_value = "launch.toml")]
        params: String,

        /// Activate the payment module with this payment mint
        #[arg(long)]
        payment_mint: Option<String>,

        /// Activate the inline-receipt module
        #[arg(long)]
        inline_receipt: bool,

        /// Activate the lockup module, releasing at this unix time
        #[arg(long)]
        lockup_release: Option<i64>,

        /// Activate the permissioned module
        #[arg(long)]
        permissioned: bool,

        /// Activate the creator-standard module with this creator
        #[arg(long, requires = "ccs_ruleset")]
        ccs_creator: Option<String>,

        /// Ruleset address for the creator-standard module
        #[arg(long, requires = "ccs_creator")]
        ccs_ruleset: Option<String>,
    },

    /// Mint one or more items from an existing machine
    Mint {
        /// Machine address
        #[arg(long)]
        machine: String,

        /// Number of items to mint
        #[arg(long, default_value = "1")]
        count: usize,

        /// Compute unit limit for each mint transaction (0 = omit)
        #[arg(long, default_value = "400000")]
        cu_limit: u32,

        /// Priority fee in micro-lamports (0 = omit)
        #[arg(long, default_value = "0")]
        priority_fee: u64,
    },

    /// Rewrite an existing machine's sale parameters
    Update {
        /// Machine address
        #[arg(long)]
        machine: String,

        /// New price in lamports
        #[arg(long)]
        price: Option<u64>,

        /// New maximum supply
        #[arg(long)]
        max_supply: Option<u64>,

        /// New go-live date, RFC 3339 (e.g. 2026-09-01T12:00:00Z)
        #[arg(long)]
        go_live: Option<String>,

        /// New mutability flag
        #[arg(long)]
        mutable: Option<bool>,
    },

    /// Drain machine funds to the authority
    Withdraw {
        /// Machine addresses, drained concurrently
        #[arg(long, required = true, num_args = 1..)]
        machine: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    info!("Starting launchkit v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_file_with_env(&args.config)
        .with_context(|| format!("Failed to load configuration from {}", args.config))?;
    let programs = config.programs.resolve()?;

    let wallet = WalletManager::from_file(&config.wallet.keypair_path)
        .context("Failed to load wallet keypair")?;
    info!(wallet = %wallet.pubkey(), rpc = %config.rpc.endpoint, "Loaded identity");

    let ledger = Arc::new(RpcLedger::new(
        config.rpc.endpoint.clone(),
        config.rpc.commitment_config()?,
        config.rpc.timeout(),
    ));
    let engine = Engine::new(ledger, programs, config.retry.clone());

    // First Ctrl-C cancels cooperatively; a second aborts the process.
    let cancel = engine.cancel_flag();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Cancellation requested, finishing in-flight submissions");
            cancel.cancel();
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Second interrupt, aborting");
                std::process::exit(130);
            }
        }
    });

    let requests = build_requests(&args.command, &config, &wallet)?;
    let outcomes = engine.execute_all(requests).await;

    let mut failed = 0usize;
    for outcome in &outcomes {
        match outcome {
            Ok(receipt) => info!(
                target_address = %receipt.target,
                signature = %receipt.signature,
                attempts = receipt.attempts,
                "Confirmed"
            ),
            Err(failure) => {
                failed += 1;
                warn!(
                    target_address = %failure.target,
                    error = %failure.error,
                    attempts = failure.attempts,
                    disposition = ?failure.disposition,
                    "Failed"
                );
            }
        }
    }

    if failed > 0 {
        anyhow::bail!("{failed} of {} flows failed", outcomes.len());
    }
    Ok(())
}

/// Translate the parsed CLI command into engine requests
fn build_requests(
    command: &Command,
    config: &Config,
    wallet: &WalletManager,
) -> Result<Vec<FlowRequest>> {
    match command {
        Command::Create {
            params,
            payment_mint,
            inline_receipt,
            lockup_release,
            permissioned,
            ccs_creator,
            ccs_ruleset,
        } => {
            let raw = std::fs::read_to_string(params)
                .with_context(|| format!("Failed to read sale parameters from {params}"))?;
            let sale: SaleParams =
                toml::from_str(&raw).context("Failed to parse sale parameters")?;

            let mut modules = Vec::new();
            if let Some(mint) = payment_mint {
                modules.push(ModuleInit::Payment {
                    payment_mint: parse_pubkey(mint, "payment mint")?,
                });
            }
            if *inline_receipt {
                modules.push(ModuleInit::InlineReceipt);
            }
            if let Some(release) = lockup_release {
                modules.push(ModuleInit::Lockup {
                    release_unix_time: *release,
                });
            }
            if *permissioned {
                modules.push(ModuleInit::Permissioned);
            }
            if let (Some(creator), Some(ruleset)) = (ccs_creator, ccs_ruleset) {
                modules.push(ModuleInit::CreatorStandard {
                    creator: parse_pubkey(creator, "creator-standard creator")?,
                    ruleset: parse_pubkey(ruleset, "creator-standard ruleset")?,
                });
            }

            Ok(vec![FlowRequest::Create(CreateFlow {
                authority: wallet.signing_party(),
                params: sale,
                modules,
            })])
        }

        Command::Mint {
            machine,
            count,
            cu_limit,
            priority_fee,
        } => {
            let machine = parse_pubkey(machine, "machine")?;
            let payer = match &config.wallet.payer_keypair_path {
                Some(path) => Some(
                    WalletManager::from_file(path)
                        .context("Failed to load payer keypair")?
                        .signing_party(),
                ),
                None => None,
            };
            let flow = MintFlow {
                machine,
                recipient: wallet.signing_party(),
                payer,
                compute_unit_limit: *cu_limit,
                priority_fee: *priority_fee,
            };
            Ok((0..*count).map(|_| FlowRequest::Mint(flow.clone())).collect())
        }

        Command::Update {
            machine,
            price,
            max_supply,
            go_live,
            mutable,
        } => {
            let go_live_date = match go_live {
                Some(raw) => Some(
                    chrono::DateTime::parse_from_rfc3339(raw)
                        .with_context(|| format!("Invalid go-live date: {raw}"))?
                        .timestamp(),
                ),
                None => None,
            };
            Ok(vec![FlowRequest::Update(UpdateFlow {
                machine: parse_pubkey(machine, "machine")?,
                authority: wallet.signing_party(),
                update: SaleUpdate {
                    price: *price,
                    max_supply: *max_supply,
                    go_live_date,
                    end_settings: None,
                    is_mutable: *mutable,
                },
            })])
        }

        Command::Withdraw { machine } => machine
            .iter()
            .map(|address| {
                Ok(FlowRequest::Withdraw(WithdrawFlow {
                    machine: parse_pubkey(address, "machine")?,
                    authority: wallet.signing_party(),
                }))
            })
            .collect(),
    }
}

fn parse_pubkey(raw: &str, what: &str) -> Result<Pubkey> {
    Pubkey::from_str(raw).with_context(|| format!("Invalid {what} address: {raw}"))
}

fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "launchkit=debug,info"
    } else {
        "launchkit=info,warn,error"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}
