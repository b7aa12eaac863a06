//! Ledger client interface and RPC adapter
//!
//! The engine talks to the ledger only through [`LedgerClient`]. The
//! production adapter wraps a non-blocking Solana RPC client behind an
//! `ArcSwap` so it can be reconnected in place after a node-lagging
//! classification without disturbing concurrent operations.

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine as _;
use serde_json::json;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_request::RpcRequest;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::hash::Hash;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use tracing::{debug, warn};

pub mod errors;
pub use errors::LedgerError;

/// A freshly observed ledger checkpoint. Valid for attaching to a transaction
/// only until `last_valid_block_height` passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreshBlockhash {
    pub hash: Hash,
    pub last_valid_block_height: u64,
}

/// Outcome of waiting for a submitted transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmOutcome {
    Confirmed,
    /// The recency window closed without the transaction landing
    Expired,
    /// The ledger executed and rejected the transaction
    Rejected(LedgerError),
}

/// Everything the engine needs from the ledger.
///
/// Implementations must be safe for concurrent use: independent flows share a
/// single handle.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Fetch the current recency token and its expiry height
    async fn recency_token(&self) -> Result<FreshBlockhash, LedgerError>;

    /// Minimum lamport balance for an account of `size` bytes to be
    /// rent-exempt
    async fn min_rent_exempt(&self, size: usize) -> Result<u64, LedgerError>;

    /// Raw account data, or `None` if the account does not exist
    async fn account(&self, address: &Pubkey) -> Result<Option<Vec<u8>>, LedgerError>;

    /// Fire-and-forget send of a fully signed transaction in the ledger's
    /// native wire encoding
    async fn submit_raw(&self, tx_bytes: &[u8]) -> Result<Signature, LedgerError>;

    /// Wait for `signature` to confirm, bounded by `expiry_height`
    async fn confirm(
        &self,
        signature: &Signature,
        expiry_height: u64,
    ) -> Result<ConfirmOutcome, LedgerError>;

    /// Replace the underlying connection in place. Default is a no-op for
    /// implementations without a transport to cycle.
    fn reconnect(&self) {}
}

/// Production adapter over the Solana JSON-RPC API
pub struct RpcLedger {
    client: ArcSwap<RpcClient>,
    url: String,
    commitment: CommitmentConfig,
    timeout: Duration,
    confirm_poll_interval: Duration,
}

impl RpcLedger {
    pub fn new(url: impl Into<String>, commitment: CommitmentConfig, timeout: Duration) -> Self {
        let url = url.into();
        let client = RpcClient::new_with_timeout_and_commitment(url.clone(), timeout, commitment);
        Self {
            client: ArcSwap::from_pointee(client),
            url,
            commitment,
            timeout,
            confirm_poll_interval: Duration::from_millis(400),
        }
    }

    fn client(&self) -> Arc<RpcClient> {
        self.client.load_full()
    }

    /// Classify a raw client error, cycling the connection first when the
    /// classification says the node is no longer trustworthy
    fn classify(&self, err: solana_client::client_error::ClientError) -> LedgerError {
        let classified = LedgerError::from_client_error(err);
        if classified.should_reconnect() {
            self.reconnect();
        }
        classified
    }
}

#[async_trait]
impl LedgerClient for RpcLedger {
    async fn recency_token(&self) -> Result<FreshBlockhash, LedgerError> {
        let (hash, last_valid_block_height) = self
            .client()
            .get_latest_blockhash_with_commitment(self.commitment)
            .await
            .map_err(|e| self.classify(e))?;
        debug!(blockhash = %hash, expiry = last_valid_block_height, "Fetched recency token");
        Ok(FreshBlockhash {
            hash,
            last_valid_block_height,
        })
    }

    async fn min_rent_exempt(&self, size: usize) -> Result<u64, LedgerError> {
        self.client()
            .get_minimum_balance_for_rent_exemption(size)
            .await
            .map_err(|e| self.classify(e))
    }

    async fn account(&self, address: &Pubkey) -> Result<Option<Vec<u8>>, LedgerError> {
        let response = self
            .client()
            .get_account_with_commitment(address, self.commitment)
            .await
            .map_err(|e| self.classify(e))?;
        Ok(response.value.map(|account| account.data))
    }

    async fn submit_raw(&self, tx_bytes: &[u8]) -> Result<Signature, LedgerError> {
        let encoded = BASE64_STANDARD.encode(tx_bytes);
        let params = json!([
            encoded,
            {
                "encoding": "base64",
                "skipPreflight": false,
                "preflightCommitment": self.commitment.commitment,
            }
        ]);
        let signature: String = self
            .client()
            .send(RpcRequest::SendTransaction, params)
            .await
            .map_err(|e| self.classify(e))?;
        signature
            .parse()
            .map_err(|e| LedgerError::Rpc(format!("unparseable signature in response: {e}")))
    }

    async fn confirm(
        &self,
        signature: &Signature,
        expiry_height: u64,
    ) -> Result<ConfirmOutcome, LedgerError> {
        loop {
            let status = self
                .client()
                .get_signature_status_with_commitment(signature, self.commitment)
                .await
                .map_err(|e| self.classify(e))?;

            match status {
                Some(Ok(())) => return Ok(ConfirmOutcome::Confirmed),
                Some(Err(tx_err)) => {
                    return Ok(ConfirmOutcome::Rejected(LedgerError::from_transaction_error(
                        &tx_err,
                    )))
                }
                None => {
                    let height = self
                        .client()
                        .get_block_height_with_commitment(self.commitment)
                        .await
                        .map_err(|e| self.classify(e))?;
                    if height > expiry_height {
                        return Ok(ConfirmOutcome::Expired);
                    }
                }
            }

            tokio::time::sleep(self.confirm_poll_interval).await;
        }
    }

    fn reconnect(&self) {
        warn!(url = %self.url, "Replacing RPC connection in place");
        crate::metrics::metrics().reconnects.inc();
        let fresh = RpcClient::new_with_timeout_and_commitment(
            self.url.clone(),
            self.timeout,
            self.commitment,
        );
        self.client.store(Arc::new(fresh));
    }
}
