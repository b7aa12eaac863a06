//! Scripted ledger double shared by the suite.
//!
//! Accounts live in a plain map. Submit and confirm outcomes are scripted
//! queues popped in order; an exhausted script means success, so tests only
//! spell out the failures they care about.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use async_trait::async_trait;
use borsh::BorshSerialize;
use parking_lot::Mutex;
use solana_sdk::hash::Hash;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;

use crate::compose::ixdata::{MachineState, SaleData};
use crate::ledger::{ConfirmOutcome, FreshBlockhash, LedgerClient, LedgerError};
use crate::types::SaleParams;

const RENT_PER_BYTE: u64 = 6_960;

#[derive(Default)]
pub struct MockLedger {
    accounts: Mutex<HashMap<Pubkey, Vec<u8>>>,
    submit_script: Mutex<Vec<Result<(), LedgerError>>>,
    confirm_script: Mutex<Vec<ConfirmOutcome>>,
    /// Every submitted wire payload, in order
    pub submissions: Mutex<Vec<Vec<u8>>>,
    pub recency_fetches: AtomicU32,
    recency_seq: AtomicU64,
}

impl MockLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_account(&self, address: Pubkey, data: Vec<u8>) {
        self.accounts.lock().insert(address, data);
    }

    pub fn remove_account(&self, address: &Pubkey) {
        self.accounts.lock().remove(address);
    }

    /// Queue a submit outcome; the next unscripted submit succeeds
    pub fn script_submit(&self, outcome: Result<(), LedgerError>) {
        self.submit_script.lock().push(outcome);
    }

    /// Queue a confirm outcome; the next unscripted confirm reports Confirmed
    pub fn script_confirm(&self, outcome: ConfirmOutcome) {
        self.confirm_script.lock().push(outcome);
    }

    pub fn submit_count(&self) -> usize {
        self.submissions.lock().len()
    }
}

#[async_trait]
impl LedgerClient for MockLedger {
    async fn recency_token(&self) -> Result<FreshBlockhash, LedgerError> {
        self.recency_fetches.fetch_add(1, Ordering::SeqCst);
        let seq = self.recency_seq.fetch_add(1, Ordering::SeqCst);
        Ok(FreshBlockhash {
            hash: Hash::new_unique(),
            last_valid_block_height: 1_000 + seq,
        })
    }

    async fn min_rent_exempt(&self, size: usize) -> Result<u64, LedgerError> {
        Ok(size as u64 * RENT_PER_BYTE)
    }

    async fn account(&self, address: &Pubkey) -> Result<Option<Vec<u8>>, LedgerError> {
        Ok(self.accounts.lock().get(address).cloned())
    }

    async fn submit_raw(&self, tx_bytes: &[u8]) -> Result<Signature, LedgerError> {
        let script = {
            let mut queue = self.submit_script.lock();
            if queue.is_empty() {
                Ok(())
            } else {
                queue.remove(0)
            }
        };
        match script {
            Ok(()) => {
                self.submissions.lock().push(tx_bytes.to_vec());
                Ok(Signature::new_unique())
            }
            Err(err) => Err(err),
        }
    }

    async fn confirm(
        &self,
        _signature: &Signature,
        _expiry_height: u64,
    ) -> Result<ConfirmOutcome, LedgerError> {
        let mut queue = self.confirm_script.lock();
        if queue.is_empty() {
            Ok(ConfirmOutcome::Confirmed)
        } else {
            Ok(queue.remove(0))
        }
    }
}

/// Borsh-encode an account image behind a placeholder 8-byte discriminator
pub fn account_image<T: BorshSerialize>(state: &T) -> Vec<u8> {
    let mut data = vec![0u8; 8];
    state.serialize(&mut data).expect("borsh encoding");
    data
}

/// Sale parameters fixture for creation flows
pub fn sale_params(items_available: u64) -> SaleParams {
    SaleParams {
        price: 1_000_000,
        symbol: "TEST".to_string(),
        seller_fee_basis_points: 500,
        max_supply: items_available,
        items_available,
        is_mutable: true,
        retain_authority: true,
        go_live_date: None,
        creators: Vec::new(),
        end_settings: None,
        hidden_settings: None,
        whitelist_settings: None,
        gatekeeper: None,
    }
}

/// A machine state fixture with sensible sale parameters
pub fn machine_fixture(authority: Pubkey, wallet: Pubkey) -> MachineState {
    MachineState {
        authority,
        wallet,
        token_mint: None,
        items_redeemed: 0,
        data: SaleData {
            uuid: "abc123".to_string(),
            price: 1_000_000,
            symbol: "TEST".to_string(),
            seller_fee_basis_points: 500,
            max_supply: 10,
            is_mutable: true,
            retain_authority: true,
            go_live_date: Some(1_700_000_000),
            end_settings: None,
            creators: Vec::new(),
            hidden_settings: None,
            whitelist_mint_settings: None,
            items_available: 10,
            gatekeeper: None,
        },
    }
}
