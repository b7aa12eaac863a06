//! Engine behavior over the scripted mock ledger

use std::sync::atomic::Ordering;
use std::sync::Arc;

use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Keypair;
use solana_sdk::transaction::Transaction;

use crate::config::{ProgramSet, RetryConfig};
use crate::engine::Engine;
use crate::errors::{Disposition, EngineError};
use crate::ledger::{ConfirmOutcome, LedgerError};
use crate::tests::mock_ledger::{account_image, machine_fixture, sale_params, MockLedger};
use crate::types::{CreateFlow, FlowRequest, MintFlow, SigningParty, WithdrawFlow};

fn fast_retry(max_attempts: u32) -> RetryConfig {
    RetryConfig {
        max_attempts,
        base_delay_ms: 1,
        max_delay_ms: 2,
        multiplier: 2.0,
        jitter_factor: 0.0,
    }
}

fn programs() -> ProgramSet {
    ProgramSet {
        launch_program: Pubkey::new_unique(),
        token_metadata_program: Pubkey::new_unique(),
    }
}

fn party() -> SigningParty {
    Arc::new(Keypair::new())
}

fn withdraw_request() -> FlowRequest {
    FlowRequest::Withdraw(WithdrawFlow {
        machine: Pubkey::new_unique(),
        authority: party(),
    })
}

#[tokio::test]
async fn stale_submit_retries_with_fresh_recency_token() {
    let ledger = Arc::new(MockLedger::new());
    ledger.script_submit(Err(LedgerError::BlockhashNotFound));
    let engine = Engine::new(ledger.clone(), programs(), fast_retry(8));

    let receipt = engine
        .execute(withdraw_request())
        .await
        .expect("second cycle confirms");

    assert_eq!(receipt.attempts, 2);
    // Each cycle fetched its own recency token; nothing was reused.
    assert_eq!(ledger.recency_fetches.load(Ordering::SeqCst), 2);
    assert_eq!(ledger.submit_count(), 1);
}

#[tokio::test]
async fn expired_window_regenerates_the_creation_identity() {
    let ledger = Arc::new(MockLedger::new());
    ledger.script_confirm(ConfirmOutcome::Expired);
    let engine = Engine::new(ledger.clone(), programs(), fast_retry(8));

    let receipt = engine
        .execute(FlowRequest::Create(CreateFlow {
            authority: party(),
            params: sale_params(10),
            modules: Vec::new(),
        }))
        .await
        .expect("second cycle confirms");

    assert_eq!(receipt.attempts, 2);
    let submissions = ledger.submissions.lock().clone();
    assert_eq!(submissions.len(), 2);

    let first: Transaction = bincode::deserialize(&submissions[0]).expect("wire decodes");
    let second: Transaction = bincode::deserialize(&submissions[1]).expect("wire decodes");

    // Fresh recency token and a fresh machine keypair per cycle
    assert_ne!(
        first.message.recent_blockhash,
        second.message.recent_blockhash
    );
    assert_ne!(first.message.account_keys, second.message.account_keys);
    assert!(second.message.account_keys.contains(&receipt.target));
    assert!(!first.message.account_keys.contains(&receipt.target));
}

#[tokio::test]
async fn program_rejection_is_fatal_on_the_first_attempt() {
    let ledger = Arc::new(MockLedger::new());
    ledger.script_confirm(ConfirmOutcome::Rejected(LedgerError::Program { code: 6005 }));
    let engine = Engine::new(ledger.clone(), programs(), fast_retry(8));

    let failure = engine
        .execute(withdraw_request())
        .await
        .expect_err("rejection is terminal");

    assert_eq!(failure.attempts, 1);
    assert_eq!(failure.disposition, Disposition::Rejected);
    assert!(matches!(
        failure.error,
        EngineError::ProgramRejected { code: 6005, .. }
    ));
    assert_eq!(ledger.submit_count(), 1);
}

#[tokio::test]
async fn transient_failures_stop_at_the_retry_ceiling() {
    let ledger = Arc::new(MockLedger::new());
    for _ in 0..3 {
        ledger.script_submit(Err(LedgerError::Transport("connection reset".to_string())));
    }
    let engine = Engine::new(ledger.clone(), programs(), fast_retry(3));

    let failure = engine
        .execute(withdraw_request())
        .await
        .expect_err("ceiling reached");

    assert_eq!(failure.attempts, 3);
    assert_eq!(failure.disposition, Disposition::SentUnconfirmed);
    assert!(matches!(failure.error, EngineError::TransientNetwork(_)));
}

#[tokio::test]
async fn cancellation_is_checked_before_a_cycle_starts() {
    let ledger = Arc::new(MockLedger::new());
    let engine = Engine::new(ledger.clone(), programs(), fast_retry(8));

    engine.cancel_flag().cancel();
    let failure = engine
        .execute(withdraw_request())
        .await
        .expect_err("cancelled before probing");

    assert!(matches!(failure.error, EngineError::Cancelled));
    assert_eq!(failure.attempts, 0);
    assert_eq!(failure.disposition, Disposition::NothingSent);
    assert_eq!(ledger.submit_count(), 0);
}

#[tokio::test]
async fn missing_machine_is_fatal_with_nothing_sent() {
    let ledger = Arc::new(MockLedger::new());
    let engine = Engine::new(ledger.clone(), programs(), fast_retry(8));

    let failure = engine
        .execute(FlowRequest::Mint(MintFlow {
            machine: Pubkey::new_unique(),
            recipient: party(),
            payer: None,
            compute_unit_limit: 0,
            priority_fee: 0,
        }))
        .await
        .expect_err("nothing to mint from");

    assert_eq!(failure.attempts, 1);
    assert_eq!(failure.disposition, Disposition::NothingSent);
    assert!(matches!(failure.error, EngineError::MalformedRequest(_)));
    assert_eq!(ledger.submit_count(), 0);
}

#[tokio::test]
async fn batch_flows_succeed_and_fail_independently() {
    let ledger = Arc::new(MockLedger::new());
    let programs = programs();

    let existing = Pubkey::new_unique();
    let authority = Pubkey::new_unique();
    ledger.insert_account(
        existing,
        account_image(&machine_fixture(authority, authority)),
    );

    let engine = Engine::new(ledger.clone(), programs, fast_retry(8));
    let mint = |machine| {
        FlowRequest::Mint(MintFlow {
            machine,
            recipient: party(),
            payer: None,
            compute_unit_limit: 0,
            priority_fee: 0,
        })
    };

    let results = engine
        .execute_all(vec![mint(existing), mint(Pubkey::new_unique())])
        .await;

    assert_eq!(results.len(), 2);
    assert!(results[0].is_ok(), "existing machine mints");
    let failure = results[1].as_ref().expect_err("missing machine fails");
    assert!(matches!(failure.error, EngineError::MalformedRequest(_)));
}
