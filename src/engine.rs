//! Broadcast-retry engine.
//!
//! Runs one flow as a sequence of full cycles. Every cycle starts from a
//! clean slate: modules are re-probed, rent and the recency token are
//! re-fetched, ephemeral identities are regenerated and every required party
//! re-signs. Nothing observed in one cycle is reused in the next, so a retry
//! can never submit against stale ledger state.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signature};
use solana_sdk::signer::Signer;
use tracing::{debug, info, warn};

use crate::assemble;
use crate::compose;
use crate::config::{ProgramSet, RetryConfig};
use crate::errors::{Disposition, EngineError, ExecutionFailure};
use crate::ledger::{ConfirmOutcome, FreshBlockhash, LedgerClient};
use crate::metrics::{metrics, Timer};
use crate::probe;
use crate::types::{
    CreateFlow, ExecutionReceipt, FlowRequest, MintFlow, UpdateFlow, WithdrawFlow,
};

/// Where a cycle currently is. Reported through tracing only; the engine
/// itself is driven by control flow, not by storing this value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Probing,
    Composing,
    Assembling,
    Submitted,
    Confirming,
    Succeeded,
    Retrying,
    Fatal,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Idle => "idle",
            Phase::Probing => "probing",
            Phase::Composing => "composing",
            Phase::Assembling => "assembling",
            Phase::Submitted => "submitted",
            Phase::Confirming => "confirming",
            Phase::Succeeded => "succeeded",
            Phase::Retrying => "retrying",
            Phase::Fatal => "fatal",
        };
        f.write_str(name)
    }
}

/// Cooperative cancellation handle. Checked before each new cycle, never
/// mid-submission: once a transaction is on the wire its outcome is observed
/// before the flow is abandoned.
#[derive(Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Public explorer URL for a landed transaction, for operator logs
pub fn explorer_url(signature: &Signature) -> String {
    format!("https://explorer.solana.com/tx/{signature}")
}

struct CycleFailure {
    error: EngineError,
    disposition: Disposition,
    target: Pubkey,
}

/// Keeps the in-progress gauge honest across every exit path
struct FlowGuard;

impl FlowGuard {
    fn enter() -> Self {
        metrics().active_flows.inc();
        FlowGuard
    }
}

impl Drop for FlowGuard {
    fn drop(&mut self) {
        metrics().active_flows.dec();
    }
}

/// One engine drives all four flow kinds; the [`FlowRequest`] payload selects
/// the composition branch. The engine is cheap to share: flows executed
/// concurrently share the ledger handle and nothing else.
pub struct Engine {
    ledger: Arc<dyn LedgerClient>,
    programs: ProgramSet,
    retry: RetryConfig,
    cancel: CancelFlag,
}

impl Engine {
    pub fn new(ledger: Arc<dyn LedgerClient>, programs: ProgramSet, retry: RetryConfig) -> Self {
        Self {
            ledger,
            programs,
            retry,
            cancel: CancelFlag::new(),
        }
    }

    /// Handle for requesting cancellation from another task
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Run `request` to a terminal outcome: a confirmed signature or a
    /// classified failure with the last observed target and disposition.
    pub async fn execute(&self, request: FlowRequest) -> Result<ExecutionReceipt, ExecutionFailure> {
        let _guard = FlowGuard::enter();
        metrics().flows_total.inc();

        let flow_name = request.name();
        let mut attempt: u32 = 0;
        // Creation mints a fresh identity per cycle, so the target is only
        // known once the first cycle has started.
        let mut last_target: Option<Pubkey> = match &request {
            FlowRequest::Create(_) => None,
            FlowRequest::Mint(flow) => Some(flow.machine),
            FlowRequest::Update(flow) => Some(flow.machine),
            FlowRequest::Withdraw(flow) => Some(flow.machine),
        };

        loop {
            if self.cancel.is_cancelled() {
                info!(flow = flow_name, attempts = attempt, "Flow cancelled");
                metrics().flows_failed.inc();
                return Err(ExecutionFailure {
                    error: EngineError::Cancelled,
                    target: last_target.unwrap_or_default(),
                    attempts: attempt,
                    disposition: Disposition::NothingSent,
                });
            }

            attempt += 1;
            metrics().cycles_total.inc();
            let cycle_timer = Timer::new();
            debug!(flow = flow_name, attempt, phase = %Phase::Probing, "Starting cycle");

            match self.run_cycle(&request).await {
                Ok((signature, target)) => {
                    cycle_timer.observe_duration(&metrics().cycle_latency);
                    metrics().flows_succeeded.inc();
                    info!(
                        flow = flow_name,
                        attempts = attempt,
                        %target,
                        %signature,
                        link = %explorer_url(&signature),
                        phase = %Phase::Succeeded,
                        "Flow confirmed"
                    );
                    return Ok(ExecutionReceipt {
                        signature,
                        target,
                        attempts: attempt,
                    });
                }
                Err(failure) => {
                    cycle_timer.observe_duration(&metrics().cycle_latency);
                    last_target = Some(failure.target);

                    if failure.error.is_retryable() && self.retry.allows_another(attempt) {
                        let delay = self.retry.delay_after(attempt);
                        metrics().retries_total.inc();
                        warn!(
                            flow = flow_name,
                            attempt,
                            error = %failure.error,
                            delay_ms = delay.as_millis() as u64,
                            phase = %Phase::Retrying,
                            "Cycle failed, retrying"
                        );
                        tokio::time::sleep(delay).await;
                        continue;
                    }

                    metrics().flows_failed.inc();
                    warn!(
                        flow = flow_name,
                        attempts = attempt,
                        error = %failure.error,
                        category = failure.error.category(),
                        disposition = ?failure.disposition,
                        phase = %Phase::Fatal,
                        "Flow failed"
                    );
                    return Err(ExecutionFailure {
                        error: failure.error,
                        target: failure.target,
                        attempts: attempt,
                        disposition: failure.disposition,
                    });
                }
            }
        }
    }

    /// Run several independent flows concurrently over the shared ledger
    /// handle. Results come back in request order; each flow retries and
    /// fails on its own schedule.
    pub async fn execute_all(
        &self,
        requests: Vec<FlowRequest>,
    ) -> Vec<Result<ExecutionReceipt, ExecutionFailure>> {
        let total = requests.len();
        let mut pending: FuturesUnordered<_> = requests
            .into_iter()
            .enumerate()
            .map(|(index, request)| async move { (index, self.execute(request).await) })
            .collect();

        let mut results: Vec<Option<Result<ExecutionReceipt, ExecutionFailure>>> =
            (0..total).map(|_| None).collect();
        while let Some((index, result)) = pending.next().await {
            results[index] = Some(result);
        }
        results.into_iter().flatten().collect()
    }

    /// One full cycle: probe, compose, assemble, submit, confirm.
    async fn run_cycle(&self, request: &FlowRequest) -> Result<(Signature, Pubkey), CycleFailure> {
        let compose_timer = Timer::new();
        let (target, built) = match request {
            FlowRequest::Create(flow) => {
                let machine = Keypair::new();
                let target = machine.pubkey();
                (target, self.build_create(flow, &machine).await)
            }
            FlowRequest::Mint(flow) => (flow.machine, self.build_mint(flow).await),
            FlowRequest::Update(flow) => (flow.machine, self.build_update(flow).await),
            FlowRequest::Withdraw(flow) => (flow.machine, self.build_withdraw(flow).await),
        };

        let (wire, recency) = match built {
            Ok(built) => built,
            Err(error) => {
                return Err(CycleFailure {
                    error,
                    disposition: Disposition::NothingSent,
                    target,
                })
            }
        };
        compose_timer.observe_duration(&metrics().compose_latency);

        debug!(%target, phase = %Phase::Submitted, "Submitting transaction");
        let signature = match self.ledger.submit_raw(&wire).await {
            Ok(signature) => signature,
            Err(ledger_err) => {
                let error = EngineError::from(ledger_err);
                // A transport failure leaves the transaction's fate open; a
                // program rejection at preflight is definitive; everything
                // else never left this process.
                let disposition = match &error {
                    EngineError::TransientNetwork(_) => Disposition::SentUnconfirmed,
                    EngineError::ProgramRejected { .. } => Disposition::Rejected,
                    _ => Disposition::NothingSent,
                };
                return Err(CycleFailure {
                    error,
                    disposition,
                    target,
                });
            }
        };

        debug!(%signature, %target, phase = %Phase::Confirming, "Awaiting confirmation");
        let confirm_timer = Timer::new();
        match self
            .ledger
            .confirm(&signature, recency.last_valid_block_height)
            .await
        {
            Ok(ConfirmOutcome::Confirmed) => {
                confirm_timer.observe_duration(&metrics().confirm_latency);
                Ok((signature, target))
            }
            Ok(ConfirmOutcome::Expired) => {
                metrics().expired_windows.inc();
                Err(CycleFailure {
                    error: EngineError::StaleObservation(format!(
                        "recency window closed before {signature} confirmed"
                    )),
                    disposition: Disposition::SentUnconfirmed,
                    target,
                })
            }
            Ok(ConfirmOutcome::Rejected(ledger_err)) => Err(CycleFailure {
                error: ledger_err.into(),
                disposition: Disposition::Rejected,
                target,
            }),
            Err(ledger_err) => Err(CycleFailure {
                error: ledger_err.into(),
                disposition: Disposition::SentUnconfirmed,
                target,
            }),
        }
    }

    async fn build_create(
        &self,
        flow: &CreateFlow,
        machine: &Keypair,
    ) -> Result<(Vec<u8>, FreshBlockhash), EngineError> {
        let instructions =
            compose::compose_create(self.ledger.as_ref(), &self.programs, flow, machine).await?;
        let recency = self.ledger.recency_token().await?;
        let fee_payer = flow.authority.pubkey();
        let authority: &dyn Signer = flow.authority.as_ref();
        let parties: Vec<&dyn Signer> = vec![authority, machine];
        let (_tx, wire) = assemble::assemble(&instructions, &fee_payer, &recency, &parties)?;
        Ok((wire, recency))
    }

    async fn build_mint(&self, flow: &MintFlow) -> Result<(Vec<u8>, FreshBlockhash), EngineError> {
        let active = probe::probe_modules(
            self.ledger.as_ref(),
            &flow.machine,
            &self.programs.launch_program,
        )
        .await?;
        debug!(machine = %flow.machine, modules = %active.iter().count(), phase = %Phase::Composing, "Probe complete");

        // The item identity is ephemeral: a cycle that dies here simply
        // forgets it and the next cycle mints a new one.
        let item_mint = Keypair::new();
        let instructions =
            compose::compose_mint(self.ledger.as_ref(), &self.programs, flow, &active, &item_mint)
                .await?;
        let recency = self.ledger.recency_token().await?;
        let fee_payer = flow.payer_address();
        let recipient: &dyn Signer = flow.recipient.as_ref();
        let mut parties: Vec<&dyn Signer> = vec![recipient, &item_mint];
        if let Some(payer) = &flow.payer {
            parties.push(payer.as_ref());
        }
        let (_tx, wire) = assemble::assemble(&instructions, &fee_payer, &recency, &parties)?;
        Ok((wire, recency))
    }

    async fn build_update(
        &self,
        flow: &UpdateFlow,
    ) -> Result<(Vec<u8>, FreshBlockhash), EngineError> {
        let instructions =
            compose::compose_update(self.ledger.as_ref(), &self.programs, flow).await?;
        let recency = self.ledger.recency_token().await?;
        let fee_payer = flow.authority.pubkey();
        let authority: &dyn Signer = flow.authority.as_ref();
        let parties: Vec<&dyn Signer> = vec![authority];
        let (_tx, wire) = assemble::assemble(&instructions, &fee_payer, &recency, &parties)?;
        Ok((wire, recency))
    }

    async fn build_withdraw(
        &self,
        flow: &WithdrawFlow,
    ) -> Result<(Vec<u8>, FreshBlockhash), EngineError> {
        let instructions = compose::compose_withdraw(&self.programs, flow);
        let recency = self.ledger.recency_token().await?;
        let fee_payer = flow.authority.pubkey();
        let authority: &dyn Signer = flow.authority.as_ref();
        let parties: Vec<&dyn Signer> = vec![authority];
        let (_tx, wire) = assemble::assemble(&instructions, &fee_payer, &recency, &parties)?;
        Ok((wire, recency))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_flag_is_shared() {
        let flag = CancelFlag::new();
        let clone = flag.clone();
        assert!(!clone.is_cancelled());
        flag.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn explorer_url_embeds_signature() {
        let signature = Signature::default();
        let url = explorer_url(&signature);
        assert!(url.starts_with("https://explorer.solana.com/tx/"));
        assert!(url.ends_with(&signature.to_string()));
    }

    #[test]
    fn phase_names_are_lowercase() {
        assert_eq!(Phase::Probing.to_string(), "probing");
        assert_eq!(Phase::Succeeded.to_string(), "succeeded");
        assert_eq!(Phase::Idle.to_string(), "idle");
    }
}
