//! Feature probe: which optional modules are active for a machine
//!
//! Active means the module's settings account exists on the ledger at probe
//! time. The result is a pure function of ledger state and may be stale by
//! the time it is used; callers re-probe on every retry cycle and never cache
//! across cycles.

use solana_sdk::pubkey::Pubkey;
use tracing::debug;

use crate::ledger::{LedgerClient, LedgerError};
use crate::types::{ActiveModules, ModuleTag};

/// Probe every known module tag for `machine`.
///
/// A query failure is propagated: the engine classifies it and retries the
/// whole cycle rather than proceeding with a partial module set.
pub async fn probe_modules(
    ledger: &dyn LedgerClient,
    machine: &Pubkey,
    program: &Pubkey,
) -> Result<ActiveModules, LedgerError> {
    let mut active = ActiveModules::none();
    for tag in ModuleTag::PRIORITY {
        let settings = tag.settings_address(machine, program);
        if ledger.account(&settings).await?.is_some() {
            active.activate(tag);
            debug!(module = %tag, settings = %settings, "Module active");
        }
    }
    Ok(active)
}
