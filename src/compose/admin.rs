//! Administrative compositions: update parameters, withdraw funds

use solana_sdk::instruction::{AccountMeta, Instruction};

use crate::compose::ixdata::{self, MachineState, UpdateArgs};
use crate::config::ProgramSet;
use crate::errors::EngineError;
use crate::ledger::LedgerClient;
use crate::types::{UpdateFlow, WithdrawFlow};
use solana_sdk::signer::Signer;

/// Read-modify-write of the machine's sale parameters. Fields the caller did
/// not override are preserved from the state decoded in this cycle, so a
/// retry never writes back stale values from an earlier attempt.
pub async fn compose_update(
    ledger: &dyn LedgerClient,
    programs: &ProgramSet,
    flow: &UpdateFlow,
) -> Result<Vec<Instruction>, EngineError> {
    let machine_data = ledger
        .account(&flow.machine)
        .await?
        .ok_or_else(|| {
            EngineError::MalformedRequest(format!("machine {} does not exist", flow.machine))
        })?;
    let machine: MachineState = ixdata::decode_account(&machine_data, "machine")?;

    let mut data = machine.data;
    if let Some(price) = flow.update.price {
        data.price = price;
    }
    if let Some(max_supply) = flow.update.max_supply {
        data.max_supply = max_supply;
    }
    if let Some(go_live) = flow.update.go_live_date {
        data.go_live_date = Some(go_live);
    }
    if let Some(end) = flow.update.end_settings {
        data.end_settings = Some(end);
    }
    if let Some(mutable) = flow.update.is_mutable {
        data.is_mutable = mutable;
    }

    let authority = flow.authority.pubkey();
    Ok(vec![Instruction {
        program_id: programs.launch_program,
        accounts: vec![
            AccountMeta::new(flow.machine, false),
            AccountMeta::new_readonly(authority, true),
            AccountMeta::new_readonly(machine.wallet, false),
        ],
        data: ixdata::encode("update_candy_machine", &UpdateArgs { data })?,
    }])
}

/// Drain the machine's lamports to its authority
pub fn compose_withdraw(programs: &ProgramSet, flow: &WithdrawFlow) -> Vec<Instruction> {
    let authority = flow.authority.pubkey();
    vec![Instruction {
        program_id: programs.launch_program,
        accounts: vec![
            AccountMeta::new(flow.machine, false),
            AccountMeta::new(authority, true),
        ],
        data: ixdata::encode_bare("withdraw_funds"),
    }]
}
