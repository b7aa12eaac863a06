//! Action composition: mint against an existing machine
//!
//! A mint transaction is one primary instruction plus an extension account
//! list appended in fixed module priority order (payment, inline-receipt,
//! lockup, permissioned, creator-standard), one segment per probed-active
//! module. The receiving program validates the list positionally; segments
//! are never reordered or deduplicated here.

use solana_sdk::compute_budget::ComputeBudgetInstruction;
use solana_sdk::instruction::{AccountMeta, Instruction};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Keypair;
use solana_sdk::signer::Signer;
use solana_sdk::sysvar;
use spl_associated_token_account::get_associated_token_address;
use tracing::debug;

use crate::compose::ixdata::{self, CreatorStandardSettings, MachineState, PaymentSettings};
use crate::config::ProgramSet;
use crate::errors::EngineError;
use crate::ledger::LedgerClient;
use crate::types::{ActiveModules, MintFlow, ModuleTag};

/// Compose the mint instruction list for one fresh item identity.
///
/// If any active module's segment cannot be derived (dependent ledger read
/// fails or its settings decode fails), the whole composition fails closed;
/// no partial extension list is ever emitted.
pub async fn compose_mint(
    ledger: &dyn LedgerClient,
    programs: &ProgramSet,
    flow: &MintFlow,
    active: &ActiveModules,
    item_mint: &Keypair,
) -> Result<Vec<Instruction>, EngineError> {
    let machine_data = ledger
        .account(&flow.machine)
        .await?
        .ok_or_else(|| {
            EngineError::MalformedRequest(format!("machine {} does not exist", flow.machine))
        })?;
    let machine: MachineState = ixdata::decode_account(&machine_data, "machine")?;

    let recipient = flow.recipient.pubkey();
    let payer = flow.payer_address();
    let mint_id = item_mint.pubkey();
    let receipt_account = get_associated_token_address(&recipient, &mint_id);

    let mut extension = Vec::new();
    for tag in active.iter() {
        let segment =
            module_segment(ledger, programs, tag, flow, &payer, &mint_id, &receipt_account)
                .await?;
        debug!(module = %tag, accounts = segment.len(), "Appending extension segment");
        extension.extend(segment);
    }

    let mut instructions = Vec::with_capacity(3);
    if flow.compute_unit_limit > 0 {
        instructions.push(ComputeBudgetInstruction::set_compute_unit_limit(
            flow.compute_unit_limit,
        ));
    }
    if flow.priority_fee > 0 {
        instructions.push(ComputeBudgetInstruction::set_compute_unit_price(
            flow.priority_fee,
        ));
    }
    instructions.push(mint_instruction(
        programs,
        flow,
        &machine,
        &recipient,
        &payer,
        &mint_id,
        extension,
    ));

    Ok(instructions)
}

/// Fixed account head of the mint entry point, then the extension list
#[allow(clippy::too_many_arguments)]
fn mint_instruction(
    programs: &ProgramSet,
    flow: &MintFlow,
    machine: &MachineState,
    recipient: &Pubkey,
    payer: &Pubkey,
    mint_id: &Pubkey,
    extension: Vec<AccountMeta>,
) -> Instruction {
    let creator_pda = machine_creator_address(&flow.machine, &programs.launch_program);
    let metadata = metadata_address(mint_id, &programs.token_metadata_program);
    let master_edition = master_edition_address(mint_id, &programs.token_metadata_program);

    let mut accounts = vec![
        AccountMeta::new(flow.machine, false),
        AccountMeta::new_readonly(creator_pda, false),
        AccountMeta::new(*payer, true),
        AccountMeta::new(machine.wallet, false),
        AccountMeta::new(metadata, false),
        AccountMeta::new(*mint_id, true),
        AccountMeta::new_readonly(*recipient, true), // mint authority
        AccountMeta::new_readonly(*recipient, true), // update authority
        AccountMeta::new(master_edition, false),
        AccountMeta::new_readonly(programs.token_metadata_program, false),
        AccountMeta::new_readonly(spl_token::id(), false),
        AccountMeta::new_readonly(solana_sdk::system_program::id(), false),
        AccountMeta::new_readonly(sysvar::rent::id(), false),
        AccountMeta::new_readonly(sysvar::clock::id(), false),
        AccountMeta::new_readonly(sysvar::recent_blockhashes::id(), false),
        AccountMeta::new_readonly(sysvar::instructions::id(), false),
    ];
    accounts.extend(extension);

    Instruction {
        program_id: programs.launch_program,
        accounts,
        data: ixdata::encode_bare("mint_nft"),
    }
}

/// One module's extension segment, in the program's published account layout
async fn module_segment(
    ledger: &dyn LedgerClient,
    programs: &ProgramSet,
    tag: ModuleTag,
    flow: &MintFlow,
    payer: &Pubkey,
    mint_id: &Pubkey,
    receipt_account: &Pubkey,
) -> Result<Vec<AccountMeta>, EngineError> {
    let settings = tag.settings_address(&flow.machine, &programs.launch_program);
    let segment = match tag {
        ModuleTag::Payment => {
            // The payment mint lives in the settings account
            let data = require_settings(ledger, &settings, tag).await?;
            let payment: PaymentSettings = ixdata::decode_account(&data, "payment settings")?;
            let payer_token_account = get_associated_token_address(payer, &payment.payment_mint);
            vec![
                AccountMeta::new(payer_token_account, false),
                AccountMeta::new(*payer, false),
            ]
        }
        ModuleTag::InlineReceipt => {
            vec![AccountMeta::new(*receipt_account, false)]
        }
        ModuleTag::Lockup => {
            let mint_manager = mint_manager_address(mint_id, &programs.launch_program);
            vec![
                AccountMeta::new_readonly(settings, false),
                AccountMeta::new(mint_manager, false),
                AccountMeta::new(*receipt_account, false),
            ]
        }
        ModuleTag::Permissioned => {
            vec![AccountMeta::new_readonly(settings, false)]
        }
        ModuleTag::CreatorStandard => {
            // Creator identity is recorded inside the settings account
            let data = require_settings(ledger, &settings, tag).await?;
            let ccs: CreatorStandardSettings =
                ixdata::decode_account(&data, "creator-standard settings")?;
            let mint_manager = mint_manager_address(mint_id, &programs.launch_program);
            vec![
                AccountMeta::new_readonly(settings, false),
                AccountMeta::new_readonly(ccs.creator, false),
                AccountMeta::new_readonly(ccs.ruleset, false),
                AccountMeta::new(mint_manager, false),
            ]
        }
    };
    Ok(segment)
}

/// Read a settings account that the probe reported active. Its disappearance
/// between probe and composition is a stale observation, retried as a fresh
/// cycle rather than submitted partially.
async fn require_settings(
    ledger: &dyn LedgerClient,
    settings: &Pubkey,
    tag: ModuleTag,
) -> Result<Vec<u8>, EngineError> {
    match ledger.account(settings).await? {
        Some(data) => Ok(data),
        None => Err(EngineError::StaleObservation(format!(
            "{tag} settings vanished between probe and composition"
        ))),
    }
}

pub fn machine_creator_address(machine: &Pubkey, program: &Pubkey) -> Pubkey {
    Pubkey::find_program_address(&[b"candy_machine", machine.as_ref()], program).0
}

pub fn metadata_address(mint: &Pubkey, token_metadata_program: &Pubkey) -> Pubkey {
    Pubkey::find_program_address(
        &[b"metadata", token_metadata_program.as_ref(), mint.as_ref()],
        token_metadata_program,
    )
    .0
}

pub fn master_edition_address(mint: &Pubkey, token_metadata_program: &Pubkey) -> Pubkey {
    Pubkey::find_program_address(
        &[
            b"metadata",
            token_metadata_program.as_ref(),
            mint.as_ref(),
            b"edition",
        ],
        token_metadata_program,
    )
    .0
}

pub fn mint_manager_address(mint: &Pubkey, program: &Pubkey) -> Pubkey {
    Pubkey::find_program_address(&[b"mint_manager", mint.as_ref()], program).0
}
