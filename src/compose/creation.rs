//! Creation composition: new machine account, initialize, module inits
//!
//! Instruction order is fixed: optional payment-wallet setup, create-account
//! sized to the exact layout, initialize with the full parameter set, then
//! one init instruction per requested module in priority order.

use solana_sdk::instruction::{AccountMeta, Instruction};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Keypair;
use solana_sdk::signer::Signer;
use solana_sdk::system_instruction;
use solana_sdk::sysvar;
use spl_associated_token_account::get_associated_token_address;
use spl_associated_token_account::instruction::create_associated_token_account_idempotent;
use tracing::debug;

use crate::compose::ixdata::{
    self, InitializeArgs, SaleData, SetCreatorStandardSettingsArgs, SetLockupSettingsArgs,
    SetPaymentSettingsArgs,
};
use crate::compose::layout;
use crate::config::ProgramSet;
use crate::errors::EngineError;
use crate::ledger::LedgerClient;
use crate::types::{uuid_from_address, CreateFlow, ModuleInit, ModuleTag};

/// Compose the full creation instruction list for a fresh machine identity.
///
/// The rent-exempt minimum is fetched here, inside the cycle, so a retry
/// always funds against current rent values.
pub async fn compose_create(
    ledger: &dyn LedgerClient,
    programs: &ProgramSet,
    flow: &CreateFlow,
    machine: &Keypair,
) -> Result<Vec<Instruction>, EngineError> {
    let machine_id = machine.pubkey();
    let authority = flow.authority.pubkey();

    let size = layout::account_size(flow.params.items_available)?;
    let lamports = ledger.min_rent_exempt(size).await?;
    debug!(machine = %machine_id, size, lamports, "Sized machine account");

    let payment = flow.modules.iter().find_map(|m| match m {
        ModuleInit::Payment { payment_mint } => Some(*payment_mint),
        _ => None,
    });

    // With a payment module the machine wallet is the machine's associated
    // token account for the payment mint; otherwise funds go to the authority.
    let wallet = match payment {
        Some(mint) => get_associated_token_address(&machine_id, &mint),
        None => authority,
    };

    let mut instructions = Vec::with_capacity(3 + flow.modules.len());

    if let Some(mint) = payment {
        instructions.push(create_associated_token_account_idempotent(
            &authority,
            &machine_id,
            &mint,
            &spl_token::id(),
        ));
    }

    instructions.push(system_instruction::create_account(
        &authority,
        &machine_id,
        lamports,
        size as u64,
        &programs.launch_program,
    ));

    instructions.push(initialize_instruction(
        programs,
        &machine_id,
        &wallet,
        &authority,
        sale_data(flow, &machine_id),
        payment,
    )?);

    // Requested modules are being newly created, so they are not probed.
    // Priority order keeps creation deterministic.
    let mut modules: Vec<&ModuleInit> = flow.modules.iter().collect();
    modules.sort_by_key(|m| m.tag() as usize);
    for module in modules {
        instructions.push(module_init_instruction(
            programs,
            &machine_id,
            &authority,
            module,
        )?);
    }

    Ok(instructions)
}

fn sale_data(flow: &CreateFlow, machine_id: &Pubkey) -> SaleData {
    let p = &flow.params;
    SaleData {
        uuid: uuid_from_address(machine_id),
        price: p.price,
        symbol: p.symbol.clone(),
        seller_fee_basis_points: p.seller_fee_basis_points,
        max_supply: p.max_supply,
        is_mutable: p.is_mutable,
        retain_authority: p.retain_authority,
        go_live_date: p.go_live_date,
        end_settings: p.end_settings,
        creators: p.creators.clone(),
        hidden_settings: p.hidden_settings.clone(),
        whitelist_mint_settings: p.whitelist_settings.clone(),
        items_available: p.items_available,
        gatekeeper: p.gatekeeper.clone(),
    }
}

fn initialize_instruction(
    programs: &ProgramSet,
    machine: &Pubkey,
    wallet: &Pubkey,
    authority: &Pubkey,
    data: SaleData,
    payment_mint: Option<Pubkey>,
) -> Result<Instruction, EngineError> {
    // Positional contract of the program's initialize entry point
    let mut accounts = vec![
        AccountMeta::new(*machine, false),
        AccountMeta::new_readonly(*wallet, false),
        AccountMeta::new_readonly(*authority, true),
        AccountMeta::new(*authority, true), // payer
        AccountMeta::new_readonly(solana_sdk::system_program::id(), false),
        AccountMeta::new_readonly(sysvar::rent::id(), false),
    ];
    // Token-priced machines append the payment mint read-only
    if let Some(mint) = payment_mint {
        accounts.push(AccountMeta::new_readonly(mint, false));
    }

    Ok(Instruction {
        program_id: programs.launch_program,
        accounts,
        data: ixdata::encode("initialize_candy_machine", &InitializeArgs { data })?,
    })
}

fn module_init_instruction(
    programs: &ProgramSet,
    machine: &Pubkey,
    authority: &Pubkey,
    module: &ModuleInit,
) -> Result<Instruction, EngineError> {
    let tag = module.tag();
    let settings = tag.settings_address(machine, &programs.launch_program);
    let accounts = vec![
        AccountMeta::new(*machine, false),
        AccountMeta::new_readonly(*authority, true),
        AccountMeta::new(settings, false),
        AccountMeta::new(*authority, true), // payer
        AccountMeta::new_readonly(solana_sdk::system_program::id(), false),
        AccountMeta::new_readonly(sysvar::rent::id(), false),
    ];

    let data = match module {
        ModuleInit::Payment { payment_mint } => ixdata::encode(
            "set_payment_settings",
            &SetPaymentSettingsArgs {
                payment_mint: *payment_mint,
            },
        )?,
        ModuleInit::InlineReceipt => ixdata::encode_bare("set_receipt_settings"),
        ModuleInit::Lockup { release_unix_time } => ixdata::encode(
            "set_lockup_settings",
            &SetLockupSettingsArgs {
                release_unix_time: *release_unix_time,
            },
        )?,
        ModuleInit::Permissioned => ixdata::encode_bare("set_permissioned_settings"),
        ModuleInit::CreatorStandard { creator, ruleset } => ixdata::encode(
            "set_ccs_settings",
            &SetCreatorStandardSettingsArgs {
                creator: *creator,
                ruleset: *ruleset,
            },
        )?,
    };

    Ok(Instruction {
        program_id: programs.launch_program,
        accounts,
        data,
    })
}
