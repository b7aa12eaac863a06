//! Transaction Assembler
//!
//! Wraps an instruction list into one atomic transaction, attaches the
//! recency token and fee payer, and collects a signature from every required
//! signing party. Parties sign independently; no party ever sees another's
//! key material. An incomplete signature set is a programming error, not a
//! retryable condition.

use std::collections::HashSet;

use solana_sdk::instruction::Instruction;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signer::Signer;
use solana_sdk::transaction::Transaction;

use crate::errors::EngineError;
use crate::ledger::FreshBlockhash;

/// Distinct addresses marked `is_signer` anywhere in the instruction list,
/// in first-appearance order. The fee payer is required even if no
/// instruction names it.
pub fn required_signers(fee_payer: &Pubkey, instructions: &[Instruction]) -> Vec<Pubkey> {
    let mut seen = HashSet::new();
    let mut signers = vec![*fee_payer];
    seen.insert(*fee_payer);
    for ix in instructions {
        for meta in &ix.accounts {
            if meta.is_signer && seen.insert(meta.pubkey) {
                signers.push(meta.pubkey);
            }
        }
    }
    signers
}

/// Assemble and fully sign one transaction.
///
/// Each party in `parties` contributes a partial signature if (and only if)
/// its address is required; extra parties are ignored rather than added.
/// Returns the signed transaction and its wire bytes.
pub fn assemble(
    instructions: &[Instruction],
    fee_payer: &Pubkey,
    recency: &FreshBlockhash,
    parties: &[&dyn Signer],
) -> Result<(Transaction, Vec<u8>), EngineError> {
    if instructions.is_empty() {
        return Err(EngineError::MalformedRequest(
            "refusing to assemble an empty transaction".to_string(),
        ));
    }

    let required = required_signers(fee_payer, instructions);
    let mut tx = Transaction::new_with_payer(instructions, Some(fee_payer));

    for party in parties {
        let address = party.pubkey();
        if !required.contains(&address) {
            continue;
        }
        let signing: Vec<&dyn Signer> = vec![*party];
        tx.try_partial_sign(&signing, recency.hash).map_err(|e| {
            EngineError::SigningIncomplete(format!("party {address} failed to sign: {e}"))
        })?;
    }

    // The signature set must exactly cover the required set before handoff
    // to broadcast.
    let provided: HashSet<Pubkey> = parties.iter().map(|p| p.pubkey()).collect();
    let missing: Vec<Pubkey> = required
        .iter()
        .filter(|addr| !provided.contains(addr))
        .copied()
        .collect();
    if !missing.is_empty() {
        return Err(EngineError::SigningIncomplete(format!(
            "no signing party for {missing:?}"
        )));
    }
    if !tx.is_signed() {
        return Err(EngineError::SigningIncomplete(
            "assembled transaction still carries placeholder signatures".to_string(),
        ));
    }

    let bytes = bincode::serialize(&tx)
        .map_err(|e| EngineError::MalformedRequest(format!("transaction encoding: {e}")))?;
    Ok((tx, bytes))
}
