//! Error taxonomy for the composition and broadcast engine
//!
//! Every failure the engine can observe is classified into exactly one of the
//! kinds below. Retryable kinds are consumed inside the retry loop and only
//! surface once the attempt ceiling is reached; fatal kinds terminate the
//! cycle immediately.

use solana_sdk::pubkey::Pubkey;
use thiserror::Error;

use crate::ledger::LedgerError;

/// Classified failure observed during one submission cycle
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// The observed ledger state went stale between observation and use:
    /// expired recency token, lagging node, or a confirmation window that
    /// closed without a result. The whole cycle must restart from probing.
    #[error("Stale observation: {0}")]
    StaleObservation(String),

    /// Transient transport or node failure of the same semantic class as a
    /// stale observation: worth a fresh cycle, nothing about the request
    /// itself is wrong.
    #[error("Transient network failure: {0}")]
    TransientNetwork(String),

    /// The receiving program's entry point rejected the transaction with a
    /// defined error code. Retrying an intrinsically rejected request wastes
    /// signatures and fees.
    #[error("Program rejected with code {code}{}", fmt_label(.label))]
    ProgramRejected {
        code: u32,
        /// Decoded identity where the decoder knows the code
        label: Option<&'static str>,
    },

    /// Caller configuration error: size overflow, missing module parameter,
    /// insufficient funds, nonexistent target. Never retried.
    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    /// The assembled transaction was handed to broadcast without a complete
    /// signature set. Programming error in the assembler or its caller.
    #[error("Signing incomplete: {0}")]
    SigningIncomplete(String),

    /// Cooperative cancellation observed before starting a new cycle.
    /// Not a ledger outcome; never produced by classification.
    #[error("Cancelled before starting a new cycle")]
    Cancelled,
}

impl EngineError {
    /// Whether a fresh full cycle (re-probe, new recency token, re-sign) may
    /// succeed where this attempt failed
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::StaleObservation(_) | Self::TransientNetwork(_) => true,
            Self::ProgramRejected { .. }
            | Self::MalformedRequest(_)
            | Self::SigningIncomplete(_)
            | Self::Cancelled => false,
        }
    }

    /// Error category for metrics and structured logs
    pub fn category(&self) -> &'static str {
        match self {
            Self::StaleObservation(_) => "stale",
            Self::TransientNetwork(_) => "network",
            Self::ProgramRejected { .. } => "program",
            Self::MalformedRequest(_) => "malformed",
            Self::SigningIncomplete(_) => "signing",
            Self::Cancelled => "cancelled",
        }
    }

    /// Build a `ProgramRejected` with the decoded label when the code is known
    pub fn program_rejected(code: u32) -> Self {
        Self::ProgramRejected {
            code,
            label: decode_program_error(code),
        }
    }
}

impl From<LedgerError> for EngineError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::BlockhashNotFound
            | LedgerError::NodeBehind
            | LedgerError::RecencyExpired => Self::StaleObservation(err.to_string()),
            LedgerError::Transport(_)
            | LedgerError::Timeout { .. }
            | LedgerError::RateLimited
            | LedgerError::Rpc(_) => Self::TransientNetwork(err.to_string()),
            LedgerError::Program { code } => Self::program_rejected(code),
            LedgerError::InsufficientFunds | LedgerError::Malformed(_) => {
                Self::MalformedRequest(err.to_string())
            }
            LedgerError::AccountNotFound(addr) => {
                Self::MalformedRequest(format!("Account does not exist: {addr}"))
            }
        }
    }
}

/// Decode a launch-program error code to its identity, where known.
///
/// Codes at and above [`ANCHOR_ERROR_BASE`] belong to the program itself; the
/// table mirrors the program's published error enum. Anything unknown is
/// surfaced as the raw code.
pub fn decode_program_error(code: u32) -> Option<&'static str> {
    let name = match code {
        6000 => "IncorrectOwner",
        6001 => "Uninitialized",
        6002 => "TokenTransferFailed",
        6003 => "CandyMachineEmpty",
        6004 => "CandyMachineNotLive",
        6005 => "HiddenSettingsDoNotHaveConfigLines",
        6006 => "CannotChangeNumberOfLines",
        6007 => "DerivedKeyInvalid",
        6008 => "PublicKeyMismatch",
        6009 => "NoWhitelistToken",
        6010 => "TokenBurnFailed",
        6011 => "GatewayTokenInvalid",
        6012 => "CandyMachineNotLiveYet",
        6013 => "NotEnoughTokens",
        6014 => "NotEnoughSOL",
        6015 => "MintMismatch",
        6016 => "SuspiciousTransaction",
        // System program: insufficient lamports for the transfer/allocation
        1 => "InsufficientFundsForInstruction",
        _ => return None,
    };
    Some(name)
}

/// First custom error code emitted by the program's own error enum
pub const ANCHOR_ERROR_BASE: u32 = 6000;

fn fmt_label(label: &Option<&'static str>) -> String {
    match label {
        Some(l) => format!(" ({l})"),
        None => String::new(),
    }
}

/// What is known to have happened on the ledger when a terminal failure is
/// reported
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// No transaction left this process
    NothingSent,
    /// A signed transaction was sent but its fate is unknown (confirmation
    /// window closed, node unreachable afterwards)
    SentUnconfirmed,
    /// The ledger definitively rejected the transaction
    Rejected,
}

/// Terminal failure of an [`crate::engine::Engine::execute`] call.
///
/// Always carries the last observed target address so a human can inspect
/// ledger state directly, even when nothing confirmed.
#[derive(Error, Debug, Clone)]
#[error("{error} [target={target}, attempts={attempts}, disposition={disposition:?}]")]
pub struct ExecutionFailure {
    pub error: EngineError,
    /// Last target object address observed by the engine
    pub target: Pubkey,
    /// Number of full cycles run, including the failing one
    pub attempts: u32,
    pub disposition: Disposition,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_kinds() {
        assert!(EngineError::StaleObservation("x".into()).is_retryable());
        assert!(EngineError::TransientNetwork("x".into()).is_retryable());
        assert!(!EngineError::program_rejected(6004).is_retryable());
        assert!(!EngineError::MalformedRequest("x".into()).is_retryable());
        assert!(!EngineError::SigningIncomplete("x".into()).is_retryable());
        assert!(!EngineError::Cancelled.is_retryable());
    }

    #[test]
    fn program_error_decoding() {
        assert_eq!(decode_program_error(6004), Some("CandyMachineNotLive"));
        assert_eq!(decode_program_error(1), Some("InsufficientFundsForInstruction"));
        assert_eq!(decode_program_error(59999), None);

        let err = EngineError::program_rejected(6003);
        assert_eq!(
            err.to_string(),
            "Program rejected with code 6003 (CandyMachineEmpty)"
        );
        let raw = EngineError::program_rejected(42);
        assert_eq!(raw.to_string(), "Program rejected with code 42");
    }

    #[test]
    fn ledger_error_mapping_is_total() {
        let cases = vec![
            LedgerError::BlockhashNotFound,
            LedgerError::NodeBehind,
            LedgerError::RecencyExpired,
            LedgerError::Transport("conn reset".into()),
            LedgerError::Timeout { timeout_ms: 5000 },
            LedgerError::RateLimited,
            LedgerError::Rpc("500".into()),
            LedgerError::Program { code: 6000 },
            LedgerError::InsufficientFunds,
            LedgerError::Malformed("bad".into()),
            LedgerError::AccountNotFound(Pubkey::new_unique()),
        ];
        for case in cases {
            // Every ledger outcome maps to exactly one engine kind
            let mapped = EngineError::from(case);
            assert_ne!(mapped.category(), "cancelled");
        }
    }
}
