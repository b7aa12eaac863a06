//! Launchkit - Candy-machine transaction composition and resilient broadcast
//!
//! This library builds the creation, mint, update and withdraw transactions
//! for a modular candy-machine program and drives them through a bounded
//! retry engine that re-derives all ledger-dependent state on every attempt.

pub mod assemble;
pub mod compose;
pub mod config;
pub mod engine;
pub mod errors;
pub mod ledger;
pub mod metrics;
pub mod probe;
pub mod types;
pub mod wallet;

#[cfg(test)]
mod tests;

// Re-export commonly used types
pub use solana_sdk::{pubkey::Pubkey, signature::Signature};
