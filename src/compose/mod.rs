//! Instruction Composer
//!
//! Builds the ordered instruction list for each flow. Two shapes exist:
//! creation (create-account + initialize + requested module inits) and action
//! (a single primary instruction with a module-dependent extension account
//! list). Account reference order is the receiving program's binary contract
//! and is never reordered or deduplicated here.

pub mod action;
pub mod admin;
pub mod creation;
pub mod ixdata;
pub mod layout;

pub use action::compose_mint;
pub use admin::{compose_update, compose_withdraw};
pub use creation::compose_create;
pub use layout::account_size;
