//! Integration-style suite over the in-process mock ledger

pub mod mock_ledger;

mod engine_tests;
