#![forbid(unsafe_code)]

//! Wallet ledger and durable chain store.

pub mod persistent_state;
pub mod wallet_ledger;
