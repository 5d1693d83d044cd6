#![forbid(unsafe_code)]

//! Core protocol primitives.

/// Node configuration.
pub mod config;
/// Ranking and rounds.
pub mod consensus;
/// Ledger state and persistence.
pub mod state;
/// Wallets, rounds, peers, canonical encoding.
pub mod types;
