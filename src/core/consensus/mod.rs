#![forbid(unsafe_code)]

//! Delegate ranking and round management.

pub mod ranking;
pub mod rounds;
