#![forbid(unsafe_code)]
#![allow(missing_docs)]

//! Observability.

pub mod logging;
pub mod metrics;
