#![forbid(unsafe_code)]
#![allow(missing_docs)]

//! Networking: peer admission, accepted-peer registry, HTTP surface.

pub mod admission;
pub mod http;
pub mod p2p;
pub mod peer_registry;
