// Copyright (c) 2026 Stakeforge
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Stakeforge - consensus membership and forging order for a delegated-proof-of-stake node.
//!
//! This crate provides:
//! - A wallet ledger tracking balances, votes and delegate registration, with the
//!   vote-balance invariant enforced on every mutation
//! - Deterministic delegate ranking and round construction, persisted on sled
//! - A peer admission gate (restricted namespaces, nethash-checked handshakes)
//! - Monitoring via Prometheus metrics and structured logging

/// Core protocol primitives (types, config, ledger state, rounds).
pub mod core;
/// Observability (metrics, logging setup).
pub mod monitoring;
/// Peer admission and the HTTP surface.
pub mod networking;
