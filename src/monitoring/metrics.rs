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

use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};
use thiserror::Error;

/// Metrics errors.
#[derive(Debug, Error)]
pub enum MetricsError {
    /// Registration or encoding failed.
    #[error("prometheus")]
    Prom,
}

/// Metrics container.
#[derive(Clone)]
pub struct Metrics {
    /// Registry.
    pub registry: Registry,

    /// Peers in the accepted-peer registry.
    pub accepted_peers: IntGauge,
    /// Successful peer handshakes.
    pub handshakes_accepted_total: IntCounter,
    /// Rejected peer handshakes.
    pub handshakes_rejected_total: IntCounter,
    /// Non-local requests to internal/remote endpoints.
    pub restricted_rejected_total: IntCounter,

    /// Rounds persisted.
    pub rounds_persisted_total: IntCounter,
    /// Latest persisted round number.
    pub current_round: IntGauge,
    /// Registered delegates at the last round computation.
    pub delegates_registered: IntGauge,
}

fn counter(registry: &Registry, name: &str, help: &str) -> Result<IntCounter, MetricsError> {
    let c = IntCounter::new(name, help).map_err(|_| MetricsError::Prom)?;
    registry
        .register(Box::new(c.clone()))
        .map_err(|_| MetricsError::Prom)?;
    Ok(c)
}

fn gauge(registry: &Registry, name: &str, help: &str) -> Result<IntGauge, MetricsError> {
    let g = IntGauge::new(name, help).map_err(|_| MetricsError::Prom)?;
    registry
        .register(Box::new(g.clone()))
        .map_err(|_| MetricsError::Prom)?;
    Ok(g)
}

impl Metrics {
    /// Create and register metrics.
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let accepted_peers = gauge(&registry, "stakeforge_accepted_peers", "Accepted peers")?;
        let handshakes_accepted_total = counter(
            &registry,
            "stakeforge_handshakes_accepted_total",
            "Accepted peer handshakes",
        )?;
        let handshakes_rejected_total = counter(
            &registry,
            "stakeforge_handshakes_rejected_total",
            "Rejected peer handshakes",
        )?;
        let restricted_rejected_total = counter(
            &registry,
            "stakeforge_restricted_rejected_total",
            "Non-local requests to restricted endpoints",
        )?;
        let rounds_persisted_total =
            counter(&registry, "stakeforge_rounds_persisted_total", "Rounds persisted")?;
        let current_round = gauge(&registry, "stakeforge_current_round", "Latest persisted round")?;
        let delegates_registered = gauge(
            &registry,
            "stakeforge_delegates_registered",
            "Registered delegates at last round computation",
        )?;

        Ok(Self {
            registry,
            accepted_peers,
            handshakes_accepted_total,
            handshakes_rejected_total,
            restricted_rejected_total,
            rounds_persisted_total,
            current_round,
            delegates_registered,
        })
    }

    /// Prometheus text exposition.
    pub fn encode(&self) -> Result<String, MetricsError> {
        let mut buf = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buf)
            .map_err(|_| MetricsError::Prom)?;
        String::from_utf8(buf).map_err(|_| MetricsError::Prom)
    }
}
