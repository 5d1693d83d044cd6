// Copyright (c) 2026 Stakeforge
// Licensed under the Apache-2.0 License.

#![no_main]
#![forbid(unsafe_code)]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use stakeforge::core::types::LocalNode;
use stakeforge::monitoring::metrics::Metrics;
use stakeforge::networking::admission::{Headers, InboundRequest, PeerAdmissionGate};
use stakeforge::networking::p2p::P2pMonitor;
use stakeforge::networking::peer_registry::PeerRegistry;
use std::net::IpAddr;
use std::sync::Arc;

#[derive(Debug, Arbitrary)]
struct Input {
    path: String,
    ip: [u8; 16],
    trust_forwarded_for: bool,
    headers: Vec<(String, String)>,
}

fuzz_target!(|input: Input| {
    let local = LocalNode {
        port: 4002,
        os: "linux".into(),
        version: "2.0.0".into(),
        nethash: "6e84d08bd299ed97c212c886c98a57e36545c8f5d645ca7eeae63a8bd62d8988".into(),
    };
    let Ok(metrics) = Metrics::new() else { return };
    let metrics = Arc::new(metrics);
    let registry = Arc::new(PeerRegistry::new(4));
    let (monitor, _rx) = P2pMonitor::new(local.clone(), registry.clone(), metrics.clone(), 4);
    let gate = PeerAdmissionGate::new(monitor, local, metrics)
        .with_trust_forwarded_for(input.trust_forwarded_for);

    let mut headers = Headers::new();
    for (k, v) in input.headers.iter() {
        headers.insert(k, v.as_str());
    }
    let req = InboundRequest::new(input.path, IpAddr::from(input.ip), headers);
    let before = registry.snapshot().ok();
    if !gate.handle(&req).is_continue() {
        assert_eq!(registry.snapshot().ok(), before);
    }
});
