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

use stakeforge::core::types::LocalNode;
use stakeforge::monitoring::metrics::Metrics;
use stakeforge::networking::admission::{
    is_loopback, Admission, AdmissionError, AdmissionRule, Headers, InboundRequest,
    PeerAdmissionGate, RejectionBody,
};
use stakeforge::networking::p2p::{EventRx, P2pEvent, P2pMonitor};
use stakeforge::networking::peer_registry::PeerRegistry;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::Arc;

const NETHASH: &str = "6e84d08bd299ed97c212c886c98a57e36545c8f5d645ca7eeae63a8bd62d8988";
const OTHER_NETHASH: &str = "2a44f340d76ffc3df204c5f38cd355b7496c9065a1ade2ef92071436bd72e867";

struct Fixture {
    gate: PeerAdmissionGate<P2pMonitor>,
    registry: Arc<PeerRegistry>,
    metrics: Arc<Metrics>,
    events: EventRx,
}

fn local() -> LocalNode {
    LocalNode {
        port: 4002,
        os: "linux".into(),
        version: "2.0.0".into(),
        nethash: NETHASH.into(),
    }
}

fn fixture(max_peers: usize) -> Fixture {
    let metrics = Arc::new(Metrics::new().unwrap());
    let registry = Arc::new(PeerRegistry::new(max_peers));
    let (monitor, events) = P2pMonitor::new(local(), registry.clone(), metrics.clone(), 8);
    Fixture {
        gate: PeerAdmissionGate::new(monitor, local(), metrics.clone()),
        registry,
        metrics,
        events,
    }
}

fn remote() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(203, 0, 113, 7))
}

fn peer_headers(nethash: &str) -> Headers {
    Headers::new()
        .with("Port", "4001")
        .with("Nethash", nethash)
        .with("OS", "linux")
        .with("Version", "2.0.1")
}

#[test]
fn internal_paths_are_hidden_from_remote_callers() {
    let f = fixture(10);
    let req = InboundRequest::new("/internal/status", remote(), Headers::new());

    match f.gate.handle(&req) {
        Admission::Rejected(r) => {
            assert_eq!(r.status_code, 400);
            match r.body {
                RejectionBody::NotFound { code, message } => {
                    assert_eq!(code, "ResourceNotFound");
                    assert_eq!(message, "/internal/status does not exist");
                }
                other => panic!("unexpected body: {other:?}"),
            }
        }
        other => panic!("expected rejection, got {other:?}"),
    }
    assert_eq!(f.metrics.restricted_rejected_total.get(), 1);

    let local_req = InboundRequest::new("/internal/status", IpAddr::V4(Ipv4Addr::LOCALHOST), Headers::new());
    assert_eq!(
        f.gate.handle(&local_req),
        Admission::Continue { response_headers: Headers::new() }
    );
    let remote_ns = InboundRequest::new("/remote/rebuild", remote(), Headers::new());
    assert!(!f.gate.handle(&remote_ns).is_continue());
}

#[test]
fn loopback_covers_v6_and_mapped_v4() {
    assert!(is_loopback(&IpAddr::V6(Ipv6Addr::LOCALHOST)));
    assert!(is_loopback(&IpAddr::V6(Ipv4Addr::LOCALHOST.to_ipv6_mapped())));
    assert!(!is_loopback(&IpAddr::V6(Ipv4Addr::new(10, 0, 0, 1).to_ipv6_mapped())));
    assert!(!is_loopback(&remote()));

    let f = fixture(10);
    let mapped = IpAddr::V6(Ipv4Addr::LOCALHOST.to_ipv6_mapped());
    assert!(f.gate.handle(&InboundRequest::new("/internal/delegates", mapped, Headers::new())).is_continue());
}

#[test]
fn matching_handshake_registers_the_peer() {
    let mut f = fixture(10);
    let req = InboundRequest::new("/peer/handshake", remote(), peer_headers(NETHASH));

    let Admission::Continue { response_headers } = f.gate.handle(&req) else {
        panic!("handshake rejected");
    };
    assert_eq!(response_headers.get("port"), Some("4002"));
    assert_eq!(response_headers.get("os"), Some("linux"));
    assert_eq!(response_headers.get("version"), Some("2.0.0"));
    assert_eq!(response_headers.get("nethash"), Some(NETHASH));

    let peer = f.registry.get(&remote()).unwrap().unwrap();
    assert_eq!((peer.port, peer.version.as_str()), (4001, "2.0.1"));
    assert_eq!(f.metrics.handshakes_accepted_total.get(), 1);
    assert_eq!(f.metrics.accepted_peers.get(), 1);
    assert!(matches!(f.events.try_recv(), Ok(P2pEvent::PeerAccepted(_))));

    assert!(f.gate.handle(&req).is_continue());
    assert_eq!(f.registry.len().unwrap(), 1);
    assert!(matches!(f.events.try_recv(), Ok(P2pEvent::PeerRefreshed(_))));
}

#[test]
fn foreign_network_is_rejected_without_touching_the_registry() {
    let f = fixture(10);
    let seed = InboundRequest::new("/peer/handshake", IpAddr::V4(Ipv4Addr::new(198, 51, 100, 1)), peer_headers(NETHASH));
    assert!(f.gate.handle(&seed).is_continue());
    let before = f.registry.snapshot().unwrap();

    let req = InboundRequest::new("/peer/handshake", remote(), peer_headers(OTHER_NETHASH));
    match f.gate.handle(&req) {
        Admission::Rejected(r) => {
            assert_eq!(r.status_code, 500);
            assert_eq!(
                r.body,
                RejectionBody::Failure {
                    success: false,
                    message: AdmissionError::NetworkMismatch.to_string(),
                }
            );
        }
        other => panic!("expected rejection, got {other:?}"),
    }
    assert_eq!(f.registry.snapshot().unwrap(), before);
    assert_eq!(f.metrics.handshakes_rejected_total.get(), 1);
}

#[test]
fn missing_or_bad_headers_fail_validation() {
    let f = fixture(10);
    for name in ["port", "nethash", "os", "version"] {
        let mut h = Headers::new();
        for (k, v) in peer_headers(NETHASH).iter() {
            if k != name {
                h.insert(k, v);
            }
        }
        let req = InboundRequest::new("/peer/list", remote(), h);
        assert!(matches!(
            f.gate.descriptor(&req),
            Err(AdmissionError::MissingHeader(n)) if n == name
        ));
        assert!(!f.gate.handle(&req).is_continue());
    }

    let bad_port = peer_headers(NETHASH).with("port", "http");
    let req = InboundRequest::new("/peer/list", remote(), bad_port);
    assert_eq!(f.gate.descriptor(&req), Err(AdmissionError::InvalidHeader("port")));
    assert!(f.registry.is_empty().unwrap());
}

#[test]
fn full_registry_still_refreshes_known_peers() {
    let f = fixture(1);
    let known = InboundRequest::new("/peer/handshake", remote(), peer_headers(NETHASH));
    assert!(f.gate.handle(&known).is_continue());

    let newcomer = InboundRequest::new("/peer/handshake", IpAddr::V4(Ipv4Addr::new(192, 0, 2, 9)), peer_headers(NETHASH));
    match f.gate.handle(&newcomer) {
        Admission::Rejected(r) => assert_eq!(
            r.body,
            RejectionBody::Failure {
                success: false,
                message: "peer registry is full".into(),
            }
        ),
        other => panic!("expected rejection, got {other:?}"),
    }
    assert!(f.gate.handle(&known).is_continue());
    assert_eq!(f.registry.len().unwrap(), 1);
}

#[test]
fn forwarded_for_is_opt_in() {
    let metrics = Arc::new(Metrics::new().unwrap());
    let registry = Arc::new(PeerRegistry::new(10));
    let (monitor, _events) = P2pMonitor::new(local(), registry.clone(), metrics.clone(), 8);
    let gate = PeerAdmissionGate::new(monitor, local(), metrics).with_trust_forwarded_for(true);

    let proxy = IpAddr::V4(Ipv4Addr::LOCALHOST);
    let headers = peer_headers(NETHASH).with("X-Forwarded-For", "198.51.100.23, 10.0.0.1");
    let req = InboundRequest::new("/peer/handshake", proxy, headers);
    assert!(gate.handle(&req).is_continue());
    assert!(registry.get(&"198.51.100.23".parse().unwrap()).unwrap().is_some());

    let f = fixture(10);
    assert_eq!(f.gate.descriptor(&req).unwrap().ip, proxy);
}

#[test]
fn rules_apply_first_match_in_order() {
    let f = fixture(10);
    assert_eq!(f.gate.rules(), &AdmissionRule::PIPELINE[..]);

    let cases = [
        ("/internal/status", remote(), AdmissionRule::RestrictedNamespace),
        ("/internal/status", IpAddr::V4(Ipv4Addr::LOCALHOST), AdmissionRule::Passthrough),
        ("/peer/list", remote(), AdmissionRule::PeerHandshake),
        ("/peer/list", IpAddr::V4(Ipv4Addr::LOCALHOST), AdmissionRule::PeerHandshake),
        ("/api/blocks", remote(), AdmissionRule::Passthrough),
        ("/internalx", remote(), AdmissionRule::Passthrough),
    ];
    for (path, ip, want) in cases {
        let req = InboundRequest::new(path, ip, Headers::new());
        assert_eq!(f.gate.classify(&req), want, "{path} from {ip}");
    }
}
