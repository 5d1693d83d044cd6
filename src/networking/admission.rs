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
#![deny(missing_docs)]

//! Peer admission gate.
//!
//! Every inbound request is matched against an ordered list of rules; the first rule
//! that matches decides the outcome:
//!
//! 1. [`AdmissionRule::RestrictedNamespace`]: `/internal/..` or `/remote/..` from a
//!    non-loopback address. Answered as 400 `ResourceNotFound` so the endpoints stay
//!    invisible to remote callers.
//! 2. [`AdmissionRule::PeerHandshake`]: `/peer/..`. The handshake headers are turned into
//!    a [`PeerDescriptor`] and handed to an [`AcceptPeer`] implementation. On success the
//!    request continues and this node's identity is attached as response headers; on
//!    failure the gate answers 500 `{success: false, message}`.
//! 3. [`AdmissionRule::Passthrough`]: everything else continues untouched.
//!
//! Rejections never touch the peer registry: descriptor validation happens before the
//! acceptor is called, and the acceptor checks the network before upserting.

use crate::core::types::{LocalNode, Peer, PeerDescriptor};
use crate::monitoring::metrics::Metrics;
use serde::Serialize;
use std::collections::BTreeMap;
use std::net::IpAddr;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Advertised port header.
pub const HEADER_PORT: &str = "port";
/// Network identity header.
pub const HEADER_NETHASH: &str = "nethash";
/// Operating-system header.
pub const HEADER_OS: &str = "os";
/// Version header.
pub const HEADER_VERSION: &str = "version";
/// Proxy client-address header.
pub const HEADER_FORWARDED_FOR: &str = "x-forwarded-for";

/// Headers every peer request must carry.
pub const REQUIRED_HEADERS: [&str; 4] = [HEADER_PORT, HEADER_NETHASH, HEADER_OS, HEADER_VERSION];

/// Max length of a handshake header value.
pub const MAX_HEADER_VALUE_LEN: usize = 128;

/// Status used for restricted-namespace rejections.
pub const STATUS_RESOURCE_NOT_FOUND: u16 = 400;
/// Status used for failed handshakes.
pub const STATUS_HANDSHAKE_FAILED: u16 = 500;

/// Admission failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AdmissionError {
    /// A required header is absent.
    #[error("missing required header: {0}")]
    MissingHeader(&'static str),
    /// A header is present but malformed.
    #[error("invalid header: {0}")]
    InvalidHeader(&'static str),
    /// The peer presented another network's nethash.
    #[error("peer is on a different network")]
    NetworkMismatch,
    /// The accepted-peer registry cannot take a new peer.
    #[error("peer registry is full")]
    RegistryFull,
    /// The acceptor could not complete the upsert.
    #[error("peer registry unavailable")]
    Unavailable,
}

/// Collaborator that decides whether a peer may join and records it.
pub trait AcceptPeer: Send + Sync {
    /// Validate and register `descriptor`. Must not mutate anything on error.
    fn accept_peer(&self, descriptor: PeerDescriptor) -> Result<Peer, AdmissionError>;
}

impl<T: AcceptPeer + ?Sized> AcceptPeer for Arc<T> {
    fn accept_peer(&self, descriptor: PeerDescriptor) -> Result<Peer, AdmissionError> {
        (**self).accept_peer(descriptor)
    }
}

/// Case-insensitive header map (names stored lowercase).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Headers(BTreeMap<String, String>);

impl Headers {
    /// Empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert, replacing any previous value.
    pub fn insert(&mut self, name: &str, value: impl Into<String>) {
        self.0.insert(name.to_ascii_lowercase(), value.into());
    }

    /// Builder-style insert.
    pub fn with(mut self, name: &str, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    /// Value of `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    /// Iterate in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of headers.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// One inbound request as seen by the gate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundRequest {
    /// Request path, without query.
    pub path: String,
    /// Socket peer address.
    pub remote_addr: IpAddr,
    /// Request headers.
    pub headers: Headers,
}

impl InboundRequest {
    /// Construct a request value.
    pub fn new(path: impl Into<String>, remote_addr: IpAddr, headers: Headers) -> Self {
        Self {
            path: path.into(),
            remote_addr,
            headers,
        }
    }

    fn namespace(&self) -> &str {
        self.path
            .trim_start_matches('/')
            .split('/')
            .next()
            .unwrap_or("")
    }
}

/// Rejection body, serialized as JSON.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum RejectionBody {
    /// `{code, message}` for hidden endpoints.
    NotFound {
        /// Always `ResourceNotFound`.
        code: String,
        /// Human readable.
        message: String,
    },
    /// `{success: false, message}` for failed handshakes.
    Failure {
        /// Always false.
        success: bool,
        /// Reason.
        message: String,
    },
}

/// A response that takes over the request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Rejection {
    /// HTTP status.
    pub status_code: u16,
    /// JSON body.
    pub body: RejectionBody,
}

/// Gate decision.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Admission {
    /// Route normally; add `response_headers` to the eventual response.
    Continue {
        /// Headers to attach (empty unless a handshake succeeded).
        response_headers: Headers,
    },
    /// Answer with this response; no routing.
    Rejected(Rejection),
}

impl Admission {
    fn pass() -> Self {
        Admission::Continue {
            response_headers: Headers::new(),
        }
    }

    /// True for `Continue`.
    pub fn is_continue(&self) -> bool {
        matches!(self, Admission::Continue { .. })
    }
}

/// Admission rules, evaluated in order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AdmissionRule {
    /// Hide internal/remote endpoints from non-local callers.
    RestrictedNamespace,
    /// Handshake peers on the peer namespace.
    PeerHandshake,
    /// Route normally.
    Passthrough,
}

impl AdmissionRule {
    /// Default pipeline order.
    pub const PIPELINE: [AdmissionRule; 3] = [
        AdmissionRule::RestrictedNamespace,
        AdmissionRule::PeerHandshake,
        AdmissionRule::Passthrough,
    ];

    /// True when this rule applies to `req`.
    pub fn matches(&self, req: &InboundRequest) -> bool {
        match self {
            AdmissionRule::RestrictedNamespace => {
                matches!(req.namespace(), "internal" | "remote") && !is_loopback(&req.remote_addr)
            }
            AdmissionRule::PeerHandshake => req.namespace() == "peer",
            AdmissionRule::Passthrough => true,
        }
    }
}

/// Loopback check that also accepts IPv4-mapped IPv6 loopback (`::ffff:127.0.0.1`).
pub fn is_loopback(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_loopback(),
        IpAddr::V6(v6) => {
            v6.is_loopback() || v6.to_ipv4_mapped().map_or(false, |m| m.is_loopback())
        }
    }
}

fn required<'a>(headers: &'a Headers, name: &'static str) -> Result<&'a str, AdmissionError> {
    let v = headers
        .get(name)
        .map(str::trim)
        .ok_or(AdmissionError::MissingHeader(name))?;
    if v.is_empty() {
        return Err(AdmissionError::MissingHeader(name));
    }
    if v.len() > MAX_HEADER_VALUE_LEN || v.chars().any(|c| c.is_control()) {
        return Err(AdmissionError::InvalidHeader(name));
    }
    Ok(v)
}

/// The admission pipeline in front of all inbound traffic.
pub struct PeerAdmissionGate<A: AcceptPeer> {
    rules: Vec<AdmissionRule>,
    acceptor: A,
    local: LocalNode,
    trust_forwarded_for: bool,
    metrics: Arc<Metrics>,
}

impl<A: AcceptPeer> PeerAdmissionGate<A> {
    /// Gate with the default rule order.
    pub fn new(acceptor: A, local: LocalNode, metrics: Arc<Metrics>) -> Self {
        Self {
            rules: AdmissionRule::PIPELINE.to_vec(),
            acceptor,
            local,
            trust_forwarded_for: false,
            metrics,
        }
    }

    /// Take the peer ip from `X-Forwarded-For` (loopback checks still use the socket).
    pub fn with_trust_forwarded_for(mut self, trust: bool) -> Self {
        self.trust_forwarded_for = trust;
        self
    }

    /// Rules in evaluation order.
    pub fn rules(&self) -> &[AdmissionRule] {
        &self.rules
    }

    /// First rule matching `req`.
    pub fn classify(&self, req: &InboundRequest) -> AdmissionRule {
        self.rules
            .iter()
            .copied()
            .find(|r| r.matches(req))
            .unwrap_or(AdmissionRule::Passthrough)
    }

    /// Evaluate the pipeline for one request.
    pub fn handle(&self, req: &InboundRequest) -> Admission {
        match self.classify(req) {
            AdmissionRule::RestrictedNamespace => {
                self.metrics.restricted_rejected_total.inc();
                debug!(path = %req.path, remote = %req.remote_addr, "restricted path from non-local address");
                Admission::Rejected(Rejection {
                    status_code: STATUS_RESOURCE_NOT_FOUND,
                    body: RejectionBody::NotFound {
                        code: "ResourceNotFound".to_string(),
                        message: format!("{} does not exist", req.path),
                    },
                })
            }
            AdmissionRule::PeerHandshake => self.handshake(req),
            AdmissionRule::Passthrough => Admission::pass(),
        }
    }

    fn handshake(&self, req: &InboundRequest) -> Admission {
        let outcome = self
            .descriptor(req)
            .and_then(|d| self.acceptor.accept_peer(d));
        match outcome {
            Ok(peer) => {
                self.metrics.handshakes_accepted_total.inc();
                info!(ip = %peer.ip, port = peer.port, version = %peer.version, "peer admitted");
                Admission::Continue {
                    response_headers: self.local_headers(),
                }
            }
            Err(e) => {
                self.metrics.handshakes_rejected_total.inc();
                warn!(remote = %req.remote_addr, path = %req.path, reason = %e, "peer handshake rejected");
                Admission::Rejected(Rejection {
                    status_code: STATUS_HANDSHAKE_FAILED,
                    body: RejectionBody::Failure {
                        success: false,
                        message: e.to_string(),
                    },
                })
            }
        }
    }

    /// Build the descriptor from the handshake headers.
    pub fn descriptor(&self, req: &InboundRequest) -> Result<PeerDescriptor, AdmissionError> {
        let port = required(&req.headers, HEADER_PORT)?
            .parse::<u16>()
            .ok()
            .filter(|p| *p != 0)
            .ok_or(AdmissionError::InvalidHeader(HEADER_PORT))?;
        let nethash = required(&req.headers, HEADER_NETHASH)?.to_string();
        let os = required(&req.headers, HEADER_OS)?.to_string();
        let version = required(&req.headers, HEADER_VERSION)?.to_string();
        Ok(PeerDescriptor {
            ip: self.client_ip(req)?,
            port,
            nethash,
            os,
            version,
        })
    }

    fn client_ip(&self, req: &InboundRequest) -> Result<IpAddr, AdmissionError> {
        if !self.trust_forwarded_for {
            return Ok(req.remote_addr);
        }
        match req.headers.get(HEADER_FORWARDED_FOR) {
            None => Ok(req.remote_addr),
            Some(v) => v
                .split(',')
                .next()
                .map(str::trim)
                .and_then(|s| s.parse::<IpAddr>().ok())
                .ok_or(AdmissionError::InvalidHeader(HEADER_FORWARDED_FOR)),
        }
    }

    fn local_headers(&self) -> Headers {
        Headers::new()
            .with(HEADER_PORT, self.local.port.to_string())
            .with(HEADER_OS, self.local.os.clone())
            .with(HEADER_VERSION, self.local.version.clone())
            .with(HEADER_NETHASH, self.local.nethash.clone())
    }
}
