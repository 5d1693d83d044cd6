// Copyright (c) 2026 Stakeforge
// Licensed under the Apache License, Version 2.0

//! P2P monitor: the node's [`AcceptPeer`] implementation.
//!
//! Checks the network identity, upserts into the [`PeerRegistry`] and announces the
//! peer on a bounded channel for the broadcast layer. Announcing never blocks; when the
//! channel is full the event is dropped and the registry entry is still kept.

#![forbid(unsafe_code)]

use crate::core::types::{LocalNode, Peer, PeerDescriptor};
use crate::monitoring::metrics::Metrics;
use crate::networking::admission::{AcceptPeer, AdmissionError};
use crate::networking::peer_registry::{PeerRegistry, PeerRegistryError, Upsert};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;
use tracing::debug;

/// Events emitted by the monitor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum P2pEvent {
    /// First admission of this ip.
    PeerAccepted(Peer),
    /// Known ip handshaked again.
    PeerRefreshed(Peer),
}

/// Receiver of P2P events.
pub type EventRx = mpsc::Receiver<P2pEvent>;

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Accepts peers on behalf of the admission gate.
pub struct P2pMonitor {
    local: LocalNode,
    registry: Arc<PeerRegistry>,
    metrics: Arc<Metrics>,
    events: mpsc::Sender<P2pEvent>,
}

impl P2pMonitor {
    /// Create the monitor and the receiving end of its event channel.
    pub fn new(
        local: LocalNode,
        registry: Arc<PeerRegistry>,
        metrics: Arc<Metrics>,
        event_buffer: usize,
    ) -> (Self, EventRx) {
        let (events, rx) = mpsc::channel(event_buffer.max(1));
        (
            Self {
                local,
                registry,
                metrics,
                events,
            },
            rx,
        )
    }

    /// Registry this monitor writes to.
    pub fn registry(&self) -> &Arc<PeerRegistry> {
        &self.registry
    }

    /// This node's identity.
    pub fn local(&self) -> &LocalNode {
        &self.local
    }
}

impl AcceptPeer for P2pMonitor {
    fn accept_peer(&self, descriptor: PeerDescriptor) -> Result<Peer, AdmissionError> {
        if !descriptor.nethash.eq_ignore_ascii_case(&self.local.nethash) {
            return Err(AdmissionError::NetworkMismatch);
        }

        let peer = Peer::from_descriptor(descriptor, now_ms());
        let outcome = self.registry.upsert(peer.clone()).map_err(|e| match e {
            PeerRegistryError::Full => AdmissionError::RegistryFull,
            PeerRegistryError::Poisoned => AdmissionError::Unavailable,
        })?;

        if let Ok(n) = self.registry.len() {
            self.metrics.accepted_peers.set(n as i64);
        }

        let ev = match outcome {
            Upsert::Inserted => P2pEvent::PeerAccepted(peer.clone()),
            Upsert::Updated => P2pEvent::PeerRefreshed(peer.clone()),
        };
        if self.events.try_send(ev).is_err() {
            debug!(ip = %peer.ip, "peer event dropped");
        }
        Ok(peer)
    }
}
