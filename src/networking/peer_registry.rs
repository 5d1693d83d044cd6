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

//! Accepted-peer registry, keyed by peer ip.
//!
//! Upserts are atomic per key and bounded by a capacity: a new ip is refused once the
//! registry is full, while an already known ip is always refreshed. Eviction and expiry
//! belong to the broadcast layer that consumes the registry (see [`PeerRegistry::remove`]).

use crate::core::types::Peer;
use std::collections::BTreeMap;
use std::net::IpAddr;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;

/// Registry errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PeerRegistryError {
    /// Capacity reached and the ip is not known.
    #[error("peer registry full")]
    Full,
    /// Lock poisoned by a panicking writer.
    #[error("peer registry lock poisoned")]
    Poisoned,
}

/// Result of an upsert.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Upsert {
    /// New ip.
    Inserted,
    /// Known ip, entry replaced.
    Updated,
}

/// Bounded map of accepted peers.
pub struct PeerRegistry {
    peers: RwLock<BTreeMap<IpAddr, Peer>>,
    max_peers: usize,
}

impl PeerRegistry {
    /// Registry holding at most `max_peers` entries.
    pub fn new(max_peers: usize) -> Self {
        Self {
            peers: RwLock::new(BTreeMap::new()),
            max_peers,
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, BTreeMap<IpAddr, Peer>>, PeerRegistryError> {
        self.peers.read().map_err(|_| PeerRegistryError::Poisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, BTreeMap<IpAddr, Peer>>, PeerRegistryError> {
        self.peers.write().map_err(|_| PeerRegistryError::Poisoned)
    }

    /// Insert or refresh the entry for `peer.ip`.
    pub fn upsert(&self, peer: Peer) -> Result<Upsert, PeerRegistryError> {
        let mut g = self.write()?;
        if g.contains_key(&peer.ip) {
            g.insert(peer.ip, peer);
            return Ok(Upsert::Updated);
        }
        if g.len() >= self.max_peers {
            return Err(PeerRegistryError::Full);
        }
        g.insert(peer.ip, peer);
        Ok(Upsert::Inserted)
    }

    /// Entry for `ip`.
    pub fn get(&self, ip: &IpAddr) -> Result<Option<Peer>, PeerRegistryError> {
        Ok(self.read()?.get(ip).cloned())
    }

    /// Drop the entry for `ip`.
    pub fn remove(&self, ip: &IpAddr) -> Result<Option<Peer>, PeerRegistryError> {
        Ok(self.write()?.remove(ip))
    }

    /// Copy of all entries, ordered by ip.
    pub fn snapshot(&self) -> Result<BTreeMap<IpAddr, Peer>, PeerRegistryError> {
        Ok(self.read()?.clone())
    }

    /// Number of accepted peers.
    pub fn len(&self) -> Result<usize, PeerRegistryError> {
        Ok(self.read()?.len())
    }

    /// True when no peer is registered.
    pub fn is_empty(&self) -> Result<bool, PeerRegistryError> {
        Ok(self.read()?.is_empty())
    }

    /// Capacity.
    pub fn max_peers(&self) -> usize {
        self.max_peers
    }
}
