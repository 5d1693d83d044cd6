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

//! Deterministic core types (wallets, rounds, peers) and canonical encoding helpers.

use bincode::Options;
use ring::digest;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use thiserror::Error;

/// Canonical serialization error.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Encoding failed.
    #[error("serialization")]
    Serialize,
    /// Bytes are not a valid record.
    #[error("deserialization")]
    Deserialize,
    /// Input exceeds the decode limit.
    #[error("size limit exceeded")]
    TooLarge,
}

/// Canonical bincode options (deterministic).
fn bincode_opts() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .reject_trailing_bytes()
}

/// Encode with deterministic rules.
pub fn encode_canonical<T: Serialize>(v: &T) -> Result<Vec<u8>, CodecError> {
    bincode_opts()
        .serialize(v)
        .map_err(|_| CodecError::Serialize)
}

/// Decode with a hard size cap.
pub fn decode_canonical_limited<T: DeserializeOwned>(
    bytes: &[u8],
    max: usize,
) -> Result<T, CodecError> {
    if bytes.len() > max {
        return Err(CodecError::TooLarge);
    }
    // The limit also bounds container lengths declared inside the payload.
    bincode_opts()
        .with_limit(max as u64)
        .deserialize(bytes)
        .map_err(|_| CodecError::Deserialize)
}

/// SHA-256 of `data`.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let d = digest::digest(&digest::SHA256, data);
    let mut out = [0u8; 32];
    out.copy_from_slice(d.as_ref());
    out
}

/// Length of a compressed secp256k1 public key in bytes.
pub const PUBLIC_KEY_LEN: usize = 33;

/// Wallet public key, stored as lowercase hex of the 33-byte compressed key.
///
/// Ordering is lexicographic over the hex string, which is the tie-break order
/// used when ranking delegates.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PublicKey(String);

impl PublicKey {
    /// Parse a hex public key, normalizing to lowercase.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        let bytes = hex::decode(s).ok()?;
        if bytes.len() != PUBLIC_KEY_LEN {
            return None;
        }
        Some(Self(s.to_ascii_lowercase()))
    }

    /// Hex representation.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Raw key bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        // Constructed only through `parse`, so the hex is always valid.
        hex::decode(&self.0).unwrap_or_default()
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Wallet address (base58check).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    /// Wrap an already-encoded address (genesis files, external references).
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Derive the address of `key` on the network identified by `version`.
    ///
    /// `base58(version || sha256(key)[..20] || checksum)` where the checksum is the
    /// first four bytes of a double SHA-256 over the versioned payload.
    pub fn from_public_key(key: &PublicKey, version: u8) -> Self {
        let digest = sha256(&key.to_bytes());
        let mut payload = Vec::with_capacity(1 + 20 + 4);
        payload.push(version);
        payload.extend_from_slice(&digest[..20]);
        let check = sha256(&sha256(&payload));
        payload.extend_from_slice(&check[..4]);
        Self(bs58::encode(payload).into_string())
    }

    /// Validate the base58check checksum and return the version byte.
    pub fn version(&self) -> Option<u8> {
        let raw = bs58::decode(&self.0).into_vec().ok()?;
        if raw.len() != 25 {
            return None;
        }
        let (payload, check) = raw.split_at(21);
        let expected = sha256(&sha256(payload));
        if check != &expected[..4] {
            return None;
        }
        Some(payload[0])
    }

    /// String form.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Account state tracked by the wallet ledger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallet {
    /// Primary key; never changes.
    pub address: Address,
    /// Bound on the first observed transaction, immutable afterwards.
    pub public_key: Option<PublicKey>,
    /// Optional second signature key.
    pub second_public_key: Option<PublicKey>,
    /// Presence marks delegate registration.
    pub username: Option<String>,
    /// Spendable balance in the smallest currency unit.
    pub balance: u64,
    /// Sum of the balances of all wallets voting for this one.
    pub vote_balance: u64,
    /// Delegate this wallet backs.
    pub vote: Option<PublicKey>,
    /// Blocks forged by this delegate.
    pub produced_blocks: u64,
    /// Forging slots this delegate missed.
    pub missed_blocks: u64,
    /// 1-based delegate rank from the latest ranking.
    pub rank: Option<u32>,
}

impl Wallet {
    /// Fresh wallet with zero balance.
    pub fn new(address: Address) -> Self {
        Self {
            address,
            public_key: None,
            second_public_key: None,
            username: None,
            balance: 0,
            vote_balance: 0,
            vote: None,
            produced_blocks: 0,
            missed_blocks: 0,
            rank: None,
        }
    }

    /// True when a username is registered.
    pub fn is_delegate(&self) -> bool {
        self.username.is_some()
    }
}

/// Persisted forging order for one round.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Round {
    /// Round number (1-based).
    pub round: u64,
    /// Delegate public keys in forging order.
    #[serde(rename = "publicKeys")]
    pub public_keys: Vec<PublicKey>,
}

impl Round {
    /// Round number containing `height`. Height 0 has no round.
    pub fn number_for_height(height: u64, delegate_count: u64) -> Option<u64> {
        if height == 0 || delegate_count == 0 {
            return None;
        }
        Some((height - 1) / delegate_count + 1)
    }

    /// First height of this round.
    pub fn first_height(&self) -> u64 {
        let n = self.public_keys.len() as u64;
        self.round.saturating_sub(1).saturating_mul(n).saturating_add(1)
    }

    /// Delegate whose turn it is at `height`, if the height falls inside this round.
    pub fn forger_for_height(&self, height: u64) -> Option<&PublicKey> {
        let n = self.public_keys.len() as u64;
        if Round::number_for_height(height, n)? != self.round {
            return None;
        }
        let slot = (height - self.first_height()) as usize;
        self.public_keys.get(slot)
    }
}

/// Descriptor extracted from a peer's handshake headers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PeerDescriptor {
    /// Client address.
    pub ip: IpAddr,
    /// Advertised listening port.
    pub port: u16,
    /// Network identity hash.
    pub nethash: String,
    /// Operating-system tag.
    pub os: String,
    /// Protocol/software version.
    pub version: String,
}

/// Accepted peer, keyed by ip in the registry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Peer {
    /// Identifying key.
    pub ip: IpAddr,
    /// Advertised port.
    pub port: u16,
    /// Operating-system tag.
    pub os: String,
    /// Protocol/software version.
    pub version: String,
    /// Network identity hash presented at handshake.
    pub nethash: String,
    /// Last successful admission, ms since UNIX epoch.
    pub last_seen_ms: u64,
}

impl Peer {
    /// Build a registry entry from an admitted descriptor.
    pub fn from_descriptor(d: PeerDescriptor, now_ms: u64) -> Self {
        Self {
            ip: d.ip,
            port: d.port,
            os: d.os,
            version: d.version,
            nethash: d.nethash,
            last_seen_ms: now_ms,
        }
    }
}

/// This node's identity, echoed to peers on a successful handshake.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocalNode {
    /// Advertised port.
    pub port: u16,
    /// Operating-system tag.
    pub os: String,
    /// Software version.
    pub version: String,
    /// Network identity hash.
    pub nethash: String,
}
