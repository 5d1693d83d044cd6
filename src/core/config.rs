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

//! Node configuration (TOML) with environment overrides.
//!
//! ```text
//! [node]
//! name = "relay-1"
//! data_dir = "./data"
//!
//! [http]
//! listen_addr = "0.0.0.0:4002"
//!
//! [p2p]
//! port = 4002
//! nethash = "6e84d08bd299ed97c212c886c98a57e36545c8f5d645ca7eeae63a8bd62d8988"
//!
//! [consensus]
//! delegate_count = 51
//!
//! [[genesis.wallets]]
//! public_key = "02..."
//! username = "genesis_1"
//! balance = 245098000000000
//! ```

use crate::core::types::LocalNode;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("read config")]
    Read,
    /// The file is not valid TOML for this schema.
    #[error("parse config: {0}")]
    Parse(String),
    /// A value is out of range.
    #[error("invalid config: {0}")]
    Invalid(&'static str),
}

/// Log output format.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Single-line human readable output.
    #[default]
    Compact,
    /// Newline-delimited JSON.
    Json,
}

/// Node configuration root.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Node settings.
    #[serde(default)]
    pub node: NodeSettings,
    /// HTTP endpoint.
    #[serde(default)]
    pub http: HttpConfig,
    /// Peer admission settings.
    #[serde(default)]
    pub p2p: P2pSettings,
    /// Consensus constants.
    #[serde(default)]
    pub consensus: ConsensusConfig,
    /// Genesis accounts applied to an empty store.
    #[serde(default)]
    pub genesis: GenesisConfig,
}

/// Node settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeSettings {
    /// Human-readable name.
    #[serde(default = "default_name")]
    pub name: String,
    /// Data directory (sled db).
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    /// Default log filter when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Log output format.
    #[serde(default)]
    pub log_format: LogFormat,
}

impl Default for NodeSettings {
    fn default() -> Self {
        Self {
            name: default_name(),
            data_dir: default_data_dir(),
            log_level: default_log_level(),
            log_format: LogFormat::default(),
        }
    }
}

/// HTTP config.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Listen address, e.g. 0.0.0.0:4002.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
        }
    }
}

/// Peer admission settings; also the identity echoed back on handshakes.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct P2pSettings {
    /// Advertised port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Network identity hash (64 hex chars).
    #[serde(default)]
    pub nethash: String,
    /// Advertised software version.
    #[serde(default = "default_version")]
    pub version: String,
    /// Advertised operating-system tag.
    #[serde(default = "default_os")]
    pub os: String,
    /// Accepted-peer registry capacity.
    #[serde(default = "default_max_peers")]
    pub max_peers: usize,
    /// Take the peer ip from `X-Forwarded-For` (only behind a trusted proxy).
    #[serde(default)]
    pub trust_forwarded_for: bool,
    /// Capacity of the peer event channel.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

impl Default for P2pSettings {
    fn default() -> Self {
        Self {
            port: default_port(),
            nethash: String::new(),
            version: default_version(),
            os: default_os(),
            max_peers: default_max_peers(),
            trust_forwarded_for: false,
            event_buffer: default_event_buffer(),
        }
    }
}

impl P2pSettings {
    /// Identity advertised to peers.
    pub fn local_node(&self) -> LocalNode {
        LocalNode {
            port: self.port,
            os: self.os.clone(),
            version: self.version.clone(),
            nethash: self.nethash.trim().to_ascii_lowercase(),
        }
    }
}

/// Consensus constants.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConsensusConfig {
    /// Active delegates per round.
    #[serde(default = "default_delegate_count")]
    pub delegate_count: u64,
    /// Address version byte.
    #[serde(default = "default_address_version")]
    pub address_version: u8,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            delegate_count: default_delegate_count(),
            address_version: default_address_version(),
        }
    }
}

/// Genesis accounts.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct GenesisConfig {
    /// Wallets, applied in order; votes are applied after all balances.
    #[serde(default)]
    pub wallets: Vec<GenesisWallet>,
}

/// One genesis account. Either `address` or `public_key` must be set.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct GenesisWallet {
    /// Explicit address (for key-less wallets).
    #[serde(default)]
    pub address: Option<String>,
    /// Public key hex; the address is derived from it.
    #[serde(default)]
    pub public_key: Option<String>,
    /// Delegate username.
    #[serde(default)]
    pub username: Option<String>,
    /// Initial balance.
    #[serde(default)]
    pub balance: u64,
    /// Public key of the delegate this wallet votes for.
    #[serde(default)]
    pub vote: Option<String>,
}

fn default_name() -> String {
    "stakeforge".to_string()
}
fn default_data_dir() -> String {
    "./data".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_listen_addr() -> String {
    "0.0.0.0:4002".to_string()
}
fn default_port() -> u16 {
    4002
}
fn default_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}
fn default_os() -> String {
    std::env::consts::OS.to_string()
}
fn default_max_peers() -> usize {
    1000
}
fn default_event_buffer() -> usize {
    256
}
fn default_delegate_count() -> u64 {
    51
}
fn default_address_version() -> u8 {
    23
}

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

impl NodeConfig {
    /// Parse a TOML document.
    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        toml::from_str(raw).map_err(|e| ConfigError::Parse(e.message().to_string()))
    }

    /// Load from a file, apply env overrides, validate.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|_| ConfigError::Read)?;
        let mut cfg = Self::from_toml(&raw)?;
        cfg.apply_env();
        cfg.validate()?;
        Ok(cfg)
    }

    /// `STAKEFORGE_DATA_DIR`, `STAKEFORGE_HTTP_ADDR`, `STAKEFORGE_NETHASH`.
    pub fn apply_env(&mut self) {
        if let Some(v) = env_nonempty("STAKEFORGE_DATA_DIR") {
            self.node.data_dir = v;
        }
        if let Some(v) = env_nonempty("STAKEFORGE_HTTP_ADDR") {
            self.http.listen_addr = v;
        }
        if let Some(v) = env_nonempty("STAKEFORGE_NETHASH") {
            self.p2p.nethash = v.trim().to_string();
        }
    }

    /// Reject configurations the node cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.consensus.delegate_count == 0 {
            return Err(ConfigError::Invalid("consensus.delegate_count must be > 0"));
        }
        if self.p2p.port == 0 {
            return Err(ConfigError::Invalid("p2p.port must be > 0"));
        }
        match hex::decode(self.p2p.nethash.trim()) {
            Ok(b) if b.len() == 32 => {}
            _ => return Err(ConfigError::Invalid("p2p.nethash must be 64 hex chars")),
        }
        if self.p2p.max_peers == 0 {
            return Err(ConfigError::Invalid("p2p.max_peers must be > 0"));
        }
        if self.p2p.event_buffer == 0 {
            return Err(ConfigError::Invalid("p2p.event_buffer must be > 0"));
        }
        for w in self.genesis.wallets.iter() {
            if w.address.is_none() && w.public_key.is_none() {
                return Err(ConfigError::Invalid("genesis wallet needs address or public_key"));
            }
        }
        Ok(())
    }
}
