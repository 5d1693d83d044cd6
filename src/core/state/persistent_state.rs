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

//! Durable chain state on sled: the wallet table and persisted rounds.
//!
//! Trees:
//! - `wallets`: address -> canonical `Wallet`
//! - `rounds`: round number (u64 BE) -> canonical `Round`

use crate::core::consensus::rounds::RoundStore;
use crate::core::types::{decode_canonical_limited, encode_canonical, Round, Wallet};
use sled::transaction::{ConflictableTransactionError, TransactionError};
use thiserror::Error;

const WALLETS_TREE: &str = "wallets";
const ROUNDS_TREE: &str = "rounds";

/// Upper bound for one encoded wallet record.
pub const MAX_WALLET_BYTES: usize = 4 * 1024;
/// Upper bound for one encoded round record.
pub const MAX_ROUND_BYTES: usize = 256 * 1024;

/// State errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Opening the database or a tree failed.
    #[error("db open")]
    DbOpen,
    /// Read, write or flush failed.
    #[error("db io")]
    DbIo,
    /// A record did not encode or decode.
    #[error("codec")]
    Codec,
}

/// sled-backed store.
#[derive(Clone)]
pub struct ChainStore {
    db: sled::Db,
    wallets: sled::Tree,
    rounds: sled::Tree,
}

impl ChainStore {
    /// Open sled DB at path (directory).
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let db = sled::open(path).map_err(|_| StoreError::DbOpen)?;
        let wallets = db.open_tree(WALLETS_TREE).map_err(|_| StoreError::DbOpen)?;
        let rounds = db.open_tree(ROUNDS_TREE).map_err(|_| StoreError::DbOpen)?;
        Ok(Self { db, wallets, rounds })
    }

    /// Every persisted wallet, ordered by address.
    pub fn load_all_wallets(&self) -> Result<Vec<Wallet>, StoreError> {
        let mut out = Vec::new();
        for item in self.wallets.iter() {
            let (_, v) = item.map_err(|_| StoreError::DbIo)?;
            let w: Wallet =
                decode_canonical_limited(&v, MAX_WALLET_BYTES).map_err(|_| StoreError::Codec)?;
            out.push(w);
        }
        Ok(out)
    }

    /// Write all wallets in one sled transaction, then flush.
    pub fn save_wallets(&self, wallets: &[Wallet]) -> Result<(), StoreError> {
        let mut encoded = Vec::with_capacity(wallets.len());
        for w in wallets {
            let bytes = encode_canonical(w).map_err(|_| StoreError::Codec)?;
            encoded.push((w.address.as_str().as_bytes().to_vec(), bytes));
        }

        let res: Result<(), TransactionError<StoreError>> = self.wallets.transaction(|t| {
            for (k, v) in encoded.iter() {
                t.insert(k.as_slice(), v.as_slice())
                    .map_err(|_| ConflictableTransactionError::Abort(StoreError::DbIo))?;
            }
            Ok(())
        });
        match res {
            Ok(()) => {}
            Err(TransactionError::Abort(e)) => return Err(e),
            Err(TransactionError::Storage(_)) => return Err(StoreError::DbIo),
        }
        self.flush()
    }

    /// Persisted round `n`, if any.
    pub fn get_round(&self, n: u64) -> Result<Option<Round>, StoreError> {
        let v = self
            .rounds
            .get(n.to_be_bytes())
            .map_err(|_| StoreError::DbIo)?;
        match v {
            None => Ok(None),
            Some(bytes) => decode_canonical_limited(&bytes, MAX_ROUND_BYTES)
                .map(Some)
                .map_err(|_| StoreError::Codec),
        }
    }

    /// Persist a round and wait until it is durable.
    pub fn save_round(&self, round: &Round) -> Result<(), StoreError> {
        let bytes = encode_canonical(round).map_err(|_| StoreError::Codec)?;
        self.rounds
            .insert(round.round.to_be_bytes(), bytes)
            .map_err(|_| StoreError::DbIo)?;
        self.flush()
    }

    /// All persisted rounds in ascending order.
    pub fn load_rounds(&self) -> Result<Vec<Round>, StoreError> {
        let mut out = Vec::new();
        for item in self.rounds.iter() {
            let (_, v) = item.map_err(|_| StoreError::DbIo)?;
            let r: Round =
                decode_canonical_limited(&v, MAX_ROUND_BYTES).map_err(|_| StoreError::Codec)?;
            out.push(r);
        }
        Ok(out)
    }

    /// Remove every persisted round.
    pub fn truncate_rounds(&self) -> Result<(), StoreError> {
        self.rounds.clear().map_err(|_| StoreError::DbIo)?;
        self.flush()
    }

    /// Flush dirty pages to disk.
    pub fn flush(&self) -> Result<(), StoreError> {
        self.db.flush().map_err(|_| StoreError::DbIo)?;
        Ok(())
    }
}

impl RoundStore for ChainStore {
    fn save_round(&self, round: &Round) -> Result<(), StoreError> {
        ChainStore::save_round(self, round)
    }

    fn get_round(&self, n: u64) -> Result<Option<Round>, StoreError> {
        ChainStore::get_round(self, n)
    }

    fn truncate_rounds(&self) -> Result<(), StoreError> {
        ChainStore::truncate_rounds(self)
    }
}
