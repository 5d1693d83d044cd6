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

//! Round manager: derives, persists and announces the forging order of each round.
//!
//! A round is always handled as compute -> persist (durable) -> announce. Subscribers
//! never see a round that is not on disk.

use crate::core::consensus::ranking::{active_delegates, rank_delegates};
use crate::core::state::persistent_state::StoreError;
use crate::core::state::wallet_ledger::{LedgerError, WalletLedger};
use crate::core::types::Round;
use crate::monitoring::metrics::Metrics;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{info, warn};

/// Capacity of the round announcement channel.
const ANNOUNCE_BUFFER: usize = 16;

/// Round errors.
#[derive(Debug, Error)]
pub enum RoundError {
    /// Height 0 has no round, and neither does a manager without delegate slots.
    #[error("invalid height")]
    InvalidHeight,
    /// Fewer registered delegates than active slots.
    #[error("insufficient delegates: required {required}, available {available}")]
    InsufficientDelegates {
        /// Active delegate count.
        required: u64,
        /// Registered delegates in the snapshot.
        available: usize,
    },
    /// No persisted round with that number.
    #[error("round not found")]
    NotFound,
    /// The round is already persisted with a different forging order.
    #[error("round {0} already persisted with a different order")]
    Conflict(u64),
    /// Ledger snapshot failed.
    #[error("ledger: {0}")]
    Ledger(#[from] LedgerError),
    /// Persistence failed.
    #[error("store: {0}")]
    Store(#[from] StoreError),
    /// Round manager lock poisoned.
    #[error("round lock poisoned")]
    Poisoned,
}

/// Persistence seam for rounds.
pub trait RoundStore: Send + Sync {
    /// Persist durably; returns only after the write is on disk.
    fn save_round(&self, round: &Round) -> Result<(), StoreError>;
    /// Load round `n`.
    fn get_round(&self, n: u64) -> Result<Option<Round>, StoreError>;
    /// Remove all rounds.
    fn truncate_rounds(&self) -> Result<(), StoreError>;
}

/// Orchestrates ranking and persistence at round boundaries.
pub struct RoundManager<S: RoundStore> {
    ledger: Arc<WalletLedger>,
    store: S,
    delegate_count: u64,
    metrics: Arc<Metrics>,
    announce: broadcast::Sender<Round>,
    // Serializes the compare-then-persist step of concurrent computations.
    compute: Mutex<()>,
}

impl<S: RoundStore> RoundManager<S> {
    /// Create a manager over `ledger` with `delegate_count` active slots per round.
    pub fn new(ledger: Arc<WalletLedger>, store: S, delegate_count: u64, metrics: Arc<Metrics>) -> Self {
        let (announce, _) = broadcast::channel(ANNOUNCE_BUFFER);
        Self {
            ledger,
            store,
            delegate_count,
            metrics,
            announce,
            compute: Mutex::new(()),
        }
    }

    /// Active delegates per round.
    pub fn delegate_count(&self) -> u64 {
        self.delegate_count
    }

    /// Receive every round after it has been persisted.
    pub fn subscribe(&self) -> broadcast::Receiver<Round> {
        self.announce.subscribe()
    }

    /// Compute and persist the round containing `height`.
    ///
    /// Meant to be called at round boundaries. Recomputing an already persisted round
    /// returns the stored round when the order is unchanged and `Conflict` otherwise.
    pub fn compute_round(&self, height: u64) -> Result<Round, RoundError> {
        let number =
            Round::number_for_height(height, self.delegate_count).ok_or(RoundError::InvalidHeight)?;
        let _guard = self.compute.lock().map_err(|_| RoundError::Poisoned)?;

        let snapshot = self.ledger.all_delegates_snapshot()?;
        self.metrics.delegates_registered.set(snapshot.len() as i64);
        if (snapshot.len() as u64) < self.delegate_count {
            warn!(
                round = number,
                required = self.delegate_count,
                available = snapshot.len(),
                "not enough delegates to build round"
            );
            return Err(RoundError::InsufficientDelegates {
                required: self.delegate_count,
                available: snapshot.len(),
            });
        }

        let ranking = rank_delegates(&snapshot);
        let round = Round {
            round: number,
            public_keys: active_delegates(&ranking, self.delegate_count as usize),
        };

        if let Some(existing) = self.store.get_round(number)? {
            if existing == round {
                return Ok(existing);
            }
            warn!(round = number, "recomputed round differs from persisted order");
            return Err(RoundError::Conflict(number));
        }

        self.store.save_round(&round)?;

        if let Err(e) = self.ledger.assign_ranks(&ranking) {
            warn!(round = number, error = %e, "failed to write delegate ranks");
        }

        self.metrics.rounds_persisted_total.inc();
        self.metrics.current_round.set(number as i64);
        info!(round = number, height, delegates = round.public_keys.len(), "round persisted");

        // No subscribers is not an error.
        let _ = self.announce.send(round.clone());
        Ok(round)
    }

    /// Hook for block application: at a boundary height, build the round that starts next.
    pub fn on_block_applied(&self, height: u64) -> Result<Option<Round>, RoundError> {
        let rem = height
            .checked_rem(self.delegate_count)
            .ok_or(RoundError::InvalidHeight)?;
        if height == 0 || rem != 0 {
            return Ok(None);
        }
        self.compute_round(height + 1).map(Some)
    }

    /// Make sure the first round exists (fresh chain or after truncation).
    pub fn ensure_first_round(&self) -> Result<Round, RoundError> {
        match self.store.get_round(1)? {
            Some(r) => Ok(r),
            None => self.compute_round(1),
        }
    }

    /// Persisted round `n`.
    pub fn get_round(&self, n: u64) -> Result<Round, RoundError> {
        self.store.get_round(n)?.ok_or(RoundError::NotFound)
    }

    /// Persisted round containing `height`.
    pub fn round_for_height(&self, height: u64) -> Result<Round, RoundError> {
        let n =
            Round::number_for_height(height, self.delegate_count).ok_or(RoundError::InvalidHeight)?;
        self.get_round(n)
    }

    /// Drop every persisted round (chain rebuild).
    pub fn truncate(&self) -> Result<(), RoundError> {
        let _guard = self.compute.lock().map_err(|_| RoundError::Poisoned)?;
        self.store.truncate_rounds()?;
        self.metrics.current_round.set(0);
        info!("rounds truncated");
        Ok(())
    }
}
