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

//! Delegate ranking.
//!
//! Order: vote balance descending, then public key ascending. The order is total, so
//! every node derives the same ranking from the same snapshot regardless of input order.

use crate::core::state::wallet_ledger::DelegateSnapshot;
use crate::core::types::PublicKey;
use std::cmp::Ordering;

/// A delegate with its position in the ranking.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RankedDelegate {
    /// 1-based rank.
    pub rank: u32,
    /// Delegate public key.
    pub public_key: PublicKey,
    /// Vote balance the rank was computed from.
    pub vote_balance: u64,
}

fn forging_order(a: (&PublicKey, u64), b: (&PublicKey, u64)) -> Ordering {
    b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0))
}

/// Rank every delegate in `snapshot`.
pub fn rank_delegates(snapshot: &DelegateSnapshot) -> Vec<RankedDelegate> {
    let mut order: Vec<(&PublicKey, u64)> = snapshot
        .entries()
        .iter()
        .map(|e| (&e.public_key, e.vote_balance))
        .collect();
    order.sort_by(|a, b| forging_order(*a, *b));

    order
        .into_iter()
        .enumerate()
        .map(|(i, (pk, vb))| RankedDelegate {
            rank: u32::try_from(i + 1).unwrap_or(u32::MAX),
            public_key: pk.clone(),
            vote_balance: vb,
        })
        .collect()
}

/// Public keys of the top `n` delegates in forging order.
pub fn active_delegates(ranking: &[RankedDelegate], n: usize) -> Vec<PublicKey> {
    ranking.iter().take(n).map(|r| r.public_key.clone()).collect()
}
