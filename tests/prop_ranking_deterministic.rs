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

use proptest::prelude::*;
use stakeforge::core::consensus::ranking::{active_delegates, rank_delegates};
use stakeforge::core::state::wallet_ledger::{DelegateEntry, DelegateSnapshot};
use stakeforge::core::types::{Address, PublicKey};
use std::collections::BTreeMap;

fn entries(balances: &BTreeMap<[u8; 32], u64>) -> Vec<DelegateEntry> {
    balances
        .iter()
        .enumerate()
        .map(|(i, (k, vb))| {
            let pk = PublicKey::parse(&format!("02{}", hex::encode(k))).unwrap();
            DelegateEntry {
                address: Address::from_public_key(&pk, 23),
                username: format!("d{i}"),
                public_key: pk,
                vote_balance: *vb,
                rank: None,
            }
        })
        .collect()
}

proptest! {
    #[test]
    fn prop_ranking_ignores_input_order(
        balances in prop::collection::btree_map(any::<[u8; 32]>(), 0u64..5, 1..40),
        seed in any::<u64>(),
    ) {
        let base = entries(&balances);
        let mut shuffled = base.clone();
        // Deterministic permutation driven by the seed.
        let n = shuffled.len();
        let mut s = seed;
        for i in (1..n).rev() {
            s = s.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            shuffled.swap(i, (s >> 33) as usize % (i + 1));
        }

        let a = rank_delegates(&DelegateSnapshot::new(base));
        let b = rank_delegates(&DelegateSnapshot::new(shuffled));
        prop_assert_eq!(&a, &b);

        for (i, r) in a.iter().enumerate() {
            prop_assert_eq!(r.rank as usize, i + 1);
        }
        for w in a.windows(2) {
            prop_assert!(
                w[0].vote_balance > w[1].vote_balance
                    || (w[0].vote_balance == w[1].vote_balance && w[0].public_key < w[1].public_key)
            );
        }

        let top = active_delegates(&a, 5);
        prop_assert_eq!(top.len(), n.min(5));
    }
}
