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

use stakeforge::core::consensus::ranking::rank_delegates;
use stakeforge::core::state::wallet_ledger::{LedgerError, WalletLedger};
use stakeforge::core::types::{Address, PublicKey};

const VERSION: u8 = 23;

fn key(b: u8) -> PublicKey {
    PublicKey::parse(&format!("02{}", hex::encode([b; 32]))).unwrap()
}

fn funded(ledger: &WalletLedger, b: u8, balance: u64) -> Address {
    let w = ledger.get_or_create_by_public_key(&key(b)).unwrap();
    if balance > 0 {
        ledger.apply_balance_delta(&w.address, balance as i128).unwrap();
    }
    w.address
}

fn delegate(ledger: &WalletLedger, b: u8, name: &str) -> Address {
    let addr = funded(ledger, b, 0);
    ledger.register_delegate(&addr, name).unwrap();
    addr
}

#[test]
fn votes_accumulate_and_reorder_ranking() {
    let ledger = WalletLedger::new(VERSION);
    let d1 = delegate(&ledger, 0xd1, "d1");
    let a = funded(&ledger, 0xa0, 100);
    let b = funded(&ledger, 0xb0, 50);
    ledger.set_vote(&a, Some(key(0xd1))).unwrap();
    ledger.set_vote(&b, Some(key(0xd1))).unwrap();
    assert_eq!(ledger.get(&d1).unwrap().vote_balance, 150);

    let d2 = delegate(&ledger, 0xd2, "d2");
    let c = funded(&ledger, 0xc0, 200);
    ledger.set_vote(&c, Some(key(0xd2))).unwrap();
    assert_eq!(ledger.get(&d2).unwrap().vote_balance, 200);

    let ranked = rank_delegates(&ledger.all_delegates_snapshot().unwrap());
    assert_eq!(ranked[0].public_key, key(0xd2));
    assert_eq!(ranked[1].public_key, key(0xd1));
    ledger.verify_vote_balances().unwrap();
}

#[test]
fn balance_changes_follow_the_vote() {
    let ledger = WalletLedger::new(VERSION);
    let d = delegate(&ledger, 1, "genesis_1");
    let voter = funded(&ledger, 2, 0);
    ledger.set_vote(&voter, Some(key(1))).unwrap();

    ledger.apply_balance_delta(&voter, 500).unwrap();
    assert_eq!(ledger.get(&d).unwrap().vote_balance, 500);
    ledger.apply_balance_delta(&voter, -120).unwrap();
    assert_eq!(ledger.get(&d).unwrap().vote_balance, 380);
    ledger.verify_vote_balances().unwrap();
}

#[test]
fn overdraft_is_rejected_without_side_effects() {
    let ledger = WalletLedger::new(VERSION);
    let d = delegate(&ledger, 1, "d");
    let voter = funded(&ledger, 2, 10);
    ledger.set_vote(&voter, Some(key(1))).unwrap();

    let before = ledger.all_wallets().unwrap();
    assert_eq!(
        ledger.apply_balance_delta(&voter, -11),
        Err(LedgerError::InsufficientBalance)
    );
    assert_eq!(ledger.all_wallets().unwrap(), before);
    assert_eq!(ledger.get(&d).unwrap().vote_balance, 10);
}

#[test]
fn moving_a_vote_moves_the_stake() {
    let ledger = WalletLedger::new(VERSION);
    let d1 = delegate(&ledger, 1, "one");
    let d2 = delegate(&ledger, 2, "two");
    let voter = funded(&ledger, 3, 70);

    ledger.set_vote(&voter, Some(key(1))).unwrap();
    ledger.set_vote(&voter, Some(key(2))).unwrap();
    assert_eq!(ledger.get(&d1).unwrap().vote_balance, 0);
    assert_eq!(ledger.get(&d2).unwrap().vote_balance, 70);

    ledger.set_vote(&voter, None).unwrap();
    assert_eq!(ledger.get(&d2).unwrap().vote_balance, 0);
    ledger.verify_vote_balances().unwrap();
}

#[test]
fn self_vote_counts_own_balance() {
    let ledger = WalletLedger::new(VERSION);
    let d = delegate(&ledger, 1, "selfie");
    ledger.apply_balance_delta(&d, 40).unwrap();
    ledger.set_vote(&d, Some(key(1))).unwrap();
    ledger.apply_balance_delta(&d, 2).unwrap();

    let w = ledger.get(&d).unwrap();
    assert_eq!(w.balance, 42);
    assert_eq!(w.vote_balance, 42);
    ledger.verify_vote_balances().unwrap();
}

#[test]
fn vote_targets_must_be_known_delegates() {
    let ledger = WalletLedger::new(VERSION);
    let voter = funded(&ledger, 3, 5);
    funded(&ledger, 4, 0);

    assert_eq!(
        ledger.set_vote(&voter, Some(key(9))),
        Err(LedgerError::WalletNotFound)
    );
    assert_eq!(
        ledger.set_vote(&voter, Some(key(4))),
        Err(LedgerError::NotDelegate)
    );
    assert_eq!(ledger.get(&voter).unwrap().vote, None);
}

#[test]
fn lookups_report_not_found() {
    let ledger = WalletLedger::new(VERSION);
    assert_eq!(ledger.find_by_public_key(&key(1)), Err(LedgerError::NotFound));
    assert_eq!(ledger.find_by_username("nobody"), Err(LedgerError::NotFound));
    assert_eq!(
        ledger.get(&Address::new("AUnknownAddress")),
        Err(LedgerError::NotFound)
    );
}

#[test]
fn public_key_lookup_uses_derived_address() {
    let ledger = WalletLedger::new(VERSION);
    let w = ledger.get_or_create_by_public_key(&key(7)).unwrap();
    assert_eq!(w.address, Address::from_public_key(&key(7), VERSION));
    assert_eq!(w.address.version(), Some(VERSION));

    let again = ledger.get_or_create_by_public_key(&key(7)).unwrap();
    assert_eq!(again, w);
    assert_eq!(ledger.len().unwrap(), 1);
    assert_eq!(ledger.find_by_public_key(&key(7)).unwrap().address, w.address);
}

#[test]
fn delegate_registration_rules() {
    let ledger = WalletLedger::new(VERSION);
    let keyless = Address::new("AKeylessWallet");
    ledger.get_or_create(&keyless).unwrap();
    assert_eq!(
        ledger.register_delegate(&keyless, "keyless"),
        Err(LedgerError::MissingPublicKey)
    );

    let a = delegate(&ledger, 1, "alpha");
    let b = funded(&ledger, 2, 0);
    assert_eq!(ledger.register_delegate(&a, "beta"), Err(LedgerError::AlreadyDelegate));
    assert_eq!(ledger.register_delegate(&b, "alpha"), Err(LedgerError::UsernameTaken));
    assert_eq!(ledger.register_delegate(&b, "Upper"), Err(LedgerError::InvalidUsername));
    assert_eq!(ledger.register_delegate(&b, ""), Err(LedgerError::InvalidUsername));
    assert_eq!(
        ledger.register_delegate(&b, &"x".repeat(21)),
        Err(LedgerError::InvalidUsername)
    );
    assert_eq!(ledger.find_by_username("alpha").unwrap().address, a);
}

#[test]
fn public_keys_bind_once() {
    let ledger = WalletLedger::new(VERSION);
    let addr = Address::from_public_key(&key(1), VERSION);
    ledger.get_or_create(&addr).unwrap();
    ledger.set_public_key(&addr, key(1)).unwrap();
    ledger.set_public_key(&addr, key(1)).unwrap();
    assert!(matches!(
        ledger.set_public_key(&addr, key(2)),
        Err(LedgerError::InvariantViolation(_))
    ));
    assert_eq!(ledger.find_by_public_key(&key(1)).unwrap().address, addr);

    ledger.set_second_public_key(&addr, key(3)).unwrap();
    assert!(ledger.set_second_public_key(&addr, key(4)).is_err());
}

#[test]
fn keys_bind_only_to_their_derived_address() {
    let ledger = WalletLedger::new(VERSION);
    let foreign = Address::new("not-derived-from-key");
    ledger.get_or_create(&foreign).unwrap();
    assert_eq!(
        ledger.set_public_key(&foreign, key(7)),
        Err(LedgerError::InvariantViolation("address not derived from public key"))
    );

    let mut rebound = ledger.get(&foreign).unwrap();
    rebound.public_key = Some(key(7));
    assert_eq!(
        ledger.reindex(&rebound),
        Err(LedgerError::InvariantViolation("address not derived from public key"))
    );
    assert_eq!(ledger.get(&foreign).unwrap().public_key, None);

    let other_network = Address::from_public_key(&key(7), VERSION + 1);
    ledger.get_or_create(&other_network).unwrap();
    assert!(ledger.set_public_key(&other_network, key(7)).is_err());

    let w = ledger.get_or_create_by_public_key(&key(7)).unwrap();
    assert_eq!(w.address, Address::from_public_key(&key(7), VERSION));

    let mut forged = stakeforge::core::types::Wallet::new(Address::new("forged"));
    forged.public_key = Some(key(8));
    assert!(matches!(
        WalletLedger::from_wallets(vec![forged], VERSION),
        Err(LedgerError::InvariantViolation(_))
    ));
}

#[test]
fn extreme_deltas_fail_without_poisoning_the_ledger() {
    let ledger = WalletLedger::new(VERSION);
    let d = delegate(&ledger, 1, "big");
    let voter = funded(&ledger, 2, 5);
    ledger.set_vote(&voter, Some(key(1))).unwrap();

    assert_eq!(
        ledger.apply_balance_delta(&voter, i128::MAX),
        Err(LedgerError::BalanceOverflow)
    );
    assert_eq!(
        ledger.apply_balance_delta(&voter, i128::MIN),
        Err(LedgerError::InsufficientBalance)
    );
    assert_eq!(
        ledger.apply_balance_delta(&voter, u64::MAX as i128),
        Err(LedgerError::BalanceOverflow)
    );

    assert_eq!(ledger.get(&voter).unwrap().balance, 5);
    assert_eq!(ledger.get(&d).unwrap().vote_balance, 5);
    ledger.apply_balance_delta(&voter, 10).unwrap();
    assert_eq!(ledger.get(&d).unwrap().vote_balance, 15);
    ledger.verify_vote_balances().unwrap();
}

#[test]
fn reindex_accepts_metadata_only() {
    let ledger = WalletLedger::new(VERSION);
    let d = delegate(&ledger, 1, "meta");

    let mut w = ledger.get(&d).unwrap();
    w.produced_blocks = 12;
    w.rank = Some(3);
    ledger.reindex(&w).unwrap();
    assert_eq!(ledger.get(&d).unwrap().produced_blocks, 12);

    let mut stake = w.clone();
    stake.balance += 1;
    assert!(matches!(ledger.reindex(&stake), Err(LedgerError::InvariantViolation(_))));

    let mut renamed = w.clone();
    renamed.username = Some("other".into());
    assert!(matches!(ledger.reindex(&renamed), Err(LedgerError::InvariantViolation(_))));

    let mut rekeyed = w;
    rekeyed.public_key = Some(key(2));
    assert!(matches!(ledger.reindex(&rekeyed), Err(LedgerError::InvariantViolation(_))));

    assert_eq!(
        ledger.reindex(&stakeforge::core::types::Wallet::new(Address::new("AMissing"))),
        Err(LedgerError::WalletNotFound)
    );
}

#[test]
fn block_counters_and_ranks_land_on_delegates() {
    let ledger = WalletLedger::new(VERSION);
    let d1 = delegate(&ledger, 1, "one");
    let d2 = delegate(&ledger, 2, "two");
    let v = funded(&ledger, 3, 9);
    ledger.set_vote(&v, Some(key(2))).unwrap();

    ledger.record_produced_block(&key(1)).unwrap();
    ledger.record_missed_block(&key(1)).unwrap();
    ledger.record_missed_block(&key(1)).unwrap();

    let ranking = rank_delegates(&ledger.all_delegates_snapshot().unwrap());
    ledger.assign_ranks(&ranking).unwrap();

    let w1 = ledger.get(&d1).unwrap();
    assert_eq!((w1.produced_blocks, w1.missed_blocks), (1, 2));
    assert_eq!(w1.rank, Some(2));
    assert_eq!(ledger.get(&d2).unwrap().rank, Some(1));
}

#[test]
fn rebuild_checks_invariants() {
    let ledger = WalletLedger::new(VERSION);
    delegate(&ledger, 1, "one");
    let v = funded(&ledger, 2, 30);
    ledger.set_vote(&v, Some(key(1))).unwrap();

    let wallets = ledger.all_wallets().unwrap();
    let rebuilt = WalletLedger::from_wallets(wallets.clone(), VERSION).unwrap();
    assert_eq!(rebuilt.all_wallets().unwrap(), wallets);

    let mut skewed = wallets;
    for w in skewed.iter_mut() {
        if w.username.is_some() {
            w.vote_balance += 1;
        }
    }
    assert!(matches!(
        WalletLedger::from_wallets(skewed, VERSION),
        Err(LedgerError::InvariantViolation(_))
    ));
}
