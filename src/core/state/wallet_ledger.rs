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

//! Authoritative in-memory wallet store: balances, votes, delegate registration, rank.
//!
//! Every mutation runs inside one critical section and validates all affected wallets
//! before writing any of them, so a failed operation leaves the ledger untouched.
//!
//! Invariant: for every delegate `D`,
//! `D.vote_balance == sum(w.balance for w where w.vote == D.public_key)`.

use crate::core::consensus::ranking::RankedDelegate;
use crate::core::types::{Address, PublicKey, Wallet};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;
use tracing::{debug, warn};

/// Max delegate username length.
pub const MAX_USERNAME_LEN: usize = 20;

/// Ledger errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LedgerError {
    /// Debit would take the balance below zero.
    #[error("insufficient balance")]
    InsufficientBalance,
    /// A referenced wallet is not tracked.
    #[error("wallet not found")]
    WalletNotFound,
    /// Lookup miss.
    #[error("not found")]
    NotFound,
    /// Vote target is not a registered delegate.
    #[error("wallet is not a delegate")]
    NotDelegate,
    /// Delegate registration needs a bound public key.
    #[error("wallet has no public key")]
    MissingPublicKey,
    /// Public key already bound to another wallet.
    #[error("public key already in use")]
    PublicKeyTaken,
    /// Username already registered.
    #[error("username already in use")]
    UsernameTaken,
    /// Username fails the naming rules.
    #[error("invalid username")]
    InvalidUsername,
    /// Wallet is already a delegate.
    #[error("wallet is already a delegate")]
    AlreadyDelegate,
    /// Operation would break a ledger invariant.
    #[error("ledger invariant violation: {0}")]
    InvariantViolation(&'static str),
    /// Arithmetic overflow on a balance.
    #[error("balance overflow")]
    BalanceOverflow,
    /// Lock poisoned by a panicking writer.
    #[error("ledger lock poisoned")]
    Poisoned,
}

/// One registered delegate as seen by a snapshot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DelegateEntry {
    /// Delegate public key.
    pub public_key: PublicKey,
    /// Registered username.
    pub username: String,
    /// Wallet address.
    pub address: Address,
    /// Aggregate stake of its voters.
    pub vote_balance: u64,
    /// Rank from the previous ranking, if any.
    pub rank: Option<u32>,
}

/// Point-in-time view of all registered delegates, ordered by public key.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DelegateSnapshot {
    entries: Vec<DelegateEntry>,
}

impl DelegateSnapshot {
    /// Build from arbitrary entries (sorted by public key).
    pub fn new(mut entries: Vec<DelegateEntry>) -> Self {
        entries.sort_by(|a, b| a.public_key.cmp(&b.public_key));
        Self { entries }
    }

    /// Entries ordered by public key.
    pub fn entries(&self) -> &[DelegateEntry] {
        &self.entries
    }

    /// Number of delegates.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no delegate is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Default)]
struct LedgerInner {
    wallets: BTreeMap<Address, Wallet>,
    by_public_key: HashMap<PublicKey, Address>,
    by_username: HashMap<String, Address>,
}

impl LedgerInner {
    fn wallet(&self, address: &Address) -> Result<&Wallet, LedgerError> {
        self.wallets.get(address).ok_or(LedgerError::WalletNotFound)
    }

    fn delegate_address(&self, key: &PublicKey) -> Result<&Address, LedgerError> {
        self.by_public_key.get(key).ok_or(LedgerError::WalletNotFound)
    }

    fn index(&mut self, w: &Wallet) {
        if let Some(pk) = w.public_key.as_ref() {
            self.by_public_key.insert(pk.clone(), w.address.clone());
        }
        if let Some(u) = w.username.as_ref() {
            self.by_username.insert(u.clone(), w.address.clone());
        }
    }

    fn set_vote_balance(&mut self, address: &Address, vb: u64) {
        if let Some(d) = self.wallets.get_mut(address) {
            d.vote_balance = vb;
        }
    }

    fn delegates(&self) -> Result<DelegateSnapshot, LedgerError> {
        let mut entries = Vec::with_capacity(self.by_username.len());
        for addr in self.by_username.values() {
            let w = self.wallet(addr)?;
            let (Some(pk), Some(username)) = (w.public_key.clone(), w.username.clone()) else {
                return Err(LedgerError::InvariantViolation("delegate without public key"));
            };
            entries.push(DelegateEntry {
                public_key: pk,
                username,
                address: w.address.clone(),
                vote_balance: w.vote_balance,
                rank: w.rank,
            });
        }
        Ok(DelegateSnapshot::new(entries))
    }

    fn verify(&self) -> Result<(), LedgerError> {
        let mut expected: HashMap<&PublicKey, u128> = HashMap::new();
        for w in self.wallets.values() {
            if let Some(target) = w.vote.as_ref() {
                let addr = self
                    .by_public_key
                    .get(target)
                    .ok_or(LedgerError::InvariantViolation("vote for unknown wallet"))?;
                let d = self.wallet(addr)?;
                if !d.is_delegate() {
                    return Err(LedgerError::InvariantViolation("vote for non-delegate"));
                }
                *expected.entry(target).or_insert(0) += w.balance as u128;
            }
        }
        for w in self.wallets.values() {
            let want = w
                .public_key
                .as_ref()
                .and_then(|pk| expected.get(pk).copied())
                .unwrap_or(0);
            if w.vote_balance as u128 != want {
                return Err(LedgerError::InvariantViolation("vote balance mismatch"));
            }
        }
        Ok(())
    }
}

fn valid_username(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_USERNAME_LEN
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || "!@$&_.".contains(c))
}

/// Shared wallet store with a single-writer critical section.
pub struct WalletLedger {
    inner: Mutex<LedgerInner>,
    address_version: u8,
}

impl WalletLedger {
    /// Empty ledger for the network identified by `address_version`.
    pub fn new(address_version: u8) -> Self {
        Self {
            inner: Mutex::new(LedgerInner::default()),
            address_version,
        }
    }

    /// Rebuild from persisted wallets, checking uniqueness and the vote-balance invariant.
    pub fn from_wallets(
        wallets: impl IntoIterator<Item = Wallet>,
        address_version: u8,
    ) -> Result<Self, LedgerError> {
        let mut inner = LedgerInner::default();
        for w in wallets {
            if let Some(pk) = w.public_key.as_ref() {
                if Address::from_public_key(pk, address_version) != w.address {
                    return Err(LedgerError::InvariantViolation(
                        "address not derived from public key",
                    ));
                }
                if inner.by_public_key.contains_key(pk) {
                    return Err(LedgerError::PublicKeyTaken);
                }
            }
            if let Some(u) = w.username.as_ref() {
                if inner.by_username.contains_key(u) {
                    return Err(LedgerError::UsernameTaken);
                }
                if w.public_key.is_none() {
                    return Err(LedgerError::MissingPublicKey);
                }
            }
            inner.index(&w);
            inner.wallets.insert(w.address.clone(), w);
        }
        if let Err(e) = inner.verify() {
            warn!(error = %e, "persisted wallets fail ledger invariants");
            return Err(e);
        }
        Ok(Self {
            inner: Mutex::new(inner),
            address_version,
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, LedgerInner>, LedgerError> {
        self.inner.lock().map_err(|_| LedgerError::Poisoned)
    }

    fn check_derived(&self, address: &Address, key: &PublicKey) -> Result<(), LedgerError> {
        if Address::from_public_key(key, self.address_version) != *address {
            return Err(LedgerError::InvariantViolation("address not derived from public key"));
        }
        Ok(())
    }

    /// Address version byte used for key-derived addresses.
    pub fn address_version(&self) -> u8 {
        self.address_version
    }

    /// Return the wallet at `address`, creating an empty one if absent.
    pub fn get_or_create(&self, address: &Address) -> Result<Wallet, LedgerError> {
        let mut g = self.lock()?;
        let w = g
            .wallets
            .entry(address.clone())
            .or_insert_with(|| Wallet::new(address.clone()));
        Ok(w.clone())
    }

    /// Return the wallet owning `key`, creating it at the derived address if absent.
    pub fn get_or_create_by_public_key(&self, key: &PublicKey) -> Result<Wallet, LedgerError> {
        let mut g = self.lock()?;
        if let Some(addr) = g.by_public_key.get(key) {
            return Ok(g.wallet(addr)?.clone());
        }
        let address = Address::from_public_key(key, self.address_version);
        let w = g
            .wallets
            .entry(address.clone())
            .or_insert_with(|| Wallet::new(address.clone()));
        if w.public_key.is_some() {
            return Err(LedgerError::InvariantViolation("derived address bound to another key"));
        }
        w.public_key = Some(key.clone());
        let out = w.clone();
        g.by_public_key.insert(key.clone(), address);
        Ok(out)
    }

    /// Wallet at `address`.
    pub fn get(&self, address: &Address) -> Result<Wallet, LedgerError> {
        let g = self.lock()?;
        g.wallets.get(address).cloned().ok_or(LedgerError::NotFound)
    }

    /// Wallet owning `key`.
    pub fn find_by_public_key(&self, key: &PublicKey) -> Result<Wallet, LedgerError> {
        let g = self.lock()?;
        let addr = g.by_public_key.get(key).ok_or(LedgerError::NotFound)?;
        g.wallets.get(addr).cloned().ok_or(LedgerError::NotFound)
    }

    /// Delegate wallet registered as `name`.
    pub fn find_by_username(&self, name: &str) -> Result<Wallet, LedgerError> {
        let g = self.lock()?;
        let addr = g.by_username.get(name).ok_or(LedgerError::NotFound)?;
        g.wallets.get(addr).cloned().ok_or(LedgerError::NotFound)
    }

    /// Bind the public key of a wallet. Rebinding the same key is a no-op.
    pub fn set_public_key(&self, address: &Address, key: PublicKey) -> Result<Wallet, LedgerError> {
        let mut g = self.lock()?;
        let w = g.wallet(address)?;
        match w.public_key.as_ref() {
            Some(k) if *k == key => return Ok(w.clone()),
            Some(_) => return Err(LedgerError::InvariantViolation("public key is immutable")),
            None => {}
        }
        self.check_derived(address, &key)?;
        if g.by_public_key.contains_key(&key) {
            return Err(LedgerError::PublicKeyTaken);
        }
        g.by_public_key.insert(key.clone(), address.clone());
        let w = g.wallets.get_mut(address).ok_or(LedgerError::WalletNotFound)?;
        w.public_key = Some(key);
        Ok(w.clone())
    }

    /// Register a second signature key; can be set once.
    pub fn set_second_public_key(
        &self,
        address: &Address,
        key: PublicKey,
    ) -> Result<Wallet, LedgerError> {
        let mut g = self.lock()?;
        let w = g.wallets.get_mut(address).ok_or(LedgerError::WalletNotFound)?;
        if w.second_public_key.is_some() {
            return Err(LedgerError::InvariantViolation("second public key already set"));
        }
        w.second_public_key = Some(key);
        Ok(w.clone())
    }

    /// Register the wallet as a delegate under `username`.
    pub fn register_delegate(&self, address: &Address, username: &str) -> Result<Wallet, LedgerError> {
        if !valid_username(username) {
            return Err(LedgerError::InvalidUsername);
        }
        let mut g = self.lock()?;
        let w = g.wallet(address)?;
        if w.public_key.is_none() {
            return Err(LedgerError::MissingPublicKey);
        }
        if w.is_delegate() {
            return Err(LedgerError::AlreadyDelegate);
        }
        if g.by_username.contains_key(username) {
            return Err(LedgerError::UsernameTaken);
        }
        g.by_username.insert(username.to_string(), address.clone());
        let w = g.wallets.get_mut(address).ok_or(LedgerError::WalletNotFound)?;
        w.username = Some(username.to_string());
        debug!(address = %address, username, "delegate registered");
        Ok(w.clone())
    }

    /// Credit (positive) or debit (negative) a wallet, carrying the change to the
    /// delegate it votes for.
    pub fn apply_balance_delta(&self, address: &Address, delta: i128) -> Result<Wallet, LedgerError> {
        let mut g = self.lock()?;
        let w = g.wallet(address)?;

        let balance = (w.balance as i128)
            .checked_add(delta)
            .ok_or(LedgerError::BalanceOverflow)?;
        if balance < 0 {
            return Err(LedgerError::InsufficientBalance);
        }
        let balance = u64::try_from(balance).map_err(|_| LedgerError::BalanceOverflow)?;

        let delegate = match w.vote.as_ref() {
            None => None,
            Some(pk) => {
                let d_addr = g.delegate_address(pk)?.clone();
                // Self-votes see the balance as it was before this delta.
                let d = g.wallet(&d_addr)?;
                let vb = (d.vote_balance as i128)
                    .checked_add(delta)
                    .ok_or(LedgerError::BalanceOverflow)?;
                if vb < 0 {
                    return Err(LedgerError::InvariantViolation("negative vote balance"));
                }
                let vb = u64::try_from(vb).map_err(|_| LedgerError::BalanceOverflow)?;
                Some((d_addr, vb))
            }
        };

        if let Some(w) = g.wallets.get_mut(address) {
            w.balance = balance;
        }
        if let Some((d_addr, vb)) = delegate {
            g.set_vote_balance(&d_addr, vb);
        }
        g.wallet(address).cloned()
    }

    /// Move this wallet's vote to `target` (or withdraw it with `None`).
    pub fn set_vote(&self, address: &Address, target: Option<PublicKey>) -> Result<Wallet, LedgerError> {
        let mut g = self.lock()?;
        let w = g.wallet(address)?;
        if w.vote == target {
            return Ok(w.clone());
        }
        let stake = w.balance;

        let old = match w.vote.as_ref() {
            None => None,
            Some(pk) => {
                let d_addr = g.delegate_address(pk)?.clone();
                let d = g.wallet(&d_addr)?;
                let vb = d
                    .vote_balance
                    .checked_sub(stake)
                    .ok_or(LedgerError::InvariantViolation("negative vote balance"))?;
                Some((d_addr, vb))
            }
        };

        let new = match target.as_ref() {
            None => None,
            Some(pk) => {
                let d_addr = g.delegate_address(pk)?.clone();
                let d = g.wallet(&d_addr)?;
                if !d.is_delegate() {
                    return Err(LedgerError::NotDelegate);
                }
                let vb = d
                    .vote_balance
                    .checked_add(stake)
                    .ok_or(LedgerError::BalanceOverflow)?;
                Some((d_addr, vb))
            }
        };

        if let Some((a, vb)) = old {
            g.set_vote_balance(&a, vb);
        }
        if let Some((a, vb)) = new {
            g.set_vote_balance(&a, vb);
        }
        let w = g.wallets.get_mut(address).ok_or(LedgerError::WalletNotFound)?;
        w.vote = target;
        Ok(w.clone())
    }

    /// Store externally mutated metadata (rank, counters, keys) and refresh lookups.
    ///
    /// Balances, votes and vote balances are owned by the ledger operations and must match
    /// the tracked wallet; bound public keys and usernames cannot change.
    pub fn reindex(&self, wallet: &Wallet) -> Result<(), LedgerError> {
        let mut g = self.lock()?;
        let tracked = g.wallet(&wallet.address)?;

        if tracked.balance != wallet.balance
            || tracked.vote != wallet.vote
            || tracked.vote_balance != wallet.vote_balance
        {
            return Err(LedgerError::InvariantViolation("reindex cannot change stake"));
        }
        if tracked.public_key.is_some() && tracked.public_key != wallet.public_key {
            return Err(LedgerError::InvariantViolation("public key is immutable"));
        }
        if tracked.username.is_some() && tracked.username != wallet.username {
            return Err(LedgerError::InvariantViolation("username is immutable"));
        }
        if tracked.public_key.is_none() {
            if let Some(pk) = wallet.public_key.as_ref() {
                self.check_derived(&wallet.address, pk)?;
                if g.by_public_key.contains_key(pk) {
                    return Err(LedgerError::PublicKeyTaken);
                }
            }
        }
        if tracked.username.is_none() {
            if let Some(u) = wallet.username.as_ref() {
                if !valid_username(u) {
                    return Err(LedgerError::InvalidUsername);
                }
                if wallet.public_key.is_none() {
                    return Err(LedgerError::MissingPublicKey);
                }
                if g.by_username.contains_key(u) {
                    return Err(LedgerError::UsernameTaken);
                }
            }
        }

        g.index(wallet);
        g.wallets.insert(wallet.address.clone(), wallet.clone());
        Ok(())
    }

    /// Write ranks from a ranking back to the delegate wallets (all or nothing).
    pub fn assign_ranks(&self, ranking: &[RankedDelegate]) -> Result<(), LedgerError> {
        let mut g = self.lock()?;
        let mut targets = Vec::with_capacity(ranking.len());
        for r in ranking {
            let addr = g.delegate_address(&r.public_key)?.clone();
            targets.push((addr, r.rank));
        }
        for (addr, rank) in targets {
            if let Some(w) = g.wallets.get_mut(&addr) {
                w.rank = Some(rank);
            }
        }
        Ok(())
    }

    /// Count a forged block for the delegate owning `key`.
    pub fn record_produced_block(&self, key: &PublicKey) -> Result<(), LedgerError> {
        let mut g = self.lock()?;
        let addr = g.delegate_address(key)?.clone();
        let w = g.wallets.get_mut(&addr).ok_or(LedgerError::WalletNotFound)?;
        w.produced_blocks = w.produced_blocks.saturating_add(1);
        Ok(())
    }

    /// Count a missed slot for the delegate owning `key`.
    pub fn record_missed_block(&self, key: &PublicKey) -> Result<(), LedgerError> {
        let mut g = self.lock()?;
        let addr = g.delegate_address(key)?.clone();
        let w = g.wallets.get_mut(&addr).ok_or(LedgerError::WalletNotFound)?;
        w.missed_blocks = w.missed_blocks.saturating_add(1);
        Ok(())
    }

    /// Consistent view of all registered delegates, taken under the writer lock.
    pub fn all_delegates_snapshot(&self) -> Result<DelegateSnapshot, LedgerError> {
        self.lock()?.delegates()
    }

    /// Delegate snapshot and every wallet, read in the same critical section.
    pub fn snapshot_with_wallets(&self) -> Result<(DelegateSnapshot, Vec<Wallet>), LedgerError> {
        let g = self.lock()?;
        Ok((g.delegates()?, g.wallets.values().cloned().collect()))
    }

    /// Copy of every tracked wallet, ordered by address.
    pub fn all_wallets(&self) -> Result<Vec<Wallet>, LedgerError> {
        let g = self.lock()?;
        Ok(g.wallets.values().cloned().collect())
    }

    /// Number of tracked wallets.
    pub fn len(&self) -> Result<usize, LedgerError> {
        Ok(self.lock()?.wallets.len())
    }

    /// True when no wallet is tracked.
    pub fn is_empty(&self) -> Result<bool, LedgerError> {
        Ok(self.lock()?.wallets.is_empty())
    }

    /// Recompute every vote balance from scratch and compare.
    pub fn verify_vote_balances(&self) -> Result<(), LedgerError> {
        self.lock()?.verify()
    }
}
