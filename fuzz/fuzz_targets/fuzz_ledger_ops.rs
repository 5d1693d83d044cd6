// Copyright (c) 2026 Stakeforge
// Licensed under the Apache-2.0 License.

#![no_main]
#![forbid(unsafe_code)]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use stakeforge::core::state::wallet_ledger::WalletLedger;
use stakeforge::core::types::PublicKey;

#[derive(Debug, Arbitrary)]
enum Op {
    Delta(u8, i64),
    Vote(u8, Option<u8>),
    Register(u8),
}

fn key(b: u8) -> Option<PublicKey> {
    PublicKey::parse(&format!("02{}", hex::encode([b % 8; 32])))
}

fuzz_target!(|ops: Vec<Op>| {
    let ledger = WalletLedger::new(23);
    for op in ops {
        let _ = match op {
            Op::Delta(w, d) => key(w)
                .and_then(|k| ledger.get_or_create_by_public_key(&k).ok())
                .map(|wal| ledger.apply_balance_delta(&wal.address, d as i128)),
            Op::Vote(w, t) => key(w)
                .and_then(|k| ledger.get_or_create_by_public_key(&k).ok())
                .map(|wal| ledger.set_vote(&wal.address, t.and_then(key))),
            Op::Register(w) => key(w)
                .and_then(|k| ledger.get_or_create_by_public_key(&k).ok())
                .map(|wal| ledger.register_delegate(&wal.address, &format!("d{}", w % 8))),
        };
        assert!(ledger.verify_vote_balances().is_ok());
    }
});
