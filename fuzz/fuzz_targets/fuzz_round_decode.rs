// Copyright (c) 2026 Stakeforge
// Licensed under the Apache-2.0 License.

#![no_main]
#![forbid(unsafe_code)]

use libfuzzer_sys::fuzz_target;
use stakeforge::core::state::persistent_state::{MAX_ROUND_BYTES, MAX_WALLET_BYTES};
use stakeforge::core::types::{decode_canonical_limited, Round, Wallet};

fuzz_target!(|data: &[u8]| {
    // Stored records must never panic the decoder.
    let _ = decode_canonical_limited::<Round>(data, MAX_ROUND_BYTES);
    let _ = decode_canonical_limited::<Wallet>(data, MAX_WALLET_BYTES);
});
