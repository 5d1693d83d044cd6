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

//! Print the wallet address for a public key: `addrgen <pubkey-hex> [version]`.

use anyhow::{bail, Context, Result};
use stakeforge::core::types::{Address, PublicKey};

fn main() -> Result<()> {
    let Some(raw) = std::env::args().nth(1) else {
        bail!("usage: addrgen <pubkey-hex> [address-version]");
    };
    let version = match std::env::args().nth(2) {
        Some(v) => v.parse::<u8>().context("address version must be 0..=255")?,
        None => 23,
    };
    let Some(pk) = PublicKey::parse(&raw) else {
        bail!("public key must be 33 bytes of hex");
    };
    println!("{}", Address::from_public_key(&pk, version));
    Ok(())
}
