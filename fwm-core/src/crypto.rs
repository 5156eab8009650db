// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Cryptographic adapters consumed by the store and the DFU handlers.
//!
//! Thin wrappers over the ecosystem primitives so callers deal in plain
//! byte arrays. MAC verification goes through [`hmac_verify`], which is
//! constant-time; never compare MACs with `==`.

use crc::{Crc, CRC_16_XMODEM};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

/// Length of a SHA-256 digest and of an HMAC key.
pub const DIGEST_LEN: usize = 32;

/// A 32-byte HMAC-SHA-256 key. All-zero means "not provisioned".
pub type HmacKey = [u8; DIGEST_LEN];

/// CRC-16/CCITT: polynomial 0x1021, initial value 0, no final XOR.
const CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_XMODEM);

pub fn crc16_ccitt(data: &[u8]) -> u16 {
    CRC16.checksum(data)
}

pub fn sha256(data: &[u8]) -> [u8; DIGEST_LEN] {
    let mut h = Sha256::new();
    h.update(data);
    h.finalize().into()
}

pub fn hmac_sha256(key: &HmacKey, data: &[u8]) -> [u8; DIGEST_LEN] {
    let mut mac = mac_for(key);
    mac.update(data);
    mac.finalize().into_bytes().into()
}

/// Verify `tag` against `HMAC(key, data)` in constant time.
pub fn hmac_verify(key: &HmacKey, data: &[u8], tag: &[u8; DIGEST_LEN]) -> bool {
    let mut mac = mac_for(key);
    mac.update(data);
    mac.verify_slice(tag).is_ok()
}

/// A default (unprovisioned) key is all-zero.
pub fn is_default_key(key: &HmacKey) -> bool {
    key.iter().all(|&b| b == 0)
}

fn mac_for(key: &HmacKey) -> Hmac<Sha256> {
    // A 32-byte key is always a valid HMAC-SHA-256 key.
    match Hmac::<Sha256>::new_from_slice(key) {
        Ok(mac) => mac,
        Err(_) => unreachable!(),
    }
}
