// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Pin the primitive variants the on-flash formats depend on.

use fwm_core::crypto::{crc16_ccitt, hmac_sha256, hmac_verify, is_default_key, sha256};

#[test]
fn crc16_is_the_xmodem_variant() {
    // Poly 0x1021, initial value 0, no final XOR.
    assert_eq!(crc16_ccitt(b"123456789"), 0x31C3);
    assert_eq!(crc16_ccitt(b""), 0);
}

#[test]
fn sha256_matches_the_reference_vector() {
    let digest = sha256(b"abc");
    assert_eq!(
        digest[..4],
        [0xba, 0x78, 0x16, 0xbf],
        "SHA-256(\"abc\") prefix mismatch"
    );
    assert_eq!(digest[28..], [0xf2, 0x00, 0x15, 0xad]);
}

#[test]
fn hmac_verify_accepts_only_the_exact_tag() {
    let key = [0x42u8; 32];
    let tag = hmac_sha256(&key, b"payload");
    assert!(hmac_verify(&key, b"payload", &tag));

    let mut first = tag;
    first[0] ^= 0x01;
    assert!(!hmac_verify(&key, b"payload", &first));

    let mut last = tag;
    last[31] ^= 0x80;
    assert!(!hmac_verify(&key, b"payload", &last));

    let other_key = [0x43u8; 32];
    assert!(!hmac_verify(&other_key, b"payload", &tag));
}

#[test]
fn default_key_is_all_zero() {
    assert!(is_default_key(&[0; 32]));
    let mut key = [0u8; 32];
    key[31] = 1;
    assert!(!is_default_key(&key));
}
