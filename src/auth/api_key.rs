// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Integrator API keys.
//!
//! Only the SHA-256 of a key is stored. The same hash keys the HMAC on
//! webhook bodies, so integrators verify signatures with `sha256(raw_key)`.

use sha2::{Digest, Sha256};
use uuid::Uuid;

/// A fresh random key (UUID v4, simple form: 32 hex characters).
pub fn generate_api_key() -> String {
    Uuid::new_v4().simple().to_string()
}

pub fn hash_api_key(raw: &str) -> [u8; 32] {
    Sha256::digest(raw.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_unique_hex() {
        let a = generate_api_key();
        let b = generate_api_key();
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn hash_is_plain_sha256() {
        assert_eq!(
            hex::encode(hash_api_key("abc")),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
