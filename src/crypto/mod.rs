//! Cryptographic utilities for the ledger
//!
//! This module provides:
//! - SHA-256 hashing over canonical JSON
//! - Proof-of-work target checks
//! - ECDSA key management (secp256k1)

pub mod hash;
pub mod keys;

pub use hash::{
    canonical_json, crypto_hash, hex_meets_difficulty, meets_difficulty, sha256, sha256_hex,
};
pub use keys::{
    public_key_from_hex, sign_message, verify_message, verify_signature, KeyError, KeyPair,
};
