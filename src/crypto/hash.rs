//! Cryptographic hashing utilities for the ledger
//!
//! Block hashes and signing digests are both computed over the canonical
//! JSON encoding of their inputs, so every node derives identical digests
//! for identical data.

use serde::Serialize;
use sha2::{Digest, Sha256};

/// Computes SHA-256 hash of the input data
pub fn sha256(data: &[u8]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().to_vec()
}

/// Computes SHA-256 hash and returns it as a hex string
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(sha256(data))
}

/// Canonical JSON encoding of a value.
///
/// Struct fields serialize in declaration order and maps are `BTreeMap`s,
/// so the encoding is stable across nodes. Ledger types contain only string
/// keyed maps, which `serde_json` always accepts.
pub fn canonical_json<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_default()
}

/// Digest over an ordered list of already-canonicalized fields
pub fn crypto_hash<S: AsRef<str>>(parts: &[S]) -> String {
    let joined = parts
        .iter()
        .map(|p| p.as_ref())
        .collect::<Vec<_>>()
        .join(" ");
    sha256_hex(joined.as_bytes())
}

/// Checks if a hash meets the difficulty target
/// The hash must have `difficulty` leading zero bits
pub fn meets_difficulty(hash: &[u8], difficulty: u32) -> bool {
    let required_zeros = difficulty as usize / 8;
    let remaining_bits = difficulty as usize % 8;

    if required_zeros > hash.len() || (required_zeros == hash.len() && remaining_bits > 0) {
        return false;
    }

    // Check full zero bytes
    for byte in hash.iter().take(required_zeros) {
        if *byte != 0 {
            return false;
        }
    }

    // Check remaining bits
    if remaining_bits > 0 {
        let mask = 0xFFu8 << (8 - remaining_bits);
        if hash[required_zeros] & mask != 0 {
            return false;
        }
    }

    true
}

/// Same check as [`meets_difficulty`] for a hex-encoded hash.
/// Anything that is not valid hex never meets a target.
pub fn hex_meets_difficulty(hash: &str, difficulty: u32) -> bool {
    match hex::decode(hash) {
        Ok(bytes) => meets_difficulty(&bytes, difficulty),
        Err(_) => false,
    }
}
