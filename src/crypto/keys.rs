//! ECDSA key management for the ledger
//!
//! Provides key pair generation, signing, and verification using
//! the secp256k1 elliptic curve. A wallet's address is its compressed
//! public key in hex, so verification needs nothing but the address.

use rand::rngs::OsRng;
use secp256k1::{ecdsa::Signature, Message, PublicKey, Secp256k1, SecretKey};
use serde::Serialize;
use thiserror::Error;

use super::hash::{canonical_json, sha256};

/// Errors that can occur during key operations
#[derive(Error, Debug)]
pub enum KeyError {
    #[error("Invalid private key")]
    InvalidPrivateKey,
    #[error("Invalid public key")]
    InvalidPublicKey,
    #[error("Invalid signature")]
    InvalidSignature,
    #[error("Secp256k1 error: {0}")]
    Secp256k1Error(#[from] secp256k1::Error),
}

/// A key pair consisting of a private key and its corresponding public key
#[derive(Clone)]
pub struct KeyPair {
    pub secret_key: SecretKey,
    pub public_key: PublicKey,
}

impl KeyPair {
    /// Generate a new random key pair
    pub fn generate() -> Self {
        let secp = Secp256k1::new();
        let (secret_key, public_key) = secp.generate_keypair(&mut OsRng);
        Self {
            secret_key,
            public_key,
        }
    }

    /// Create a key pair from an existing secret key
    pub fn from_secret_key(secret_key: SecretKey) -> Self {
        let secp = Secp256k1::new();
        let public_key = PublicKey::from_secret_key(&secp, &secret_key);
        Self {
            secret_key,
            public_key,
        }
    }

    /// Create a key pair from a hex-encoded private key
    pub fn from_private_key_hex(hex_key: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(hex_key).map_err(|_| KeyError::InvalidPrivateKey)?;
        let secret_key =
            SecretKey::from_slice(&bytes).map_err(|_| KeyError::InvalidPrivateKey)?;
        Ok(Self::from_secret_key(secret_key))
    }

    /// Get the private key as a hex string
    pub fn private_key_hex(&self) -> String {
        hex::encode(self.secret_key.secret_bytes())
    }

    /// Ledger address: the compressed public key as hex
    pub fn address(&self) -> String {
        hex::encode(self.public_key.serialize())
    }

    /// Sign the canonical encoding of `data`, returning a hex signature
    pub fn sign_data<T: Serialize + ?Sized>(&self, data: &T) -> Result<String, KeyError> {
        let digest = sha256(canonical_json(data).as_bytes());
        let signature = sign_message(&self.secret_key, &digest)?;
        Ok(hex::encode(signature))
    }
}

/// Parse a public key from hex string
pub fn public_key_from_hex(hex_key: &str) -> Result<PublicKey, KeyError> {
    let bytes = hex::decode(hex_key).map_err(|_| KeyError::InvalidPublicKey)?;
    PublicKey::from_slice(&bytes).map_err(|_| KeyError::InvalidPublicKey)
}

/// Sign a 32-byte digest with a secret key
pub fn sign_message(secret_key: &SecretKey, digest: &[u8]) -> Result<Vec<u8>, KeyError> {
    let secp = Secp256k1::new();
    let message = Message::from_digest_slice(digest)?;
    let signature = secp.sign_ecdsa(&message, secret_key);
    Ok(signature.serialize_compact().to_vec())
}

/// Verify a compact signature over a 32-byte digest
pub fn verify_message(
    public_key: &PublicKey,
    digest: &[u8],
    signature: &[u8],
) -> Result<bool, KeyError> {
    let secp = Secp256k1::new();
    let message = Message::from_digest_slice(digest)?;
    let sig = Signature::from_compact(signature).map_err(|_| KeyError::InvalidSignature)?;

    Ok(secp.verify_ecdsa(&message, &sig, public_key).is_ok())
}

/// Verify that `signature` was produced over `data` by the key behind `address`.
///
/// Malformed addresses or signatures verify as `false`.
pub fn verify_signature<T: Serialize + ?Sized>(address: &str, data: &T, signature: &str) -> bool {
    let Ok(public_key) = public_key_from_hex(address) else {
        return false;
    };
    let Ok(signature) = hex::decode(signature) else {
        return false;
    };
    let digest = sha256(canonical_json(data).as_bytes());

    verify_message(&public_key, &digest, &signature).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_key_pair_generation() {
        let kp = KeyPair::generate();
        assert_eq!(kp.private_key_hex().len(), 64);
        // Compressed secp256k1 key: 33 bytes
        assert_eq!(kp.address().len(), 66);
    }

    #[test]
    fn test_sign_and_verify() {
        let kp = KeyPair::generate();
        let data = vec!["foo", "bar"];

        let signature = kp.sign_data(&data).unwrap();
        assert!(verify_signature(&kp.address(), &data, &signature));
    }

    #[test]
    fn test_verify_rejects_other_data() {
        let kp = KeyPair::generate();
        let mut outputs = BTreeMap::new();
        outputs.insert("alice".to_string(), 10u64);
        let signature = kp.sign_data(&outputs).unwrap();

        outputs.insert("alice".to_string(), 11u64);
        assert!(!verify_signature(&kp.address(), &outputs, &signature));
    }

    #[test]
    fn test_verify_rejects_other_signer() {
        let kp = KeyPair::generate();
        let other = KeyPair::generate();
        let signature = other.sign_data("data").unwrap();

        assert!(!verify_signature(&kp.address(), "data", &signature));
    }

    #[test]
    fn test_verify_rejects_malformed_inputs() {
        let kp = KeyPair::generate();
        let signature = kp.sign_data("data").unwrap();

        assert!(!verify_signature("not-a-key", "data", &signature));
        assert!(!verify_signature(&kp.address(), "data", "zz"));
        assert!(!verify_signature(&kp.address(), "data", ""));
    }

    #[test]
    fn test_key_pair_from_hex() {
        let kp1 = KeyPair::generate();
        let private_hex = kp1.private_key_hex();

        let kp2 = KeyPair::from_private_key_hex(&private_hex).unwrap();
        assert_eq!(kp1.address(), kp2.address());
        assert!(KeyPair::from_private_key_hex("beef").is_err());
    }
}
