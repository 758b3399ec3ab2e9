//! Block implementation for the ledger
//!
//! A block links to its predecessor by hash and carries the transactions
//! mined into it. Difficulty is retargeted on every block toward one block
//! per [`MINE_RATE`] milliseconds.

use crate::core::transaction::Transaction;
use crate::crypto::{canonical_json, crypto_hash, hex_meets_difficulty};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

// =============================================================================
// Block Constants
// =============================================================================

/// Target interval between blocks, in milliseconds
pub const MINE_RATE: i64 = 1000;

/// Difficulty of the genesis block
pub const INITIAL_DIFFICULTY: u32 = 3;

/// Previous-hash placeholder of the genesis block
pub const GENESIS_PREVIOUS_HASH: &str = "-----";

/// Hash of the genesis block
pub const GENESIS_HASH: &str = "g3n3515-#45#";

/// A block in the chain
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Block {
    /// Unix milliseconds at which the block was mined
    pub timestamp: i64,
    /// Hash of the previous block
    pub previous_hash: String,
    /// Hash over every other field
    pub hash: String,
    /// Nonce used for proof of work
    pub nonce: u64,
    /// Number of leading zero bits required of `hash`
    pub difficulty: u32,
    /// Transactions mined into this block
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// The genesis block, identical on every node
    pub fn genesis() -> Self {
        Self {
            timestamp: 1,
            previous_hash: GENESIS_PREVIOUS_HASH.to_string(),
            hash: GENESIS_HASH.to_string(),
            nonce: 0,
            difficulty: INITIAL_DIFFICULTY,
            transactions: Vec::new(),
        }
    }

    /// Hash of a block's fields
    pub fn calculate_hash(
        timestamp: i64,
        previous_hash: &str,
        transactions: &[Transaction],
        nonce: u64,
        difficulty: u32,
    ) -> String {
        crypto_hash(&[
            canonical_json(&timestamp),
            canonical_json(previous_hash),
            canonical_json(transactions),
            canonical_json(&nonce),
            canonical_json(&difficulty),
        ])
    }

    /// Difficulty for a block mined at `timestamp` on top of `previous`
    pub fn adjust_difficulty(previous: &Block, timestamp: i64) -> u32 {
        if timestamp - previous.timestamp < MINE_RATE {
            previous.difficulty.saturating_add(1)
        } else {
            previous.difficulty.saturating_sub(1).max(1)
        }
    }

    /// Mine a block on top of `previous`.
    ///
    /// The search has no iteration cap; it ends when a hash meets the target.
    pub fn mine(previous: &Block, transactions: Vec<Transaction>) -> Self {
        let never = CancellationToken::new();
        match Self::search(previous, transactions, &never) {
            Some(block) => block,
            None => unreachable!("mining without a cancellation source cannot be cancelled"),
        }
    }

    /// Mine a block, giving up once `cancel` fires.
    ///
    /// The token is polled before every nonce attempt.
    pub fn mine_with_cancel(
        previous: &Block,
        transactions: Vec<Transaction>,
        cancel: &CancellationToken,
    ) -> Option<Self> {
        Self::search(previous, transactions, cancel)
    }

    fn search(
        previous: &Block,
        transactions: Vec<Transaction>,
        cancel: &CancellationToken,
    ) -> Option<Self> {
        // Serializing the payload once keeps the inner loop cheap
        let previous_hash = canonical_json(previous.hash.as_str());
        let payload = canonical_json(&transactions);
        let mut nonce: u64 = 0;

        loop {
            if cancel.is_cancelled() {
                return None;
            }

            let timestamp = Utc::now().timestamp_millis();
            let difficulty = Self::adjust_difficulty(previous, timestamp);
            let hash = crypto_hash(&[
                canonical_json(&timestamp),
                previous_hash.clone(),
                payload.clone(),
                canonical_json(&nonce),
                canonical_json(&difficulty),
            ]);

            if hex_meets_difficulty(&hash, difficulty) {
                return Some(Self {
                    timestamp,
                    previous_hash: previous.hash.clone(),
                    hash,
                    nonce,
                    difficulty,
                    transactions,
                });
            }

            nonce = nonce.wrapping_add(1);
        }
    }

    /// Recompute this block's hash from its fields
    pub fn recompute_hash(&self) -> String {
        Self::calculate_hash(
            self.timestamp,
            &self.previous_hash,
            &self.transactions,
            self.nonce,
            self.difficulty,
        )
    }

    /// Verify the cached hash matches the block's fields
    pub fn verify_hash(&self) -> bool {
        self.hash == self.recompute_hash()
    }

    /// Check if the proof of work is valid
    pub fn is_valid_pow(&self) -> bool {
        hex_meets_difficulty(&self.hash, self.difficulty)
    }

    /// Whether this block is byte-for-byte the genesis block
    pub fn is_genesis(&self) -> bool {
        *self == Self::genesis()
    }

    /// Get number of transactions in this block
    pub fn tx_count(&self) -> usize {
        self.transactions.len()
    }
}
