//! Transaction pool (mempool) for pending transactions
//!
//! Holds transactions that clients and peers submitted but no block has
//! included yet. Entries are keyed by transaction id; validity is checked
//! when the pool is read for mining, not when it is written.

use crate::core::{Block, Transaction};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

/// In-memory pool of pending transactions
#[derive(Debug, Default, Clone)]
pub struct TransactionPool {
    transactions: HashMap<Uuid, Transaction>,
}

impl TransactionPool {
    /// Create an empty pool
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite the entry for `tx.id`, returning the previous one
    pub fn insert(&mut self, tx: Transaction) -> Option<Transaction> {
        self.transactions.insert(tx.id, tx)
    }

    /// Get a pending transaction by id
    pub fn get(&self, id: &Uuid) -> Option<&Transaction> {
        self.transactions.get(id)
    }

    /// The pending transaction authored by `address`, if any.
    ///
    /// Only entries whose signature verifies count as authored; a peer can
    /// pool anything under any address.
    pub fn find_by_sender_address(&self, address: &str) -> Option<&Transaction> {
        self.transactions
            .values()
            .find(|tx| tx.input.address() == address && tx.validate().is_ok())
    }

    /// Pending transactions that pass the structural check.
    ///
    /// Invalid entries are dropped from the result and stay in the pool.
    pub fn valid_transactions(&self) -> Vec<Transaction> {
        self.transactions
            .values()
            .filter(|tx| tx.is_valid())
            .cloned()
            .collect()
    }

    /// Remove every entry
    pub fn clear(&mut self) {
        self.transactions.clear();
    }

    /// Remove entries still identical to their `snapshot` version.
    ///
    /// Transactions inserted or updated since the snapshot was taken stay.
    pub fn remove_unchanged(&mut self, snapshot: &HashMap<Uuid, Transaction>) {
        self.transactions.retain(|id, tx| snapshot.get(id) != Some(tx));
    }

    /// Overwrite the whole pool with a peer's map
    pub fn replace_all(&mut self, transactions: HashMap<Uuid, Transaction>) {
        self.transactions = transactions;
    }

    /// Remove every entry whose id appears in a block of `chain`
    pub fn clear_blockchain_transactions(&mut self, chain: &[Block]) {
        let mined: HashSet<Uuid> = chain
            .iter()
            .flat_map(|block| block.transactions.iter().map(|tx| tx.id))
            .collect();

        let before = self.transactions.len();
        self.transactions.retain(|id, _| !mined.contains(id));

        let removed = before - self.transactions.len();
        if removed > 0 {
            log::debug!("Dropped {} mined transactions from the pool", removed);
        }
    }

    /// The full id-to-transaction map
    pub fn transaction_map(&self) -> &HashMap<Uuid, Transaction> {
        &self.transactions
    }

    /// Number of pending transactions
    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    /// Check if pool is empty
    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }
}
