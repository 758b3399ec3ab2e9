//! Blockchain implementation
//!
//! The chain of blocks, its validity checks and the longest-valid-chain
//! replacement rule.

use crate::core::balance::calculate_balance;
use crate::core::block::Block;
use crate::core::transaction::Transaction;
use crate::core::validation::{
    validate_chain, validate_transaction_data, ChainError, ReplaceError, TransactionDataError,
};
use serde::{Deserialize, Serialize};

/// The main blockchain structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Blockchain {
    /// The chain of blocks; index 0 is always genesis
    pub blocks: Vec<Block>,
}

impl Blockchain {
    /// Create a new blockchain holding only the genesis block
    pub fn new() -> Self {
        Self {
            blocks: vec![Block::genesis()],
        }
    }

    /// Get the latest block
    pub fn latest_block(&self) -> &Block {
        self.blocks
            .last()
            .expect("Blockchain should have at least genesis block")
    }

    /// Get blockchain height
    pub fn height(&self) -> u64 {
        self.blocks.len() as u64 - 1
    }

    /// Number of blocks, genesis included
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Never true: the genesis block is always present
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Mine `transactions` into a new block and append it
    pub fn add_block(&mut self, transactions: Vec<Transaction>) -> &Block {
        let block = Block::mine(self.latest_block(), transactions);
        log::debug!(
            "Appended block {} (difficulty {}, nonce {})",
            self.blocks.len(),
            block.difficulty,
            block.nonce
        );
        self.blocks.push(block);
        self.latest_block()
    }

    /// Append a block mined elsewhere, e.g. off-lock by the miner.
    ///
    /// The block must extend the current tip and pass the same checks
    /// [`validate_chain`] applies to every block.
    pub fn append_block(&mut self, block: Block) -> Result<(), ChainError> {
        let index = self.blocks.len();
        let latest = self.latest_block();

        if block.previous_hash != latest.hash {
            return Err(ChainError::BrokenLink { index });
        }
        if !block.verify_hash() {
            return Err(ChainError::HashMismatch { index });
        }
        if !block.is_valid_pow() {
            return Err(ChainError::InsufficientWork {
                index,
                difficulty: block.difficulty,
            });
        }
        if latest.difficulty.abs_diff(block.difficulty) > 1 {
            return Err(ChainError::DifficultyJump {
                index,
                from: latest.difficulty,
                to: block.difficulty,
            });
        }

        self.blocks.push(block);
        Ok(())
    }

    /// Validate the entire chain
    pub fn is_valid(&self) -> bool {
        Self::is_valid_chain(&self.blocks)
    }

    /// Validate any chain, logging the reason when it fails
    pub fn is_valid_chain(chain: &[Block]) -> bool {
        match validate_chain(chain) {
            Ok(()) => true,
            Err(e) => {
                log::error!("Invalid chain: {}", e);
                false
            }
        }
    }

    /// Check the transaction data of `chain` against this chain's history
    pub fn valid_transaction_data(&self, chain: &[Block]) -> Result<(), TransactionDataError> {
        validate_transaction_data(&self.blocks, chain)
    }

    /// Replace the chain with `chain` if it is longer and fully valid.
    ///
    /// `on_accept` runs with the incoming chain before the swap, while this
    /// chain still holds the old history. On rejection nothing changes.
    pub fn replace_chain<F>(
        &mut self,
        chain: Vec<Block>,
        validate_transactions: bool,
        on_accept: F,
    ) -> Result<(), ReplaceError>
    where
        F: FnOnce(&[Block]),
    {
        let result = self.check_replacement(&chain, validate_transactions);
        if let Err(e) = &result {
            log::error!("Rejected incoming chain: {}", e);
            return result;
        }

        on_accept(&chain);

        log::info!(
            "Replacing chain of {} blocks with {} blocks (tip {})",
            self.blocks.len(),
            chain.len(),
            chain.last().map(|b| b.hash.as_str()).unwrap_or_default()
        );
        self.blocks = chain;
        Ok(())
    }

    fn check_replacement(
        &self,
        chain: &[Block],
        validate_transactions: bool,
    ) -> Result<(), ReplaceError> {
        if chain.len() <= self.blocks.len() {
            return Err(ReplaceError::NotLonger {
                incoming: chain.len(),
                current: self.blocks.len(),
            });
        }

        validate_chain(chain)?;

        if validate_transactions {
            self.valid_transaction_data(chain)?;
        }

        Ok(())
    }

    /// Balance of `address` derived from this chain
    pub fn balance_of(&self, address: &str) -> u64 {
        calculate_balance(&self.blocks, address, None)
    }

    /// Find a transaction by id anywhere in the chain
    pub fn find_transaction(&self, id: &uuid::Uuid) -> Option<&Transaction> {
        self.blocks
            .iter()
            .flat_map(|b| b.transactions.iter())
            .find(|tx| &tx.id == id)
    }

    /// Get chain statistics
    pub fn stats(&self) -> ChainStats {
        let total_transactions: usize = self.blocks.iter().map(|b| b.transactions.len()).sum();

        ChainStats {
            height: self.height(),
            total_blocks: self.blocks.len() as u64,
            total_transactions: total_transactions as u64,
            difficulty: self.latest_block().difficulty,
            latest_hash: self.latest_block().hash.clone(),
        }
    }
}

impl Default for Blockchain {
    fn default() -> Self {
        Self::new()
    }
}

/// Chain statistics
#[derive(Debug, Clone, Serialize)]
pub struct ChainStats {
    pub height: u64,
    pub total_blocks: u64,
    pub total_transactions: u64,
    pub difficulty: u32,
    pub latest_hash: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wallet::Wallet;
    use std::cell::Cell;

    fn grown(count: usize) -> Blockchain {
        let mut blockchain = Blockchain::new();
        for i in 0..count {
            blockchain.add_block(vec![Transaction::reward(&format!("miner-{}", i))]);
        }
        blockchain
    }

    #[test]
    fn test_new_blockchain() {
        let blockchain = Blockchain::new();
        assert_eq!(blockchain.len(), 1);
        assert_eq!(blockchain.blocks[0], Block::genesis());
        assert!(blockchain.is_valid());
    }

    #[test]
    fn test_add_block() {
        let mut blockchain = Blockchain::new();
        let reward = Transaction::reward("miner");

        let block = blockchain.add_block(vec![reward.clone()]).clone();

        assert_eq!(blockchain.height(), 1);
        assert_eq!(block.transactions, vec![reward]);
        assert_eq!(block.previous_hash, Block::genesis().hash);
    }

    #[test]
    fn test_sequential_appends_stay_valid() {
        let blockchain = grown(5);
        assert!(blockchain.is_valid());
    }

    #[test]
    fn test_append_block_requires_tip() {
        let mut blockchain = grown(2);
        let stale = Block::mine(&blockchain.blocks[0], vec![]);

        assert_eq!(
            blockchain.append_block(stale),
            Err(ChainError::BrokenLink { index: 3 })
        );

        let fresh = Block::mine(blockchain.latest_block(), vec![]);
        assert_eq!(blockchain.append_block(fresh), Ok(()));
        assert_eq!(blockchain.len(), 4);
    }

    #[test]
    fn test_replace_rejects_shorter_or_equal() {
        let mut blockchain = grown(2);
        let original = blockchain.clone();
        let candidate = grown(2);
        let called = Cell::new(false);

        let result = blockchain.replace_chain(candidate.blocks, false, |_| called.set(true));

        assert!(matches!(result, Err(ReplaceError::NotLonger { .. })));
        assert_eq!(blockchain, original);
        assert!(!called.get());
    }

    #[test]
    fn test_replace_rejects_invalid_chain() {
        let mut blockchain = Blockchain::new();
        let original = blockchain.clone();
        let mut candidate = grown(3);
        candidate.blocks[2].hash = "new-fake-hash".to_string();

        let result = blockchain.replace_chain(candidate.blocks, false, |_| {});

        assert!(matches!(result, Err(ReplaceError::InvalidChain(_))));
        assert_eq!(blockchain, original);
    }

    #[test]
    fn test_replace_accepts_longer_valid_chain() {
        let mut blockchain = Blockchain::new();
        let candidate = grown(3);
        let called = Cell::new(false);

        let result = blockchain.replace_chain(candidate.blocks.clone(), false, |_| {
            called.set(true)
        });

        assert_eq!(result, Ok(()));
        assert_eq!(blockchain.blocks, candidate.blocks);
        assert!(called.get());
    }

    #[test]
    fn test_on_accept_receives_incoming_chain() {
        let mut blockchain = Blockchain::new();
        let candidate = grown(2);
        let seen_len = Cell::new(0);

        blockchain
            .replace_chain(candidate.blocks, false, |incoming| {
                seen_len.set(incoming.len())
            })
            .unwrap();

        assert_eq!(seen_len.get(), 3);
        assert_eq!(blockchain.len(), 3);
    }

    #[test]
    fn test_replace_rejects_bad_transaction_data_when_checked() {
        let mut wallet = Wallet::new();
        wallet.balance = 999_999;
        let evil = Transaction::new(&wallet, "receiver", 100).unwrap();

        let mut candidate = Blockchain::new();
        candidate.add_block(vec![evil]);

        let mut unchecked = Blockchain::new();
        assert_eq!(
            unchecked.replace_chain(candidate.blocks.clone(), false, |_| {}),
            Ok(())
        );

        let mut checked = Blockchain::new();
        let result = checked.replace_chain(candidate.blocks, true, |_| {});
        assert!(matches!(
            result,
            Err(ReplaceError::InvalidTransactionData(
                TransactionDataError::StaleBalance { .. }
            ))
        ));
        assert_eq!(checked.len(), 1);
    }

    #[test]
    fn test_replace_accepts_good_transaction_data_when_checked() {
        let mut wallet = Wallet::new();
        let tx = wallet.create_transaction("receiver", 65, None).unwrap();

        let mut candidate = Blockchain::new();
        candidate.add_block(vec![tx, Transaction::reward(&wallet.address())]);

        let mut blockchain = Blockchain::new();
        assert_eq!(
            blockchain.replace_chain(candidate.blocks.clone(), true, |_| {}),
            Ok(())
        );
        assert_eq!(blockchain.blocks, candidate.blocks);
    }

    #[test]
    fn test_balance_and_stats() {
        let mut blockchain = Blockchain::new();
        blockchain.add_block(vec![Transaction::reward("miner")]);

        assert_eq!(
            blockchain.balance_of("miner"),
            crate::core::STARTING_BALANCE + crate::core::MINING_REWARD
        );

        let stats = blockchain.stats();
        assert_eq!(stats.height, 1);
        assert_eq!(stats.total_transactions, 1);
        assert_eq!(stats.latest_hash, blockchain.latest_block().hash);
    }

    #[test]
    fn test_find_transaction() {
        let mut blockchain = Blockchain::new();
        let reward = Transaction::reward("miner");
        blockchain.add_block(vec![reward.clone()]);

        assert_eq!(blockchain.find_transaction(&reward.id), Some(&reward));
        assert!(blockchain.find_transaction(&uuid::Uuid::new_v4()).is_none());
    }
}
