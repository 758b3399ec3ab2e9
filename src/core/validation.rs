//! Chain and transaction-data validation
//!
//! Validators report a typed reason instead of panicking, so a single bad
//! block or transaction from a peer never takes the node down.

use crate::core::balance::calculate_balance;
use crate::core::block::Block;
use crate::core::transaction::{InvalidTransaction, TransactionInput, MINING_REWARD};
use std::collections::HashSet;
use thiserror::Error;
use uuid::Uuid;

/// Structural chain violations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    #[error("chain is empty")]
    Empty,
    #[error("chain does not start with the genesis block")]
    InvalidGenesis,
    #[error("block {index} does not link to the previous block's hash")]
    BrokenLink { index: usize },
    #[error("block {index} hash does not match its contents")]
    HashMismatch { index: usize },
    #[error("block {index} hash does not meet difficulty {difficulty}")]
    InsufficientWork { index: usize, difficulty: u32 },
    #[error("block {index} difficulty jumped from {from} to {to}")]
    DifficultyJump { index: usize, from: u32, to: u32 },
}

/// Transaction-data violations inside a candidate chain
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransactionDataError {
    #[error("block {block} has more than one miner reward")]
    MultipleRewards { block: usize },
    #[error("block {block} carries an invalid miner reward")]
    InvalidReward { block: usize },
    #[error("block {block} transaction {id} is invalid: {reason}")]
    InvalidTransaction {
        block: usize,
        id: Uuid,
        reason: InvalidTransaction,
    },
    #[error("block {block} transaction {id} claims {claimed} but the sender held {actual}")]
    StaleBalance {
        block: usize,
        id: Uuid,
        claimed: u64,
        actual: u64,
    },
    #[error("block {block} repeats transaction {id}")]
    DuplicateTransaction { block: usize, id: Uuid },
}

/// Why a candidate chain was not adopted
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReplaceError {
    #[error("incoming chain ({incoming} blocks) is not longer than current ({current} blocks)")]
    NotLonger { incoming: usize, current: usize },
    #[error("incoming chain is invalid: {0}")]
    InvalidChain(#[from] ChainError),
    #[error("incoming chain contains invalid data: {0}")]
    InvalidTransactionData(#[from] TransactionDataError),
}

/// Check genesis, hash links, recomputed hashes, proof of work and
/// difficulty steps. Any violation invalidates the whole chain.
pub fn validate_chain(chain: &[Block]) -> Result<(), ChainError> {
    let genesis = chain.first().ok_or(ChainError::Empty)?;
    if !genesis.is_genesis() {
        return Err(ChainError::InvalidGenesis);
    }

    for (index, pair) in chain.windows(2).enumerate() {
        let (previous, block) = (&pair[0], &pair[1]);
        let index = index + 1;

        if block.previous_hash != previous.hash {
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
        if previous.difficulty.abs_diff(block.difficulty) > 1 {
            return Err(ChainError::DifficultyJump {
                index,
                from: previous.difficulty,
                to: block.difficulty,
            });
        }
    }

    Ok(())
}

/// Semantic check of every non-genesis block in `candidate`.
///
/// Claimed input amounts are replayed against `current`, the chain this
/// node already trusts, as of the moment each input was signed.
pub fn validate_transaction_data(
    current: &[Block],
    candidate: &[Block],
) -> Result<(), TransactionDataError> {
    for (block_index, block) in candidate.iter().enumerate().skip(1) {
        let mut seen: HashSet<Uuid> = HashSet::new();
        let mut rewards = 0usize;

        for tx in &block.transactions {
            if tx.is_reward() {
                rewards += 1;
                if rewards > 1 {
                    return Err(TransactionDataError::MultipleRewards { block: block_index });
                }

                let mut outputs = tx.output_map.values();
                if outputs.next() != Some(&MINING_REWARD) || outputs.next().is_some() {
                    return Err(TransactionDataError::InvalidReward { block: block_index });
                }
                continue;
            }

            tx.validate()
                .map_err(|reason| TransactionDataError::InvalidTransaction {
                    block: block_index,
                    id: tx.id,
                    reason,
                })?;

            // validate() only passes signed inputs
            if let TransactionInput::Signed(input) = &tx.input {
                let actual = calculate_balance(current, &input.address, Some(input.timestamp));
                if input.amount != actual {
                    return Err(TransactionDataError::StaleBalance {
                        block: block_index,
                        id: tx.id,
                        claimed: input.amount,
                        actual,
                    });
                }
            }

            if !seen.insert(tx.id) {
                return Err(TransactionDataError::DuplicateTransaction {
                    block: block_index,
                    id: tx.id,
                });
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Blockchain, Transaction, STARTING_BALANCE};
    use crate::wallet::Wallet;

    struct Fixture {
        current: Blockchain,
        candidate: Blockchain,
        wallet: Wallet,
        transaction: Transaction,
        reward: Transaction,
    }

    fn fixture() -> Fixture {
        let mut wallet = Wallet::new();
        let transaction = wallet.create_transaction("n3w-v3d44nt", 65, None).unwrap();
        let reward = Transaction::reward(&wallet.address());

        Fixture {
            current: Blockchain::new(),
            candidate: Blockchain::new(),
            wallet,
            transaction,
            reward,
        }
    }

    fn check(f: &Fixture) -> Result<(), TransactionDataError> {
        validate_transaction_data(&f.current.blocks, &f.candidate.blocks)
    }

    #[test]
    fn test_valid_transaction_data() {
        let mut f = fixture();
        f.candidate.add_block(vec![f.transaction.clone(), f.reward.clone()]);

        assert_eq!(check(&f), Ok(()));
    }

    #[test]
    fn test_multiple_rewards_rejected() {
        let mut f = fixture();
        let second_reward = Transaction::reward(&f.wallet.address());
        f.candidate.add_block(vec![
            f.transaction.clone(),
            f.reward.clone(),
            second_reward,
        ]);

        assert_eq!(
            check(&f),
            Err(TransactionDataError::MultipleRewards { block: 1 })
        );
    }

    #[test]
    fn test_same_reward_twice_rejected() {
        let mut f = fixture();
        f.candidate.add_block(vec![
            f.transaction.clone(),
            f.reward.clone(),
            f.reward.clone(),
        ]);

        assert_eq!(
            check(&f),
            Err(TransactionDataError::MultipleRewards { block: 1 })
        );
    }

    #[test]
    fn test_inflated_reward_rejected() {
        let mut f = fixture();
        f.reward.output_map.insert(f.wallet.address(), 999_999);
        f.candidate.add_block(vec![f.transaction.clone(), f.reward.clone()]);

        assert_eq!(
            check(&f),
            Err(TransactionDataError::InvalidReward { block: 1 })
        );
    }

    #[test]
    fn test_split_reward_rejected() {
        let mut f = fixture();
        f.reward.output_map.insert("accomplice".to_string(), 1);
        f.candidate.add_block(vec![f.reward.clone()]);

        assert_eq!(
            check(&f),
            Err(TransactionDataError::InvalidReward { block: 1 })
        );
    }

    #[test]
    fn test_malformed_output_map_rejected() {
        let mut f = fixture();
        f.transaction.output_map.insert(f.wallet.address(), 999_999);
        f.candidate.add_block(vec![f.transaction.clone(), f.reward.clone()]);

        assert!(matches!(
            check(&f),
            Err(TransactionDataError::InvalidTransaction {
                block: 1,
                reason: InvalidTransaction::OutputMismatch { .. },
                ..
            })
        ));
    }

    #[test]
    fn test_inflated_input_rejected() {
        let mut f = fixture();
        // A self-consistent, correctly signed transaction that lies about its balance
        f.wallet.balance = 999_999;
        let evil = Transaction::new(&f.wallet, "receiver", 100).unwrap();
        assert!(evil.is_valid());

        f.candidate.add_block(vec![evil.clone(), f.reward.clone()]);

        assert_eq!(
            check(&f),
            Err(TransactionDataError::StaleBalance {
                block: 1,
                id: evil.id,
                claimed: 999_999,
                actual: STARTING_BALANCE,
            })
        );
    }

    #[test]
    fn test_repeated_transaction_rejected() {
        let mut f = fixture();
        f.candidate.add_block(vec![
            f.transaction.clone(),
            f.transaction.clone(),
            f.transaction.clone(),
        ]);

        assert_eq!(
            check(&f),
            Err(TransactionDataError::DuplicateTransaction {
                block: 1,
                id: f.transaction.id,
            })
        );
    }

    #[test]
    fn test_validate_chain_accepts_appended_blocks() {
        let mut blockchain = Blockchain::new();
        blockchain.add_block(vec![Transaction::reward("a")]);
        blockchain.add_block(vec![Transaction::reward("b")]);
        blockchain.add_block(vec![Transaction::reward("c")]);

        assert_eq!(validate_chain(&blockchain.blocks), Ok(()));
    }

    #[test]
    fn test_validate_chain_rejects_fake_genesis() {
        let mut blockchain = Blockchain::new();
        blockchain.blocks[0].hash = "new-genesis".to_string();

        assert_eq!(
            validate_chain(&blockchain.blocks),
            Err(ChainError::InvalidGenesis)
        );
        assert_eq!(validate_chain(&[]), Err(ChainError::Empty));
    }

    #[test]
    fn test_validate_chain_rejects_broken_link() {
        let mut blockchain = three_blocks();
        blockchain.blocks[2].previous_hash = "broken-hash".to_string();

        assert_eq!(
            validate_chain(&blockchain.blocks),
            Err(ChainError::BrokenLink { index: 2 })
        );
    }

    #[test]
    fn test_validate_chain_rejects_tampered_data() {
        let mut blockchain = three_blocks();
        blockchain.blocks[2].transactions = vec![Transaction::reward("mose")];

        assert_eq!(
            validate_chain(&blockchain.blocks),
            Err(ChainError::HashMismatch { index: 2 })
        );
    }

    #[test]
    fn test_validate_chain_rejects_tampered_hash() {
        let mut blockchain = three_blocks();
        blockchain.blocks[2].hash = "new-fake-hash".to_string();

        // Block 3 no longer links to it
        assert!(validate_chain(&blockchain.blocks).is_err());
    }

    #[test]
    fn test_validate_chain_rejects_difficulty_jump() {
        let mut blockchain = three_blocks();
        let last = blockchain.latest_block().clone();

        // Mine honestly at a difficulty three steps above the previous block
        let difficulty = last.difficulty + 3;
        let timestamp = last.timestamp + 1;
        let mut nonce = 0u64;
        let hash = loop {
            let hash = Block::calculate_hash(timestamp, &last.hash, &[], nonce, difficulty);
            if crate::crypto::hex_meets_difficulty(&hash, difficulty) {
                break hash;
            }
            nonce += 1;
        };

        blockchain.blocks.push(Block {
            timestamp,
            previous_hash: last.hash.clone(),
            hash,
            nonce,
            difficulty,
            transactions: vec![],
        });

        assert_eq!(
            validate_chain(&blockchain.blocks),
            Err(ChainError::DifficultyJump {
                index: 4,
                from: last.difficulty,
                to: difficulty,
            })
        );
    }

    #[test]
    fn test_validate_chain_rejects_unmined_block() {
        let mut blockchain = three_blocks();
        let last = blockchain.latest_block().clone();
        let difficulty = last.difficulty;

        // Find a nonce whose hash misses the target
        let timestamp = last.timestamp + 1;
        let mut nonce = 0u64;
        let hash = loop {
            let hash = Block::calculate_hash(timestamp, &last.hash, &[], nonce, difficulty);
            if !crate::crypto::hex_meets_difficulty(&hash, difficulty) {
                break hash;
            }
            nonce += 1;
        };

        blockchain.blocks.push(Block {
            timestamp,
            previous_hash: last.hash,
            hash,
            nonce,
            difficulty,
            transactions: vec![],
        });

        assert_eq!(
            validate_chain(&blockchain.blocks),
            Err(ChainError::InsufficientWork {
                index: 4,
                difficulty,
            })
        );
    }

    fn three_blocks() -> Blockchain {
        let mut blockchain = Blockchain::new();
        blockchain.add_block(vec![Transaction::reward("Bears")]);
        blockchain.add_block(vec![Transaction::reward("Beets")]);
        blockchain.add_block(vec![Transaction::reward("Battlestar Galactica")]);
        blockchain
    }
}
