//! Core ledger components
//!
//! This module contains the fundamental building blocks:
//! - Transactions (signed output maps, mining rewards)
//! - Blocks (proof of work with per-block difficulty retargeting)
//! - Blockchain (append, validation, longest-valid-chain replacement)
//! - Balance replay
//! - Cross-block transaction validation

pub mod balance;
pub mod block;
pub mod blockchain;
pub mod transaction;
pub mod validation;

pub use balance::{calculate_balance, STARTING_BALANCE};
pub use block::{
    Block, GENESIS_HASH, GENESIS_PREVIOUS_HASH, INITIAL_DIFFICULTY, MINE_RATE,
};
pub use blockchain::{Blockchain, ChainStats};
pub use transaction::{
    InvalidTransaction, RewardInput, SignedInput, Transaction, TransactionError,
    TransactionInput, MINING_REWARD, REWARD_ADDRESS,
};
pub use validation::{
    validate_chain, validate_transaction_data, ChainError, ReplaceError, TransactionDataError,
};
