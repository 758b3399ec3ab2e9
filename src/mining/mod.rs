//! Mining module for block creation and transaction pooling

pub mod mempool;
pub mod miner;

pub use mempool::TransactionPool;
pub use miner::{MiningError, MiningStats, TransactionMiner};
