//! Gossip-Ledger: a small replicated proof-of-work ledger in Rust
//!
//! This crate provides:
//! - Proof of Work blocks with per-block difficulty retargeting
//! - Longest-valid-chain replacement with transaction-data checks
//! - ECDSA-signed transactions (secp256k1) over an account-style output map
//! - Balances derived by replaying the chain
//! - A transaction pool and a cancellable mining cycle
//! - TCP gossip replication and an HTTP API
//!
//! # Example
//!
//! ```rust
//! use gossip_ledger::core::{Blockchain, Transaction, STARTING_BALANCE};
//! use gossip_ledger::wallet::Wallet;
//!
//! let mut blockchain = Blockchain::new();
//! let mut wallet = Wallet::new();
//!
//! let tx = wallet
//!     .create_transaction("recipient", 65, Some(&blockchain.blocks))
//!     .unwrap();
//! blockchain.add_block(vec![tx, Transaction::reward(&wallet.address())]);
//!
//! assert!(blockchain.is_valid());
//! assert_eq!(blockchain.balance_of("recipient"), STARTING_BALANCE + 65);
//! ```

pub mod api;
pub mod core;
pub mod crypto;
pub mod mining;
pub mod network;
pub mod wallet;

// Re-export commonly used types
pub use api::{create_router, ApiState};
pub use core::{
    Block, Blockchain, ReplaceError, Transaction, MINE_RATE, MINING_REWARD, STARTING_BALANCE,
};
pub use crypto::KeyPair;
pub use mining::{TransactionMiner, TransactionPool};
pub use network::{Node, NodeConfig, Replicator};
pub use wallet::Wallet;
