//! REST API module
//!
//! HTTP access to a running node.
//!
//! # Endpoints
//!
//! ## Chain
//! - `GET /api/blocks` - Full chain
//! - `GET /api/chain` - Chain statistics
//! - `GET /api/chain/validate` - Validate chain
//!
//! ## Transactions
//! - `POST /api/transact` - Send funds from the node wallet
//! - `GET /api/transaction-pool-map` - Pending transactions
//! - `POST /api/mine-transactions` - Mine pending transactions
//!
//! ## Wallets
//! - `GET /api/wallet-info` - Node wallet address and balance
//! - `GET /api/wallets/{address}/balance` - Balance of an address
//!
//! ## Network
//! - `GET /api/peers` - Connected gossip peers

pub mod handlers;
pub mod routes;

pub use handlers::ApiState;
pub use routes::create_router;
