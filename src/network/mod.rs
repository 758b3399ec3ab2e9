//! P2P Networking module
//!
//! Gossip replication for the ledger.
//!
//! # Features
//! - TCP-based peer connections with length-prefixed JSON frames
//! - Full-chain and transaction gossip with relay
//! - Chain and pool sync from a root node

pub mod message;
pub mod node;
pub mod peer;
pub mod replicator;
pub mod server;

pub use message::{Message, MAGIC, MAX_MESSAGE_SIZE};
pub use node::{Node, NodeConfig, NodeError, WalletInfo, DEFAULT_API_PORT, DEFAULT_P2P_PORT};
pub use peer::{PeerError, PeerHandle, PeerManager, MAX_PEERS};
pub use replicator::{GossipReplicator, Replicator};
pub use server::{connect_to_peer, Server};
