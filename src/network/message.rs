//! Network message types for P2P communication
//!
//! Defines all message types used in the gossip protocol.

use crate::core::{Block, Transaction};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Magic bytes for message framing
pub const MAGIC: [u8; 4] = [0x4C, 0x44, 0x47, 0x52]; // "LDGR"

/// Largest frame body accepted from a peer
pub const MAX_MESSAGE_SIZE: usize = 32 * 1024 * 1024;

/// Network message types
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Message {
    /// Announce a full chain (after mining or accepting one)
    NewChain(Vec<Block>),

    /// Announce a new or updated pending transaction
    NewTransaction(Transaction),

    /// Request the peer's full chain
    GetChain,

    /// Response with the full chain
    Blocks(Vec<Block>),

    /// Request the peer's transaction pool
    GetPool,

    /// Response with the pool's id-to-transaction map
    Pool(HashMap<Uuid, Transaction>),
}

impl Message {
    /// Serialize message to bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Deserialize message from bytes
    pub fn from_bytes(data: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(data)
    }

    /// Get message type name for logging
    pub fn type_name(&self) -> &'static str {
        match self {
            Message::NewChain(_) => "NewChain",
            Message::NewTransaction(_) => "NewTransaction",
            Message::GetChain => "GetChain",
            Message::Blocks(_) => "Blocks",
            Message::GetPool => "GetPool",
            Message::Pool(_) => "Pool",
        }
    }
}
