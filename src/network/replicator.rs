//! Replication seam between the ledger and the gossip transport
//!
//! The miner and the node only ever talk to a [`Replicator`]; the TCP
//! gossip layer is one implementation of it.

use crate::core::{Block, Transaction};
use crate::network::message::Message;
use crate::network::peer::PeerManager;
use std::sync::Arc;
use tokio::runtime::Handle;

/// Outbound broadcast interface.
///
/// Broadcasts are fire-and-forget: no acknowledgement, no retry.
pub trait Replicator: Send + Sync {
    /// Announce the full local chain
    fn broadcast_chain(&self, chain: &[Block]);

    /// Announce a pending transaction
    fn broadcast_transaction(&self, transaction: &Transaction);
}

/// Replicator that fans messages out to every connected peer
pub struct GossipReplicator {
    peers: Arc<PeerManager>,
}

impl GossipReplicator {
    pub fn new(peers: Arc<PeerManager>) -> Self {
        Self { peers }
    }

    fn spawn_broadcast(&self, msg: Message) {
        let peers = self.peers.clone();
        match Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    peers.broadcast(msg).await;
                });
            }
            Err(_) => {
                log::warn!("No async runtime; dropped {} broadcast", msg.type_name());
            }
        }
    }
}

impl Replicator for GossipReplicator {
    fn broadcast_chain(&self, chain: &[Block]) {
        log::debug!("Broadcasting chain of {} blocks", chain.len());
        self.spawn_broadcast(Message::NewChain(chain.to_vec()));
    }

    fn broadcast_transaction(&self, transaction: &Transaction) {
        log::debug!("Broadcasting transaction {}", transaction.id);
        self.spawn_broadcast(Message::NewTransaction(transaction.clone()));
    }
}
