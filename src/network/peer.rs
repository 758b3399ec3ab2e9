//! Peer management for P2P networking
//!
//! Tracks connected peers and routes outbound messages to them.

use crate::network::message::Message;
use std::collections::HashMap;
use std::net::SocketAddr;
use thiserror::Error;
use tokio::sync::{mpsc, RwLock};

/// Maximum number of connected peers
pub const MAX_PEERS: usize = 32;

/// Peer connection errors
#[derive(Error, Debug)]
pub enum PeerError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Peer disconnected")]
    Disconnected,
    #[error("Max peers reached")]
    MaxPeersReached,
}

/// Handle for sending messages to a peer
#[derive(Clone)]
pub struct PeerHandle {
    pub addr: SocketAddr,
    pub tx: mpsc::Sender<Message>,
}

impl PeerHandle {
    pub async fn send(&self, msg: Message) -> Result<(), PeerError> {
        self.tx.send(msg).await.map_err(|_| PeerError::Disconnected)
    }
}

/// Manages all peer connections
#[derive(Default)]
pub struct PeerManager {
    /// Peer message senders
    handles: RwLock<HashMap<SocketAddr, PeerHandle>>,
}

impl PeerManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a new peer
    pub async fn add_peer(&self, addr: SocketAddr, handle: PeerHandle) -> Result<(), PeerError> {
        let mut handles = self.handles.write().await;

        if handles.len() >= MAX_PEERS {
            return Err(PeerError::MaxPeersReached);
        }

        handles.insert(addr, handle);
        log::info!("Added peer: {}", addr);
        Ok(())
    }

    /// Remove a peer
    pub async fn remove_peer(&self, addr: &SocketAddr) {
        let mut handles = self.handles.write().await;
        handles.remove(addr);

        log::info!("Removed peer: {}", addr);
    }

    /// Get all connected peer addresses
    pub async fn get_peers(&self) -> Vec<SocketAddr> {
        let handles = self.handles.read().await;
        handles.keys().cloned().collect()
    }

    /// Broadcast a message to all peers
    pub async fn broadcast(&self, msg: Message) {
        let handles = self.handles.read().await;
        for (addr, handle) in handles.iter() {
            if let Err(e) = handle.send(msg.clone()).await {
                log::warn!("Failed to send to {}: {}", addr, e);
            }
        }
    }

    /// Broadcast a message to all peers except one
    pub async fn broadcast_except(&self, msg: Message, except: &SocketAddr) {
        let handles = self.handles.read().await;
        for (addr, handle) in handles.iter() {
            if addr != except {
                if let Err(e) = handle.send(msg.clone()).await {
                    log::warn!("Failed to send to {}: {}", addr, e);
                }
            }
        }
    }

    /// Send a message to a specific peer
    pub async fn send_to(&self, addr: &SocketAddr, msg: Message) -> Result<(), PeerError> {
        let handles = self.handles.read().await;
        if let Some(handle) = handles.get(addr) {
            handle.send(msg).await
        } else {
            Err(PeerError::Disconnected)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(port: u16) -> (PeerHandle, mpsc::Receiver<Message>) {
        let addr: SocketAddr = format!("127.0.0.1:{}", port).parse().unwrap();
        let (tx, rx) = mpsc::channel(8);
        (PeerHandle { addr, tx }, rx)
    }

    #[tokio::test]
    async fn test_broadcast_except_skips_origin() {
        let manager = PeerManager::new();
        let (a, mut rx_a) = handle(7001);
        let (b, mut rx_b) = handle(7002);
        let origin = a.addr;
        manager.add_peer(a.addr, a).await.unwrap();
        manager.add_peer(b.addr, b).await.unwrap();

        manager.broadcast_except(Message::GetChain, &origin).await;

        assert!(matches!(rx_b.recv().await, Some(Message::GetChain)));
        assert!(rx_a.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_send_to_unknown_peer() {
        let manager = PeerManager::new();
        let addr: SocketAddr = "127.0.0.1:7003".parse().unwrap();

        assert!(matches!(
            manager.send_to(&addr, Message::GetPool).await,
            Err(PeerError::Disconnected)
        ));
    }

    #[tokio::test]
    async fn test_remove_peer() {
        let manager = PeerManager::new();
        let (a, _rx) = handle(7004);
        let addr = a.addr;
        manager.add_peer(addr, a).await.unwrap();
        assert_eq!(manager.get_peers().await, vec![addr]);

        manager.remove_peer(&addr).await;
        assert!(manager.get_peers().await.is_empty());
    }
}
