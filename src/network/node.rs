//! P2P Node implementation
//!
//! The node is the single context object: it owns the chain, the pool and
//! the wallet, runs mining cycles, and turns inbound gossip into chain
//! replacement and pool updates.

use crate::core::{calculate_balance, Block, Blockchain, ReplaceError, Transaction};
use crate::mining::{MiningError, MiningStats, TransactionMiner, TransactionPool};
use crate::network::message::Message;
use crate::network::peer::{PeerError, PeerManager};
use crate::network::replicator::{GossipReplicator, Replicator};
use crate::network::server::{connect_to_peer, handle_connection, Server};
use crate::wallet::{Wallet, WalletError};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio_util::sync::CancellationToken;

/// Default gossip port
pub const DEFAULT_P2P_PORT: u16 = 5000;

/// Default HTTP port
pub const DEFAULT_API_PORT: u16 = 3000;

/// Pause after a failed accept
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Node errors
#[derive(Error, Debug)]
pub enum NodeError {
    #[error("Wallet error: {0}")]
    Wallet(#[from] WalletError),
    #[error("Mining error: {0}")]
    Mining(#[from] MiningError),
    #[error("Peer error: {0}")]
    Peer(#[from] PeerError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Cannot send funds to the node's own address")]
    SelfTransfer,
    #[error("Node already started")]
    AlreadyStarted,
}

/// Node configuration
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Port the gossip server listens on
    pub p2p_port: u16,
    /// Port the HTTP API listens on
    pub api_port: u16,
    /// Peer to sync chain and pool from on start
    pub root_peer: Option<String>,
    /// Hex private key of the node wallet; a fresh key when absent
    pub private_key: Option<String>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            p2p_port: DEFAULT_P2P_PORT,
            api_port: DEFAULT_API_PORT,
            root_peer: None,
            private_key: None,
        }
    }
}

/// Address and chain-derived balance of the node wallet
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct WalletInfo {
    pub address: String,
    pub balance: u64,
}

/// Replies still expected from the root peer.
///
/// `Blocks` and `Pool` skip the gossip checks, so each is taken once and
/// only from the peer it was requested from.
#[derive(Debug, Default)]
struct RootSync {
    peer: Option<SocketAddr>,
    chain_pending: bool,
    pool_pending: bool,
}

impl RootSync {
    fn awaiting(peer: SocketAddr) -> Self {
        Self {
            peer: Some(peer),
            chain_pending: true,
            pool_pending: true,
        }
    }

    fn take_chain(&mut self, from: &SocketAddr) -> bool {
        let expected = self.chain_pending && self.peer.as_ref() == Some(from);
        if expected {
            self.chain_pending = false;
        }
        expected
    }

    fn take_pool(&mut self, from: &SocketAddr) -> bool {
        let expected = self.pool_pending && self.peer.as_ref() == Some(from);
        if expected {
            self.pool_pending = false;
        }
        expected
    }
}

/// The ledger node
pub struct Node {
    pub config: NodeConfig,
    pub blockchain: Arc<RwLock<Blockchain>>,
    pub pool: Arc<RwLock<TransactionPool>>,
    pub wallet: Arc<RwLock<Wallet>>,
    pub peer_manager: Arc<PeerManager>,
    replicator: Arc<dyn Replicator>,
    miner: TransactionMiner,
    message_tx: mpsc::Sender<(SocketAddr, Message)>,
    message_rx: Mutex<Option<mpsc::Receiver<(SocketAddr, Message)>>>,
    root_sync: Mutex<RootSync>,
    shutdown: CancellationToken,
}

impl Node {
    /// Create a node that gossips over TCP
    pub fn new(config: NodeConfig) -> Result<Self, NodeError> {
        let peer_manager = Arc::new(PeerManager::new());
        let replicator = Arc::new(GossipReplicator::new(peer_manager.clone()));
        Self::build(config, peer_manager, replicator)
    }

    /// Create a node that announces through a custom replicator
    pub fn with_replicator(
        config: NodeConfig,
        replicator: Arc<dyn Replicator>,
    ) -> Result<Self, NodeError> {
        Self::build(config, Arc::new(PeerManager::new()), replicator)
    }

    fn build(
        config: NodeConfig,
        peer_manager: Arc<PeerManager>,
        replicator: Arc<dyn Replicator>,
    ) -> Result<Self, NodeError> {
        let wallet = match &config.private_key {
            Some(key) => Wallet::from_private_key(key)?,
            None => Wallet::new(),
        };
        log::info!("Node wallet address: {}", wallet.address());

        let blockchain = Arc::new(RwLock::new(Blockchain::new()));
        let pool = Arc::new(RwLock::new(TransactionPool::new()));
        let wallet = Arc::new(RwLock::new(wallet));
        let miner = TransactionMiner::new(
            blockchain.clone(),
            pool.clone(),
            wallet.clone(),
            replicator.clone(),
        );
        let (message_tx, message_rx) = mpsc::channel(1000);

        Ok(Self {
            config,
            blockchain,
            pool,
            wallet,
            peer_manager,
            replicator,
            miner,
            message_tx,
            message_rx: Mutex::new(Some(message_rx)),
            root_sync: Mutex::new(RootSync::default()),
            shutdown: CancellationToken::new(),
        })
    }

    // =========================================================================
    // Inbound replication callbacks
    // =========================================================================

    /// Consider a chain gossiped by a peer.
    ///
    /// Runs the full replacement gate, transaction data included. Accepted
    /// chains drop their transactions from the pool and abort local mining.
    pub async fn on_chain_received(&self, chain: Vec<Block>) -> Result<(), ReplaceError> {
        {
            let mut blockchain = self.blockchain.write().await;
            let mut pool = self.pool.write().await;
            blockchain.replace_chain(chain, true, |incoming| {
                pool.clear_blockchain_transactions(incoming)
            })?;
        }

        self.miner.cancel().await;
        Ok(())
    }

    /// Replace the chain with one fetched from the root peer.
    ///
    /// Transaction data is not re-validated here: a node with only genesis
    /// cannot replay balances for history it has never seen.
    pub async fn sync_chain(&self, chain: Vec<Block>) -> Result<(), ReplaceError> {
        let mut blockchain = self.blockchain.write().await;
        blockchain.replace_chain(chain, false, |_| {})?;
        log::info!("Synced chain to height {}", blockchain.height());
        Ok(())
    }

    /// Store a gossiped transaction; true when it was not already pooled as is
    pub async fn on_transaction_received(&self, tx: Transaction) -> bool {
        let mut pool = self.pool.write().await;
        let previous = pool.insert(tx.clone());
        previous.as_ref() != Some(&tx)
    }

    // =========================================================================
    // Local operations
    // =========================================================================

    /// Send `amount` from the node wallet to `receiver`.
    ///
    /// A pending transaction from this wallet is extended rather than
    /// replaced; otherwise a new one is drawn from the chain balance. Waits
    /// for an in-flight mining cycle, which may be consuming the pending one.
    pub async fn transact(&self, receiver: &str, amount: u64) -> Result<Transaction, NodeError> {
        let _paused = self.miner.pause().await;
        let tx = {
            let chain = self.blockchain.read().await;
            let mut pool = self.pool.write().await;
            let mut wallet = self.wallet.write().await;

            let address = wallet.address();
            if receiver == address {
                return Err(NodeError::SelfTransfer);
            }

            let tx = match pool.find_by_sender_address(&address).cloned() {
                Some(mut pending) => {
                    pending
                        .update(&wallet, receiver, amount)
                        .map_err(WalletError::from)?;
                    pending
                }
                None => wallet.create_transaction(receiver, amount, Some(&chain.blocks))?,
            };

            pool.insert(tx.clone());
            tx
        };

        log::info!("Created transaction {} ({} -> {})", tx.id, amount, receiver);
        self.replicator.broadcast_transaction(&tx);
        Ok(tx)
    }

    /// Mine the pool into a block; `None` when there is nothing to mine
    pub async fn mine_transactions(&self) -> Result<Option<(Block, MiningStats)>, NodeError> {
        if self.pool.read().await.is_empty() {
            log::info!("Transaction pool is empty; nothing to mine");
            return Ok(None);
        }

        Ok(Some(self.miner.mine_transactions().await?))
    }

    /// Address and current balance of the node wallet
    pub async fn wallet_info(&self) -> WalletInfo {
        let chain = self.blockchain.read().await;
        let wallet = self.wallet.read().await;
        let address = wallet.address();

        WalletInfo {
            balance: calculate_balance(&chain.blocks, &address, None),
            address,
        }
    }

    /// Chain-derived balance of any address
    pub async fn balance_of(&self, address: &str) -> u64 {
        self.blockchain.read().await.balance_of(address)
    }

    // =========================================================================
    // Gossip service
    // =========================================================================

    /// Run the gossip server until [`shutdown`](Self::shutdown) is called
    pub async fn start(self: Arc<Self>) -> Result<(), NodeError> {
        let mut message_rx = self
            .message_rx
            .lock()
            .await
            .take()
            .ok_or(NodeError::AlreadyStarted)?;

        let server = Server::bind(self.config.p2p_port).await?;

        let acceptor = self.clone();
        tokio::spawn(async move {
            loop {
                if let Err(e) = acceptor.server_accept(&server).await {
                    log::error!("Accept error: {}", e);
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            }
        });

        if let Some(root) = self.config.root_peer.clone() {
            if let Err(e) = self.sync_with_root(&root).await {
                log::warn!("Could not sync with root node {}: {}", root, e);
            }
        }

        loop {
            tokio::select! {
                Some((from, msg)) = message_rx.recv() => {
                    self.handle_message(from, msg).await;
                }
                _ = self.shutdown.cancelled() => {
                    log::info!("Node shutting down...");
                    break;
                }
            }
        }

        Ok(())
    }

    async fn server_accept(&self, server: &Server) -> Result<(), std::io::Error> {
        let (stream, addr) = server.accept().await?;
        log::info!("Incoming connection from {}", addr);

        self.spawn_connection(stream, addr, Vec::new());
        Ok(())
    }

    /// Connect to the root peer and request its chain and pool
    pub async fn sync_with_root(&self, addr: &str) -> Result<SocketAddr, PeerError> {
        log::info!("Syncing with root node: {}", addr);

        let (stream, peer_addr) = connect_to_peer(addr).await?;
        // Recorded before the requests go out so the replies cannot race it
        *self.root_sync.lock().await = RootSync::awaiting(peer_addr);
        self.spawn_connection(stream, peer_addr, vec![Message::GetChain, Message::GetPool]);
        Ok(peer_addr)
    }

    fn spawn_connection(
        &self,
        stream: TcpStream,
        peer_addr: SocketAddr,
        greeting: Vec<Message>,
    ) {
        let pm = self.peer_manager.clone();
        let tx = self.message_tx.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, peer_addr, pm, greeting, tx).await {
                log::warn!("Connection error with {}: {}", peer_addr, e);
            }
        });
    }

    /// Handle incoming messages
    pub async fn handle_message(&self, from: SocketAddr, msg: Message) {
        log::debug!("Received {} from {}", msg.type_name(), from);

        match msg {
            Message::NewChain(chain) => {
                let relay = Message::NewChain(chain.clone());
                match self.on_chain_received(chain).await {
                    Ok(()) => self.peer_manager.broadcast_except(relay, &from).await,
                    Err(e) => log::warn!("Ignored chain from {}: {}", from, e),
                }
            }

            Message::NewTransaction(tx) => {
                if self.on_transaction_received(tx.clone()).await {
                    self.peer_manager
                        .broadcast_except(Message::NewTransaction(tx), &from)
                        .await;
                }
            }

            Message::GetChain => {
                let blocks = self.blockchain.read().await.blocks.clone();
                if let Err(e) = self
                    .peer_manager
                    .send_to(&from, Message::Blocks(blocks))
                    .await
                {
                    log::warn!("Failed to send chain: {}", e);
                }
            }

            Message::Blocks(blocks) => {
                if !self.root_sync.lock().await.take_chain(&from) {
                    log::warn!("Ignored unrequested chain from {}", from);
                    return;
                }
                if let Err(e) = self.sync_chain(blocks).await {
                    log::warn!("Failed to sync chain from {}: {}", from, e);
                }
            }

            Message::GetPool => {
                let map = self.pool.read().await.transaction_map().clone();
                if let Err(e) = self.peer_manager.send_to(&from, Message::Pool(map)).await {
                    log::warn!("Failed to send pool: {}", e);
                }
            }

            Message::Pool(map) => {
                if !self.root_sync.lock().await.take_pool(&from) {
                    log::warn!("Ignored unrequested pool from {}", from);
                    return;
                }
                log::info!("Synced {} pending transactions from {}", map.len(), from);
                self.pool.write().await.replace_all(map);
            }
        }
    }

    /// Stop the gossip loop
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}
