//! Mining engine for the ledger
//!
//! One mining cycle: take the pool's valid transactions, add the reward,
//! search for proof of work off the async runtime, append, broadcast, and
//! drop what the cycle consumed from the pool.

use crate::core::{Block, Blockchain, ChainError, Transaction};
use crate::mining::mempool::TransactionPool;
use crate::network::replicator::Replicator;
use crate::wallet::Wallet;
use log::info;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::{Mutex, MutexGuard, RwLock};
use tokio_util::sync::CancellationToken;

/// Mining errors
#[derive(Error, Debug)]
pub enum MiningError {
    #[error("Mining cancelled")]
    Cancelled,
    #[error("Mined block no longer extends the chain: {0}")]
    StaleTip(#[from] ChainError),
    #[error("Mining task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Mining statistics
#[derive(Debug, Clone, Serialize)]
pub struct MiningStats {
    /// Number of hash attempts
    pub hash_attempts: u64,
    /// Time taken in milliseconds
    pub time_ms: u128,
    /// Hash rate (hashes per second)
    pub hash_rate: f64,
}

impl MiningStats {
    fn measure(block: &Block, start: Instant) -> Self {
        let hash_attempts = block.nonce.saturating_add(1);
        let time_ms = start.elapsed().as_millis();
        let hash_rate = if time_ms > 0 {
            (hash_attempts as f64) / (time_ms as f64 / 1000.0)
        } else {
            hash_attempts as f64
        };

        Self {
            hash_attempts,
            time_ms,
            hash_rate,
        }
    }
}

/// Runs mining cycles over shared chain, pool and wallet state
pub struct TransactionMiner {
    blockchain: Arc<RwLock<Blockchain>>,
    pool: Arc<RwLock<TransactionPool>>,
    wallet: Arc<RwLock<Wallet>>,
    replicator: Arc<dyn Replicator>,
    /// Held for a whole cycle
    cycle: Mutex<()>,
    /// Token of the in-flight search, if any
    cancel: Mutex<Option<CancellationToken>>,
}

impl TransactionMiner {
    pub fn new(
        blockchain: Arc<RwLock<Blockchain>>,
        pool: Arc<RwLock<TransactionPool>>,
        wallet: Arc<RwLock<Wallet>>,
        replicator: Arc<dyn Replicator>,
    ) -> Self {
        Self {
            blockchain,
            pool,
            wallet,
            replicator,
            cycle: Mutex::new(()),
            cancel: Mutex::new(None),
        }
    }

    /// Run one mining cycle.
    ///
    /// Mines even when the pool is empty; callers decide whether a
    /// reward-only block is wanted. No chain or pool lock is held during the
    /// search. Afterwards only the pool entries that are unchanged since the
    /// snapshot are removed.
    pub async fn mine_transactions(&self) -> Result<(Block, MiningStats), MiningError> {
        let _cycle = self.cycle.lock().await;
        let start = Instant::now();

        let (previous, transactions, snapshot) = {
            let chain = self.blockchain.read().await;
            let pool = self.pool.read().await;
            let wallet = self.wallet.read().await;

            let mut transactions = pool.valid_transactions();
            transactions.push(Transaction::reward(&wallet.address()));
            (
                chain.latest_block().clone(),
                transactions,
                pool.transaction_map().clone(),
            )
        };

        let token = CancellationToken::new();
        *self.cancel.lock().await = Some(token.clone());

        info!(
            "Mining on {} with {} transactions...",
            previous.hash,
            transactions.len()
        );

        let searched = tokio::task::spawn_blocking(move || {
            Block::mine_with_cancel(&previous, transactions, &token)
        })
        .await;
        *self.cancel.lock().await = None;
        let block = searched?.ok_or(MiningError::Cancelled)?;

        let stats = MiningStats::measure(&block, start);

        {
            let mut chain = self.blockchain.write().await;
            let mut pool = self.pool.write().await;

            chain.append_block(block.clone())?;
            self.replicator.broadcast_chain(&chain.blocks);
            pool.remove_unchanged(&snapshot);
        }

        info!(
            "Block {} mined in {}ms ({} attempts, {:.2} H/s, difficulty {})",
            block.hash, stats.time_ms, stats.hash_attempts, stats.hash_rate, block.difficulty
        );

        Ok((block, stats))
    }

    /// Abort the in-flight search, if there is one
    pub async fn cancel(&self) {
        if let Some(token) = self.cancel.lock().await.as_ref() {
            log::info!("Cancelling in-flight mining");
            token.cancel();
        }
    }

    /// Wait for the in-flight cycle to finish and keep new ones from starting
    /// while the guard lives
    pub async fn pause(&self) -> MutexGuard<'_, ()> {
        self.cycle.lock().await
    }

    #[cfg(test)]
    pub(crate) async fn wait_for_search(&self) {
        while self.cancel.lock().await.is_none() {
            tokio::task::yield_now().await;
        }
    }
}
