//! REST API handlers for ledger operations

use crate::core::{Block, ChainStats, Transaction};
use crate::mining::MiningStats;
use crate::network::{Node, NodeError, WalletInfo};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use uuid::Uuid;

/// Shared application state for API handlers
#[derive(Clone)]
pub struct ApiState {
    pub node: Arc<Node>,
}

// ============================================================================
// Response Types
// ============================================================================

#[derive(Serialize)]
pub struct ValidationResponse {
    pub valid: bool,
    pub blocks_checked: usize,
    pub message: String,
}

#[derive(Serialize)]
pub struct MineResponse {
    pub block: Option<Block>,
    pub stats: Option<MiningStats>,
    pub message: String,
}

#[derive(Serialize)]
pub struct PeersResponse {
    pub count: usize,
    pub peers: Vec<SocketAddr>,
}

#[derive(Serialize)]
pub struct BalanceResponse {
    pub address: String,
    pub balance: u64,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
}

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ApiError>)>;

fn api_error(status: StatusCode, error: impl ToString) -> (StatusCode, Json<ApiError>) {
    (
        status,
        Json(ApiError {
            error: error.to_string(),
        }),
    )
}

// ============================================================================
// Request Types
// ============================================================================

#[derive(Deserialize)]
pub struct TransactRequest {
    pub receiver: String,
    pub amount: u64,
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /health - Liveness check
pub async fn health_check() -> &'static str {
    "OK"
}

/// GET /api/blocks - The full chain
pub async fn get_blocks(State(state): State<ApiState>) -> Json<Vec<Block>> {
    let chain = state.node.blockchain.read().await;
    Json(chain.blocks.clone())
}

/// GET /api/chain - Chain statistics
pub async fn get_chain_info(State(state): State<ApiState>) -> Json<ChainStats> {
    let chain = state.node.blockchain.read().await;
    Json(chain.stats())
}

/// GET /api/chain/validate - Validate the local chain
pub async fn validate_chain(State(state): State<ApiState>) -> Json<ValidationResponse> {
    let chain = state.node.blockchain.read().await;
    let is_valid = chain.is_valid();
    let block_count = chain.len();

    Json(ValidationResponse {
        valid: is_valid,
        blocks_checked: block_count,
        message: if is_valid {
            format!("Blockchain is valid ({} blocks verified)", block_count)
        } else {
            "Blockchain validation failed".to_string()
        },
    })
}

/// POST /api/transact - Send funds from the node wallet
pub async fn transact(
    State(state): State<ApiState>,
    Json(req): Json<TransactRequest>,
) -> ApiResult<Transaction> {
    match state.node.transact(&req.receiver, req.amount).await {
        Ok(tx) => Ok(Json(tx)),
        Err(e @ (NodeError::Wallet(_) | NodeError::SelfTransfer)) => {
            Err(api_error(StatusCode::BAD_REQUEST, e))
        }
        Err(e) => Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, e)),
    }
}

/// GET /api/transaction-pool-map - Pending transactions by id
pub async fn get_transaction_pool_map(
    State(state): State<ApiState>,
) -> Json<HashMap<Uuid, Transaction>> {
    let pool = state.node.pool.read().await;
    Json(pool.transaction_map().clone())
}

/// POST /api/mine-transactions - Mine the pool into a block
pub async fn mine_transactions(State(state): State<ApiState>) -> ApiResult<MineResponse> {
    match state.node.mine_transactions().await {
        Ok(Some((block, stats))) => Ok(Json(MineResponse {
            message: format!(
                "Mined block {} with {} transactions",
                block.hash,
                block.transactions.len()
            ),
            block: Some(block),
            stats: Some(stats),
        })),
        Ok(None) => Ok(Json(MineResponse {
            block: None,
            stats: None,
            message: "Transaction pool is empty; nothing to mine".to_string(),
        })),
        Err(e) => Err(api_error(
            StatusCode::CONFLICT,
            format!("Mining failed: {}", e),
        )),
    }
}

/// GET /api/wallet-info - Node wallet address and balance
pub async fn get_wallet_info(State(state): State<ApiState>) -> Json<WalletInfo> {
    Json(state.node.wallet_info().await)
}

/// GET /api/wallets/{address}/balance - Balance of any address
pub async fn get_wallet_balance(
    State(state): State<ApiState>,
    Path(address): Path<String>,
) -> Json<BalanceResponse> {
    let balance = state.node.balance_of(&address).await;
    Json(BalanceResponse { address, balance })
}

/// GET /api/peers - Connected gossip peers
pub async fn get_peers(State(state): State<ApiState>) -> Json<PeersResponse> {
    let peers = state.node.peer_manager.get_peers().await;
    Json(PeersResponse {
        count: peers.len(),
        peers,
    })
}
