//! REST API routes configuration

use crate::api::handlers::{self, ApiState};
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};

/// Create the API router with all routes
pub fn create_router(state: ApiState) -> Router {
    // Configure CORS for browser access
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::health_check))
        // Chain endpoints
        .route("/api/blocks", get(handlers::get_blocks))
        .route("/api/chain", get(handlers::get_chain_info))
        .route("/api/chain/validate", get(handlers::validate_chain))
        // Transactions
        .route("/api/transact", post(handlers::transact))
        .route(
            "/api/transaction-pool-map",
            get(handlers::get_transaction_pool_map),
        )
        .route(
            "/api/mine-transactions",
            post(handlers::mine_transactions),
        )
        // Wallets
        .route("/api/wallet-info", get(handlers::get_wallet_info))
        .route(
            "/api/wallets/{address}/balance",
            get(handlers::get_wallet_balance),
        )
        // Network
        .route("/api/peers", get(handlers::get_peers))
        .with_state(state)
        .layer(cors)
}
