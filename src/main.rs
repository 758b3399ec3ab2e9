//! Gossip-Ledger node binary
//!
//! Runs a ledger node (gossip server plus HTTP API) or generates keys.

use clap::{Parser, Subcommand};
use gossip_ledger::api::{create_router, ApiState};
use gossip_ledger::crypto::KeyPair;
use gossip_ledger::network::{Node, NodeConfig, DEFAULT_API_PORT, DEFAULT_P2P_PORT};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "ledger")]
#[command(author = "Darshan")]
#[command(version = "0.1.0")]
#[command(about = "A replicated proof-of-work ledger", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a node: gossip server and HTTP API
    Start {
        /// Port for peer-to-peer gossip
        #[arg(long, default_value_t = DEFAULT_P2P_PORT)]
        p2p_port: u16,

        /// Port for the HTTP API
        #[arg(long, default_value_t = DEFAULT_API_PORT)]
        api_port: u16,

        /// Root node to sync chain and pool from (host:port)
        #[arg(short, long)]
        root: Option<String>,

        /// Hex private key for the node wallet
        #[arg(long, env = "LEDGER_PRIVATE_KEY")]
        private_key: Option<String>,
    },

    /// Generate a new key pair
    Keygen,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Start {
            p2p_port,
            api_port,
            root,
            private_key,
        } => {
            let config = NodeConfig {
                p2p_port,
                api_port,
                root_peer: root,
                private_key,
            };
            run_node(config)?;
        }

        Commands::Keygen => {
            let key_pair = KeyPair::generate();
            println!("Address:     {}", key_pair.address());
            println!("Private key: {}", key_pair.private_key_hex());
        }
    }

    Ok(())
}

fn run_node(config: NodeConfig) -> Result<(), Box<dyn std::error::Error>> {
    let rt = tokio::runtime::Runtime::new()?;

    rt.block_on(async {
        let api_port = config.api_port;
        let node = Arc::new(Node::new(config)?);

        let gossip = node.clone();
        tokio::spawn(async move {
            if let Err(e) = gossip.start().await {
                log::error!("Gossip service stopped: {}", e);
            }
        });

        let shutdown_node = node.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            log::info!("Shutting down...");
            shutdown_node.shutdown();
            std::process::exit(0);
        });

        let app = create_router(ApiState { node });
        let addr = format!("0.0.0.0:{}", api_port);
        log::info!("HTTP API listening on http://{}", addr);

        let listener = tokio::net::TcpListener::bind(&addr).await?;
        axum::serve(listener, app).await?;

        Ok::<(), Box<dyn std::error::Error>>(())
    })?;

    Ok(())
}
