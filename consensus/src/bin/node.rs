//! Replica Node Binary
//!
//! Serves one SmartLog replica over HTTP so a coordinator can collect its
//! votes and deliver committed blocks.

use anyhow::Context;
use smartlog_consensus::node::{router, NodeState};
use smartlog_consensus::Config;
use smartlog_ledger::{Chain, ChainStore, Replica};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    info!("Starting SmartLog replica node");

    // Load configuration
    let config = if let Ok(config_path) = std::env::var("SMARTLOG_CONFIG") {
        info!("Loading config from: {}", config_path);
        Config::from_file(&config_path)?
    } else {
        info!("Loading config from environment variables");
        Config::from_env()?
    };

    let store = ChainStore::open(&config.ledger)?;
    let chain = match store.load(&config.node_id)? {
        Some(chain) => {
            info!(blocks = chain.len(), "Restored chain from {:?}", config.ledger.data_dir);
            chain
        }
        None => Chain::new(),
    };
    if let Err(e) = chain.verify() {
        error!("Stored chain fails verification: {}", e);
    }

    let replica = Replica::with_default_secret(config.node_id.clone(), chain);
    let store = config.ledger.storage.autosave.then_some(store);
    let app = router(NodeState::new(replica, store));

    let listener = tokio::net::TcpListener::bind(&config.node.listen_addr)
        .await
        .with_context(|| format!("binding {}", config.node.listen_addr))?;
    info!("Node {} listening on: {}", config.node_id, config.node.listen_addr);
    info!("   GET  /status   - Tip, length and verification");
    info!("   POST /proposal - Vote on a proposal");
    info!("   POST /block    - Append a committed block");
    info!("   GET  /chain    - Chain records");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            match signal::ctrl_c().await {
                Ok(()) => info!("Received shutdown signal"),
                Err(err) => error!("Unable to listen for shutdown signal: {}", err),
            }
        })
        .await?;

    info!("Replica node stopped");
    Ok(())
}
