//! Transaction indexer binary entry point
//!
//! Connects to PostgreSQL and the chain node, then indexes every transaction
//! bundle published on the configured NATS subject.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use chain_rpc::RpcChainNode;
use explorer_store::PostgresStore;
use transaction_indexer::listener::BundleListener;
use transaction_indexer::{IndexerConfig, TransactionIndexer};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::from_default_env()
                .add_directive("transaction_indexer=info".parse()?)
                .add_directive("explorer_store=info".parse()?)
                .add_directive("chain_rpc=warn".parse()?),
        )
        .init();

    let config = IndexerConfig::from_env()?;
    info!(
        "Starting transaction indexer {} ({} RPC endpoint(s), {} workers)",
        config.instance_id,
        config.rpc_endpoints.len(),
        config.worker_concurrency
    );

    let store = Arc::new(
        PostgresStore::connect(&config.database_url)
            .await
            .context("Failed to connect to the explorer store")?,
    );
    let chain = Arc::new(
        RpcChainNode::new(&config.rpc_config()).context("Failed to build the chain RPC client")?,
    );

    let indexer = Arc::new(TransactionIndexer::new(
        store.clone(),
        store,
        chain,
        config.pipeline_settings()?,
    ));
    let listener = BundleListener::new(config.nats_url.clone(), config.subject.clone(), indexer);

    tokio::select! {
        result = listener.start() => {
            if let Err(e) = &result {
                error!("Listener stopped: {:#}", e);
            }
            result
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
            Ok(())
        }
    }
}
