//! Transaction Indexer
//!
//! Turns one confirmed transaction and its logs into every derived fact the
//! explorer serves: account and contract profiles, token balances, daily
//! analytics, per-method statistics, event attribution and account tags.
//!
//! ## Pipeline
//!
//! ```text
//! TransactionBundle
//!   -> lifecycle (fatal on failure)
//!   -> daily analytics -> contract interaction -> token transfers -> tagging
//!   -> contract lifecycle/metrics -> account transactions -> method stats
//!   -> event attribution
//! ```
//!
//! Stages after the lifecycle are isolated: a failure or timeout is logged
//! and the remaining stages still run.

pub mod aggregation;
pub mod attribution;
pub mod classifier;
pub mod config;
pub mod lifecycle;
pub mod listener;
pub mod lookup;
pub mod method;
pub mod orchestrator;
pub mod tagging;
pub mod token_metadata;
pub mod transfers;
pub mod worker;

pub use classifier::{classify, Classification, ProxyKind};
pub use config::IndexerConfig;
pub use lookup::ReadThroughContractLookup;
pub use method::{resolve_method, ResolvedMethod};
pub use orchestrator::{PipelineSettings, ProcessingReport, Stage, TransactionIndexer};
pub use tagging::{derive_tags, AccountSnapshot};
pub use worker::PoolSummary;

use explorer_common::{ExplorerError, Result};
use std::future::Future;
use std::time::Duration;

/// Run a chain-node call under a deadline
pub(crate) async fn bounded<T, F>(limit: Duration, what: String, call: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::time::timeout(limit, call)
        .await
        .map_err(|_| ExplorerError::Timeout(format!("{} exceeded {:?}", what, limit)))?
}
