//! Bounded worker pool over a stream of bundles

use explorer_common::TransactionBundle;
use futures::{Stream, StreamExt};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{error, info};

use crate::orchestrator::TransactionIndexer;

/// Totals for one drained stream
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolSummary {
    pub processed: u64,
    /// Aborted by a lifecycle failure
    pub failed: u64,
    /// Processed with at least one swallowed stage failure
    pub degraded: u64,
}

impl TransactionIndexer {
    /// Process bundles with at most `worker_concurrency` in flight
    ///
    /// Completes when the stream ends.
    pub async fn process_many<S>(&self, bundles: S) -> PoolSummary
    where
        S: Stream<Item = TransactionBundle>,
    {
        let processed = AtomicU64::new(0);
        let failed = AtomicU64::new(0);
        let degraded = AtomicU64::new(0);
        let limit = self.settings.worker_concurrency.max(1);

        bundles
            .for_each_concurrent(limit, |bundle| {
                let (processed, failed, degraded) = (&processed, &failed, &degraded);
                async move {
                    match self.process(&bundle).await {
                        Ok(report) => {
                            processed.fetch_add(1, Ordering::Relaxed);
                            if report.is_degraded() {
                                degraded.fetch_add(1, Ordering::Relaxed);
                            }
                        }
                        Err(e) => {
                            failed.fetch_add(1, Ordering::Relaxed);
                            error!("Dropping {}: {}", bundle.transaction.hash, e);
                        }
                    }
                }
            })
            .await;

        let summary = PoolSummary {
            processed: processed.into_inner(),
            failed: failed.into_inner(),
            degraded: degraded.into_inner(),
        };
        info!(
            "Worker pool drained: {} processed, {} degraded, {} failed",
            summary.processed, summary.degraded, summary.failed
        );
        summary
    }
}
