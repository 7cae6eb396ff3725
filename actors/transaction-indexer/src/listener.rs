//! NATS listener for indexed transaction bundles
//!
//! Subscribes to `explorer.transactions.*.indexed` and feeds every bundle to
//! the worker pool. A payload is either one bundle or an array of bundles.

use anyhow::{Context, Result};
use explorer_common::TransactionBundle;
use futures::{stream, StreamExt};
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::orchestrator::TransactionIndexer;

pub struct BundleListener {
    nats_url: String,
    subject: String,
    indexer: Arc<TransactionIndexer>,
}

impl BundleListener {
    pub fn new(nats_url: String, subject: String, indexer: Arc<TransactionIndexer>) -> Self {
        Self {
            nats_url,
            subject,
            indexer,
        }
    }

    /// Runs until the subscription ends
    #[instrument(skip(self))]
    pub async fn start(self) -> Result<()> {
        info!("Connecting to NATS at {}", self.nats_url);

        let client = async_nats::connect(&self.nats_url)
            .await
            .context("Failed to connect to NATS")?;

        let subscriber = client
            .subscribe(self.subject.clone())
            .await
            .context("Failed to subscribe to transaction subject")?;

        info!("Subscribed to {}", self.subject);

        let bundles = subscriber
            .filter_map(|message| async move {
                match parse_payload(&message.payload) {
                    Ok(bundles) => Some(stream::iter(bundles)),
                    Err(e) => {
                        warn!("Skipping message on {}: {}", message.subject, e);
                        None
                    }
                }
            })
            .flatten();

        let summary = self.indexer.process_many(bundles).await;

        warn!(
            "NATS subscription ended after {} transactions",
            summary.processed + summary.failed
        );
        Ok(())
    }
}

/// Decode a message body into bundles
pub fn parse_payload(payload: &[u8]) -> Result<Vec<TransactionBundle>> {
    let value: serde_json::Value =
        serde_json::from_slice(payload).context("Payload is not JSON")?;

    if value.is_array() {
        serde_json::from_value(value).context("Payload is not an array of transaction bundles")
    } else {
        let bundle = serde_json::from_value(value).context("Payload is not a transaction bundle")?;
        Ok(vec![bundle])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BUNDLE: &str = r#"{
        "transaction": {
            "hash": "0xaa",
            "block_number": 100,
            "transaction_index": 0,
            "from": "0xa1",
            "to": "0xb2",
            "value": "1000",
            "gas_limit": 21000,
            "gas_used": 21000,
            "gas_price": "1",
            "nonce": 4,
            "status": "success",
            "input": "0x",
            "contract_address": null,
            "timestamp": "2024-01-01T00:00:00Z"
        }
    }"#;

    #[test]
    fn test_single_bundle() {
        let bundles = parse_payload(BUNDLE.as_bytes()).unwrap();
        assert_eq!(bundles.len(), 1);
        assert_eq!(bundles[0].transaction.hash, "0xaa");
        assert!(bundles[0].events.is_empty());
    }

    #[test]
    fn test_bundle_array() {
        let payload = format!("[{}, {}]", BUNDLE, BUNDLE);
        let bundles = parse_payload(payload.as_bytes()).unwrap();
        assert_eq!(bundles.len(), 2);
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(parse_payload(b"not json").is_err());
        assert!(parse_payload(br#"{"transaction": 7}"#).is_err());
    }
}
