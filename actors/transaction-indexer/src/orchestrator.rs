//! Per-transaction pipeline
//!
//! Runs the stages in a fixed order for one [`TransactionBundle`]. The account
//! lifecycle is the only stage allowed to abort processing; every later stage
//! runs under the stage deadline and its failure is logged and recorded on the
//! [`ProcessingReport`] while the remaining stages continue.

use explorer_common::{
    ChainNode, ContractLookup, ContractRegistry, ExplorerError, ExplorerStore, Result,
    Transaction, TransactionBundle,
};
use num_bigint::BigUint;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

use crate::aggregation::AggregationMaintainer;
use crate::attribution::EventAttributor;
use crate::config::DEFAULT_HIGH_VALUE_WEI;
use crate::lifecycle::LifecycleManager;
use crate::lookup::ReadThroughContractLookup;
use crate::method::resolve_method;
use crate::tagging::TaggingEngine;
use crate::token_metadata::TokenMetadataResolver;
use crate::transfers::TokenTransferProcessor;

/// Runtime knobs of the pipeline
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Deadline for one stage, chain-node calls included
    pub stage_timeout: Duration,
    /// Blocks scanned backward when recovering contract provenance
    pub creation_scan_window: u64,
    /// Value at or above which a transfer is tagged high-value
    pub high_value_wei: BigUint,
    /// Skip counting stages for transactions already applied
    pub dedupe_by_tx_hash: bool,
    pub worker_concurrency: usize,
    /// Contracts remembered by the in-process lookup cache
    pub contract_cache_size: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            stage_timeout: Duration::from_millis(15_000),
            creation_scan_window: 256,
            high_value_wei: DEFAULT_HIGH_VALUE_WEI
                .parse()
                .unwrap_or_else(|_| BigUint::from(10u32).pow(20)),
            dedupe_by_tx_hash: false,
            worker_concurrency: 8,
            contract_cache_size: 10_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Lifecycle,
    DailyAnalytics,
    ContractInteraction,
    TokenTransfers,
    Tagging,
    ContractLifecycle,
    ContractMetrics,
    AccountTransactions,
    MethodStats,
    EventAttribution,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Lifecycle => "lifecycle",
            Stage::DailyAnalytics => "daily_analytics",
            Stage::ContractInteraction => "contract_interaction",
            Stage::TokenTransfers => "token_transfers",
            Stage::Tagging => "tagging",
            Stage::ContractLifecycle => "contract_lifecycle",
            Stage::ContractMetrics => "contract_metrics",
            Stage::AccountTransactions => "account_transactions",
            Stage::MethodStats => "method_stats",
            Stage::EventAttribution => "event_attribution",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What happened to one transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessingReport {
    pub tx_hash: String,
    /// Stages whose failure or timeout was swallowed
    pub failed_stages: Vec<Stage>,
    /// Counting stages were skipped because the transaction was already applied
    pub counting_skipped: bool,
}

impl ProcessingReport {
    fn new(tx_hash: &str) -> Self {
        Self {
            tx_hash: tx_hash.to_string(),
            failed_stages: Vec::new(),
            counting_skipped: false,
        }
    }

    pub fn is_degraded(&self) -> bool {
        !self.failed_stages.is_empty()
    }
}

pub struct TransactionIndexer {
    store: Arc<dyn ExplorerStore>,
    registry: Arc<dyn ContractRegistry>,
    lookup: Arc<ReadThroughContractLookup>,
    lifecycle: LifecycleManager,
    aggregation: AggregationMaintainer,
    transfers: TokenTransferProcessor,
    tagging: TaggingEngine,
    attribution: EventAttributor,
    pub(crate) settings: PipelineSettings,
}

impl TransactionIndexer {
    pub fn new(
        store: Arc<dyn ExplorerStore>,
        registry: Arc<dyn ContractRegistry>,
        chain: Arc<dyn ChainNode>,
        settings: PipelineSettings,
    ) -> Self {
        let chain_timeout = settings.stage_timeout;
        let lookup = Arc::new(ReadThroughContractLookup::new(
            store.clone(),
            chain.clone(),
            chain_timeout,
            settings.contract_cache_size,
        ));
        let lifecycle = LifecycleManager::new(
            store.clone(),
            chain.clone(),
            lookup.clone(),
            chain_timeout,
            settings.creation_scan_window,
        );
        let metadata = Arc::new(TokenMetadataResolver::new(
            registry.clone(),
            store.clone(),
            chain,
            chain_timeout,
        ));

        Self {
            aggregation: AggregationMaintainer::new(store.clone()),
            transfers: TokenTransferProcessor::new(store.clone(), metadata),
            tagging: TaggingEngine::new(store.clone(), settings.high_value_wei.clone()),
            attribution: EventAttributor::new(store.clone(), registry.clone()),
            store,
            registry,
            lookup,
            lifecycle,
            settings,
        }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Index one transaction and its logs
    ///
    /// Returns an error only when the account lifecycle (or the idempotency
    /// marker, when enabled) could not be written.
    #[instrument(skip(self, bundle), fields(tx_hash = %bundle.transaction.hash))]
    pub async fn process(&self, bundle: &TransactionBundle) -> Result<ProcessingReport> {
        let bundle = &bundle.normalized();
        let tx = &bundle.transaction;
        let mut report = ProcessingReport::new(&tx.hash);

        let counting = if self.settings.dedupe_by_tx_hash {
            let fresh = self.store.mark_transaction_applied(&tx.hash).await.map_err(|e| {
                error!("Could not record {} as applied: {}", tx.hash, e);
                e
            })?;
            if !fresh {
                info!("{} already applied, skipping counting stages", tx.hash);
            }
            fresh
        } else {
            true
        };
        report.counting_skipped = !counting;

        // Stage 1
        let outcome = if counting {
            let outcome = match tokio::time::timeout(
                self.settings.stage_timeout,
                self.lifecycle.apply(tx),
            )
            .await
            {
                Ok(Ok(outcome)) => outcome,
                Ok(Err(e)) => {
                    error!("Lifecycle failed for {}, aborting: {}", tx.hash, e);
                    return Err(e);
                }
                Err(_) => {
                    error!("Lifecycle timed out for {}, aborting", tx.hash);
                    return Err(ExplorerError::Timeout(format!(
                        "lifecycle of {} exceeded {:?}",
                        tx.hash, self.settings.stage_timeout
                    )));
                }
            };
            if let Some((created, _)) = &outcome.created_contract {
                self.lookup.remember(created);
            }
            Some(outcome)
        } else {
            None
        };

        let recipient_is_contract = match (tx.to.as_deref(), &outcome) {
            (None, _) => false,
            (Some(_), Some(outcome)) => outcome.recipient_is_contract,
            (Some(to), None) => match self.lookup.is_contract(to).await {
                Ok(is_contract) => is_contract,
                Err(e) => {
                    warn!("Could not resolve recipient {} of {}: {}", to, tx.hash, e);
                    false
                }
            },
        };
        let method = resolve_method(tx, recipient_is_contract, self.registry.as_ref()).await;
        debug!("Resolved method {}", method.name);

        // Stages 2 and 3
        let mut first_interaction = None;
        if counting {
            self.run_stage(
                Stage::DailyAnalytics,
                &mut report,
                self.aggregation.account_daily(tx, &method),
            )
            .await;

            first_interaction = self
                .run_stage(
                    Stage::ContractInteraction,
                    &mut report,
                    self.aggregation.contract_interaction(tx, &method),
                )
                .await
                .flatten();

            // Stage 4
            self.run_stage(
                Stage::TokenTransfers,
                &mut report,
                self.transfers.process(tx, &bundle.events),
            )
            .await;
        }

        // Stage 5
        self.run_stage(Stage::Tagging, &mut report, async {
            let mut addresses = vec![tx.from.as_str()];
            addresses.extend(tx.to.as_deref().filter(|to| *to != tx.from));
            addresses.extend(tx.contract_address.as_deref());
            for address in addresses {
                self.tagging.tag_account(address, Some(tx)).await?;
            }
            Ok::<(), ExplorerError>(())
        })
        .await;

        // Stage 6
        self.run_stage(
            Stage::ContractLifecycle,
            &mut report,
            self.ensure_contract_entries(tx, recipient_is_contract),
        )
        .await;

        if counting && method.is_contract_call() {
            if let Some(contract) = method.contract.as_deref() {
                self.run_stage(
                    Stage::ContractMetrics,
                    &mut report,
                    self.aggregation.contract_metrics(
                        tx,
                        contract,
                        first_interaction.unwrap_or(false),
                    ),
                )
                .await;
            }
        }

        // Stage 7
        self.run_stage(
            Stage::AccountTransactions,
            &mut report,
            self.aggregation.account_transactions(tx, &method),
        )
        .await;

        // Stage 8
        if counting {
            self.run_stage(
                Stage::MethodStats,
                &mut report,
                self.aggregation.method_stats(tx, &method),
            )
            .await;
        }

        // Stage 9
        self.run_stage(
            Stage::EventAttribution,
            &mut report,
            self.attribution.attribute(&bundle.events),
        )
        .await;

        if report.is_degraded() {
            warn!(
                "Indexed {} with {} failed stage(s)",
                tx.hash,
                report.failed_stages.len()
            );
        } else {
            debug!("Indexed {}", tx.hash);
        }
        Ok(report)
    }

    /// Contract entries for the deployed contract and a contract recipient
    async fn ensure_contract_entries(
        &self,
        tx: &Transaction,
        recipient_is_contract: bool,
    ) -> Result<()> {
        if let Some(created) = tx.contract_address.as_deref() {
            if tx.status.is_success() {
                self.lifecycle.ensure_contract_entry(created, tx).await?;
            }
        }

        if let Some(to) = tx.to.as_deref().filter(|_| recipient_is_contract) {
            self.lifecycle.ensure_contract_entry(to, tx).await?;
        }
        Ok(())
    }

    async fn run_stage<T, F>(&self, stage: Stage, report: &mut ProcessingReport, work: F) -> Option<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.settings.stage_timeout, work).await {
            Ok(Ok(value)) => Some(value),
            Ok(Err(e)) => {
                warn!(
                    stage = stage.as_str(),
                    "Stage {} failed for {}: {}", stage, report.tx_hash, e
                );
                report.failed_stages.push(stage);
                None
            }
            Err(_) => {
                warn!(
                    stage = stage.as_str(),
                    "Stage {} timed out for {} after {:?}",
                    stage,
                    report.tx_hash,
                    self.settings.stage_timeout
                );
                report.failed_stages.push(stage);
                None
            }
        }
    }
}
