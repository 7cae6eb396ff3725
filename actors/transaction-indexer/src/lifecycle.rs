//! Account and contract lifecycle
//!
//! Creates and refreshes the canonical rows for every address a transaction
//! touches. Balances are always re-read from the chain node since internal
//! transfers and rewards never show up in transaction history.

use explorer_common::{
    AccountTouch, ChainNode, ContractLookup, ContractProvenance, ExplorerError, ExplorerStore,
    Result, SmartContract, Transaction,
};
use num_bigint::BigUint;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::bounded;
use crate::classifier::{classify, Classification};

/// What the lifecycle stage learned about the transaction's addresses
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LifecycleOutcome {
    /// Deployed contract and its classification
    pub created_contract: Option<(String, Classification)>,
    /// Recipient resolved as a contract and left to the contract path
    pub recipient_is_contract: bool,
}

pub struct LifecycleManager {
    store: Arc<dyn ExplorerStore>,
    chain: Arc<dyn ChainNode>,
    lookup: Arc<dyn ContractLookup>,
    chain_timeout: Duration,
    scan_window: u64,
}

impl LifecycleManager {
    pub fn new(
        store: Arc<dyn ExplorerStore>,
        chain: Arc<dyn ChainNode>,
        lookup: Arc<dyn ContractLookup>,
        chain_timeout: Duration,
        scan_window: u64,
    ) -> Self {
        Self {
            store,
            chain,
            lookup,
            chain_timeout,
            scan_window: scan_window.max(1),
        }
    }

    /// Upsert the sender, the recipient (unless it is a contract) and any
    /// deployed contract. Store failures are returned to the caller.
    pub async fn apply(&self, tx: &Transaction) -> Result<LifecycleOutcome> {
        let mut outcome = LifecycleOutcome::default();

        let balance = self.refresh_balance(&tx.from).await;
        self.store
            .touch_account(&AccountTouch {
                address: tx.from.clone(),
                balance,
                nonce: Some(tx.nonce + 1),
                seen_at: tx.timestamp,
            })
            .await?;

        if let Some(to) = tx.to.as_deref().filter(|to| *to != tx.from) {
            match self.lookup.is_contract(to).await {
                Ok(true) => outcome.recipient_is_contract = true,
                Ok(false) => {
                    let balance = self.refresh_balance(to).await;
                    self.store
                        .touch_account(&AccountTouch {
                            address: to.to_string(),
                            balance,
                            nonce: None,
                            seen_at: tx.timestamp,
                        })
                        .await?;
                }
                Err(e) => warn!("Could not resolve recipient {} of {}: {}", to, tx.hash, e),
            }
        }

        if let Some(created) = tx.contract_address.as_deref() {
            if tx.status.is_success() {
                let classification = self.classify_address(created).await;
                self.store
                    .upsert_contract_account(created, classification.standard, tx.timestamp)
                    .await?;
                self.store
                    .increment_deployments(&tx.from, tx.timestamp)
                    .await?;
                info!(
                    "{} deployed {} ({})",
                    tx.from, created, classification.standard
                );
                outcome.created_contract = Some((created.to_string(), classification));
            } else {
                debug!("Failed deployment {} creates no contract", tx.hash);
            }
        }

        Ok(outcome)
    }

    async fn refresh_balance(&self, address: &str) -> Option<BigUint> {
        match bounded(
            self.chain_timeout,
            format!("eth_getBalance for {}", address),
            self.chain.get_balance(address),
        )
        .await
        {
            Ok(balance) => Some(balance),
            Err(e) => {
                warn!("Keeping stored balance of {}: {}", address, e);
                None
            }
        }
    }

    async fn classify_address(&self, address: &str) -> Classification {
        match self.fetch_code(address).await {
            Ok(code) => classify(&code),
            Err(e) => {
                warn!("Could not read bytecode of {}: {}", address, e);
                classify(&[])
            }
        }
    }

    async fn fetch_code(&self, address: &str) -> Result<Vec<u8>> {
        bounded(
            self.chain_timeout,
            format!("eth_getCode for {}", address),
            self.chain.get_code(address),
        )
        .await
    }

    /// Make sure `address` has a smart contract entry
    ///
    /// Returns whether an entry was written. The address must carry code, and
    /// bytecode matching no known standard is only accepted from the address's
    /// own creation transaction.
    pub async fn ensure_contract_entry(&self, address: &str, tx: &Transaction) -> Result<bool> {
        if let Some(existing) = self.store.get_contract(address).await? {
            if existing.provenance.is_none() {
                if let Some(provenance) = self.store.find_creation_transaction(address).await? {
                    self.store
                        .set_contract_provenance(address, &provenance)
                        .await?;
                }
            }
            return Ok(false);
        }

        let code = self.fetch_code(address).await?;
        if code.is_empty() {
            return Err(ExplorerError::InvariantViolation(format!(
                "{} has no deployed code",
                address
            )));
        }

        let classification = classify(&code);
        let is_creation = tx.contract_address.as_deref() == Some(address);
        if classification.is_unknown() && !is_creation {
            return Err(ExplorerError::InvariantViolation(format!(
                "{} matches no known contract standard outside its creation transaction",
                address
            )));
        }

        let provenance = if is_creation {
            Some(ContractProvenance {
                creator_address: tx.from.clone(),
                creation_tx_hash: tx.hash.clone(),
                creation_block: tx.block_number,
                creation_timestamp: tx.timestamp,
            })
        } else {
            self.backfill_provenance(address).await?
        };

        let contract = SmartContract::basic(
            address,
            classification.standard,
            classification.is_proxy(),
            provenance,
            tx.timestamp,
        );
        let inserted = self.store.insert_contract(&contract).await?;
        self.store
            .upsert_contract_account(address, classification.standard, tx.timestamp)
            .await?;

        if inserted {
            info!(
                "Created contract entry {} ({}, proxy: {})",
                address,
                classification.standard,
                classification.is_proxy()
            );
        }
        Ok(inserted)
    }

    /// Recover who deployed `address`
    ///
    /// Stored history first, then a bounded backward scan of the chain. Not
    /// finding it is a normal outcome.
    pub async fn backfill_provenance(&self, address: &str) -> Result<Option<ContractProvenance>> {
        if let Some(provenance) = self.store.find_creation_transaction(address).await? {
            return Ok(Some(provenance));
        }

        match self.scan_for_creation(address).await {
            Ok(found) => Ok(found),
            Err(e) => {
                warn!("Creation scan for {} abandoned: {}", address, e);
                Ok(None)
            }
        }
    }

    async fn scan_for_creation(&self, address: &str) -> Result<Option<ContractProvenance>> {
        let head = bounded(
            self.chain_timeout,
            "eth_blockNumber".to_string(),
            self.chain.block_number(),
        )
        .await?;
        let lowest = head.saturating_sub(self.scan_window - 1);

        for block in (lowest..=head).rev() {
            let creations = bounded(
                self.chain_timeout,
                format!("creations in block {}", block),
                self.chain.contract_creations_in_block(block),
            )
            .await?;
            if let Some(creation) = creations
                .into_iter()
                .find(|c| c.contract_address == address)
            {
                debug!("Found creation of {} in block {}", address, block);
                return Ok(Some(creation.provenance));
            }
        }

        debug!(
            "No creation of {} in blocks {}..={}",
            address, lowest, head
        );
        Ok(None)
    }
}
