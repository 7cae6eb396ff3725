//! Account tagging rules
//!
//! [`derive_tags`] is a pure function of an account's accumulated statistics
//! and, optionally, the transaction being processed. Every category is
//! independent; a category contributes at most one band except token holdings,
//! which stacks.
//!
//! Stored tags are insert-only. A band earned once stays next to any band the
//! account moves into later (`newcomer` beside `active`, `medium_holder` beside
//! `whale`), so the stored set records every band ever reached. Read the
//! current band from [`derive_tags`] over a fresh snapshot.

use abi_decoder::known::{method_role, MethodRole};
use chrono::{DateTime, Utc};
use explorer_common::codec::biguint_to_f64;
use explorer_common::{
    Account, AccountMethodStats, ContractStandard, ExecutionSummary, ExplorerStore, Result, Tag,
    Transaction,
};
use num_bigint::BigUint;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::method::NATIVE_TRANSFER;

pub const NEWCOMER_MAX_TRANSACTIONS: u64 = 10;
pub const ACTIVE_MAX_TRANSACTIONS: u64 = 1_000;

/// Native units (base units / 1e18)
pub const WHALE_BALANCE: f64 = 1_000.0;
pub const LARGE_HOLDER_BALANCE: f64 = 100.0;
pub const MEDIUM_HOLDER_BALANCE: f64 = 10.0;
const BASE_UNITS_PER_NATIVE: f64 = 1e18;

/// Distinct contracts called
pub const DEFI_USER_CONTRACTS: u64 = 10;
pub const PROLIFIC_DEVELOPER_DEPLOYMENTS: u64 = 10;
pub const DIVERSIFIED_HOLDER_TOKENS: u64 = 10;

/// Minimum executions before reliability is judged
pub const RELIABILITY_MIN_EXECUTIONS: u64 = 10;
pub const RELIABLE_SUCCESS_RATE: f64 = 0.95;
pub const UNRELIABLE_SUCCESS_RATE: f64 = 0.5;

/// Statistics the rules read for one account
#[derive(Debug, Clone, PartialEq)]
pub struct AccountSnapshot {
    pub account: Account,
    /// Tokens held with a non-zero balance
    pub token_holdings: u64,
    /// Distinct contracts the account has called
    pub contracts_called: u64,
    /// Most executed method
    pub top_method: Option<AccountMethodStats>,
    pub execution: ExecutionSummary,
}

pub fn derive_tags(
    snapshot: &AccountSnapshot,
    tx: Option<&Transaction>,
    high_value_wei: &BigUint,
) -> BTreeSet<Tag> {
    let account = &snapshot.account;
    let mut tags = BTreeSet::new();

    if account.is_contract() {
        tags.insert(Tag::Contract);
        match account.contract_type {
            Some(ContractStandard::Erc20) => {
                tags.insert(Tag::TokenContract);
            }
            Some(ContractStandard::Erc721) => {
                tags.insert(Tag::NftContract);
            }
            Some(ContractStandard::Erc1155) => {
                tags.insert(Tag::MultiTokenContract);
            }
            _ => {}
        }
    } else {
        tags.insert(Tag::ExternallyOwned);
    }

    tags.insert(activity_band(account.transaction_count));

    if let Some(band) = account
        .balance_units()
        .and_then(|balance| balance_band(&balance))
    {
        tags.insert(band);
    }

    if snapshot.contracts_called >= DEFI_USER_CONTRACTS {
        tags.insert(Tag::DefiUser);
    }

    match account.deployments_count {
        0 => {}
        n if n >= PROLIFIC_DEVELOPER_DEPLOYMENTS => {
            tags.insert(Tag::ProlificDeveloper);
        }
        _ => {
            tags.insert(Tag::Developer);
        }
    }

    if let Some(tag) = snapshot
        .top_method
        .as_ref()
        .and_then(|top| dominant_method_tag(&top.method))
    {
        tags.insert(tag);
    }

    if snapshot.token_holdings >= 1 {
        tags.insert(Tag::TokenHolder);
    }
    if snapshot.token_holdings >= DIVERSIFIED_HOLDER_TOKENS {
        tags.insert(Tag::DiversifiedHolder);
    }

    if snapshot.execution.executions >= RELIABILITY_MIN_EXECUTIONS {
        if let Some(rate) = snapshot.execution.success_rate() {
            if rate >= RELIABLE_SUCCESS_RATE {
                tags.insert(Tag::Reliable);
            } else if rate <= UNRELIABLE_SUCCESS_RATE {
                tags.insert(Tag::Unreliable);
            }
        }
    }

    if let Some(tx) = tx {
        let is_sender = tx.from == account.address;
        let is_recipient = tx.to.as_deref() == Some(account.address.as_str());

        if is_sender && tx.is_contract_creation() {
            tags.insert(Tag::ContractCreator);
        }
        if is_sender && !tx.status.is_success() {
            tags.insert(Tag::FailedTransaction);
        }
        if (is_sender || is_recipient) && tx.value >= *high_value_wei {
            tags.insert(Tag::HighValueTransfer);
        }
    }

    tags
}

fn activity_band(transaction_count: u64) -> Tag {
    if transaction_count < NEWCOMER_MAX_TRANSACTIONS {
        Tag::Newcomer
    } else if transaction_count < ACTIVE_MAX_TRANSACTIONS {
        Tag::Active
    } else {
        Tag::HighlyActive
    }
}

fn balance_band(balance: &BigUint) -> Option<Tag> {
    let native = biguint_to_f64(balance) / BASE_UNITS_PER_NATIVE;
    if native >= WHALE_BALANCE {
        Some(Tag::Whale)
    } else if native >= LARGE_HOLDER_BALANCE {
        Some(Tag::LargeHolder)
    } else if native >= MEDIUM_HOLDER_BALANCE {
        Some(Tag::MediumHolder)
    } else if native > 0.0 {
        Some(Tag::SmallHolder)
    } else {
        None
    }
}

fn dominant_method_tag(method: &str) -> Option<Tag> {
    if method == NATIVE_TRANSFER {
        return Some(Tag::FrequentSender);
    }
    match method_role(method) {
        MethodRole::Transfer => Some(Tag::FrequentSender),
        MethodRole::Approval => Some(Tag::Approver),
        MethodRole::Swap => Some(Tag::Trader),
        MethodRole::Stake | MethodRole::Unstake | MethodRole::Other => None,
    }
}

/// Loads snapshots from the store and writes the derived tags back
pub struct TaggingEngine {
    store: Arc<dyn ExplorerStore>,
    high_value_wei: BigUint,
}

impl TaggingEngine {
    pub fn new(store: Arc<dyn ExplorerStore>, high_value_wei: BigUint) -> Self {
        Self {
            store,
            high_value_wei,
        }
    }

    pub async fn snapshot(&self, address: &str) -> Result<Option<AccountSnapshot>> {
        let Some(account) = self.store.get_account(address).await? else {
            return Ok(None);
        };
        let token_holdings = self.store.count_token_holdings(address).await?;
        let contracts_called = self
            .store
            .get_contract_interactions(address)
            .await?
            .into_iter()
            .map(|interaction| interaction.contract_address)
            .collect::<BTreeSet<_>>()
            .len() as u64;
        let top_method = self.store.top_method(address).await?;
        let execution = self.store.execution_summary(address).await?;
        Ok(Some(AccountSnapshot {
            account,
            token_holdings,
            contracts_called,
            top_method,
            execution,
        }))
    }

    /// Tag one account; an address without an account row gets nothing
    #[instrument(skip(self, tx))]
    pub async fn tag_account(
        &self,
        address: &str,
        tx: Option<&Transaction>,
    ) -> Result<BTreeSet<Tag>> {
        let Some(snapshot) = self.snapshot(address).await? else {
            debug!("No account row for {}, nothing to tag", address);
            return Ok(BTreeSet::new());
        };

        let tags = derive_tags(&snapshot, tx, &self.high_value_wei);
        let at: DateTime<Utc> = tx.map(|tx| tx.timestamp).unwrap_or_else(Utc::now);
        self.store.insert_tags(address, &tags, at).await?;
        debug!("{} tags for {}", tags.len(), address);
        Ok(tags)
    }
}
