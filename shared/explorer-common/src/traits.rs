//! Seams between the pipeline and its collaborators
//!
//! The pipeline only talks to the outside world through these traits so that
//! tests can swap in in-process fakes for the chain node and the store.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use num_bigint::BigUint;
use std::collections::BTreeSet;

use crate::aggregates::{
    AccountDailyAnalytics, AccountDailyDelta, AccountMethodStats, ContractActivity,
    ContractDailyDelta, ContractDailyMetrics, ContractInteraction, ExecutionSummary,
    InteractionDelta, MethodExecution,
};
use crate::error::Result;
use crate::tags::Tag;
use crate::types::{
    Account, AccountEvent, AccountTouch, AccountTransaction, ContractCreation, ContractProvenance,
    ContractStandard, RegisteredToken, SmartContract, TokenDelta, TokenHolding, TokenMetadata,
    Transaction,
};

/// Read-only access to a chain node
#[async_trait]
pub trait ChainNode: Send + Sync {
    /// Native balance at the latest block, in base units
    async fn get_balance(&self, address: &str) -> Result<BigUint>;

    /// Deployed bytecode at the latest block; empty when there is none
    async fn get_code(&self, address: &str) -> Result<Vec<u8>>;

    /// Execute a read-only call against a contract
    async fn call(&self, to: &str, data: &[u8]) -> Result<Vec<u8>>;

    async fn block_number(&self) -> Result<u64>;

    /// Deployments mined in a block
    async fn contract_creations_in_block(&self, block_number: u64)
        -> Result<Vec<ContractCreation>>;
}

/// Verification data registered for contracts by the verification workflow
#[async_trait]
pub trait ContractRegistry: Send + Sync {
    /// Stored JSON ABI, if the contract was verified
    async fn contract_abi(&self, address: &str) -> Result<Option<String>>;

    async fn token_info(&self, address: &str) -> Result<Option<RegisteredToken>>;
}

/// "Is this address a contract" as seen by the pipeline
#[async_trait]
pub trait ContractLookup: Send + Sync {
    async fn is_contract(&self, address: &str) -> Result<bool>;
}

/// Persistent store of canonical and derived records
///
/// Every method is a single atomic statement against its key so concurrent
/// workers serialize at the row level inside the store.
#[async_trait]
pub trait ExplorerStore: Send + Sync {
    // Accounts

    async fn get_account(&self, address: &str) -> Result<Option<Account>>;

    /// Insert an externally-owned account or bump its transaction count
    async fn touch_account(&self, touch: &AccountTouch) -> Result<()>;

    /// Insert or promote an account to a contract
    async fn upsert_contract_account(
        &self,
        address: &str,
        standard: ContractStandard,
        seen_at: DateTime<Utc>,
    ) -> Result<()>;

    async fn increment_deployments(&self, address: &str, at: DateTime<Utc>) -> Result<()>;

    async fn increment_contract_interactions(&self, address: &str, at: DateTime<Utc>)
        -> Result<()>;

    // Contracts

    async fn get_contract(&self, address: &str) -> Result<Option<SmartContract>>;

    async fn is_known_contract(&self, address: &str) -> Result<bool>;

    /// Insert if absent; returns whether a row was written
    async fn insert_contract(&self, contract: &SmartContract) -> Result<bool>;

    /// Fill provenance fields that are still unknown
    async fn set_contract_provenance(
        &self,
        address: &str,
        provenance: &ContractProvenance,
    ) -> Result<()>;

    async fn record_contract_activity(&self, activity: &ContractActivity) -> Result<()>;

    /// Earliest stored transaction that deployed `address`
    async fn find_creation_transaction(&self, address: &str)
        -> Result<Option<ContractProvenance>>;

    // Canonical history

    async fn insert_transaction(&self, tx: &Transaction) -> Result<()>;

    async fn record_account_transaction(&self, entry: &AccountTransaction) -> Result<()>;

    /// Whether `account` has another transaction with `counterparty` on `date`
    async fn has_daily_counterparty_activity(
        &self,
        account: &str,
        counterparty: &str,
        date: NaiveDate,
        exclude_hash: &str,
    ) -> Result<bool>;

    // Tokens

    async fn get_token_holding(&self, holder: &str, token: &str) -> Result<Option<TokenHolding>>;

    /// Metadata previously resolved for `token` on any holding row
    async fn cached_token_metadata(&self, token: &str) -> Result<Option<TokenMetadata>>;

    /// Apply a credit or debit (floored at zero); returns the new balance
    async fn apply_token_delta(&self, delta: &TokenDelta) -> Result<BigUint>;

    /// Number of tokens the holder has a non-zero balance of
    async fn count_token_holdings(&self, holder: &str) -> Result<u64>;

    // Aggregates

    async fn merge_account_daily(&self, delta: &AccountDailyDelta) -> Result<()>;

    async fn merge_contract_daily(&self, delta: &ContractDailyDelta) -> Result<()>;

    async fn merge_method_stats(&self, execution: &MethodExecution) -> Result<()>;

    /// Returns true when the (account, contract) pair had no interaction before
    async fn record_contract_interaction(&self, delta: &InteractionDelta) -> Result<bool>;

    async fn get_account_daily(
        &self,
        account: &str,
        date: NaiveDate,
    ) -> Result<Option<AccountDailyAnalytics>>;

    async fn get_contract_daily(
        &self,
        contract: &str,
        date: NaiveDate,
    ) -> Result<Option<ContractDailyMetrics>>;

    async fn get_method_stats(
        &self,
        account: &str,
        method: &str,
        contract: Option<&str>,
    ) -> Result<Option<AccountMethodStats>>;

    async fn get_contract_interactions(&self, account: &str) -> Result<Vec<ContractInteraction>>;

    /// Method with the highest execution count for the account
    async fn top_method(&self, account: &str) -> Result<Option<AccountMethodStats>>;

    async fn execution_summary(&self, account: &str) -> Result<ExecutionSummary>;

    // Events and tags

    /// Insert if absent; returns whether a row was written
    async fn record_account_event(&self, event: &AccountEvent) -> Result<bool>;

    async fn account_events(&self, account: &str) -> Result<Vec<AccountEvent>>;

    async fn insert_tags(&self, account: &str, tags: &BTreeSet<Tag>, at: DateTime<Utc>)
        -> Result<()>;

    async fn account_tags(&self, account: &str) -> Result<BTreeSet<Tag>>;

    /// Record that a transaction's counting aggregates were applied;
    /// returns false when it had already been recorded
    async fn mark_transaction_applied(&self, tx_hash: &str) -> Result<bool>;
}
