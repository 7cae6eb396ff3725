//! In-memory store
//!
//! Same merge semantics as [`crate::PostgresStore`], with one mutex standing in
//! for row-level locking. Used as the store fake in pipeline tests; individual
//! operations can be made to fail to exercise error isolation.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use explorer_common::{
    Account, AccountDailyAnalytics, AccountDailyDelta, AccountEvent, AccountKind,
    AccountMethodStats, AccountTag, AccountTouch, AccountTransaction, ContractActivity,
    ContractDailyDelta, ContractDailyMetrics, ContractInteraction, ContractProvenance,
    ContractRegistry, ContractStandard, ExecutionSummary, ExplorerError, ExplorerStore,
    InteractionDelta, MethodExecution, RegisteredToken, Result, SmartContract, Tag, TokenDelta,
    TokenDirection, TokenHolding, TokenMetadata, Transaction, TransactionRole, TAG_SOURCE_SYSTEM,
};
use num_bigint::BigUint;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use crate::VerificationRecord;

#[derive(Default)]
struct MemoryState {
    accounts: HashMap<String, Account>,
    contracts: HashMap<String, SmartContract>,
    transactions: HashMap<String, Transaction>,
    account_transactions: HashMap<(String, String, TransactionRole), AccountTransaction>,
    holdings: HashMap<(String, String), TokenHolding>,
    interactions: HashMap<(String, String, String), ContractInteraction>,
    method_stats: HashMap<(String, String, Option<String>), AccountMethodStats>,
    account_daily: HashMap<(String, NaiveDate), AccountDailyAnalytics>,
    contract_daily: HashMap<(String, NaiveDate), ContractDailyMetrics>,
    events: HashMap<(String, String), AccountEvent>,
    tags: HashMap<String, BTreeMap<Tag, AccountTag>>,
    applied: HashSet<String>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    failing: Mutex<HashSet<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call of the named trait method fail with a store error
    pub fn fail_operation(&self, operation: &str) {
        self.failing.lock().insert(operation.to_string());
    }

    pub fn clear_failures(&self) {
        self.failing.lock().clear();
    }

    fn check(&self, operation: &str) -> Result<()> {
        if self.failing.lock().contains(operation) {
            return Err(ExplorerError::Store(format!(
                "injected failure in {}",
                operation
            )));
        }
        Ok(())
    }

    /// Attach verification data, creating the contract entry if needed
    pub fn register_verification(&self, address: &str, record: &VerificationRecord) {
        let mut state = self.state.lock();
        let contract = state.contracts.entry(address.to_string()).or_insert_with(|| {
            SmartContract::basic(address, ContractStandard::Unknown, false, None, Utc::now())
        });
        contract.abi = record.abi.clone();
        contract.name = record.name.clone().or(contract.name.take());
        contract.symbol = record.symbol.clone().or(contract.symbol.take());
        contract.decimals = record.decimals.or(contract.decimals);
        contract.source_code = record.source_code.clone();
        contract.compiler_version = record.compiler_version.clone();
        contract.is_verified = true;
    }

    /// Sum of all holder balances of a token
    pub fn token_supply(&self, token: &str) -> BigUint {
        self.state
            .lock()
            .holdings
            .values()
            .filter(|h| h.token_address == token)
            .map(|h| h.balance.clone())
            .sum()
    }

    pub fn account_transactions(&self, account: &str) -> Vec<AccountTransaction> {
        let mut rows: Vec<AccountTransaction> = self
            .state
            .lock()
            .account_transactions
            .values()
            .filter(|t| t.account_address == account)
            .cloned()
            .collect();
        rows.sort_by(|a, b| (a.block_number, &a.transaction_hash).cmp(&(b.block_number, &b.transaction_hash)));
        rows
    }
}

#[async_trait]
impl ExplorerStore for MemoryStore {
    async fn get_account(&self, address: &str) -> Result<Option<Account>> {
        self.check("get_account")?;
        Ok(self.state.lock().accounts.get(address).cloned())
    }

    async fn touch_account(&self, touch: &AccountTouch) -> Result<()> {
        self.check("touch_account")?;
        let mut state = self.state.lock();
        let account = state
            .accounts
            .entry(touch.address.clone())
            .or_insert_with(|| Account {
                address: touch.address.clone(),
                kind: AccountKind::ExternallyOwned,
                balance: None,
                nonce: 0,
                transaction_count: 0,
                contract_interaction_count: 0,
                deployments_count: 0,
                first_seen: touch.seen_at,
                last_activity: touch.seen_at,
                contract_type: None,
                risk_score: None,
                is_flagged: false,
            });
        if let Some(balance) = &touch.balance {
            account.balance = Some(balance.to_string());
        }
        if let Some(nonce) = touch.nonce {
            account.nonce = account.nonce.max(nonce);
        }
        account.transaction_count += 1;
        account.last_activity = account.last_activity.max(touch.seen_at);
        Ok(())
    }

    async fn upsert_contract_account(
        &self,
        address: &str,
        standard: ContractStandard,
        seen_at: DateTime<Utc>,
    ) -> Result<()> {
        self.check("upsert_contract_account")?;
        let mut state = self.state.lock();
        let account = state
            .accounts
            .entry(address.to_string())
            .or_insert_with(|| Account {
                address: address.to_string(),
                kind: AccountKind::Contract,
                balance: None,
                nonce: 0,
                transaction_count: 0,
                contract_interaction_count: 0,
                deployments_count: 0,
                first_seen: seen_at,
                last_activity: seen_at,
                contract_type: None,
                risk_score: None,
                is_flagged: false,
            });
        account.kind = AccountKind::Contract;
        if standard != ContractStandard::Unknown || account.contract_type.is_none() {
            account.contract_type = Some(standard);
        }
        account.last_activity = account.last_activity.max(seen_at);
        Ok(())
    }

    async fn increment_deployments(&self, address: &str, at: DateTime<Utc>) -> Result<()> {
        self.check("increment_deployments")?;
        let mut state = self.state.lock();
        let account = state
            .accounts
            .entry(address.to_string())
            .or_insert_with(|| Account {
                address: address.to_string(),
                kind: AccountKind::ExternallyOwned,
                balance: None,
                nonce: 0,
                transaction_count: 0,
                contract_interaction_count: 0,
                deployments_count: 0,
                first_seen: at,
                last_activity: at,
                contract_type: None,
                risk_score: None,
                is_flagged: false,
            });
        account.deployments_count += 1;
        Ok(())
    }

    async fn increment_contract_interactions(&self, address: &str, _at: DateTime<Utc>) -> Result<()> {
        self.check("increment_contract_interactions")?;
        if let Some(account) = self.state.lock().accounts.get_mut(address) {
            account.contract_interaction_count += 1;
        }
        Ok(())
    }

    async fn get_contract(&self, address: &str) -> Result<Option<SmartContract>> {
        self.check("get_contract")?;
        Ok(self.state.lock().contracts.get(address).cloned())
    }

    async fn is_known_contract(&self, address: &str) -> Result<bool> {
        self.check("is_known_contract")?;
        let state = self.state.lock();
        Ok(state.contracts.contains_key(address)
            || state
                .accounts
                .get(address)
                .map(|a| a.is_contract())
                .unwrap_or(false))
    }

    async fn insert_contract(&self, contract: &SmartContract) -> Result<bool> {
        self.check("insert_contract")?;
        let mut state = self.state.lock();
        if state.contracts.contains_key(&contract.address) {
            return Ok(false);
        }
        state
            .contracts
            .insert(contract.address.clone(), contract.clone());
        Ok(true)
    }

    async fn set_contract_provenance(
        &self,
        address: &str,
        provenance: &ContractProvenance,
    ) -> Result<()> {
        self.check("set_contract_provenance")?;
        if let Some(contract) = self.state.lock().contracts.get_mut(address) {
            if contract.provenance.is_none() {
                contract.provenance = Some(provenance.clone());
            }
        }
        Ok(())
    }

    async fn record_contract_activity(&self, activity: &ContractActivity) -> Result<()> {
        self.check("record_contract_activity")?;
        if let Some(contract) = self.state.lock().contracts.get_mut(&activity.contract_address) {
            contract.total_transactions += 1;
            contract.total_gas_used += &activity.gas_used;
            contract.total_value_transferred += &activity.value;
            contract.unique_addresses += u64::from(activity.new_address);
            contract.first_activity = Some(
                contract
                    .first_activity
                    .map_or(activity.at, |t| t.min(activity.at)),
            );
            contract.last_activity = Some(
                contract
                    .last_activity
                    .map_or(activity.at, |t| t.max(activity.at)),
            );
        }
        Ok(())
    }

    async fn find_creation_transaction(
        &self,
        address: &str,
    ) -> Result<Option<ContractProvenance>> {
        self.check("find_creation_transaction")?;
        let state = self.state.lock();
        Ok(state
            .transactions
            .values()
            .filter(|tx| tx.contract_address.as_deref() == Some(address))
            .min_by_key(|tx| (tx.block_number, tx.transaction_index))
            .map(|tx| ContractProvenance {
                creator_address: tx.from.clone(),
                creation_tx_hash: tx.hash.clone(),
                creation_block: tx.block_number,
                creation_timestamp: tx.timestamp,
            }))
    }

    async fn insert_transaction(&self, tx: &Transaction) -> Result<()> {
        self.check("insert_transaction")?;
        self.state
            .lock()
            .transactions
            .entry(tx.hash.clone())
            .or_insert_with(|| tx.clone());
        Ok(())
    }

    async fn record_account_transaction(&self, entry: &AccountTransaction) -> Result<()> {
        self.check("record_account_transaction")?;
        self.state
            .lock()
            .account_transactions
            .entry((
                entry.account_address.clone(),
                entry.transaction_hash.clone(),
                entry.role,
            ))
            .or_insert_with(|| entry.clone());
        Ok(())
    }

    async fn has_daily_counterparty_activity(
        &self,
        account: &str,
        counterparty: &str,
        date: NaiveDate,
        exclude_hash: &str,
    ) -> Result<bool> {
        self.check("has_daily_counterparty_activity")?;
        Ok(self.state.lock().account_transactions.values().any(|t| {
            t.account_address == account
                && t.counterparty.as_deref() == Some(counterparty)
                && t.timestamp.date_naive() == date
                && t.transaction_hash != exclude_hash
        }))
    }

    async fn get_token_holding(&self, holder: &str, token: &str) -> Result<Option<TokenHolding>> {
        self.check("get_token_holding")?;
        Ok(self
            .state
            .lock()
            .holdings
            .get(&(holder.to_string(), token.to_string()))
            .cloned())
    }

    async fn cached_token_metadata(&self, token: &str) -> Result<Option<TokenMetadata>> {
        self.check("cached_token_metadata")?;
        Ok(self
            .state
            .lock()
            .holdings
            .values()
            .filter(|h| h.token_address == token && !h.metadata.is_unknown())
            .max_by_key(|h| h.last_updated)
            .map(|h| h.metadata.clone()))
    }

    async fn apply_token_delta(&self, delta: &TokenDelta) -> Result<BigUint> {
        self.check("apply_token_delta")?;
        let mut state = self.state.lock();
        let holding = state
            .holdings
            .entry((delta.holder_address.clone(), delta.token_address.clone()))
            .or_insert_with(|| TokenHolding {
                holder_address: delta.holder_address.clone(),
                token_address: delta.token_address.clone(),
                balance: BigUint::default(),
                metadata: delta.metadata.clone(),
                last_updated: delta.at,
            });
        holding.balance = match delta.direction {
            TokenDirection::Credit => &holding.balance + &delta.amount,
            TokenDirection::Debit if holding.balance > delta.amount => {
                &holding.balance - &delta.amount
            }
            TokenDirection::Debit => BigUint::default(),
        };
        holding.metadata = delta.metadata.clone();
        holding.last_updated = delta.at;
        Ok(holding.balance.clone())
    }

    async fn count_token_holdings(&self, holder: &str) -> Result<u64> {
        self.check("count_token_holdings")?;
        let zero = BigUint::default();
        Ok(self
            .state
            .lock()
            .holdings
            .values()
            .filter(|h| h.holder_address == holder && h.balance > zero)
            .count() as u64)
    }

    async fn merge_account_daily(&self, delta: &AccountDailyDelta) -> Result<()> {
        self.check("merge_account_daily")?;
        self.state
            .lock()
            .account_daily
            .entry((delta.account_address.clone(), delta.date))
            .and_modify(|row| row.merge(delta))
            .or_insert_with(|| AccountDailyAnalytics::from_delta(delta));
        Ok(())
    }

    async fn merge_contract_daily(&self, delta: &ContractDailyDelta) -> Result<()> {
        self.check("merge_contract_daily")?;
        self.state
            .lock()
            .contract_daily
            .entry((delta.contract_address.clone(), delta.date))
            .and_modify(|row| row.merge(delta))
            .or_insert_with(|| ContractDailyMetrics::from_delta(delta));
        Ok(())
    }

    async fn merge_method_stats(&self, execution: &MethodExecution) -> Result<()> {
        self.check("merge_method_stats")?;
        self.state
            .lock()
            .method_stats
            .entry((
                execution.account_address.clone(),
                execution.method.clone(),
                execution.contract_address.clone(),
            ))
            .and_modify(|row| row.merge(execution))
            .or_insert_with(|| AccountMethodStats::from_execution(execution));
        Ok(())
    }

    async fn record_contract_interaction(&self, delta: &InteractionDelta) -> Result<bool> {
        self.check("record_contract_interaction")?;
        let mut state = self.state.lock();
        let seen = state.interactions.values().any(|i| {
            i.account_address == delta.account_address
                && i.contract_address == delta.contract_address
        });
        state
            .interactions
            .entry((
                delta.account_address.clone(),
                delta.contract_address.clone(),
                delta.method.clone(),
            ))
            .and_modify(|row| row.merge(delta))
            .or_insert_with(|| ContractInteraction::from_delta(delta));
        Ok(!seen)
    }

    async fn get_account_daily(
        &self,
        account: &str,
        date: NaiveDate,
    ) -> Result<Option<AccountDailyAnalytics>> {
        self.check("get_account_daily")?;
        Ok(self
            .state
            .lock()
            .account_daily
            .get(&(account.to_string(), date))
            .cloned())
    }

    async fn get_contract_daily(
        &self,
        contract: &str,
        date: NaiveDate,
    ) -> Result<Option<ContractDailyMetrics>> {
        self.check("get_contract_daily")?;
        Ok(self
            .state
            .lock()
            .contract_daily
            .get(&(contract.to_string(), date))
            .cloned())
    }

    async fn get_method_stats(
        &self,
        account: &str,
        method: &str,
        contract: Option<&str>,
    ) -> Result<Option<AccountMethodStats>> {
        self.check("get_method_stats")?;
        Ok(self
            .state
            .lock()
            .method_stats
            .get(&(
                account.to_string(),
                method.to_string(),
                contract.map(str::to_string),
            ))
            .cloned())
    }

    async fn get_contract_interactions(&self, account: &str) -> Result<Vec<ContractInteraction>> {
        self.check("get_contract_interactions")?;
        let mut rows: Vec<ContractInteraction> = self
            .state
            .lock()
            .interactions
            .values()
            .filter(|i| i.account_address == account)
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            (&a.contract_address, &a.method).cmp(&(&b.contract_address, &b.method))
        });
        Ok(rows)
    }

    async fn top_method(&self, account: &str) -> Result<Option<AccountMethodStats>> {
        self.check("top_method")?;
        Ok(self
            .state
            .lock()
            .method_stats
            .values()
            .filter(|s| s.account_address == account)
            .max_by_key(|s| (s.execution_count, s.last_execution))
            .cloned())
    }

    async fn execution_summary(&self, account: &str) -> Result<ExecutionSummary> {
        self.check("execution_summary")?;
        Ok(self
            .state
            .lock()
            .method_stats
            .values()
            .filter(|s| s.account_address == account)
            .fold(ExecutionSummary::default(), |acc, s| ExecutionSummary {
                executions: acc.executions + s.execution_count,
                successes: acc.successes + s.success_count,
            }))
    }

    async fn record_account_event(&self, event: &AccountEvent) -> Result<bool> {
        self.check("record_account_event")?;
        let mut state = self.state.lock();
        let key = (event.account_address.clone(), event.event_id.clone());
        if state.events.contains_key(&key) {
            return Ok(false);
        }
        state.events.insert(key, event.clone());
        Ok(true)
    }

    async fn account_events(&self, account: &str) -> Result<Vec<AccountEvent>> {
        self.check("account_events")?;
        let mut rows: Vec<AccountEvent> = self
            .state
            .lock()
            .events
            .values()
            .filter(|e| e.account_address == account)
            .cloned()
            .collect();
        rows.sort_by_key(|e| (e.block_number, e.log_index));
        Ok(rows)
    }

    async fn insert_tags(
        &self,
        account: &str,
        tags: &BTreeSet<Tag>,
        at: DateTime<Utc>,
    ) -> Result<()> {
        self.check("insert_tags")?;
        let mut state = self.state.lock();
        let rows = state.tags.entry(account.to_string()).or_default();
        for tag in tags {
            rows.entry(tag.clone()).or_insert_with(|| AccountTag {
                account_address: account.to_string(),
                tag: tag.clone(),
                source: TAG_SOURCE_SYSTEM.to_string(),
                created_at: at,
            });
        }
        Ok(())
    }

    async fn account_tags(&self, account: &str) -> Result<BTreeSet<Tag>> {
        self.check("account_tags")?;
        Ok(self
            .state
            .lock()
            .tags
            .get(account)
            .map(|rows| rows.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn mark_transaction_applied(&self, tx_hash: &str) -> Result<bool> {
        self.check("mark_transaction_applied")?;
        Ok(self.state.lock().applied.insert(tx_hash.to_string()))
    }
}

#[async_trait]
impl ContractRegistry for MemoryStore {
    async fn contract_abi(&self, address: &str) -> Result<Option<String>> {
        self.check("contract_abi")?;
        Ok(self
            .state
            .lock()
            .contracts
            .get(address)
            .and_then(|c| c.abi.clone()))
    }

    async fn token_info(&self, address: &str) -> Result<Option<RegisteredToken>> {
        self.check("token_info")?;
        Ok(self
            .state
            .lock()
            .contracts
            .get(address)
            .map(|c| RegisteredToken {
                symbol: c.symbol.clone(),
                name: c.name.clone(),
                decimals: c.decimals,
            }))
    }
}
