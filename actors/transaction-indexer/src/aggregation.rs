//! Aggregation maintainer
//!
//! Folds one transaction into the derived aggregates. Each operation builds a
//! single delta and hands it to the store, which merges it atomically against
//! the row's composite key.

use explorer_common::{
    AccountDailyDelta, AccountTransaction, ContractActivity, ContractDailyDelta, ExplorerStore,
    InteractionDelta, MethodExecution, Result, Transaction, TransactionRole,
};
use std::sync::Arc;
use tracing::debug;

use crate::method::ResolvedMethod;

pub struct AggregationMaintainer {
    store: Arc<dyn ExplorerStore>,
}

impl AggregationMaintainer {
    pub fn new(store: Arc<dyn ExplorerStore>) -> Self {
        Self { store }
    }

    /// Address the sender dealt with: the recipient, or the deployed contract
    fn counterparty(tx: &Transaction) -> Option<&str> {
        tx.to.as_deref().or(tx.contract_address.as_deref())
    }

    /// Fold the transaction into the sender's daily analytics row
    pub async fn account_daily(&self, tx: &Transaction, method: &ResolvedMethod) -> Result<()> {
        let date = tx.timestamp.date_naive();
        let new_counterparty = match Self::counterparty(tx) {
            Some(counterparty) => {
                !self
                    .store
                    .has_daily_counterparty_activity(&tx.from, counterparty, date, &tx.hash)
                    .await?
            }
            None => false,
        };

        self.store
            .merge_account_daily(&AccountDailyDelta {
                account_address: tx.from.clone(),
                date,
                gas_used: tx.gas_used_units(),
                value: tx.value.clone(),
                success: tx.status.is_success(),
                contract_call: method.is_contract_call(),
                new_counterparty,
            })
            .await
    }

    /// Record the (sender, contract, method) interaction
    ///
    /// Returns whether this was the sender's first interaction with the
    /// contract, or `None` when the transaction called no contract.
    pub async fn contract_interaction(
        &self,
        tx: &Transaction,
        method: &ResolvedMethod,
    ) -> Result<Option<bool>> {
        let Some(contract) = method.contract.as_deref().filter(|_| method.is_contract_call())
        else {
            return Ok(None);
        };

        let first = self
            .store
            .record_contract_interaction(&InteractionDelta {
                account_address: tx.from.clone(),
                contract_address: contract.to_string(),
                method: method.name.clone(),
                gas_used: tx.gas_used_units(),
                value: tx.value.clone(),
                at: tx.timestamp,
            })
            .await?;
        self.store
            .increment_contract_interactions(&tx.from, tx.timestamp)
            .await?;

        if first {
            debug!("First interaction of {} with {}", tx.from, contract);
        }
        Ok(Some(first))
    }

    /// Update the called contract's lifetime totals and daily metrics
    pub async fn contract_metrics(
        &self,
        tx: &Transaction,
        contract: &str,
        first_interaction: bool,
    ) -> Result<()> {
        self.store
            .record_contract_activity(&ContractActivity {
                contract_address: contract.to_string(),
                gas_used: tx.gas_used_units(),
                value: tx.value.clone(),
                new_address: first_interaction,
                at: tx.timestamp,
            })
            .await?;

        let date = tx.timestamp.date_naive();
        let new_address = !self
            .store
            .has_daily_counterparty_activity(&tx.from, contract, date, &tx.hash)
            .await?;
        self.store
            .merge_contract_daily(&ContractDailyDelta {
                contract_address: contract.to_string(),
                date,
                gas_used: tx.gas_used_units(),
                value: tx.value.clone(),
                success: tx.status.is_success(),
                new_address,
            })
            .await
    }

    /// Project the transaction onto every account it involves
    pub async fn account_transactions(
        &self,
        tx: &Transaction,
        method: &ResolvedMethod,
    ) -> Result<()> {
        let entry = |account: &str, role: TransactionRole, counterparty: Option<&str>| {
            AccountTransaction {
                account_address: account.to_string(),
                transaction_hash: tx.hash.clone(),
                role,
                counterparty: counterparty.map(str::to_string),
                block_number: tx.block_number,
                method: method.name.clone(),
                value: tx.value.clone(),
                status: tx.status,
                timestamp: tx.timestamp,
            }
        };

        self.store
            .record_account_transaction(&entry(
                &tx.from,
                TransactionRole::Sender,
                Self::counterparty(tx),
            ))
            .await?;

        if let Some(to) = tx.to.as_deref().filter(|to| *to != tx.from) {
            self.store
                .record_account_transaction(&entry(to, TransactionRole::Recipient, Some(&tx.from)))
                .await?;
        }

        if let Some(created) = tx.contract_address.as_deref() {
            self.store
                .record_account_transaction(&entry(
                    created,
                    TransactionRole::CreatedContract,
                    Some(&tx.from),
                ))
                .await?;
        }
        Ok(())
    }

    pub async fn method_stats(&self, tx: &Transaction, method: &ResolvedMethod) -> Result<()> {
        self.store
            .merge_method_stats(&MethodExecution {
                account_address: tx.from.clone(),
                method: method.name.clone(),
                contract_address: method.contract.clone(),
                success: tx.status.is_success(),
                gas_used: tx.gas_used_units(),
                value: tx.value.clone(),
                executed_at: tx.timestamp,
            })
            .await
    }
}
