//! Incrementally merged statistics and the deltas that feed them
//!
//! Rows are keyed by their natural composite key. A delta carries exactly one
//! transaction's contribution; stores fold it into the row in one atomic step.
//! Averages and rates are recomputed from the pre-merge count:
//! `new = (old * old_count + sample) / (old_count + 1)`.

use chrono::{DateTime, NaiveDate, Utc};
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};

use crate::codec::{biguint_to_f64, decimal};

/// Fold one sample into a running average over `count` previous samples
pub fn running_average(previous: f64, count: u64, sample: f64) -> f64 {
    (previous * count as f64 + sample) / (count as f64 + 1.0)
}

fn success_sample(success: bool) -> f64 {
    if success {
        1.0
    } else {
        0.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountDailyAnalytics {
    pub account_address: String,
    pub date: NaiveDate,
    pub transactions_count: u64,
    #[serde(with = "decimal")]
    pub gas_used: BigUint,
    #[serde(with = "decimal")]
    pub value_transferred: BigUint,
    pub success_rate: f64,
    pub contract_calls: u64,
    pub unique_counterparties: u64,
}

/// One transaction's contribution to an account's day
#[derive(Debug, Clone, PartialEq)]
pub struct AccountDailyDelta {
    pub account_address: String,
    pub date: NaiveDate,
    pub gas_used: BigUint,
    pub value: BigUint,
    pub success: bool,
    pub contract_call: bool,
    pub new_counterparty: bool,
}

impl AccountDailyAnalytics {
    pub fn from_delta(delta: &AccountDailyDelta) -> Self {
        Self {
            account_address: delta.account_address.clone(),
            date: delta.date,
            transactions_count: 1,
            gas_used: delta.gas_used.clone(),
            value_transferred: delta.value.clone(),
            success_rate: success_sample(delta.success),
            contract_calls: u64::from(delta.contract_call),
            unique_counterparties: u64::from(delta.new_counterparty),
        }
    }

    pub fn merge(&mut self, delta: &AccountDailyDelta) {
        self.success_rate = running_average(
            self.success_rate,
            self.transactions_count,
            success_sample(delta.success),
        );
        self.transactions_count += 1;
        self.gas_used += &delta.gas_used;
        self.value_transferred += &delta.value;
        self.contract_calls += u64::from(delta.contract_call);
        self.unique_counterparties += u64::from(delta.new_counterparty);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractDailyMetrics {
    pub contract_address: String,
    pub date: NaiveDate,
    pub transactions_count: u64,
    #[serde(with = "decimal")]
    pub gas_used: BigUint,
    #[serde(with = "decimal")]
    pub value_transferred: BigUint,
    pub success_rate: f64,
    pub unique_addresses: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContractDailyDelta {
    pub contract_address: String,
    pub date: NaiveDate,
    pub gas_used: BigUint,
    pub value: BigUint,
    pub success: bool,
    /// Sender had no other transaction against the contract that day
    pub new_address: bool,
}

impl ContractDailyMetrics {
    pub fn from_delta(delta: &ContractDailyDelta) -> Self {
        Self {
            contract_address: delta.contract_address.clone(),
            date: delta.date,
            transactions_count: 1,
            gas_used: delta.gas_used.clone(),
            value_transferred: delta.value.clone(),
            success_rate: success_sample(delta.success),
            unique_addresses: u64::from(delta.new_address),
        }
    }

    pub fn merge(&mut self, delta: &ContractDailyDelta) {
        self.success_rate = running_average(
            self.success_rate,
            self.transactions_count,
            success_sample(delta.success),
        );
        self.transactions_count += 1;
        self.gas_used += &delta.gas_used;
        self.value_transferred += &delta.value;
        self.unique_addresses += u64::from(delta.new_address);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountMethodStats {
    pub account_address: String,
    pub method: String,
    /// `None` for plain value transfers
    pub contract_address: Option<String>,
    pub execution_count: u64,
    pub success_count: u64,
    pub failure_count: u64,
    #[serde(with = "decimal")]
    pub total_gas_used: BigUint,
    pub avg_gas_used: f64,
    #[serde(with = "decimal")]
    pub total_value: BigUint,
    pub first_execution: DateTime<Utc>,
    pub last_execution: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MethodExecution {
    pub account_address: String,
    pub method: String,
    pub contract_address: Option<String>,
    pub success: bool,
    pub gas_used: BigUint,
    pub value: BigUint,
    pub executed_at: DateTime<Utc>,
}

impl AccountMethodStats {
    pub fn from_execution(exec: &MethodExecution) -> Self {
        Self {
            account_address: exec.account_address.clone(),
            method: exec.method.clone(),
            contract_address: exec.contract_address.clone(),
            execution_count: 1,
            success_count: u64::from(exec.success),
            failure_count: u64::from(!exec.success),
            total_gas_used: exec.gas_used.clone(),
            avg_gas_used: biguint_to_f64(&exec.gas_used),
            total_value: exec.value.clone(),
            first_execution: exec.executed_at,
            last_execution: exec.executed_at,
        }
    }

    pub fn merge(&mut self, exec: &MethodExecution) {
        self.avg_gas_used = running_average(
            self.avg_gas_used,
            self.execution_count,
            biguint_to_f64(&exec.gas_used),
        );
        self.execution_count += 1;
        self.success_count += u64::from(exec.success);
        self.failure_count += u64::from(!exec.success);
        self.total_gas_used += &exec.gas_used;
        self.total_value += &exec.value;
        self.first_execution = self.first_execution.min(exec.executed_at);
        self.last_execution = self.last_execution.max(exec.executed_at);
    }

    pub fn success_rate(&self) -> f64 {
        if self.execution_count == 0 {
            return 0.0;
        }
        self.success_count as f64 / self.execution_count as f64
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractInteraction {
    pub account_address: String,
    pub contract_address: String,
    pub method: String,
    pub interaction_count: u64,
    pub first_interaction: DateTime<Utc>,
    pub last_interaction: DateTime<Utc>,
    #[serde(with = "decimal")]
    pub total_gas_used: BigUint,
    #[serde(with = "decimal")]
    pub total_value: BigUint,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InteractionDelta {
    pub account_address: String,
    pub contract_address: String,
    pub method: String,
    pub gas_used: BigUint,
    pub value: BigUint,
    pub at: DateTime<Utc>,
}

impl ContractInteraction {
    pub fn from_delta(delta: &InteractionDelta) -> Self {
        Self {
            account_address: delta.account_address.clone(),
            contract_address: delta.contract_address.clone(),
            method: delta.method.clone(),
            interaction_count: 1,
            first_interaction: delta.at,
            last_interaction: delta.at,
            total_gas_used: delta.gas_used.clone(),
            total_value: delta.value.clone(),
        }
    }

    pub fn merge(&mut self, delta: &InteractionDelta) {
        self.interaction_count += 1;
        self.first_interaction = self.first_interaction.min(delta.at);
        self.last_interaction = self.last_interaction.max(delta.at);
        self.total_gas_used += &delta.gas_used;
        self.total_value += &delta.value;
    }
}

/// Running totals added to a contract's profile for one transaction
#[derive(Debug, Clone, PartialEq)]
pub struct ContractActivity {
    pub contract_address: String,
    pub gas_used: BigUint,
    pub value: BigUint,
    /// First ever interaction between the sender and this contract
    pub new_address: bool,
    pub at: DateTime<Utc>,
}

/// Lifetime execution totals of an account across all methods
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutionSummary {
    pub executions: u64,
    pub successes: u64,
}

impl ExecutionSummary {
    pub fn success_rate(&self) -> Option<f64> {
        if self.executions == 0 {
            None
        } else {
            Some(self.successes as f64 / self.executions as f64)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
    }

    fn daily_delta(success: bool) -> AccountDailyDelta {
        AccountDailyDelta {
            account_address: "0xa1".to_string(),
            date: day(),
            gas_used: BigUint::from(21_000u32),
            value: BigUint::from(10u32),
            success,
            contract_call: false,
            new_counterparty: true,
        }
    }

    #[test]
    fn test_running_average() {
        assert_eq!(running_average(0.0, 0, 1.0), 1.0);
        assert_eq!(running_average(1.0, 1, 0.0), 0.5);
        assert!((running_average(0.5, 2, 1.0) - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_daily_merge_is_order_independent() {
        let mut a = AccountDailyAnalytics::from_delta(&daily_delta(true));
        a.merge(&daily_delta(false));

        let mut b = AccountDailyAnalytics::from_delta(&daily_delta(false));
        b.merge(&daily_delta(true));

        assert_eq!(a.transactions_count, 2);
        assert_eq!(a.success_rate, 0.5);
        assert_eq!(a.success_rate, b.success_rate);
        assert_eq!(a.gas_used, BigUint::from(42_000u32));
        assert_eq!(a.value_transferred, b.value_transferred);
    }

    #[test]
    fn test_method_stats_average_gas() {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let exec = |gas: u32, success: bool| MethodExecution {
            account_address: "0xa1".to_string(),
            method: "transfer".to_string(),
            contract_address: Some("0xc1".to_string()),
            success,
            gas_used: BigUint::from(gas),
            value: BigUint::default(),
            executed_at: at,
        };

        let mut stats = AccountMethodStats::from_execution(&exec(100, true));
        stats.merge(&exec(200, false));
        stats.merge(&exec(300, true));

        assert_eq!(stats.execution_count, 3);
        assert_eq!(stats.success_count, 2);
        assert_eq!(stats.failure_count, 1);
        assert_eq!(stats.avg_gas_used, 200.0);
        assert_eq!(stats.total_gas_used, BigUint::from(600u32));
    }

    #[test]
    fn test_execution_summary_rate() {
        assert_eq!(ExecutionSummary::default().success_rate(), None);
        let summary = ExecutionSummary {
            executions: 4,
            successes: 3,
        };
        assert_eq!(summary.success_rate(), Some(0.75));
    }
}
