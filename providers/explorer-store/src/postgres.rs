//! PostgreSQL backend
//!
//! Big integers travel as decimal text (`$n::text::numeric` in, `col::text`
//! out) so no precision is lost between Rust and `NUMERIC` columns.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use explorer_common::{
    Account, AccountDailyAnalytics, AccountDailyDelta, AccountEvent, AccountKind,
    AccountMethodStats, AccountTouch, AccountTransaction, ContractActivity, ContractDailyDelta,
    ContractDailyMetrics, ContractInteraction, ContractProvenance, ContractRegistry,
    ContractStandard, ExecutionSummary, ExplorerError, ExplorerStore, InteractionDelta,
    MethodExecution, RegisteredToken, Result, SmartContract, Tag, TokenDelta, TokenDirection,
    TokenHolding, TokenMetadata, Transaction, TAG_SOURCE_SYSTEM,
};
use num_bigint::BigUint;
use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;
use tokio_postgres::{Client, NoTls, Row};
use tracing::{debug, info, warn};

use crate::error::{StoreError, StoreResult};
use crate::migrations::run_migrations;
use crate::VerificationRecord;

const ACCOUNT_COLUMNS: &str = "address, kind, balance::text, nonce, transaction_count, \
     contract_interaction_count, deployments_count, first_seen, last_activity, contract_type, \
     risk_score, is_flagged";

const CONTRACT_COLUMNS: &str = "address, name, symbol, decimals, contract_type, creator_address, \
     creation_tx_hash, creation_block, creation_timestamp, source_code, abi, compiler_version, \
     is_verified, total_transactions, total_gas_used::text, total_value_transferred::text, \
     unique_addresses, first_activity, last_activity, is_token, is_proxy, created_at";

const HOLDING_COLUMNS: &str =
    "holder_address, token_address, balance::text, symbol, name, decimals, last_updated";

const METHOD_STATS_COLUMNS: &str = "account_address, method, contract_address, execution_count, \
     success_count, failure_count, total_gas_used::text, avg_gas_used, total_value::text, \
     first_execution, last_execution";

const INTERACTION_COLUMNS: &str = "account_address, contract_address, method, interaction_count, \
     first_interaction, last_interaction, total_gas_used::text, total_value::text";

/// `''` stands in for "no contract" in the method stats key
const NO_CONTRACT: &str = "";

fn db(err: tokio_postgres::Error) -> ExplorerError {
    StoreError::from(err).into()
}

fn corrupt(msg: String) -> ExplorerError {
    StoreError::Corrupt(msg).into()
}

fn units(value: &BigUint) -> String {
    value.to_string()
}

fn parse_units(raw: &str) -> Result<BigUint> {
    BigUint::from_str(raw).map_err(|e| corrupt(format!("numeric {}: {}", raw, e)))
}

fn to_db_int(value: u64) -> Result<i64> {
    i64::try_from(value).map_err(|_| corrupt(format!("{} does not fit BIGINT", value)))
}

fn from_db_int(value: i64) -> u64 {
    value.max(0) as u64
}

fn parse_enum<T: FromStr<Err = String>>(raw: &str) -> Result<T> {
    raw.parse::<T>().map_err(corrupt)
}

fn decimals_from_db(value: Option<i16>) -> Option<u8> {
    value.and_then(|d| u8::try_from(d).ok())
}

fn account_from_row(row: &Row) -> Result<Account> {
    let kind: String = row.get(1);
    let contract_type: Option<String> = row.get(9);
    Ok(Account {
        address: row.get(0),
        kind: parse_enum::<AccountKind>(&kind)?,
        balance: row.get(2),
        nonce: from_db_int(row.get(3)),
        transaction_count: from_db_int(row.get(4)),
        contract_interaction_count: from_db_int(row.get(5)),
        deployments_count: from_db_int(row.get(6)),
        first_seen: row.get(7),
        last_activity: row.get(8),
        contract_type: contract_type
            .as_deref()
            .map(parse_enum::<ContractStandard>)
            .transpose()?,
        risk_score: row.get(10),
        is_flagged: row.get(11),
    })
}

fn contract_from_row(row: &Row) -> Result<SmartContract> {
    let contract_type: String = row.get(4);
    let creator: Option<String> = row.get(5);
    let creation_hash: Option<String> = row.get(6);
    let creation_block: Option<i64> = row.get(7);
    let creation_timestamp: Option<DateTime<Utc>> = row.get(8);
    let provenance = match (creator, creation_hash, creation_block, creation_timestamp) {
        (Some(creator_address), Some(creation_tx_hash), Some(block), Some(creation_timestamp)) => {
            Some(ContractProvenance {
                creator_address,
                creation_tx_hash,
                creation_block: from_db_int(block),
                creation_timestamp,
            })
        }
        _ => None,
    };
    let gas: String = row.get(14);
    let value: String = row.get(15);

    Ok(SmartContract {
        address: row.get(0),
        name: row.get(1),
        symbol: row.get(2),
        decimals: decimals_from_db(row.get(3)),
        contract_type: parse_enum(&contract_type)?,
        provenance,
        source_code: row.get(9),
        abi: row.get(10),
        compiler_version: row.get(11),
        is_verified: row.get(12),
        total_transactions: from_db_int(row.get(13)),
        total_gas_used: parse_units(&gas)?,
        total_value_transferred: parse_units(&value)?,
        unique_addresses: from_db_int(row.get(16)),
        first_activity: row.get(17),
        last_activity: row.get(18),
        is_token: row.get(19),
        is_proxy: row.get(20),
        created_at: row.get(21),
    })
}

fn metadata_from_columns(
    symbol: Option<String>,
    name: Option<String>,
    decimals: Option<i16>,
) -> TokenMetadata {
    let unknown = TokenMetadata::unknown();
    TokenMetadata {
        symbol: symbol.unwrap_or(unknown.symbol),
        name: name.unwrap_or(unknown.name),
        decimals: decimals_from_db(decimals).unwrap_or(unknown.decimals),
    }
}

fn holding_from_row(row: &Row) -> Result<TokenHolding> {
    let balance: String = row.get(2);
    Ok(TokenHolding {
        holder_address: row.get(0),
        token_address: row.get(1),
        balance: parse_units(&balance)?,
        metadata: metadata_from_columns(row.get(3), row.get(4), row.get(5)),
        last_updated: row.get(6),
    })
}

fn method_stats_from_row(row: &Row) -> Result<AccountMethodStats> {
    let contract: String = row.get(2);
    let gas: String = row.get(6);
    let value: String = row.get(8);
    Ok(AccountMethodStats {
        account_address: row.get(0),
        method: row.get(1),
        contract_address: (contract != NO_CONTRACT).then_some(contract),
        execution_count: from_db_int(row.get(3)),
        success_count: from_db_int(row.get(4)),
        failure_count: from_db_int(row.get(5)),
        total_gas_used: parse_units(&gas)?,
        avg_gas_used: row.get(7),
        total_value: parse_units(&value)?,
        first_execution: row.get(9),
        last_execution: row.get(10),
    })
}

fn interaction_from_row(row: &Row) -> Result<ContractInteraction> {
    let gas: String = row.get(6);
    let value: String = row.get(7);
    Ok(ContractInteraction {
        account_address: row.get(0),
        contract_address: row.get(1),
        method: row.get(2),
        interaction_count: from_db_int(row.get(3)),
        first_interaction: row.get(4),
        last_interaction: row.get(5),
        total_gas_used: parse_units(&gas)?,
        total_value: parse_units(&value)?,
    })
}

fn event_from_row(row: &Row) -> Result<AccountEvent> {
    let involvement: String = row.get(7);
    let parameters: String = row.get(8);
    let parameters: BTreeMap<String, String> = serde_json::from_str(&parameters)
        .map_err(|e| corrupt(format!("event parameters: {}", e)))?;
    let log_index: i32 = row.get(4);
    Ok(AccountEvent {
        account_address: row.get(0),
        event_id: row.get(1),
        transaction_hash: row.get(2),
        block_number: from_db_int(row.get(3)),
        log_index: log_index.max(0) as u32,
        contract_address: row.get(5),
        event_name: row.get(6),
        involvement: parse_enum(&involvement)?,
        parameters,
        timestamp: row.get(9),
    })
}

/// Store backed by a single PostgreSQL connection
pub struct PostgresStore {
    client: Client,
}

impl PostgresStore {
    /// Connect and bring the schema up to date
    pub async fn connect(database_url: &str) -> StoreResult<Self> {
        let (client, connection) = tokio_postgres::connect(database_url, NoTls).await?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                warn!("PostgreSQL connection error: {}", e);
            }
        });

        let applied = run_migrations(&client).await?;
        if !applied.is_empty() {
            info!("Applied migrations {:?}", applied);
        }

        Ok(Self { client })
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }

    /// Attach verification data, creating the contract entry if needed
    pub async fn register_verification(
        &self,
        address: &str,
        record: &VerificationRecord,
    ) -> Result<()> {
        let decimals = record.decimals.map(i16::from);
        self.client
            .execute(
                "INSERT INTO smart_contracts AS c
                    (address, contract_type, abi, name, symbol, decimals, source_code,
                     compiler_version, is_verified)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, TRUE)
                 ON CONFLICT (address) DO UPDATE SET
                    abi = EXCLUDED.abi,
                    name = COALESCE(EXCLUDED.name, c.name),
                    symbol = COALESCE(EXCLUDED.symbol, c.symbol),
                    decimals = COALESCE(EXCLUDED.decimals, c.decimals),
                    source_code = EXCLUDED.source_code,
                    compiler_version = EXCLUDED.compiler_version,
                    is_verified = TRUE",
                &[
                    &address,
                    &ContractStandard::Unknown.as_str(),
                    &record.abi,
                    &record.name,
                    &record.symbol,
                    &decimals,
                    &record.source_code,
                    &record.compiler_version,
                ],
            )
            .await
            .map_err(db)?;
        debug!("Registered verification data for {}", address);
        Ok(())
    }

    /// Sum of all holder balances of a token
    pub async fn token_supply(&self, token: &str) -> Result<BigUint> {
        let row = self
            .client
            .query_one(
                "SELECT COALESCE(SUM(balance), 0)::text FROM token_holdings WHERE token_address = $1",
                &[&token],
            )
            .await
            .map_err(db)?;
        let total: String = row.get(0);
        parse_units(&total)
    }
}

#[async_trait]
impl ExplorerStore for PostgresStore {
    async fn get_account(&self, address: &str) -> Result<Option<Account>> {
        let row = self
            .client
            .query_opt(
                &format!("SELECT {} FROM accounts WHERE address = $1", ACCOUNT_COLUMNS),
                &[&address],
            )
            .await
            .map_err(db)?;
        row.as_ref().map(account_from_row).transpose()
    }

    async fn touch_account(&self, touch: &AccountTouch) -> Result<()> {
        let balance = touch.balance.as_ref().map(units);
        let nonce = touch.nonce.map(to_db_int).transpose()?;
        self.client
            .execute(
                "INSERT INTO accounts AS a
                    (address, kind, balance, nonce, transaction_count, first_seen, last_activity)
                 VALUES ($1, $2, $3::text::numeric, COALESCE($4::bigint, 0), 1, $5, $5)
                 ON CONFLICT (address) DO UPDATE SET
                    balance = COALESCE(EXCLUDED.balance, a.balance),
                    nonce = GREATEST(a.nonce, COALESCE($4::bigint, a.nonce)),
                    transaction_count = a.transaction_count + 1,
                    last_activity = GREATEST(a.last_activity, EXCLUDED.last_activity)",
                &[
                    &touch.address,
                    &AccountKind::ExternallyOwned.as_str(),
                    &balance,
                    &nonce,
                    &touch.seen_at,
                ],
            )
            .await
            .map_err(db)?;
        Ok(())
    }

    async fn upsert_contract_account(
        &self,
        address: &str,
        standard: ContractStandard,
        seen_at: DateTime<Utc>,
    ) -> Result<()> {
        self.client
            .execute(
                "INSERT INTO accounts AS a (address, kind, first_seen, last_activity, contract_type)
                 VALUES ($1, $2, $3, $3, $4)
                 ON CONFLICT (address) DO UPDATE SET
                    kind = EXCLUDED.kind,
                    contract_type = COALESCE(
                        NULLIF(EXCLUDED.contract_type, 'unknown'),
                        a.contract_type,
                        EXCLUDED.contract_type),
                    last_activity = GREATEST(a.last_activity, EXCLUDED.last_activity)",
                &[
                    &address,
                    &AccountKind::Contract.as_str(),
                    &seen_at,
                    &standard.as_str(),
                ],
            )
            .await
            .map_err(db)?;
        Ok(())
    }

    async fn increment_deployments(&self, address: &str, at: DateTime<Utc>) -> Result<()> {
        self.client
            .execute(
                "INSERT INTO accounts AS a (address, kind, deployments_count, first_seen, last_activity)
                 VALUES ($1, $2, 1, $3, $3)
                 ON CONFLICT (address) DO UPDATE SET
                    deployments_count = a.deployments_count + 1",
                &[&address, &AccountKind::ExternallyOwned.as_str(), &at],
            )
            .await
            .map_err(db)?;
        Ok(())
    }

    async fn increment_contract_interactions(&self, address: &str, _at: DateTime<Utc>) -> Result<()> {
        self.client
            .execute(
                "UPDATE accounts SET contract_interaction_count = contract_interaction_count + 1
                 WHERE address = $1",
                &[&address],
            )
            .await
            .map_err(db)?;
        Ok(())
    }

    async fn get_contract(&self, address: &str) -> Result<Option<SmartContract>> {
        let row = self
            .client
            .query_opt(
                &format!("SELECT {} FROM smart_contracts WHERE address = $1", CONTRACT_COLUMNS),
                &[&address],
            )
            .await
            .map_err(db)?;
        row.as_ref().map(contract_from_row).transpose()
    }

    async fn is_known_contract(&self, address: &str) -> Result<bool> {
        let row = self
            .client
            .query_one(
                "SELECT EXISTS(SELECT 1 FROM smart_contracts WHERE address = $1)
                     OR EXISTS(SELECT 1 FROM accounts WHERE address = $1 AND kind = $2)",
                &[&address, &AccountKind::Contract.as_str()],
            )
            .await
            .map_err(db)?;
        Ok(row.get(0))
    }

    async fn insert_contract(&self, contract: &SmartContract) -> Result<bool> {
        let provenance = contract.provenance.as_ref();
        let creation_block = provenance
            .map(|p| to_db_int(p.creation_block))
            .transpose()?;
        let decimals = contract.decimals.map(i16::from);
        let rows = self
            .client
            .execute(
                "INSERT INTO smart_contracts
                    (address, name, symbol, decimals, contract_type, creator_address,
                     creation_tx_hash, creation_block, creation_timestamp, source_code, abi,
                     compiler_version, is_verified, total_transactions, total_gas_used,
                     total_value_transferred, unique_addresses, first_activity, last_activity,
                     is_token, is_proxy, created_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14,
                         $15::text::numeric, $16::text::numeric, $17, $18, $19, $20, $21, $22)
                 ON CONFLICT (address) DO NOTHING",
                &[
                    &contract.address,
                    &contract.name,
                    &contract.symbol,
                    &decimals,
                    &contract.contract_type.as_str(),
                    &provenance.map(|p| p.creator_address.as_str()),
                    &provenance.map(|p| p.creation_tx_hash.as_str()),
                    &creation_block,
                    &provenance.map(|p| p.creation_timestamp),
                    &contract.source_code,
                    &contract.abi,
                    &contract.compiler_version,
                    &contract.is_verified,
                    &to_db_int(contract.total_transactions)?,
                    &units(&contract.total_gas_used),
                    &units(&contract.total_value_transferred),
                    &to_db_int(contract.unique_addresses)?,
                    &contract.first_activity,
                    &contract.last_activity,
                    &contract.is_token,
                    &contract.is_proxy,
                    &contract.created_at,
                ],
            )
            .await
            .map_err(db)?;
        Ok(rows > 0)
    }

    async fn set_contract_provenance(
        &self,
        address: &str,
        provenance: &ContractProvenance,
    ) -> Result<()> {
        self.client
            .execute(
                "UPDATE smart_contracts SET
                    creator_address = COALESCE(creator_address, $2),
                    creation_tx_hash = COALESCE(creation_tx_hash, $3),
                    creation_block = COALESCE(creation_block, $4),
                    creation_timestamp = COALESCE(creation_timestamp, $5)
                 WHERE address = $1",
                &[
                    &address,
                    &provenance.creator_address,
                    &provenance.creation_tx_hash,
                    &to_db_int(provenance.creation_block)?,
                    &provenance.creation_timestamp,
                ],
            )
            .await
            .map_err(db)?;
        Ok(())
    }

    async fn record_contract_activity(&self, activity: &ContractActivity) -> Result<()> {
        self.client
            .execute(
                "UPDATE smart_contracts SET
                    total_transactions = total_transactions + 1,
                    total_gas_used = total_gas_used + $2::text::numeric,
                    total_value_transferred = total_value_transferred + $3::text::numeric,
                    unique_addresses = unique_addresses + $4::bigint,
                    first_activity = LEAST(first_activity, $5),
                    last_activity = GREATEST(last_activity, $5)
                 WHERE address = $1",
                &[
                    &activity.contract_address,
                    &units(&activity.gas_used),
                    &units(&activity.value),
                    &i64::from(activity.new_address),
                    &activity.at,
                ],
            )
            .await
            .map_err(db)?;
        Ok(())
    }

    async fn find_creation_transaction(
        &self,
        address: &str,
    ) -> Result<Option<ContractProvenance>> {
        let row = self
            .client
            .query_opt(
                "SELECT from_address, hash, block_number, timestamp FROM transactions
                 WHERE contract_address = $1
                 ORDER BY block_number, transaction_index
                 LIMIT 1",
                &[&address],
            )
            .await
            .map_err(db)?;
        Ok(row.map(|r| ContractProvenance {
            creator_address: r.get(0),
            creation_tx_hash: r.get(1),
            creation_block: from_db_int(r.get(2)),
            creation_timestamp: r.get(3),
        }))
    }

    async fn insert_transaction(&self, tx: &Transaction) -> Result<()> {
        let transaction_index = i32::try_from(tx.transaction_index)
            .map_err(|_| corrupt(format!("transaction index {}", tx.transaction_index)))?;
        self.client
            .execute(
                "INSERT INTO transactions
                    (hash, block_number, transaction_index, from_address, to_address, value,
                     gas_limit, gas_used, gas_price, nonce, status, input, contract_address,
                     timestamp)
                 VALUES ($1, $2, $3, $4, $5, $6::text::numeric, $7, $8, $9::text::numeric,
                         $10, $11, $12, $13, $14)
                 ON CONFLICT (hash) DO NOTHING",
                &[
                    &tx.hash,
                    &to_db_int(tx.block_number)?,
                    &transaction_index,
                    &tx.from,
                    &tx.to,
                    &units(&tx.value),
                    &to_db_int(tx.gas_limit)?,
                    &to_db_int(tx.gas_used)?,
                    &units(&tx.gas_price),
                    &to_db_int(tx.nonce)?,
                    &tx.status.as_str(),
                    &tx.input,
                    &tx.contract_address,
                    &tx.timestamp,
                ],
            )
            .await
            .map_err(db)?;
        Ok(())
    }

    async fn record_account_transaction(&self, entry: &AccountTransaction) -> Result<()> {
        self.client
            .execute(
                "INSERT INTO account_transactions
                    (account_address, transaction_hash, role, counterparty, block_number, method,
                     value, status, timestamp)
                 VALUES ($1, $2, $3, $4, $5, $6, $7::text::numeric, $8, $9)
                 ON CONFLICT (account_address, transaction_hash, role) DO NOTHING",
                &[
                    &entry.account_address,
                    &entry.transaction_hash,
                    &entry.role.as_str(),
                    &entry.counterparty,
                    &to_db_int(entry.block_number)?,
                    &entry.method,
                    &units(&entry.value),
                    &entry.status.as_str(),
                    &entry.timestamp,
                ],
            )
            .await
            .map_err(db)?;
        Ok(())
    }

    async fn has_daily_counterparty_activity(
        &self,
        account: &str,
        counterparty: &str,
        date: NaiveDate,
        exclude_hash: &str,
    ) -> Result<bool> {
        let row = self
            .client
            .query_one(
                "SELECT EXISTS(
                    SELECT 1 FROM account_transactions
                    WHERE account_address = $1
                      AND counterparty = $2
                      AND (timestamp AT TIME ZONE 'UTC')::date = $3
                      AND transaction_hash <> $4)",
                &[&account, &counterparty, &date, &exclude_hash],
            )
            .await
            .map_err(db)?;
        Ok(row.get(0))
    }

    async fn get_token_holding(&self, holder: &str, token: &str) -> Result<Option<TokenHolding>> {
        let row = self
            .client
            .query_opt(
                &format!(
                    "SELECT {} FROM token_holdings WHERE holder_address = $1 AND token_address = $2",
                    HOLDING_COLUMNS
                ),
                &[&holder, &token],
            )
            .await
            .map_err(db)?;
        row.as_ref().map(holding_from_row).transpose()
    }

    async fn cached_token_metadata(&self, token: &str) -> Result<Option<TokenMetadata>> {
        let row = self
            .client
            .query_opt(
                "SELECT symbol, name, decimals FROM token_holdings
                 WHERE token_address = $1 AND symbol IS NOT NULL AND symbol <> $2
                 ORDER BY last_updated DESC
                 LIMIT 1",
                &[&token, &TokenMetadata::UNKNOWN_SYMBOL],
            )
            .await
            .map_err(db)?;
        Ok(row.map(|r| metadata_from_columns(r.get(0), r.get(1), r.get(2))))
    }

    async fn apply_token_delta(&self, delta: &TokenDelta) -> Result<BigUint> {
        let credit = delta.direction == TokenDirection::Credit;
        let row = self
            .client
            .query_one(
                "INSERT INTO token_holdings AS h
                    (holder_address, token_address, balance, symbol, name, decimals, last_updated)
                 VALUES ($1, $2, CASE WHEN $7::bool THEN $3::text::numeric ELSE 0 END,
                         $4, $5, $6, $8)
                 ON CONFLICT (holder_address, token_address) DO UPDATE SET
                    balance = CASE WHEN $7::bool
                        THEN h.balance + $3::text::numeric
                        ELSE GREATEST(h.balance - $3::text::numeric, 0) END,
                    symbol = EXCLUDED.symbol,
                    name = EXCLUDED.name,
                    decimals = EXCLUDED.decimals,
                    last_updated = EXCLUDED.last_updated
                 RETURNING balance::text",
                &[
                    &delta.holder_address,
                    &delta.token_address,
                    &units(&delta.amount),
                    &delta.metadata.symbol,
                    &delta.metadata.name,
                    &i16::from(delta.metadata.decimals),
                    &credit,
                    &delta.at,
                ],
            )
            .await
            .map_err(db)?;
        let balance: String = row.get(0);
        parse_units(&balance)
    }

    async fn count_token_holdings(&self, holder: &str) -> Result<u64> {
        let row = self
            .client
            .query_one(
                "SELECT COUNT(*) FROM token_holdings WHERE holder_address = $1 AND balance > 0",
                &[&holder],
            )
            .await
            .map_err(db)?;
        Ok(from_db_int(row.get(0)))
    }

    async fn merge_account_daily(&self, delta: &AccountDailyDelta) -> Result<()> {
        let success_rate = if delta.success { 1.0f64 } else { 0.0f64 };
        self.client
            .execute(
                "INSERT INTO account_daily_analytics AS d
                    (account_address, date, transactions_count, gas_used, value_transferred,
                     success_rate, contract_calls, unique_counterparties)
                 VALUES ($1, $2, 1, $3::text::numeric, $4::text::numeric, $5, $6, $7)
                 ON CONFLICT (account_address, date) DO UPDATE SET
                    success_rate = (d.success_rate * d.transactions_count + EXCLUDED.success_rate)
                        / (d.transactions_count + 1),
                    transactions_count = d.transactions_count + 1,
                    gas_used = d.gas_used + EXCLUDED.gas_used,
                    value_transferred = d.value_transferred + EXCLUDED.value_transferred,
                    contract_calls = d.contract_calls + EXCLUDED.contract_calls,
                    unique_counterparties = d.unique_counterparties + EXCLUDED.unique_counterparties",
                &[
                    &delta.account_address,
                    &delta.date,
                    &units(&delta.gas_used),
                    &units(&delta.value),
                    &success_rate,
                    &i64::from(delta.contract_call),
                    &i64::from(delta.new_counterparty),
                ],
            )
            .await
            .map_err(db)?;
        Ok(())
    }

    async fn merge_contract_daily(&self, delta: &ContractDailyDelta) -> Result<()> {
        let success_rate = if delta.success { 1.0f64 } else { 0.0f64 };
        self.client
            .execute(
                "INSERT INTO contract_daily_metrics AS m
                    (contract_address, date, transactions_count, gas_used, value_transferred,
                     success_rate, unique_addresses)
                 VALUES ($1, $2, 1, $3::text::numeric, $4::text::numeric, $5, $6)
                 ON CONFLICT (contract_address, date) DO UPDATE SET
                    success_rate = (m.success_rate * m.transactions_count + EXCLUDED.success_rate)
                        / (m.transactions_count + 1),
                    transactions_count = m.transactions_count + 1,
                    gas_used = m.gas_used + EXCLUDED.gas_used,
                    value_transferred = m.value_transferred + EXCLUDED.value_transferred,
                    unique_addresses = m.unique_addresses + EXCLUDED.unique_addresses",
                &[
                    &delta.contract_address,
                    &delta.date,
                    &units(&delta.gas_used),
                    &units(&delta.value),
                    &success_rate,
                    &i64::from(delta.new_address),
                ],
            )
            .await
            .map_err(db)?;
        Ok(())
    }

    async fn merge_method_stats(&self, execution: &MethodExecution) -> Result<()> {
        let contract = execution.contract_address.as_deref().unwrap_or(NO_CONTRACT);
        let gas = explorer_common::codec::biguint_to_f64(&execution.gas_used);
        self.client
            .execute(
                "INSERT INTO account_method_stats AS s
                    (account_address, method, contract_address, execution_count, success_count,
                     failure_count, total_gas_used, avg_gas_used, total_value, first_execution,
                     last_execution)
                 VALUES ($1, $2, $3, 1, $4, $5, $6::text::numeric, $7, $8::text::numeric, $9, $9)
                 ON CONFLICT (account_address, method, contract_address) DO UPDATE SET
                    avg_gas_used = (s.avg_gas_used * s.execution_count + EXCLUDED.avg_gas_used)
                        / (s.execution_count + 1),
                    execution_count = s.execution_count + 1,
                    success_count = s.success_count + EXCLUDED.success_count,
                    failure_count = s.failure_count + EXCLUDED.failure_count,
                    total_gas_used = s.total_gas_used + EXCLUDED.total_gas_used,
                    total_value = s.total_value + EXCLUDED.total_value,
                    first_execution = LEAST(s.first_execution, EXCLUDED.first_execution),
                    last_execution = GREATEST(s.last_execution, EXCLUDED.last_execution)",
                &[
                    &execution.account_address,
                    &execution.method,
                    &contract,
                    &i64::from(execution.success),
                    &i64::from(!execution.success),
                    &units(&execution.gas_used),
                    &gas,
                    &units(&execution.value),
                    &execution.executed_at,
                ],
            )
            .await
            .map_err(db)?;
        Ok(())
    }

    async fn record_contract_interaction(&self, delta: &InteractionDelta) -> Result<bool> {
        let row = self
            .client
            .query_one(
                "WITH prior AS (
                    SELECT EXISTS(
                        SELECT 1 FROM contract_interactions
                        WHERE account_address = $1 AND contract_address = $2) AS seen
                 ), up AS (
                    INSERT INTO contract_interactions AS c
                        (account_address, contract_address, method, interaction_count,
                         first_interaction, last_interaction, total_gas_used, total_value)
                    VALUES ($1, $2, $3, 1, $6, $6, $4::text::numeric, $5::text::numeric)
                    ON CONFLICT (account_address, contract_address, method) DO UPDATE SET
                        interaction_count = c.interaction_count + 1,
                        first_interaction = LEAST(c.first_interaction, EXCLUDED.first_interaction),
                        last_interaction = GREATEST(c.last_interaction, EXCLUDED.last_interaction),
                        total_gas_used = c.total_gas_used + EXCLUDED.total_gas_used,
                        total_value = c.total_value + EXCLUDED.total_value
                    RETURNING 1
                 )
                 SELECT NOT seen FROM prior",
                &[
                    &delta.account_address,
                    &delta.contract_address,
                    &delta.method,
                    &units(&delta.gas_used),
                    &units(&delta.value),
                    &delta.at,
                ],
            )
            .await
            .map_err(db)?;
        Ok(row.get(0))
    }

    async fn get_account_daily(
        &self,
        account: &str,
        date: NaiveDate,
    ) -> Result<Option<AccountDailyAnalytics>> {
        let row = self
            .client
            .query_opt(
                "SELECT account_address, date, transactions_count, gas_used::text,
                        value_transferred::text, success_rate, contract_calls, unique_counterparties
                 FROM account_daily_analytics WHERE account_address = $1 AND date = $2",
                &[&account, &date],
            )
            .await
            .map_err(db)?;
        row.map(|r| {
            let gas: String = r.get(3);
            let value: String = r.get(4);
            Ok(AccountDailyAnalytics {
                account_address: r.get(0),
                date: r.get(1),
                transactions_count: from_db_int(r.get(2)),
                gas_used: parse_units(&gas)?,
                value_transferred: parse_units(&value)?,
                success_rate: r.get(5),
                contract_calls: from_db_int(r.get(6)),
                unique_counterparties: from_db_int(r.get(7)),
            })
        })
        .transpose()
    }

    async fn get_contract_daily(
        &self,
        contract: &str,
        date: NaiveDate,
    ) -> Result<Option<ContractDailyMetrics>> {
        let row = self
            .client
            .query_opt(
                "SELECT contract_address, date, transactions_count, gas_used::text,
                        value_transferred::text, success_rate, unique_addresses
                 FROM contract_daily_metrics WHERE contract_address = $1 AND date = $2",
                &[&contract, &date],
            )
            .await
            .map_err(db)?;
        row.map(|r| {
            let gas: String = r.get(3);
            let value: String = r.get(4);
            Ok(ContractDailyMetrics {
                contract_address: r.get(0),
                date: r.get(1),
                transactions_count: from_db_int(r.get(2)),
                gas_used: parse_units(&gas)?,
                value_transferred: parse_units(&value)?,
                success_rate: r.get(5),
                unique_addresses: from_db_int(r.get(6)),
            })
        })
        .transpose()
    }

    async fn get_method_stats(
        &self,
        account: &str,
        method: &str,
        contract: Option<&str>,
    ) -> Result<Option<AccountMethodStats>> {
        let contract = contract.unwrap_or(NO_CONTRACT);
        let row = self
            .client
            .query_opt(
                &format!(
                    "SELECT {} FROM account_method_stats
                     WHERE account_address = $1 AND method = $2 AND contract_address = $3",
                    METHOD_STATS_COLUMNS
                ),
                &[&account, &method, &contract],
            )
            .await
            .map_err(db)?;
        row.as_ref().map(method_stats_from_row).transpose()
    }

    async fn get_contract_interactions(&self, account: &str) -> Result<Vec<ContractInteraction>> {
        let rows = self
            .client
            .query(
                &format!(
                    "SELECT {} FROM contract_interactions WHERE account_address = $1
                     ORDER BY contract_address, method",
                    INTERACTION_COLUMNS
                ),
                &[&account],
            )
            .await
            .map_err(db)?;
        rows.iter().map(interaction_from_row).collect()
    }

    async fn top_method(&self, account: &str) -> Result<Option<AccountMethodStats>> {
        let row = self
            .client
            .query_opt(
                &format!(
                    "SELECT {} FROM account_method_stats WHERE account_address = $1
                     ORDER BY execution_count DESC, last_execution DESC
                     LIMIT 1",
                    METHOD_STATS_COLUMNS
                ),
                &[&account],
            )
            .await
            .map_err(db)?;
        row.as_ref().map(method_stats_from_row).transpose()
    }

    async fn execution_summary(&self, account: &str) -> Result<ExecutionSummary> {
        let row = self
            .client
            .query_one(
                "SELECT COALESCE(SUM(execution_count), 0)::bigint,
                        COALESCE(SUM(success_count), 0)::bigint
                 FROM account_method_stats WHERE account_address = $1",
                &[&account],
            )
            .await
            .map_err(db)?;
        Ok(ExecutionSummary {
            executions: from_db_int(row.get(0)),
            successes: from_db_int(row.get(1)),
        })
    }

    async fn record_account_event(&self, event: &AccountEvent) -> Result<bool> {
        let parameters = serde_json::to_string(&event.parameters)?;
        let log_index = i32::try_from(event.log_index)
            .map_err(|_| corrupt(format!("log index {}", event.log_index)))?;
        let rows = self
            .client
            .execute(
                "INSERT INTO account_events
                    (account_address, event_id, transaction_hash, block_number, log_index,
                     contract_address, event_name, involvement_type, parameters, timestamp)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9::text::jsonb, $10)
                 ON CONFLICT (account_address, event_id) DO NOTHING",
                &[
                    &event.account_address,
                    &event.event_id,
                    &event.transaction_hash,
                    &to_db_int(event.block_number)?,
                    &log_index,
                    &event.contract_address,
                    &event.event_name,
                    &event.involvement.as_str(),
                    &parameters,
                    &event.timestamp,
                ],
            )
            .await
            .map_err(db)?;
        Ok(rows > 0)
    }

    async fn account_events(&self, account: &str) -> Result<Vec<AccountEvent>> {
        let rows = self
            .client
            .query(
                "SELECT account_address, event_id, transaction_hash, block_number, log_index,
                        contract_address, event_name, involvement_type, parameters::text, timestamp
                 FROM account_events WHERE account_address = $1
                 ORDER BY block_number, log_index",
                &[&account],
            )
            .await
            .map_err(db)?;
        rows.iter().map(event_from_row).collect()
    }

    async fn insert_tags(
        &self,
        account: &str,
        tags: &BTreeSet<Tag>,
        at: DateTime<Utc>,
    ) -> Result<()> {
        if tags.is_empty() {
            return Ok(());
        }
        let names: Vec<String> = tags.iter().map(|t| t.as_str().to_string()).collect();
        self.client
            .execute(
                "INSERT INTO account_tags (account_address, tag, source, created_at)
                 SELECT $1, t, $3, $4 FROM UNNEST($2::text[]) AS t
                 ON CONFLICT (account_address, tag) DO NOTHING",
                &[&account, &names, &TAG_SOURCE_SYSTEM, &at],
            )
            .await
            .map_err(db)?;
        Ok(())
    }

    async fn account_tags(&self, account: &str) -> Result<BTreeSet<Tag>> {
        let rows = self
            .client
            .query(
                "SELECT tag FROM account_tags WHERE account_address = $1",
                &[&account],
            )
            .await
            .map_err(db)?;
        Ok(rows
            .iter()
            .map(|r| {
                let name: String = r.get(0);
                Tag::from_str(&name).unwrap_or_else(|never| match never {})
            })
            .collect())
    }

    async fn mark_transaction_applied(&self, tx_hash: &str) -> Result<bool> {
        let rows = self
            .client
            .execute(
                "INSERT INTO applied_transactions (transaction_hash) VALUES ($1)
                 ON CONFLICT (transaction_hash) DO NOTHING",
                &[&tx_hash],
            )
            .await
            .map_err(db)?;
        Ok(rows > 0)
    }
}

#[async_trait]
impl ContractRegistry for PostgresStore {
    async fn contract_abi(&self, address: &str) -> Result<Option<String>> {
        let row = self
            .client
            .query_opt("SELECT abi FROM smart_contracts WHERE address = $1", &[&address])
            .await
            .map_err(db)?;
        Ok(row.and_then(|r| r.get::<_, Option<String>>(0)))
    }

    async fn token_info(&self, address: &str) -> Result<Option<RegisteredToken>> {
        let row = self
            .client
            .query_opt(
                "SELECT symbol, name, decimals FROM smart_contracts WHERE address = $1",
                &[&address],
            )
            .await
            .map_err(db)?;
        Ok(row.map(|r| RegisteredToken {
            symbol: r.get(0),
            name: r.get(1),
            decimals: decimals_from_db(r.get(2)),
        }))
    }
}
