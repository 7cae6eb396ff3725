//! Embedded schema migrations
//!
//! Applied versions are tracked in `explorer_migrations` with the SHA-256 of
//! the SQL that was run. A session-level advisory lock keeps concurrently
//! starting indexers from applying the same version twice.

use sha2::{Digest, Sha256};
use tokio_postgres::Client;
use tracing::{debug, info, warn};

use crate::error::{StoreError, StoreResult};

const MIGRATION_LOCK_KEY: i64 = 0x6578_706c_6f72_6572;

const CREATE_MIGRATIONS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS explorer_migrations (
    version     INTEGER PRIMARY KEY,
    name        VARCHAR(255) NOT NULL,
    checksum    VARCHAR(64) NOT NULL,
    applied_at  TIMESTAMPTZ NOT NULL DEFAULT NOW()
);
"#;

pub struct Migration {
    pub version: i32,
    pub name: &'static str,
    pub up: &'static str,
}

impl Migration {
    pub fn checksum(&self) -> String {
        hex::encode(Sha256::digest(self.up.as_bytes()))
    }
}

/// All schema versions in application order
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "create_accounts_and_contracts",
        up: V001_ACCOUNTS_AND_CONTRACTS,
    },
    Migration {
        version: 2,
        name: "create_token_and_aggregate_tables",
        up: V002_TOKENS_AND_AGGREGATES,
    },
    Migration {
        version: 3,
        name: "create_events_tags_and_markers",
        up: V003_EVENTS_TAGS_MARKERS,
    },
];

const V001_ACCOUNTS_AND_CONTRACTS: &str = r#"
CREATE TABLE IF NOT EXISTS accounts (
    address                     TEXT PRIMARY KEY,
    kind                        TEXT NOT NULL,
    balance                     NUMERIC,
    nonce                       BIGINT NOT NULL DEFAULT 0,
    transaction_count           BIGINT NOT NULL DEFAULT 0,
    contract_interaction_count  BIGINT NOT NULL DEFAULT 0,
    deployments_count           BIGINT NOT NULL DEFAULT 0,
    first_seen                  TIMESTAMPTZ NOT NULL,
    last_activity               TIMESTAMPTZ NOT NULL,
    contract_type               TEXT,
    risk_score                  DOUBLE PRECISION,
    is_flagged                  BOOLEAN NOT NULL DEFAULT FALSE
);

CREATE TABLE IF NOT EXISTS smart_contracts (
    address                  TEXT PRIMARY KEY,
    name                     TEXT,
    symbol                   TEXT,
    decimals                 SMALLINT,
    contract_type            TEXT NOT NULL,
    creator_address          TEXT,
    creation_tx_hash         TEXT,
    creation_block           BIGINT,
    creation_timestamp       TIMESTAMPTZ,
    source_code              TEXT,
    abi                      TEXT,
    compiler_version         TEXT,
    is_verified              BOOLEAN NOT NULL DEFAULT FALSE,
    total_transactions       BIGINT NOT NULL DEFAULT 0,
    total_gas_used           NUMERIC NOT NULL DEFAULT 0,
    total_value_transferred  NUMERIC NOT NULL DEFAULT 0,
    unique_addresses         BIGINT NOT NULL DEFAULT 0,
    first_activity           TIMESTAMPTZ,
    last_activity            TIMESTAMPTZ,
    is_token                 BOOLEAN NOT NULL DEFAULT FALSE,
    is_proxy                 BOOLEAN NOT NULL DEFAULT FALSE,
    created_at               TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE TABLE IF NOT EXISTS transactions (
    hash               TEXT PRIMARY KEY,
    block_number       BIGINT NOT NULL,
    transaction_index  INTEGER NOT NULL,
    from_address       TEXT NOT NULL,
    to_address         TEXT,
    value              NUMERIC NOT NULL,
    gas_limit          BIGINT NOT NULL,
    gas_used           BIGINT NOT NULL,
    gas_price          NUMERIC NOT NULL,
    nonce              BIGINT NOT NULL,
    status             TEXT NOT NULL,
    input              BYTEA NOT NULL,
    contract_address   TEXT,
    timestamp          TIMESTAMPTZ NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_transactions_contract_address
    ON transactions (contract_address) WHERE contract_address IS NOT NULL;

CREATE TABLE IF NOT EXISTS account_transactions (
    account_address   TEXT NOT NULL,
    transaction_hash  TEXT NOT NULL,
    role              TEXT NOT NULL,
    counterparty      TEXT,
    block_number      BIGINT NOT NULL,
    method            TEXT NOT NULL,
    value             NUMERIC NOT NULL,
    status            TEXT NOT NULL,
    timestamp         TIMESTAMPTZ NOT NULL,
    PRIMARY KEY (account_address, transaction_hash, role)
);

CREATE INDEX IF NOT EXISTS idx_account_transactions_counterparty
    ON account_transactions (account_address, counterparty, timestamp);
"#;

const V002_TOKENS_AND_AGGREGATES: &str = r#"
CREATE TABLE IF NOT EXISTS token_holdings (
    holder_address  TEXT NOT NULL,
    token_address   TEXT NOT NULL,
    balance         NUMERIC NOT NULL DEFAULT 0,
    symbol          TEXT,
    name            TEXT,
    decimals        SMALLINT,
    last_updated    TIMESTAMPTZ NOT NULL,
    PRIMARY KEY (holder_address, token_address)
);

CREATE INDEX IF NOT EXISTS idx_token_holdings_token ON token_holdings (token_address);

CREATE TABLE IF NOT EXISTS contract_interactions (
    account_address    TEXT NOT NULL,
    contract_address   TEXT NOT NULL,
    method             TEXT NOT NULL,
    interaction_count  BIGINT NOT NULL,
    first_interaction  TIMESTAMPTZ NOT NULL,
    last_interaction   TIMESTAMPTZ NOT NULL,
    total_gas_used     NUMERIC NOT NULL,
    total_value        NUMERIC NOT NULL,
    PRIMARY KEY (account_address, contract_address, method)
);

-- '' stands for "no contract" so the key stays matchable by ON CONFLICT
CREATE TABLE IF NOT EXISTS account_method_stats (
    account_address   TEXT NOT NULL,
    method            TEXT NOT NULL,
    contract_address  TEXT NOT NULL DEFAULT '',
    execution_count   BIGINT NOT NULL,
    success_count     BIGINT NOT NULL,
    failure_count     BIGINT NOT NULL,
    total_gas_used    NUMERIC NOT NULL,
    avg_gas_used      DOUBLE PRECISION NOT NULL,
    total_value       NUMERIC NOT NULL,
    first_execution   TIMESTAMPTZ NOT NULL,
    last_execution    TIMESTAMPTZ NOT NULL,
    PRIMARY KEY (account_address, method, contract_address)
);

CREATE TABLE IF NOT EXISTS account_daily_analytics (
    account_address        TEXT NOT NULL,
    date                   DATE NOT NULL,
    transactions_count     BIGINT NOT NULL,
    gas_used               NUMERIC NOT NULL,
    value_transferred      NUMERIC NOT NULL,
    success_rate           DOUBLE PRECISION NOT NULL,
    contract_calls         BIGINT NOT NULL,
    unique_counterparties  BIGINT NOT NULL,
    PRIMARY KEY (account_address, date)
);

CREATE TABLE IF NOT EXISTS contract_daily_metrics (
    contract_address    TEXT NOT NULL,
    date                DATE NOT NULL,
    transactions_count  BIGINT NOT NULL,
    gas_used            NUMERIC NOT NULL,
    value_transferred   NUMERIC NOT NULL,
    success_rate        DOUBLE PRECISION NOT NULL,
    unique_addresses    BIGINT NOT NULL,
    PRIMARY KEY (contract_address, date)
);
"#;

const V003_EVENTS_TAGS_MARKERS: &str = r#"
CREATE TABLE IF NOT EXISTS account_events (
    account_address   TEXT NOT NULL,
    event_id          TEXT NOT NULL,
    transaction_hash  TEXT NOT NULL,
    block_number      BIGINT NOT NULL,
    log_index         INTEGER NOT NULL,
    contract_address  TEXT NOT NULL,
    event_name        TEXT NOT NULL,
    involvement_type  TEXT NOT NULL,
    parameters        JSONB NOT NULL DEFAULT '{}'::jsonb,
    timestamp         TIMESTAMPTZ NOT NULL,
    PRIMARY KEY (account_address, event_id)
);

CREATE TABLE IF NOT EXISTS account_tags (
    account_address  TEXT NOT NULL,
    tag              TEXT NOT NULL,
    source           TEXT NOT NULL,
    created_at       TIMESTAMPTZ NOT NULL,
    PRIMARY KEY (account_address, tag)
);

CREATE TABLE IF NOT EXISTS applied_transactions (
    transaction_hash  TEXT PRIMARY KEY,
    applied_at        TIMESTAMPTZ NOT NULL DEFAULT NOW()
);
"#;

/// Apply every migration not yet recorded; returns the versions applied
pub async fn run_migrations(client: &Client) -> StoreResult<Vec<i32>> {
    client.batch_execute(CREATE_MIGRATIONS_TABLE).await?;
    client
        .execute("SELECT pg_advisory_lock($1)", &[&MIGRATION_LOCK_KEY])
        .await?;

    let outcome = apply_pending(client).await;

    if let Err(e) = client
        .execute("SELECT pg_advisory_unlock($1)", &[&MIGRATION_LOCK_KEY])
        .await
    {
        warn!("Failed to release migration lock: {}", e);
    }

    outcome
}

async fn apply_pending(client: &Client) -> StoreResult<Vec<i32>> {
    let rows = client
        .query("SELECT version, checksum FROM explorer_migrations", &[])
        .await?;
    let applied: Vec<(i32, String)> = rows.iter().map(|r| (r.get(0), r.get(1))).collect();

    let mut newly_applied = Vec::new();
    for migration in MIGRATIONS {
        let checksum = migration.checksum();
        if let Some((_, recorded)) = applied.iter().find(|(v, _)| *v == migration.version) {
            if *recorded != checksum {
                warn!(
                    "Migration v{} ({}) changed since it was applied",
                    migration.version, migration.name
                );
            }
            debug!("Migration v{} already applied", migration.version);
            continue;
        }

        info!("Applying migration v{} ({})", migration.version, migration.name);
        if let Err(e) = client
            .batch_execute(&format!("BEGIN;\n{}\nCOMMIT;", migration.up))
            .await
        {
            if let Err(rollback) = client.batch_execute("ROLLBACK").await {
                warn!("Rollback after failed migration failed: {}", rollback);
            }
            return Err(StoreError::Migration(format!(
                "v{} {}: {}",
                migration.version, migration.name, e
            )));
        }
        client
            .execute(
                "INSERT INTO explorer_migrations (version, name, checksum) VALUES ($1, $2, $3)",
                &[&migration.version, &migration.name, &checksum],
            )
            .await?;
        newly_applied.push(migration.version);
    }

    Ok(newly_applied)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_versions_are_strictly_increasing() {
        let versions: Vec<i32> = MIGRATIONS.iter().map(|m| m.version).collect();
        assert!(versions.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_checksum_is_stable_hex() {
        let checksum = MIGRATIONS[0].checksum();
        assert_eq!(checksum.len(), 64);
        assert_eq!(checksum, MIGRATIONS[0].checksum());
    }
}
