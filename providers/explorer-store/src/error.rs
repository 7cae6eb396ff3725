//! Store error types

use explorer_common::ExplorerError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    /// Connection or statement failure reported by PostgreSQL
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    #[error("Migration error: {0}")]
    Migration(String),

    /// A stored value could not be mapped back to a domain type
    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

impl From<StoreError> for ExplorerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Corrupt(msg) => ExplorerError::Decode(msg),
            other => ExplorerError::Store(other.to_string()),
        }
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;
