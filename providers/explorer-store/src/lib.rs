//! Explorer Store
//!
//! Persistence for the indexing pipeline. [`PostgresStore`] is the production
//! backend: every aggregate merge is a single `INSERT .. ON CONFLICT DO UPDATE`
//! so concurrent workers serialize on the row. [`MemoryStore`] mirrors the
//! same semantics in process for tests.

pub mod error;
pub mod memory;
pub mod migrations;
pub mod postgres;

pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use migrations::{run_migrations, Migration, MIGRATIONS};
pub use postgres::PostgresStore;

/// Data attached to a contract by the verification workflow
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VerificationRecord {
    pub abi: Option<String>,
    pub name: Option<String>,
    pub symbol: Option<String>,
    pub decimals: Option<u8>,
    pub source_code: Option<String>,
    pub compiler_version: Option<String>,
}
