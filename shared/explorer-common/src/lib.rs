//! Explorer Common Library
//!
//! Domain records for accounts, contracts, token holdings and the derived
//! aggregates the indexing pipeline maintains, together with the traits the
//! pipeline uses to reach the chain node, the contract registry and the store.

pub mod aggregates;
pub mod codec;
pub mod error;
pub mod tags;
pub mod traits;
pub mod types;

pub use aggregates::{
    AccountDailyAnalytics, AccountDailyDelta, AccountMethodStats, ContractActivity,
    ContractDailyDelta, ContractDailyMetrics, ContractInteraction, ExecutionSummary,
    InteractionDelta, MethodExecution,
};
pub use error::{ExplorerError, Result};
pub use tags::{AccountTag, Tag, TAG_SOURCE_SYSTEM};
pub use traits::{ChainNode, ContractLookup, ContractRegistry, ExplorerStore};
pub use types::{
    Account, AccountEvent, AccountKind, AccountTouch, AccountTransaction, ContractCreation,
    ContractProvenance, ContractStandard, Event, InvolvementType, RegisteredToken, SmartContract,
    TokenDelta, TokenDirection, TokenHolding, TokenMetadata, Transaction, TransactionBundle,
    TransactionRole, TransactionStatus,
};
