//! Error types shared by every stage of the indexing pipeline

use thiserror::Error;

/// Errors surfaced through the chain node, registry and store seams
#[derive(Error, Debug)]
pub enum ExplorerError {
    /// Chain node unreachable or returned an RPC error
    #[error("Chain node error: {0}")]
    ChainNode(String),

    /// A chain node or store call exceeded its deadline
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Persistent store unreachable or rejected a statement
    #[error("Store error: {0}")]
    Store(String),

    /// Undecodable payload (ABI, log, RPC result)
    #[error("Decode error: {0}")]
    Decode(String),

    /// A write was refused because it would persist a contradictory fact
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Lookup of a required row failed
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ExplorerError {
    /// Whether the failure is an I/O hiccup rather than a data problem
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ExplorerError::ChainNode(_) | ExplorerError::Timeout(_) | ExplorerError::Store(_)
        )
    }
}

impl From<serde_json::Error> for ExplorerError {
    fn from(err: serde_json::Error) -> Self {
        ExplorerError::Decode(err.to_string())
    }
}

impl From<hex::FromHexError> for ExplorerError {
    fn from(err: hex::FromHexError) -> Self {
        ExplorerError::Decode(err.to_string())
    }
}

/// Result type used across the explorer crates
pub type Result<T> = std::result::Result<T, ExplorerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(ExplorerError::ChainNode("down".into()).is_transient());
        assert!(ExplorerError::Timeout("balance".into()).is_transient());
        assert!(ExplorerError::Store("refused".into()).is_transient());
        assert!(!ExplorerError::InvariantViolation("no code".into()).is_transient());
        assert!(!ExplorerError::Decode("bad abi".into()).is_transient());
    }

    #[test]
    fn test_json_error_maps_to_decode() {
        let err: ExplorerError = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert!(matches!(err, ExplorerError::Decode(_)));
    }
}
