//! Chain RPC
//!
//! JSON-RPC implementation of [`ChainNode`] used by the indexer to read
//! balances, bytecode and view-call results, and to scan blocks for contract
//! deployments.
//!
//! Features:
//! - Multi-endpoint rotation with failover
//! - Circuit breaker per endpoint
//! - Linear back-off between attempts

pub mod circuit_breaker;
pub mod endpoint_pool;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use explorer_common::codec::{
    decode_hex, encode_hex, normalize_address, parse_hex_quantity, parse_hex_u64,
};
use explorer_common::{ChainNode, ContractCreation, ContractProvenance, ExplorerError, Result};
use num_bigint::BigUint;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

pub use circuit_breaker::{BreakerConfig, CircuitBreaker, CircuitState};
pub use endpoint_pool::{EndpointPool, EndpointPoolConfig, RpcClientError};

impl From<RpcClientError> for ExplorerError {
    fn from(err: RpcClientError) -> Self {
        match err {
            RpcClientError::InvalidResponse(msg) => ExplorerError::Decode(msg),
            other => ExplorerError::ChainNode(other.to_string()),
        }
    }
}

/// Connection settings for the chain node
#[derive(Debug, Clone)]
pub struct ChainRpcConfig {
    pub endpoints: Vec<String>,
    pub request_timeout_secs: u64,
    pub max_retries: u32,
    pub breaker_failure_threshold: u32,
    pub breaker_cool_down_secs: u64,
}

impl Default for ChainRpcConfig {
    fn default() -> Self {
        Self {
            endpoints: vec!["http://localhost:8545".to_string()],
            request_timeout_secs: 10,
            max_retries: 3,
            breaker_failure_threshold: 5,
            breaker_cool_down_secs: 30,
        }
    }
}

impl ChainRpcConfig {
    fn pool_config(&self) -> EndpointPoolConfig {
        EndpointPoolConfig {
            endpoints: self.endpoints.clone(),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            max_retries: self.max_retries,
            circuit_breaker: BreakerConfig {
                failure_threshold: self.breaker_failure_threshold,
                cool_down: Duration::from_secs(self.breaker_cool_down_secs),
                ..BreakerConfig::default()
            },
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BlockHeader {
    timestamp: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Receipt {
    transaction_hash: String,
    from: String,
    #[serde(default)]
    contract_address: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

/// Chain node reached over HTTP JSON-RPC
pub struct RpcChainNode {
    pool: EndpointPool,
}

impl RpcChainNode {
    pub fn new(config: &ChainRpcConfig) -> Result<Self> {
        let pool = EndpointPool::new(config.pool_config())?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &EndpointPool {
        &self.pool
    }

    async fn call_str(&self, method: &str, params: Vec<Value>) -> Result<String> {
        match self.pool.call(method, params).await? {
            Value::String(s) => Ok(s),
            other => Err(ExplorerError::Decode(format!(
                "{} returned non-string result: {}",
                method, other
            ))),
        }
    }
}

#[async_trait]
impl ChainNode for RpcChainNode {
    async fn get_balance(&self, address: &str) -> Result<BigUint> {
        let raw = self
            .call_str("eth_getBalance", vec![json!(address), json!("latest")])
            .await?;
        parse_hex_quantity(&raw)
    }

    async fn get_code(&self, address: &str) -> Result<Vec<u8>> {
        let raw = self
            .call_str("eth_getCode", vec![json!(address), json!("latest")])
            .await?;
        decode_hex(&raw)
    }

    async fn call(&self, to: &str, data: &[u8]) -> Result<Vec<u8>> {
        let raw = self
            .call_str(
                "eth_call",
                vec![json!({ "to": to, "data": encode_hex(data) }), json!("latest")],
            )
            .await?;
        decode_hex(&raw)
    }

    async fn block_number(&self) -> Result<u64> {
        let raw = self.call_str("eth_blockNumber", vec![]).await?;
        parse_hex_u64(&raw)
    }

    async fn contract_creations_in_block(&self, block_number: u64) -> Result<Vec<ContractCreation>> {
        let tag = format!("0x{:x}", block_number);

        let header = self
            .pool
            .call("eth_getBlockByNumber", vec![json!(tag), json!(false)])
            .await?;
        if header.is_null() {
            return Err(ExplorerError::NotFound(format!("block {}", block_number)));
        }
        let header: BlockHeader = serde_json::from_value(header)?;
        let seconds = parse_hex_u64(&header.timestamp)?;
        let timestamp = DateTime::<Utc>::from_timestamp(seconds as i64, 0).ok_or_else(|| {
            ExplorerError::Decode(format!("invalid block timestamp {}", header.timestamp))
        })?;

        let receipts = self
            .pool
            .call("eth_getBlockReceipts", vec![json!(tag)])
            .await?;
        let receipts: Vec<Receipt> = serde_json::from_value(receipts)?;

        let creations: Vec<ContractCreation> = receipts
            .into_iter()
            .filter(|r| r.status.as_deref() != Some("0x0"))
            .filter_map(|r| {
                let address = r.contract_address?;
                Some(ContractCreation {
                    contract_address: normalize_address(&address),
                    provenance: ContractProvenance {
                        creator_address: normalize_address(&r.from),
                        creation_tx_hash: r.transaction_hash,
                        creation_block: block_number,
                        creation_timestamp: timestamp,
                    },
                })
            })
            .collect();

        debug!(
            "Block {} contains {} contract creations",
            block_number,
            creations.len()
        );
        Ok(creations)
    }
}
