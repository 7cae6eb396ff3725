//! Endpoint pool with round-robin rotation and failover
//!
//! Each endpoint carries its own circuit breaker. A call walks the endpoints
//! starting at the next round-robin slot, skipping open circuits, until one
//! answers or the retry budget is spent.

use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::circuit_breaker::{BreakerConfig, CircuitBreaker, CircuitState};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    pub jsonrpc: String,
    pub method: String,
    pub params: Vec<Value>,
    pub id: u64,
}

impl RpcRequest {
    pub fn new(method: &str, params: Vec<Value>, id: u64) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            method: method.to_string(),
            params,
            id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse {
    pub jsonrpc: String,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<RpcErrorObject>,
    pub id: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcErrorObject {
    pub code: i64,
    pub message: String,
    #[serde(default)]
    pub data: Option<Value>,
}

#[derive(Error, Debug)]
pub enum RpcClientError {
    #[error("No endpoints configured")]
    NoEndpoints,

    #[error("All endpoints are unhealthy (circuit breakers open)")]
    AllCircuitsOpen,

    #[error("HTTP error from {endpoint}: {message}")]
    Transport { endpoint: String, message: String },

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Invalid RPC response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Clone)]
pub struct EndpointPoolConfig {
    pub endpoints: Vec<String>,
    pub request_timeout: Duration,
    /// Attempts across all endpoints for one call
    pub max_retries: u32,
    pub circuit_breaker: BreakerConfig,
}

impl Default for EndpointPoolConfig {
    fn default() -> Self {
        Self {
            endpoints: vec!["http://localhost:8545".to_string()],
            request_timeout: Duration::from_secs(10),
            max_retries: 3,
            circuit_breaker: BreakerConfig::default(),
        }
    }
}

pub struct EndpointPool {
    client: HttpClient,
    breakers: Vec<CircuitBreaker>,
    cursor: AtomicUsize,
    next_id: AtomicU64,
    max_retries: u32,
}

impl EndpointPool {
    pub fn new(config: EndpointPoolConfig) -> Result<Self, RpcClientError> {
        if config.endpoints.is_empty() {
            return Err(RpcClientError::NoEndpoints);
        }

        let client = HttpClient::builder()
            .timeout(config.request_timeout)
            .user_agent("explorer-indexer/0.1")
            .build()
            .map_err(|e| RpcClientError::Transport {
                endpoint: "<client>".to_string(),
                message: format!("Failed to build HTTP client: {}", e),
            })?;

        let breakers = config
            .endpoints
            .iter()
            .map(|endpoint| CircuitBreaker::new(endpoint.clone(), config.circuit_breaker.clone()))
            .collect();

        Ok(Self {
            client,
            breakers,
            cursor: AtomicUsize::new(0),
            next_id: AtomicU64::new(1),
            max_retries: config.max_retries.max(1),
        })
    }

    fn next_endpoint(&self) -> Option<&CircuitBreaker> {
        let start = self.cursor.fetch_add(1, Ordering::Relaxed);
        let total = self.breakers.len();
        (0..total)
            .map(|offset| &self.breakers[(start + offset) % total])
            .find(|cb| cb.allow())
    }

    /// Send one JSON-RPC call, failing over between endpoints
    pub async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value, RpcClientError> {
        let request = RpcRequest::new(method, params, self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut last_error = None;

        for attempt in 1..=self.max_retries {
            let Some(breaker) = self.next_endpoint() else {
                warn!("No healthy endpoint for {}", method);
                return Err(RpcClientError::AllCircuitsOpen);
            };

            debug!(
                "Attempt {}/{} - {} via {}",
                attempt,
                self.max_retries,
                method,
                breaker.endpoint()
            );

            match self.send(breaker.endpoint(), &request).await {
                Ok(value) => {
                    breaker.on_success();
                    return Ok(value);
                }
                // The node answered; retrying elsewhere would give the same answer
                Err(err @ RpcClientError::Rpc { .. }) => {
                    breaker.on_success();
                    return Err(err);
                }
                Err(err) => {
                    breaker.on_failure();
                    warn!(
                        "RPC {} failed on {} (attempt {}/{}): {}",
                        method,
                        breaker.endpoint(),
                        attempt,
                        self.max_retries,
                        err
                    );
                    last_error = Some(err);
                    if attempt < self.max_retries {
                        tokio::time::sleep(Duration::from_millis(100 * attempt as u64)).await;
                    }
                }
            }
        }

        Err(last_error.unwrap_or(RpcClientError::AllCircuitsOpen))
    }

    async fn send(&self, endpoint: &str, request: &RpcRequest) -> Result<Value, RpcClientError> {
        let transport = |message: String| RpcClientError::Transport {
            endpoint: endpoint.to_string(),
            message,
        };

        let response = self
            .client
            .post(endpoint)
            .json(request)
            .send()
            .await
            .map_err(|e| transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(transport(format!("status {}", response.status())));
        }

        let body: RpcResponse = response
            .json()
            .await
            .map_err(|e| RpcClientError::InvalidResponse(e.to_string()))?;

        if let Some(error) = body.error {
            return Err(RpcClientError::Rpc {
                code: error.code,
                message: error.message,
            });
        }

        Ok(body.result.unwrap_or(Value::Null))
    }

    /// Number of endpoints whose circuit is not open
    pub fn healthy_endpoints(&self) -> usize {
        self.breakers
            .iter()
            .filter(|cb| cb.state() != CircuitState::Open)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_requires_endpoints() {
        let config = EndpointPoolConfig {
            endpoints: vec![],
            ..Default::default()
        };
        assert!(matches!(
            EndpointPool::new(config),
            Err(RpcClientError::NoEndpoints)
        ));
    }

    #[test]
    fn test_request_shape() {
        let request = RpcRequest::new("eth_blockNumber", vec![], 7);
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["jsonrpc"], "2.0");
        assert_eq!(json["method"], "eth_blockNumber");
        assert_eq!(json["id"], 7);
    }

    #[test]
    fn test_all_endpoints_start_healthy() {
        let config = EndpointPoolConfig {
            endpoints: vec!["http://a".to_string(), "http://b".to_string()],
            ..Default::default()
        };
        let pool = EndpointPool::new(config).unwrap();
        assert_eq!(pool.healthy_endpoints(), 2);
    }
}
