//! Token metadata resolution
//!
//! Tiers, each tried only when the previous one has nothing usable:
//! 1. the contract registry (filled by contract verification)
//! 2. metadata cached on existing token holding rows
//! 3. `symbol()` / `name()` / `decimals()` calls against the token
//!
//! When every tier fails the sentinel [`TokenMetadata::unknown`] is returned;
//! balance updates never wait on metadata.

use abi_decoder::decoder::{decode_string_return, decode_u8_return};
use abi_decoder::known::{Selector, DECIMALS, NAME, SYMBOL};
use explorer_common::{ChainNode, ContractRegistry, ExplorerStore, Result, TokenMetadata};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::bounded;

pub struct TokenMetadataResolver {
    registry: Arc<dyn ContractRegistry>,
    store: Arc<dyn ExplorerStore>,
    chain: Arc<dyn ChainNode>,
    call_timeout: Duration,
}

impl TokenMetadataResolver {
    pub fn new(
        registry: Arc<dyn ContractRegistry>,
        store: Arc<dyn ExplorerStore>,
        chain: Arc<dyn ChainNode>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            store,
            chain,
            call_timeout,
        }
    }

    pub async fn resolve(&self, token: &str) -> TokenMetadata {
        match self.from_registry(token).await {
            Ok(Some(metadata)) => return metadata,
            Ok(None) => {}
            Err(e) => debug!("Registry lookup for {} failed: {}", token, e),
        }

        match self.store.cached_token_metadata(token).await {
            Ok(Some(metadata)) => return metadata,
            Ok(None) => {}
            Err(e) => debug!("Holding cache lookup for {} failed: {}", token, e),
        }

        if let Some(metadata) = self.from_chain(token).await {
            return metadata;
        }

        warn!("No metadata for token {}, using placeholder", token);
        TokenMetadata::unknown()
    }

    async fn from_registry(&self, token: &str) -> Result<Option<TokenMetadata>> {
        let Some(info) = self.registry.token_info(token).await? else {
            return Ok(None);
        };
        let Some(symbol) = info.symbol.filter(|s| !s.is_empty()) else {
            return Ok(None);
        };
        Ok(Some(TokenMetadata {
            name: info.name.unwrap_or_else(|| symbol.clone()),
            symbol,
            decimals: info.decimals.unwrap_or(TokenMetadata::DEFAULT_DECIMALS),
        }))
    }

    async fn from_chain(&self, token: &str) -> Option<TokenMetadata> {
        let symbol = self
            .view(token, SYMBOL)
            .await
            .and_then(|data| decode_string_return(&data));
        let name = self
            .view(token, NAME)
            .await
            .and_then(|data| decode_string_return(&data));

        if symbol.is_none() && name.is_none() {
            return None;
        }

        let decimals = self
            .view(token, DECIMALS)
            .await
            .and_then(|data| decode_u8_return(&data))
            .unwrap_or(TokenMetadata::DEFAULT_DECIMALS);

        Some(TokenMetadata {
            symbol: symbol.unwrap_or_else(|| TokenMetadata::UNKNOWN_SYMBOL.to_string()),
            name: name.unwrap_or_else(|| TokenMetadata::UNKNOWN_NAME.to_string()),
            decimals,
        })
    }

    async fn view(&self, token: &str, selector: Selector) -> Option<Vec<u8>> {
        let call = bounded(
            self.call_timeout,
            format!("eth_call 0x{} on {}", hex::encode(selector), token),
            self.chain.call(token, &selector),
        );
        match call.await {
            Ok(data) if !data.is_empty() => Some(data),
            Ok(_) => None,
            Err(e) => {
                debug!("View call on {} failed: {}", token, e);
                None
            }
        }
    }
}
