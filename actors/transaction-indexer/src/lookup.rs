//! "Is this address a contract" with a read-through cache
//!
//! Answers from a bounded LRU of known contracts, then the store's known
//! contracts, then the chain node's bytecode. Only positive answers are cached.

use async_trait::async_trait;
use explorer_common::{ChainNode, ContractLookup, ExplorerStore, Result};
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::bounded;

pub struct ReadThroughContractLookup {
    store: Arc<dyn ExplorerStore>,
    chain: Arc<dyn ChainNode>,
    chain_timeout: Duration,
    known: Mutex<LruCache<String, ()>>,
}

impl ReadThroughContractLookup {
    pub fn new(
        store: Arc<dyn ExplorerStore>,
        chain: Arc<dyn ChainNode>,
        chain_timeout: Duration,
        capacity: usize,
    ) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            store,
            chain,
            chain_timeout,
            known: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn remember(&self, address: &str) {
        self.known.lock().put(address.to_string(), ());
    }

    pub fn cached(&self) -> usize {
        self.known.lock().len()
    }
}

#[async_trait]
impl ContractLookup for ReadThroughContractLookup {
    async fn is_contract(&self, address: &str) -> Result<bool> {
        if self.known.lock().get(address).is_some() {
            return Ok(true);
        }

        let is_contract = if self.store.is_known_contract(address).await? {
            true
        } else {
            let code = bounded(
                self.chain_timeout,
                format!("eth_getCode for {}", address),
                self.chain.get_code(address),
            )
            .await?;
            !code.is_empty()
        };

        if is_contract {
            debug!("{} resolved as contract", address);
            self.remember(address);
        }
        Ok(is_contract)
    }
}
