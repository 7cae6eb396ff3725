//! Shared fixtures for the pipeline tests

#![allow(dead_code)]

use abi_decoder::known::{Selector, TRANSFER, TRANSFER_EVENT_TOPIC, TRANSFER_FROM};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use explorer_common::{
    ChainNode, ContractCreation, ExplorerError, Event, Result, Transaction, TransactionBundle,
    TransactionStatus,
};
use explorer_store::MemoryStore;
use num_bigint::BigUint;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use transaction_indexer::{PipelineSettings, TransactionIndexer};

pub const ALICE: &str = "0xa1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1";
pub const BOB: &str = "0xb2b2b2b2b2b2b2b2b2b2b2b2b2b2b2b2b2b2b2b2";
pub const DEPLOYER: &str = "0xeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeee";
pub const TOKEN: &str = "0xc1c1c1c1c1c1c1c1c1c1c1c1c1c1c1c1c1c1c1c1";
pub const OTHER_TOKEN: &str = "0xc2c2c2c2c2c2c2c2c2c2c2c2c2c2c2c2c2c2c2c2";
pub const ZERO: &str = "0x0000000000000000000000000000000000000000";

/// In-process chain node backed by maps
#[derive(Default)]
pub struct FakeChain {
    pub balances: Mutex<HashMap<String, BigUint>>,
    pub code: Mutex<HashMap<String, Vec<u8>>>,
    pub views: Mutex<HashMap<(String, Selector), Vec<u8>>>,
    pub creations: Mutex<HashMap<u64, Vec<ContractCreation>>>,
    pub head: Mutex<u64>,
    pub offline: Mutex<bool>,
}

impl FakeChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_balance(&self, address: &str, balance: BigUint) {
        self.balances.lock().insert(address.to_string(), balance);
    }

    pub fn set_code(&self, address: &str, code: Vec<u8>) {
        self.code.lock().insert(address.to_string(), code);
    }

    pub fn set_view(&self, address: &str, selector: Selector, data: Vec<u8>) {
        self.views
            .lock()
            .insert((address.to_string(), selector), data);
    }

    pub fn add_creation(&self, block: u64, creation: ContractCreation) {
        self.creations.lock().entry(block).or_default().push(creation);
    }

    pub fn set_head(&self, head: u64) {
        *self.head.lock() = head;
    }

    fn check_online(&self) -> Result<()> {
        if *self.offline.lock() {
            return Err(ExplorerError::ChainNode("node offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ChainNode for FakeChain {
    async fn get_balance(&self, address: &str) -> Result<BigUint> {
        self.check_online()?;
        Ok(self
            .balances
            .lock()
            .get(address)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_code(&self, address: &str) -> Result<Vec<u8>> {
        self.check_online()?;
        Ok(self.code.lock().get(address).cloned().unwrap_or_default())
    }

    async fn call(&self, to: &str, data: &[u8]) -> Result<Vec<u8>> {
        self.check_online()?;
        let selector: Selector = data
            .get(..4)
            .and_then(|s| s.try_into().ok())
            .ok_or_else(|| ExplorerError::Decode("short calldata".to_string()))?;
        Ok(self
            .views
            .lock()
            .get(&(to.to_string(), selector))
            .cloned()
            .unwrap_or_default())
    }

    async fn block_number(&self) -> Result<u64> {
        self.check_online()?;
        Ok(*self.head.lock())
    }

    async fn contract_creations_in_block(&self, block_number: u64) -> Result<Vec<ContractCreation>> {
        self.check_online()?;
        Ok(self
            .creations
            .lock()
            .get(&block_number)
            .cloned()
            .unwrap_or_default())
    }
}

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub chain: Arc<FakeChain>,
    pub indexer: TransactionIndexer,
}

pub fn settings() -> PipelineSettings {
    PipelineSettings {
        stage_timeout: Duration::from_secs(2),
        worker_concurrency: 4,
        ..PipelineSettings::default()
    }
}

pub fn harness_with(settings: PipelineSettings) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let chain = Arc::new(FakeChain::new());
    let indexer = TransactionIndexer::new(store.clone(), store.clone(), chain.clone(), settings);
    Harness {
        store,
        chain,
        indexer,
    }
}

pub fn harness() -> Harness {
    harness_with(settings())
}

pub fn at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
}

pub fn ether(amount: u64) -> BigUint {
    BigUint::from(amount) * BigUint::from(10u64.pow(18))
}

pub fn native_transfer(hash: &str, from: &str, to: &str, value: BigUint) -> Transaction {
    Transaction {
        hash: hash.to_string(),
        block_number: 100,
        transaction_index: 0,
        from: from.to_string(),
        to: Some(to.to_string()),
        value,
        gas_limit: 21_000,
        gas_used: 21_000,
        gas_price: BigUint::from(1_000_000_000u64),
        nonce: 7,
        status: TransactionStatus::Success,
        input: vec![],
        contract_address: None,
        timestamp: at(),
    }
}

pub fn deployment(hash: &str, from: &str, created: &str) -> Transaction {
    Transaction {
        to: None,
        gas_limit: 2_000_000,
        gas_used: 1_200_000,
        input: vec![0x60, 0x80, 0x60, 0x40],
        contract_address: Some(created.to_string()),
        value: BigUint::default(),
        ..native_transfer(hash, from, ZERO, BigUint::default())
    }
}

pub fn token_call(hash: &str, from: &str, token: &str, to: &str, amount: u64) -> Transaction {
    let mut input = TRANSFER.to_vec();
    input.extend_from_slice(&word_address(to));
    input.extend_from_slice(&word_amount(amount));
    Transaction {
        gas_limit: 100_000,
        gas_used: 52_000,
        input,
        value: BigUint::default(),
        ..native_transfer(hash, from, token, BigUint::default())
    }
}

pub fn bundle(transaction: Transaction) -> TransactionBundle {
    TransactionBundle {
        transaction,
        events: vec![],
    }
}

pub fn word_address(address: &str) -> Vec<u8> {
    let mut word = vec![0u8; 12];
    word.extend_from_slice(&hex::decode(address.trim_start_matches("0x")).unwrap());
    word
}

pub fn word_amount(amount: u64) -> Vec<u8> {
    let mut word = vec![0u8; 24];
    word.extend_from_slice(&amount.to_be_bytes());
    word
}

pub fn topic(address: &str) -> String {
    format!("0x{}", hex::encode(word_address(address)))
}

pub fn transfer_event(tx: &Transaction, log_index: u32, from: &str, to: &str, amount: u64) -> Event {
    Event {
        transaction_hash: tx.hash.clone(),
        log_index,
        block_number: tx.block_number,
        contract_address: tx.to.clone().unwrap_or_default(),
        event_name: None,
        signature: None,
        topics: vec![TRANSFER_EVENT_TOPIC.to_string(), topic(from), topic(to)],
        data: word_amount(amount),
        decoded: None,
        from_address: None,
        to_address: None,
        timestamp: tx.timestamp,
    }
}

/// Runtime code carrying the ERC-20 dispatcher fingerprints
pub fn erc20_code() -> Vec<u8> {
    let mut code = vec![0x60, 0x80, 0x60, 0x40, 0x52];
    for selector in [TRANSFER, TRANSFER_FROM] {
        code.push(0x63);
        code.extend_from_slice(&selector);
        code.push(0x14);
    }
    code
}

/// ABI encoding of a single `string` return value
pub fn abi_string(value: &str) -> Vec<u8> {
    let mut data = word_amount(32);
    data.extend_from_slice(&word_amount(value.len() as u64));
    let mut body = value.as_bytes().to_vec();
    body.resize(value.len().div_ceil(32).max(1) * 32, 0);
    data.extend_from_slice(&body);
    data
}
