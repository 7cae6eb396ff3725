//! Canonical records consumed and produced by the indexing pipeline

use chrono::{DateTime, Utc};
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::codec::{decimal, hex_bytes, normalize_address};

/// Execution status of a confirmed transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Success,
    Failed,
    Pending,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Success => "success",
            TransactionStatus::Failed => "failed",
            TransactionStatus::Pending => "pending",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, TransactionStatus::Success)
    }
}

impl FromStr for TransactionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" | "0x1" | "1" => Ok(TransactionStatus::Success),
            "failed" | "0x0" | "0" => Ok(TransactionStatus::Failed),
            "pending" => Ok(TransactionStatus::Pending),
            other => Err(format!("unknown transaction status: {}", other)),
        }
    }
}

/// A confirmed transaction as delivered by the ingest side
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub hash: String,
    pub block_number: u64,
    pub transaction_index: u32,
    pub from: String,
    pub to: Option<String>,
    #[serde(with = "decimal")]
    pub value: BigUint,
    pub gas_limit: u64,
    pub gas_used: u64,
    #[serde(with = "decimal")]
    pub gas_price: BigUint,
    pub nonce: u64,
    pub status: TransactionStatus,
    #[serde(with = "hex_bytes", default)]
    pub input: Vec<u8>,
    pub contract_address: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl Transaction {
    /// Whether the transaction deployed a contract
    pub fn is_contract_creation(&self) -> bool {
        self.contract_address.is_some()
    }

    /// The 4-byte selector, if the payload carries one
    pub fn selector(&self) -> Option<[u8; 4]> {
        self.input.get(..4).and_then(|s| s.try_into().ok())
    }

    /// Gas consumed, as a base-unit integer
    pub fn gas_used_units(&self) -> BigUint {
        BigUint::from(self.gas_used)
    }

    /// Lowercase every address so rows written for it share one key
    pub fn normalize_addresses(&mut self) {
        self.from = normalize_address(&self.from);
        normalize_optional(&mut self.to);
        normalize_optional(&mut self.contract_address);
    }
}

fn normalize_optional(address: &mut Option<String>) {
    if let Some(value) = address.as_mut() {
        *value = normalize_address(value);
    }
}

/// An event log emitted by a transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub transaction_hash: String,
    pub log_index: u32,
    pub block_number: u64,
    pub contract_address: String,
    pub event_name: Option<String>,
    pub signature: Option<String>,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(with = "hex_bytes", default)]
    pub data: Vec<u8>,
    #[serde(default)]
    pub decoded: Option<BTreeMap<String, String>>,
    pub from_address: Option<String>,
    pub to_address: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl Event {
    /// Stable identifier of the log within the chain
    pub fn event_id(&self) -> String {
        format!("{}:{}", self.transaction_hash, self.log_index)
    }

    pub fn topic0(&self) -> Option<&str> {
        self.topics.first().map(String::as_str)
    }

    pub fn normalize_addresses(&mut self) {
        self.contract_address = normalize_address(&self.contract_address);
        normalize_optional(&mut self.from_address);
        normalize_optional(&mut self.to_address);
    }
}

/// One transaction together with its logs, the unit of work of the pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionBundle {
    pub transaction: Transaction,
    #[serde(default)]
    pub events: Vec<Event>,
}

impl TransactionBundle {
    /// Copy of the bundle with every transaction and log address lowercased
    pub fn normalized(&self) -> Self {
        let mut bundle = self.clone();
        bundle.transaction.normalize_addresses();
        for event in &mut bundle.events {
            event.normalize_addresses();
        }
        bundle
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountKind {
    ExternallyOwned,
    Contract,
}

impl AccountKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountKind::ExternallyOwned => "eoa",
            AccountKind::Contract => "contract",
        }
    }
}

impl FromStr for AccountKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "eoa" => Ok(AccountKind::ExternallyOwned),
            "contract" => Ok(AccountKind::Contract),
            other => Err(format!("unknown account kind: {}", other)),
        }
    }
}

/// Token standard guessed from interface metadata or bytecode fingerprints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContractStandard {
    Erc20,
    Erc721,
    Erc1155,
    /// Code present, no recognized token fingerprint
    Generic,
    /// No code, or nothing could be inferred
    Unknown,
}

impl ContractStandard {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContractStandard::Erc20 => "erc20",
            ContractStandard::Erc721 => "erc721",
            ContractStandard::Erc1155 => "erc1155",
            ContractStandard::Generic => "generic",
            ContractStandard::Unknown => "unknown",
        }
    }

    pub fn is_token(&self) -> bool {
        matches!(
            self,
            ContractStandard::Erc20 | ContractStandard::Erc721 | ContractStandard::Erc1155
        )
    }
}

impl fmt::Display for ContractStandard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContractStandard {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "erc20" => Ok(ContractStandard::Erc20),
            "erc721" => Ok(ContractStandard::Erc721),
            "erc1155" => Ok(ContractStandard::Erc1155),
            "generic" => Ok(ContractStandard::Generic),
            "unknown" => Ok(ContractStandard::Unknown),
            other => Err(format!("unknown contract standard: {}", other)),
        }
    }
}

/// Canonical profile of any address seen on chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub address: String,
    pub kind: AccountKind,
    /// Last balance read from the chain node; `None` until one succeeds
    #[serde(default)]
    pub balance: Option<String>,
    pub nonce: u64,
    pub transaction_count: u64,
    pub contract_interaction_count: u64,
    pub deployments_count: u64,
    pub first_seen: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub contract_type: Option<ContractStandard>,
    pub risk_score: Option<f64>,
    pub is_flagged: bool,
}

impl Account {
    pub fn is_contract(&self) -> bool {
        self.kind == AccountKind::Contract
    }

    pub fn balance_units(&self) -> Option<BigUint> {
        self.balance.as_deref().and_then(|b| b.parse().ok())
    }
}

/// A single touch of an externally-owned account by a transaction
#[derive(Debug, Clone, PartialEq)]
pub struct AccountTouch {
    pub address: String,
    /// Fresh balance from the chain node, `None` keeps the stored one
    pub balance: Option<BigUint>,
    /// Next nonce, known only for the sender
    pub nonce: Option<u64>,
    pub seen_at: DateTime<Utc>,
}

/// Who deployed a contract and where
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractProvenance {
    pub creator_address: String,
    pub creation_tx_hash: String,
    pub creation_block: u64,
    pub creation_timestamp: DateTime<Utc>,
}

/// A deployment found by scanning a block on the chain node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractCreation {
    pub contract_address: String,
    pub provenance: ContractProvenance,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmartContract {
    pub address: String,
    pub name: Option<String>,
    pub symbol: Option<String>,
    pub decimals: Option<u8>,
    pub contract_type: ContractStandard,
    /// Unknown until the creation transaction has been located
    pub provenance: Option<ContractProvenance>,
    pub source_code: Option<String>,
    pub abi: Option<String>,
    pub compiler_version: Option<String>,
    pub is_verified: bool,
    pub total_transactions: u64,
    #[serde(with = "decimal")]
    pub total_gas_used: BigUint,
    #[serde(with = "decimal")]
    pub total_value_transferred: BigUint,
    pub unique_addresses: u64,
    pub first_activity: Option<DateTime<Utc>>,
    pub last_activity: Option<DateTime<Utc>>,
    pub is_token: bool,
    pub is_proxy: bool,
    pub created_at: DateTime<Utc>,
}

impl SmartContract {
    /// A bare entry with no activity and no verification data
    pub fn basic(
        address: &str,
        contract_type: ContractStandard,
        is_proxy: bool,
        provenance: Option<ContractProvenance>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            address: address.to_string(),
            name: None,
            symbol: None,
            decimals: None,
            contract_type,
            provenance,
            source_code: None,
            abi: None,
            compiler_version: None,
            is_verified: false,
            total_transactions: 0,
            total_gas_used: BigUint::default(),
            total_value_transferred: BigUint::default(),
            unique_addresses: 0,
            first_activity: None,
            last_activity: None,
            is_token: contract_type.is_token(),
            is_proxy,
            created_at: now,
        }
    }
}

/// Symbol, name and decimals of a token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenMetadata {
    pub symbol: String,
    pub name: String,
    pub decimals: u8,
}

impl TokenMetadata {
    pub const UNKNOWN_SYMBOL: &'static str = "UNKNOWN";
    pub const UNKNOWN_NAME: &'static str = "Unknown Token";
    pub const DEFAULT_DECIMALS: u8 = 18;

    /// Placeholder used when no source could describe the token
    pub fn unknown() -> Self {
        Self {
            symbol: Self::UNKNOWN_SYMBOL.to_string(),
            name: Self::UNKNOWN_NAME.to_string(),
            decimals: Self::DEFAULT_DECIMALS,
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.symbol == Self::UNKNOWN_SYMBOL
    }
}

/// Token fields filled in by contract verification, each possibly absent
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteredToken {
    pub symbol: Option<String>,
    pub name: Option<String>,
    pub decimals: Option<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenHolding {
    pub holder_address: String,
    pub token_address: String,
    #[serde(with = "decimal")]
    pub balance: BigUint,
    pub metadata: TokenMetadata,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenDirection {
    Credit,
    Debit,
}

/// Signed balance change for one holder of one token
#[derive(Debug, Clone, PartialEq)]
pub struct TokenDelta {
    pub holder_address: String,
    pub token_address: String,
    pub amount: BigUint,
    pub direction: TokenDirection,
    pub metadata: TokenMetadata,
    pub at: DateTime<Utc>,
}

/// Why an account is attached to an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvolvementType {
    Emitter,
    Participant,
    Recipient,
}

impl InvolvementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvolvementType::Emitter => "emitter",
            InvolvementType::Participant => "participant",
            InvolvementType::Recipient => "recipient",
        }
    }
}

impl FromStr for InvolvementType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "emitter" => Ok(InvolvementType::Emitter),
            "participant" => Ok(InvolvementType::Participant),
            "recipient" => Ok(InvolvementType::Recipient),
            other => Err(format!("unknown involvement type: {}", other)),
        }
    }
}

/// Denormalized view of an event from one account's perspective
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountEvent {
    pub account_address: String,
    pub event_id: String,
    pub transaction_hash: String,
    pub block_number: u64,
    pub log_index: u32,
    pub contract_address: String,
    pub event_name: String,
    pub involvement: InvolvementType,
    pub parameters: BTreeMap<String, String>,
    pub timestamp: DateTime<Utc>,
}

/// Role an account plays in a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionRole {
    Sender,
    Recipient,
    CreatedContract,
}

impl TransactionRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionRole::Sender => "sender",
            TransactionRole::Recipient => "recipient",
            TransactionRole::CreatedContract => "created_contract",
        }
    }
}

impl FromStr for TransactionRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sender" => Ok(TransactionRole::Sender),
            "recipient" => Ok(TransactionRole::Recipient),
            "created_contract" => Ok(TransactionRole::CreatedContract),
            other => Err(format!("unknown transaction role: {}", other)),
        }
    }
}

/// Per-account projection of a transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountTransaction {
    pub account_address: String,
    pub transaction_hash: String,
    pub role: TransactionRole,
    pub counterparty: Option<String>,
    pub block_number: u64,
    pub method: String,
    #[serde(with = "decimal")]
    pub value: BigUint,
    pub status: TransactionStatus,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_transaction() -> Transaction {
        Transaction {
            hash: "0xaa".to_string(),
            block_number: 10,
            transaction_index: 0,
            from: "0xa1".to_string(),
            to: Some("0xb1".to_string()),
            value: BigUint::from(5u32),
            gas_limit: 21_000,
            gas_used: 21_000,
            gas_price: BigUint::from(1u32),
            nonce: 3,
            status: TransactionStatus::Success,
            input: vec![0xa9, 0x05, 0x9c, 0xbb, 0x00],
            contract_address: None,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_bundle_addresses_are_lowercased() {
        let mut tx = sample_transaction();
        tx.from = "0xA1b2".to_string();
        tx.to = Some("0XC3D4".to_string());
        tx.contract_address = Some("0xEeEe".to_string());
        let bundle = TransactionBundle {
            events: vec![Event {
                transaction_hash: "0xaa".to_string(),
                log_index: 0,
                block_number: 10,
                contract_address: "0xC3D4".to_string(),
                event_name: None,
                signature: None,
                topics: vec![],
                data: vec![],
                decoded: None,
                from_address: Some("0xA1b2".to_string()),
                to_address: None,
                timestamp: tx.timestamp,
            }],
            transaction: tx,
        };

        let normalized = bundle.normalized();
        assert_eq!(normalized.transaction.from, "0xa1b2");
        assert_eq!(normalized.transaction.to.as_deref(), Some("0xc3d4"));
        assert_eq!(normalized.transaction.contract_address.as_deref(), Some("0xeeee"));
        assert_eq!(normalized.events[0].contract_address, "0xc3d4");
        assert_eq!(normalized.events[0].from_address.as_deref(), Some("0xa1b2"));
        assert_eq!(normalized.events[0].to_address, None);
        assert_eq!(normalized.transaction.hash, bundle.transaction.hash);
    }

    #[test]
    fn test_transaction_selector() {
        let tx = sample_transaction();
        assert_eq!(tx.selector(), Some([0xa9, 0x05, 0x9c, 0xbb]));
        assert!(!tx.is_contract_creation());

        let empty = Transaction {
            input: vec![0x01, 0x02],
            ..sample_transaction()
        };
        assert_eq!(empty.selector(), None);
    }

    #[test]
    fn test_transaction_json_shape() {
        let tx = sample_transaction();
        let json = serde_json::to_value(&tx).unwrap();
        assert_eq!(json["value"], "5");
        assert_eq!(json["input"], "0xa9059cbb00");
        assert_eq!(json["status"], "success");
    }

    #[test]
    fn test_event_id() {
        let event = Event {
            transaction_hash: "0xabc".to_string(),
            log_index: 7,
            block_number: 1,
            contract_address: "0xc1".to_string(),
            event_name: None,
            signature: None,
            topics: vec![],
            data: vec![],
            decoded: None,
            from_address: None,
            to_address: None,
            timestamp: Utc::now(),
        };
        assert_eq!(event.event_id(), "0xabc:7");
        assert_eq!(event.topic0(), None);
    }

    #[test]
    fn test_standard_parsing() {
        assert_eq!("ERC20".parse::<ContractStandard>(), Ok(ContractStandard::Erc20));
        assert!(ContractStandard::Erc1155.is_token());
        assert!(!ContractStandard::Generic.is_token());
        assert!("erc4626".parse::<ContractStandard>().is_err());
    }

    #[test]
    fn test_unknown_token_metadata() {
        let meta = TokenMetadata::unknown();
        assert_eq!(meta.symbol, "UNKNOWN");
        assert_eq!(meta.name, "Unknown Token");
        assert_eq!(meta.decimals, 18);
        assert!(meta.is_unknown());
    }
}
