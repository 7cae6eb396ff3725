//! Per-transaction method resolution

use abi_decoder::{decode_call, DecodedCall};
use explorer_common::{ContractRegistry, Transaction};
use std::collections::BTreeMap;
use tracing::debug;

pub const NATIVE_TRANSFER: &str = "native_transfer";
pub const CONTRACT_CREATION: &str = "contract_creation";

/// The method a transaction executed, resolved once and shared by all stages
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedMethod {
    pub name: String,
    /// Contract the method ran against; `None` for plain value transfers
    pub contract: Option<String>,
    pub parameters: BTreeMap<String, String>,
}

impl ResolvedMethod {
    /// Whether the sender called code on an existing contract
    pub fn is_contract_call(&self) -> bool {
        self.contract.is_some() && self.name != CONTRACT_CREATION
    }
}

/// Name the method a transaction executed
///
/// Calldata sent to an address without code is still a plain transfer. A
/// missing ABI or a registry failure degrades to the raw selector.
pub async fn resolve_method(
    tx: &Transaction,
    recipient_is_contract: bool,
    registry: &dyn ContractRegistry,
) -> ResolvedMethod {
    if let Some(created) = &tx.contract_address {
        return ResolvedMethod {
            name: CONTRACT_CREATION.to_string(),
            contract: Some(created.clone()),
            parameters: BTreeMap::new(),
        };
    }

    let Some(to) = tx.to.clone() else {
        return ResolvedMethod {
            name: NATIVE_TRANSFER.to_string(),
            contract: None,
            parameters: BTreeMap::new(),
        };
    };

    if tx.input.is_empty() || !recipient_is_contract {
        return ResolvedMethod {
            name: NATIVE_TRANSFER.to_string(),
            contract: None,
            parameters: BTreeMap::new(),
        };
    }

    let abi = match registry.contract_abi(&to).await {
        Ok(abi) => abi,
        Err(e) => {
            debug!("No ABI for {} ({}), decoding without it", to, e);
            None
        }
    };
    let DecodedCall {
        name, parameters, ..
    } = decode_call(&tx.input, abi.as_deref());

    ResolvedMethod {
        name,
        contract: Some(to),
        parameters,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use explorer_common::{RegisteredToken, Result, TransactionStatus};
    use num_bigint::BigUint;

    struct NoRegistry;

    #[async_trait]
    impl ContractRegistry for NoRegistry {
        async fn contract_abi(&self, _address: &str) -> Result<Option<String>> {
            Ok(None)
        }

        async fn token_info(&self, _address: &str) -> Result<Option<RegisteredToken>> {
            Ok(None)
        }
    }

    fn tx(to: Option<&str>, input: Vec<u8>, created: Option<&str>) -> Transaction {
        Transaction {
            hash: "0x01".to_string(),
            block_number: 1,
            transaction_index: 0,
            from: "0xa1".to_string(),
            to: to.map(str::to_string),
            value: BigUint::default(),
            gas_limit: 21_000,
            gas_used: 21_000,
            gas_price: BigUint::from(1u32),
            nonce: 0,
            status: TransactionStatus::Success,
            input,
            contract_address: created.map(str::to_string),
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_plain_transfer_has_no_contract() {
        let method = resolve_method(&tx(Some("0xb1"), vec![], None), false, &NoRegistry).await;
        assert_eq!(method.name, NATIVE_TRANSFER);
        assert!(method.contract.is_none());
        assert!(!method.is_contract_call());
    }

    #[tokio::test]
    async fn test_creation_targets_created_contract() {
        let method = resolve_method(&tx(None, vec![0x60, 0x80], Some("0xc1")), false, &NoRegistry).await;
        assert_eq!(method.name, CONTRACT_CREATION);
        assert_eq!(method.contract.as_deref(), Some("0xc1"));
        assert!(!method.is_contract_call());
    }

    #[tokio::test]
    async fn test_unverified_call_uses_raw_selector() {
        let input = vec![0xde, 0xad, 0xbe, 0xef, 0x00];
        let method = resolve_method(&tx(Some("0xc1"), input, None), true, &NoRegistry).await;
        assert_eq!(method.name, "0xdeadbeef");
        assert!(method.is_contract_call());
    }

    #[tokio::test]
    async fn test_calldata_to_account_without_code_is_a_transfer() {
        let transfer = tx(Some("0xb1"), b"hello".to_vec(), None);
        let method = resolve_method(&transfer, false, &NoRegistry).await;
        assert_eq!(method.name, NATIVE_TRANSFER);
        assert!(method.contract.is_none());
        assert!(method.parameters.is_empty());
    }
}
