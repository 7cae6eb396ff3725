//! Bytecode classifier
//!
//! Guesses a contract's token standard from selector fingerprints embedded in
//! its runtime bytecode (dispatchers compare calldata against `PUSH4` operands)
//! and flags well-known proxy layouts. A heuristic: callers treat the result
//! as evidence, never as proof.

use abi_decoder::known::{
    Selector, BALANCE_OF_BATCH, ON_ERC721_RECEIVED, SAFE_BATCH_TRANSFER_FROM,
    SAFE_TRANSFER_FROM_WITH_DATA, TRANSFER, TRANSFER_FROM,
};
use explorer_common::ContractStandard;
use hex_literal::hex;

/// EIP-1167 minimal proxy prologue
const MINIMAL_PROXY: &[u8] = &hex!("363d3d373d3d3d363d73");
/// EIP-1967 implementation slot
const EIP1967_SLOT: &[u8] =
    &hex!("360894a13ba1a3210667c828492db98dca3e2076cc3735a920a3ca505d382bbc");
/// EIP-1822 (UUPS) proxiable slot
const EIP1822_SLOT: &[u8] =
    &hex!("c5f16f0fcc639fa48a6947836d9850f504798523bf8c9a3a87d5876cf622bcf7");

/// Fingerprints in match order; the most specific standard wins
const FINGERPRINTS: &[(ContractStandard, &[Selector])] = &[
    (
        ContractStandard::Erc1155,
        &[SAFE_BATCH_TRANSFER_FROM, BALANCE_OF_BATCH],
    ),
    (
        ContractStandard::Erc721,
        &[SAFE_TRANSFER_FROM_WITH_DATA, ON_ERC721_RECEIVED],
    ),
    (ContractStandard::Erc20, &[TRANSFER, TRANSFER_FROM]),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyKind {
    Minimal,
    Transparent,
    Universal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub standard: ContractStandard,
    pub proxy: Option<ProxyKind>,
}

impl Classification {
    pub fn is_proxy(&self) -> bool {
        self.proxy.is_some()
    }

    /// Nothing in the bytecode was recognized
    pub fn is_unknown(&self) -> bool {
        self.standard == ContractStandard::Unknown
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    !needle.is_empty() && haystack.windows(needle.len()).any(|w| w == needle)
}

pub fn detect_proxy(bytecode: &[u8]) -> Option<ProxyKind> {
    if contains(bytecode, MINIMAL_PROXY) {
        Some(ProxyKind::Minimal)
    } else if contains(bytecode, EIP1967_SLOT) {
        Some(ProxyKind::Transparent)
    } else if contains(bytecode, EIP1822_SLOT) {
        Some(ProxyKind::Universal)
    } else {
        None
    }
}

pub fn detect_standard(bytecode: &[u8]) -> ContractStandard {
    FINGERPRINTS
        .iter()
        .find(|(_, selectors)| selectors.iter().all(|s| contains(bytecode, s)))
        .map(|(standard, _)| *standard)
        .unwrap_or(ContractStandard::Unknown)
}

/// Classify deployed bytecode
///
/// Empty code is `Unknown`. A proxy without token fingerprints is `Generic`
/// since its behaviour lives behind the implementation address.
pub fn classify(bytecode: &[u8]) -> Classification {
    if bytecode.is_empty() {
        return Classification {
            standard: ContractStandard::Unknown,
            proxy: None,
        };
    }

    let proxy = detect_proxy(bytecode);
    let standard = match detect_standard(bytecode) {
        ContractStandard::Unknown if proxy.is_some() => ContractStandard::Generic,
        standard => standard,
    };
    Classification { standard, proxy }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code(parts: &[&[u8]]) -> Vec<u8> {
        let mut bytes = hex!("6080604052348015600f57600080fd5b50").to_vec();
        for part in parts {
            bytes.push(0x63);
            bytes.extend_from_slice(part);
            bytes.push(0x14);
        }
        bytes
    }

    #[test]
    fn test_erc20_needs_both_fingerprints() {
        assert_eq!(
            classify(&code(&[&TRANSFER, &TRANSFER_FROM])).standard,
            ContractStandard::Erc20
        );
        assert_eq!(
            classify(&code(&[&TRANSFER])).standard,
            ContractStandard::Unknown
        );
    }

    #[test]
    fn test_erc721_and_erc1155() {
        let nft = code(&[&TRANSFER_FROM, &SAFE_TRANSFER_FROM_WITH_DATA, &ON_ERC721_RECEIVED]);
        assert_eq!(classify(&nft).standard, ContractStandard::Erc721);

        let multi = code(&[&SAFE_BATCH_TRANSFER_FROM, &BALANCE_OF_BATCH, &TRANSFER]);
        assert_eq!(classify(&multi).standard, ContractStandard::Erc1155);
    }

    #[test]
    fn test_empty_and_unrecognized_code() {
        assert!(classify(&[]).is_unknown());
        assert!(classify(&code(&[])).is_unknown());
    }

    #[test]
    fn test_minimal_proxy_is_generic() {
        let bytecode = hex!(
            "363d3d373d3d3d363d73bebebebebebebebebebebebebebebebebebebebe5af43d82803e903d91602b57fd5bf3"
        );
        let classification = classify(&bytecode);
        assert_eq!(classification.proxy, Some(ProxyKind::Minimal));
        assert_eq!(classification.standard, ContractStandard::Generic);
    }

    #[test]
    fn test_upgradeable_token_keeps_standard() {
        let mut bytecode = code(&[&TRANSFER, &TRANSFER_FROM]);
        bytecode.extend_from_slice(EIP1967_SLOT);
        let classification = classify(&bytecode);
        assert_eq!(classification.standard, ContractStandard::Erc20);
        assert_eq!(classification.proxy, Some(ProxyKind::Transparent));
    }
}
