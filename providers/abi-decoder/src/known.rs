//! Well-known function selectors and event topics
//!
//! Used when a contract has no stored ABI, and by the bytecode classifier
//! and token-metadata calls.

use hex_literal::hex;

pub type Selector = [u8; 4];

// ERC-20
pub const TRANSFER: Selector = hex!("a9059cbb");
pub const TRANSFER_FROM: Selector = hex!("23b872dd");
pub const APPROVE: Selector = hex!("095ea7b3");
pub const BALANCE_OF: Selector = hex!("70a08231");
pub const TOTAL_SUPPLY: Selector = hex!("18160ddd");
pub const SYMBOL: Selector = hex!("95d89b41");
pub const NAME: Selector = hex!("06fdde03");
pub const DECIMALS: Selector = hex!("313ce567");

// ERC-721
pub const SAFE_TRANSFER_FROM: Selector = hex!("42842e0e");
pub const SAFE_TRANSFER_FROM_WITH_DATA: Selector = hex!("b88d4fde");
pub const ON_ERC721_RECEIVED: Selector = hex!("150b7a02");
pub const SET_APPROVAL_FOR_ALL: Selector = hex!("a22cb465");

// ERC-1155
pub const SAFE_TRANSFER_FROM_1155: Selector = hex!("f242432a");
pub const SAFE_BATCH_TRANSFER_FROM: Selector = hex!("2eb2c2d6");
pub const BALANCE_OF_BATCH: Selector = hex!("4e1273f4");

/// `Transfer(address,address,uint256)`
pub const TRANSFER_EVENT_TOPIC: &str =
    "0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef";

/// Coarse role of a well-known method
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodRole {
    Transfer,
    Approval,
    Swap,
    Stake,
    Unstake,
    Other,
}

const KNOWN_FUNCTIONS: &[(Selector, &str, MethodRole)] = &[
    (TRANSFER, "transfer", MethodRole::Transfer),
    (TRANSFER_FROM, "transferFrom", MethodRole::Transfer),
    (SAFE_TRANSFER_FROM, "safeTransferFrom", MethodRole::Transfer),
    (SAFE_TRANSFER_FROM_WITH_DATA, "safeTransferFrom", MethodRole::Transfer),
    (SAFE_TRANSFER_FROM_1155, "safeTransferFrom", MethodRole::Transfer),
    (SAFE_BATCH_TRANSFER_FROM, "safeBatchTransferFrom", MethodRole::Transfer),
    (APPROVE, "approve", MethodRole::Approval),
    (SET_APPROVAL_FOR_ALL, "setApprovalForAll", MethodRole::Approval),
    (hex!("38ed1739"), "swapExactTokensForTokens", MethodRole::Swap),
    (hex!("7ff36ab5"), "swapExactETHForTokens", MethodRole::Swap),
    (hex!("18cbafe5"), "swapExactTokensForETH", MethodRole::Swap),
    (hex!("8803dbee"), "swapTokensForExactTokens", MethodRole::Swap),
    (hex!("414bf389"), "exactInputSingle", MethodRole::Swap),
    (hex!("c04b8d59"), "exactInput", MethodRole::Swap),
    (hex!("a694fc3a"), "stake", MethodRole::Stake),
    (hex!("b6b55f25"), "deposit", MethodRole::Stake),
    (hex!("d0e30db0"), "deposit", MethodRole::Stake),
    (hex!("2e1a7d4d"), "withdraw", MethodRole::Unstake),
    (BALANCE_OF, "balanceOf", MethodRole::Other),
    (TOTAL_SUPPLY, "totalSupply", MethodRole::Other),
    (SYMBOL, "symbol", MethodRole::Other),
    (NAME, "name", MethodRole::Other),
    (DECIMALS, "decimals", MethodRole::Other),
];

const KNOWN_EVENTS: &[(&str, &str)] = &[
    (TRANSFER_EVENT_TOPIC, "Transfer"),
    (
        "0x8c5be1e5ebec7d5bd14f71427d1e84f3dd0314c0f7b2291e5b200ac8c7c3b925",
        "Approval",
    ),
    (
        "0x17307eab39ab6107e8899845ad3d59bd9653f200f220920489ca2b5937696c31",
        "ApprovalForAll",
    ),
    (
        "0xc3d58168c5ae7397731d063d5bbf3d657854427343f4c083240f7aacaa2d0f62",
        "TransferSingle",
    ),
    (
        "0x4a39dc06d4c0dbc64b70af90fd698a233a518aa5d07e595d983b8c0526c8f7fb",
        "TransferBatch",
    ),
    (
        "0xd78ad95fa46c994b6551d0da85fc275fe613ce37657fb8d5e3d130840159d822",
        "Swap",
    ),
    (
        "0xe1fffcc4923d04b559f4d29a8bfc6cda04eb5b0d3c460751c2402c5c5cc9109c",
        "Deposit",
    ),
    (
        "0x7fcf532c15f0a6db0bd6d0e038bea71d30d808c7d98cb3bf7268a95bf5081b65",
        "Withdrawal",
    ),
    (
        "0xbc7cd75a20ee27fd9adebab32041f755214dbc6bffa90cc0225b39da2e5c2d3b",
        "Upgraded",
    ),
    (
        "0x8be0079c531659141344cd1fd0a4f28419497f9722a3daafe3b4186f6b6457e0",
        "OwnershipTransferred",
    ),
];

pub fn known_function(selector: &Selector) -> Option<(&'static str, MethodRole)> {
    KNOWN_FUNCTIONS
        .iter()
        .find(|(known, _, _)| known == selector)
        .map(|(_, name, role)| (*name, *role))
}

pub fn known_event(topic: &str) -> Option<&'static str> {
    let topic = topic.to_ascii_lowercase();
    KNOWN_EVENTS
        .iter()
        .find(|(known, _)| *known == topic)
        .map(|(_, name)| *name)
}

/// Role of a method given either its decoded name or its raw selector hex
pub fn method_role(method: &str) -> MethodRole {
    if let Some(body) = method.strip_prefix("0x") {
        if let Ok(bytes) = hex::decode(body) {
            if let Ok(selector) = Selector::try_from(bytes.as_slice()) {
                return known_function(&selector)
                    .map(|(_, role)| role)
                    .unwrap_or(MethodRole::Other);
            }
        }
        return MethodRole::Other;
    }

    match method {
        "transfer" | "transferFrom" | "safeTransferFrom" | "safeBatchTransferFrom" => {
            MethodRole::Transfer
        }
        "approve" | "setApprovalForAll" | "increaseAllowance" | "permit" => MethodRole::Approval,
        m if m.to_ascii_lowercase().starts_with("swap")
            || m.starts_with("exactInput")
            || m.starts_with("exactOutput") =>
        {
            MethodRole::Swap
        }
        "stake" | "deposit" => MethodRole::Stake,
        "unstake" | "withdraw" => MethodRole::Unstake,
        _ => MethodRole::Other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_function_lookup() {
        assert_eq!(
            known_function(&TRANSFER),
            Some(("transfer", MethodRole::Transfer))
        );
        assert_eq!(known_function(&hex!("deadbeef")), None);
    }

    #[test]
    fn test_known_event_is_case_insensitive() {
        assert_eq!(
            known_event("0xDDF252AD1BE2C89B69C2B068FC378DAA952BA7F163C4A11628F55A4DF523B3EF"),
            Some("Transfer")
        );
    }

    #[test]
    fn test_method_role_from_name_and_selector() {
        assert_eq!(method_role("transferFrom"), MethodRole::Transfer);
        assert_eq!(method_role("0x095ea7b3"), MethodRole::Approval);
        assert_eq!(
            method_role("swapExactTokensForETHSupportingFeeOnTransferTokens"),
            MethodRole::Swap
        );
        assert_eq!(method_role("0xdeadbeef"), MethodRole::Other);
        assert_eq!(method_role("mint"), MethodRole::Other);
    }
}
