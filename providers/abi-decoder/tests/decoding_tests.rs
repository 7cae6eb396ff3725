//! Decoding against a stored ERC-20 ABI

use abi_decoder::{decode_call, decode_event, DecodeOutcome};

const ERC20_ABI: &str = r#"[
  {
    "type": "function",
    "name": "transfer",
    "inputs": [
      {"name": "to", "type": "address"},
      {"name": "amount", "type": "uint256"}
    ],
    "outputs": [{"name": "", "type": "bool"}],
    "stateMutability": "nonpayable"
  },
  {
    "type": "function",
    "name": "approve",
    "inputs": [
      {"name": "", "type": "address"},
      {"name": "", "type": "uint256"}
    ],
    "outputs": [{"name": "", "type": "bool"}],
    "stateMutability": "nonpayable"
  },
  {
    "type": "event",
    "name": "Transfer",
    "inputs": [
      {"name": "from", "type": "address", "indexed": true},
      {"name": "to", "type": "address", "indexed": true},
      {"name": "value", "type": "uint256", "indexed": false}
    ],
    "anonymous": false
  }
]"#;

const RECIPIENT: &str = "b1b1b1b1b1b1b1b1b1b1b1b1b1b1b1b1b1b1b1b1";

fn word_from_address(address: &str) -> Vec<u8> {
    let mut word = vec![0u8; 12];
    word.extend(hex::decode(address).unwrap());
    word
}

fn word_from_u64(value: u64) -> Vec<u8> {
    let mut word = vec![0u8; 24];
    word.extend(value.to_be_bytes());
    word
}

fn transfer_input(amount: u64) -> Vec<u8> {
    let mut input = hex::decode("a9059cbb").unwrap();
    input.extend(word_from_address(RECIPIENT));
    input.extend(word_from_u64(amount));
    input
}

#[test]
fn test_matching_selector_decodes_named_parameters() {
    let decoded = decode_call(&transfer_input(1000), Some(ERC20_ABI));

    assert_eq!(decoded.outcome, DecodeOutcome::Decoded);
    assert_eq!(decoded.name, "transfer");
    assert_eq!(decoded.selector.as_deref(), Some("0xa9059cbb"));
    assert_eq!(
        decoded.signature.as_deref(),
        Some("transfer(address,uint256)")
    );
    assert_eq!(decoded.parameters.len(), 2);
    assert_eq!(decoded.parameters["to"], format!("0x{}", RECIPIENT));
    assert_eq!(decoded.parameters["amount"], "1000");
}

#[test]
fn test_unnamed_parameters_get_positional_keys() {
    let mut input = hex::decode("095ea7b3").unwrap();
    input.extend(word_from_address(RECIPIENT));
    input.extend(word_from_u64(7));

    let decoded = decode_call(&input, Some(ERC20_ABI));
    assert_eq!(decoded.name, "approve");
    assert_eq!(decoded.parameters.len(), 2);
    assert_eq!(decoded.parameters["param_1"], "7");
}

#[test]
fn test_undecodable_arguments_keep_method_name() {
    let mut input = transfer_input(1);
    input.truncate(20);

    let decoded = decode_call(&input, Some(ERC20_ABI));
    assert_eq!(decoded.outcome, DecodeOutcome::NameOnly);
    assert_eq!(decoded.name, "transfer");
    assert!(decoded.parameters.is_empty());
}

#[test]
fn test_unmatched_selector_returns_raw_selector() {
    let mut input = hex::decode("deadbeef").unwrap();
    input.extend(word_from_u64(1));

    let decoded = decode_call(&input, Some(ERC20_ABI));
    assert_eq!(decoded.outcome, DecodeOutcome::Raw);
    assert_eq!(decoded.name, "0xdeadbeef");
    assert!(decoded.parameters.is_empty());

    let without_abi = decode_call(&transfer_input(5), None);
    assert_eq!(without_abi.name, "0xa9059cbb");
}

#[test]
fn test_transfer_event_decodes_indexed_and_body_values() {
    let sender = "a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1";
    let topics = vec![
        "0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef".to_string(),
        format!("0x{}", hex::encode(word_from_address(sender))),
        format!("0x{}", hex::encode(word_from_address(RECIPIENT))),
    ];

    let decoded = decode_event(&topics, &word_from_u64(42), Some(ERC20_ABI));
    assert_eq!(decoded.outcome, DecodeOutcome::Decoded);
    assert_eq!(decoded.name, "Transfer");
    assert_eq!(decoded.parameters["from"], format!("0x{}", sender));
    assert_eq!(decoded.parameters["to"], format!("0x{}", RECIPIENT));
    assert_eq!(decoded.parameters["value"], "42");
}

#[test]
fn test_event_without_abi_uses_well_known_table_then_raw_topic() {
    let approval = vec![
        "0x8c5be1e5ebec7d5bd14f71427d1e84f3dd0314c0f7b2291e5b200ac8c7c3b925".to_string(),
    ];
    let decoded = decode_event(&approval, &[], None);
    assert_eq!(decoded.outcome, DecodeOutcome::WellKnown);
    assert_eq!(decoded.name, "Approval");

    let custom = vec![format!("0x{}", "11".repeat(32))];
    let decoded = decode_event(&custom, &[], Some(ERC20_ABI));
    assert_eq!(decoded.outcome, DecodeOutcome::Raw);
    assert_eq!(decoded.name, format!("0x{}", "11".repeat(32)));
}
