//! Selector and event decoding using Alloy

use alloy_dyn_abi::{DynSolType, DynSolValue, EventExt, JsonAbiExt};
use alloy_json_abi::JsonAbi;
use alloy_primitives::B256;
use explorer_common::codec::encode_hex;
use std::collections::BTreeMap;
use tracing::debug;

use crate::known::{known_event, known_function};
use crate::types::{AbiDecoderError, DecodeOutcome, DecodedCall, DecodedEvent};

/// Parse a JSON ABI document
pub fn parse_abi(abi_json: &str) -> Result<JsonAbi, AbiDecoderError> {
    serde_json::from_str(abi_json)
        .map_err(|e| AbiDecoderError::AbiParseError(format!("Failed to parse ABI JSON: {}", e)))
}

/// Resolve a call payload (selector + arguments) to a method name
///
/// Falls back to the raw `0x` selector when there is no ABI, it does not
/// parse, or no declared function has the payload's selector.
pub fn decode_call(input: &[u8], abi_json: Option<&str>) -> DecodedCall {
    let Some(selector) = input.get(..4) else {
        return DecodedCall::raw(encode_hex(input), None);
    };
    let selector_hex = encode_hex(selector);

    let Some(abi) = abi_json.and_then(|json| match parse_abi(json) {
        Ok(abi) => Some(abi),
        Err(e) => {
            debug!("Ignoring stored ABI: {}", e);
            None
        }
    }) else {
        return DecodedCall::raw(selector_hex.clone(), Some(selector_hex));
    };

    let Some(function) = abi
        .functions()
        .find(|f| f.selector().as_slice() == selector)
    else {
        return DecodedCall::raw(selector_hex.clone(), Some(selector_hex));
    };

    let signature = Some(function.signature());
    match function.abi_decode_input(&input[4..], false) {
        Ok(values) => {
            let names = function.inputs.iter().map(|p| p.name.as_str());
            DecodedCall {
                name: function.name.clone(),
                selector: Some(selector_hex),
                signature,
                parameters: name_values(names, &values),
                outcome: DecodeOutcome::Decoded,
            }
        }
        Err(e) => {
            debug!("Failed to decode input for {}: {}", function.name, e);
            DecodedCall {
                name: function.name.clone(),
                selector: Some(selector_hex),
                signature,
                parameters: BTreeMap::new(),
                outcome: DecodeOutcome::NameOnly,
            }
        }
    }
}

/// Resolve an event log to its name and parameters
///
/// `topics[0]` is matched against the ABI's non-anonymous events, then against
/// the well-known event table, and finally returned as raw hex.
pub fn decode_event(topics: &[String], data: &[u8], abi_json: Option<&str>) -> DecodedEvent {
    let Some(topic0) = topics.first() else {
        return DecodedEvent {
            name: "anonymous".to_string(),
            topic: None,
            signature: None,
            parameters: BTreeMap::new(),
            outcome: DecodeOutcome::Raw,
        };
    };
    let topic_hex = topic0.to_ascii_lowercase();

    if let Some(decoded) = abi_json.and_then(|json| decode_event_with_abi(topics, data, json)) {
        return decoded;
    }

    match known_event(&topic_hex) {
        Some(name) => DecodedEvent {
            name: name.to_string(),
            topic: Some(topic_hex),
            signature: None,
            parameters: BTreeMap::new(),
            outcome: DecodeOutcome::WellKnown,
        },
        None => DecodedEvent {
            name: topic_hex.clone(),
            topic: Some(topic_hex),
            signature: None,
            parameters: BTreeMap::new(),
            outcome: DecodeOutcome::Raw,
        },
    }
}

fn decode_event_with_abi(topics: &[String], data: &[u8], abi_json: &str) -> Option<DecodedEvent> {
    let abi = parse_abi(abi_json)
        .map_err(|e| debug!("Ignoring stored ABI: {}", e))
        .ok()?;

    let words: Vec<B256> = topics
        .iter()
        .map(|t| t.parse::<B256>())
        .collect::<Result<_, _>>()
        .map_err(|e| debug!("Invalid topic word: {}", e))
        .ok()?;
    let topic0 = *words.first()?;

    let event = abi
        .events()
        .find(|e| !e.anonymous && e.selector() == topic0)?;
    let topic_hex = format!("0x{}", hex::encode(topic0));

    let parameters = match event.decode_log_parts(words.iter().copied(), data, false) {
        Ok(decoded) => {
            let mut indexed = decoded.indexed.into_iter();
            let mut body = decoded.body.into_iter();
            let mut parameters = BTreeMap::new();
            for (i, input) in event.inputs.iter().enumerate() {
                let value = if input.indexed {
                    indexed.next()
                } else {
                    body.next()
                };
                if let Some(value) = value {
                    parameters.insert(param_key(&input.name, i), format_decoded_value(&value));
                }
            }
            Some(parameters)
        }
        Err(e) => {
            debug!("Failed to decode log for {}: {}", event.name, e);
            None
        }
    };

    Some(DecodedEvent {
        name: event.name.clone(),
        topic: Some(topic_hex),
        signature: Some(event.signature()),
        outcome: if parameters.is_some() {
            DecodeOutcome::Decoded
        } else {
            DecodeOutcome::NameOnly
        },
        parameters: parameters.unwrap_or_default(),
    })
}

/// Name of a well-known method for a selector, if any
pub fn well_known_method(input: &[u8]) -> Option<&'static str> {
    let selector: [u8; 4] = input.get(..4)?.try_into().ok()?;
    known_function(&selector).map(|(name, _)| name)
}

/// Decode the return data of a `string`-returning view
///
/// Legacy tokens return `bytes32` instead, right-padded with zeros.
pub fn decode_string_return(data: &[u8]) -> Option<String> {
    if data.is_empty() {
        return None;
    }
    let returns = DynSolType::Tuple(vec![DynSolType::String]);
    if let Ok(DynSolValue::Tuple(values)) = returns.abi_decode_sequence(data) {
        if let Some(DynSolValue::String(s)) = values.first() {
            let trimmed = s.trim_matches(char::from(0)).trim().to_string();
            return (!trimmed.is_empty()).then_some(trimmed);
        }
    }
    if data.len() == 32 {
        let end = data.iter().position(|b| *b == 0).unwrap_or(data.len());
        let text = std::str::from_utf8(&data[..end]).ok()?.trim().to_string();
        return (!text.is_empty()).then_some(text);
    }
    None
}

/// Decode the return data of a `uint8`-returning view such as `decimals()`
pub fn decode_u8_return(data: &[u8]) -> Option<u8> {
    match DynSolType::Uint(8).abi_decode(data) {
        Ok(DynSolValue::Uint(value, _)) => u8::try_from(value).ok(),
        _ => None,
    }
}

fn name_values<'a>(
    names: impl Iterator<Item = &'a str>,
    values: &[DynSolValue],
) -> BTreeMap<String, String> {
    names
        .zip(values.iter())
        .enumerate()
        .map(|(i, (name, value))| (param_key(name, i), format_decoded_value(value)))
        .collect()
}

fn param_key(name: &str, index: usize) -> String {
    if name.is_empty() {
        format!("param_{}", index)
    } else {
        name.to_string()
    }
}

/// Format decoded value for display
fn format_decoded_value(value: &DynSolValue) -> String {
    match value {
        DynSolValue::Address(addr) => format!("0x{:x}", addr),
        DynSolValue::Uint(uint, _) => uint.to_string(),
        DynSolValue::Int(int, _) => int.to_string(),
        DynSolValue::Bool(b) => b.to_string(),
        DynSolValue::Bytes(bytes) => format!("0x{}", hex::encode(bytes)),
        DynSolValue::FixedBytes(word, size) => format!("0x{}", hex::encode(&word[..*size])),
        DynSolValue::String(s) => s.clone(),
        DynSolValue::Array(items) | DynSolValue::FixedArray(items) => {
            let formatted: Vec<String> = items.iter().map(format_decoded_value).collect();
            format!("[{}]", formatted.join(", "))
        }
        DynSolValue::Tuple(items) => {
            let formatted: Vec<String> = items.iter().map(format_decoded_value).collect();
            format!("({})", formatted.join(", "))
        }
        DynSolValue::Function(_) => "function".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_input_falls_back_to_raw_hex() {
        let decoded = decode_call(&[0xab, 0xcd], None);
        assert_eq!(decoded.name, "0xabcd");
        assert_eq!(decoded.selector, None);
        assert_eq!(decoded.outcome, DecodeOutcome::Raw);
    }

    #[test]
    fn test_invalid_abi_falls_back_to_selector() {
        let decoded = decode_call(&[0xa9, 0x05, 0x9c, 0xbb], Some("not json"));
        assert_eq!(decoded.name, "0xa9059cbb");
        assert_eq!(decoded.outcome, DecodeOutcome::Raw);
    }

    #[test]
    fn test_string_return_decoding() {
        // abi.encode("USDC")
        let mut data = vec![0u8; 96];
        data[31] = 0x20;
        data[63] = 4;
        data[64..68].copy_from_slice(b"USDC");
        assert_eq!(decode_string_return(&data), Some("USDC".to_string()));
    }

    #[test]
    fn test_bytes32_return_decoding() {
        let mut data = vec![0u8; 32];
        data[..3].copy_from_slice(b"MKR");
        assert_eq!(decode_string_return(&data), Some("MKR".to_string()));
        assert_eq!(decode_string_return(&[]), None);
    }

    #[test]
    fn test_u8_return_decoding() {
        let mut data = vec![0u8; 32];
        data[31] = 6;
        assert_eq!(decode_u8_return(&data), Some(6));
        assert_eq!(decode_u8_return(&[0x01]), None);
    }

    #[test]
    fn test_well_known_method() {
        assert_eq!(well_known_method(&[0x09, 0x5e, 0xa7, 0xb3, 0x00]), Some("approve"));
        assert_eq!(well_known_method(&[0x09]), None);
    }
}
