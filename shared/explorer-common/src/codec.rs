//! Address, hex and big-integer helpers
//!
//! Every quantity is kept as an arbitrary precision integer in base units.
//! Conversions to floating point only happen when a threshold comparison or
//! a running average needs it.

use crate::error::{ExplorerError, Result};
use num_bigint::BigUint;
use num_traits::{ToPrimitive, Zero};

/// The mint/burn sentinel address
pub const ZERO_ADDRESS: &str = "0x0000000000000000000000000000000000000000";

/// Lowercase an address and make sure it carries the `0x` prefix
pub fn normalize_address(address: &str) -> String {
    let trimmed = address.trim();
    let body = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    format!("0x{}", body.to_ascii_lowercase())
}

pub fn is_zero_address(address: &str) -> bool {
    normalize_address(address) == ZERO_ADDRESS
}

/// Extract the address carried in the low 20 bytes of a 32-byte topic word
pub fn address_from_topic(topic: &str) -> Result<String> {
    let bytes = decode_hex(topic)?;
    if bytes.len() != 32 {
        return Err(ExplorerError::Decode(format!(
            "topic must be 32 bytes, got {}",
            bytes.len()
        )));
    }
    Ok(format!("0x{}", hex::encode(&bytes[12..])))
}

/// Decode `0x`-prefixed (or bare) hex into bytes
pub fn decode_hex(value: &str) -> Result<Vec<u8>> {
    let body = value.strip_prefix("0x").unwrap_or(value);
    if body.len() % 2 == 1 {
        return Ok(hex::decode(format!("0{}", body))?);
    }
    Ok(hex::decode(body)?)
}

pub fn encode_hex(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

/// Parse a JSON-RPC hex quantity (`0x1bc16d674ec80000`)
pub fn parse_hex_quantity(value: &str) -> Result<BigUint> {
    let body = value.strip_prefix("0x").unwrap_or(value);
    if body.is_empty() {
        return Ok(BigUint::zero());
    }
    BigUint::parse_bytes(body.as_bytes(), 16)
        .ok_or_else(|| ExplorerError::Decode(format!("invalid hex quantity: {}", value)))
}

pub fn parse_hex_u64(value: &str) -> Result<u64> {
    parse_hex_quantity(value)?
        .to_u64()
        .ok_or_else(|| ExplorerError::Decode(format!("quantity overflows u64: {}", value)))
}

/// Parse a base-unit decimal string
pub fn parse_decimal(value: &str) -> Result<BigUint> {
    value
        .trim()
        .parse::<BigUint>()
        .map_err(|e| ExplorerError::Decode(format!("invalid decimal {}: {}", value, e)))
}

/// Interpret up to 32 big-endian bytes as an unsigned integer
pub fn biguint_from_word(bytes: &[u8]) -> BigUint {
    BigUint::from_bytes_be(bytes)
}

/// Lossy conversion used for tier thresholds and averages
pub fn biguint_to_f64(value: &BigUint) -> f64 {
    value.to_f64().unwrap_or(f64::MAX)
}

/// Serde adapter storing a `BigUint` as its decimal string
pub mod decimal {
    use num_bigint::BigUint;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &BigUint, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_str_radix(10))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<BigUint, D::Error> {
        let raw = String::deserialize(deserializer)?;
        if let Some(hex_body) = raw.strip_prefix("0x") {
            if hex_body.is_empty() {
                return Ok(BigUint::default());
            }
            return BigUint::parse_bytes(hex_body.as_bytes(), 16)
                .ok_or_else(|| D::Error::custom(format!("invalid hex quantity: {}", raw)));
        }
        raw.parse::<BigUint>().map_err(D::Error::custom)
    }
}

/// Serde adapter storing a byte payload as `0x`-prefixed hex
pub mod hex_bytes {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("0x{}", hex::encode(value)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::decode_hex(&raw).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_address() {
        assert_eq!(
            normalize_address("0xABCdef0000000000000000000000000000000001"),
            "0xabcdef0000000000000000000000000000000001"
        );
        assert_eq!(
            normalize_address("ABCdef0000000000000000000000000000000001"),
            "0xabcdef0000000000000000000000000000000001"
        );
        assert!(is_zero_address("0x0000000000000000000000000000000000000000"));
    }

    #[test]
    fn test_address_from_topic() {
        let topic = "0x000000000000000000000000a1b2c3d4e5f60718293a4b5c6d7e8f9012345678";
        assert_eq!(
            address_from_topic(topic).unwrap(),
            "0xa1b2c3d4e5f60718293a4b5c6d7e8f9012345678"
        );
        assert!(address_from_topic("0x1234").is_err());
    }

    #[test]
    fn test_parse_hex_quantity() {
        assert_eq!(
            parse_hex_quantity("0x1bc16d674ec80000").unwrap(),
            BigUint::from(2_000_000_000_000_000_000u64)
        );
        assert_eq!(parse_hex_quantity("0x").unwrap(), BigUint::zero());
        assert_eq!(parse_hex_u64("0x10").unwrap(), 16);
        assert!(parse_hex_quantity("0xzz").is_err());
    }

    #[test]
    fn test_decimal_serde_accepts_hex_and_decimal() {
        #[derive(serde::Deserialize)]
        struct Holder {
            #[serde(with = "decimal")]
            value: BigUint,
        }
        let a: Holder = serde_json::from_str(r#"{"value":"1000"}"#).unwrap();
        let b: Holder = serde_json::from_str(r#"{"value":"0x3e8"}"#).unwrap();
        assert_eq!(a.value, b.value);
    }

    #[test]
    fn test_decode_hex_odd_length() {
        assert_eq!(decode_hex("0xabc").unwrap(), vec![0x0a, 0xbc]);
        assert_eq!(decode_hex("0x").unwrap(), Vec::<u8>::new());
    }
}
