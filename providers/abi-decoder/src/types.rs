//! Decoder result types

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// How far decoding got
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecodeOutcome {
    /// Matched an ABI entry and decoded every parameter
    Decoded,
    /// Matched an ABI entry but the payload did not decode
    NameOnly,
    /// Resolved through the well-known signature table
    WellKnown,
    /// Nothing matched; the name is the raw selector or topic hex
    Raw,
}

/// A resolved contract call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecodedCall {
    /// Method name, or the raw `0x` selector
    pub name: String,
    /// `0x`-prefixed selector hex, absent for payloads shorter than 4 bytes
    pub selector: Option<String>,
    /// Canonical signature when matched, e.g. `transfer(address,uint256)`
    pub signature: Option<String>,
    pub parameters: BTreeMap<String, String>,
    pub outcome: DecodeOutcome,
}

impl DecodedCall {
    pub fn raw(name: String, selector: Option<String>) -> Self {
        Self {
            name,
            selector,
            signature: None,
            parameters: BTreeMap::new(),
            outcome: DecodeOutcome::Raw,
        }
    }
}

/// A resolved event log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecodedEvent {
    pub name: String,
    pub topic: Option<String>,
    pub signature: Option<String>,
    pub parameters: BTreeMap<String, String>,
    pub outcome: DecodeOutcome,
}

/// ABI decoding errors
#[derive(Error, Debug)]
pub enum AbiDecoderError {
    #[error("ABI parse error: {0}")]
    AbiParseError(String),

    #[error("Input decode error: {0}")]
    InputDecodeError(String),

    #[error("Selector not found: {0}")]
    SelectorNotFound(String),
}
