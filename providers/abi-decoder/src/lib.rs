//! ABI Decoder
//!
//! Resolves 4-byte call selectors and event topics to human readable names
//! and named parameters, using a contract's stored JSON ABI when one exists.
//!
//! Decoding never fails from the caller's point of view:
//! - selector matches an ABI entry and the payload decodes: name + parameters
//! - selector matches but the payload does not decode: name only
//! - no ABI, unparsable ABI or no match: the raw `0x` selector (or topic) hex

pub mod decoder;
pub mod known;
pub mod types;

pub use decoder::{decode_call, decode_event, parse_abi};
pub use types::{AbiDecoderError, DecodeOutcome, DecodedCall, DecodedEvent};
