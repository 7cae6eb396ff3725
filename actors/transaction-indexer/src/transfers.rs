//! Token transfer processing
//!
//! Applies `Transfer(address indexed, address indexed, uint256)` logs to the
//! holder balance rows: debit the sender (floored at zero), credit the
//! recipient, skip the zero address on either side.

use abi_decoder::known::TRANSFER_EVENT_TOPIC;
use explorer_common::codec::{
    address_from_topic, biguint_from_word, is_zero_address, normalize_address,
};
use explorer_common::{
    Event, ExplorerStore, Result, TokenDelta, TokenDirection, TokenMetadata, Transaction,
};
use num_bigint::BigUint;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::token_metadata::TokenMetadataResolver;

/// A decoded fungible transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenTransfer {
    pub token: String,
    pub from: String,
    pub to: String,
    pub amount: BigUint,
}

/// Decode a log if it has the three-topic transfer shape
///
/// Four-topic transfers (NFTs with an indexed token id) and logs whose data is
/// not a single word are not fungible transfers and yield `None`.
pub fn parse_transfer(event: &Event) -> Option<TokenTransfer> {
    if event.topics.len() != 3 {
        return None;
    }
    if !event.topics[0].eq_ignore_ascii_case(TRANSFER_EVENT_TOPIC) {
        return None;
    }
    if event.data.len() != 32 {
        debug!(
            "Transfer log {} carries {} data bytes, skipping",
            event.event_id(),
            event.data.len()
        );
        return None;
    }

    let from = address_from_topic(&event.topics[1]).ok()?;
    let to = address_from_topic(&event.topics[2]).ok()?;
    Some(TokenTransfer {
        token: normalize_address(&event.contract_address),
        from,
        to,
        amount: biguint_from_word(&event.data),
    })
}

pub struct TokenTransferProcessor {
    store: Arc<dyn ExplorerStore>,
    metadata: Arc<TokenMetadataResolver>,
}

impl TokenTransferProcessor {
    pub fn new(store: Arc<dyn ExplorerStore>, metadata: Arc<TokenMetadataResolver>) -> Self {
        Self { store, metadata }
    }

    /// Apply every fungible transfer in the transaction's logs; returns how
    /// many were applied
    pub async fn process(&self, tx: &Transaction, events: &[Event]) -> Result<usize> {
        let mut resolved: HashMap<String, TokenMetadata> = HashMap::new();
        let mut applied = 0;

        for transfer in events.iter().filter_map(parse_transfer) {
            let metadata = match resolved.get(&transfer.token) {
                Some(metadata) => metadata.clone(),
                None => {
                    let metadata = self.metadata.resolve(&transfer.token).await;
                    resolved.insert(transfer.token.clone(), metadata.clone());
                    metadata
                }
            };

            if !is_zero_address(&transfer.from) {
                self.store
                    .apply_token_delta(&TokenDelta {
                        holder_address: transfer.from.clone(),
                        token_address: transfer.token.clone(),
                        amount: transfer.amount.clone(),
                        direction: TokenDirection::Debit,
                        metadata: metadata.clone(),
                        at: tx.timestamp,
                    })
                    .await?;
            }

            if !is_zero_address(&transfer.to) {
                self.store
                    .apply_token_delta(&TokenDelta {
                        holder_address: transfer.to.clone(),
                        token_address: transfer.token.clone(),
                        amount: transfer.amount.clone(),
                        direction: TokenDirection::Credit,
                        metadata,
                        at: tx.timestamp,
                    })
                    .await?;
            }

            applied += 1;
        }

        if applied > 0 {
            debug!("Applied {} token transfers from {}", applied, tx.hash);
        }
        Ok(applied)
    }
}
