//! Event attribution
//!
//! Denormalizes each log onto the accounts it concerns: the emitting contract,
//! and the participant / recipient addresses carried by the log.

use abi_decoder::decode_event;
use abi_decoder::known::TRANSFER_EVENT_TOPIC;
use explorer_common::codec::{address_from_topic, is_zero_address, normalize_address};
use explorer_common::{
    AccountEvent, ContractRegistry, Event, ExplorerStore, InvolvementType, Result,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

pub struct EventAttributor {
    store: Arc<dyn ExplorerStore>,
    registry: Arc<dyn ContractRegistry>,
}

impl EventAttributor {
    pub fn new(store: Arc<dyn ExplorerStore>, registry: Arc<dyn ContractRegistry>) -> Self {
        Self { store, registry }
    }

    /// Attribute every log; returns the number of new account-event rows
    pub async fn attribute(&self, events: &[Event]) -> Result<usize> {
        let mut written = 0;
        for event in events {
            let (name, parameters) = self.describe(event).await;
            for (account, involvement) in involved_accounts(event) {
                let inserted = self
                    .store
                    .record_account_event(&AccountEvent {
                        account_address: account,
                        event_id: event.event_id(),
                        transaction_hash: event.transaction_hash.clone(),
                        block_number: event.block_number,
                        log_index: event.log_index,
                        contract_address: normalize_address(&event.contract_address),
                        event_name: name.clone(),
                        involvement,
                        parameters: parameters.clone(),
                        timestamp: event.timestamp,
                    })
                    .await?;
                if inserted {
                    written += 1;
                }
            }
        }
        Ok(written)
    }

    /// Name and parameters of the log, decoding it when upstream did not
    async fn describe(&self, event: &Event) -> (String, BTreeMap<String, String>) {
        if let (Some(name), Some(decoded)) = (&event.event_name, &event.decoded) {
            return (name.clone(), decoded.clone());
        }

        let abi = match self.registry.contract_abi(&event.contract_address).await {
            Ok(abi) => abi,
            Err(e) => {
                debug!("No ABI for emitter {}: {}", event.contract_address, e);
                None
            }
        };
        let decoded = decode_event(&event.topics, &event.data, abi.as_deref());

        let name = event.event_name.clone().unwrap_or(decoded.name);
        let parameters = event.decoded.clone().unwrap_or(decoded.parameters);
        (name, parameters)
    }
}

/// Accounts a log concerns, each with one involvement
///
/// Hints supplied upstream win; otherwise a transfer-shaped log yields its
/// indexed `from` and `to`. The zero address is never attributed.
pub fn involved_accounts(event: &Event) -> Vec<(String, InvolvementType)> {
    let mut involved = vec![(
        normalize_address(&event.contract_address),
        InvolvementType::Emitter,
    )];

    let transfer_shaped = event.topics.len() >= 3
        && event
            .topic0()
            .is_some_and(|topic| topic.eq_ignore_ascii_case(TRANSFER_EVENT_TOPIC));
    let from_topic = |i: usize| {
        if transfer_shaped {
            address_from_topic(&event.topics[i]).ok()
        } else {
            None
        }
    };

    let participant = event
        .from_address
        .as_deref()
        .map(normalize_address)
        .or_else(|| from_topic(1));
    let recipient = event
        .to_address
        .as_deref()
        .map(normalize_address)
        .or_else(|| from_topic(2));

    for (address, involvement) in [
        (participant, InvolvementType::Participant),
        (recipient, InvolvementType::Recipient),
    ] {
        let Some(address) = address.filter(|a| !is_zero_address(a)) else {
            continue;
        };
        if !involved.iter().any(|(known, _)| *known == address) {
            involved.push((address, involvement));
        }
    }

    involved
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn log(topics: Vec<String>) -> Event {
        Event {
            transaction_hash: "0xabc".to_string(),
            log_index: 2,
            block_number: 9,
            contract_address: "0xc1c1c1c1c1c1c1c1c1c1c1c1c1c1c1c1c1c1c1c1".to_string(),
            event_name: None,
            signature: None,
            topics,
            data: vec![0u8; 32],
            decoded: None,
            from_address: None,
            to_address: None,
            timestamp: Utc::now(),
        }
    }

    fn topic(address: &str) -> String {
        format!("0x{:0>64}", address.trim_start_matches("0x"))
    }

    #[test]
    fn test_transfer_topics_are_attributed() {
        let event = log(vec![
            TRANSFER_EVENT_TOPIC.to_string(),
            topic("0xa1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1"),
            topic("0xb2b2b2b2b2b2b2b2b2b2b2b2b2b2b2b2b2b2b2b2"),
        ]);

        let involved = involved_accounts(&event);
        assert_eq!(involved.len(), 3);
        assert_eq!(involved[0].1, InvolvementType::Emitter);
        assert_eq!(
            involved[1],
            (
                "0xa1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1".to_string(),
                InvolvementType::Participant
            )
        );
        assert_eq!(involved[2].1, InvolvementType::Recipient);
    }

    #[test]
    fn test_mint_skips_zero_address() {
        let event = log(vec![
            TRANSFER_EVENT_TOPIC.to_string(),
            topic("0x0000000000000000000000000000000000000000"),
            topic("0xb2b2b2b2b2b2b2b2b2b2b2b2b2b2b2b2b2b2b2b2"),
        ]);

        let involved = involved_accounts(&event);
        assert_eq!(involved.len(), 2);
        assert_eq!(involved[1].1, InvolvementType::Recipient);
    }

    #[test]
    fn test_hints_win_over_topics() {
        let mut event = log(vec!["0x1234".to_string()]);
        event.from_address = Some("0xD4D4D4D4D4D4D4D4D4D4D4D4D4D4D4D4D4D4D4D4".to_string());

        let involved = involved_accounts(&event);
        assert_eq!(
            involved[1],
            (
                "0xd4d4d4d4d4d4d4d4d4d4d4d4d4d4d4d4d4d4d4d4".to_string(),
                InvolvementType::Participant
            )
        );
    }
}
