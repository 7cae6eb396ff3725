//! Descriptive account tags

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Provenance recorded on tags emitted by the rule engine
pub const TAG_SOURCE_SYSTEM: &str = "system";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Tag {
    // Role
    Contract,
    ExternallyOwned,
    TokenContract,
    NftContract,
    MultiTokenContract,
    // Activity tier
    Newcomer,
    Active,
    HighlyActive,
    // Balance tier
    Whale,
    LargeHolder,
    MediumHolder,
    SmallHolder,
    // Behaviour
    DefiUser,
    Developer,
    ProlificDeveloper,
    FrequentSender,
    Approver,
    Trader,
    TokenHolder,
    DiversifiedHolder,
    Reliable,
    Unreliable,
    // Transaction scoped
    ContractCreator,
    HighValueTransfer,
    FailedTransaction,
    /// A tag written by something other than the rule engine
    Other(String),
}

impl Tag {
    pub fn as_str(&self) -> &str {
        match self {
            Tag::Contract => "contract",
            Tag::ExternallyOwned => "eoa",
            Tag::TokenContract => "token_contract",
            Tag::NftContract => "nft_contract",
            Tag::MultiTokenContract => "multi_token_contract",
            Tag::Newcomer => "newcomer",
            Tag::Active => "active",
            Tag::HighlyActive => "highly_active",
            Tag::Whale => "whale",
            Tag::LargeHolder => "large_holder",
            Tag::MediumHolder => "medium_holder",
            Tag::SmallHolder => "small_holder",
            Tag::DefiUser => "defi_user",
            Tag::Developer => "developer",
            Tag::ProlificDeveloper => "prolific_developer",
            Tag::FrequentSender => "frequent_sender",
            Tag::Approver => "approver",
            Tag::Trader => "trader",
            Tag::TokenHolder => "token_holder",
            Tag::DiversifiedHolder => "diversified_holder",
            Tag::Reliable => "reliable",
            Tag::Unreliable => "unreliable",
            Tag::ContractCreator => "contract_creator",
            Tag::HighValueTransfer => "high_value_transfer",
            Tag::FailedTransaction => "failed_transaction",
            Tag::Other(name) => name,
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tag {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "contract" => Tag::Contract,
            "eoa" => Tag::ExternallyOwned,
            "token_contract" => Tag::TokenContract,
            "nft_contract" => Tag::NftContract,
            "multi_token_contract" => Tag::MultiTokenContract,
            "newcomer" => Tag::Newcomer,
            "active" => Tag::Active,
            "highly_active" => Tag::HighlyActive,
            "whale" => Tag::Whale,
            "large_holder" => Tag::LargeHolder,
            "medium_holder" => Tag::MediumHolder,
            "small_holder" => Tag::SmallHolder,
            "defi_user" => Tag::DefiUser,
            "developer" => Tag::Developer,
            "prolific_developer" => Tag::ProlificDeveloper,
            "frequent_sender" => Tag::FrequentSender,
            "approver" => Tag::Approver,
            "trader" => Tag::Trader,
            "token_holder" => Tag::TokenHolder,
            "diversified_holder" => Tag::DiversifiedHolder,
            "reliable" => Tag::Reliable,
            "unreliable" => Tag::Unreliable,
            "contract_creator" => Tag::ContractCreator,
            "high_value_transfer" => Tag::HighValueTransfer,
            "failed_transaction" => Tag::FailedTransaction,
            other => Tag::Other(other.to_string()),
        })
    }
}

impl Serialize for Tag {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Tag {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        match raw.parse() {
            Ok(tag) => Ok(tag),
            Err(never) => match never {},
        }
    }
}

/// Set-membership fact attaching a tag to an account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountTag {
    pub account_address: String,
    pub tag: Tag,
    pub source: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_names_parse_back() {
        for tag in [
            Tag::Whale,
            Tag::ExternallyOwned,
            Tag::ProlificDeveloper,
            Tag::HighValueTransfer,
        ] {
            let parsed: Tag = tag.as_str().parse().unwrap();
            assert_eq!(parsed, tag);
        }
    }

    #[test]
    fn test_unrecognized_tag_is_preserved() {
        let tag: Tag = "sanctioned".parse().unwrap();
        assert_eq!(tag, Tag::Other("sanctioned".to_string()));
        assert_eq!(serde_json::to_string(&tag).unwrap(), "\"sanctioned\"");
    }
}
