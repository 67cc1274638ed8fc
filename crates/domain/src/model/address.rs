use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString, IntoStaticStr};
use thiserror::Error;

const BECH32_CHARSET: &str = "qpzry9x8gf2tvdw0s3jn54khce6mua7l";
const BASE58_ALPHABET: &str = "123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

/// Chains the monitor knows how to follow. The string form doubles as the
/// persisted `blockchain` column value.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    AsRefStr,
    Display,
    EnumString,
    IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Chain {
    Bitcoin,
    Ethereum,
}

impl Chain {
    pub fn asset_symbol(self) -> &'static str {
        match self {
            Chain::Bitcoin => "BTC",
            Chain::Ethereum => "ETH",
        }
    }

    /// Number of decimals between the chain's smallest unit and its display unit.
    pub fn decimals(self) -> u8 {
        match self {
            Chain::Bitcoin => 8,
            Chain::Ethereum => 18,
        }
    }

    /// Guesses the chain from the address prefix alone.
    pub fn classify(address: &str) -> Result<Self, ClassifyError> {
        let lowered = address.trim().to_ascii_lowercase();
        if lowered.starts_with("bc1") || lowered.starts_with('1') || lowered.starts_with('3') {
            Ok(Chain::Bitcoin)
        } else if lowered.starts_with("0x") {
            Ok(Chain::Ethereum)
        } else {
            Err(ClassifyError::UnknownChainPrefix(address.trim().to_string()))
        }
    }

    /// Applies the chain's canonical casing. Hex and bech32 encodings are
    /// case-insensitive and get lowercased; base58 is case-sensitive and is
    /// kept verbatim.
    pub fn normalize(self, address: &str) -> String {
        let trimmed = address.trim();
        match self {
            Chain::Ethereum => trimmed.to_ascii_lowercase(),
            Chain::Bitcoin if trimmed.to_ascii_lowercase().starts_with("bc1") => {
                trimmed.to_ascii_lowercase()
            }
            Chain::Bitcoin => trimmed.to_string(),
        }
    }

    /// Checks an already-normalized address against the chain's format.
    pub fn is_valid_address(self, address: &str) -> bool {
        match self {
            Chain::Ethereum => {
                address.len() == 42
                    && address.starts_with("0x")
                    && address[2..].chars().all(|c| c.is_ascii_hexdigit())
            }
            Chain::Bitcoin => {
                if let Some(data) = address.strip_prefix("bc1") {
                    (14..=74).contains(&address.len())
                        && data.chars().all(|c| BECH32_CHARSET.contains(c))
                } else {
                    (26..=35).contains(&address.len())
                        && (address.starts_with('1') || address.starts_with('3'))
                        && address.chars().all(|c| BASE58_ALPHABET.contains(c))
                }
            }
        }
    }
}

/// A classified, normalized and format-checked address from the flagged feed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FlaggedAddress {
    chain: Chain,
    address: String,
}

impl FlaggedAddress {
    pub fn parse(raw: &str) -> Result<Self, ClassifyError> {
        let chain = Chain::classify(raw)?;
        let address = chain.normalize(raw);
        if !chain.is_valid_address(&address) {
            return Err(ClassifyError::InvalidFormat { chain, address });
        }
        Ok(Self { chain, address })
    }

    pub fn chain(&self) -> Chain {
        self.chain
    }

    pub fn as_str(&self) -> &str {
        &self.address
    }

    pub fn into_inner(self) -> String {
        self.address
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClassifyError {
    #[error("unrecognised chain prefix for address `{0}`")]
    UnknownChainPrefix(String),
    #[error("address `{address}` is not a valid {chain} address")]
    InvalidFormat { chain: Chain, address: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn classifies_by_prefix() {
        assert_eq!(
            Chain::classify("bc1qar0srrr7xfkvy5l643lydnw9re59gtzzwf5mdq"),
            Ok(Chain::Bitcoin)
        );
        assert_eq!(
            Chain::classify("1BoatSLRHtKNngkdXEeobR76b53LETtpyT"),
            Ok(Chain::Bitcoin)
        );
        assert_eq!(
            Chain::classify("3J98t1WpEZ73CNmQviecrnyiWrnqRhWNLy"),
            Ok(Chain::Bitcoin)
        );
        assert_eq!(
            Chain::classify("0xDe0B295669a9FD93d5F28D9Ec85E40f4cb697BAe"),
            Ok(Chain::Ethereum)
        );
    }

    #[test]
    fn unknown_prefix_is_rejected() {
        assert_eq!(
            Chain::classify("xyz123"),
            Err(ClassifyError::UnknownChainPrefix("xyz123".into()))
        );
    }

    #[test]
    fn ethereum_and_bech32_are_lowercased() {
        let eth = FlaggedAddress::parse("0xDe0B295669a9FD93d5F28D9Ec85E40f4cb697BAe").unwrap();
        assert_eq!(eth.as_str(), "0xde0b295669a9fd93d5f28d9ec85e40f4cb697bae");

        let bech = FlaggedAddress::parse("BC1QAR0SRRR7XFKVY5L643LYDNW9RE59GTZZWF5MDQ").unwrap();
        assert_eq!(bech.as_str(), "bc1qar0srrr7xfkvy5l643lydnw9re59gtzzwf5mdq");
    }

    #[test]
    fn base58_keeps_its_case() {
        let legacy = FlaggedAddress::parse(" 1BoatSLRHtKNngkdXEeobR76b53LETtpyT ").unwrap();
        assert_eq!(legacy.chain(), Chain::Bitcoin);
        assert_eq!(legacy.as_str(), "1BoatSLRHtKNngkdXEeobR76b53LETtpyT");
    }

    #[test]
    fn malformed_addresses_fail_validation() {
        assert!(matches!(
            FlaggedAddress::parse("0x1234"),
            Err(ClassifyError::InvalidFormat {
                chain: Chain::Ethereum,
                ..
            })
        ));
        // `O` and `0` are outside the base58 alphabet.
        assert!(matches!(
            FlaggedAddress::parse("1BoatSLRHtKNngkdXEeobR76b53LETtpyO"),
            Err(ClassifyError::InvalidFormat { .. })
        ));
        assert!(matches!(
            FlaggedAddress::parse("bc1qb"),
            Err(ClassifyError::InvalidFormat { .. })
        ));
    }

    #[test]
    fn chain_round_trips_through_its_column_value() {
        assert_eq!(Chain::Bitcoin.as_ref(), "bitcoin");
        assert_eq!(Chain::from_str("ethereum").unwrap(), Chain::Ethereum);
        assert_eq!(Chain::Ethereum.asset_symbol(), "ETH");
    }
}
