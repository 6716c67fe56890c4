//! Identifiers
//!
//! Orders, trades and accounts are UUID v7 newtypes. A market's escrow
//! account is a UUID v5 of the market name, so it is the same in every
//! process and across restarts.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! uuid_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }
    };
}

uuid_newtype!(
    /// Assigned at admission, never reused
    OrderId
);

uuid_newtype!(
    /// Settlement idempotency key: a trade moves collateral at most once
    TradeId
);

uuid_newtype!(AccountId);

const ESCROW_NAMESPACE: &str = "escrow:";

impl AccountId {
    /// Account holding the collateral that backs a market's open interest.
    pub fn escrow(market: &MarketId) -> Self {
        let name = [ESCROW_NAMESPACE, market.as_str()].concat();
        Self(Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes()))
    }
}

/// Name of a metric contract, e.g. "ETH-GAS-2026Q4"
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MarketId(String);

impl MarketId {
    /// # Panics
    /// If `name` is empty or contains whitespace. Use [`MarketId::try_new`]
    /// for untrusted input.
    pub fn new(name: impl Into<String>) -> Self {
        match Self::try_new(name) {
            Some(id) => id,
            None => panic!("market name must be non-empty without whitespace"),
        }
    }

    pub fn try_new(name: impl Into<String>) -> Option<Self> {
        let name = name.into();
        let valid = !name.is_empty() && !name.chars().any(char::is_whitespace);
        valid.then_some(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for MarketId {
    type Error = String;

    fn try_from(name: String) -> Result<Self, Self::Error> {
        Self::try_new(name.clone()).ok_or_else(|| format!("invalid market name {:?}", name))
    }
}

impl From<MarketId> for String {
    fn from(id: MarketId) -> Self {
        id.0
    }
}

impl fmt::Display for MarketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MarketId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_are_distinct() {
        assert_ne!(OrderId::new(), OrderId::new());
        assert_ne!(TradeId::new(), TradeId::new());
    }

    #[test]
    fn test_trade_id_is_plain_uuid_on_the_wire() {
        let id = TradeId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id));
        assert_eq!(serde_json::from_str::<TradeId>(&json).unwrap(), id);
    }

    #[test]
    fn test_escrow_account_is_stable_per_market() {
        let gas = MarketId::new("ETH-GAS-2026Q4");
        assert_eq!(AccountId::escrow(&gas), AccountId::escrow(&gas.clone()));
        assert_ne!(AccountId::escrow(&gas), AccountId::escrow(&MarketId::new("BTC-HASHRATE-2026Q4")));
    }

    #[test]
    fn test_market_names() {
        assert!(MarketId::try_new("ETH-GAS-2026Q4").is_some());
        assert!(MarketId::try_new("").is_none());
        assert!(MarketId::try_new("has space").is_none());
    }

    #[test]
    #[should_panic(expected = "market name must be non-empty")]
    fn test_blank_market_name_panics() {
        MarketId::new("");
    }

    #[test]
    fn test_market_id_rejects_invalid_json() {
        let market: MarketId = serde_json::from_str("\"TVL-AAVE\"").unwrap();
        assert_eq!(serde_json::to_string(&market).unwrap(), "\"TVL-AAVE\"");
        assert!(serde_json::from_str::<MarketId>("\"TVL AAVE\"").is_err());
    }
}
