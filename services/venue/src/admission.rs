//! Order admission
//!
//! Authenticates relayed orders, enforces the per-trader monotonic
//! sequence number and turns a request into a pending [`Order`] with a
//! fresh time-ordered id.

use dashmap::{DashMap, DashSet};
use dashmap::mapref::entry::Entry;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;
use types::ids::{AccountId, MarketId};
use types::numeric::{Price, Quantity};
use types::order::{Order, OrderType, Side, TimeInForce};

use crate::error::AdmissionError;

/// Order as delivered by the relay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub account_id: AccountId,
    pub market_id: MarketId,
    pub side: Side,
    #[serde(default = "default_order_type")]
    pub order_type: OrderType,
    pub quantity: Quantity,
    #[serde(default)]
    pub price: Option<Price>,
    /// Defaults to GTC, or IOC for market orders
    #[serde(default)]
    pub time_in_force: Option<TimeInForce>,
    #[serde(default)]
    pub stop_price: Option<Price>,
    /// Visible slice of an iceberg order
    #[serde(default)]
    pub iceberg_quantity: Option<Quantity>,
    #[serde(default)]
    pub post_only: bool,
    pub sequence_number: u64,
    /// Opaque relay signature, checked by the [`Authenticator`]
    #[serde(default)]
    pub signature: Option<String>,
}

fn default_order_type() -> OrderType {
    OrderType::Limit
}

impl OrderRequest {
    pub fn limit(account_id: AccountId, market_id: MarketId, side: Side, price: Price, quantity: Quantity, sequence_number: u64) -> Self {
        Self {
            account_id,
            market_id,
            side,
            order_type: OrderType::Limit,
            quantity,
            price: Some(price),
            time_in_force: None,
            stop_price: None,
            iceberg_quantity: None,
            post_only: false,
            sequence_number,
            signature: None,
        }
    }

    pub fn market(account_id: AccountId, market_id: MarketId, side: Side, quantity: Quantity, sequence_number: u64) -> Self {
        Self {
            order_type: OrderType::Market,
            price: None,
            ..Self::limit(account_id, market_id, side, Price::zero(), quantity, sequence_number)
        }
    }

    pub fn with_time_in_force(mut self, time_in_force: TimeInForce) -> Self {
        self.time_in_force = Some(time_in_force);
        self
    }

    pub fn with_post_only(mut self) -> Self {
        self.post_only = true;
        self
    }

    pub fn with_iceberg(mut self, visible: Quantity) -> Self {
        self.iceberg_quantity = Some(visible);
        self
    }

    /// Turn a limit request into a stop; `price` stays as the optional limit.
    pub fn with_stop_price(mut self, stop_price: Price) -> Self {
        self.order_type = OrderType::Stop;
        self.stop_price = Some(stop_price);
        self
    }
}

/// Signature verification seam. Transport-level verification lives with
/// the relay; the venue only asks whether a request may be admitted.
pub trait Authenticator: Send + Sync {
    fn verify(&self, request: &OrderRequest) -> Result<(), AdmissionError>;
}

/// Admits every request.
#[derive(Debug, Default, Clone, Copy)]
pub struct AcceptAll;

impl Authenticator for AcceptAll {
    fn verify(&self, _request: &OrderRequest) -> Result<(), AdmissionError> {
        Ok(())
    }
}

/// Admits only registered accounts.
#[derive(Debug, Default)]
pub struct AccountAllowList {
    accounts: DashSet<AccountId>,
}

impl AccountAllowList {
    pub fn new(accounts: impl IntoIterator<Item = AccountId>) -> Self {
        Self {
            accounts: accounts.into_iter().collect(),
        }
    }

    pub fn allow(&self, account: AccountId) {
        self.accounts.insert(account);
    }

    pub fn revoke(&self, account: &AccountId) {
        self.accounts.remove(account);
    }
}

impl Authenticator for AccountAllowList {
    fn verify(&self, request: &OrderRequest) -> Result<(), AdmissionError> {
        if self.accounts.contains(&request.account_id) {
            Ok(())
        } else {
            Err(AdmissionError::Unauthorized(format!(
                "account {} is not allowed to trade",
                request.account_id
            )))
        }
    }
}

pub struct Admission {
    authenticator: Arc<dyn Authenticator>,
    // Highest sequence number observed per trader
    last_sequences: DashMap<AccountId, u64>,
}

impl Admission {
    pub fn new(authenticator: Arc<dyn Authenticator>) -> Self {
        Self {
            authenticator,
            last_sequences: DashMap::new(),
        }
    }

    pub fn last_sequence(&self, account: &AccountId) -> Option<u64> {
        self.last_sequences.get(account).map(|seq| *seq)
    }

    /// Authenticate `request`, consume its sequence number and build the
    /// pending order. A rejected request leaves the sequence untouched.
    pub fn admit(&self, request: OrderRequest, now: i64) -> Result<Order, AdmissionError> {
        if let Err(err) = self.authenticator.verify(&request) {
            warn!(account = %request.account_id, error = %err, "order admission rejected");
            return Err(err);
        }
        if request.quantity.is_zero() {
            return Err(AdmissionError::Malformed("quantity must be positive".into()));
        }
        if request.order_type == OrderType::Stop && request.stop_price.is_none() {
            return Err(AdmissionError::Malformed("stop order without stop price".into()));
        }

        // A trader's first order may carry any sequence, zero included.
        match self.last_sequences.entry(request.account_id) {
            Entry::Occupied(mut seen) => {
                let last = *seen.get();
                if request.sequence_number <= last {
                    let err = AdmissionError::StaleSequence {
                        account: request.account_id.to_string(),
                        last,
                        got: request.sequence_number,
                    };
                    warn!(account = %request.account_id, error = %err, "order admission rejected");
                    return Err(err);
                }
                seen.insert(request.sequence_number);
            }
            Entry::Vacant(slot) => {
                slot.insert(request.sequence_number);
            }
        }

        let time_in_force = request.time_in_force.unwrap_or(match request.order_type {
            OrderType::Market => TimeInForce::IOC,
            OrderType::Limit | OrderType::Stop => TimeInForce::GTC,
        });

        let mut order = Order::new(
            request.account_id,
            request.market_id,
            request.side,
            request.order_type,
            request.price,
            request.quantity,
            time_in_force,
            now,
        )
        .with_post_only(request.post_only)
        .with_sequence_number(request.sequence_number);
        if let Some(stop_price) = request.stop_price {
            order = order.with_stop_price(stop_price);
        }
        if let Some(visible) = request.iceberg_quantity {
            order = order.with_iceberg(visible);
        }
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use types::order::OrderStatus;

    fn request(account: AccountId, seq: u64) -> OrderRequest {
        OrderRequest::limit(
            account,
            MarketId::new("ETH-GAS-2026Q4"),
            Side::BUY,
            Price::from_str("0.40").unwrap(),
            Quantity::from_u64(5),
            seq,
        )
    }

    #[test]
    fn test_sequence_must_increase() {
        let admission = Admission::new(Arc::new(AcceptAll));
        let alice = AccountId::new();

        let first = admission.admit(request(alice, 1), 10).unwrap();
        assert_eq!(first.status, OrderStatus::Pending);
        assert_eq!(first.sequence_number, 1);
        assert_eq!(first.time_in_force, TimeInForce::GTC);

        let err = admission.admit(request(alice, 1), 11).unwrap_err();
        assert!(matches!(err, AdmissionError::StaleSequence { last: 1, got: 1, .. }));
        assert!(admission.admit(request(alice, 0), 12).is_err());

        // Gaps are allowed.
        assert!(admission.admit(request(alice, 7), 13).is_ok());
        assert_eq!(admission.last_sequence(&alice), Some(7));

        // Sequences are per trader.
        assert!(admission.admit(request(AccountId::new(), 1), 14).is_ok());
    }

    #[test]
    fn test_first_sequence_may_be_zero() {
        let admission = Admission::new(Arc::new(AcceptAll));
        let alice = AccountId::new();

        assert_eq!(admission.last_sequence(&alice), None);
        assert!(admission.admit(request(alice, 0), 10).is_ok());
        assert_eq!(admission.last_sequence(&alice), Some(0));

        let err = admission.admit(request(alice, 0), 11).unwrap_err();
        assert!(matches!(err, AdmissionError::StaleSequence { last: 0, got: 0, .. }));
        assert!(admission.admit(request(alice, 1), 12).is_ok());
    }

    #[test]
    fn test_order_ids_are_unique() {
        let admission = Admission::new(Arc::new(AcceptAll));
        let alice = AccountId::new();
        let a = admission.admit(request(alice, 1), 10).unwrap();
        let b = admission.admit(request(alice, 2), 11).unwrap();
        assert_ne!(a.order_id, b.order_id);
    }

    #[test]
    fn test_unauthorized_does_not_consume_sequence() {
        let alice = AccountId::new();
        let allow = Arc::new(AccountAllowList::default());
        let admission = Admission::new(allow.clone());

        let err = admission.admit(request(alice, 1), 10).unwrap_err();
        assert!(matches!(err, AdmissionError::Unauthorized(_)));
        assert_eq!(admission.last_sequence(&alice), None);

        allow.allow(alice);
        assert!(admission.admit(request(alice, 1), 11).is_ok());
    }

    #[test]
    fn test_market_defaults_to_ioc_and_stop_needs_trigger() {
        let admission = Admission::new(Arc::new(AcceptAll));
        let alice = AccountId::new();
        let market = OrderRequest::market(alice, MarketId::new("ETH-GAS-2026Q4"), Side::SELL, Quantity::from_u64(2), 1);
        let order = admission.admit(market, 10).unwrap();
        assert_eq!(order.time_in_force, TimeInForce::IOC);
        assert_eq!(order.price, None);

        let mut stop = request(alice, 2);
        stop.order_type = OrderType::Stop;
        assert!(matches!(admission.admit(stop, 11), Err(AdmissionError::Malformed(_))));
    }

    #[test]
    fn test_request_from_json() {
        let alice = AccountId::new();
        let json = format!(
            r#"{{"account_id":"{}","market_id":"ETH-GAS-2026Q4","side":"SELL","quantity":"3","price":"0.55","post_only":true,"sequence_number":4}}"#,
            alice
        );
        let req: OrderRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(req.order_type, OrderType::Limit);
        assert!(req.post_only);
        assert_eq!(req.price, Some(Price::from_str("0.55").unwrap()));
    }
}
