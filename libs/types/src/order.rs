//! Order lifecycle types
//!
//! State machine:
//! `Pending → Open → {PartiallyFilled ⇄ Open-with-remainder} → Filled | Cancelled | Expired`.
//! `Pending` only exists while the engine validates and matches an incoming
//! order; terminal states never change again.

use crate::errors::EngineError;
use crate::ids::{AccountId, MarketId, OrderId};
use crate::numeric::{Amount, Price, Quantity};
use serde::{Deserialize, Serialize};

/// Order side (buyer or seller)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    /// Buy order (bid), opens or adds to a long
    BUY,
    /// Sell order (ask), opens or adds to a short
    SELL,
}

impl Side {
    /// Get the opposite side
    pub fn opposite(&self) -> Self {
        match self {
            Side::BUY => Side::SELL,
            Side::SELL => Side::BUY,
        }
    }
}

/// Order type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderType {
    /// Rests at its limit price if not fully matched
    Limit,
    /// Takes liquidity at any price, never rests
    Market,
    /// Parked until the last trade price reaches the stop price, then
    /// behaves as a market order (no limit) or limit order (with limit)
    Stop,
}

/// Time-in-force policy for orders
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum TimeInForce {
    /// Good-Till-Cancel: remains until filled or explicitly cancelled
    GTC,
    /// Immediate-Or-Cancel: match immediately, cancel remainder
    IOC,
    /// Fill-Or-Kill: full match or reject entirely
    FOK,
    /// Good-Till-Date: expire at specified Unix nanos timestamp
    GTD(i64),
}

impl TimeInForce {
    /// True if the policy forbids resting on the book.
    pub fn is_immediate(&self) -> bool {
        matches!(self, TimeInForce::IOC | TimeInForce::FOK)
    }
}

/// Order status
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason")]
pub enum OrderStatus {
    /// State 0: Validation / matching in progress (transient)
    #[serde(rename = "PENDING")]
    Pending,

    /// State 1: Resting without fills
    #[serde(rename = "OPEN")]
    Open,

    /// State 2: Resting (or being matched) with some fills
    #[serde(rename = "PARTIALLY_FILLED")]
    PartiallyFilled,

    /// State 3: Completely matched (terminal)
    #[serde(rename = "FILLED")]
    Filled,

    /// State 4: Cancelled by user or system (terminal)
    #[serde(rename = "CANCELLED")]
    Cancelled(CancelReason),

    /// State 5: Time-in-force deadline reached (terminal)
    #[serde(rename = "EXPIRED")]
    Expired,
}

impl OrderStatus {
    /// Check if status is terminal (no further transitions possible)
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Cancelled(_) | OrderStatus::Expired
        )
    }

    /// Resting states: the only states a user may cancel from.
    pub fn is_resting(&self) -> bool {
        matches!(self, OrderStatus::Open | OrderStatus::PartiallyFilled)
    }

    /// Get the state ID for wire protocol
    pub fn state_id(&self) -> u8 {
        match self {
            OrderStatus::Pending => 0,
            OrderStatus::Open => 1,
            OrderStatus::PartiallyFilled => 2,
            OrderStatus::Filled => 3,
            OrderStatus::Cancelled(_) => 4,
            OrderStatus::Expired => 5,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Open => "OPEN",
            OrderStatus::PartiallyFilled => "PARTIALLY_FILLED",
            OrderStatus::Filled => "FILLED",
            OrderStatus::Cancelled(_) => "CANCELLED",
            OrderStatus::Expired => "EXPIRED",
        }
    }
}

/// Cancel reasons
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CancelReason {
    UserRequested,
    /// Resting order would have traded with the same account
    SelfTrade,
    /// Unfilled remainder of an IOC or market order
    ImmediateOrCancel,
    /// Market closed for outcome resolution
    MarketClosed,
    /// Matching stopped on an internal error; the remainder was released
    MatchingHalted,
}

/// Complete order structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub order_id: OrderId,
    pub account_id: AccountId,
    pub market_id: MarketId,
    pub side: Side,
    pub order_type: OrderType,
    /// Limit price; `None` for market orders and plain stops
    pub price: Option<Price>,
    pub stop_price: Option<Price>,
    pub quantity: Quantity,
    pub filled_quantity: Quantity,
    pub status: OrderStatus,
    pub time_in_force: TimeInForce,
    /// Visible slice of an iceberg order
    pub iceberg_quantity: Option<Quantity>,
    pub post_only: bool,
    /// Per-trader monotonic sequence number from admission
    pub sequence_number: u64,
    /// Stop orders only: trigger condition has been met
    pub triggered: bool,
    /// Native collateral reserved at admission
    pub reserved: Amount,
    /// Part of `reserved` attributed to fills so far
    pub collateral_consumed: Amount,
    pub created_at: i64, // Unix nanos
    pub updated_at: i64, // Unix nanos
    pub version: u64,
}

impl Order {
    /// Create a new pending order
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        account_id: AccountId,
        market_id: MarketId,
        side: Side,
        order_type: OrderType,
        price: Option<Price>,
        quantity: Quantity,
        time_in_force: TimeInForce,
        timestamp: i64,
    ) -> Self {
        Self {
            order_id: OrderId::new(),
            account_id,
            market_id,
            side,
            order_type,
            price,
            stop_price: None,
            quantity,
            filled_quantity: Quantity::zero(),
            status: OrderStatus::Pending,
            time_in_force,
            iceberg_quantity: None,
            post_only: false,
            sequence_number: 0,
            triggered: false,
            reserved: Amount::ZERO,
            collateral_consumed: Amount::ZERO,
            created_at: timestamp,
            updated_at: timestamp,
            version: 0,
        }
    }

    /// Good-till-cancel limit order
    pub fn limit(
        account_id: AccountId,
        market_id: MarketId,
        side: Side,
        price: Price,
        quantity: Quantity,
        timestamp: i64,
    ) -> Self {
        Self::new(
            account_id,
            market_id,
            side,
            OrderType::Limit,
            Some(price),
            quantity,
            TimeInForce::GTC,
            timestamp,
        )
    }

    /// Market order (IOC semantics)
    pub fn market(
        account_id: AccountId,
        market_id: MarketId,
        side: Side,
        quantity: Quantity,
        timestamp: i64,
    ) -> Self {
        Self::new(
            account_id,
            market_id,
            side,
            OrderType::Market,
            None,
            quantity,
            TimeInForce::IOC,
            timestamp,
        )
    }

    pub fn with_id(mut self, order_id: OrderId) -> Self {
        self.order_id = order_id;
        self
    }

    pub fn with_time_in_force(mut self, time_in_force: TimeInForce) -> Self {
        self.time_in_force = time_in_force;
        self
    }

    pub fn with_stop_price(mut self, stop_price: Price) -> Self {
        self.stop_price = Some(stop_price);
        self
    }

    pub fn with_iceberg(mut self, visible: Quantity) -> Self {
        self.iceberg_quantity = Some(visible);
        self
    }

    pub fn with_post_only(mut self, post_only: bool) -> Self {
        self.post_only = post_only;
        self
    }

    pub fn with_sequence_number(mut self, sequence_number: u64) -> Self {
        self.sequence_number = sequence_number;
        self
    }

    /// Quantity still to be filled
    pub fn remaining_quantity(&self) -> Quantity {
        self.quantity.saturating_sub(self.filled_quantity)
    }

    /// Check quantity invariant: filled ≤ total
    pub fn check_invariant(&self) -> bool {
        self.filled_quantity <= self.quantity && self.collateral_consumed <= self.reserved
    }

    /// Check if order is completely filled
    pub fn is_filled(&self) -> bool {
        self.filled_quantity == self.quantity
    }

    /// Check if order has any fills
    pub fn has_fills(&self) -> bool {
        !self.filled_quantity.is_zero()
    }

    /// Good-till-date deadline, if any
    pub fn expiry(&self) -> Option<i64> {
        match self.time_in_force {
            TimeInForce::GTD(deadline) => Some(deadline),
            _ => None,
        }
    }

    pub fn is_expired(&self, now: i64) -> bool {
        self.expiry().is_some_and(|deadline| deadline <= now)
    }

    /// How the order currently matches: a triggered stop acts as a limit
    /// (if priced) or market order.
    pub fn effective_type(&self) -> OrderType {
        match (self.order_type, self.triggered) {
            (OrderType::Stop, true) if self.price.is_some() => OrderType::Limit,
            (OrderType::Stop, true) => OrderType::Market,
            (other, _) => other,
        }
    }

    /// True if an unfilled remainder may rest on the book.
    pub fn can_rest(&self) -> bool {
        self.effective_type() == OrderType::Limit && !self.time_in_force.is_immediate()
    }

    /// Quantity to show on the book: the iceberg slice, capped by what remains.
    pub fn visible_slice(&self) -> Quantity {
        let remaining = self.remaining_quantity();
        match self.iceberg_quantity {
            Some(slice) if slice < remaining => slice,
            _ => remaining,
        }
    }

    /// Reservation not yet attributed to fills
    pub fn remaining_reservation(&self) -> Amount {
        self.reserved.saturating_sub(self.collateral_consumed)
    }

    /// Record a fill and the collateral slice it consumed.
    ///
    /// # Panics
    /// Panics if the fill would exceed total quantity or the reservation
    pub fn add_fill(&mut self, fill_quantity: Quantity, collateral: Amount, timestamp: i64) {
        let new_filled = self.filled_quantity + fill_quantity;
        assert!(new_filled <= self.quantity, "Fill would exceed order quantity");

        let new_consumed = self
            .collateral_consumed
            .checked_add(collateral)
            .filter(|consumed| *consumed <= self.reserved);
        assert!(new_consumed.is_some(), "Fill would exceed order reservation");

        self.filled_quantity = new_filled;
        self.collateral_consumed = new_consumed.unwrap_or(self.reserved);

        self.status = if self.is_filled() {
            OrderStatus::Filled
        } else {
            OrderStatus::PartiallyFilled
        };

        self.touch(timestamp);
        assert!(self.check_invariant(), "Invariant violated after fill");
    }

    /// Move a validated order onto the book.
    pub fn open(&mut self, timestamp: i64) {
        if self.status == OrderStatus::Pending {
            self.status = OrderStatus::Open;
            self.touch(timestamp);
        }
    }

    /// Cancel the order; fails on terminal orders.
    pub fn cancel(&mut self, reason: CancelReason, timestamp: i64) -> Result<(), EngineError> {
        self.ensure_not_terminal()?;
        self.status = OrderStatus::Cancelled(reason);
        self.touch(timestamp);
        Ok(())
    }

    /// Expire the order; fails on terminal orders.
    pub fn expire(&mut self, timestamp: i64) -> Result<(), EngineError> {
        self.ensure_not_terminal()?;
        self.status = OrderStatus::Expired;
        self.touch(timestamp);
        Ok(())
    }

    fn ensure_not_terminal(&self) -> Result<(), EngineError> {
        if self.status.is_terminal() {
            return Err(EngineError::InvalidState {
                order_id: self.order_id.to_string(),
                status: self.status.label().to_string(),
            });
        }
        Ok(())
    }

    fn touch(&mut self, timestamp: i64) {
        self.updated_at = timestamp;
        self.version += 1;
    }
}
