//! Trade execution types
//!
//! A trade is created by the matching engine, never mutated afterwards and
//! consumed exactly once by the settlement bridge.

use crate::ids::{AccountId, MarketId, OrderId, TradeId};
use crate::numeric::{Amount, Price, Quantity};
use crate::order::Side;
use serde::{Deserialize, Serialize};

/// Executed match between a buy and a sell order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trade {
    /// Settlement idempotency key
    pub trade_id: TradeId,
    /// Per-market monotonic sequence
    pub sequence: u64,
    pub market_id: MarketId,

    // Order references
    pub buy_order_id: OrderId,
    pub sell_order_id: OrderId,

    // Account references
    pub buyer: AccountId,
    pub seller: AccountId,

    /// Side of the incoming (aggressing) order
    pub taker_side: Side,
    /// Execution price: always the resting order's price
    pub price: Price,
    pub quantity: Quantity,

    /// Reservation slice the buyer had set aside for this fill
    pub buyer_collateral: Amount,
    /// Reservation slice the seller had set aside for this fill
    pub seller_collateral: Amount,

    pub executed_at: i64, // Unix nanos
}

impl Trade {
    /// Create a new trade
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        sequence: u64,
        market_id: MarketId,
        buy_order_id: OrderId,
        sell_order_id: OrderId,
        buyer: AccountId,
        seller: AccountId,
        taker_side: Side,
        price: Price,
        quantity: Quantity,
        buyer_collateral: Amount,
        seller_collateral: Amount,
        executed_at: i64,
    ) -> Self {
        Self {
            trade_id: TradeId::new(),
            sequence,
            market_id,
            buy_order_id,
            sell_order_id,
            buyer,
            seller,
            taker_side,
            price,
            quantity,
            buyer_collateral,
            seller_collateral,
            executed_at,
        }
    }

    /// Account on the given side of the trade
    pub fn account(&self, side: Side) -> AccountId {
        match side {
            Side::BUY => self.buyer,
            Side::SELL => self.seller,
        }
    }

    /// Collateral slice reserved by the given side
    pub fn collateral(&self, side: Side) -> Amount {
        match side {
            Side::BUY => self.buyer_collateral,
            Side::SELL => self.seller_collateral,
        }
    }

    /// Order id of the resting (maker) side
    pub fn maker_order_id(&self) -> OrderId {
        match self.taker_side {
            Side::BUY => self.sell_order_id,
            Side::SELL => self.buy_order_id,
        }
    }
}
