//! Per-market order book
//!
//! Both sides plus an order-id index for O(log n) cancellation. The book
//! holds no matching logic.

use std::collections::HashMap;
use types::ids::{AccountId, OrderId};
use types::numeric::{Price, Quantity};
use types::order::Side;

use super::book_side::BookSide;
use super::price_level::LevelEntry;

#[derive(Debug, Clone)]
pub struct OrderBook {
    bids: BookSide,
    asks: BookSide,
    index: HashMap<OrderId, (Side, Price)>,
}

impl OrderBook {
    pub fn new() -> Self {
        Self {
            bids: BookSide::new(Side::BUY),
            asks: BookSide::new(Side::SELL),
            index: HashMap::new(),
        }
    }

    /// Rest `quantity` of an order at the back of its level
    pub fn insert(&mut self, side: Side, price: Price, order_id: OrderId, account_id: AccountId, quantity: Quantity) {
        self.side_mut(side).insert(price, order_id, account_id, quantity);
        self.index.insert(order_id, (side, price));
    }

    /// Remove a resting order; returns its side, price and visible quantity
    pub fn remove(&mut self, order_id: &OrderId) -> Option<(Side, Price, Quantity)> {
        let (side, price) = self.index.remove(order_id)?;
        let quantity = self.side_mut(side).remove(order_id, price)?;
        Some((side, price, quantity))
    }

    pub fn contains(&self, order_id: &OrderId) -> bool {
        self.index.contains_key(order_id)
    }

    pub fn best_bid(&self) -> Option<(Price, Quantity)> {
        self.bids.best()
    }

    pub fn best_ask(&self) -> Option<(Price, Quantity)> {
        self.asks.best()
    }

    /// Front order of the best level on `side`
    pub fn peek(&self, side: Side) -> Option<(Price, LevelEntry)> {
        self.side(side).peek()
    }

    /// Fill the front order on `side`; returns its visible quantity left.
    ///
    /// An exhausted entry leaves the book and the index.
    pub fn fill_front(&mut self, side: Side, fill: Quantity) -> Option<Quantity> {
        let (_, front) = self.peek(side)?;
        let left = self.side_mut(side).fill_best(fill)?;
        if left.is_zero() {
            self.index.remove(&front.order_id);
        }
        Some(left)
    }

    pub fn side(&self, side: Side) -> &BookSide {
        match side {
            Side::BUY => &self.bids,
            Side::SELL => &self.asks,
        }
    }

    fn side_mut(&mut self, side: Side) -> &mut BookSide {
        match side {
            Side::BUY => &mut self.bids,
            Side::SELL => &mut self.asks,
        }
    }

    pub fn depth_snapshot(&self, side: Side, depth: usize) -> Vec<(Price, Quantity)> {
        self.side(side).depth_snapshot(depth)
    }

    /// True if the best bid is at or above the best ask
    pub fn is_crossed(&self) -> bool {
        match (self.bids.best_price(), self.asks.best_price()) {
            (Some(bid), Some(ask)) => bid >= ask,
            _ => false,
        }
    }

    pub fn order_count(&self) -> usize {
        self.index.len()
    }

    /// Ids of every resting order, bids then asks, in priority order
    pub fn order_ids(&self) -> Vec<OrderId> {
        [&self.bids, &self.asks]
            .into_iter()
            .flat_map(|side| side.levels().flat_map(|(_, level)| level.iter().map(|e| e.order_id)))
            .collect()
    }
}

impl Default for OrderBook {
    fn default() -> Self {
        Self::new()
    }
}
