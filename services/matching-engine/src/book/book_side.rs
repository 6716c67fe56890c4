//! One side of the order book
//!
//! Price levels in a `BTreeMap` for deterministic iteration. Bids are
//! best at the highest key, asks at the lowest.

use std::collections::BTreeMap;
use types::ids::{AccountId, OrderId};
use types::numeric::{Price, Quantity};
use types::order::Side;

use super::price_level::{LevelEntry, PriceLevel};

#[derive(Debug, Clone)]
pub struct BookSide {
    side: Side,
    levels: BTreeMap<Price, PriceLevel>,
}

impl BookSide {
    pub fn new(side: Side) -> Self {
        Self {
            side,
            levels: BTreeMap::new(),
        }
    }

    pub fn side(&self) -> Side {
        self.side
    }

    /// Append an order at the back of its price level
    pub fn insert(&mut self, price: Price, order_id: OrderId, account_id: AccountId, quantity: Quantity) {
        self.levels
            .entry(price)
            .or_default()
            .enqueue(LevelEntry {
                order_id,
                account_id,
                quantity,
            });
    }

    /// Remove an order, dropping its level if emptied
    pub fn remove(&mut self, order_id: &OrderId, price: Price) -> Option<Quantity> {
        let level = self.levels.get_mut(&price)?;
        let removed = level.withdraw(order_id)?.quantity;
        if level.is_empty() {
            self.levels.remove(&price);
        }
        Some(removed)
    }

    /// Best price and the visible quantity resting there
    pub fn best(&self) -> Option<(Price, Quantity)> {
        self.best_level().map(|(price, level)| (price, level.displayed()))
    }

    pub fn best_price(&self) -> Option<Price> {
        self.best_level().map(|(price, _)| price)
    }

    /// Front order of the best level
    pub fn peek(&self) -> Option<(Price, LevelEntry)> {
        let (price, level) = self.best_level()?;
        level.head().map(|entry| (price, *entry))
    }

    /// Apply a fill to the front order of the best level.
    ///
    /// Returns the entry's visible quantity left; an emptied level is
    /// removed.
    pub fn fill_best(&mut self, fill: Quantity) -> Option<Quantity> {
        let price = self.best_price()?;
        let level = self.levels.get_mut(&price)?;
        let left = level.consume_head(fill)?;
        if level.is_empty() {
            self.levels.remove(&price);
        }
        Some(left)
    }

    /// Levels from best to worst
    pub fn levels(&self) -> Box<dyn Iterator<Item = (Price, &PriceLevel)> + '_> {
        let iter = self.levels.iter().map(|(price, level)| (*price, level));
        match self.side {
            Side::BUY => Box::new(iter.rev()),
            Side::SELL => Box::new(iter),
        }
    }

    /// Top `depth` levels as (price, visible quantity)
    pub fn depth_snapshot(&self, depth: usize) -> Vec<(Price, Quantity)> {
        self.levels()
            .take(depth)
            .map(|(price, level)| (price, level.displayed()))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    pub fn order_count(&self) -> usize {
        self.levels.values().map(PriceLevel::len).sum()
    }

    fn best_level(&self) -> Option<(Price, &PriceLevel)> {
        let best = match self.side {
            Side::BUY => self.levels.iter().next_back(),
            Side::SELL => self.levels.iter().next(),
        };
        best.map(|(price, level)| (*price, level))
    }
}
