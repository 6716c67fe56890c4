//! Position tracking types
//!
//! Net exposure of one trader in one market. Fills in the position's
//! direction add to it at a weighted-average entry price; fills against it
//! reduce, close or flip it and realize PnL.

use crate::ids::{AccountId, MarketId};
use crate::numeric::{Price, Quantity};
use crate::order::Side;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Position side enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PositionSide {
    /// Long position - receives the outcome value
    LONG,
    /// Short position - receives ceiling minus the outcome value
    SHORT,
}

impl PositionSide {
    /// Direction a fill on `side` pushes the position
    pub fn from_side(side: Side) -> Self {
        match side {
            Side::BUY => PositionSide::LONG,
            Side::SELL => PositionSide::SHORT,
        }
    }
}

/// Quantities split out of a single fill
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FillEffect {
    /// Part of the fill that reduced an opposite position
    pub closed: Quantity,
    /// Side of the position that was reduced
    pub closed_side: Option<PositionSide>,
    /// Part of the fill that opened or added exposure
    pub opened: Quantity,
    /// PnL realized on the closed part
    pub realized: Decimal,
}

/// Net position of one account in one market
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub account_id: AccountId,
    pub market_id: MarketId,
    pub side: PositionSide,
    pub size: Quantity,
    pub entry_price: Price,
    pub realized_pnl: Decimal,
    pub opened_at: i64,
    pub updated_at: i64,
    pub version: u64,
}

impl Position {
    /// Create a flat position
    pub fn new(account_id: AccountId, market_id: MarketId, timestamp: i64) -> Self {
        Self {
            account_id,
            market_id,
            side: PositionSide::LONG,
            size: Quantity::zero(),
            entry_price: Price::zero(),
            realized_pnl: Decimal::ZERO,
            opened_at: timestamp,
            updated_at: timestamp,
            version: 0,
        }
    }

    pub fn is_flat(&self) -> bool {
        self.size.is_zero()
    }

    /// Quantity a fill on `side` would close, without applying it
    pub fn closing_quantity(&self, side: Side, quantity: Quantity) -> Quantity {
        if self.is_flat() || self.side == PositionSide::from_side(side) {
            Quantity::zero()
        } else {
            quantity.min(self.size)
        }
    }

    /// Apply a fill at `price`.
    ///
    /// Adding: `newAvg = (oldQty × oldAvg + qty × price) / (oldQty + qty)`.
    /// Opposite: reduce first, then flip with the remainder at `price`.
    pub fn apply_fill(&mut self, side: Side, quantity: Quantity, price: Price, timestamp: i64) -> FillEffect {
        let direction = PositionSide::from_side(side);
        let closed = self.closing_quantity(side, quantity);
        let closed_side = (!closed.is_zero()).then_some(self.side);
        let opened = quantity.saturating_sub(closed);

        let mut realized = Decimal::ZERO;
        if !closed.is_zero() {
            realized = Self::pnl(self.side, self.entry_price, price, closed);
            self.size = self.size.saturating_sub(closed);
            if self.size.is_zero() {
                self.entry_price = Price::zero();
            }
        }

        if !opened.is_zero() {
            if self.is_flat() {
                self.side = direction;
                self.entry_price = price;
                self.size = opened;
                self.opened_at = timestamp;
            } else {
                let old_notional = self.size.as_decimal() * self.entry_price.as_decimal();
                let new_size = self.size + opened;
                let average =
                    (old_notional + opened.as_decimal() * price.as_decimal()) / new_size.as_decimal();
                self.entry_price = Price::new(average.normalize());
                self.size = new_size;
            }
        }

        self.realized_pnl += realized;
        self.updated_at = timestamp;
        self.version += 1;

        FillEffect {
            closed,
            closed_side,
            opened,
            realized,
        }
    }

    /// Close the whole position at the outcome price, returning the PnL.
    pub fn close_at(&mut self, price: Price, timestamp: i64) -> Decimal {
        let realized = Self::pnl(self.side, self.entry_price, price, self.size);
        self.realized_pnl += realized;
        self.size = Quantity::zero();
        self.entry_price = Price::zero();
        self.updated_at = timestamp;
        self.version += 1;
        realized
    }

    fn pnl(side: PositionSide, entry: Price, exit: Price, size: Quantity) -> Decimal {
        let diff = exit.as_decimal() - entry.as_decimal();
        match side {
            // LONG: (exit - entry) × size
            PositionSide::LONG => diff * size.as_decimal(),
            // SHORT: (entry - exit) × size
            PositionSide::SHORT => -diff * size.as_decimal(),
        }
    }
}
