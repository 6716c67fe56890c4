//! Position book
//!
//! Net positions keyed by (market, account). Only the settlement bridge
//! mutates positions, and it does so after a trade is durably committed.

use dashmap::DashMap;
use rust_decimal::Decimal;
use types::ids::{AccountId, MarketId};
use types::numeric::{Price, Quantity};
use types::order::Side;
use types::position::{FillEffect, Position, PositionSide};

#[derive(Debug, Default)]
pub struct PositionBook {
    positions: DashMap<(MarketId, AccountId), Position>,
}

impl PositionBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn position(&self, market: &MarketId, account: &AccountId) -> Option<Position> {
        self.positions
            .get(&(market.clone(), *account))
            .map(|entry| entry.value().clone())
    }

    /// How a fill would split into closing and opening parts, without
    /// applying it.
    pub fn preview(&self, market: &MarketId, account: &AccountId, side: Side, quantity: Quantity) -> (Quantity, Option<PositionSide>) {
        match self.positions.get(&(market.clone(), *account)) {
            Some(position) => {
                let closed = position.closing_quantity(side, quantity);
                (closed, (!closed.is_zero()).then_some(position.side))
            }
            None => (Quantity::zero(), None),
        }
    }

    pub fn apply_fill(
        &self,
        market: &MarketId,
        account: &AccountId,
        side: Side,
        quantity: Quantity,
        price: Price,
        timestamp: i64,
    ) -> FillEffect {
        self.positions
            .entry((market.clone(), *account))
            .or_insert_with(|| Position::new(*account, market.clone(), timestamp))
            .apply_fill(side, quantity, price, timestamp)
    }

    /// Non-flat positions in `market`, ordered by account.
    pub fn open_positions(&self, market: &MarketId) -> Vec<Position> {
        let mut open: Vec<Position> = self
            .positions
            .iter()
            .filter(|entry| &entry.key().0 == market && !entry.value().is_flat())
            .map(|entry| entry.value().clone())
            .collect();
        open.sort_by_key(|position| position.account_id);
        open
    }

    /// Total long size; equals total short size when every trade is settled.
    pub fn open_interest(&self, market: &MarketId) -> Quantity {
        self.positions
            .iter()
            .filter(|entry| &entry.key().0 == market && entry.value().side == PositionSide::LONG)
            .fold(Quantity::zero(), |total, entry| total + entry.value().size)
    }

    /// Close every position in `market` at the outcome, returning the
    /// realized PnL per account.
    pub fn close_market(&self, market: &MarketId, outcome: Price, timestamp: i64) -> Vec<(AccountId, Decimal)> {
        let mut realized = Vec::new();
        for mut entry in self.positions.iter_mut() {
            if &entry.key().0 != market || entry.value().is_flat() {
                continue;
            }
            let account = entry.key().1;
            realized.push((account, entry.value_mut().close_at(outcome, timestamp)));
        }
        realized.sort_by_key(|(account, _)| *account);
        realized
    }
}
