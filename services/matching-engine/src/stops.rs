//! Parked stop orders
//!
//! Stops wait outside the book until the last trade price reaches their
//! stop price: a buy stop fires when `last ≥ stop`, a sell stop when
//! `last ≤ stop`. Fired stops are handed back in arrival order.

use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};
use types::ids::OrderId;
use types::numeric::Price;
use types::order::Side;

/// True if a stop on `side` at `stop` fires at last price `last`.
pub fn is_triggered(side: Side, stop: Price, last: Price) -> bool {
    match side {
        Side::BUY => last >= stop,
        Side::SELL => last <= stop,
    }
}

#[derive(Debug, Clone, Copy)]
struct Parked {
    side: Side,
    stop: Price,
    arrival: u64,
}

#[derive(Debug, Clone, Default)]
pub struct StopBook {
    /// Ascending stop price: the lowest buy stop fires first on a rally
    buys: BTreeMap<(Price, u64), OrderId>,
    /// Descending stop price: the highest sell stop fires first on a drop
    sells: BTreeMap<(Reverse<Price>, u64), OrderId>,
    index: HashMap<OrderId, Parked>,
}

impl StopBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, order_id: OrderId, side: Side, stop: Price, arrival: u64) {
        match side {
            Side::BUY => self.buys.insert((stop, arrival), order_id),
            Side::SELL => self.sells.insert((Reverse(stop), arrival), order_id),
        };
        self.index.insert(order_id, Parked { side, stop, arrival });
    }

    pub fn remove(&mut self, order_id: &OrderId) -> bool {
        let Some(parked) = self.index.remove(order_id) else {
            return false;
        };
        match parked.side {
            Side::BUY => self.buys.remove(&(parked.stop, parked.arrival)),
            Side::SELL => self.sells.remove(&(Reverse(parked.stop), parked.arrival)),
        };
        true
    }

    pub fn contains(&self, order_id: &OrderId) -> bool {
        self.index.contains_key(order_id)
    }

    /// Remove and return every stop that fires at `last`, in arrival order.
    pub fn take_triggered(&mut self, last: Price) -> Vec<OrderId> {
        let mut fired: Vec<(u64, OrderId)> = Vec::new();

        while let Some(((stop, arrival), order_id)) = self.buys.pop_first() {
            if !is_triggered(Side::BUY, stop, last) {
                self.buys.insert((stop, arrival), order_id);
                break;
            }
            fired.push((arrival, order_id));
        }
        while let Some(((Reverse(stop), arrival), order_id)) = self.sells.pop_first() {
            if !is_triggered(Side::SELL, stop, last) {
                self.sells.insert((Reverse(stop), arrival), order_id);
                break;
            }
            fired.push((arrival, order_id));
        }

        fired.sort_unstable_by_key(|(arrival, _)| *arrival);
        fired
            .into_iter()
            .map(|(_, order_id)| {
                self.index.remove(&order_id);
                order_id
            })
            .collect()
    }

    /// All parked ids in arrival order
    pub fn order_ids(&self) -> Vec<OrderId> {
        let mut ids: Vec<(u64, OrderId)> = self
            .index
            .iter()
            .map(|(order_id, parked)| (parked.arrival, *order_id))
            .collect();
        ids.sort_unstable_by_key(|(arrival, _)| *arrival);
        ids.into_iter().map(|(_, order_id)| order_id).collect()
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}
