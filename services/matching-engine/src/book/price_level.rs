//! Time-priority queue of the orders resting at one price
//!
//! Only displayed quantity lives here. An iceberg's hidden reserve stays
//! on the order and comes back through [`PriceLevel::enqueue`] as a fresh
//! entry when the displayed slice is used up.

use std::collections::VecDeque;
use types::ids::{AccountId, OrderId};
use types::numeric::Quantity;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelEntry {
    pub order_id: OrderId,
    pub account_id: AccountId,
    /// Displayed quantity still resting
    pub quantity: Quantity,
}

#[derive(Debug, Clone, Default)]
pub struct PriceLevel {
    queue: VecDeque<LevelEntry>,
    displayed: Quantity,
}

impl PriceLevel {
    pub fn enqueue(&mut self, entry: LevelEntry) {
        self.displayed = self.displayed + entry.quantity;
        self.queue.push_back(entry);
    }

    /// Take an order out of the queue wherever it sits.
    pub fn withdraw(&mut self, order_id: &OrderId) -> Option<LevelEntry> {
        let index = self.queue.iter().position(|entry| entry.order_id == *order_id)?;
        let entry = self.queue.remove(index)?;
        self.displayed = self.displayed.saturating_sub(entry.quantity);
        Some(entry)
    }

    pub fn head(&self) -> Option<&LevelEntry> {
        self.queue.front()
    }

    /// Execute `fill` against the head entry, dropping it once nothing is
    /// displayed. Returns what the head still displays.
    pub fn consume_head(&mut self, fill: Quantity) -> Option<Quantity> {
        let head = self.queue.front_mut()?;
        let taken = fill.min(head.quantity);
        head.quantity = head.quantity.saturating_sub(taken);
        let left = head.quantity;
        self.displayed = self.displayed.saturating_sub(taken);
        if left.is_zero() {
            self.queue.pop_front();
        }
        Some(left)
    }

    pub fn iter(&self) -> impl Iterator<Item = &LevelEntry> {
        self.queue.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn displayed(&self) -> Quantity {
        self.displayed
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }
}
