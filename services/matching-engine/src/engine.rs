//! Matching engine core
//!
//! One [`MarketEngine`] owns one market's book, orders and parked stops.
//! It is single-threaded by construction (`&mut self`); the per-market
//! actor serializes access. Collateral is reserved through the shared
//! [`Ledger`] before an order can touch the book, and released whenever
//! an order leaves the book without filling.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use ledger::{collateral, Ledger};
use tracing::{debug, error, info, warn};
use types::errors::{EngineError, ValidationError};
use types::ids::{AccountId, MarketId, OrderId};
use types::market::{MarketConfig, MarketStatus};
use types::numeric::Quantity;
use types::order::{CancelReason, Order, OrderStatus, OrderType, TimeInForce};
use types::trade::Trade;

use crate::book::OrderBook;
use crate::matching::{crossing, validation, Fill, MatchExecutor};
use crate::stats::{MarketData, MarketStats};
use crate::stops::{self, StopBook};

/// Result of an accepted submission
#[derive(Debug, Clone)]
pub struct SubmitOutcome {
    /// The submitted order after matching
    pub order: Order,
    /// Trades in execution order, including any triggered stop cascade
    pub trades: Vec<Trade>,
}

/// Matching engine for a single market
pub struct MarketEngine {
    config: MarketConfig,
    status: MarketStatus,
    book: OrderBook,
    /// Every order the market has accepted, terminal ones included
    orders: HashMap<OrderId, Order>,
    /// Good-till-date orders by deadline; stale entries are skipped on expiry
    deadlines: BTreeSet<(i64, OrderId)>,
    stops: StopBook,
    executor: MatchExecutor,
    stats: MarketStats,
    ledger: Arc<Ledger>,
    arrivals: u64,
    /// Trades executed but not yet handed downstream
    executed: Vec<Trade>,
}

impl MarketEngine {
    /// Create an engine for a validated market configuration
    pub fn new(config: MarketConfig, ledger: Arc<Ledger>) -> Result<Self, ValidationError> {
        config.validate()?;
        Ok(Self {
            executor: MatchExecutor::new(config.market_id.clone(), 1),
            config,
            status: MarketStatus::Open,
            book: OrderBook::new(),
            orders: HashMap::new(),
            deadlines: BTreeSet::new(),
            stops: StopBook::new(),
            stats: MarketStats::default(),
            ledger,
            arrivals: 0,
            executed: Vec::new(),
        })
    }

    pub fn market_id(&self) -> &MarketId {
        &self.config.market_id
    }

    pub fn config(&self) -> &MarketConfig {
        &self.config
    }

    pub fn status(&self) -> MarketStatus {
        self.status
    }

    pub fn book(&self) -> &OrderBook {
        &self.book
    }

    pub fn order(&self, order_id: &OrderId) -> Option<&Order> {
        self.orders.get(order_id)
    }

    pub fn stats(&self) -> &MarketStats {
        &self.stats
    }

    /// Drain the trades executed since the last call, whether or not the
    /// command that produced them succeeded.
    pub fn take_executed(&mut self) -> Vec<Trade> {
        std::mem::take(&mut self.executed)
    }

    /// Submit an order.
    ///
    /// Rejections leave book, orders and ledger untouched. If matching
    /// fails part way, fills already made stand (see [`take_executed`]) and
    /// the unfilled remainder is cancelled with its reservation released.
    ///
    /// [`take_executed`]: MarketEngine::take_executed
    pub fn submit(&mut self, mut order: Order, now: i64) -> Result<SubmitOutcome, EngineError> {
        if let Err(err) = self.admit(&mut order, now) {
            warn!(
                market = %self.config.market_id,
                order_id = %order.order_id,
                account = %order.account_id,
                error = %err,
                "order rejected"
            );
            return Err(err);
        }

        self.arrivals += 1;
        let order_id = order.order_id;
        info!(
            market = %self.config.market_id,
            order_id = %order_id,
            account = %order.account_id,
            side = ?order.side,
            order_type = ?order.order_type,
            quantity = %order.quantity,
            reserved = %order.reserved,
            "order accepted"
        );

        let mut trades = Vec::new();
        if order.order_type == OrderType::Stop && !self.stop_reached(&order) {
            order.open(now);
            if let Some(stop) = order.stop_price {
                self.stops.insert(order_id, order.side, stop, self.arrivals);
            }
            self.track_deadline(&order);
            debug!(market = %self.config.market_id, order_id = %order_id, "stop parked");
            self.orders.insert(order_id, order.clone());
            return Ok(SubmitOutcome { order, trades });
        }

        if order.order_type == OrderType::Stop {
            order.triggered = true;
        }
        let result = self.execute(&mut order, now, &mut trades);
        if let Err(err) = &result {
            self.halt(&mut order, now, err);
        }
        self.orders.insert(order_id, order);
        result?;

        self.run_stops(now, &mut trades)?;

        let order = self
            .orders
            .get(&order_id)
            .cloned()
            .ok_or_else(|| EngineError::OrderNotFound {
                order_id: order_id.to_string(),
            })?;
        Ok(SubmitOutcome { order, trades })
    }

    /// Cancel a resting or parked order owned by `account`.
    pub fn cancel(&mut self, order_id: &OrderId, account: &AccountId, now: i64) -> Result<Order, EngineError> {
        let order = self
            .orders
            .get_mut(order_id)
            .ok_or_else(|| EngineError::OrderNotFound {
                order_id: order_id.to_string(),
            })?;
        if &order.account_id != account {
            return Err(EngineError::NotOwner {
                order_id: order_id.to_string(),
                account: account.to_string(),
            });
        }
        if !order.status.is_resting() {
            return Err(EngineError::InvalidState {
                order_id: order_id.to_string(),
                status: order.status.label().to_string(),
            });
        }

        if self.book.remove(order_id).is_none() {
            self.stops.remove(order_id);
        }
        order.cancel(CancelReason::UserRequested, now)?;
        Self::release_remaining(&self.ledger, &self.config, order)?;

        info!(market = %self.config.market_id, order_id = %order_id, "order cancelled");
        Ok(order.clone())
    }

    /// Expire every resting or parked good-till-date order due at `now`.
    pub fn expire(&mut self, now: i64) -> Result<Vec<Order>, EngineError> {
        let mut expired = Vec::new();
        while let Some(&(deadline, order_id)) = self.deadlines.first() {
            if deadline > now {
                break;
            }
            self.deadlines.pop_first();
            let Some(order) = self.orders.get_mut(&order_id) else {
                continue;
            };
            if !order.status.is_resting() {
                continue;
            }
            if self.book.remove(&order_id).is_none() {
                self.stops.remove(&order_id);
            }
            order.expire(now)?;
            Self::release_remaining(&self.ledger, &self.config, order)?;
            expired.push(order.clone());
        }
        if !expired.is_empty() {
            info!(market = %self.config.market_id, count = expired.len(), "orders expired");
        }
        Ok(expired)
    }

    /// Close the market: cancel every resting and parked order and stop
    /// accepting submissions. Closing twice is a no-op.
    pub fn close(&mut self, now: i64) -> Result<Vec<Order>, EngineError> {
        if self.status != MarketStatus::Open {
            return Ok(Vec::new());
        }
        self.status = MarketStatus::Closed;

        let mut ids = self.book.order_ids();
        ids.extend(self.stops.order_ids());

        let mut cancelled = Vec::with_capacity(ids.len());
        for order_id in ids {
            if self.book.remove(&order_id).is_none() {
                self.stops.remove(&order_id);
            }
            if let Some(order) = self.orders.get_mut(&order_id) {
                order.cancel(CancelReason::MarketClosed, now)?;
                Self::release_remaining(&self.ledger, &self.config, order)?;
                cancelled.push(order.clone());
            }
        }
        info!(market = %self.config.market_id, cancelled = cancelled.len(), "market closed");
        Ok(cancelled)
    }

    /// Record that the outcome was applied; the market is terminal.
    pub fn mark_resolved(&mut self) {
        self.status = MarketStatus::Resolved;
    }

    /// Market data feed snapshot with `depth` levels per side
    pub fn market_data(&self, depth: usize) -> MarketData {
        MarketData {
            market_id: self.config.market_id.clone(),
            status: self.status,
            best_bid: self.book.best_bid(),
            best_ask: self.book.best_ask(),
            stats: self.stats.clone(),
            bids: self.book.depth_snapshot(types::order::Side::BUY, depth),
            asks: self.book.depth_snapshot(types::order::Side::SELL, depth),
            resting_orders: self.book.order_count(),
            parked_stops: self.stops.len(),
        }
    }

    // ── admission ───────────────────────────────────────────────────

    fn admit(&self, order: &mut Order, now: i64) -> Result<(), EngineError> {
        if self.status != MarketStatus::Open {
            return Err(EngineError::MarketClosed {
                market: self.config.market_id.to_string(),
            });
        }
        validation::validate_order(order, &self.config, now)?;
        if self.orders.contains_key(&order.order_id) {
            return Err(ValidationError::DuplicateOrder {
                order_id: order.order_id.to_string(),
            }
            .into());
        }

        // Engine-owned fields start clean regardless of what was submitted.
        order.status = OrderStatus::Pending;
        order.filled_quantity = Quantity::zero();
        order.triggered = false;
        order.reserved = Default::default();
        order.collateral_consumed = Default::default();

        if order.post_only && self.would_cross(order) {
            let price = order.price.map(|p| p.to_string()).unwrap_or_default();
            return Err(ValidationError::PostOnlyWouldCross { price }.into());
        }

        let fires_now = order.order_type != OrderType::Stop || self.stop_reached(order);
        if order.time_in_force == TimeInForce::FOK && fires_now {
            let available = self.crossing_liquidity(order, now);
            if available < order.quantity {
                return Err(ValidationError::FillOrKillUnfillable {
                    requested: order.quantity.to_string(),
                    available: available.to_string(),
                }
                .into());
            }
        }

        let reservation = collateral::order_reservation(order, &self.config)?;
        self.ledger
            .reserve(&order.account_id, &self.config.collateral_asset, reservation)?;
        order.reserved = reservation;
        Ok(())
    }

    fn would_cross(&self, order: &Order) -> bool {
        match (order.price, self.book.peek(order.side.opposite())) {
            (Some(limit), Some((best, _))) => crossing::incoming_can_match(order.side, Some(limit), best),
            _ => false,
        }
    }

    fn stop_reached(&self, order: &Order) -> bool {
        match (order.stop_price, self.stats.last_price) {
            (Some(stop), Some(last)) => stops::is_triggered(order.side, stop, last),
            _ => false,
        }
    }

    /// Quantity `order` could take right now, hidden iceberg quantity
    /// included. Own orders and expired makers do not count.
    fn crossing_liquidity(&self, order: &Order, now: i64) -> Quantity {
        let needed = order.remaining_quantity();
        let mut available = Quantity::zero();
        for (price, level) in self.book.side(order.side.opposite()).levels() {
            if !crossing::incoming_can_match(order.side, order.price, price) {
                break;
            }
            for entry in level.iter() {
                let Some(maker) = self.orders.get(&entry.order_id) else {
                    continue;
                };
                if maker.account_id == order.account_id || maker.is_expired(now) {
                    continue;
                }
                available = available + maker.remaining_quantity();
                if available >= needed {
                    return available;
                }
            }
        }
        available
    }

    // ── matching ────────────────────────────────────────────────────

    /// Sweep the opposite side, then rest or cancel the remainder.
    fn execute(&mut self, order: &mut Order, now: i64, trades: &mut Vec<Trade>) -> Result<(), EngineError> {
        let opposite = order.side.opposite();

        while !order.remaining_quantity().is_zero() {
            let Some((level_price, front)) = self.book.peek(opposite) else {
                break;
            };
            if !crossing::incoming_can_match(order.side, order.price, level_price) {
                break;
            }

            let Some(maker) = self.orders.get_mut(&front.order_id) else {
                error!(
                    market = %self.config.market_id,
                    order_id = %front.order_id,
                    "resting order missing from index, dropping from book"
                );
                self.book.remove(&front.order_id);
                continue;
            };

            if maker.is_expired(now) {
                self.book.remove(&front.order_id);
                maker.expire(now)?;
                Self::release_remaining(&self.ledger, &self.config, maker)?;
                info!(market = %self.config.market_id, order_id = %front.order_id, "resting order expired during sweep");
                continue;
            }

            if maker.account_id == order.account_id {
                self.book.remove(&front.order_id);
                maker.cancel(CancelReason::SelfTrade, now)?;
                Self::release_remaining(&self.ledger, &self.config, maker)?;
                info!(
                    market = %self.config.market_id,
                    order_id = %front.order_id,
                    incoming = %order.order_id,
                    "self-trade prevented, resting order cancelled"
                );
                continue;
            }

            let quantity = order.remaining_quantity().min(front.quantity);
            let taker_collateral = collateral::fill_slice(order, quantity, &self.config)?;
            let maker_collateral = collateral::fill_slice(maker, quantity, &self.config)?;
            order.add_fill(quantity, taker_collateral, now);
            maker.add_fill(quantity, maker_collateral, now);

            let fill = Fill {
                price: level_price,
                quantity,
                taker_collateral,
                maker_collateral,
            };
            let trade = self.executor.execute_trade(order, maker, fill, now);
            self.stats.record_trade(&trade);
            self.executed.push(trade.clone());

            let left = self.book.fill_front(opposite, quantity);
            if left == Some(Quantity::zero()) && !maker.is_filled() {
                // Iceberg reveal goes to the back of the level.
                let slice = maker.visible_slice();
                self.book
                    .insert(opposite, level_price, maker.order_id, maker.account_id, slice);
                debug!(
                    market = %self.config.market_id,
                    order_id = %maker.order_id,
                    slice = %slice,
                    "iceberg slice revealed"
                );
            }

            debug!(
                market = %self.config.market_id,
                trade_id = %trade.trade_id,
                sequence = trade.sequence,
                price = %trade.price,
                quantity = %trade.quantity,
                "trade executed"
            );
            trades.push(trade);
        }

        self.finish(order, now)
    }

    fn finish(&mut self, order: &mut Order, now: i64) -> Result<(), EngineError> {
        if order.is_filled() {
            return Ok(());
        }
        match (order.can_rest(), order.price) {
            (true, Some(price)) => {
                order.open(now);
                let slice = order.visible_slice();
                self.book
                    .insert(order.side, price, order.order_id, order.account_id, slice);
                self.track_deadline(order);
                debug!(
                    market = %self.config.market_id,
                    order_id = %order.order_id,
                    price = %price,
                    visible = %slice,
                    "order resting"
                );
            }
            _ => {
                order.cancel(CancelReason::ImmediateOrCancel, now)?;
                Self::release_remaining(&self.ledger, &self.config, order)?;
                debug!(
                    market = %self.config.market_id,
                    order_id = %order.order_id,
                    unfilled = %order.remaining_quantity(),
                    "unfilled remainder cancelled"
                );
            }
        }
        Ok(())
    }

    /// Fire stops reached by the last trade price until none remain.
    fn run_stops(&mut self, now: i64, trades: &mut Vec<Trade>) -> Result<(), EngineError> {
        while let Some(last) = self.stats.last_price {
            let fired = self.stops.take_triggered(last);
            if fired.is_empty() {
                break;
            }
            for order_id in fired {
                let Some(mut stop) = self.orders.remove(&order_id) else {
                    continue;
                };
                stop.triggered = true;
                info!(market = %self.config.market_id, order_id = %order_id, last = %last, "stop triggered");

                let result = if stop.time_in_force == TimeInForce::FOK
                    && self.crossing_liquidity(&stop, now) < stop.remaining_quantity()
                {
                    stop.cancel(CancelReason::ImmediateOrCancel, now)
                        .and_then(|_| Self::release_remaining(&self.ledger, &self.config, &mut stop))
                } else {
                    self.execute(&mut stop, now, trades)
                };
                if let Err(err) = &result {
                    self.halt(&mut stop, now, err);
                }
                self.orders.insert(order_id, stop);
                result?;
            }
        }
        Ok(())
    }

    fn track_deadline(&mut self, order: &Order) {
        if let TimeInForce::GTD(deadline) = order.time_in_force {
            self.deadlines.insert((deadline, order.order_id));
        }
    }

    /// Take an order out of play after its sweep failed. Fills it already
    /// made stand; the rest of its reservation goes back to the trader.
    fn halt(&mut self, order: &mut Order, now: i64, cause: &EngineError) {
        error!(
            market = %self.config.market_id,
            order_id = %order.order_id,
            filled = %order.filled_quantity,
            error = %cause,
            "matching halted"
        );
        if order.status.is_terminal() || self.book.contains(&order.order_id) {
            return;
        }
        self.stops.remove(&order.order_id);
        let released = order
            .cancel(CancelReason::MatchingHalted, now)
            .and_then(|_| Self::release_remaining(&self.ledger, &self.config, order));
        if let Err(err) = released {
            error!(
                market = %self.config.market_id,
                order_id = %order.order_id,
                error = %err,
                "halted order could not be released"
            );
        }
    }

    /// Return the order's unconsumed reservation to the trader.
    fn release_remaining(ledger: &Ledger, config: &MarketConfig, order: &mut Order) -> Result<(), EngineError> {
        let amount = order.remaining_reservation();
        if !amount.is_zero() {
            ledger.release(&order.account_id, &config.collateral_asset, amount)?;
        }
        order.reserved = order.collateral_consumed;
        Ok(())
    }
}
