//! Settlement bridge
//!
//! Consumes executed trades and commits their financial effects. Each
//! market has its own FIFO lane; a flush drains a bounded batch from every
//! lane, committing trades of one market strictly in production order while
//! different markets proceed concurrently.
//!
//! Per trade the protocol is:
//! 1. plan both legs (closing payout, opening cost, reservation excess)
//! 2. `begin_transfer` the opening costs (reserved → in-flight)
//! 3. durably record the deltas, retrying transient failures with backoff
//! 4. `commit_transfer` costs into the market escrow, pay closing legs out
//!    of escrow, release the excess, update positions
//!
//! A store failure after the last retry aborts the in-flight amounts and
//! moves the trade to the dead-letter list; it never blocks the lane.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use dashmap::{DashMap, DashSet};
use futures::future::join_all;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use ledger::{collateral, Ledger};
use types::clock;
use types::errors::{LedgerError, SettlementError, StoreError};
use types::ids::{AccountId, MarketId, TradeId};
use types::market::MarketConfig;
use types::numeric::{Amount, Price};
use types::order::Side;
use types::trade::Trade;

use crate::positions::PositionBook;
use crate::store::{Applied, CommitKey, CommitRecord, DurableStore, LegDelta, ResolutionCommit, TradeCommit};

/// Bridge tuning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Trades drained per market per flush
    pub batch_size: usize,
    /// Store retries after the first attempt
    pub max_retries: u32,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
    /// Period of the background flush loop
    pub flush_interval_ms: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            batch_size: 256,
            max_retries: 5,
            base_backoff_ms: 10,
            max_backoff_ms: 1_000,
            flush_interval_ms: 50,
        }
    }
}

impl BridgeConfig {
    /// Delay before retry number `retry` (0-based): exponential, capped.
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 1u64.checked_shl(retry).unwrap_or(u64::MAX);
        Duration::from_millis(self.base_backoff_ms.saturating_mul(factor).min(self.max_backoff_ms))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SettlementStatus {
    Pending,
    Committed,
    DeadLettered,
    Unknown,
}

/// Trade parked for operator attention
#[derive(Debug, Clone, Serialize)]
pub struct DeadLetter {
    pub trade: Trade,
    pub reason: String,
    pub attempts: u32,
    pub dead_lettered_at: i64,
}

/// Outcome of one flush
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchResult {
    pub batch_id: Uuid,
    /// Newly committed trades
    pub committed: Vec<TradeId>,
    /// Trades the store had already recorded, finalized locally
    pub duplicates: Vec<TradeId>,
    /// Trades already committed by this bridge
    pub skipped: Vec<TradeId>,
    pub dead_lettered: Vec<TradeId>,
}

impl BatchResult {
    pub fn is_empty(&self) -> bool {
        self.committed.is_empty() && self.duplicates.is_empty() && self.skipped.is_empty() && self.dead_lettered.is_empty()
    }

    pub fn merge(&mut self, other: BatchResult) {
        self.committed.extend(other.committed);
        self.duplicates.extend(other.duplicates);
        self.skipped.extend(other.skipped);
        self.dead_lettered.extend(other.dead_lettered);
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ResolutionReport {
    pub market_id: MarketId,
    pub outcome: Price,
    pub payouts: Vec<(AccountId, Amount)>,
    pub realized: Vec<(AccountId, Decimal)>,
    /// Rounding dust left in escrow after every payout
    pub escrow_residual: Amount,
}

enum Settled {
    Committed,
    Duplicate,
    Skipped,
    DeadLettered,
}

#[derive(Default)]
struct LaneQueue {
    trades: VecDeque<Trade>,
    /// Queued or in progress
    pending: HashSet<TradeId>,
}

struct MarketLane {
    config: MarketConfig,
    escrow: AccountId,
    queue: Mutex<LaneQueue>,
}

pub struct SettlementBridge {
    config: BridgeConfig,
    ledger: Arc<Ledger>,
    store: Arc<dyn DurableStore>,
    positions: PositionBook,
    lanes: DashMap<MarketId, Arc<MarketLane>>,
    committed: DashSet<TradeId>,
    dead_letters: DashMap<TradeId, DeadLetter>,
    resolved: DashSet<MarketId>,
    /// Serializes flushes and resolutions
    flush_lock: AsyncMutex<()>,
}

impl SettlementBridge {
    pub fn new(config: BridgeConfig, ledger: Arc<Ledger>, store: Arc<dyn DurableStore>) -> Self {
        Self {
            config,
            ledger,
            store,
            positions: PositionBook::new(),
            lanes: DashMap::new(),
            committed: DashSet::new(),
            dead_letters: DashMap::new(),
            resolved: DashSet::new(),
            flush_lock: AsyncMutex::new(()),
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn positions(&self) -> &PositionBook {
        &self.positions
    }

    /// Open a settlement lane for `config`. Registering twice keeps the
    /// first configuration.
    pub fn register_market(&self, config: MarketConfig) {
        let market = config.market_id.clone();
        self.lanes.entry(market.clone()).or_insert_with(|| {
            info!(market = %market, "settlement lane registered");
            Arc::new(MarketLane {
                escrow: AccountId::escrow(&market),
                config,
                queue: Mutex::new(LaneQueue::default()),
            })
        });
    }

    /// Queue a trade. Returns false if the trade id is already queued,
    /// committed or dead-lettered.
    pub fn enqueue(&self, trade: Trade) -> Result<bool, SettlementError> {
        let lane = self.lane(&trade.market_id)?;
        let trade_id = trade.trade_id;
        if self.committed.contains(&trade_id) || self.dead_letters.contains_key(&trade_id) {
            debug!(trade_id = %trade_id, "trade already settled or parked, ignoring");
            return Ok(false);
        }

        let mut queue = lane.queue.lock();
        if !queue.pending.insert(trade_id) {
            debug!(trade_id = %trade_id, "trade already queued, ignoring");
            return Ok(false);
        }
        queue.trades.push_back(trade);
        Ok(true)
    }

    /// Trades queued or in progress for `market`
    pub fn pending(&self, market: &MarketId) -> usize {
        self.lanes
            .get(market)
            .map_or(0, |lane| lane.queue.lock().pending.len())
    }

    pub fn status(&self, trade_id: &TradeId) -> SettlementStatus {
        if self.dead_letters.contains_key(trade_id) {
            return SettlementStatus::DeadLettered;
        }
        if self.committed.contains(trade_id) {
            return SettlementStatus::Committed;
        }
        let queued = self
            .lanes
            .iter()
            .any(|lane| lane.value().queue.lock().pending.contains(trade_id));
        if queued {
            SettlementStatus::Pending
        } else {
            SettlementStatus::Unknown
        }
    }

    /// Dead letters, oldest first
    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        let mut letters: Vec<DeadLetter> = self.dead_letters.iter().map(|e| e.value().clone()).collect();
        letters.sort_by_key(|letter| (letter.dead_lettered_at, letter.trade.trade_id));
        letters
    }

    /// Put a dead-lettered trade back at the end of its market's lane.
    pub fn retry_dead_letter(&self, trade_id: &TradeId) -> Result<(), SettlementError> {
        let (_, letter) = self
            .dead_letters
            .remove(trade_id)
            .ok_or_else(|| SettlementError::NotDeadLettered {
                trade_id: trade_id.to_string(),
            })?;

        if self.committed.contains(trade_id) {
            info!(trade_id = %trade_id, "dead letter was durably committed, cleared");
            return Ok(());
        }

        let lane = match self.lane(&letter.trade.market_id) {
            Ok(lane) => lane,
            Err(err) => {
                self.dead_letters.insert(*trade_id, letter);
                return Err(err);
            }
        };
        let mut queue = lane.queue.lock();
        queue.pending.insert(*trade_id);
        queue.trades.push_back(letter.trade);
        info!(trade_id = %trade_id, "dead letter requeued");
        Ok(())
    }

    /// Seed the committed set from the durable store after a restart.
    pub async fn recover(&self) -> Result<usize, SettlementError> {
        let keys = self.store.committed_keys().await?;
        let mut trades = 0usize;
        for key in keys {
            match key {
                CommitKey::Trade(trade_id) => {
                    if self.committed.insert(trade_id) {
                        trades += 1;
                    }
                }
                CommitKey::Resolution(market) => {
                    self.resolved.insert(market);
                }
            }
        }
        info!(trades, resolved = self.resolved.len(), "settlement state recovered");
        Ok(trades)
    }

    /// Drain one batch from every lane and commit it.
    pub async fn flush(&self, now: i64) -> BatchResult {
        let _guard = self.flush_lock.lock().await;

        let lanes: Vec<Arc<MarketLane>> = self.lanes.iter().map(|e| Arc::clone(e.value())).collect();
        let results = join_all(lanes.iter().map(|lane| self.flush_lane(lane, now))).await;

        let mut batch = BatchResult {
            batch_id: Uuid::now_v7(),
            ..BatchResult::default()
        };
        for result in results {
            batch.merge(result);
        }

        if !batch.is_empty() {
            info!(
                batch_id = %batch.batch_id,
                committed = batch.committed.len(),
                duplicates = batch.duplicates.len(),
                skipped = batch.skipped.len(),
                dead_lettered = batch.dead_lettered.len(),
                "settlement batch committed"
            );
        }
        batch
    }

    /// Flush on `flush_interval_ms` until the task is aborted.
    pub fn spawn_flush_loop(self: &Arc<Self>) -> JoinHandle<()> {
        let bridge = Arc::clone(self);
        let period = Duration::from_millis(self.config.flush_interval_ms.max(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                bridge.flush(clock::now_nanos()).await;
            }
        })
    }

    pub fn is_resolved(&self, market: &MarketId) -> bool {
        self.resolved.contains(market)
    }

    /// Settle every open position of `market` at `outcome`.
    ///
    /// Requires every trade of the market to be committed. Longs receive
    /// `size × outcome`, shorts `size × (ceiling − outcome)`, out of escrow.
    pub async fn resolve_market(&self, market: &MarketId, outcome: Price, now: i64) -> Result<ResolutionReport, SettlementError> {
        let _guard = self.flush_lock.lock().await;
        let lane = self.lane(market)?;

        if self.resolved.contains(market) {
            return Err(SettlementError::AlreadyResolved {
                market: market.to_string(),
            });
        }
        if outcome > lane.config.price_ceiling {
            return Err(SettlementError::InvalidOutcome {
                market: market.to_string(),
                value: outcome.to_string(),
                ceiling: lane.config.price_ceiling.to_string(),
            });
        }

        let pending = lane.queue.lock().pending.len();
        let dead_lettered = self
            .dead_letters
            .iter()
            .filter(|e| &e.value().trade.market_id == market)
            .count();
        if pending > 0 || dead_lettered > 0 {
            return Err(SettlementError::UnsettledTrades {
                market: market.to_string(),
                pending,
                dead_lettered,
            });
        }

        let mut payouts = Vec::new();
        for position in self.positions.open_positions(market) {
            let amount = collateral::payout(position.side, position.size, outcome, &lane.config)?;
            payouts.push((position.account_id, amount));
        }

        let record = CommitRecord::Resolution(ResolutionCommit {
            market_id: market.clone(),
            outcome,
            payouts: payouts.clone(),
            resolved_at: now,
        });
        self.apply_with_retry(&record).await.map_err(|(err, _)| err)?;

        let asset = &lane.config.collateral_asset;
        for (account, amount) in &payouts {
            if !amount.is_zero() {
                self.ledger.transfer(&lane.escrow, account, asset, *amount)?;
            }
        }
        let realized = self.positions.close_market(market, outcome, now);
        self.resolved.insert(market.clone());

        let escrow_residual = self.ledger.balance(&lane.escrow, asset).reserved;
        info!(
            market = %market,
            outcome = %outcome,
            positions = payouts.len(),
            residual = %escrow_residual,
            "market resolved"
        );

        Ok(ResolutionReport {
            market_id: market.clone(),
            outcome,
            payouts,
            realized,
            escrow_residual,
        })
    }

    // ── per-lane settlement ─────────────────────────────────────────

    fn lane(&self, market: &MarketId) -> Result<Arc<MarketLane>, SettlementError> {
        self.lanes
            .get(market)
            .map(|lane| Arc::clone(lane.value()))
            .ok_or_else(|| SettlementError::UnknownMarket {
                market: market.to_string(),
            })
    }

    async fn flush_lane(&self, lane: &MarketLane, now: i64) -> BatchResult {
        let batch: Vec<Trade> = {
            let mut queue = lane.queue.lock();
            let take = queue.trades.len().min(self.config.batch_size.max(1));
            queue.trades.drain(..take).collect()
        };

        let mut result = BatchResult::default();
        for trade in batch {
            let trade_id = trade.trade_id;
            let settled = self.settle(lane, trade, now).await;
            lane.queue.lock().pending.remove(&trade_id);

            match settled {
                Settled::Committed => result.committed.push(trade_id),
                Settled::Duplicate => result.duplicates.push(trade_id),
                Settled::Skipped => result.skipped.push(trade_id),
                Settled::DeadLettered => result.dead_lettered.push(trade_id),
            }
        }
        result
    }

    async fn settle(&self, lane: &MarketLane, trade: Trade, now: i64) -> Settled {
        if self.committed.contains(&trade.trade_id) {
            debug!(trade_id = %trade.trade_id, "trade already committed, skipping");
            return Settled::Skipped;
        }

        let (buyer, seller) = match self.plan_leg(lane, &trade, Side::BUY).and_then(|buyer| {
            self.plan_leg(lane, &trade, Side::SELL).map(|seller| (buyer, seller))
        }) {
            Ok(legs) => legs,
            Err(err) => return self.dead_letter(trade, err.to_string(), 0, now),
        };

        if let Err(err) = self.begin_legs(lane, &[&buyer, &seller]) {
            return self.dead_letter(trade, err.to_string(), 0, now);
        }

        let record = CommitRecord::Trade(TradeCommit {
            trade: trade.clone(),
            buyer: buyer.clone(),
            seller: seller.clone(),
            committed_at: now,
        });

        match self.apply_with_retry(&record).await {
            Ok((applied, attempts)) => {
                if let Err(err) = self.finalize(lane, &trade, &[&buyer, &seller], now) {
                    // The deltas are durable; only an operator can reconcile.
                    self.committed.insert(trade.trade_id);
                    return self.dead_letter(trade, format!("ledger fault after durable commit: {}", err), attempts, now);
                }
                self.committed.insert(trade.trade_id);
                debug!(
                    market = %lane.config.market_id,
                    trade_id = %trade.trade_id,
                    sequence = trade.sequence,
                    attempts,
                    "trade settled"
                );
                match applied {
                    Applied::Applied => Settled::Committed,
                    Applied::Duplicate => {
                        info!(trade_id = %trade.trade_id, "store already held trade, finalized locally");
                        Settled::Duplicate
                    }
                }
            }
            Err((err, attempts)) => {
                self.abort_legs(lane, &[&buyer, &seller]);
                self.dead_letter(trade, err.to_string(), attempts, now)
            }
        }
    }

    fn plan_leg(&self, lane: &MarketLane, trade: &Trade, side: Side) -> Result<LegDelta, SettlementError> {
        let account_id = trade.account(side);
        let slice = trade.collateral(side);
        let (closed, closed_side) = self
            .positions
            .preview(&lane.config.market_id, &account_id, side, trade.quantity);
        let opened = trade.quantity.saturating_sub(closed);

        let cost = if opened.is_zero() {
            Amount::ZERO
        } else {
            collateral::opening_cost(side, opened, trade.price, &lane.config)?
        };
        let payout = match closed_side {
            Some(position_side) => collateral::payout(position_side, closed, trade.price, &lane.config)?,
            None => Amount::ZERO,
        };
        let released = slice
            .checked_sub(cost)
            .ok_or_else(|| LedgerError::InvariantViolation {
                account: account_id.to_string(),
                asset: lane.config.collateral_asset.clone(),
                detail: format!("opening cost {} exceeds reserved slice {}", cost, slice),
            })?;

        Ok(LegDelta {
            account_id,
            side,
            closed,
            opened,
            cost,
            payout,
            released,
        })
    }

    fn begin_legs(&self, lane: &MarketLane, legs: &[&LegDelta]) -> Result<(), LedgerError> {
        let asset = &lane.config.collateral_asset;
        for (index, leg) in legs.iter().enumerate() {
            if leg.cost.is_zero() {
                continue;
            }
            if let Err(err) = self.ledger.begin_transfer(&leg.account_id, asset, leg.cost) {
                self.abort_legs(lane, &legs[..index]);
                return Err(err);
            }
        }
        Ok(())
    }

    fn abort_legs(&self, lane: &MarketLane, legs: &[&LegDelta]) {
        let asset = &lane.config.collateral_asset;
        for leg in legs {
            if leg.cost.is_zero() {
                continue;
            }
            if let Err(err) = self.ledger.abort_transfer(&leg.account_id, asset, leg.cost) {
                error!(account = %leg.account_id, amount = %leg.cost, error = %err, "failed to abort in-flight transfer");
            }
        }
    }

    fn finalize(&self, lane: &MarketLane, trade: &Trade, legs: &[&LegDelta], now: i64) -> Result<(), LedgerError> {
        let asset = &lane.config.collateral_asset;
        for leg in legs {
            if !leg.cost.is_zero() {
                self.ledger.commit_transfer(&leg.account_id, &lane.escrow, asset, leg.cost)?;
                self.ledger.reserve(&lane.escrow, asset, leg.cost)?;
            }
        }
        for leg in legs {
            if !leg.payout.is_zero() {
                self.ledger.transfer(&lane.escrow, &leg.account_id, asset, leg.payout)?;
            }
            if !leg.released.is_zero() {
                self.ledger.release(&leg.account_id, asset, leg.released)?;
            }
            self.positions.apply_fill(
                &lane.config.market_id,
                &leg.account_id,
                leg.side,
                trade.quantity,
                trade.price,
                now,
            );
        }
        Ok(())
    }

    /// Apply with bounded exponential backoff. Returns the attempt count
    /// alongside the outcome.
    async fn apply_with_retry(&self, record: &CommitRecord) -> Result<(Applied, u32), (StoreError, u32)> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.store.apply(record).await {
                Ok(applied) => return Ok((applied, attempt)),
                Err(err) if err.is_transient() && attempt <= self.config.max_retries => {
                    let delay = self.config.backoff(attempt - 1);
                    warn!(
                        key = ?record.key(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "store apply failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err((err, attempt)),
            }
        }
    }

    fn dead_letter(&self, trade: Trade, reason: String, attempts: u32, now: i64) -> Settled {
        error!(
            market = %trade.market_id,
            trade_id = %trade.trade_id,
            sequence = trade.sequence,
            attempts,
            reason = %reason,
            "trade dead-lettered"
        );
        self.dead_letters.insert(
            trade.trade_id,
            DeadLetter {
                trade,
                reason,
                attempts,
                dead_lettered_at: now,
            },
        );
        Settled::DeadLettered
    }
}
