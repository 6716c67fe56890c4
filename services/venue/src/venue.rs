//! Venue orchestration
//!
//! Wires admission, one matching task per market, the shared ledger and
//! the settlement bridge together. Trades leave a market task through a
//! [`TradeSink`] that enqueues them on the bridge before the submitter
//! sees its reply, so no executed trade can be lost between the stages.

use std::sync::Arc;

use dashmap::DashMap;
use ledger::Ledger;
use matching_engine::{spawn_market, MarketData, MarketEngine, MarketHandle, SubmitOutcome, TradeSink};
use parking_lot::Mutex;
use settlement::{BatchResult, DurableStore, JournalStore, MemoryStore, ResolutionReport, SettlementBridge, SettlementStatus};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use types::account::Balance;
use types::clock;
use types::errors::ValidationError;
use types::ids::{AccountId, MarketId, OrderId, TradeId};
use types::market::MarketConfig;
use types::numeric::{Amount, Price};
use types::order::Order;
use types::position::Position;
use types::trade::Trade;

use crate::admission::{Admission, Authenticator, OrderRequest};
use crate::config::VenueConfig;
use crate::error::VenueError;

struct BridgeSink(Arc<SettlementBridge>);

impl TradeSink for BridgeSink {
    fn publish(&self, trades: &[Trade]) {
        for trade in trades {
            if let Err(err) = self.0.enqueue(trade.clone()) {
                error!(
                    market = %trade.market_id,
                    trade_id = %trade.trade_id,
                    error = %err,
                    "trade could not be queued for settlement"
                );
            }
        }
    }
}

struct MarketSlot {
    handle: MarketHandle,
    task: Mutex<Option<JoinHandle<MarketEngine>>>,
}

pub struct Venue {
    config: VenueConfig,
    ledger: Arc<Ledger>,
    bridge: Arc<SettlementBridge>,
    sink: Arc<dyn TradeSink>,
    admission: Admission,
    markets: DashMap<MarketId, Arc<MarketSlot>>,
}

impl Venue {
    /// Build the venue: open the settlement store, recover committed
    /// state, then start every configured market.
    pub async fn open(config: VenueConfig, authenticator: Arc<dyn Authenticator>) -> Result<Self, VenueError> {
        let store: Arc<dyn DurableStore> = match &config.journal {
            Some(journal) => Arc::new(JournalStore::open(journal.journal_config())?),
            None => Arc::new(MemoryStore::new()),
        };
        let ledger = Arc::new(Ledger::new());
        let bridge = Arc::new(SettlementBridge::new(config.settlement.clone(), Arc::clone(&ledger), store));
        bridge.recover().await?;

        let venue = Self {
            sink: Arc::new(BridgeSink(Arc::clone(&bridge))),
            admission: Admission::new(authenticator),
            markets: DashMap::new(),
            ledger,
            bridge,
            config,
        };
        for market in venue.config.markets.clone() {
            venue.register_market(market)?;
        }
        info!(markets = venue.markets.len(), "venue open");
        Ok(venue)
    }

    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    pub fn bridge(&self) -> &Arc<SettlementBridge> {
        &self.bridge
    }

    pub fn markets(&self) -> Vec<MarketId> {
        let mut markets: Vec<MarketId> = self.markets.iter().map(|e| e.key().clone()).collect();
        markets.sort();
        markets
    }

    /// Start a market task and its settlement lane. Must be called from
    /// within a tokio runtime.
    pub fn register_market(&self, config: MarketConfig) -> Result<(), VenueError> {
        let market = config.market_id.clone();
        if self.markets.contains_key(&market) {
            return Err(ValidationError::DuplicateMarket {
                market: market.to_string(),
            }
            .into());
        }

        let engine = MarketEngine::new(config.clone(), Arc::clone(&self.ledger))?;
        self.bridge.register_market(config);
        let (handle, task) = spawn_market(engine, Arc::clone(&self.sink), self.config.market_channel_capacity);
        self.markets.insert(
            market.clone(),
            Arc::new(MarketSlot {
                handle,
                task: Mutex::new(Some(task)),
            }),
        );
        info!(market = %market, "market registered");
        Ok(())
    }

    pub fn deposit(&self, account: &AccountId, asset: &str, amount: Amount) -> Result<(), VenueError> {
        self.ledger.deposit(account, asset, amount)?;
        info!(account = %account, asset, amount = %amount, "deposit");
        Ok(())
    }

    pub fn withdraw(&self, account: &AccountId, asset: &str, amount: Amount) -> Result<(), VenueError> {
        self.ledger.withdraw(account, asset, amount)?;
        info!(account = %account, asset, amount = %amount, "withdrawal");
        Ok(())
    }

    pub fn balance(&self, account: &AccountId, asset: &str) -> Balance {
        self.ledger.balance(account, asset)
    }

    pub fn position(&self, market: &MarketId, account: &AccountId) -> Option<Position> {
        self.bridge.positions().position(market, account)
    }

    pub async fn submit(&self, request: OrderRequest) -> Result<SubmitOutcome, VenueError> {
        self.submit_at(request, clock::now_nanos()).await
    }

    /// Admit and match `request` as of `now`.
    pub async fn submit_at(&self, request: OrderRequest, now: i64) -> Result<SubmitOutcome, VenueError> {
        let handle = self.handle(&request.market_id)?;
        let order = self.admission.admit(request, now)?;
        Ok(handle.submit(order, now).await?)
    }

    pub async fn cancel(&self, market: &MarketId, order_id: OrderId, account: AccountId) -> Result<Order, VenueError> {
        let handle = self.handle(market)?;
        Ok(handle.cancel(order_id, account, clock::now_nanos()).await?)
    }

    pub async fn order(&self, market: &MarketId, order_id: OrderId) -> Result<Option<Order>, VenueError> {
        Ok(self.handle(market)?.order(order_id).await?)
    }

    /// Expire GTD orders past their deadline in every market.
    pub async fn expire(&self, now: i64) -> Result<Vec<Order>, VenueError> {
        let mut expired = Vec::new();
        for handle in self.handles() {
            expired.extend(handle.expire(now).await?);
        }
        Ok(expired)
    }

    pub async fn market_data(&self, market: &MarketId, depth: usize) -> Result<MarketData, VenueError> {
        Ok(self.handle(market)?.snapshot(depth).await?)
    }

    pub async fn flush(&self) -> BatchResult {
        self.bridge.flush(clock::now_nanos()).await
    }

    pub fn settlement_status(&self, trade_id: &TradeId) -> SettlementStatus {
        self.bridge.status(trade_id)
    }

    /// Stop accepting orders in `market`, cancelling everything resting.
    pub async fn close_market(&self, market: &MarketId) -> Result<Vec<Order>, VenueError> {
        Ok(self.handle(market)?.close(clock::now_nanos()).await?)
    }

    /// Apply the final outcome: close the market, settle what is queued,
    /// then pay every position out of escrow.
    pub async fn resolve_market(&self, market: &MarketId, outcome: Price) -> Result<ResolutionReport, VenueError> {
        let handle = self.handle(market)?;
        let now = clock::now_nanos();
        handle.close(now).await?;

        while self.bridge.pending(market) > 0 {
            let result = self.bridge.flush(clock::now_nanos()).await;
            if result.is_empty() {
                break;
            }
        }

        let report = self.bridge.resolve_market(market, outcome, now).await?;
        handle.mark_resolved().await?;
        Ok(report)
    }

    /// Flush settlement in the background on the configured interval.
    pub fn spawn_settlement_loop(&self) -> JoinHandle<()> {
        self.bridge.spawn_flush_loop()
    }

    /// Stop every market task and settle what they produced.
    pub async fn shutdown(self) -> BatchResult {
        let slots: Vec<Arc<MarketSlot>> = self.markets.iter().map(|e| Arc::clone(e.value())).collect();
        self.markets.clear();

        let mut tasks = Vec::with_capacity(slots.len());
        for slot in slots {
            if let Some(task) = slot.task.lock().take() {
                tasks.push(task);
            }
        }
        // Each task ends once the last handle, held by its slot, is dropped.
        for task in tasks {
            if let Err(err) = task.await {
                warn!(error = %err, "market task ended abnormally");
            }
        }

        let mut total = BatchResult::default();
        loop {
            let result = self.bridge.flush(clock::now_nanos()).await;
            let drained = result.is_empty();
            total.merge(result);
            if drained {
                break;
            }
        }
        info!(committed = total.committed.len(), "venue shut down");
        total
    }

    fn handle(&self, market: &MarketId) -> Result<MarketHandle, VenueError> {
        self.markets
            .get(market)
            .map(|slot| slot.handle.clone())
            .ok_or_else(|| {
                ValidationError::UnknownMarket {
                    market: market.to_string(),
                }
                .into()
            })
    }

    fn handles(&self) -> Vec<MarketHandle> {
        let mut handles: Vec<MarketHandle> = self.markets.iter().map(|e| e.value().handle.clone()).collect();
        handles.sort_by(|a, b| a.market_id().cmp(b.market_id()));
        handles
    }
}
