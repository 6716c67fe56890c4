//! Per-market actor
//!
//! Each market runs as one tokio task owning its [`MarketEngine`]. Commands
//! arrive over a bounded channel and are processed strictly one at a time,
//! so matching needs no internal locking. Different markets run in parallel.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};
use types::errors::EngineError;
use types::ids::{AccountId, MarketId, OrderId};
use types::order::Order;
use types::trade::Trade;

use crate::engine::{MarketEngine, SubmitOutcome};
use crate::stats::MarketData;

/// Downstream consumer of executed trades.
///
/// `publish` is called on the market task before the submitter gets its
/// reply, in execution order, so implementations must not block.
pub trait TradeSink: Send + Sync + 'static {
    fn publish(&self, trades: &[Trade]);
}

/// Command processed by a market task
pub enum MarketCommand {
    Submit {
        order: Order,
        now: i64,
        reply: oneshot::Sender<Result<SubmitOutcome, EngineError>>,
    },
    Cancel {
        order_id: OrderId,
        account: AccountId,
        now: i64,
        reply: oneshot::Sender<Result<Order, EngineError>>,
    },
    Expire {
        now: i64,
        reply: oneshot::Sender<Result<Vec<Order>, EngineError>>,
    },
    Snapshot {
        depth: usize,
        reply: oneshot::Sender<MarketData>,
    },
    Order {
        order_id: OrderId,
        reply: oneshot::Sender<Option<Order>>,
    },
    Close {
        now: i64,
        reply: oneshot::Sender<Result<Vec<Order>, EngineError>>,
    },
    MarkResolved {
        reply: oneshot::Sender<()>,
    },
}

/// Cloneable client side of a market task
#[derive(Debug, Clone)]
pub struct MarketHandle {
    market_id: MarketId,
    tx: mpsc::Sender<MarketCommand>,
}

impl MarketHandle {
    pub fn market_id(&self) -> &MarketId {
        &self.market_id
    }

    pub async fn submit(&self, order: Order, now: i64) -> Result<SubmitOutcome, EngineError> {
        self.request(|reply| MarketCommand::Submit { order, now, reply }).await?
    }

    pub async fn cancel(&self, order_id: OrderId, account: AccountId, now: i64) -> Result<Order, EngineError> {
        self.request(|reply| MarketCommand::Cancel {
            order_id,
            account,
            now,
            reply,
        })
        .await?
    }

    pub async fn expire(&self, now: i64) -> Result<Vec<Order>, EngineError> {
        self.request(|reply| MarketCommand::Expire { now, reply }).await?
    }

    pub async fn snapshot(&self, depth: usize) -> Result<MarketData, EngineError> {
        self.request(|reply| MarketCommand::Snapshot { depth, reply }).await
    }

    pub async fn order(&self, order_id: OrderId) -> Result<Option<Order>, EngineError> {
        self.request(|reply| MarketCommand::Order { order_id, reply }).await
    }

    pub async fn close(&self, now: i64) -> Result<Vec<Order>, EngineError> {
        self.request(|reply| MarketCommand::Close { now, reply }).await?
    }

    pub async fn mark_resolved(&self) -> Result<(), EngineError> {
        self.request(|reply| MarketCommand::MarkResolved { reply }).await
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> MarketCommand,
    ) -> Result<T, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(make(reply)).await.map_err(|_| self.unavailable())?;
        rx.await.map_err(|_| self.unavailable())
    }

    fn unavailable(&self) -> EngineError {
        EngineError::Unavailable {
            market: self.market_id.to_string(),
        }
    }
}

/// Spawn the task for `engine`. The task ends, handing the engine back,
/// once every handle is dropped.
pub fn spawn_market(
    engine: MarketEngine,
    sink: Arc<dyn TradeSink>,
    capacity: usize,
) -> (MarketHandle, JoinHandle<MarketEngine>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let handle = MarketHandle {
        market_id: engine.market_id().clone(),
        tx,
    };
    let task = tokio::spawn(run(engine, sink, rx));
    (handle, task)
}

async fn run(
    mut engine: MarketEngine,
    sink: Arc<dyn TradeSink>,
    mut rx: mpsc::Receiver<MarketCommand>,
) -> MarketEngine {
    info!(market = %engine.market_id(), "market task started");

    while let Some(command) = rx.recv().await {
        match command {
            MarketCommand::Submit { order, now, reply } => {
                let result = engine.submit(order, now);
                // Fills made before a failed sweep still settle.
                let executed = engine.take_executed();
                if !executed.is_empty() {
                    sink.publish(&executed);
                }
                let _ = reply.send(result);
            }
            MarketCommand::Cancel {
                order_id,
                account,
                now,
                reply,
            } => {
                let _ = reply.send(engine.cancel(&order_id, &account, now));
            }
            MarketCommand::Expire { now, reply } => {
                let _ = reply.send(engine.expire(now));
            }
            MarketCommand::Snapshot { depth, reply } => {
                let _ = reply.send(engine.market_data(depth));
            }
            MarketCommand::Order { order_id, reply } => {
                let _ = reply.send(engine.order(&order_id).cloned());
            }
            MarketCommand::Close { now, reply } => {
                let _ = reply.send(engine.close(now));
            }
            MarketCommand::MarkResolved { reply } => {
                engine.mark_resolved();
                let _ = reply.send(());
            }
        }
    }

    debug!(market = %engine.market_id(), "market task stopped");
    engine
}
