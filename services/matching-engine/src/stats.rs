//! Running market statistics and the market data snapshot

use serde::Serialize;
use types::ids::MarketId;
use types::market::MarketStatus;
use types::numeric::{Price, Quantity};
use types::trade::Trade;

/// Counters updated on every trade
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MarketStats {
    pub last_price: Option<Price>,
    pub last_quantity: Option<Quantity>,
    /// Cumulative traded quantity
    pub volume: Quantity,
    pub high: Option<Price>,
    pub low: Option<Price>,
    pub trade_count: u64,
}

impl MarketStats {
    pub fn record_trade(&mut self, trade: &Trade) {
        self.last_price = Some(trade.price);
        self.last_quantity = Some(trade.quantity);
        self.volume = self.volume + trade.quantity;
        self.high = Some(self.high.map_or(trade.price, |high| high.max(trade.price)));
        self.low = Some(self.low.map_or(trade.price, |low| low.min(trade.price)));
        self.trade_count += 1;
    }
}

/// Market data feed snapshot
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketData {
    pub market_id: MarketId,
    pub status: MarketStatus,
    /// Best bid price and visible size
    pub best_bid: Option<(Price, Quantity)>,
    /// Best ask price and visible size
    pub best_ask: Option<(Price, Quantity)>,
    pub stats: MarketStats,
    pub bids: Vec<(Price, Quantity)>,
    pub asks: Vec<(Price, Quantity)>,
    pub resting_orders: usize,
    pub parked_stops: usize,
}
