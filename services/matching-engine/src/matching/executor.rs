//! Trade execution
//!
//! Turns a single fill between an incoming (taker) and resting (maker)
//! order into a [`Trade`] with a per-market sequence number.

use types::ids::MarketId;
use types::numeric::{Amount, Price, Quantity};
use types::order::{Order, Side};
use types::trade::Trade;

/// Fill of one incoming order against one resting order
#[derive(Debug, Clone, Copy)]
pub struct Fill {
    /// Execution price (the maker's price)
    pub price: Price,
    pub quantity: Quantity,
    /// Reservation slice the taker consumed
    pub taker_collateral: Amount,
    /// Reservation slice the maker consumed
    pub maker_collateral: Amount,
}

/// Match executor for trade generation
#[derive(Debug, Clone)]
pub struct MatchExecutor {
    market_id: MarketId,
    sequence_counter: u64,
}

impl MatchExecutor {
    /// Create a new match executor with starting sequence number
    pub fn new(market_id: MarketId, starting_sequence: u64) -> Self {
        Self {
            market_id,
            sequence_counter: starting_sequence,
        }
    }

    /// Get next sequence number (monotonically increasing)
    fn next_sequence(&mut self) -> u64 {
        let seq = self.sequence_counter;
        self.sequence_counter += 1;
        seq
    }

    /// Sequence number the next trade will carry
    pub fn peek_sequence(&self) -> u64 {
        self.sequence_counter
    }

    /// Build the trade for a fill between `taker` and `maker`.
    pub fn execute_trade(&mut self, taker: &Order, maker: &Order, fill: Fill, timestamp: i64) -> Trade {
        debug_assert_ne!(taker.account_id, maker.account_id, "self-trade reached the executor");
        debug_assert_ne!(taker.side, maker.side);

        let (buy, sell, buyer_collateral, seller_collateral) = match taker.side {
            Side::BUY => (taker, maker, fill.taker_collateral, fill.maker_collateral),
            Side::SELL => (maker, taker, fill.maker_collateral, fill.taker_collateral),
        };

        Trade::new(
            self.next_sequence(),
            self.market_id.clone(),
            buy.order_id,
            sell.order_id,
            buy.account_id,
            sell.account_id,
            taker.side,
            fill.price,
            fill.quantity,
            buyer_collateral,
            seller_collateral,
            timestamp,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use types::ids::AccountId;

    fn order(side: Side, price: &str) -> Order {
        Order::limit(
            AccountId::new(),
            MarketId::new("ETH-GAS-2026Q4"),
            side,
            Price::from_str(price).unwrap(),
            Quantity::from_u64(1),
            1708123456789000000,
        )
    }

    #[test]
    fn test_execute_trade_assigns_sides() {
        let mut executor = MatchExecutor::new(MarketId::new("ETH-GAS-2026Q4"), 1000);
        let taker = order(Side::SELL, "0.40");
        let maker = order(Side::BUY, "0.45");
        let fill = Fill {
            price: maker.price.unwrap(),
            quantity: Quantity::from_u64(1),
            taker_collateral: Amount::new(600_000),
            maker_collateral: Amount::new(450_000),
        };

        let trade = executor.execute_trade(&taker, &maker, fill, 1708123456790000000);

        assert_eq!(trade.sequence, 1000);
        assert_eq!(trade.buy_order_id, maker.order_id);
        assert_eq!(trade.seller, taker.account_id);
        assert_eq!(trade.buyer_collateral, Amount::new(450_000));
        assert_eq!(trade.seller_collateral, Amount::new(600_000));
        assert_eq!(trade.taker_side, Side::SELL);
    }

    #[test]
    fn test_sequence_monotonic() {
        let mut executor = MatchExecutor::new(MarketId::new("ETH-GAS-2026Q4"), 1);
        let taker = order(Side::BUY, "0.50");
        let maker = order(Side::SELL, "0.50");
        let fill = Fill {
            price: maker.price.unwrap(),
            quantity: Quantity::from_u64(1),
            taker_collateral: Amount::ZERO,
            maker_collateral: Amount::ZERO,
        };

        let t1 = executor.execute_trade(&taker, &maker, fill, 1);
        let t2 = executor.execute_trade(&taker, &maker, fill, 2);
        assert_eq!(t2.sequence, t1.sequence + 1);
        assert_eq!(executor.peek_sequence(), 3);
    }
}
