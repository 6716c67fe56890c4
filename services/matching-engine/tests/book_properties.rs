//! Property tests: the book is never left crossed, sweeps walk prices in
//! priority order and the ledger stays balanced.

use std::sync::Arc;

use ledger::Ledger;
use matching_engine::MarketEngine;
use proptest::prelude::*;
use rust_decimal::Decimal;
use types::ids::{AccountId, MarketId};
use types::market::MarketConfig;
use types::numeric::{Amount, Price, Quantity};
use types::order::{Order, Side, TimeInForce};

const T0: i64 = 1708123456789000000;

#[derive(Debug, Clone)]
struct Submission {
    trader: usize,
    side: Side,
    ticks: u32,
    quantity: u64,
    ioc: bool,
}

fn submission() -> impl Strategy<Value = Submission> {
    (0usize..4, any::<bool>(), 40u32..60, 1u64..20, any::<bool>()).prop_map(|(trader, buy, ticks, quantity, ioc)| {
        Submission {
            trader,
            side: if buy { Side::BUY } else { Side::SELL },
            ticks,
            quantity,
            ioc,
        }
    })
}

fn setup() -> (MarketEngine, Arc<Ledger>, Vec<AccountId>) {
    let ledger = Arc::new(Ledger::new());
    let config = MarketConfig::new(MarketId::new("ETH-GAS-2026Q4"), Decimal::new(1, 2), Decimal::ONE, 6, "USDC");
    let engine = MarketEngine::new(config, Arc::clone(&ledger)).unwrap();
    let traders: Vec<AccountId> = (0..4).map(|_| AccountId::new()).collect();
    for trader in &traders {
        ledger.deposit(trader, "USDC", Amount::new(10_000_000_000)).unwrap();
    }
    (engine, ledger, traders)
}

proptest! {
    #[test]
    fn book_never_crossed(submissions in prop::collection::vec(submission(), 1..80)) {
        let (mut engine, ledger, traders) = setup();
        let deposited = ledger.net_supply("USDC");

        for (i, s) in submissions.iter().enumerate() {
            let price = Price::new(Decimal::new(s.ticks as i64, 2));
            let mut order = Order::limit(
                traders[s.trader],
                MarketId::new("ETH-GAS-2026Q4"),
                s.side,
                price,
                Quantity::from_u64(s.quantity),
                T0 + i as i64,
            );
            if s.ioc {
                order = order.with_time_in_force(TimeInForce::IOC);
            }
            let outcome = engine.submit(order, T0 + i as i64).unwrap();

            prop_assert!(!engine.book().is_crossed());
            prop_assert!(outcome.order.check_invariant());

            // A sweep never takes a worse price before a better one.
            for pair in outcome.trades.windows(2) {
                match s.side {
                    Side::BUY => prop_assert!(pair[0].price <= pair[1].price),
                    Side::SELL => prop_assert!(pair[0].price >= pair[1].price),
                }
            }
            for trade in &outcome.trades {
                match s.side {
                    Side::BUY => prop_assert!(trade.price <= price),
                    Side::SELL => prop_assert!(trade.price >= price),
                }
            }
        }

        prop_assert!(ledger.verify_invariants().is_empty());
        prop_assert_eq!(ledger.net_supply("USDC"), deposited);
    }

    #[test]
    fn equal_price_fills_in_arrival_order(count in 2usize..6, take in 1u64..10) {
        let (mut engine, ledger, traders) = setup();
        let price = Price::new(Decimal::new(50, 2));

        let mut resting = Vec::new();
        for i in 0..count {
            let order = Order::limit(
                traders[i % 3],
                MarketId::new("ETH-GAS-2026Q4"),
                Side::SELL,
                price,
                Quantity::from_u64(2),
                T0 + i as i64,
            );
            resting.push(engine.submit(order, T0 + i as i64).unwrap().order.order_id);
        }

        let taker = Order::limit(
            traders[3],
            MarketId::new("ETH-GAS-2026Q4"),
            Side::BUY,
            price,
            Quantity::from_u64(take),
            T0 + 100,
        );
        let outcome = engine.submit(taker, T0 + 100).unwrap();

        let makers: Vec<_> = outcome.trades.iter().map(|t| t.sell_order_id).collect();
        prop_assert_eq!(&makers[..], &resting[..makers.len()]);
        prop_assert!(ledger.verify_invariants().is_empty());
    }
}
