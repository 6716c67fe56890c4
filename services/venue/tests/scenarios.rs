//! End-to-end scenarios through admission, matching, ledger and settlement.

use std::str::FromStr;
use std::sync::Arc;

use rust_decimal::Decimal;
use settlement::SettlementStatus;
use tempfile::TempDir;
use types::clock;
use types::errors::{EngineError, SettlementError, ValidationError};
use types::ids::{AccountId, MarketId};
use types::market::MarketConfig;
use types::numeric::{Amount, Price, Quantity};
use types::order::{CancelReason, OrderStatus, Side, TimeInForce};
use types::position::PositionSide;
use venue::{AcceptAll, AdmissionError, OrderRequest, Venue, VenueConfig, VenueError};

const USDC: &str = "USDC";

fn gas() -> MarketId {
    MarketId::new("ETH-GAS-2026Q4")
}

fn market_config(id: MarketId) -> MarketConfig {
    MarketConfig::new(id, Decimal::from_str("0.01").unwrap(), Decimal::ONE, 6, USDC)
}

fn price(s: &str) -> Price {
    Price::from_str(s).unwrap()
}

fn qty(n: u64) -> Quantity {
    Quantity::from_u64(n)
}

async fn open_venue() -> Venue {
    let config = VenueConfig::default().with_market(market_config(gas()));
    Venue::open(config, Arc::new(AcceptAll)).await.unwrap()
}

fn funded(venue: &Venue, units: u128) -> AccountId {
    let account = AccountId::new();
    venue.deposit(&account, USDC, Amount::new(units)).unwrap();
    account
}

fn limit(account: AccountId, side: Side, p: &str, q: u64, seq: u64) -> OrderRequest {
    OrderRequest::limit(account, gas(), side, price(p), qty(q), seq)
}

#[tokio::test]
async fn test_round_trip_fills_both_and_settles() {
    let venue = open_venue().await;
    let alice = funded(&venue, 10_000_000);
    let bob = funded(&venue, 10_000_000);

    let sell = venue.submit(limit(bob, Side::SELL, "0.40", 5, 1)).await.unwrap();
    assert_eq!(sell.order.status, OrderStatus::Open);
    assert_eq!(venue.balance(&bob, USDC).reserved, Amount::new(3_000_000));

    let buy = venue.submit(limit(alice, Side::BUY, "0.40", 5, 1)).await.unwrap();
    assert_eq!(buy.trades.len(), 1);
    let trade = &buy.trades[0];
    assert_eq!(trade.price, price("0.40"));
    assert_eq!(trade.quantity, qty(5));
    assert_eq!(buy.order.status, OrderStatus::Filled);
    assert_eq!(buy.order.remaining_reservation(), Amount::ZERO);

    let resting = venue.order(&gas(), sell.order.order_id).await.unwrap().unwrap();
    assert_eq!(resting.status, OrderStatus::Filled);
    assert_eq!(resting.remaining_reservation(), Amount::ZERO);

    // Slices stay reserved until the trade is durably committed.
    assert_eq!(venue.settlement_status(&trade.trade_id), SettlementStatus::Pending);
    assert_eq!(venue.balance(&alice, USDC).reserved, Amount::new(2_000_000));

    let batch = venue.flush().await;
    assert_eq!(batch.committed, vec![trade.trade_id]);
    assert_eq!(venue.settlement_status(&trade.trade_id), SettlementStatus::Committed);

    let a = venue.balance(&alice, USDC);
    let b = venue.balance(&bob, USDC);
    assert_eq!((a.available, a.reserved), (Amount::new(8_000_000), Amount::ZERO));
    assert_eq!((b.available, b.reserved), (Amount::new(7_000_000), Amount::ZERO));
    assert_eq!(venue.position(&gas(), &alice).unwrap().side, PositionSide::LONG);
    assert_eq!(venue.position(&gas(), &bob).unwrap().size, qty(5));
    assert!(venue.ledger().verify_invariants().is_empty());
}

#[tokio::test]
async fn test_reservation_rescaled_to_asset_decimals() {
    let venue = open_venue().await;
    let alice = funded(&venue, 5_000_000);

    venue.submit(limit(alice, Side::BUY, "0.01", 100, 1)).await.unwrap();

    let balance = venue.balance(&alice, USDC);
    assert_eq!(balance.reserved, Amount::new(1_000_000));
    assert_eq!(balance.available, Amount::new(4_000_000));
}

#[tokio::test]
async fn test_partial_fill_keeps_time_priority() {
    let venue = open_venue().await;
    let bob = funded(&venue, 100_000_000);
    let carol = funded(&venue, 100_000_000);
    let alice = funded(&venue, 100_000_000);
    let dave = funded(&venue, 100_000_000);

    let first = venue.submit(limit(bob, Side::SELL, "0.50", 10, 1)).await.unwrap();
    let second = venue.submit(limit(carol, Side::SELL, "0.50", 10, 1)).await.unwrap();

    let hit = venue.submit(limit(alice, Side::BUY, "0.50", 4, 1)).await.unwrap();
    assert_eq!(hit.trades.len(), 1);
    assert_eq!(hit.trades[0].sell_order_id, first.order.order_id);

    let resting = venue.order(&gas(), first.order.order_id).await.unwrap().unwrap();
    assert_eq!(resting.status, OrderStatus::PartiallyFilled);
    assert_eq!(resting.filled_quantity, qty(4));

    let sweep = venue.submit(limit(dave, Side::BUY, "0.50", 8, 1)).await.unwrap();
    let fills: Vec<_> = sweep.trades.iter().map(|t| (t.sell_order_id, t.quantity)).collect();
    assert_eq!(fills, vec![(first.order.order_id, qty(6)), (second.order.order_id, qty(2))]);
}

#[tokio::test]
async fn test_post_only_crossing_rejected_without_reservation() {
    let venue = open_venue().await;
    let bob = funded(&venue, 10_000_000);
    let alice = funded(&venue, 10_000_000);
    venue.submit(limit(bob, Side::SELL, "0.50", 5, 1)).await.unwrap();

    let err = venue
        .submit(limit(alice, Side::BUY, "0.55", 5, 1).with_post_only())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        VenueError::Engine(EngineError::Validation(ValidationError::PostOnlyWouldCross { .. }))
    ));
    assert_eq!(venue.balance(&alice, USDC).reserved, Amount::ZERO);

    let data = venue.market_data(&gas(), 5).await.unwrap();
    assert_eq!(data.stats.trade_count, 0);
    assert_eq!(data.best_ask, Some((price("0.50"), qty(5))));
    assert_eq!(data.best_bid, None);
}

#[tokio::test]
async fn test_insufficient_funds_leaves_book_untouched() {
    let venue = open_venue().await;
    let alice = funded(&venue, 1_000_000);

    let err = venue.submit(limit(alice, Side::BUY, "0.40", 5, 1)).await.unwrap_err();
    assert!(matches!(&err, VenueError::Engine(e) if e.is_insufficient_funds()));
    assert_eq!(venue.balance(&alice, USDC).available, Amount::new(1_000_000));
    assert_eq!(venue.market_data(&gas(), 5).await.unwrap().resting_orders, 0);
}

#[tokio::test]
async fn test_stale_sequence_and_unknown_market_rejected() {
    let venue = open_venue().await;
    let alice = funded(&venue, 10_000_000);

    venue.submit(limit(alice, Side::BUY, "0.40", 1, 5)).await.unwrap();
    let err = venue.submit(limit(alice, Side::BUY, "0.40", 1, 5)).await.unwrap_err();
    assert!(matches!(err, VenueError::Admission(AdmissionError::StaleSequence { last: 5, got: 5, .. })));

    let elsewhere = OrderRequest::limit(alice, MarketId::new("TVL-AAVE"), Side::BUY, price("0.40"), qty(1), 6);
    let err = venue.submit(elsewhere).await.unwrap_err();
    assert!(matches!(err, VenueError::Validation(ValidationError::UnknownMarket { .. })));

    // The unknown-market request did not consume sequence 6.
    assert!(venue.submit(limit(alice, Side::BUY, "0.40", 1, 6)).await.is_ok());
}

#[tokio::test]
async fn test_cancel_releases_and_second_cancel_fails() {
    let venue = open_venue().await;
    let alice = funded(&venue, 10_000_000);
    let resting = venue.submit(limit(alice, Side::BUY, "0.40", 5, 1)).await.unwrap();

    let cancelled = venue.cancel(&gas(), resting.order.order_id, alice).await.unwrap();
    assert_eq!(cancelled.status, OrderStatus::Cancelled(CancelReason::UserRequested));
    assert_eq!(venue.balance(&alice, USDC).reserved, Amount::ZERO);

    let err = venue.cancel(&gas(), resting.order.order_id, alice).await.unwrap_err();
    assert!(matches!(err, VenueError::Engine(EngineError::InvalidState { .. })));
}

#[tokio::test]
async fn test_good_till_date_expires() {
    let venue = open_venue().await;
    let alice = funded(&venue, 10_000_000);
    let deadline = clock::now_nanos() + 60_000_000_000;

    let gtd = limit(alice, Side::BUY, "0.40", 5, 1).with_time_in_force(TimeInForce::GTD(deadline));
    venue.submit(gtd).await.unwrap();
    assert!(venue.expire(deadline - 1).await.unwrap().is_empty());

    let expired = venue.expire(deadline).await.unwrap();
    assert_eq!(expired.len(), 1);
    assert_eq!(expired[0].status, OrderStatus::Expired);
    assert_eq!(venue.balance(&alice, USDC).reserved, Amount::ZERO);
}

#[tokio::test]
async fn test_resolution_pays_positions_and_rejects_orders() {
    let venue = open_venue().await;
    let alice = funded(&venue, 10_000_000);
    let bob = funded(&venue, 10_000_000);
    let carol = funded(&venue, 10_000_000);

    venue.submit(limit(bob, Side::SELL, "0.40", 5, 1)).await.unwrap();
    venue.submit(limit(alice, Side::BUY, "0.40", 5, 1)).await.unwrap();
    // Left resting; resolution cancels it.
    venue.submit(limit(carol, Side::BUY, "0.30", 2, 1)).await.unwrap();

    let report = venue.resolve_market(&gas(), price("0.70")).await.unwrap();
    assert_eq!(report.escrow_residual, Amount::ZERO);
    assert_eq!(venue.balance(&alice, USDC).available, Amount::new(11_500_000));
    assert_eq!(venue.balance(&bob, USDC).available, Amount::new(8_500_000));
    assert_eq!(venue.balance(&carol, USDC).available, Amount::new(10_000_000));
    assert!(venue.position(&gas(), &alice).unwrap().is_flat());

    let err = venue.submit(limit(carol, Side::BUY, "0.30", 2, 2)).await.unwrap_err();
    assert!(matches!(err, VenueError::Engine(EngineError::MarketClosed { .. })));

    let err = venue.resolve_market(&gas(), price("0.70")).await.unwrap_err();
    assert!(matches!(err, VenueError::Settlement(SettlementError::AlreadyResolved { .. })));
    assert_eq!(venue.ledger().net_supply(USDC), Amount::new(30_000_000));
}

#[tokio::test]
async fn test_journal_restart_does_not_resettle() {
    let tmp = TempDir::new().unwrap();
    let config = || {
        VenueConfig::default()
            .with_market(market_config(gas()))
            .with_journal(tmp.path().join("journal"))
    };

    let venue = Venue::open(config(), Arc::new(AcceptAll)).await.unwrap();
    let alice = funded(&venue, 10_000_000);
    let bob = funded(&venue, 10_000_000);
    venue.submit(limit(bob, Side::SELL, "0.40", 5, 1)).await.unwrap();
    let buy = venue.submit(limit(alice, Side::BUY, "0.40", 5, 1)).await.unwrap();
    let trade = buy.trades[0].clone();
    let settled = venue.shutdown().await;
    assert_eq!(settled.committed, vec![trade.trade_id]);

    let restarted = Venue::open(config(), Arc::new(AcceptAll)).await.unwrap();
    assert_eq!(restarted.settlement_status(&trade.trade_id), SettlementStatus::Committed);
    assert!(!restarted.bridge().enqueue(trade).unwrap());
}

#[tokio::test]
async fn test_markets_are_independent() {
    let tvl = MarketId::new("TVL-AAVE");
    let config = VenueConfig::default()
        .with_market(market_config(gas()))
        .with_market(market_config(tvl.clone()));
    let venue = Venue::open(config, Arc::new(AcceptAll)).await.unwrap();
    assert_eq!(venue.markets(), vec![gas(), tvl.clone()]);

    let alice = funded(&venue, 10_000_000);
    venue.submit(limit(alice, Side::BUY, "0.40", 5, 1)).await.unwrap();
    let other = OrderRequest::limit(alice, tvl.clone(), Side::BUY, price("0.20"), qty(5), 2);
    venue.submit(other).await.unwrap();

    // Both reservations draw on the one shared balance.
    assert_eq!(venue.balance(&alice, USDC).reserved, Amount::new(3_000_000));

    venue.close_market(&gas()).await.unwrap();
    assert_eq!(venue.balance(&alice, USDC).reserved, Amount::new(1_000_000));
    let data = venue.market_data(&tvl, 5).await.unwrap();
    assert_eq!(data.best_bid, Some((price("0.20"), qty(5))));

    let err = venue.register_market(market_config(tvl)).unwrap_err();
    assert!(matches!(err, VenueError::Validation(ValidationError::DuplicateMarket { .. })));
}
