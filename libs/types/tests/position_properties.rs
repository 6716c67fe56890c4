//! Position accounting under arbitrary fill sequences

use proptest::prelude::*;
use rust_decimal::Decimal;
use types::ids::{AccountId, MarketId};
use types::numeric::{Price, Quantity};
use types::order::Side;
use types::position::{Position, PositionSide};

fn flat() -> Position {
    Position::new(AccountId::new(), MarketId::new("ETH-GAS-2026Q4"), 0)
}

fn side() -> impl Strategy<Value = Side> {
    prop_oneof![Just(Side::BUY), Just(Side::SELL)]
}

fn signed_size(position: &Position) -> Decimal {
    match position.side {
        PositionSide::LONG => position.size.as_decimal(),
        PositionSide::SHORT => -position.size.as_decimal(),
    }
}

proptest! {
    #[test]
    fn prop_same_side_entry_stays_within_fill_prices(
        fills in prop::collection::vec((1u32..100, 1u64..50), 1..30)
    ) {
        let mut position = flat();
        let mut total = 0u64;
        for (i, (ticks, qty)) in fills.iter().enumerate() {
            let price = Price::new(Decimal::new(*ticks as i64, 2));
            let effect = position.apply_fill(Side::BUY, Quantity::from_u64(*qty), price, i as i64);
            prop_assert!(effect.closed.is_zero());
            total += qty;
        }

        let low = fills.iter().map(|(t, _)| *t).min().unwrap_or_default();
        let high = fills.iter().map(|(t, _)| *t).max().unwrap_or_default();
        prop_assert_eq!(position.size, Quantity::from_u64(total));
        prop_assert!(position.entry_price.as_decimal() >= Decimal::new(low as i64, 2));
        prop_assert!(position.entry_price.as_decimal() <= Decimal::new(high as i64, 2));
    }

    #[test]
    fn prop_net_size_tracks_signed_fills(
        fills in prop::collection::vec((side(), 1u32..100, 1u64..50), 1..40)
    ) {
        let mut position = flat();
        let mut net = 0i64;
        for (i, (side, ticks, qty)) in fills.into_iter().enumerate() {
            let price = Price::new(Decimal::new(ticks as i64, 2));
            let effect = position.apply_fill(side, Quantity::from_u64(qty), price, i as i64);
            prop_assert_eq!(effect.closed + effect.opened, Quantity::from_u64(qty));
            net += match side {
                Side::BUY => qty as i64,
                Side::SELL => -(qty as i64),
            };
            prop_assert_eq!(signed_size(&position), Decimal::from(net));
            if position.is_flat() {
                prop_assert!(position.entry_price.is_zero());
            }
        }
    }

    #[test]
    fn prop_round_trip_at_one_price_realizes_nothing(
        side in side(),
        ticks in 1u32..100,
        qty in 1u64..1_000,
    ) {
        let mut position = flat();
        let price = Price::new(Decimal::new(ticks as i64, 2));
        position.apply_fill(side, Quantity::from_u64(qty), price, 1);
        let effect = position.apply_fill(side.opposite(), Quantity::from_u64(qty), price, 2);

        prop_assert!(position.is_flat());
        prop_assert_eq!(effect.realized, Decimal::ZERO);
        prop_assert_eq!(position.realized_pnl, Decimal::ZERO);
        prop_assert_eq!(position.version, 2);
    }
}
