//! Order validation
//!
//! Stateless checks run before any book or ledger mutation. Stateful
//! checks (duplicate ids, market status, post-only crossing, fill-or-kill
//! liquidity) live in the engine.

use rust_decimal::Decimal;
use types::errors::ValidationError;
use types::market::MarketConfig;
use types::numeric::{Price, Quantity};
use types::order::{Order, OrderType, TimeInForce};

/// Validate an incoming order against its market's configuration.
pub fn validate_order(order: &Order, config: &MarketConfig, now: i64) -> Result<(), ValidationError> {
    if order.market_id != config.market_id {
        return Err(ValidationError::MarketMismatch {
            expected: config.market_id.to_string(),
            got: order.market_id.to_string(),
        });
    }

    validate_quantity(order.quantity, config.min_order_size, "quantity")?;

    match order.order_type {
        OrderType::Limit => {
            let price = order
                .price
                .ok_or_else(|| ValidationError::InvalidPrice("limit order requires a price".into()))?;
            validate_price(price, config, "limit price")?;
            if order.stop_price.is_some() {
                return Err(ValidationError::InvalidOrderType(
                    "stop price requires a stop order".into(),
                ));
            }
        }
        OrderType::Market => {
            if order.price.is_some() {
                return Err(ValidationError::InvalidPrice("market order must not carry a price".into()));
            }
            if order.stop_price.is_some() {
                return Err(ValidationError::InvalidOrderType(
                    "stop price requires a stop order".into(),
                ));
            }
            if matches!(order.time_in_force, TimeInForce::GTD(_)) {
                return Err(ValidationError::InvalidTimeInForce(
                    "market orders cannot be good-till-date".into(),
                ));
            }
        }
        OrderType::Stop => {
            let stop = order
                .stop_price
                .ok_or_else(|| ValidationError::InvalidPrice("stop order requires a stop price".into()))?;
            validate_price(stop, config, "stop price")?;
            if let Some(limit) = order.price {
                validate_price(limit, config, "limit price")?;
            }
            if order.post_only || order.iceberg_quantity.is_some() {
                return Err(ValidationError::InvalidOrderType(
                    "stop orders cannot be post-only or iceberg".into(),
                ));
            }
        }
    }

    if let TimeInForce::GTD(expiry) = order.time_in_force {
        if expiry <= now {
            return Err(ValidationError::InvalidTimeInForce(format!(
                "expiry {} is not after {}",
                expiry, now
            )));
        }
    }

    if order.post_only && (order.order_type != OrderType::Limit || order.time_in_force.is_immediate()) {
        return Err(ValidationError::InvalidOrderType(
            "post-only requires a resting limit order".into(),
        ));
    }

    if let Some(slice) = order.iceberg_quantity {
        if order.order_type != OrderType::Limit || order.time_in_force.is_immediate() {
            return Err(ValidationError::InvalidOrderType(
                "iceberg requires a resting limit order".into(),
            ));
        }
        validate_quantity(slice, config.min_order_size, "iceberg slice")?;
        if slice >= order.quantity {
            return Err(ValidationError::InvalidQuantity(format!(
                "iceberg slice {} must be below quantity {}",
                slice, order.quantity
            )));
        }
    }

    Ok(())
}

fn validate_quantity(quantity: Quantity, min_size: Decimal, what: &str) -> Result<(), ValidationError> {
    if quantity.as_decimal() <= Decimal::ZERO || !quantity.is_multiple_of(min_size) {
        return Err(ValidationError::InvalidQuantity(format!(
            "{} {} is not a positive multiple of {}",
            what, quantity, min_size
        )));
    }
    Ok(())
}

/// Prices must be tick-aligned and strictly inside `(0, ceiling)`.
fn validate_price(price: Price, config: &MarketConfig, what: &str) -> Result<(), ValidationError> {
    if price.as_decimal() <= Decimal::ZERO || price >= config.price_ceiling {
        return Err(ValidationError::InvalidPrice(format!(
            "{} {} outside (0, {})",
            what, price, config.price_ceiling
        )));
    }
    if !price.is_multiple_of(config.tick_size) {
        return Err(ValidationError::InvalidPrice(format!(
            "{} {} is not a multiple of tick {}",
            what, price, config.tick_size
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use types::ids::{AccountId, MarketId};
    use types::order::Side;

    const NOW: i64 = 1708123456789000000;

    fn config() -> MarketConfig {
        MarketConfig::new(
            MarketId::new("ETH-GAS-2026Q4"),
            Decimal::from_str("0.01").unwrap(),
            Decimal::ONE,
            6,
            "USDC",
        )
    }

    fn limit(price: &str, qty: &str) -> Order {
        Order::limit(
            AccountId::new(),
            MarketId::new("ETH-GAS-2026Q4"),
            Side::BUY,
            Price::from_str(price).unwrap(),
            Quantity::from_str(qty).unwrap(),
            NOW,
        )
    }

    fn market(side: Side) -> Order {
        Order::market(AccountId::new(), MarketId::new("ETH-GAS-2026Q4"), side, Quantity::from_u64(1), NOW)
    }

    #[test]
    fn test_valid_limit_order() {
        assert!(validate_order(&limit("0.45", "10"), &config(), NOW).is_ok());
    }

    #[test]
    fn test_rejects_off_tick_price() {
        let err = validate_order(&limit("0.455", "10"), &config(), NOW).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidPrice(_)));
    }

    #[test]
    fn test_rejects_price_at_bounds() {
        assert!(validate_order(&limit("0", "1"), &config(), NOW).is_err());
        assert!(validate_order(&limit("1", "1"), &config(), NOW).is_err());
    }

    #[test]
    fn test_rejects_fractional_quantity() {
        let err = validate_order(&limit("0.45", "1.5"), &config(), NOW).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidQuantity(_)));
    }

    #[test]
    fn test_rejects_wrong_market() {
        let mut order = limit("0.45", "1");
        order.market_id = MarketId::new("TVL-AAVE");
        assert!(matches!(
            validate_order(&order, &config(), NOW),
            Err(ValidationError::MarketMismatch { .. })
        ));
    }

    #[test]
    fn test_rejects_past_expiry() {
        let order = limit("0.45", "1").with_time_in_force(TimeInForce::GTD(NOW));
        assert!(matches!(
            validate_order(&order, &config(), NOW),
            Err(ValidationError::InvalidTimeInForce(_))
        ));
        let order = limit("0.45", "1").with_time_in_force(TimeInForce::GTD(NOW + 1));
        assert!(validate_order(&order, &config(), NOW).is_ok());
    }

    #[test]
    fn test_market_order_rules() {
        assert!(validate_order(&market(Side::BUY), &config(), NOW).is_ok());

        let mut priced = market(Side::BUY);
        priced.price = Some(Price::from_str("0.5").unwrap());
        assert!(validate_order(&priced, &config(), NOW).is_err());
    }

    #[test]
    fn test_post_only_must_rest() {
        let order = limit("0.45", "1").with_post_only(true).with_time_in_force(TimeInForce::IOC);
        assert!(matches!(
            validate_order(&order, &config(), NOW),
            Err(ValidationError::InvalidOrderType(_))
        ));
    }

    #[test]
    fn test_iceberg_slice_rules() {
        let ok = limit("0.45", "10").with_iceberg(Quantity::from_u64(2));
        assert!(validate_order(&ok, &config(), NOW).is_ok());

        let too_big = limit("0.45", "10").with_iceberg(Quantity::from_u64(10));
        assert!(validate_order(&too_big, &config(), NOW).is_err());
    }

    #[test]
    fn test_negative_values_never_reach_the_book() {
        let json = serde_json::to_string(&limit("0.45", "5")).unwrap();
        assert!(json.contains("\"0.45\""));
        let negative_price = json.replace("\"0.45\"", "\"-0.45\"");
        assert!(serde_json::from_str::<Order>(&negative_price).is_err());
        let negative_qty = json.replace("\"quantity\":\"5\"", "\"quantity\":\"-5\"");
        assert_ne!(negative_qty, json);
        assert!(serde_json::from_str::<Order>(&negative_qty).is_err());

        let empty = limit("0.45", "0");
        assert!(matches!(
            validate_order(&empty, &config(), NOW),
            Err(ValidationError::InvalidQuantity(_))
        ));
        let empty_slice = limit("0.45", "10").with_iceberg(Quantity::zero());
        assert!(matches!(
            validate_order(&empty_slice, &config(), NOW),
            Err(ValidationError::InvalidQuantity(_))
        ));
    }

    #[test]
    fn test_stop_requires_stop_price() {
        let mut stop = market(Side::SELL);
        stop.order_type = OrderType::Stop;
        stop.time_in_force = TimeInForce::GTC;
        assert!(validate_order(&stop, &config(), NOW).is_err());

        let stop = stop.with_stop_price(Price::from_str("0.30").unwrap());
        assert!(validate_order(&stop, &config(), NOW).is_ok());
    }
}
