//! Collateral arithmetic
//!
//! Metric contracts are fully collateralized. Prices live in `[0, C]`
//! where `C` is the market's price ceiling:
//! - a buyer pays `p` per unit and the long is worth `v` at resolution
//! - a seller pays `C − p` per unit and the short is worth `C − v`
//!
//! Every amount is computed exactly in `Decimal`, lifted to the 18-decimal
//! internal scale and then rescaled to the asset's native precision.
//! Reservations round up and payouts round down, so the escrow can never
//! be short.

use rust_decimal::Decimal;
use types::market::MarketConfig;
use types::numeric::{Amount, NumericError, Price, Quantity, Rounding, Wad};
use types::order::{Order, OrderType, Side};
use types::position::PositionSide;

/// Per-unit cost of taking `side` at `price`.
pub fn unit_cost(side: Side, price: Price, ceiling: Price) -> Result<Decimal, NumericError> {
    match side {
        Side::BUY => Ok(price.as_decimal()),
        Side::SELL => complement(price, ceiling),
    }
}

/// Per-unit value of a position of `side` marked at `price`.
pub fn unit_value(side: PositionSide, price: Price, ceiling: Price) -> Result<Decimal, NumericError> {
    match side {
        PositionSide::LONG => Ok(price.as_decimal()),
        PositionSide::SHORT => complement(price, ceiling),
    }
}

fn complement(price: Price, ceiling: Price) -> Result<Decimal, NumericError> {
    let value = ceiling.as_decimal() - price.as_decimal();
    if value.is_sign_negative() && !value.is_zero() {
        return Err(NumericError::Negative(value.to_string()));
    }
    Ok(value)
}

/// `quantity × per_unit` in native units.
pub fn native_amount(
    quantity: Quantity,
    per_unit: Decimal,
    asset_decimals: u32,
    rounding: Rounding,
) -> Result<Amount, NumericError> {
    Wad::from_product(quantity.as_decimal(), per_unit)?.to_native(asset_decimals, rounding)
}

/// Worst-case per-unit collateral for an order.
///
/// Priced orders reserve at their limit. Orders without a limit (market
/// orders and plain stops) may fill anywhere in `[0, C]`, so both sides
/// reserve the full ceiling.
pub fn per_unit_reservation(order: &Order, config: &MarketConfig) -> Result<Decimal, NumericError> {
    match (order.order_type, order.price) {
        (OrderType::Market, _) | (OrderType::Stop, None) => Ok(config.price_ceiling.as_decimal()),
        (_, Some(limit)) => unit_cost(order.side, limit, config.price_ceiling),
        (OrderType::Limit, None) => Err(NumericError::Parse("limit order without price".into())),
    }
}

/// Worst-case collateral to reserve when admitting `order`.
pub fn order_reservation(order: &Order, config: &MarketConfig) -> Result<Amount, NumericError> {
    native_amount(
        order.quantity,
        per_unit_reservation(order, config)?,
        config.asset_decimals,
        Rounding::Up,
    )
}

/// Reservation slice attributed to a fill of `fill_quantity`.
///
/// The fill that completes the order takes the exact remainder so the
/// reservation is fully accounted for.
pub fn fill_slice(order: &Order, fill_quantity: Quantity, config: &MarketConfig) -> Result<Amount, NumericError> {
    let remaining = order.remaining_reservation();
    if order.filled_quantity + fill_quantity >= order.quantity {
        return Ok(remaining);
    }
    let slice = native_amount(
        fill_quantity,
        per_unit_reservation(order, config)?,
        config.asset_decimals,
        Rounding::Down,
    )?;
    Ok(slice.min(remaining))
}

/// Collateral an opening fill moves into escrow.
pub fn opening_cost(side: Side, quantity: Quantity, price: Price, config: &MarketConfig) -> Result<Amount, NumericError> {
    native_amount(
        quantity,
        unit_cost(side, price, config.price_ceiling)?,
        config.asset_decimals,
        Rounding::Up,
    )
}

/// Escrow payout for closing `quantity` of a `side` position at `price`.
pub fn payout(side: PositionSide, quantity: Quantity, price: Price, config: &MarketConfig) -> Result<Amount, NumericError> {
    native_amount(
        quantity,
        unit_value(side, price, config.price_ceiling)?,
        config.asset_decimals,
        Rounding::Down,
    )
}
