//! Crossing detection logic
//!
//! Determines when an incoming order can trade against a resting price.

use types::numeric::Price;
use types::order::Side;

/// Check if a bid and ask can match at given prices
pub fn can_match(bid_price: Price, ask_price: Price) -> bool {
    bid_price >= ask_price
}

/// Check if an incoming order crosses a resting price.
///
/// An incoming order without a limit (market, untriggered-limit stop)
/// crosses any resting price.
pub fn incoming_can_match(incoming_side: Side, incoming_limit: Option<Price>, resting_price: Price) -> bool {
    match (incoming_side, incoming_limit) {
        (_, None) => true,
        (Side::BUY, Some(limit)) => can_match(limit, resting_price),
        (Side::SELL, Some(limit)) => can_match(resting_price, limit),
    }
}
