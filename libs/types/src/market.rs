//! Market configuration supplied by market lifecycle management
//!
//! A market is one metric contract. Its prices live in `[0, price_ceiling]`:
//! a long pays the price per unit, a short pays `ceiling − price`, and at
//! resolution longs receive the outcome value while shorts receive
//! `ceiling − outcome`. The configuration is immutable for the market's
//! active lifetime.

use crate::errors::ValidationError;
use crate::ids::MarketId;
use crate::numeric::{Price, Wad, MAX_ASSET_DECIMALS};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Market lifecycle status as seen by the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MarketStatus {
    /// Accepting orders
    Open,
    /// No further orders; waiting for outcome resolution
    Closed,
    /// Final price applied, all positions closed (terminal)
    Resolved,
}

fn default_ceiling() -> Price {
    Price::new(Decimal::ONE)
}

/// Static parameters of one market.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketConfig {
    pub market_id: MarketId,
    /// Minimum price increment
    pub tick_size: Decimal,
    /// Quantities must be positive multiples of this
    pub min_order_size: Decimal,
    /// Native precision of the collateral asset
    pub asset_decimals: u32,
    /// Collateral asset symbol, e.g. "USDC"
    pub collateral_asset: String,
    /// Upper bound of the contract price range
    #[serde(default = "default_ceiling")]
    pub price_ceiling: Price,
}

impl MarketConfig {
    pub fn new(
        market_id: MarketId,
        tick_size: Decimal,
        min_order_size: Decimal,
        asset_decimals: u32,
        collateral_asset: impl Into<String>,
    ) -> Self {
        Self {
            market_id,
            tick_size,
            min_order_size,
            asset_decimals,
            collateral_asset: collateral_asset.into(),
            price_ceiling: default_ceiling(),
        }
    }

    pub fn with_price_ceiling(mut self, ceiling: Price) -> Self {
        self.price_ceiling = ceiling;
        self
    }

    /// Check the configuration is internally consistent.
    ///
    /// Besides positivity, the smallest notional step `tick × min_size`
    /// must be representable in native units, so every fill cost, payout
    /// and reservation of a valid order is exact.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.tick_size <= Decimal::ZERO {
            return Err(ValidationError::InvalidMarketConfig(format!(
                "tick size must be positive, got {}",
                self.tick_size
            )));
        }
        if self.min_order_size <= Decimal::ZERO {
            return Err(ValidationError::InvalidMarketConfig(format!(
                "minimum order size must be positive, got {}",
                self.min_order_size
            )));
        }
        if self.asset_decimals > MAX_ASSET_DECIMALS {
            return Err(ValidationError::InvalidMarketConfig(format!(
                "asset decimals {} exceed {}",
                self.asset_decimals, MAX_ASSET_DECIMALS
            )));
        }
        if self.collateral_asset.trim().is_empty() {
            return Err(ValidationError::InvalidMarketConfig(
                "collateral asset must be named".into(),
            ));
        }
        if self.price_ceiling.is_zero() || !self.price_ceiling.is_multiple_of(self.tick_size) {
            return Err(ValidationError::InvalidMarketConfig(format!(
                "price ceiling {} must be a positive multiple of tick {}",
                self.price_ceiling, self.tick_size
            )));
        }
        let step = Wad::from_product(self.tick_size, self.min_order_size)
            .map_err(|e| ValidationError::InvalidMarketConfig(e.to_string()))?;
        if step.to_native_exact(self.asset_decimals).is_err() {
            return Err(ValidationError::InvalidMarketConfig(format!(
                "notional step {} × {} is finer than {} asset decimals",
                self.tick_size, self.min_order_size, self.asset_decimals
            )));
        }
        Ok(())
    }
}
