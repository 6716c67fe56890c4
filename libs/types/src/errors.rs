//! Error types for the venue
//!
//! Comprehensive error taxonomy using thiserror. Rejections are
//! synchronous and carry the specific reason; ledger invariant violations
//! are fatal for the affected row.

use crate::numeric::{Amount, NumericError};
use thiserror::Error;

/// Order or market parameters rejected before any state is touched
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Invalid market configuration: {0}")]
    InvalidMarketConfig(String),

    #[error("Invalid quantity: {0}")]
    InvalidQuantity(String),

    #[error("Invalid price: {0}")]
    InvalidPrice(String),

    #[error("Invalid time in force: {0}")]
    InvalidTimeInForce(String),

    #[error("Invalid order type: {0}")]
    InvalidOrderType(String),

    #[error("Order for market {got} submitted to market {expected}")]
    MarketMismatch { expected: String, got: String },

    #[error("Unknown market: {market}")]
    UnknownMarket { market: String },

    #[error("Market already registered: {market}")]
    DuplicateMarket { market: String },

    #[error("Duplicate order id: {order_id}")]
    DuplicateOrder { order_id: String },

    #[error("Post-only order at {price} would cross the book")]
    PostOnlyWouldCross { price: String },

    #[error("Fill-or-kill order cannot be filled: requested {requested}, available {available}")]
    FillOrKillUnfillable { requested: String, available: String },

    #[error("Numeric error: {0}")]
    Numeric(#[from] NumericError),
}

/// Collateral ledger errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LedgerError {
    #[error("Insufficient funds for {account}/{asset}: required {required}, available {available}")]
    InsufficientFunds {
        account: String,
        asset: String,
        required: Amount,
        available: Amount,
    },

    /// Releasing or moving more than a partition holds. Always a bug.
    #[error("Invalid release from {partition} of {account}/{asset}: requested {requested}, held {held}")]
    InvalidRelease {
        account: String,
        asset: String,
        partition: &'static str,
        requested: Amount,
        held: Amount,
    },

    #[error("Ledger invariant violated for {account}/{asset}: {detail}")]
    InvariantViolation {
        account: String,
        asset: String,
        detail: String,
    },

    #[error("Ledger row {account}/{asset} is frozen after an invariant violation")]
    Frozen { account: String, asset: String },

    #[error("Amount overflow for {account}/{asset}")]
    Overflow { account: String, asset: String },
}

impl LedgerError {
    /// Fatal errors indicate a bug and are never retried.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            LedgerError::InvalidRelease { .. }
                | LedgerError::InvariantViolation { .. }
                | LedgerError::Frozen { .. }
        )
    }
}

/// Matching engine errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Order {order_id} is in state {status}")]
    InvalidState { order_id: String, status: String },

    #[error("Order not found: {order_id}")]
    OrderNotFound { order_id: String },

    #[error("Order {order_id} does not belong to {account}")]
    NotOwner { order_id: String, account: String },

    #[error("Market {market} is closed")]
    MarketClosed { market: String },

    #[error("Market {market} is not running")]
    Unavailable { market: String },

    #[error("Numeric error: {0}")]
    Numeric(#[from] NumericError),
}

impl EngineError {
    pub fn is_insufficient_funds(&self) -> bool {
        matches!(self, EngineError::Ledger(LedgerError::InsufficientFunds { .. }))
    }
}

/// Durable store errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("Encoding error: {0}")]
    Encode(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Transient errors are worth retrying with backoff.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Io(_) | StoreError::Unavailable(_))
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io(err.to_string())
    }
}

/// Settlement bridge errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SettlementError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Numeric error: {0}")]
    Numeric(#[from] NumericError),

    #[error("Unknown market: {market}")]
    UnknownMarket { market: String },

    #[error("Trade {trade_id} is not dead-lettered")]
    NotDeadLettered { trade_id: String },

    #[error("Market {market} has unsettled trades: {pending} pending, {dead_lettered} dead-lettered")]
    UnsettledTrades {
        market: String,
        pending: usize,
        dead_lettered: usize,
    },

    #[error("Market {market} already resolved")]
    AlreadyResolved { market: String },

    #[error("Outcome {value} outside [0, {ceiling}] for market {market}")]
    InvalidOutcome {
        market: String,
        value: String,
        ceiling: String,
    },
}
