//! Matching Engine Service
//!
//! Price-time priority matching for metric contract markets. Each market
//! is a [`MarketEngine`] driven by its own actor task (see [`actor`]).
//!
//! **Key Invariants:**
//! - Price-time priority strictly enforced
//! - Execution at the resting order's price
//! - Book never left crossed after a command
//! - Collateral reserved before an order reaches the book

pub mod actor;
pub mod book;
pub mod engine;
pub mod matching;
pub mod stats;
pub mod stops;

pub use actor::{spawn_market, MarketCommand, MarketHandle, TradeSink};
pub use engine::{MarketEngine, SubmitOutcome};
pub use stats::{MarketData, MarketStats};
