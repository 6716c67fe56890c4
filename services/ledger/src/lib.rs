//! Collateral Ledger Service
//!
//! Per-(trader, asset) balances split into available / reserved /
//! in-flight partitions, plus the collateral arithmetic that turns order
//! and trade quantities into native asset amounts.
//!
//! Each balance row has its own lock; there is no global ledger lock.

pub mod collateral;
pub mod ledger;

pub use ledger::Ledger;
