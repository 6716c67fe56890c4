//! Shared vocabulary of the metric contract venue
//!
//! Identifiers, fixed-point arithmetic, orders, trades, positions and the
//! error taxonomy used by the ledger, matching, settlement and venue
//! crates. Nothing here performs I/O.

pub mod account;
pub mod clock;
pub mod errors;
pub mod ids;
pub mod market;
pub mod numeric;
pub mod order;
pub mod position;
pub mod trade;
