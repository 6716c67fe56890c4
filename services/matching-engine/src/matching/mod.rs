//! Matching logic module
//!
//! Price crossing, trade construction and order validation.

pub mod crossing;
pub mod executor;
pub mod validation;

pub use crossing::can_match;
pub use executor::{Fill, MatchExecutor};
