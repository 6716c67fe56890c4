//! Metric contract venue
//!
//! Order admission and orchestration over the matching engine, collateral
//! ledger and settlement bridge. The `venue` binary drives a [`Venue`]
//! from a JSON-lines script.

pub mod admission;
pub mod config;
pub mod error;
pub mod venue;

pub use admission::{AcceptAll, AccountAllowList, Admission, Authenticator, OrderRequest};
pub use config::{JournalSettings, VenueConfig};
pub use error::{AdmissionError, VenueError};
pub use venue::Venue;
