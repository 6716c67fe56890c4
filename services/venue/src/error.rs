use thiserror::Error;
use types::errors::{EngineError, LedgerError, SettlementError, StoreError, ValidationError};

/// Order admission rejections
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AdmissionError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Stale sequence number for {account}: last {last}, got {got}")]
    StaleSequence { account: String, last: u64, got: u64 },

    #[error("Malformed order: {0}")]
    Malformed(String),
}

/// Central error type for the venue
#[derive(Debug, Error)]
pub enum VenueError {
    #[error("Admission rejected: {0}")]
    Admission(#[from] AdmissionError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Settlement(#[from] SettlementError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Configuration error: {0}")]
    Config(String),
}
