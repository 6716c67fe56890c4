//! Settlement Bridge Service
//!
//! Turns executed trades into durable collateral movements:
//! - `journal`/`reader`: segmented CRC32C-framed commit journal and replay
//! - `store`: idempotent durable stores (memory, journal)
//! - `positions`: net positions per (market, account)
//! - `bridge`: per-market FIFO lanes, batching, retry, dead letters,
//!   market resolution

pub mod bridge;
pub mod journal;
pub mod positions;
pub mod reader;
pub mod store;

pub use bridge::{BatchResult, BridgeConfig, DeadLetter, ResolutionReport, SettlementBridge, SettlementStatus};
pub use journal::{JournalConfig, RecordKind, SyncPolicy};
pub use positions::PositionBook;
pub use store::{Applied, CommitKey, CommitRecord, DurableStore, JournalStore, MemoryStore};
