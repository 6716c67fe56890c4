//! Durable store for settlement commits
//!
//! The bridge hands every financial effect to a [`DurableStore`] before it
//! touches the ledger's final state. Records are keyed, and applying a key
//! twice is reported as [`Applied::Duplicate`] rather than an error, which
//! is what makes redelivery after a crash or timeout safe.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use types::errors::StoreError;
use types::ids::{AccountId, MarketId, TradeId};
use types::numeric::{Amount, Price, Quantity};
use types::order::Side;
use types::trade::Trade;

use crate::journal::{JournalConfig, RecordKind, SegmentWriter};
use crate::reader::{self, ReplayError};

/// Idempotency key of a commit record
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommitKey {
    Trade(TradeId),
    Resolution(MarketId),
}

/// Balance and position deltas of one side of a trade
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegDelta {
    pub account_id: AccountId,
    pub side: Side,
    /// Part of the fill that reduced an opposite position
    pub closed: Quantity,
    /// Part of the fill that opened exposure
    pub opened: Quantity,
    /// Collateral moved into escrow for the opened part
    pub cost: Amount,
    /// Escrow payout for the closed part
    pub payout: Amount,
    /// Reservation slice returned to the trader
    pub released: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeCommit {
    pub trade: Trade,
    pub buyer: LegDelta,
    pub seller: LegDelta,
    pub committed_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionCommit {
    pub market_id: MarketId,
    pub outcome: Price,
    pub payouts: Vec<(AccountId, Amount)>,
    pub resolved_at: i64,
}

/// A durable unit of settlement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommitRecord {
    Trade(TradeCommit),
    Resolution(ResolutionCommit),
}

impl CommitRecord {
    pub fn key(&self) -> CommitKey {
        match self {
            CommitRecord::Trade(commit) => CommitKey::Trade(commit.trade.trade_id),
            CommitRecord::Resolution(commit) => CommitKey::Resolution(commit.market_id.clone()),
        }
    }

    fn kind(&self) -> RecordKind {
        match self {
            CommitRecord::Trade(_) => RecordKind::Trade,
            CommitRecord::Resolution(_) => RecordKind::Resolution,
        }
    }

    fn timestamp(&self) -> i64 {
        match self {
            CommitRecord::Trade(commit) => commit.committed_at,
            CommitRecord::Resolution(commit) => commit.resolved_at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// Newly recorded
    Applied,
    /// Already recorded by an earlier delivery
    Duplicate,
}

#[async_trait]
pub trait DurableStore: Send + Sync {
    /// Record `record` exactly once.
    async fn apply(&self, record: &CommitRecord) -> Result<Applied, StoreError>;

    /// Every key recorded so far
    async fn committed_keys(&self) -> Result<Vec<CommitKey>, StoreError>;
}

// ── In-memory store ─────────────────────────────────────────────────

/// Store that keeps records in memory. Durable only for the process
/// lifetime; used in tests and the script runner without a journal.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<CommitKey, CommitRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    pub fn get(&self, key: &CommitKey) -> Option<CommitRecord> {
        self.records.lock().get(key).cloned()
    }
}

#[async_trait]
impl DurableStore for MemoryStore {
    async fn apply(&self, record: &CommitRecord) -> Result<Applied, StoreError> {
        let mut records = self.records.lock();
        let key = record.key();
        if records.contains_key(&key) {
            return Ok(Applied::Duplicate);
        }
        records.insert(key, record.clone());
        Ok(Applied::Applied)
    }

    async fn committed_keys(&self) -> Result<Vec<CommitKey>, StoreError> {
        Ok(self.records.lock().keys().cloned().collect())
    }
}

// ── Journal store ───────────────────────────────────────────────────

struct JournalState {
    writer: SegmentWriter,
    keys: HashSet<CommitKey>,
}

/// Store backed by the append-only CRC32C-framed journal.
///
/// Opening replays the journal to rebuild the idempotency set, truncating
/// a torn tail left by a crash mid-write. Appends run on tokio's blocking
/// pool, so [`DurableStore::apply`] must be awaited inside a tokio runtime.
pub struct JournalStore {
    dir: PathBuf,
    state: Arc<Mutex<JournalState>>,
}

impl JournalStore {
    pub fn open(config: JournalConfig) -> Result<Self, StoreError> {
        let replay = reader::replay(&config.dir, true).map_err(replay_error)?;

        let mut keys = HashSet::with_capacity(replay.frames.len());
        for frame in &replay.frames {
            let record: CommitRecord = bincode::deserialize(&frame.payload)
                .map_err(|e| StoreError::Corrupt(format!("journal seq {}: {}", frame.sequence, e)))?;
            keys.insert(record.key());
        }
        if let Some(tail) = &replay.tail {
            warn!(
                segment = %tail.segment.display(),
                offset = tail.offset,
                truncated = tail.truncated,
                "journal tail repaired"
            );
        }

        let writer = SegmentWriter::open(config.clone(), replay.next_sequence())
            .map_err(|e| StoreError::Io(e.to_string()))?;
        info!(dir = %config.dir.display(), records = keys.len(), "journal store opened");

        Ok(Self {
            dir: config.dir,
            state: Arc::new(Mutex::new(JournalState { writer, keys })),
        })
    }

    pub fn dir(&self) -> &std::path::Path {
        &self.dir
    }

    /// Open with the default segment size, syncing every commit.
    pub fn open_dir(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        Self::open(JournalConfig::new(dir))
    }
}

#[async_trait]
impl DurableStore for JournalStore {
    async fn apply(&self, record: &CommitRecord) -> Result<Applied, StoreError> {
        let key = record.key();
        let payload = bincode::serialize(record).map_err(|e| StoreError::Encode(e.to_string()))?;

        let (recorded_at, kind) = (record.timestamp(), record.kind());
        let state = Arc::clone(&self.state);

        // Write and fsync off the async workers.
        let appended = tokio::task::spawn_blocking(move || {
            let mut state = state.lock();
            if state.keys.contains(&key) {
                return Ok(None);
            }
            let frame = state.writer.append(recorded_at, kind, payload)?;
            state.keys.insert(key);
            Ok::<_, std::io::Error>(Some(frame.sequence))
        })
        .await
        .map_err(|e| StoreError::Unavailable(format!("journal writer: {}", e)))?
        .map_err(|e| StoreError::Io(e.to_string()))?;

        match appended {
            Some(sequence) => {
                debug!(sequence, "commit journaled");
                Ok(Applied::Applied)
            }
            None => Ok(Applied::Duplicate),
        }
    }

    async fn committed_keys(&self) -> Result<Vec<CommitKey>, StoreError> {
        Ok(self.state.lock().keys.iter().cloned().collect())
    }
}

fn replay_error(err: ReplayError) -> StoreError {
    match err {
        ReplayError::Io(e) => StoreError::Io(e.to_string()),
        other => StoreError::Corrupt(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use tempfile::TempDir;
    use types::ids::OrderId;

    fn trade_commit() -> CommitRecord {
        let trade = Trade::new(
            1,
            MarketId::new("ETH-GAS-2026Q4"),
            OrderId::new(),
            OrderId::new(),
            AccountId::new(),
            AccountId::new(),
            Side::BUY,
            Price::from_str("0.40").unwrap(),
            Quantity::from_u64(5),
            Amount::new(2_000_000),
            Amount::new(3_000_000),
            1708123456789000000,
        );
        let leg = |account_id, side| LegDelta {
            account_id,
            side,
            closed: Quantity::zero(),
            opened: Quantity::from_u64(5),
            cost: Amount::new(2_000_000),
            payout: Amount::ZERO,
            released: Amount::ZERO,
        };
        CommitRecord::Trade(TradeCommit {
            buyer: leg(trade.buyer, Side::BUY),
            seller: leg(trade.seller, Side::SELL),
            trade,
            committed_at: 1708123456789000001,
        })
    }

    #[tokio::test]
    async fn test_memory_store_idempotent() {
        let store = MemoryStore::new();
        let record = trade_commit();

        assert_eq!(store.apply(&record).await.unwrap(), Applied::Applied);
        assert_eq!(store.apply(&record).await.unwrap(), Applied::Duplicate);
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(&record.key()), Some(record));
    }

    #[tokio::test]
    async fn test_journal_store_rebuilds_keys_on_reopen() {
        let tmp = TempDir::new().unwrap();
        let record = trade_commit();
        let resolution = CommitRecord::Resolution(ResolutionCommit {
            market_id: MarketId::new("ETH-GAS-2026Q4"),
            outcome: Price::from_str("0.55").unwrap(),
            payouts: vec![(AccountId::new(), Amount::new(550_000))],
            resolved_at: 1708123456789000002,
        });

        {
            let store = JournalStore::open_dir(tmp.path()).unwrap();
            assert_eq!(store.apply(&record).await.unwrap(), Applied::Applied);
            assert_eq!(store.apply(&resolution).await.unwrap(), Applied::Applied);
        }

        let store = JournalStore::open_dir(tmp.path()).unwrap();
        let keys: HashSet<CommitKey> = store.committed_keys().await.unwrap().into_iter().collect();
        assert!(keys.contains(&record.key()));
        assert!(keys.contains(&CommitKey::Resolution(MarketId::new("ETH-GAS-2026Q4"))));
        assert_eq!(store.apply(&record).await.unwrap(), Applied::Duplicate);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_journal_store_concurrent_applies_all_land() {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(JournalStore::open_dir(tmp.path()).unwrap());
        let records: Vec<CommitRecord> = (0..16).map(|_| trade_commit()).collect();

        let tasks = records.iter().cloned().map(|record| {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.apply(&record).await })
        });
        for joined in futures::future::join_all(tasks).await {
            assert_eq!(joined.unwrap().unwrap(), Applied::Applied);
        }
        assert_eq!(store.apply(&records[3]).await.unwrap(), Applied::Duplicate);
        drop(store);

        let reopened = JournalStore::open_dir(tmp.path()).unwrap();
        assert_eq!(reopened.committed_keys().await.unwrap().len(), 16);
    }

    #[tokio::test]
    async fn test_journal_store_survives_torn_tail() {
        let tmp = TempDir::new().unwrap();
        let first = trade_commit();
        {
            let store = JournalStore::open_dir(tmp.path()).unwrap();
            store.apply(&first).await.unwrap();
        }
        let path = crate::journal::segments(tmp.path()).unwrap().pop().unwrap();
        let mut data = std::fs::read(&path).unwrap();
        data.extend_from_slice(&[42, 0, 0, 0, 1, 2]);
        std::fs::write(&path, &data).unwrap();

        let store = JournalStore::open_dir(tmp.path()).unwrap();
        let second = trade_commit();
        assert_eq!(store.apply(&second).await.unwrap(), Applied::Applied);
        drop(store);

        let store = JournalStore::open_dir(tmp.path()).unwrap();
        assert_eq!(store.committed_keys().await.unwrap().len(), 2);
    }
}
