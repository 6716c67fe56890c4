//! Venue configuration, loadable from JSON

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use settlement::{BridgeConfig, JournalConfig, SyncPolicy};
use types::market::MarketConfig;

use crate::error::VenueError;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VenueConfig {
    /// Bound of each market task's command channel
    pub market_channel_capacity: usize,
    pub settlement: BridgeConfig,
    /// Journal-backed settlement store; in-memory when absent
    pub journal: Option<JournalSettings>,
    /// Markets registered at startup
    pub markets: Vec<MarketConfig>,
}

impl Default for VenueConfig {
    fn default() -> Self {
        Self {
            market_channel_capacity: 1024,
            settlement: BridgeConfig::default(),
            journal: None,
            markets: Vec::new(),
        }
    }
}

impl VenueConfig {
    pub fn from_json(json: &str) -> Result<Self, VenueError> {
        serde_json::from_str(json).map_err(|e| VenueError::Config(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self, VenueError> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| VenueError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&json)
    }

    pub fn with_market(mut self, market: MarketConfig) -> Self {
        self.markets.push(market);
        self
    }

    pub fn with_journal(mut self, dir: impl Into<PathBuf>) -> Self {
        self.journal = Some(JournalSettings::new(dir));
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalSettings {
    pub dir: PathBuf,
    #[serde(default = "default_segment_bytes")]
    pub segment_bytes: u64,
    #[serde(default = "default_sync_policy")]
    pub sync_policy: SyncPolicy,
}

fn default_segment_bytes() -> u64 {
    64 * 1024 * 1024
}

fn default_sync_policy() -> SyncPolicy {
    SyncPolicy::EveryRecord
}

impl JournalSettings {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            segment_bytes: default_segment_bytes(),
            sync_policy: default_sync_policy(),
        }
    }

    pub fn journal_config(&self) -> JournalConfig {
        JournalConfig::new(self.dir.clone())
            .with_segment_bytes(self.segment_bytes)
            .with_sync_policy(self.sync_policy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_missing_fields() {
        let config = VenueConfig::from_json(r#"{"settlement": {"max_retries": 2}}"#).unwrap();
        assert_eq!(config.market_channel_capacity, 1024);
        assert_eq!(config.settlement.max_retries, 2);
        assert_eq!(config.settlement.batch_size, 256);
        assert!(config.journal.is_none());
    }

    #[test]
    fn test_markets_and_journal_from_json() {
        let json = r#"{
            "journal": {"dir": "/var/lib/venue/journal", "sync_policy": "OnRotation"},
            "markets": [{
                "market_id": "ETH-GAS-2026Q4",
                "tick_size": "0.01",
                "min_order_size": "1",
                "asset_decimals": 6,
                "collateral_asset": "USDC"
            }]
        }"#;
        let config = VenueConfig::from_json(json).unwrap();
        let journal = config.journal.unwrap();
        assert_eq!(journal.sync_policy, SyncPolicy::OnRotation);
        assert_eq!(journal.segment_bytes, 64 * 1024 * 1024);
        assert_eq!(config.markets.len(), 1);
        assert_eq!(config.markets[0].price_ceiling.to_string(), "1");
    }

    #[test]
    fn test_malformed_config_is_config_error() {
        assert!(matches!(VenueConfig::from_json("{"), Err(VenueError::Config(_))));
    }
}
