//! Replay oracle: recorded observations served from memory.

use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::debug;

use super::{OracleAdapter, OracleError, PriceObservation};
use crate::market::{FeedId, UnixSecs};

/// One recorded price, as stored in replay files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordedPrice {
    pub feed: FeedId,
    pub price: u64,
    pub observed_at: UnixSecs,
}

/// Oracle backed by per-feed observations ordered by publish time.
///
/// Observations can be appended while the oracle is shared, so a caller that
/// got `NoDataAtOrAfter` can retry once the feed catches up.
#[derive(Debug, Default)]
pub struct ReplayOracle {
    feeds: RwLock<HashMap<FeedId, BTreeMap<UnixSecs, u64>>>,
}

impl ReplayOracle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a feed with no observations yet.
    pub fn register_feed(&self, feed: FeedId) {
        self.feeds.write().entry(feed).or_default();
    }

    /// Record an observation. A second observation at the same time replaces the first.
    pub fn record(&self, feed: FeedId, observed_at: UnixSecs, price: u64) {
        self.feeds
            .write()
            .entry(feed)
            .or_default()
            .insert(observed_at, price);
    }

    pub fn from_prices(prices: impl IntoIterator<Item = RecordedPrice>) -> Self {
        let oracle = Self::new();
        for p in prices {
            oracle.record(p.feed, p.observed_at, p.price);
        }
        oracle
    }

    /// Load observations from a JSON array of `{feed, price, observed_at}`.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read replay prices: {}", path.display()))?;
        let prices: Vec<RecordedPrice> = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse replay prices: {}", path.display()))?;
        debug!(count = prices.len(), path = %path.display(), "Loaded replay prices");
        Ok(Self::from_prices(prices))
    }

    /// Number of observations recorded for a feed.
    pub fn len(&self, feed: &FeedId) -> usize {
        self.feeds.read().get(feed).map(|f| f.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.feeds.read().values().all(|f| f.is_empty())
    }
}

#[async_trait]
impl OracleAdapter for ReplayOracle {
    async fn price_at_or_after(
        &self,
        feed: &FeedId,
        at: UnixSecs,
    ) -> Result<PriceObservation, OracleError> {
        let feeds = self.feeds.read();
        let observations = feeds
            .get(feed)
            .ok_or_else(|| OracleError::FeedNotFound { feed: feed.clone() })?;

        observations
            .range(at..)
            .next()
            .map(|(&observed_at, &price)| PriceObservation {
                feed: feed.clone(),
                price,
                observed_at,
            })
            .ok_or_else(|| OracleError::NoDataAtOrAfter {
                feed: feed.clone(),
                at,
            })
    }

    fn name(&self) -> &str {
        "replay"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed() -> FeedId {
        FeedId::new("SOL/USD")
    }

    #[tokio::test]
    async fn test_first_observation_at_or_after() {
        let oracle = ReplayOracle::new();
        oracle.record(feed(), 1_000, 24_000_000_000);
        oracle.record(feed(), 1_100, 25_000_000_000);
        oracle.record(feed(), 1_200, 26_000_000_000);

        // Exactly at an observation
        let obs = oracle.price_at_or_after(&feed(), 1_100).await.unwrap();
        assert_eq!(obs.observed_at, 1_100);
        assert_eq!(obs.price, 25_000_000_000);

        // Between observations -> next one
        let obs = oracle.price_at_or_after(&feed(), 1_101).await.unwrap();
        assert_eq!(obs.observed_at, 1_200);

        // Before everything -> first one
        let obs = oracle.price_at_or_after(&feed(), 10).await.unwrap();
        assert_eq!(obs.observed_at, 1_000);
    }

    #[tokio::test]
    async fn test_no_data_after_last_observation() {
        let oracle = ReplayOracle::new();
        oracle.record(feed(), 1_000, 24_000_000_000);

        let err = oracle.price_at_or_after(&feed(), 1_001).await.unwrap_err();
        assert_eq!(err, OracleError::NoDataAtOrAfter { feed: feed(), at: 1_001 });
    }

    #[tokio::test]
    async fn test_unknown_feed() {
        let oracle = ReplayOracle::new();
        oracle.register_feed(feed());

        let err = oracle
            .price_at_or_after(&FeedId::new("BTC/USD"), 0)
            .await
            .unwrap_err();
        assert!(matches!(err, OracleError::FeedNotFound { .. }));

        // Registered but empty feed is "no data", not "unknown"
        let err = oracle.price_at_or_after(&feed(), 0).await.unwrap_err();
        assert!(matches!(err, OracleError::NoDataAtOrAfter { .. }));
    }

    #[test]
    fn test_load_from_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prices.json");
        std::fs::write(
            &path,
            r#"[
                {"feed": "SOL/USD", "price": 30000000000, "observed_at": 3601},
                {"feed": "SOL/USD", "price": 29000000000, "observed_at": 3500}
            ]"#,
        )
        .unwrap();

        let oracle = ReplayOracle::from_json_file(&path).unwrap();
        assert_eq!(oracle.len(&feed()), 2);
        assert!(!oracle.is_empty());
    }
}
