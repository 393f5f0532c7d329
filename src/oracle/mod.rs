//! Oracle Adapters for Settlement Prices
//!
//! The settlement engine only consumes one read contract:
//! "give me the first price observation for this feed at or after time T".
//!
//! - `ReplayOracle`: in-memory observations (tests, offline replays)
//! - `HermesOracle`: Pyth Hermes HTTP API (live settlement)
//!
//! All prices are normalized to the market scale (`PRICE_DECIMALS`).

pub mod feeds;
pub mod pyth;
pub mod replay;

pub use feeds::{resolve_pyth_feed_id, KnownFeed};
pub use pyth::{normalize_price, HermesOracle};
pub use replay::ReplayOracle;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::market::{FeedId, UnixSecs};

/// A single oracle price observation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceObservation {
    pub feed: FeedId,
    /// Price scaled by `PRICE_SCALE`.
    pub price: u64,
    /// Oracle publish time (Unix seconds).
    pub observed_at: UnixSecs,
}

/// Failures reported by an oracle adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OracleError {
    /// The adapter does not know this feed.
    FeedNotFound { feed: FeedId },
    /// The feed has no observation at or after the requested time (yet).
    NoDataAtOrAfter { feed: FeedId, at: UnixSecs },
    /// Transport failure, timeout or undecodable response.
    Unavailable { feed: FeedId, reason: String },
}

impl std::fmt::Display for OracleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FeedNotFound { feed } => write!(f, "Feed {} not found", feed),
            Self::NoDataAtOrAfter { feed, at } => {
                write!(f, "Feed {} has no observation at or after {}", feed, at)
            }
            Self::Unavailable { feed, reason } => write!(f, "Feed {} unavailable: {}", feed, reason),
        }
    }
}

impl std::error::Error for OracleError {}

/// Price source consulted once per resolution.
///
/// Implementations may suspend (network I/O); they must surface their own
/// timeouts as `OracleError::Unavailable`.
#[async_trait]
pub trait OracleAdapter: Send + Sync {
    /// First observation for `feed` with `observed_at >= at`.
    async fn price_at_or_after(
        &self,
        feed: &FeedId,
        at: UnixSecs,
    ) -> Result<PriceObservation, OracleError>;

    /// Adapter name for logs.
    fn name(&self) -> &str;
}
