//! Market error taxonomy.
//!
//! Every failure is reported to the caller of the operation that detected it
//! and leaves the ledger untouched.

use crate::market::{FeedId, MarketId, PositionId, UnixSecs};

/// Errors raised by market creation, settlement, staking and claims.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarketError {
    // --- creation ---
    /// Strike must be strictly positive.
    InvalidStrike { strike: u64 },
    /// Expiry must be strictly after the current time.
    InvalidExpiry { expiry: UnixSecs, now: UnixSecs },
    /// A market with the same (authority, strike, expiry) already exists.
    DuplicateMarket { market_id: MarketId },

    // --- resolution ---
    NotYetExpired {
        market_id: MarketId,
        expiry: UnixSecs,
        now: UnixSecs,
    },
    AlreadyResolved { market_id: MarketId },
    /// No oracle observation usable for settlement (missing, pre-expiry or too late).
    StaleOracleData {
        market_id: MarketId,
        expiry: UnixSecs,
        observed_at: Option<UnixSecs>,
    },
    OracleUnavailable { feed: FeedId, reason: String },

    // --- claims ---
    MarketNotSettled { market_id: MarketId },
    AlreadyClaimed { position_id: PositionId },

    // --- lookups and staking ---
    MarketNotFound { market_id: MarketId },
    PositionNotFound { position_id: PositionId },
    InvalidStake { amount: u64 },
    StakingClosed { market_id: MarketId },

    /// Stake or payout arithmetic left the u64 range.
    ArithmeticOverflow { context: String },

    /// Persistence failure in the ledger backend.
    Storage(String),
}

impl MarketError {
    /// Stable machine-readable kind, used in logs and CLI output.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidStrike { .. } => "InvalidStrike",
            Self::InvalidExpiry { .. } => "InvalidExpiry",
            Self::DuplicateMarket { .. } => "DuplicateMarket",
            Self::NotYetExpired { .. } => "NotYetExpired",
            Self::AlreadyResolved { .. } => "AlreadyResolved",
            Self::StaleOracleData { .. } => "StaleOracleData",
            Self::OracleUnavailable { .. } => "OracleUnavailable",
            Self::MarketNotSettled { .. } => "MarketNotSettled",
            Self::AlreadyClaimed { .. } => "AlreadyClaimed",
            Self::MarketNotFound { .. } => "MarketNotFound",
            Self::PositionNotFound { .. } => "PositionNotFound",
            Self::InvalidStake { .. } => "InvalidStake",
            Self::StakingClosed { .. } => "StakingClosed",
            Self::ArithmeticOverflow { .. } => "ArithmeticOverflow",
            Self::Storage(_) => "Storage",
        }
    }
}

impl std::fmt::Display for MarketError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidStrike { strike } => write!(f, "Invalid strike {}: must be > 0", strike),
            Self::InvalidExpiry { expiry, now } => {
                write!(f, "Invalid expiry {}: must be after current time {}", expiry, now)
            }
            Self::DuplicateMarket { market_id } => {
                write!(f, "Market {} already exists", market_id)
            }
            Self::NotYetExpired { market_id, expiry, now } => write!(
                f,
                "Market {} has not expired yet (expiry {}, now {})",
                market_id, expiry, now
            ),
            Self::AlreadyResolved { market_id } => {
                write!(f, "Market {} has already been resolved", market_id)
            }
            Self::StaleOracleData { market_id, expiry, observed_at } => match observed_at {
                Some(at) => write!(
                    f,
                    "Stale oracle data for market {}: observation at {} not usable for expiry {}",
                    market_id, at, expiry
                ),
                None => write!(
                    f,
                    "Stale oracle data for market {}: no observation at or after expiry {}",
                    market_id, expiry
                ),
            },
            Self::OracleUnavailable { feed, reason } => {
                write!(f, "Oracle unavailable for feed {}: {}", feed, reason)
            }
            Self::MarketNotSettled { market_id } => {
                write!(f, "Market {} is not settled", market_id)
            }
            Self::AlreadyClaimed { position_id } => {
                write!(f, "Position {} has already been claimed", position_id)
            }
            Self::MarketNotFound { market_id } => write!(f, "Market {} not found", market_id),
            Self::PositionNotFound { position_id } => {
                write!(f, "Position {} not found", position_id)
            }
            Self::InvalidStake { amount } => write!(f, "Invalid stake {}: must be > 0", amount),
            Self::StakingClosed { market_id } => {
                write!(f, "Market {} no longer accepts positions", market_id)
            }
            Self::ArithmeticOverflow { context } => write!(f, "Arithmetic overflow: {}", context),
            Self::Storage(msg) => write!(f, "Ledger storage error: {}", msg),
        }
    }
}

impl std::error::Error for MarketError {}

impl From<rusqlite::Error> for MarketError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Storage(e.to_string())
    }
}

pub type MarketResult<T> = Result<T, MarketError>;
