//! Market Ledger Entry
//!
//! The persisted record of one binary-options market:
//! - Authority, strike, expiry and oracle feed fixed at creation
//! - Deterministic identity derived from (authority, strike, expiry)
//! - Write-once settlement record (outcome, settling price, observation time)
//!
//! The settlement record is an `Option`, so "resolved" and "outcome set"
//! cannot disagree: a market is resolved exactly when it carries a settlement.

pub mod identity;
pub mod position;

pub use identity::{Authority, MarketId};
pub use position::{Claim, PoolTotals, Position, PositionId};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Unix epoch seconds.
pub type UnixSecs = i64;

/// Decimal places of every scaled price (strike and oracle observations).
pub const PRICE_DECIMALS: u32 = 9;
/// `10^PRICE_DECIMALS`.
pub const PRICE_SCALE: u64 = 1_000_000_000;

/// Format a scaled price as a decimal string (e.g. 25_000_000_000 -> "25.000000000").
pub fn format_price(scaled: u64) -> String {
    format!("{}.{:09}", scaled / PRICE_SCALE, scaled % PRICE_SCALE)
}

// =============================================================================
// Outcome
// =============================================================================

/// Binary result of a settled market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    /// Oracle price strictly greater than the strike.
    Above,
    /// Oracle price at or below the strike.
    Below,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Above => "above",
            Self::Below => "below",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Outcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "above" | "yes" | "up" => Ok(Self::Above),
            "below" | "no" | "down" => Ok(Self::Below),
            other => Err(format!("unknown outcome '{}'", other)),
        }
    }
}

// =============================================================================
// Oracle Feed
// =============================================================================

/// Opaque identifier of the price feed a market settles against.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeedId(String);

impl FeedId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FeedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FeedId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

// =============================================================================
// Market
// =============================================================================

/// Lifecycle state. `Settled` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarketState {
    Open,
    Settled,
}

/// Write-once result of resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    pub outcome: Outcome,
    /// Oracle price used for the comparison (scaled by `PRICE_SCALE`).
    pub price: u64,
    /// Oracle observation time; always at or after the market expiry.
    pub observed_at: UnixSecs,
    /// Ledger time at which the settlement was written.
    pub resolved_at: UnixSecs,
}

/// One binary-options market.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Market {
    id: MarketId,
    authority: Authority,
    strike: u64,
    expiry: UnixSecs,
    oracle_feed: FeedId,
    created_at: UnixSecs,
    settlement: Option<Settlement>,
}

impl Market {
    /// Build an open market. The identity is derived, never supplied.
    pub fn open(
        authority: Authority,
        strike: u64,
        expiry: UnixSecs,
        oracle_feed: FeedId,
        created_at: UnixSecs,
    ) -> Self {
        Self {
            id: MarketId::derive(&authority, strike, expiry),
            authority,
            strike,
            expiry,
            oracle_feed,
            created_at,
            settlement: None,
        }
    }

    /// Reassemble a market read back from storage.
    pub(crate) fn from_parts(
        id: MarketId,
        authority: Authority,
        strike: u64,
        expiry: UnixSecs,
        oracle_feed: FeedId,
        created_at: UnixSecs,
        settlement: Option<Settlement>,
    ) -> Self {
        Self {
            id,
            authority,
            strike,
            expiry,
            oracle_feed,
            created_at,
            settlement,
        }
    }

    pub fn id(&self) -> &MarketId {
        &self.id
    }

    pub fn authority(&self) -> &Authority {
        &self.authority
    }

    pub fn strike(&self) -> u64 {
        self.strike
    }

    pub fn expiry(&self) -> UnixSecs {
        self.expiry
    }

    pub fn oracle_feed(&self) -> &FeedId {
        &self.oracle_feed
    }

    pub fn created_at(&self) -> UnixSecs {
        self.created_at
    }

    pub fn is_resolved(&self) -> bool {
        self.settlement.is_some()
    }

    pub fn outcome(&self) -> Option<Outcome> {
        self.settlement.as_ref().map(|s| s.outcome)
    }

    pub fn settlement(&self) -> Option<&Settlement> {
        self.settlement.as_ref()
    }

    pub fn state(&self) -> MarketState {
        if self.is_resolved() {
            MarketState::Settled
        } else {
            MarketState::Open
        }
    }

    pub fn is_expired(&self, now: UnixSecs) -> bool {
        now >= self.expiry
    }

    /// Record the settlement. Returns false (and changes nothing) if already settled.
    pub(crate) fn apply_settlement(&mut self, settlement: Settlement) -> bool {
        if self.settlement.is_some() {
            return false;
        }
        self.settlement = Some(settlement);
        true
    }

    /// Public read contract of a market.
    pub fn view(&self) -> MarketView {
        MarketView {
            id: self.id,
            authority: self.authority,
            strike: self.strike,
            expiry: self.expiry,
            oracle_feed: self.oracle_feed.clone(),
            resolved: self.is_resolved(),
            outcome: self.outcome(),
        }
    }
}

/// Flat read model: `{authority, strike, expiry, oracle_feed, resolved, outcome}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketView {
    pub id: MarketId,
    pub authority: Authority,
    pub strike: u64,
    pub expiry: UnixSecs,
    pub oracle_feed: FeedId,
    pub resolved: bool,
    pub outcome: Option<Outcome>,
}
