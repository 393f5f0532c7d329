//! Positions: a participant's stake on one side of a market.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::{MarketId, Outcome, UnixSecs};
use crate::error::{MarketError, MarketResult};

/// Unique position identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PositionId(Uuid);

impl PositionId {
    pub fn new_random() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for PositionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PositionId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| format!("invalid position id '{}': {}", s, e))
    }
}

/// A recorded stake backing one outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub id: PositionId,
    pub market_id: MarketId,
    pub owner: String,
    pub side: Outcome,
    pub stake: u64,
    pub opened_at: UnixSecs,
    pub claimed: bool,
    /// Net amount paid out when claimed.
    pub payout: Option<u64>,
    pub claimed_at: Option<UnixSecs>,
}

impl Position {
    pub fn open(market_id: MarketId, owner: String, side: Outcome, stake: u64, opened_at: UnixSecs) -> Self {
        Self {
            id: PositionId::new_random(),
            market_id,
            owner,
            side,
            stake,
            opened_at,
            claimed: false,
            payout: None,
            claimed_at: None,
        }
    }
}

/// Total stake backing each side of a market.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolTotals {
    pub above: u64,
    pub below: u64,
}

impl PoolTotals {
    /// Sum stakes per side. Fails if the combined pool leaves the u64 range.
    pub fn from_positions<'a>(positions: impl IntoIterator<Item = &'a Position>) -> MarketResult<Self> {
        let mut totals = Self::default();
        for p in positions {
            totals = totals.with_stake(p.side, p.stake)?;
        }
        Ok(totals)
    }

    /// Pools after adding `stake` on `side`. The combined pool must stay within u64.
    pub fn with_stake(&self, side: Outcome, stake: u64) -> MarketResult<Self> {
        let overflow = || MarketError::ArithmeticOverflow {
            context: format!("pool total {} + stake {}", self.total(), stake),
        };
        if self.total() + stake as u128 > u64::MAX as u128 {
            return Err(overflow());
        }

        let mut next = *self;
        match side {
            Outcome::Above => next.above = next.above.checked_add(stake).ok_or_else(overflow)?,
            Outcome::Below => next.below = next.below.checked_add(stake).ok_or_else(overflow)?,
        }
        Ok(next)
    }

    pub fn side(&self, outcome: Outcome) -> u64 {
        match outcome {
            Outcome::Above => self.above,
            Outcome::Below => self.below,
        }
    }

    pub fn total(&self) -> u128 {
        self.above as u128 + self.below as u128
    }
}

/// Result of a successful claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    pub position: PositionId,
    pub gross: u64,
    pub fee: u64,
    pub net: u64,
}
