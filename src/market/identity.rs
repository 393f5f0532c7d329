//! Deterministic market identity.
//!
//! A market's id is SHA-256 over
//! `b"market" || authority (32 bytes) || strike (u64 LE) || expiry (i64 LE)`.
//! Each distinct (authority, strike, expiry) tuple maps to exactly one id,
//! so re-creating the same market collides on the ledger.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

use super::UnixSecs;

/// Domain tag prefixed to every identity preimage.
pub const MARKET_SEED: &[u8] = b"market";

fn parse_key(s: &str) -> Result<[u8; 32], String> {
    let bytes = hex::decode(s.trim().trim_start_matches("0x"))
        .map_err(|e| format!("invalid hex key '{}': {}", s, e))?;
    <[u8; 32]>::try_from(bytes.as_slice())
        .map_err(|_| format!("key must be 32 bytes, got {}", bytes.len()))
}

// =============================================================================
// Authority
// =============================================================================

/// 32-byte identity of the account that creates a market.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Authority([u8; 32]);

impl Authority {
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Derive a stable authority key from a human label.
    pub fn from_seed(seed: &str) -> Self {
        Self(Sha256::digest(seed.as_bytes()).into())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for Authority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for Authority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Authority({})", self)
    }
}

impl FromStr for Authority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_key(s).map(Self)
    }
}

// =============================================================================
// Market Id
// =============================================================================

/// Content-derived market identity.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MarketId([u8; 32]);

impl MarketId {
    pub fn derive(authority: &Authority, strike: u64, expiry: UnixSecs) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(MARKET_SEED);
        hasher.update(authority.as_bytes());
        hasher.update(strike.to_le_bytes());
        hasher.update(expiry.to_le_bytes());
        Self(hasher.finalize().into())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for MarketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for MarketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MarketId({})", self)
    }
}

impl FromStr for MarketId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_key(s).map(Self)
    }
}

macro_rules! hex_serde {
    ($ty:ty) => {
        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_string())
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

hex_serde!(Authority);
hex_serde!(MarketId);
