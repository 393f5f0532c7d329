//! Known Pyth price feeds.
//!
//! Markets reference feeds by an opaque `FeedId`. Symbolic ids such as
//! `"SOL/USD"` map to Pyth feed ids here; a raw 64-hex id passes through.
//! See https://pyth.network/developers/price-feed-ids for the full list.

use std::collections::HashMap;

use crate::market::FeedId;

/// Assets with built-in Pyth feed ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KnownFeed {
    BtcUsd,
    SolUsd,
    EthUsd,
}

impl KnownFeed {
    pub const ALL: [KnownFeed; 3] = [Self::BtcUsd, Self::SolUsd, Self::EthUsd];

    pub fn symbol(&self) -> &'static str {
        match self {
            Self::BtcUsd => "BTC/USD",
            Self::SolUsd => "SOL/USD",
            Self::EthUsd => "ETH/USD",
        }
    }

    /// Pyth price feed id (hex, no 0x prefix).
    pub fn pyth_id(&self) -> &'static str {
        match self {
            Self::BtcUsd => "e62df6c8b4a85fe1a67db44dc12de5db330f7ac66b72dc658afedf0f4a415b43",
            Self::SolUsd => "ef0d8b6fda2ceba41da15d4095d1da392a0d2f8ed0c6c7bc0f4cfac8c280b56d",
            Self::EthUsd => "ff61491a931112ddf1bd8147cd1b641375f79f5825126d665480874634fd0ace",
        }
    }

    pub fn feed_id(&self) -> FeedId {
        FeedId::new(self.symbol())
    }

    /// Accepts "BTC/USD", "btc", "BTCUSD" and similar spellings.
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        let normalized: String = symbol
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_uppercase();
        match normalized.as_str() {
            "BTC" | "BTCUSD" => Some(Self::BtcUsd),
            "SOL" | "SOLUSD" => Some(Self::SolUsd),
            "ETH" | "ETHUSD" => Some(Self::EthUsd),
            _ => None,
        }
    }
}

fn is_raw_feed_id(s: &str) -> bool {
    let s = s.trim_start_matches("0x");
    s.len() == 64 && s.chars().all(|c| c.is_ascii_hexdigit())
}

/// Resolve a market feed to a Pyth feed id.
///
/// Lookup order: configured aliases, raw hex ids, built-in symbols.
pub fn resolve_pyth_feed_id(feed: &FeedId, aliases: &HashMap<String, String>) -> Option<String> {
    if let Some(id) = aliases.get(feed.as_str()) {
        return Some(id.trim_start_matches("0x").to_lowercase());
    }
    if is_raw_feed_id(feed.as_str()) {
        return Some(feed.as_str().trim_start_matches("0x").to_lowercase());
    }
    KnownFeed::from_symbol(feed.as_str()).map(|k| k.pyth_id().to_string())
}
