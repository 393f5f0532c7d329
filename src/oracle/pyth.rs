//! Pyth Hermes Oracle Adapter
//!
//! Queries the Hermes REST API for the first price update published at or
//! after a timestamp:
//!
//! `GET {base}/v2/updates/price/{publish_time}?ids[]={feed_id}&parsed=true`
//!
//! Pyth prices are `(price, expo)` pairs meaning `price * 10^expo`; they are
//! rescaled to the market's 9-decimal fixed point before leaving the adapter.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

use super::feeds::resolve_pyth_feed_id;
use super::{OracleAdapter, OracleError, PriceObservation};
use crate::market::{FeedId, UnixSecs, PRICE_DECIMALS};

pub const DEFAULT_HERMES_URL: &str = "https://hermes.pyth.network";

/// Rescale a Pyth `(price, expo)` pair to `PRICE_DECIMALS` fixed point.
///
/// Returns `None` for non-positive prices or values that overflow `u64`.
/// Extra precision beyond 9 decimals is truncated.
pub fn normalize_price(raw: i64, expo: i32) -> Option<u64> {
    if raw <= 0 {
        return None;
    }
    let raw = raw as u64;
    let shift = PRICE_DECIMALS as i32 + expo;
    if shift >= 0 {
        10u64.checked_pow(shift as u32)?.checked_mul(raw)
    } else {
        let divisor = 10u64.checked_pow(shift.unsigned_abs())?;
        Some(raw / divisor)
    }
}

// =============================================================================
// Hermes wire format
// =============================================================================

#[derive(Debug, Deserialize)]
struct HermesResponse {
    #[serde(default)]
    parsed: Vec<HermesParsedUpdate>,
}

#[derive(Debug, Deserialize)]
struct HermesParsedUpdate {
    id: String,
    price: HermesPrice,
}

#[derive(Debug, Deserialize)]
struct HermesPrice {
    /// Integer price, encoded as a decimal string.
    price: String,
    #[allow(dead_code)]
    conf: String,
    expo: i32,
    publish_time: i64,
}

fn decode_response(
    feed: &FeedId,
    pyth_id: &str,
    at: UnixSecs,
    response: HermesResponse,
) -> Result<PriceObservation, OracleError> {
    let update = response
        .parsed
        .into_iter()
        .find(|u| u.id.trim_start_matches("0x").eq_ignore_ascii_case(pyth_id))
        .ok_or_else(|| OracleError::NoDataAtOrAfter {
            feed: feed.clone(),
            at,
        })?;

    let raw: i64 = update
        .price
        .price
        .parse()
        .map_err(|e| OracleError::Unavailable {
            feed: feed.clone(),
            reason: format!("invalid price '{}': {}", update.price.price, e),
        })?;

    let price = normalize_price(raw, update.price.expo).ok_or_else(|| OracleError::Unavailable {
        feed: feed.clone(),
        reason: format!("unusable price {} * 10^{}", raw, update.price.expo),
    })?;

    Ok(PriceObservation {
        feed: feed.clone(),
        price,
        observed_at: update.price.publish_time,
    })
}

// =============================================================================
// Adapter
// =============================================================================

/// Live Pyth oracle over the Hermes HTTP API.
pub struct HermesOracle {
    client: reqwest::Client,
    base_url: String,
    aliases: HashMap<String, String>,
}

impl HermesOracle {
    pub fn new(base_url: &str, timeout: Duration, aliases: HashMap<String, String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            aliases,
        })
    }

    fn unavailable(feed: &FeedId, reason: impl Into<String>) -> OracleError {
        OracleError::Unavailable {
            feed: feed.clone(),
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl OracleAdapter for HermesOracle {
    async fn price_at_or_after(
        &self,
        feed: &FeedId,
        at: UnixSecs,
    ) -> Result<PriceObservation, OracleError> {
        let pyth_id = resolve_pyth_feed_id(feed, &self.aliases)
            .ok_or_else(|| OracleError::FeedNotFound { feed: feed.clone() })?;

        let url = format!("{}/v2/updates/price/{}", self.base_url, at);
        debug!(%feed, %pyth_id, at, "Querying Hermes");

        let response = self
            .client
            .get(&url)
            .query(&[("ids[]", pyth_id.as_str()), ("parsed", "true")])
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Self::unavailable(feed, "request timed out")
                } else {
                    Self::unavailable(feed, format!("request failed: {}", e))
                }
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(OracleError::NoDataAtOrAfter {
                feed: feed.clone(),
                at,
            });
        }
        if !status.is_success() {
            warn!(%feed, %status, "Hermes returned an error status");
            return Err(Self::unavailable(feed, format!("HTTP {}", status)));
        }

        let body: HermesResponse = response
            .json()
            .await
            .map_err(|e| Self::unavailable(feed, format!("failed to parse response: {}", e)))?;

        decode_response(feed, &pyth_id, at, body)
    }

    fn name(&self) -> &str {
        "pyth-hermes"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::KnownFeed;

    #[test]
    fn test_normalize_price_scales() {
        // 150.12345678 with expo -8 -> 9 decimals
        assert_eq!(normalize_price(15_012_345_678, -8), Some(150_123_456_780));
        // Finer than 9 decimals is truncated
        assert_eq!(normalize_price(1_234_567_890_123, -12), Some(1_234_567_890));
        // Positive exponent
        assert_eq!(normalize_price(25, 0), Some(25_000_000_000));
    }

    #[test]
    fn test_normalize_price_rejects_unusable() {
        assert_eq!(normalize_price(0, -8), None);
        assert_eq!(normalize_price(-5, -8), None);
        assert_eq!(normalize_price(i64::MAX, 5), None);
    }

    fn sample_body(id: &str, price: &str, expo: i32, publish_time: i64) -> HermesResponse {
        let json = format!(
            r#"{{
                "binary": {{"encoding": "hex", "data": []}},
                "parsed": [{{
                    "id": "{id}",
                    "price": {{"price": "{price}", "conf": "1200000", "expo": {expo}, "publish_time": {publish_time}}},
                    "ema_price": {{"price": "{price}", "conf": "1300000", "expo": {expo}, "publish_time": {publish_time}}},
                    "metadata": {{"slot": 1, "proof_available_time": {publish_time}, "prev_publish_time": {publish_time}}}
                }}]
            }}"#
        );
        serde_json::from_str(&json).unwrap()
    }

    #[test]
    fn test_decode_hermes_response() {
        let feed = KnownFeed::SolUsd.feed_id();
        let id = KnownFeed::SolUsd.pyth_id();
        let body = sample_body(id, "3000000000", -8, 1_700_003_601);

        let obs = decode_response(&feed, id, 1_700_003_600, body).unwrap();
        assert_eq!(obs.price, 30_000_000_000);
        assert_eq!(obs.observed_at, 1_700_003_601);
        assert_eq!(obs.feed, feed);
    }

    #[test]
    fn test_decode_missing_feed_is_no_data() {
        let feed = KnownFeed::SolUsd.feed_id();
        let body = sample_body(KnownFeed::BtcUsd.pyth_id(), "3000000000", -8, 10);

        let err = decode_response(&feed, KnownFeed::SolUsd.pyth_id(), 5, body).unwrap_err();
        assert!(matches!(err, OracleError::NoDataAtOrAfter { at: 5, .. }));
    }

    #[test]
    fn test_decode_negative_price_unavailable() {
        let feed = KnownFeed::EthUsd.feed_id();
        let id = KnownFeed::EthUsd.pyth_id();
        let body = sample_body(id, "-1", -8, 10);

        let err = decode_response(&feed, id, 5, body).unwrap_err();
        assert!(matches!(err, OracleError::Unavailable { .. }));
    }

    #[tokio::test]
    async fn test_unknown_feed_is_not_found() {
        let oracle = HermesOracle::new(DEFAULT_HERMES_URL, Duration::from_secs(1), HashMap::new()).unwrap();
        let err = oracle
            .price_at_or_after(&FeedId::new("DOGE/USD"), 0)
            .await
            .unwrap_err();
        assert!(matches!(err, OracleError::FeedNotFound { .. }));
    }
}
