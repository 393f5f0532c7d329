//! Settlement Engine for Binary-Options Markets
//!
//! Resolution semantics:
//! - A market resolves no earlier than its expiry, and at most once
//! - The oracle is consulted once per attempt for the first observation at or after expiry
//! - Above wins if price > strike; a price equal to the strike resolves Below
//! - The final ledger write is the only serialization point: concurrent attempts may all
//!   query the oracle, but exactly one settlement is stored and the rest see AlreadyResolved
//!
//! Failed attempts never mutate the market and are never retried here.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::error::{MarketError, MarketResult};
use crate::ledger::LedgerStore;
use crate::market::{format_price, Market, MarketId, Outcome, Settlement, UnixSecs};
use crate::oracle::{OracleAdapter, OracleError, PriceObservation};

// =============================================================================
// Configuration
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementConfig {
    /// Reject observations published later than `expiry + lag` as stale.
    /// `None` accepts any observation at or after expiry.
    #[serde(default)]
    pub max_observation_lag_secs: Option<i64>,
}

// =============================================================================
// Outcome Determination
// =============================================================================

/// Strict comparison; a tie resolves `Below`.
pub fn determine_outcome(strike: u64, price: u64) -> Outcome {
    if price > strike {
        Outcome::Above
    } else {
        Outcome::Below
    }
}

// =============================================================================
// Statistics
// =============================================================================

/// Settlement statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementStats {
    pub attempts: u64,
    pub markets_settled: u64,
    pub above_wins: u64,
    pub below_wins: u64,
    pub ties: u64,
    pub early_attempts: u64,
    pub duplicate_attempts: u64,
    pub stale_oracle: u64,
    pub oracle_unavailable: u64,
}

impl SettlementStats {
    fn record_failure(&mut self, err: &MarketError) {
        match err {
            MarketError::NotYetExpired { .. } => self.early_attempts += 1,
            MarketError::AlreadyResolved { .. } => self.duplicate_attempts += 1,
            MarketError::StaleOracleData { .. } => self.stale_oracle += 1,
            MarketError::OracleUnavailable { .. } => self.oracle_unavailable += 1,
            _ => {}
        }
    }
}

// =============================================================================
// Settlement Engine
// =============================================================================

/// Resolves expired markets against the injected oracle and ledger.
pub struct SettlementEngine {
    ledger: Arc<dyn LedgerStore>,
    oracle: Arc<dyn OracleAdapter>,
    clock: Arc<dyn Clock>,
    config: SettlementConfig,
    stats: Mutex<SettlementStats>,
}

impl SettlementEngine {
    pub fn new(
        ledger: Arc<dyn LedgerStore>,
        oracle: Arc<dyn OracleAdapter>,
        clock: Arc<dyn Clock>,
        config: SettlementConfig,
    ) -> Self {
        Self {
            ledger,
            oracle,
            clock,
            config,
            stats: Mutex::new(SettlementStats::default()),
        }
    }

    pub fn stats(&self) -> SettlementStats {
        self.stats.lock().clone()
    }

    /// Resolve a market and return its fixed outcome.
    pub async fn resolve(&self, market_id: &MarketId) -> MarketResult<Outcome> {
        let market = self.settle(market_id).await?;
        market
            .outcome()
            .ok_or_else(|| MarketError::Storage(format!("market {} settled without outcome", market_id)))
    }

    /// Resolve a market and return the settled record.
    pub async fn settle(&self, market_id: &MarketId) -> MarketResult<Market> {
        self.stats.lock().attempts += 1;

        let result = self.try_settle(market_id).await;
        match &result {
            Ok(market) => {
                let mut stats = self.stats.lock();
                stats.markets_settled += 1;
                match market.outcome() {
                    Some(Outcome::Above) => stats.above_wins += 1,
                    Some(Outcome::Below) => stats.below_wins += 1,
                    None => {}
                }
                if market.settlement().map(|s| s.price) == Some(market.strike()) {
                    stats.ties += 1;
                }
            }
            Err(err) => {
                self.stats.lock().record_failure(err);
                debug!(market = %market_id, kind = err.kind(), error = %err, "Resolution rejected");
            }
        }
        result
    }

    async fn try_settle(&self, market_id: &MarketId) -> MarketResult<Market> {
        let market = self
            .ledger
            .market(market_id)?
            .ok_or(MarketError::MarketNotFound { market_id: *market_id })?;

        if market.is_resolved() {
            return Err(MarketError::AlreadyResolved { market_id: *market_id });
        }

        let now = self.clock.now_unix_secs();
        if now < market.expiry() {
            return Err(MarketError::NotYetExpired {
                market_id: *market_id,
                expiry: market.expiry(),
                now,
            });
        }

        // The only suspension point. The market stays unresolved while we wait.
        let observation = self
            .oracle
            .price_at_or_after(market.oracle_feed(), market.expiry())
            .await
            .map_err(|e| self.map_oracle_error(&market, e))?;

        self.validate_observation(&market, &observation)?;

        let outcome = determine_outcome(market.strike(), observation.price);
        let settlement = Settlement {
            outcome,
            price: observation.price,
            observed_at: observation.observed_at,
            resolved_at: self.clock.now_unix_secs(),
        };

        let settled = self.ledger.settle_market(market_id, &settlement)?;

        info!(
            market = %market_id,
            %outcome,
            strike = %format_price(market.strike()),
            price = %format_price(observation.price),
            observed_at = observation.observed_at,
            oracle = self.oracle.name(),
            "Market settled"
        );

        Ok(settled)
    }

    fn validate_observation(&self, market: &Market, obs: &PriceObservation) -> MarketResult<()> {
        let stale = |observed_at: UnixSecs| MarketError::StaleOracleData {
            market_id: *market.id(),
            expiry: market.expiry(),
            observed_at: Some(observed_at),
        };

        if obs.observed_at < market.expiry() {
            warn!(
                market = %market.id(),
                observed_at = obs.observed_at,
                expiry = market.expiry(),
                "Oracle returned a pre-expiry observation"
            );
            return Err(stale(obs.observed_at));
        }

        if let Some(max_lag) = self.config.max_observation_lag_secs {
            if obs.observed_at - market.expiry() > max_lag {
                warn!(
                    market = %market.id(),
                    observed_at = obs.observed_at,
                    expiry = market.expiry(),
                    max_lag,
                    "Oracle observation too far after expiry"
                );
                return Err(stale(obs.observed_at));
            }
        }

        Ok(())
    }

    fn map_oracle_error(&self, market: &Market, err: OracleError) -> MarketError {
        match err {
            OracleError::NoDataAtOrAfter { .. } => MarketError::StaleOracleData {
                market_id: *market.id(),
                expiry: market.expiry(),
                observed_at: None,
            },
            OracleError::FeedNotFound { feed } => MarketError::OracleUnavailable {
                feed,
                reason: "feed not found".to_string(),
            },
            OracleError::Unavailable { feed, reason } => {
                MarketError::OracleUnavailable { feed, reason }
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::ledger::MemoryLedger;
    use crate::market::{Authority, FeedId};
    use crate::oracle::ReplayOracle;

    const EXPIRY: UnixSecs = 1_700_003_600;
    const STRIKE: u64 = 25_000_000_000;

    struct Harness {
        ledger: Arc<MemoryLedger>,
        oracle: Arc<ReplayOracle>,
        clock: Arc<ManualClock>,
        engine: SettlementEngine,
        market_id: MarketId,
    }

    fn harness(config: SettlementConfig) -> Harness {
        let ledger = Arc::new(MemoryLedger::new());
        let oracle = Arc::new(ReplayOracle::new());
        let clock = Arc::new(ManualClock::new(EXPIRY - 3_600));

        let market = Market::open(
            Authority::from_seed("desk"),
            STRIKE,
            EXPIRY,
            FeedId::new("SOL/USD"),
            clock.now_unix_secs(),
        );
        ledger.insert_market(&market).unwrap();

        let engine = SettlementEngine::new(ledger.clone(), oracle.clone(), clock.clone(), config);
        Harness {
            ledger,
            oracle,
            clock,
            engine,
            market_id: *market.id(),
        }
    }

    fn feed() -> FeedId {
        FeedId::new("SOL/USD")
    }

    #[test]
    fn test_determine_outcome() {
        assert_eq!(determine_outcome(STRIKE, STRIKE + 1), Outcome::Above);
        assert_eq!(determine_outcome(STRIKE, STRIKE - 1), Outcome::Below);
    }

    #[test]
    fn test_determine_outcome_tie_is_below() {
        assert_eq!(determine_outcome(STRIKE, STRIKE), Outcome::Below);
    }

    #[tokio::test]
    async fn test_resolve_before_expiry_fails() {
        let h = harness(SettlementConfig::default());
        h.oracle.record(feed(), EXPIRY + 1, 30_000_000_000);
        h.clock.advance_to(EXPIRY - 1);

        let err = h.engine.resolve(&h.market_id).await.unwrap_err();
        assert!(matches!(err, MarketError::NotYetExpired { now, .. } if now == EXPIRY - 1));
        assert!(!h.ledger.market(&h.market_id).unwrap().unwrap().is_resolved());
        assert_eq!(h.engine.stats().early_attempts, 1);
    }

    #[tokio::test]
    async fn test_resolve_exactly_at_expiry() {
        let h = harness(SettlementConfig::default());
        h.oracle.record(feed(), EXPIRY, 30_000_000_000);
        h.clock.advance_to(EXPIRY);

        assert_eq!(h.engine.resolve(&h.market_id).await.unwrap(), Outcome::Above);
    }

    #[tokio::test]
    async fn test_resolve_ignores_pre_expiry_prices() {
        let h = harness(SettlementConfig::default());
        // Above the strike before expiry, below it after
        h.oracle.record(feed(), EXPIRY - 1, 40_000_000_000);
        h.oracle.record(feed(), EXPIRY + 5, 20_000_000_000);
        h.clock.advance_to(EXPIRY + 10);

        assert_eq!(h.engine.resolve(&h.market_id).await.unwrap(), Outcome::Below);
        let market = h.ledger.market(&h.market_id).unwrap().unwrap();
        assert_eq!(market.settlement().unwrap().observed_at, EXPIRY + 5);
        assert_eq!(market.settlement().unwrap().resolved_at, EXPIRY + 10);
    }

    #[tokio::test]
    async fn test_tie_resolves_below() {
        let h = harness(SettlementConfig::default());
        h.oracle.record(feed(), EXPIRY + 1, STRIKE);
        h.clock.advance_to(EXPIRY + 2);

        assert_eq!(h.engine.resolve(&h.market_id).await.unwrap(), Outcome::Below);
        assert_eq!(h.engine.stats().ties, 1);
    }

    #[tokio::test]
    async fn test_second_resolve_fails_and_keeps_outcome() {
        let h = harness(SettlementConfig::default());
        h.oracle.record(feed(), EXPIRY + 1, 30_000_000_000);
        h.clock.advance_to(EXPIRY + 2);

        assert_eq!(h.engine.resolve(&h.market_id).await.unwrap(), Outcome::Above);

        // A later, lower price must not flip the outcome
        h.oracle.record(feed(), EXPIRY, 1);
        let err = h.engine.resolve(&h.market_id).await.unwrap_err();
        assert!(matches!(err, MarketError::AlreadyResolved { .. }));
        assert_eq!(
            h.ledger.market(&h.market_id).unwrap().unwrap().outcome(),
            Some(Outcome::Above)
        );

        let stats = h.engine.stats();
        assert_eq!(stats.attempts, 2);
        assert_eq!(stats.markets_settled, 1);
        assert_eq!(stats.duplicate_attempts, 1);
    }

    #[tokio::test]
    async fn test_missing_oracle_data_is_stale_and_retryable() {
        let h = harness(SettlementConfig::default());
        h.oracle.record(feed(), EXPIRY - 10, 30_000_000_000);
        h.clock.advance_to(EXPIRY + 5);

        let err = h.engine.resolve(&h.market_id).await.unwrap_err();
        assert!(matches!(err, MarketError::StaleOracleData { observed_at: None, .. }));
        assert!(!h.ledger.market(&h.market_id).unwrap().unwrap().is_resolved());

        // Feed catches up; caller retries
        h.oracle.record(feed(), EXPIRY + 3, 24_000_000_000);
        assert_eq!(h.engine.resolve(&h.market_id).await.unwrap(), Outcome::Below);
    }

    #[tokio::test]
    async fn test_unknown_feed_is_oracle_unavailable() {
        let h = harness(SettlementConfig::default());
        h.clock.advance_to(EXPIRY + 5);

        let err = h.engine.resolve(&h.market_id).await.unwrap_err();
        assert!(matches!(err, MarketError::OracleUnavailable { .. }));
        assert_eq!(h.engine.stats().oracle_unavailable, 1);
    }

    #[tokio::test]
    async fn test_max_observation_lag() {
        let h = harness(SettlementConfig {
            max_observation_lag_secs: Some(120),
        });
        h.oracle.record(feed(), EXPIRY + 121, 30_000_000_000);
        h.clock.advance_to(EXPIRY + 200);

        let err = h.engine.resolve(&h.market_id).await.unwrap_err();
        assert!(matches!(err, MarketError::StaleOracleData { observed_at: Some(t), .. } if t == EXPIRY + 121));
        assert_eq!(h.engine.stats().stale_oracle, 1);
    }

    #[tokio::test]
    async fn test_unknown_market() {
        let h = harness(SettlementConfig::default());
        let other = MarketId::derive(&Authority::from_seed("other"), 1, 1);

        let err = h.engine.resolve(&other).await.unwrap_err();
        assert!(matches!(err, MarketError::MarketNotFound { .. }));
    }
}
