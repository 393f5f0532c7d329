//! Market Lifecycle Controller
//!
//! Governs `Open -> Settled`:
//! - `create_market`: the authority opens a market (strike > 0, expiry in the future, unique identity)
//! - `open_position`: participants stake on a side while the market is open and unexpired
//! - `resolve`: anyone may trigger settlement once expired (delegates to `SettlementEngine`)
//! - `claim`: position holders redeem after settlement, once per position
//!
//! A market that passes expiry without resolution simply stays `Open`.

use std::sync::Arc;
use tracing::info;

use crate::clock::Clock;
use crate::error::{MarketError, MarketResult};
use crate::ledger::LedgerStore;
use crate::market::{
    format_price, Authority, Claim, FeedId, Market, MarketId, Outcome, PoolTotals, Position,
    PositionId, UnixSecs,
};
use crate::oracle::OracleAdapter;
use crate::payout::{PayoutCalculator, PayoutConfig, PayoutQuote};
use crate::settlement::{SettlementConfig, SettlementEngine, SettlementStats};

/// Parameters of a new market.
#[derive(Debug, Clone)]
pub struct CreateMarket {
    pub authority: Authority,
    /// Strike scaled by `PRICE_SCALE`.
    pub strike: u64,
    pub expiry: UnixSecs,
    pub oracle_feed: FeedId,
}

pub struct MarketController {
    ledger: Arc<dyn LedgerStore>,
    clock: Arc<dyn Clock>,
    settlement: SettlementEngine,
    payouts: PayoutCalculator,
}

impl MarketController {
    pub fn new(
        ledger: Arc<dyn LedgerStore>,
        oracle: Arc<dyn OracleAdapter>,
        clock: Arc<dyn Clock>,
        settlement_config: SettlementConfig,
        payout_config: PayoutConfig,
    ) -> Self {
        let settlement = SettlementEngine::new(ledger.clone(), oracle, clock.clone(), settlement_config);
        Self {
            ledger,
            clock,
            settlement,
            payouts: PayoutCalculator::new(payout_config),
        }
    }

    pub fn settlement_stats(&self) -> SettlementStats {
        self.settlement.stats()
    }

    // =========================================================================
    // Creation and reads
    // =========================================================================

    pub fn create_market(&self, request: CreateMarket) -> MarketResult<Market> {
        if request.strike == 0 {
            return Err(MarketError::InvalidStrike {
                strike: request.strike,
            });
        }

        let now = self.clock.now_unix_secs();
        if request.expiry <= now {
            return Err(MarketError::InvalidExpiry {
                expiry: request.expiry,
                now,
            });
        }

        let market = Market::open(
            request.authority,
            request.strike,
            request.expiry,
            request.oracle_feed,
            now,
        );
        self.ledger.insert_market(&market)?;

        info!(
            market = %market.id(),
            authority = %market.authority(),
            strike = %format_price(market.strike()),
            expiry = market.expiry(),
            feed = %market.oracle_feed(),
            "Market created"
        );
        Ok(market)
    }

    pub fn market(&self, id: &MarketId) -> MarketResult<Market> {
        self.ledger
            .market(id)?
            .ok_or(MarketError::MarketNotFound { market_id: *id })
    }

    pub fn markets(&self) -> MarketResult<Vec<Market>> {
        self.ledger.markets()
    }

    pub fn position(&self, id: &PositionId) -> MarketResult<Position> {
        self.ledger
            .position(id)?
            .ok_or(MarketError::PositionNotFound { position_id: *id })
    }

    pub fn positions(&self, market_id: &MarketId) -> MarketResult<Vec<Position>> {
        self.ledger.positions_for_market(market_id)
    }

    pub fn pools(&self, market_id: &MarketId) -> MarketResult<PoolTotals> {
        let positions = self.ledger.positions_for_market(market_id)?;
        PoolTotals::from_positions(&positions)
    }

    // =========================================================================
    // Positions
    // =========================================================================

    /// Stake `amount` on `side`. Only allowed before expiry on an open market.
    pub fn open_position(
        &self,
        market_id: &MarketId,
        owner: &str,
        side: Outcome,
        amount: u64,
    ) -> MarketResult<Position> {
        if amount == 0 {
            return Err(MarketError::InvalidStake { amount });
        }

        let market = self.market(market_id)?;
        let now = self.clock.now_unix_secs();
        if market.is_resolved() || market.is_expired(now) {
            return Err(MarketError::StakingClosed {
                market_id: *market_id,
            });
        }

        self.pools(market_id)?.with_stake(side, amount)?;

        let position = Position::open(*market_id, owner.to_string(), side, amount, now);
        self.ledger.insert_position(&position)?;

        info!(
            market = %market_id,
            position = %position.id,
            owner,
            %side,
            stake = amount,
            "Position opened"
        );
        Ok(position)
    }

    // =========================================================================
    // Resolution and claims
    // =========================================================================

    /// Permissionless resolution; see `SettlementEngine::resolve`.
    pub async fn resolve(&self, market_id: &MarketId) -> MarketResult<Outcome> {
        self.settlement.resolve(market_id).await
    }

    /// Quote a claim without paying it.
    pub fn quote_claim(&self, position_id: &PositionId) -> MarketResult<PayoutQuote> {
        let position = self.position(position_id)?;
        let market = self.market(&position.market_id)?;
        let pools = self.pools(&position.market_id)?;
        self.payouts.quote(&market, &position, &pools)
    }

    /// Pay out a position. Each position is claimable at most once.
    pub fn claim(&self, position_id: &PositionId) -> MarketResult<Claim> {
        let quote = self.quote_claim(position_id)?;

        // The ledger flag is authoritative; a concurrent claim loses here.
        self.ledger
            .mark_claimed(position_id, quote.net, self.clock.now_unix_secs())?;

        info!(
            position = %position_id,
            gross = quote.gross,
            fee = quote.fee,
            net = quote.net,
            "Position claimed"
        );
        Ok(Claim {
            position: *position_id,
            gross: quote.gross,
            fee: quote.fee,
            net: quote.net,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::ledger::MemoryLedger;
    use crate::oracle::ReplayOracle;

    const NOW: UnixSecs = 1_700_000_000;

    fn controller() -> (MarketController, Arc<ManualClock>, Arc<ReplayOracle>) {
        let clock = Arc::new(ManualClock::new(NOW));
        let oracle = Arc::new(ReplayOracle::new());
        let controller = MarketController::new(
            Arc::new(MemoryLedger::new()),
            oracle.clone(),
            clock.clone(),
            SettlementConfig::default(),
            PayoutConfig::default(),
        );
        (controller, clock, oracle)
    }

    fn request(strike: u64, expiry: UnixSecs) -> CreateMarket {
        CreateMarket {
            authority: Authority::from_seed("desk"),
            strike,
            expiry,
            oracle_feed: FeedId::new("SOL/USD"),
        }
    }

    #[test]
    fn test_create_validates_strike_and_expiry() {
        let (c, _, _) = controller();

        let err = c.create_market(request(0, NOW + 60)).unwrap_err();
        assert_eq!(err, MarketError::InvalidStrike { strike: 0 });

        let err = c.create_market(request(1, NOW)).unwrap_err();
        assert_eq!(err, MarketError::InvalidExpiry { expiry: NOW, now: NOW });

        let err = c.create_market(request(1, NOW - 1)).unwrap_err();
        assert!(matches!(err, MarketError::InvalidExpiry { .. }));

        assert!(c.markets().unwrap().is_empty());
    }

    #[test]
    fn test_create_duplicate_rejected() {
        let (c, clock, _) = controller();
        let first = c.create_market(request(25_000_000_000, NOW + 3_600)).unwrap();

        clock.advance(10);
        let mut dup = request(25_000_000_000, NOW + 3_600);
        dup.oracle_feed = FeedId::new("BTC/USD");
        let err = c.create_market(dup).unwrap_err();
        assert_eq!(err, MarketError::DuplicateMarket { market_id: *first.id() });

        // Original entry unchanged
        assert_eq!(c.market(first.id()).unwrap(), first);
    }

    #[test]
    fn test_staking_window() {
        let (c, clock, _) = controller();
        let market = c.create_market(request(25_000_000_000, NOW + 3_600)).unwrap();

        let err = c.open_position(market.id(), "alice", Outcome::Above, 0).unwrap_err();
        assert_eq!(err, MarketError::InvalidStake { amount: 0 });

        c.open_position(market.id(), "alice", Outcome::Above, 100).unwrap();
        c.open_position(market.id(), "bob", Outcome::Below, 50).unwrap();
        assert_eq!(c.pools(market.id()).unwrap(), PoolTotals { above: 100, below: 50 });

        clock.advance_to(NOW + 3_600);
        let err = c.open_position(market.id(), "carol", Outcome::Below, 10).unwrap_err();
        assert!(matches!(err, MarketError::StakingClosed { .. }));
    }

    #[tokio::test]
    async fn test_claim_requires_settlement() {
        let (c, _, _) = controller();
        let market = c.create_market(request(25_000_000_000, NOW + 3_600)).unwrap();
        let p = c.open_position(market.id(), "alice", Outcome::Above, 100).unwrap();

        let err = c.claim(&p.id).unwrap_err();
        assert!(matches!(err, MarketError::MarketNotSettled { .. }));
        assert!(!c.position(&p.id).unwrap().claimed);
    }

    #[tokio::test]
    async fn test_full_lifecycle_with_claims() {
        let (c, clock, oracle) = controller();
        let market = c.create_market(request(25_000_000_000, NOW + 3_600)).unwrap();

        let alice = c.open_position(market.id(), "alice", Outcome::Above, 300).unwrap();
        let bob = c.open_position(market.id(), "bob", Outcome::Below, 600).unwrap();
        let carol = c.open_position(market.id(), "carol", Outcome::Above, 100).unwrap();

        clock.advance_to(NOW + 3_700);
        oracle.record(FeedId::new("SOL/USD"), NOW + 3_601, 30_000_000_000);
        assert_eq!(c.resolve(market.id()).await.unwrap(), Outcome::Above);

        assert_eq!(c.claim(&alice.id).unwrap().net, 750);
        assert_eq!(c.claim(&carol.id).unwrap().net, 250);
        assert_eq!(c.claim(&bob.id).unwrap().net, 0);

        let err = c.claim(&alice.id).unwrap_err();
        assert_eq!(err, MarketError::AlreadyClaimed { position_id: alice.id });
        assert_eq!(c.position(&alice.id).unwrap().payout, Some(750));
    }

    #[tokio::test]
    async fn test_claim_with_oversized_fee_pays_nothing() {
        let clock = Arc::new(ManualClock::new(NOW));
        let oracle = Arc::new(ReplayOracle::new());
        let c = MarketController::new(
            Arc::new(MemoryLedger::new()),
            oracle.clone(),
            clock.clone(),
            SettlementConfig::default(),
            PayoutConfig { fee_bps: 20_000 },
        );
        let market = c.create_market(request(25_000_000_000, NOW + 60)).unwrap();
        let alice = c.open_position(market.id(), "alice", Outcome::Above, 100).unwrap();

        clock.advance_to(NOW + 61);
        oracle.record(FeedId::new("SOL/USD"), NOW + 61, 30_000_000_000);
        c.resolve(market.id()).await.unwrap();

        let claim = c.claim(&alice.id).unwrap();
        assert_eq!((claim.gross, claim.fee, claim.net), (100, 100, 0));
    }

    #[test]
    fn test_stake_overflowing_pool_rejected() {
        let (c, _, _) = controller();
        let market = c.create_market(request(25_000_000_000, NOW + 3_600)).unwrap();
        c.open_position(market.id(), "alice", Outcome::Above, u64::MAX - 5).unwrap();

        let err = c.open_position(market.id(), "bob", Outcome::Below, 6).unwrap_err();
        assert!(matches!(err, MarketError::ArithmeticOverflow { .. }));
        assert_eq!(c.positions(market.id()).unwrap().len(), 1);

        c.open_position(market.id(), "bob", Outcome::Below, 5).unwrap();
        assert_eq!(c.pools(market.id()).unwrap().total(), u64::MAX as u128);
    }

    #[test]
    fn test_unknown_position() {
        let (c, _, _) = controller();
        let id = PositionId::new_random();
        assert_eq!(
            c.claim(&id).unwrap_err(),
            MarketError::PositionNotFound { position_id: id }
        );
    }
}
