//! In-memory ledger.

use parking_lot::Mutex;
use std::collections::HashMap;

use super::LedgerStore;
use crate::error::{MarketError, MarketResult};
use crate::market::{Market, MarketId, Position, PositionId, Settlement, UnixSecs};

#[derive(Debug, Default)]
struct LedgerState {
    markets: HashMap<MarketId, Market>,
    positions: HashMap<PositionId, Position>,
}

/// Ledger held in process memory behind a single lock.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    state: Mutex<LedgerState>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LedgerStore for MemoryLedger {
    fn insert_market(&self, market: &Market) -> MarketResult<()> {
        let mut state = self.state.lock();
        if state.markets.contains_key(market.id()) {
            return Err(MarketError::DuplicateMarket {
                market_id: *market.id(),
            });
        }
        state.markets.insert(*market.id(), market.clone());
        Ok(())
    }

    fn market(&self, id: &MarketId) -> MarketResult<Option<Market>> {
        Ok(self.state.lock().markets.get(id).cloned())
    }

    fn markets(&self) -> MarketResult<Vec<Market>> {
        let mut markets: Vec<Market> = self.state.lock().markets.values().cloned().collect();
        markets.sort_by(|a, b| a.expiry().cmp(&b.expiry()).then(a.id().cmp(b.id())));
        Ok(markets)
    }

    fn settle_market(&self, id: &MarketId, settlement: &Settlement) -> MarketResult<Market> {
        let mut state = self.state.lock();
        let market = state
            .markets
            .get_mut(id)
            .ok_or(MarketError::MarketNotFound { market_id: *id })?;

        if !market.apply_settlement(settlement.clone()) {
            return Err(MarketError::AlreadyResolved { market_id: *id });
        }
        Ok(market.clone())
    }

    fn insert_position(&self, position: &Position) -> MarketResult<()> {
        let mut state = self.state.lock();
        let market = state
            .markets
            .get(&position.market_id)
            .ok_or(MarketError::MarketNotFound {
                market_id: position.market_id,
            })?;

        if market.is_resolved() {
            return Err(MarketError::StakingClosed {
                market_id: position.market_id,
            });
        }
        if state.positions.contains_key(&position.id) {
            return Err(MarketError::Storage(format!(
                "position {} already exists",
                position.id
            )));
        }
        state.positions.insert(position.id, position.clone());
        Ok(())
    }

    fn position(&self, id: &PositionId) -> MarketResult<Option<Position>> {
        Ok(self.state.lock().positions.get(id).cloned())
    }

    fn positions_for_market(&self, id: &MarketId) -> MarketResult<Vec<Position>> {
        let mut positions: Vec<Position> = self
            .state
            .lock()
            .positions
            .values()
            .filter(|p| &p.market_id == id)
            .cloned()
            .collect();
        positions.sort_by(|a, b| a.opened_at.cmp(&b.opened_at).then(a.id.cmp(&b.id)));
        Ok(positions)
    }

    fn mark_claimed(&self, id: &PositionId, payout: u64, claimed_at: UnixSecs) -> MarketResult<Position> {
        let mut state = self.state.lock();
        let position = state
            .positions
            .get_mut(id)
            .ok_or(MarketError::PositionNotFound { position_id: *id })?;

        if position.claimed {
            return Err(MarketError::AlreadyClaimed { position_id: *id });
        }
        position.claimed = true;
        position.payout = Some(payout);
        position.claimed_at = Some(claimed_at);
        Ok(position.clone())
    }
}
