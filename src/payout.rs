//! Payout Calculator
//!
//! Parimutuel payoff for settled markets. The full pool (both sides) is
//! shared among winning-side stakes in proportion to stake size:
//!
//! `gross = stake * (pool_above + pool_below) / winning_pool` (floor)
//! `fee   = gross * fee_bps / 10_000` (floor)
//! `net   = gross - fee`
//!
//! Losing-side stakes pay zero. When nobody backed the winning side, every
//! stake is refunded at face value with no fee.
//!
//! The calculator is pure arithmetic; claim bookkeeping (the write-once
//! `claimed` flag) lives in the ledger.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{MarketError, MarketResult};
use crate::market::{Market, PoolTotals, Position};

pub const BPS_DENOMINATOR: u64 = 10_000;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutConfig {
    /// Fee withheld from winning payouts, in basis points.
    #[serde(default)]
    pub fee_bps: u16,
}

/// Amounts owed to one position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutQuote {
    pub gross: u64,
    pub fee: u64,
    pub net: u64,
}

#[derive(Debug, Clone, Default)]
pub struct PayoutCalculator {
    config: PayoutConfig,
}

impl PayoutCalculator {
    /// A fee above 100% is capped at 100%.
    pub fn new(mut config: PayoutConfig) -> Self {
        if config.fee_bps as u64 > BPS_DENOMINATOR {
            warn!(fee_bps = config.fee_bps, "Payout fee above 100%; capping at {} bps", BPS_DENOMINATOR);
            config.fee_bps = BPS_DENOMINATOR as u16;
        }
        Self { config }
    }

    /// Quote what `position` is owed on a settled market.
    ///
    /// Fails `MarketNotSettled` if the market has no outcome yet, and
    /// `AlreadyClaimed` if the position was paid before.
    pub fn quote(&self, market: &Market, position: &Position, pools: &PoolTotals) -> MarketResult<PayoutQuote> {
        let outcome = market.outcome().ok_or(MarketError::MarketNotSettled {
            market_id: *market.id(),
        })?;

        if position.claimed {
            return Err(MarketError::AlreadyClaimed {
                position_id: position.id,
            });
        }

        let winning_pool = pools.side(outcome);
        if winning_pool == 0 {
            return Ok(PayoutQuote {
                gross: position.stake,
                fee: 0,
                net: position.stake,
            });
        }

        if position.side != outcome {
            return Ok(PayoutQuote::default());
        }

        let gross = self.gross_payout(position.stake, winning_pool, pools.total())?;
        let fee = ((gross as u128 * self.config.fee_bps as u128) / BPS_DENOMINATOR as u128) as u64;

        Ok(PayoutQuote {
            gross,
            fee,
            net: gross - fee,
        })
    }

    fn gross_payout(&self, stake: u64, winning_pool: u64, total_pool: u128) -> MarketResult<u64> {
        let gross = stake as u128 * total_pool / winning_pool as u128;
        u64::try_from(gross).map_err(|_| MarketError::ArithmeticOverflow {
            context: format!("payout {} for stake {}", gross, stake),
        })
    }
}
