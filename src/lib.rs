//! Binary Options Market Library
//!
//! Single-strike, single-expiry binary markets settled against an oracle:
//! creation, write-once settlement, and parimutuel claims.
//! Ledger, oracle and clock are injected; nothing reads global state.

pub mod clock;
pub mod config;
pub mod error;
pub mod ledger;
pub mod lifecycle;
pub mod market;
pub mod oracle;
pub mod payout;
pub mod settlement;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{AppConfig, ConfigViolation};
pub use error::{MarketError, MarketResult};
pub use ledger::{LedgerStore, MemoryLedger, SqliteLedger};
pub use lifecycle::{CreateMarket, MarketController};
pub use market::{
    Authority, Claim, FeedId, Market, MarketId, MarketState, MarketView, Outcome, PoolTotals,
    Position, PositionId, Settlement, UnixSecs, PRICE_DECIMALS, PRICE_SCALE,
};
pub use oracle::{HermesOracle, OracleAdapter, OracleError, PriceObservation, ReplayOracle};
pub use payout::{PayoutCalculator, PayoutConfig, PayoutQuote};
pub use settlement::{determine_outcome, SettlementConfig, SettlementEngine, SettlementStats};
