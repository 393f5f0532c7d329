//! Market Ledger Storage
//!
//! The ledger-access client injected into the lifecycle controller and the
//! settlement engine. Every mutating call is a single atomic step against
//! the stored record:
//!
//! - `insert_market`: rejects a colliding identity without touching the existing entry
//! - `settle_market`: compare-and-set on "not yet resolved" (the only
//!   serialization point between concurrent resolutions)
//! - `insert_position`: only while the market is unsettled
//! - `mark_claimed`: compare-and-set on "not yet claimed"

pub mod memory;
pub mod sqlite;

pub use memory::MemoryLedger;
pub use sqlite::{LedgerStorageConfig, SqliteLedger};

use crate::error::MarketResult;
use crate::market::{Market, MarketId, Position, PositionId, Settlement, UnixSecs};

pub trait LedgerStore: Send + Sync {
    /// Insert a new market. Fails `DuplicateMarket` if the id exists.
    fn insert_market(&self, market: &Market) -> MarketResult<()>;

    fn market(&self, id: &MarketId) -> MarketResult<Option<Market>>;

    /// All markets, ordered by expiry.
    fn markets(&self) -> MarketResult<Vec<Market>>;

    /// Atomically attach the settlement to an unresolved market.
    ///
    /// Fails `AlreadyResolved` if another settlement won, `MarketNotFound`
    /// if the id is unknown. Returns the settled market.
    fn settle_market(&self, id: &MarketId, settlement: &Settlement) -> MarketResult<Market>;

    /// Record a position. Fails `StakingClosed` if the market is settled.
    fn insert_position(&self, position: &Position) -> MarketResult<()>;

    fn position(&self, id: &PositionId) -> MarketResult<Option<Position>>;

    fn positions_for_market(&self, id: &MarketId) -> MarketResult<Vec<Position>>;

    /// Atomically flip the claimed flag and store the paid amount.
    ///
    /// Fails `AlreadyClaimed` if the position was claimed before.
    fn mark_claimed(&self, id: &PositionId, payout: u64, claimed_at: UnixSecs) -> MarketResult<Position>;
}
