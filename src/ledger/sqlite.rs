//! SQLite Market Ledger
//!
//! Persistent ledger with:
//! - WAL mode for concurrent readers
//! - Conditional UPDATEs as the compare-and-set for settlement and claims
//! - A CHECK constraint tying `resolved` to the presence of an outcome

use parking_lot::Mutex;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Row};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use super::LedgerStore;
use crate::error::{MarketError, MarketResult};
use crate::market::{
    Authority, FeedId, Market, MarketId, Outcome, Position, PositionId, Settlement, UnixSecs,
};

// =============================================================================
// Configuration
// =============================================================================

/// Storage configuration.
#[derive(Debug, Clone)]
pub struct LedgerStorageConfig {
    /// Path to SQLite database file.
    pub db_path: String,
    /// Enable WAL mode for better concurrency.
    pub wal_mode: bool,
}

impl Default for LedgerStorageConfig {
    fn default() -> Self {
        Self {
            db_path: "binopt_ledger.db".to_string(),
            wal_mode: true,
        }
    }
}

// =============================================================================
// Storage Schema
// =============================================================================

const SCHEMA_SQL: &str = r#"
PRAGMA synchronous = NORMAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS markets (
    id TEXT PRIMARY KEY,
    authority TEXT NOT NULL,
    strike INTEGER NOT NULL,
    expiry INTEGER NOT NULL,
    oracle_feed TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    resolved INTEGER NOT NULL DEFAULT 0,
    outcome TEXT,
    settle_price INTEGER,
    observed_at INTEGER,
    resolved_at INTEGER,
    CHECK ((resolved = 0 AND outcome IS NULL) OR (resolved = 1 AND outcome IS NOT NULL))
);

CREATE INDEX IF NOT EXISTS idx_markets_expiry ON markets(expiry);

CREATE TABLE IF NOT EXISTS positions (
    id TEXT PRIMARY KEY,
    market_id TEXT NOT NULL REFERENCES markets(id),
    owner TEXT NOT NULL,
    side TEXT NOT NULL,
    stake INTEGER NOT NULL,
    opened_at INTEGER NOT NULL,
    claimed INTEGER NOT NULL DEFAULT 0,
    payout INTEGER,
    claimed_at INTEGER
);

CREATE INDEX IF NOT EXISTS idx_positions_market ON positions(market_id, opened_at);
"#;

const MARKET_COLUMNS: &str = "id, authority, strike, expiry, oracle_feed, created_at, \
     resolved, outcome, settle_price, observed_at, resolved_at";

const POSITION_COLUMNS: &str =
    "id, market_id, owner, side, stake, opened_at, claimed, payout, claimed_at";

// =============================================================================
// Row conversion
// =============================================================================

// u64 amounts are stored as the i64 with the same bit pattern. No SQL
// compares or sums these columns, so only the round trip must be exact.
fn to_sql_u64(value: u64) -> i64 {
    value as i64
}

fn from_sql_u64(value: i64) -> u64 {
    value as u64
}

fn decode_err(col: usize, msg: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(col, rusqlite::types::Type::Text, msg.into())
}

fn market_from_row(row: &Row<'_>) -> rusqlite::Result<Market> {
    let id: MarketId = row.get::<_, String>(0)?.parse().map_err(|e| decode_err(0, e))?;
    let authority: Authority = row.get::<_, String>(1)?.parse().map_err(|e| decode_err(1, e))?;
    let resolved: bool = row.get::<_, i64>(6)? != 0;

    let settlement = if resolved {
        let outcome: Outcome = row.get::<_, String>(7)?.parse().map_err(|e| decode_err(7, e))?;
        Some(Settlement {
            outcome,
            price: from_sql_u64(row.get(8)?),
            observed_at: row.get(9)?,
            resolved_at: row.get(10)?,
        })
    } else {
        None
    };

    Ok(Market::from_parts(
        id,
        authority,
        from_sql_u64(row.get(2)?),
        row.get(3)?,
        FeedId::new(row.get::<_, String>(4)?),
        row.get(5)?,
        settlement,
    ))
}

fn position_from_row(row: &Row<'_>) -> rusqlite::Result<Position> {
    Ok(Position {
        id: row.get::<_, String>(0)?.parse().map_err(|e| decode_err(0, e))?,
        market_id: row.get::<_, String>(1)?.parse().map_err(|e| decode_err(1, e))?,
        owner: row.get(2)?,
        side: row.get::<_, String>(3)?.parse().map_err(|e| decode_err(3, e))?,
        stake: from_sql_u64(row.get(4)?),
        opened_at: row.get(5)?,
        claimed: row.get::<_, i64>(6)? != 0,
        payout: row.get::<_, Option<i64>>(7)?.map(from_sql_u64),
        claimed_at: row.get(8)?,
    })
}

// =============================================================================
// Storage Implementation
// =============================================================================

/// Persistent market ledger.
pub struct SqliteLedger {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteLedger {
    /// Open or create the ledger database.
    pub fn open(config: LedgerStorageConfig) -> MarketResult<Self> {
        let path = Path::new(&config.db_path);

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    MarketError::Storage(format!("Failed to create {}: {}", parent.display(), e))
                })?;
            }
        }

        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;

        let conn = Connection::open_with_flags(&config.db_path, flags)?;
        if config.wal_mode {
            conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        }
        conn.execute_batch(SCHEMA_SQL)?;

        info!(path = %config.db_path, "Market ledger opened");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open in-memory storage (for testing).
    pub fn open_memory() -> MarketResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA_SQL)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn load_market(conn: &Connection, id: &MarketId) -> MarketResult<Option<Market>> {
        let sql = format!("SELECT {} FROM markets WHERE id = ?1", MARKET_COLUMNS);
        Ok(conn
            .query_row(&sql, params![id.to_string()], market_from_row)
            .optional()?)
    }

    fn load_position(conn: &Connection, id: &PositionId) -> MarketResult<Option<Position>> {
        let sql = format!("SELECT {} FROM positions WHERE id = ?1", POSITION_COLUMNS);
        Ok(conn
            .query_row(&sql, params![id.to_string()], position_from_row)
            .optional()?)
    }
}

impl LedgerStore for SqliteLedger {
    fn insert_market(&self, market: &Market) -> MarketResult<()> {
        let conn = self.conn.lock();
        let inserted = conn.execute(
            r#"
            INSERT OR IGNORE INTO markets (
                id, authority, strike, expiry, oracle_feed, created_at, resolved
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0)
            "#,
            params![
                market.id().to_string(),
                market.authority().to_string(),
                to_sql_u64(market.strike()),
                market.expiry(),
                market.oracle_feed().as_str(),
                market.created_at(),
            ],
        )?;

        if inserted == 0 {
            return Err(MarketError::DuplicateMarket {
                market_id: *market.id(),
            });
        }
        Ok(())
    }

    fn market(&self, id: &MarketId) -> MarketResult<Option<Market>> {
        let conn = self.conn.lock();
        Self::load_market(&conn, id)
    }

    fn markets(&self) -> MarketResult<Vec<Market>> {
        let conn = self.conn.lock();
        let sql = format!("SELECT {} FROM markets ORDER BY expiry ASC, id ASC", MARKET_COLUMNS);
        let mut stmt = conn.prepare(&sql)?;
        let markets = stmt
            .query_map([], market_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(markets)
    }

    fn settle_market(&self, id: &MarketId, settlement: &Settlement) -> MarketResult<Market> {
        let conn = self.conn.lock();
        let updated = conn.execute(
            r#"
            UPDATE markets
            SET resolved = 1, outcome = ?2, settle_price = ?3, observed_at = ?4, resolved_at = ?5
            WHERE id = ?1 AND resolved = 0
            "#,
            params![
                id.to_string(),
                settlement.outcome.as_str(),
                to_sql_u64(settlement.price),
                settlement.observed_at,
                settlement.resolved_at,
            ],
        )?;

        let market = Self::load_market(&conn, id)?
            .ok_or(MarketError::MarketNotFound { market_id: *id })?;

        if updated == 0 {
            return Err(MarketError::AlreadyResolved { market_id: *id });
        }
        Ok(market)
    }

    fn insert_position(&self, position: &Position) -> MarketResult<()> {
        let conn = self.conn.lock();
        let inserted = conn.execute(
            r#"
            INSERT INTO positions (id, market_id, owner, side, stake, opened_at, claimed)
            SELECT ?1, ?2, ?3, ?4, ?5, ?6, 0
            WHERE EXISTS (SELECT 1 FROM markets WHERE id = ?2 AND resolved = 0)
            "#,
            params![
                position.id.to_string(),
                position.market_id.to_string(),
                position.owner,
                position.side.as_str(),
                to_sql_u64(position.stake),
                position.opened_at,
            ],
        )?;

        if inserted == 0 {
            return match Self::load_market(&conn, &position.market_id)? {
                Some(_) => Err(MarketError::StakingClosed {
                    market_id: position.market_id,
                }),
                None => Err(MarketError::MarketNotFound {
                    market_id: position.market_id,
                }),
            };
        }
        Ok(())
    }

    fn position(&self, id: &PositionId) -> MarketResult<Option<Position>> {
        let conn = self.conn.lock();
        Self::load_position(&conn, id)
    }

    fn positions_for_market(&self, id: &MarketId) -> MarketResult<Vec<Position>> {
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT {} FROM positions WHERE market_id = ?1 ORDER BY opened_at ASC, id ASC",
            POSITION_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let positions = stmt
            .query_map(params![id.to_string()], position_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(positions)
    }

    fn mark_claimed(&self, id: &PositionId, payout: u64, claimed_at: UnixSecs) -> MarketResult<Position> {
        let conn = self.conn.lock();
        let updated = conn.execute(
            "UPDATE positions SET claimed = 1, payout = ?2, claimed_at = ?3 WHERE id = ?1 AND claimed = 0",
            params![id.to_string(), to_sql_u64(payout), claimed_at],
        )?;

        let position = Self::load_position(&conn, id)?
            .ok_or(MarketError::PositionNotFound { position_id: *id })?;

        if updated == 0 {
            return Err(MarketError::AlreadyClaimed { position_id: *id });
        }
        Ok(position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn market() -> Market {
        Market::open(
            Authority::from_seed("desk"),
            25_000_000_000,
            1_700_003_600,
            FeedId::new("SOL/USD"),
            1_700_000_000,
        )
    }

    fn settlement() -> Settlement {
        Settlement {
            outcome: Outcome::Above,
            price: 30_000_000_000,
            observed_at: 1_700_003_601,
            resolved_at: 1_700_003_700,
        }
    }

    #[test]
    fn test_market_roundtrip_and_duplicate() {
        let ledger = SqliteLedger::open_memory().unwrap();
        let m = market();
        ledger.insert_market(&m).unwrap();

        let loaded = ledger.market(m.id()).unwrap().unwrap();
        assert_eq!(loaded, m);
        assert!(!loaded.is_resolved());

        let err = ledger.insert_market(&m).unwrap_err();
        assert_eq!(err, MarketError::DuplicateMarket { market_id: *m.id() });
        assert_eq!(ledger.markets().unwrap().len(), 1);
    }

    #[test]
    fn test_settle_once() {
        let ledger = SqliteLedger::open_memory().unwrap();
        let m = market();
        ledger.insert_market(&m).unwrap();

        let settled = ledger.settle_market(m.id(), &settlement()).unwrap();
        assert_eq!(settled.settlement(), Some(&settlement()));

        let again = Settlement {
            outcome: Outcome::Below,
            ..settlement()
        };
        let err = ledger.settle_market(m.id(), &again).unwrap_err();
        assert!(matches!(err, MarketError::AlreadyResolved { .. }));
        assert_eq!(ledger.market(m.id()).unwrap().unwrap().outcome(), Some(Outcome::Above));
    }

    #[test]
    fn test_settle_unknown_market() {
        let ledger = SqliteLedger::open_memory().unwrap();
        let err = ledger.settle_market(market().id(), &settlement()).unwrap_err();
        assert!(matches!(err, MarketError::MarketNotFound { .. }));
    }

    #[test]
    fn test_positions_and_claims() {
        let ledger = SqliteLedger::open_memory().unwrap();
        let m = market();
        ledger.insert_market(&m).unwrap();

        let p = Position::open(*m.id(), "alice".into(), Outcome::Above, 1_000, 1_700_000_100);
        ledger.insert_position(&p).unwrap();
        assert_eq!(ledger.position(&p.id).unwrap().unwrap(), p);

        ledger.settle_market(m.id(), &settlement()).unwrap();

        let late = Position::open(*m.id(), "bob".into(), Outcome::Below, 1_000, 1_700_003_800);
        let err = ledger.insert_position(&late).unwrap_err();
        assert!(matches!(err, MarketError::StakingClosed { .. }));

        let claimed = ledger.mark_claimed(&p.id, 1_000, 1_700_004_000).unwrap();
        assert!(claimed.claimed);
        assert_eq!(claimed.payout, Some(1_000));
        assert_eq!(claimed.claimed_at, Some(1_700_004_000));

        let err = ledger.mark_claimed(&p.id, 1_000, 1_700_004_001).unwrap_err();
        assert!(matches!(err, MarketError::AlreadyClaimed { .. }));
        assert_eq!(ledger.positions_for_market(m.id()).unwrap().len(), 1);
    }

    #[test]
    fn test_amounts_above_i64_max_roundtrip() {
        let ledger = SqliteLedger::open_memory().unwrap();
        let m = Market::open(
            Authority::from_seed("desk"),
            u64::MAX,
            1_700_003_600,
            FeedId::new("SOL/USD"),
            1_700_000_000,
        );
        ledger.insert_market(&m).unwrap();
        assert_eq!(ledger.market(m.id()).unwrap().unwrap().strike(), u64::MAX);

        let p = Position::open(*m.id(), "whale".into(), Outcome::Below, i64::MAX as u64 + 7, 1_700_000_100);
        ledger.insert_position(&p).unwrap();
        assert_eq!(ledger.position(&p.id).unwrap().unwrap().stake, i64::MAX as u64 + 7);

        let high = Settlement {
            outcome: Outcome::Below,
            price: u64::MAX - 1,
            ..settlement()
        };
        let settled = ledger.settle_market(m.id(), &high).unwrap();
        assert_eq!(settled.settlement().unwrap().price, u64::MAX - 1);
        assert_eq!(ledger.market(m.id()).unwrap().unwrap().settlement(), Some(&high));

        let claimed = ledger.mark_claimed(&p.id, u64::MAX, 1_700_004_000).unwrap();
        assert_eq!(claimed.payout, Some(u64::MAX));
    }

    #[test]
    fn test_reopen_file_preserves_settlement() {
        let dir = tempfile::tempdir().unwrap();
        let config = LedgerStorageConfig {
            db_path: dir.path().join("ledger.db").to_string_lossy().to_string(),
            wal_mode: true,
        };

        let m = market();
        {
            let ledger = SqliteLedger::open(config.clone()).unwrap();
            ledger.insert_market(&m).unwrap();
            ledger.settle_market(m.id(), &settlement()).unwrap();
        }

        let ledger = SqliteLedger::open(config).unwrap();
        let loaded = ledger.market(m.id()).unwrap().unwrap();
        assert_eq!(loaded.outcome(), Some(Outcome::Above));
        assert_eq!(loaded.settlement().unwrap().observed_at, 1_700_003_601);
    }
}
