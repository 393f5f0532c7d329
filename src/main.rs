//! binopt - Binary Options Market CLI
//!
//! Create markets, stake positions, resolve against the oracle and claim payouts.
//!
//! Usage:
//!   binopt --db ./ledger.db create --authority <HEX> --strike 25000000000 --expires-in 3600 --feed SOL/USD
//!   binopt --db ./ledger.db stake --market <ID> --owner alice --side above --amount 1000
//!   binopt --db ./ledger.db resolve --market <ID>
//!   binopt --db ./ledger.db claim --position <UUID>
//!
//! Results are printed to stdout as JSON; logs go to stderr (`RUST_LOG` to tune).

use anyhow::{bail, Context, Result};
use binary_options_market::{
    market::PRICE_SCALE,
    oracle::{pyth::DEFAULT_HERMES_URL, KnownFeed},
    AppConfig, Authority, Clock, CreateMarket, FeedId, HermesOracle, LedgerStore, MarketController,
    MarketId, MemoryLedger, OracleAdapter, Outcome, PoolTotals, PositionId, ReplayOracle,
    SqliteLedger, SystemClock, UnixSecs,
};
use binary_options_market::ledger::LedgerStorageConfig;
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use serde::Serialize;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Binary options market ledger and settlement tool
#[derive(Parser, Debug)]
#[command(name = "binopt")]
#[command(about = "Create, resolve and redeem single-expiry binary options markets")]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, env = "BINOPT_CONFIG")]
    config: Option<PathBuf>,

    /// SQLite ledger path (overrides config)
    #[arg(long)]
    db: Option<String>,

    /// Settle against recorded prices (JSON array of {feed, price, observed_at}) instead of Hermes
    #[arg(long)]
    replay_prices: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a market (state Open)
    Create {
        /// Authority key (64 hex chars)
        #[arg(long, env = "BINOPT_AUTHORITY")]
        authority: Authority,

        /// Strike scaled by 1e9 (25000000000 = 25.0)
        #[arg(long)]
        strike: u64,

        /// Absolute expiry (Unix seconds)
        #[arg(long, conflicts_with = "expires_in", required_unless_present = "expires_in")]
        expiry: Option<UnixSecs>,

        /// Expiry relative to now, in seconds
        #[arg(long)]
        expires_in: Option<i64>,

        /// Oracle feed (e.g. SOL/USD or a Pyth feed id)
        #[arg(long)]
        feed: String,
    },

    /// Stake on one side of an open market
    Stake {
        #[arg(long)]
        market: MarketId,

        #[arg(long)]
        owner: String,

        /// above | below
        #[arg(long)]
        side: Outcome,

        #[arg(long)]
        amount: u64,
    },

    /// Resolve an expired market against the oracle
    Resolve {
        #[arg(long)]
        market: MarketId,
    },

    /// Claim the payout of a position
    Claim {
        #[arg(long)]
        position: PositionId,

        /// Only print the quote
        #[arg(long)]
        dry_run: bool,
    },

    /// Show one market with its pools
    Show {
        #[arg(long)]
        market: MarketId,
    },

    /// List all markets
    List,

    /// List positions of a market
    Positions {
        #[arg(long)]
        market: MarketId,
    },

    /// Query the oracle for the first price at or after a time
    Price {
        #[arg(long)]
        feed: String,

        /// Unix seconds (defaults to now)
        #[arg(long)]
        at: Option<UnixSecs>,
    },

    /// List built-in feeds
    Feeds,
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "binary_options_market=info,binopt=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Absolute `--expiry` wins; otherwise `now + --expires-in`.
fn resolve_expiry(now: UnixSecs, expiry: Option<UnixSecs>, expires_in: Option<i64>) -> Result<UnixSecs> {
    match (expiry, expires_in) {
        (Some(at), _) => Ok(at),
        (None, Some(delta)) => match now.checked_add(delta) {
            Some(at) => Ok(at),
            None => bail!("--expires-in {} overflows the expiry timestamp", delta),
        },
        (None, None) => bail!("either --expiry or --expires-in is required"),
    }
}

fn open_ledger(db_path: Option<&str>) -> Result<Arc<dyn LedgerStore>> {
    match db_path {
        Some(path) => {
            let ledger = SqliteLedger::open(LedgerStorageConfig {
                db_path: path.to_string(),
                ..LedgerStorageConfig::default()
            })
            .with_context(|| format!("Failed to open ledger: {}", path))?;
            Ok(Arc::new(ledger))
        }
        None => {
            warn!("No ledger path configured; using an in-memory ledger (nothing persists)");
            Ok(Arc::new(MemoryLedger::new()))
        }
    }
}

fn open_oracle(config: &AppConfig, replay: Option<&Path>) -> Result<Arc<dyn OracleAdapter>> {
    match replay {
        Some(path) => Ok(Arc::new(ReplayOracle::from_json_file(path)?)),
        None => {
            let oracle = HermesOracle::new(
                &config.oracle.hermes_url,
                config.oracle.request_timeout(),
                config.oracle.feeds.clone(),
            )?;
            Ok(Arc::new(oracle))
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenv();
    init_tracing();

    let cli = Cli::parse();

    let mut config = AppConfig::load(cli.config.as_deref())?;
    if let Some(db) = cli.db.clone() {
        config.ledger.db_path = Some(db);
    }

    let violations = config.validate();
    if !violations.is_empty() {
        for v in &violations {
            eprintln!("  - {}", v);
        }
        bail!("invalid configuration ({} violations)", violations.len());
    }

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let oracle = open_oracle(&config, cli.replay_prices.as_deref())?;
    info!(oracle = oracle.name(), hermes = %config.oracle.hermes_url, "Oracle ready");

    // Oracle-only commands never open the ledger.
    let controller = || -> Result<MarketController> {
        let ledger = open_ledger(config.ledger.db_path.as_deref())?;
        Ok(MarketController::new(
            ledger,
            oracle.clone(),
            clock.clone(),
            config.settlement.clone(),
            config.payout.clone(),
        ))
    };

    match cli.command {
        Commands::Create {
            authority,
            strike,
            expiry,
            expires_in,
            feed,
        } => {
            let expiry = resolve_expiry(clock.now_unix_secs(), expiry, expires_in)?;
            let market = controller()?.create_market(CreateMarket {
                authority,
                strike,
                expiry,
                oracle_feed: FeedId::new(feed),
            })?;
            print_json(&market.view())?;
        }
        Commands::Stake {
            market,
            owner,
            side,
            amount,
        } => {
            let position = controller()?.open_position(&market, &owner, side, amount)?;
            print_json(&position)?;
        }
        Commands::Resolve { market } => {
            let controller = controller()?;
            let outcome = controller.resolve(&market).await?;
            let settled = controller.market(&market)?;
            info!(stats = ?controller.settlement_stats(), "Settlement statistics");
            print_json(&json!({
                "market": settled.view(),
                "outcome": outcome,
                "settlement": settled.settlement(),
            }))?;
        }
        Commands::Claim { position, dry_run } => {
            let controller = controller()?;
            if dry_run {
                print_json(&controller.quote_claim(&position)?)?;
            } else {
                print_json(&controller.claim(&position)?)?;
            }
        }
        Commands::Show { market } => {
            let controller = controller()?;
            let m = controller.market(&market)?;
            let pools: PoolTotals = controller.pools(&market)?;
            print_json(&json!({
                "market": m.view(),
                "state": m.state(),
                "created_at": m.created_at(),
                "settlement": m.settlement(),
                "pools": pools,
            }))?;
        }
        Commands::List => {
            let views: Vec<_> = controller()?.markets()?.iter().map(|m| m.view()).collect();
            print_json(&views)?;
        }
        Commands::Positions { market } => {
            print_json(&controller()?.positions(&market)?)?;
        }
        Commands::Price { feed, at } => {
            let at = at.unwrap_or_else(|| clock.now_unix_secs());
            let obs = oracle.price_at_or_after(&FeedId::new(feed), at).await?;
            print_json(&json!({
                "feed": obs.feed,
                "price": obs.price,
                "price_decimal": obs.price as f64 / PRICE_SCALE as f64,
                "observed_at": obs.observed_at,
            }))?;
        }
        Commands::Feeds => {
            let feeds: Vec<_> = KnownFeed::ALL
                .iter()
                .map(|f| json!({ "feed": f.symbol(), "pyth_id": f.pyth_id() }))
                .collect();
            print_json(&json!({ "hermes_default": DEFAULT_HERMES_URL, "feeds": feeds }))?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_expiry() {
        assert_eq!(resolve_expiry(1_000, Some(5_000), None).unwrap(), 5_000);
        assert_eq!(resolve_expiry(1_000, None, Some(3_600)).unwrap(), 4_600);
        assert!(resolve_expiry(1_000, None, None).is_err());
    }

    #[test]
    fn test_resolve_expiry_overflow_rejected() {
        let err = resolve_expiry(1_700_000_000, None, Some(i64::MAX)).unwrap_err();
        assert!(err.to_string().contains("overflows"));
    }
}
