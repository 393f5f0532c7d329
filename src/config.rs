//! Application Configuration
//!
//! Layered, lowest precedence first:
//! 1. Built-in defaults
//! 2. TOML file (`--config`)
//! 3. Environment (`.env` is loaded first by the binary)
//! 4. CLI flags (applied by the binary)
//!
//! `AppConfig::validate()` lists every violation; the binary refuses to run
//! with any of them.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use crate::oracle::pyth::DEFAULT_HERMES_URL;
use crate::payout::{PayoutConfig, BPS_DENOMINATOR};
use crate::settlement::SettlementConfig;

// =============================================================================
// Sections
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// SQLite ledger path. `None` keeps the ledger in memory.
    #[serde(default)]
    pub db_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleConfig {
    /// Pyth Hermes base URL.
    #[serde(default = "default_hermes_url")]
    pub hermes_url: String,
    /// Per-request timeout for oracle queries.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Extra feed aliases: market feed id -> Pyth feed id (hex).
    #[serde(default)]
    pub feeds: HashMap<String, String>,
}

fn default_hermes_url() -> String {
    DEFAULT_HERMES_URL.to_string()
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            hermes_url: default_hermes_url(),
            request_timeout_ms: default_request_timeout_ms(),
            feeds: HashMap::new(),
        }
    }
}

impl OracleConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

// =============================================================================
// Violations
// =============================================================================

/// A configuration value that cannot be used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigViolation {
    pub field: String,
    pub description: String,
}

impl std::fmt::Display for ConfigViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.field, self.description)
    }
}

// =============================================================================
// AppConfig
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub oracle: OracleConfig,
    #[serde(default)]
    pub settlement: SettlementConfig,
    #[serde(default)]
    pub payout: PayoutConfig,
}

impl AppConfig {
    /// Defaults, then the TOML file if given, then environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::from_toml_file(p)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        Self::from_toml_str(&raw).with_context(|| format!("Invalid config: {}", path.display()))
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Apply environment overrides through `lookup` (injected for tests).
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(path) = lookup("BINOPT_DB_PATH") {
            self.ledger.db_path = Some(path);
        }

        if let Some(url) = lookup("PYTH_HERMES_URL") {
            self.oracle.hermes_url = url;
        }

        if let Some(v) = lookup("BINOPT_ORACLE_TIMEOUT_MS") {
            self.oracle.request_timeout_ms = v
                .parse()
                .with_context(|| format!("BINOPT_ORACLE_TIMEOUT_MS: invalid value '{}'", v))?;
        }

        if let Some(v) = lookup("BINOPT_MAX_ORACLE_LAG_SECS") {
            self.settlement.max_observation_lag_secs = Some(
                v.parse()
                    .with_context(|| format!("BINOPT_MAX_ORACLE_LAG_SECS: invalid value '{}'", v))?,
            );
        }

        if let Some(v) = lookup("BINOPT_FEE_BPS") {
            self.payout.fee_bps = v
                .parse()
                .with_context(|| format!("BINOPT_FEE_BPS: invalid value '{}'", v))?;
        }

        Ok(())
    }

    pub fn validate(&self) -> Vec<ConfigViolation> {
        let mut violations = Vec::new();

        if self.oracle.hermes_url.trim().is_empty() {
            violations.push(ConfigViolation {
                field: "oracle.hermes_url".to_string(),
                description: "Hermes URL is empty".to_string(),
            });
        }

        if self.oracle.request_timeout_ms == 0 {
            violations.push(ConfigViolation {
                field: "oracle.request_timeout_ms".to_string(),
                description: "Oracle request timeout must be > 0".to_string(),
            });
        }

        for (alias, id) in &self.oracle.feeds {
            let hex = id.trim_start_matches("0x");
            if hex.len() != 64 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
                violations.push(ConfigViolation {
                    field: format!("oracle.feeds.{}", alias),
                    description: format!("'{}' is not a 32-byte hex feed id", id),
                });
            }
        }

        if let Some(lag) = self.settlement.max_observation_lag_secs {
            if lag < 0 {
                violations.push(ConfigViolation {
                    field: "settlement.max_observation_lag_secs".to_string(),
                    description: format!("Lag {} is negative", lag),
                });
            }
        }

        if self.payout.fee_bps as u64 > BPS_DENOMINATOR {
            violations.push(ConfigViolation {
                field: "payout.fee_bps".to_string(),
                description: format!("Fee {} bps exceeds {}", self.payout.fee_bps, BPS_DENOMINATOR),
            });
        }

        violations
    }
}
