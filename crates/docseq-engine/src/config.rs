//! # Engine Configuration
//!
//! Configuration management for the allocator and the reclaim worker.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     DOCSEQ_DB_PATH=/var/lib/docseq/docseq.db                           │
//! │     DOCSEQ_RESERVATION_TTL_SECS=3600                                   │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/docseq/docseq.toml (Linux)                               │
//! │     ~/Library/Application Support/com.docseq.docseq/docseq.toml (macOS)│
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [database]
//! path = "/var/lib/docseq/docseq.db"
//! max_connections = 8
//! busy_timeout_ms = 5000
//!
//! [reservation]
//! ttl_secs = 3600
//! lock_timeout_ms = 5000
//!
//! [cache]
//! prefix_ttl_secs = 3600
//! branch_ttl_secs = 3600
//!
//! [reclaimer]
//! enabled = true
//! poll_interval_ms = 1000
//! batch_size = 100
//! retry_initial_ms = 500
//! retry_max_secs = 300
//!
//! [scopes]
//! "Delivery Note" = "warehouse"
//! "Sales Return" = "caller_branch"
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use docseq_core::{Scope, ScopeTable, DEFAULT_CACHE_TTL_SECS, DEFAULT_RESERVATION_TTL_SECS};
use docseq_db::DbConfig;

use crate::error::ConfigError;

// =============================================================================
// Database Settings
// =============================================================================

/// Where the ledger lives and how the pool behaves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// SQLite file path.
    #[serde(default = "default_database_path")]
    pub path: PathBuf,

    /// Maximum pooled connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// How long a writer waits for the SQLite write lock (milliseconds).
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_ms: u64,
}

fn default_database_path() -> PathBuf {
    directories::ProjectDirs::from("com", "docseq", "docseq")
        .map(|dirs| dirs.data_dir().join("docseq.db"))
        .unwrap_or_else(|| PathBuf::from("docseq.db"))
}

fn default_max_connections() -> u32 {
    5
}

fn default_busy_timeout() -> u64 {
    5000
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: default_database_path(),
            max_connections: default_max_connections(),
            busy_timeout_ms: default_busy_timeout(),
        }
    }
}

// =============================================================================
// Reservation Settings
// =============================================================================

/// Reservation lifetime and lock waits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReservationSettings {
    /// How long a generated code stays reserved (seconds).
    #[serde(default = "default_reservation_ttl")]
    pub ttl_secs: i64,

    /// How long `generate`/`confirm`/`cancel` wait for a bucket lock
    /// before failing with `ConcurrencyTimeout` (milliseconds).
    #[serde(default = "default_lock_timeout")]
    pub lock_timeout_ms: u64,
}

fn default_reservation_ttl() -> i64 {
    DEFAULT_RESERVATION_TTL_SECS
}

fn default_lock_timeout() -> u64 {
    5000
}

impl Default for ReservationSettings {
    fn default() -> Self {
        ReservationSettings {
            ttl_secs: default_reservation_ttl(),
            lock_timeout_ms: default_lock_timeout(),
        }
    }
}

impl ReservationSettings {
    pub fn ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.ttl_secs)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

// =============================================================================
// Cache Settings
// =============================================================================

/// Lifetimes of cached lookups.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    #[serde(default = "default_cache_ttl")]
    pub prefix_ttl_secs: u64,

    #[serde(default = "default_cache_ttl")]
    pub branch_ttl_secs: u64,
}

fn default_cache_ttl() -> u64 {
    DEFAULT_CACHE_TTL_SECS
}

impl Default for CacheSettings {
    fn default() -> Self {
        CacheSettings {
            prefix_ttl_secs: default_cache_ttl(),
            branch_ttl_secs: default_cache_ttl(),
        }
    }
}

// =============================================================================
// Reclaimer Settings
// =============================================================================

/// Background reclaim worker behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReclaimerSettings {
    /// Run the worker at all.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Interval between polls of the task queue (milliseconds).
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Due tasks fired per poll.
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    /// First retry delay after a failed firing (milliseconds).
    #[serde(default = "default_retry_initial")]
    pub retry_initial_ms: u64,

    /// Upper bound on the retry delay (seconds).
    #[serde(default = "default_retry_max")]
    pub retry_max_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_poll_interval() -> u64 {
    1000
}

fn default_batch_size() -> u32 {
    100
}

fn default_retry_initial() -> u64 {
    500
}

fn default_retry_max() -> u64 {
    300
}

impl Default for ReclaimerSettings {
    fn default() -> Self {
        ReclaimerSettings {
            enabled: true,
            poll_interval_ms: default_poll_interval(),
            batch_size: default_batch_size(),
            retry_initial_ms: default_retry_initial(),
            retry_max_secs: default_retry_max(),
        }
    }
}

impl ReclaimerSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn retry_initial(&self) -> Duration {
        Duration::from_millis(self.retry_initial_ms)
    }

    pub fn retry_max(&self) -> Duration {
        Duration::from_secs(self.retry_max_secs)
    }
}

// =============================================================================
// Main Engine Configuration
// =============================================================================

/// Complete engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub reservation: ReservationSettings,

    #[serde(default)]
    pub cache: CacheSettings,

    #[serde(default)]
    pub reclaimer: ReclaimerSettings,

    /// Transaction type → scope, applied over the built-in table.
    #[serde(default)]
    pub scopes: HashMap<String, Scope>,
}

impl EngineConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (docseq.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading engine config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;

        Ok(config)
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> Result<(), ConfigError> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| ConfigError::SaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Engine config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "database.max_connections must be greater than 0".into(),
            ));
        }

        if self.reservation.ttl_secs <= 0 {
            return Err(ConfigError::Invalid(
                "reservation.ttl_secs must be greater than 0".into(),
            ));
        }

        if self.reclaimer.batch_size == 0 {
            return Err(ConfigError::Invalid(
                "reclaimer.batch_size must be greater than 0".into(),
            ));
        }

        if self.reclaimer.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "reclaimer.poll_interval_ms must be greater than 0".into(),
            ));
        }

        if self.reclaimer.retry_initial() > self.reclaimer.retry_max() {
            return Err(ConfigError::Invalid(
                "reclaimer.retry_initial_ms must not exceed retry_max_secs".into(),
            ));
        }

        Ok(())
    }

    /// Applies `DOCSEQ_*` overrides read through `lookup`.
    ///
    /// Unparseable values are logged and ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("DOCSEQ_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = PathBuf::from(path);
        }

        override_parsed(&lookup, "DOCSEQ_DB_MAX_CONNECTIONS", &mut self.database.max_connections);
        override_parsed(&lookup, "DOCSEQ_DB_BUSY_TIMEOUT_MS", &mut self.database.busy_timeout_ms);
        override_parsed(&lookup, "DOCSEQ_RESERVATION_TTL_SECS", &mut self.reservation.ttl_secs);
        override_parsed(&lookup, "DOCSEQ_LOCK_TIMEOUT_MS", &mut self.reservation.lock_timeout_ms);
        override_parsed(&lookup, "DOCSEQ_RECLAIMER_ENABLED", &mut self.reclaimer.enabled);
        override_parsed(&lookup, "DOCSEQ_RECLAIM_POLL_MS", &mut self.reclaimer.poll_interval_ms);
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "docseq", "docseq")
            .map(|dirs| dirs.config_dir().join("docseq.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    /// Database pool settings derived from `[database]`.
    pub fn db_config(&self) -> DbConfig {
        DbConfig::new(&self.database.path)
            .max_connections(self.database.max_connections)
            .busy_timeout(Duration::from_millis(self.database.busy_timeout_ms))
    }

    /// Built-in scope table with `[scopes]` applied on top.
    pub fn scope_table(&self) -> ScopeTable {
        let mut table = ScopeTable::default();
        table.extend(self.scopes.iter().map(|(name, scope)| (name.clone(), *scope)));
        table
    }
}

fn override_parsed<F, T>(lookup: &F, key: &str, target: &mut T)
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    if let Some(raw) = lookup(key) {
        match raw.parse() {
            Ok(value) => *target = value,
            Err(_) => warn!(key = %key, value = %raw, "Ignoring unparseable environment override"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docseq_core::SourceKind;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.reservation.ttl_secs, 3600);
        assert_eq!(config.cache.prefix_ttl_secs, 3600);
        assert!(config.reclaimer.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_toml_with_scopes() {
        let config: EngineConfig = toml::from_str(
            r#"
            [reservation]
            ttl_secs = 900

            [scopes]
            "Delivery Note" = "warehouse"
            "Purchase Order" = "caller_branch"
            "#,
        )
        .unwrap();

        assert_eq!(config.reservation.ttl_secs, 900);
        assert_eq!(config.reservation.lock_timeout_ms, 5000);

        let table = config.scope_table();
        assert_eq!(
            table.classify("Delivery Note"),
            Scope::SourceScoped(SourceKind::Warehouse)
        );
        assert_eq!(table.classify("Purchase Order"), Scope::CallerBranchScoped);
        assert_eq!(
            table.classify("Stock Audit"),
            Scope::SourceScoped(SourceKind::Branch)
        );
    }

    #[test]
    fn test_unknown_scope_is_rejected() {
        let parsed: Result<EngineConfig, _> = toml::from_str(
            r#"
            [scopes]
            "Delivery Note" = "region"
            "#,
        );
        assert!(parsed.is_err());
    }

    #[test]
    fn test_overrides() {
        let mut config = EngineConfig::default();
        let env: HashMap<&str, &str> = [
            ("DOCSEQ_DB_PATH", "/tmp/ledger.db"),
            ("DOCSEQ_RESERVATION_TTL_SECS", "120"),
            ("DOCSEQ_RECLAIMER_ENABLED", "false"),
            ("DOCSEQ_LOCK_TIMEOUT_MS", "not-a-number"),
        ]
        .into_iter()
        .collect();

        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.database.path, PathBuf::from("/tmp/ledger.db"));
        assert_eq!(config.reservation.ttl_secs, 120);
        assert!(!config.reclaimer.enabled);
        assert_eq!(config.reservation.lock_timeout_ms, 5000);
    }

    #[test]
    fn test_validation() {
        let mut config = EngineConfig::default();
        config.reservation.ttl_secs = 0;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.reclaimer.batch_size = 0;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.reclaimer.retry_initial_ms = 600_000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("docseq.toml");

        let mut config = EngineConfig::default();
        config.reservation.ttl_secs = 1800;
        config.scopes.insert("Delivery Note".into(), Scope::SourceFree);
        config.save(Some(path.clone())).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let loaded: EngineConfig = toml::from_str(&contents).unwrap();
        assert_eq!(loaded.reservation.ttl_secs, 1800);
        assert_eq!(loaded.scopes.get("Delivery Note"), Some(&Scope::SourceFree));
    }
}
