//! # Engine Configuration
//!
//! Settings for the database pool, the conflict retry loop and the
//! notification queue.
//!
//! ## Configuration Sources (Priority Order)
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     DUKA_DB_PATH, DUKA_MAX_RETRIES, DUKA_RETRY_BACKOFF_MS,             │
//! │     DUKA_EVENT_QUEUE_CAPACITY                                          │
//! │                                                                         │
//! │  2. Config File (engine.toml)                                          │
//! │     Linux:   ~/.config/duka/engine.toml                                │
//! │     macOS:   ~/Library/Application Support/com.duka.engine/engine.toml │
//! │     Windows: %APPDATA%\duka\engine\config\engine.toml                  │
//! │                                                                         │
//! │  3. Defaults (lowest priority)                                         │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use duka_db::DbConfig;

/// Configuration loading failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read.
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    /// Config file is not valid TOML for [`EngineConfig`].
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A setting is out of range.
    #[error("Invalid engine configuration: {0}")]
    Invalid(String),
}

// =============================================================================
// Database Settings
// =============================================================================

/// Ledger store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// SQLite file path. `:memory:` gives a throwaway database.
    #[serde(default = "default_db_path")]
    pub path: PathBuf,

    /// Maximum pooled connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Connections kept open while idle.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Time to wait for a free connection (seconds).
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("duka.db")
}

fn default_max_connections() -> u32 {
    5
}

fn default_min_connections() -> u32 {
    1
}

fn default_connect_timeout() -> u64 {
    30
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: default_db_path(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

// =============================================================================
// Engine Settings
// =============================================================================

/// Optimistic-locking retry settings.
///
/// ## Retry Loop
/// ```text
/// attempt 1 ── StaleVersion ──► sleep backoff ──► attempt 2 ── StaleVersion
///     ──► sleep (longer) ──► attempt 3 ── StaleVersion ──► Conflict to caller
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Attempts per operation before a conflict reaches the caller.
    #[serde(default = "default_max_retries")]
    pub max_conflict_retries: u32,

    /// First delay between attempts (milliseconds); grows per attempt.
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_ms: u64,
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_backoff() -> u64 {
    10
}

impl Default for EngineSettings {
    fn default() -> Self {
        EngineSettings {
            max_conflict_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff(),
        }
    }
}

// =============================================================================
// Notification Settings
// =============================================================================

/// Post-commit event delivery settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationSettings {
    /// Events buffered between commit and the dispatcher. A full queue
    /// drops events with a warning.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Events buffered per subscriber before it starts lagging.
    #[serde(default = "default_broadcast_capacity")]
    pub broadcast_capacity: usize,
}

fn default_queue_capacity() -> usize {
    256
}

fn default_broadcast_capacity() -> usize {
    256
}

impl Default for NotificationSettings {
    fn default() -> Self {
        NotificationSettings {
            queue_capacity: default_queue_capacity(),
            broadcast_capacity: default_broadcast_capacity(),
        }
    }
}

// =============================================================================
// Main Engine Configuration
// =============================================================================

/// Complete engine configuration.
///
/// ## Example Config File
/// ```toml
/// [database]
/// path = "/var/lib/duka/ledger.db"
/// max_connections = 8
///
/// [engine]
/// max_conflict_retries = 3
/// retry_backoff_ms = 10
///
/// [notifications]
/// queue_capacity = 256
/// broadcast_capacity = 256
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub engine: EngineSettings,

    #[serde(default)]
    pub notifications: NotificationSettings,
}

impl EngineConfig {
    /// Defaults with an in-memory database.
    pub fn in_memory() -> Self {
        let mut config = Self::default();
        config.database.path = PathBuf::from(":memory:");
        config
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (engine.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading engine config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = Self::from_toml(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load engine config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Parses a TOML document; missing keys take their defaults.
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.engine.max_conflict_retries == 0 {
            return Err(ConfigError::Invalid(
                "max_conflict_retries must be at least 1".into(),
            ));
        }
        if self.notifications.queue_capacity == 0 || self.notifications.broadcast_capacity == 0 {
            return Err(ConfigError::Invalid(
                "notification capacities must be greater than 0".into(),
            ));
        }
        if self.database.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "max_connections must be greater than 0".into(),
            ));
        }
        if self.database.min_connections > self.database.max_connections {
            return Err(ConfigError::Invalid(format!(
                "min_connections ({}) exceeds max_connections ({})",
                self.database.min_connections, self.database.max_connections
            )));
        }
        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("DUKA_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = PathBuf::from(path);
        }

        if let Ok(retries) = std::env::var("DUKA_MAX_RETRIES") {
            match retries.parse::<u32>() {
                Ok(n) => self.engine.max_conflict_retries = n,
                Err(_) => warn!(value = %retries, "Ignoring invalid DUKA_MAX_RETRIES"),
            }
        }

        if let Ok(backoff) = std::env::var("DUKA_RETRY_BACKOFF_MS") {
            match backoff.parse::<u64>() {
                Ok(ms) => self.engine.retry_backoff_ms = ms,
                Err(_) => warn!(value = %backoff, "Ignoring invalid DUKA_RETRY_BACKOFF_MS"),
            }
        }

        if let Ok(capacity) = std::env::var("DUKA_EVENT_QUEUE_CAPACITY") {
            match capacity.parse::<usize>() {
                Ok(n) => self.notifications.queue_capacity = n,
                Err(_) => warn!(value = %capacity, "Ignoring invalid DUKA_EVENT_QUEUE_CAPACITY"),
            }
        }
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "duka", "engine")
            .map(|dirs| dirs.config_dir().join("engine.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    /// Pool settings for [`duka_db::Database::new`].
    pub fn db_config(&self) -> DbConfig {
        if self.database.path.as_os_str() == ":memory:" {
            return DbConfig::in_memory();
        }
        DbConfig::new(&self.database.path)
            .max_connections(self.database.max_connections)
            .min_connections(self.database.min_connections)
            .connect_timeout(Duration::from_secs(self.database.connect_timeout_secs))
    }

    /// First delay between conflict retries.
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.engine.retry_backoff_ms)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
