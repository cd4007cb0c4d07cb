//! Store configuration loaded from an optional TOML file.
//!
//! A missing or empty file yields `StoreConfig::default()`. Unknown keys are
//! accepted but logged as warnings, since they are usually typos.
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Environment variable overriding `database_path`.
pub const DATABASE_ENV_VAR: &str = "CONDUIT_DATABASE";

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config file too large: {0}")]
    TooLarge(String),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Storage engine configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// SQLite database file, or `:memory:` for a private in-memory database.
    pub database_path: String,

    /// Upper bound of the connection pool.
    pub max_connections: u32,

    /// How long to wait for a pooled connection before failing.
    pub acquire_timeout_secs: u64,

    /// How long SQLite waits on a locked database before returning SQLITE_BUSY.
    pub busy_timeout_ms: u64,

    /// Default deadline for one store operation.
    pub query_timeout_ms: u64,

    /// `tracing` filter directive used by the binary when `RUST_LOG` is unset.
    pub log_filter: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_path: "conduit.db".to_string(),
            max_connections: 5,
            acquire_timeout_secs: 10,
            busy_timeout_ms: 5000,
            query_timeout_ms: 3000,
            log_filter: "info".to_string(),
        }
    }
}

impl StoreConfig {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 6] = [
        "database_path",
        "max_connections",
        "acquire_timeout_secs",
        "busy_timeout_ms",
        "query_timeout_ms",
        "log_filter",
    ];

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(StoreConfig::default())`
    /// - Empty file → `Ok(StoreConfig::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)`
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        Self::parse(&content)
    }

    /// Parse configuration from TOML text.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: StoreConfig = toml::from_str(content)?;
        tracing::debug!(database = %config.database_path, "Loaded configuration");
        Ok(config)
    }

    /// Applies the `CONDUIT_DATABASE` override, if set and non-empty.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(path) = std::env::var(DATABASE_ENV_VAR) {
            if !path.trim().is_empty() {
                self.database_path = path;
            }
        }
        self
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }
}

// ============================================================================
// Tests
// ============================================================================
