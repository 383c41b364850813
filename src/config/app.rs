//! Application configuration structures.

use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::storage::{DEFAULT_CHANNEL_CAPACITY, DEFAULT_WRITE_TIMEOUT, StorageBuilder};

use super::collector::CollectorConfig;
use super::validation::ConfigError;

// =============================================================================
// Constants
// =============================================================================

/// Default database file.
pub const DEFAULT_DB_PATH: &str = "data/orbtrack.db";

/// Default connection pool size.
pub const DEFAULT_POOL_SIZE: u32 = 4;

/// Default analytics window (1 hour).
pub const DEFAULT_ANALYTICS_WINDOW: Duration = Duration::from_secs(3600);

/// Default path history window (24 hours).
pub const DEFAULT_PATH_WINDOW: Duration = Duration::from_secs(24 * 3600);

// =============================================================================
// Server Configuration
// =============================================================================

/// Web server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server bind address (default: "0.0.0.0").
    pub bind: String,

    /// Server port (default: 8080).
    pub port: u16,

    /// Directory served at `/` for a dashboard, if any.
    pub static_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 8080,
            static_dir: None,
        }
    }
}

// =============================================================================
// Database Configuration
// =============================================================================

/// Database configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database file path.
    pub path: PathBuf,

    /// Connection pool size for read operations (default: 4).
    pub pool_size: u32,

    /// How long a query waits for a pooled connection (default: 5s).
    #[serde(with = "humantime_serde")]
    pub acquire_timeout: Duration,

    /// SQLite busy timeout (default: 5s).
    #[serde(with = "humantime_serde")]
    pub busy_timeout: Duration,

    /// How long an append waits for the writer's commit (default: 10s).
    ///
    /// Must exceed `busy_timeout`, otherwise a busy insert can still commit
    /// after the collector has counted it as a failure.
    #[serde(with = "humantime_serde")]
    pub write_timeout: Duration,

    /// Writer command queue capacity (default: 1024).
    pub channel_capacity: usize,

    /// WAL checkpoint interval (default: 60s).
    #[serde(with = "humantime_serde")]
    pub checkpoint_interval: Duration,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_DB_PATH),
            pool_size: DEFAULT_POOL_SIZE,
            acquire_timeout: Duration::from_secs(5),
            busy_timeout: Duration::from_secs(5),
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            checkpoint_interval: Duration::from_secs(60),
        }
    }
}

impl DatabaseConfig {
    /// Storage builder carrying these settings.
    pub fn storage_builder(&self) -> StorageBuilder {
        StorageBuilder::new(&self.path)
            .pool_size(self.pool_size)
            .channel_capacity(self.channel_capacity)
            .acquire_timeout(self.acquire_timeout)
            .busy_timeout(self.busy_timeout)
            .write_timeout(self.write_timeout)
            .checkpoint_interval(self.checkpoint_interval)
    }
}

// =============================================================================
// Query Configuration
// =============================================================================

/// Analytics configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyticsConfig {
    /// Look-back window for the altitude delta (default: 1h).
    #[serde(with = "humantime_serde")]
    pub window: Duration,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            window: DEFAULT_ANALYTICS_WINDOW,
        }
    }
}

/// Path history configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathConfig {
    /// Window used when the request names none (default: 24h).
    #[serde(with = "humantime_serde")]
    pub default_window: Duration,

    /// Largest window a request may ask for (default: unbounded).
    #[serde(with = "humantime_serde")]
    pub max_window: Option<Duration>,
}

impl Default for PathConfig {
    fn default() -> Self {
        Self {
            default_window: DEFAULT_PATH_WINDOW,
            max_window: None,
        }
    }
}

// =============================================================================
// Application Configuration
// =============================================================================

/// Top-level application configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Web server configuration.
    pub server: ServerConfig,

    /// Database configuration.
    pub database: DatabaseConfig,

    /// Collector loop and source configuration.
    pub collector: CollectorConfig,

    /// Analytics configuration.
    pub analytics: AnalyticsConfig,

    /// Path history configuration.
    pub path: PathConfig,
}

impl AppConfig {
    /// Load configuration from a YAML file.
    ///
    /// # Errors
    /// Returns `ConfigError` if the file cannot be read, parsed, or validated.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Parse, expand and validate configuration from YAML text.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let mut config: Self = serde_yaml::from_str(content)?;
        config.collector.expand_env();
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    /// Returns `ConfigError::ValidationError` if any field is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Validate server bind address
        self.server.bind.parse::<IpAddr>().map_err(|_| {
            ConfigError::ValidationError(format!(
                "invalid server bind address: '{}'",
                self.server.bind
            ))
        })?;

        // Validate server port
        if self.server.port == 0 {
            return Err(ConfigError::ValidationError(
                "server port must be non-zero".to_string(),
            ));
        }

        // Validate database pool size
        if self.database.pool_size == 0 {
            return Err(ConfigError::ValidationError(
                "database pool_size must be positive".to_string(),
            ));
        }

        // Validate channel capacity
        if self.database.channel_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "database channel_capacity must be positive".to_string(),
            ));
        }

        if self.database.write_timeout <= self.database.busy_timeout {
            return Err(ConfigError::ValidationError(format!(
                "database write_timeout ({}) must exceed busy_timeout ({})",
                humantime::format_duration(self.database.write_timeout),
                humantime::format_duration(self.database.busy_timeout)
            )));
        }

        self.collector.validate()?;

        if self.analytics.window.as_secs() == 0 {
            return Err(ConfigError::ValidationError(
                "analytics window must be at least one second".to_string(),
            ));
        }

        if self.path.default_window.as_secs() == 0 {
            return Err(ConfigError::ValidationError(
                "path default_window must be at least one second".to_string(),
            ));
        }

        if let Some(max) = self.path.max_window
            && max < self.path.default_window
        {
            return Err(ConfigError::ValidationError(format!(
                "path default_window ({}) exceeds max_window ({})",
                humantime::format_duration(self.path.default_window),
                humantime::format_duration(max)
            )));
        }

        Ok(())
    }
}
