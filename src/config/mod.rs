//! Configuration module for orbtrack.
//!
//! Provides YAML-based configuration loading and validation for:
//! - Server settings (port, bind address, static directory)
//! - Database settings (path, pool, timeouts, channel capacity)
//! - Collector settings (source, cadence, bounded run)
//! - Query windows (analytics, path history)

mod app;
mod collector;
mod validation;

pub use app::{AnalyticsConfig, AppConfig, DatabaseConfig, PathConfig, ServerConfig};
pub use collector::CollectorConfig;
pub use validation::{ConfigError, expand_env_vars, parse_duration};

// Re-export constants
pub use app::{DEFAULT_ANALYTICS_WINDOW, DEFAULT_DB_PATH, DEFAULT_PATH_WINDOW};
pub use crate::storage::DEFAULT_CHANNEL_CAPACITY;
pub use collector::{DEFAULT_INTERVAL, DEFAULT_MIN_REQUEST_SPACING, DEFAULT_SOURCE_URL};
