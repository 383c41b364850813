//! Collector configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::collector::{HttpSourceConfig, LoopConfig, MIN_INTERVAL};

use super::validation::{ConfigError, expand_env_vars};

/// Default telemetry source.
pub const DEFAULT_SOURCE_URL: &str = "https://api.wheretheiss.at/v1/satellites/25544";

/// Default poll interval (1.1 seconds).
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(1100);

/// Default minimum spacing between requests the source tolerates (1 second).
pub const DEFAULT_MIN_REQUEST_SPACING: Duration = Duration::from_secs(1);

/// Collector loop and source configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    /// Source URL; `${VAR}` and `${VAR:-default}` are expanded on load.
    pub source_url: String,

    /// Sleep between cycles (default: 1100ms).
    #[serde(with = "humantime_serde")]
    pub interval: Duration,

    /// Minimum request spacing required by the source (default: 1s).
    #[serde(with = "humantime_serde")]
    pub min_request_spacing: Duration,

    /// Request timeout (default: 5s).
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    /// Stop after this many attempted cycles.
    pub max_samples: Option<u64>,

    /// Stop after roughly this long, counted in interval-sized cycles.
    #[serde(with = "humantime_serde")]
    pub run_for: Option<Duration>,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            source_url: DEFAULT_SOURCE_URL.to_string(),
            interval: DEFAULT_INTERVAL,
            min_request_spacing: DEFAULT_MIN_REQUEST_SPACING,
            timeout: crate::collector::http::DEFAULT_TIMEOUT,
            max_samples: None,
            run_for: None,
        }
    }
}

impl CollectorConfig {
    /// Expand environment variables in the source URL.
    pub fn expand_env(&mut self) {
        self.source_url = expand_env_vars(&self.source_url);
    }

    /// Number of cycles a bounded run attempts, if bounded.
    ///
    /// When both `max_samples` and `run_for` are set the smaller bound wins.
    pub fn sample_limit(&self) -> Option<u64> {
        let by_duration = self.run_for.map(|run_for| {
            let cycles = run_for.as_nanos() / self.interval.as_nanos().max(1);
            u64::try_from(cycles).unwrap_or(u64::MAX)
        });

        match (self.max_samples, by_duration) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Source settings for [`crate::HttpSource`].
    pub fn source_config(&self) -> HttpSourceConfig {
        HttpSourceConfig::new(&self.source_url).with_timeout(self.timeout)
    }

    /// Loop settings for [`crate::CollectorLoop`].
    pub fn loop_config(&self) -> LoopConfig {
        let config = LoopConfig::new(self.interval);
        match self.sample_limit() {
            Some(limit) => config.with_limit(limit),
            None => config,
        }
    }

    /// Validate collector settings.
    ///
    /// # Errors
    /// Returns `ConfigError::ValidationError` if any field is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let scheme_ok = self.source_url.starts_with("http://")
            || self.source_url.starts_with("https://");
        if !scheme_ok {
            return Err(ConfigError::ValidationError(format!(
                "collector source_url must be http(s): '{}'",
                self.source_url
            )));
        }

        if self.interval < MIN_INTERVAL {
            return Err(ConfigError::ValidationError(format!(
                "collector interval must be at least {:?}",
                MIN_INTERVAL
            )));
        }

        // 1.1x spacing, in integer nanoseconds.
        let min_interval = self
            .min_request_spacing
            .checked_mul(11)
            .map(|d| d / 10)
            .ok_or_else(|| {
                ConfigError::ValidationError(format!(
                    "collector min_request_spacing is too large: {}",
                    humantime::format_duration(self.min_request_spacing)
                ))
            })?;
        if self.interval < min_interval {
            return Err(ConfigError::ValidationError(format!(
                "collector interval {} must be at least 1.1x min_request_spacing ({})",
                humantime::format_duration(self.interval),
                humantime::format_duration(min_interval)
            )));
        }

        if self.timeout.is_zero() {
            return Err(ConfigError::ValidationError(
                "collector timeout must be non-zero".to_string(),
            ));
        }

        if self.max_samples == Some(0) {
            return Err(ConfigError::ValidationError(
                "collector max_samples must be non-zero when set".to_string(),
            ));
        }

        if let Some(run_for) = self.run_for
            && run_for < self.interval
        {
            return Err(ConfigError::ValidationError(format!(
                "collector run_for must be at least one interval ({})",
                humantime::format_duration(self.interval)
            )));
        }

        Ok(())
    }
}
