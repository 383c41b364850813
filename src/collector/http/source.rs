//! HTTP telemetry source.
//!
//! Issues one GET per call against a JSON endpoint such as
//! `https://api.wheretheiss.at/v1/satellites/25544` and validates the body
//! into a [`Sample`].

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::collector::{CollectorError, FetchError, TelemetrySource};
use crate::storage::Sample;

/// Default request timeout (5 seconds).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

fn default_timeout() -> Duration {
    DEFAULT_TIMEOUT
}

/// Configuration for the HTTP telemetry source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpSourceConfig {
    /// Source URL (HTTP or HTTPS).
    pub url: String,
    /// Request timeout covering connect, headers and body (default: 5s).
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

impl HttpSourceConfig {
    /// Create a new source configuration with the default timeout.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Set the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Telemetry source backed by a JSON-over-HTTP endpoint.
pub struct HttpSource {
    config: HttpSourceConfig,
    client: Client,
}

impl HttpSource {
    /// Create a new HTTP source.
    ///
    /// # Errors
    /// Returns `CollectorError::Config` if the HTTP client cannot be built.
    pub fn new(config: HttpSourceConfig) -> Result<Self, CollectorError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("orbtrack/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| CollectorError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }
}

impl std::fmt::Debug for HttpSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpSource")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl TelemetrySource for HttpSource {
    fn name(&self) -> &str {
        &self.config.url
    }

    async fn fetch(&self) -> Result<Sample, FetchError> {
        let response = self
            .client
            .get(&self.config.url)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    FetchError::Unreachable(format!("timed out after {:?}", self.config.timeout))
                } else {
                    FetchError::Unreachable(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Unreachable(format!("HTTP status {}", status)));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::Unreachable(format!("failed to read body: {}", e)))?;

        parse_payload(&body)
    }
}

/// Validate a source payload into an unsaved sample.
///
/// All five fields must be present and numeric; the timestamp must be an
/// integral number of seconds and coordinates must be within range. Other
/// fields are ignored.
pub fn parse_payload(body: &[u8]) -> Result<Sample, FetchError> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| FetchError::incomplete("body", format!("is not valid JSON: {}", e)))?;
    let Value::Object(obj) = value else {
        return Err(FetchError::incomplete("body", "is not a JSON object"));
    };

    let latitude = number(&obj, "latitude")?;
    let longitude = number(&obj, "longitude")?;
    let altitude = number(&obj, "altitude")?;
    let velocity = number(&obj, "velocity")?;
    let timestamp = timestamp(&obj)?;

    if !(-90.0..=90.0).contains(&latitude) {
        return Err(FetchError::incomplete(
            "latitude",
            format!("is out of range: {}", latitude),
        ));
    }
    if !(-180.0..=180.0).contains(&longitude) {
        return Err(FetchError::incomplete(
            "longitude",
            format!("is out of range: {}", longitude),
        ));
    }

    Ok(Sample::new(timestamp, latitude, longitude, altitude, velocity))
}

fn number(obj: &Map<String, Value>, field: &'static str) -> Result<f64, FetchError> {
    match obj.get(field) {
        None | Some(Value::Null) => Err(FetchError::incomplete(field, "is missing")),
        Some(v) => v
            .as_f64()
            .ok_or_else(|| FetchError::incomplete(field, format!("is not a number: {}", v))),
    }
}

fn timestamp(obj: &Map<String, Value>) -> Result<i64, FetchError> {
    const FIELD: &str = "timestamp";
    let value = obj.get(FIELD);
    if let Some(ts) = value.and_then(Value::as_i64) {
        return Ok(ts);
    }

    let seconds = number(obj, FIELD)?;
    if seconds.fract() != 0.0 || seconds.abs() > i64::MAX as f64 {
        return Err(FetchError::incomplete(
            FIELD,
            format!("is not whole seconds: {}", seconds),
        ));
    }
    Ok(seconds as i64)
}
