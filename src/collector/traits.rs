//! Core collector traits and types.

use std::time::Duration;

use serde::Serialize;
use strum_macros::{AsRefStr, Display};
use thiserror::Error;

use crate::storage::{Sample, SampleWriter, StorageError};

/// Minimum allowed poll interval (1 second).
pub const MIN_INTERVAL: Duration = Duration::from_secs(1);

/// Why a single fetch produced no sample.
///
/// Neither variant is fatal: the loop logs it and sleeps until the next cycle.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FetchError {
    /// Network failure, timeout, or non-success HTTP status.
    #[error("source unreachable: {0}")]
    Unreachable(String),

    /// The response is missing a required field or carries a malformed one.
    #[error("incomplete data: field '{field}' {detail}")]
    IncompleteData { field: &'static str, detail: String },
}

impl FetchError {
    pub(crate) fn incomplete(field: &'static str, detail: impl Into<String>) -> Self {
        Self::IncompleteData {
            field,
            detail: detail.into(),
        }
    }
}

/// Errors from setting up or stopping the collector itself.
#[derive(Debug, Error)]
pub enum CollectorError {
    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// The loop did not stop within the shutdown timeout.
    #[error("collector did not stop within {0:?}")]
    ShutdownTimeout(Duration),

    /// The loop task panicked or was aborted.
    #[error("collector task failed: {0}")]
    Join(String),
}

/// Lifecycle state of the collector loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, AsRefStr)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum CollectorState {
    /// Constructed, first cycle not started.
    Idle,
    /// Waiting on the source.
    Fetching,
    /// Waiting on the store.
    Storing,
    /// Between cycles; the only point where cancellation is honored.
    Sleeping,
    /// Cancelled or bounded run complete.
    Stopped,
}

/// A telemetry source producing one sample per call.
///
/// Implementations perform exactly one bounded-latency request and never
/// retry; retry cadence belongs to the loop.
#[async_trait::async_trait]
pub trait TelemetrySource: Send + Sync + 'static {
    /// Identifier used in logs (e.g. the source URL).
    fn name(&self) -> &str;

    /// Fetch and validate one observation.
    async fn fetch(&self) -> Result<Sample, FetchError>;
}

/// Destination for fetched samples.
#[async_trait::async_trait]
pub trait SampleSink: Send + Sync + 'static {
    /// Persist the sample and return its sequence id.
    async fn append(&self, sample: Sample) -> Result<i64, StorageError>;
}

#[async_trait::async_trait]
impl SampleSink for SampleWriter {
    async fn append(&self, sample: Sample) -> Result<i64, StorageError> {
        SampleWriter::append(self, sample).await
    }
}
