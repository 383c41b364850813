//! orbtrack - Orbital Telemetry Collector
//!
//! This crate samples a remote object's live telemetry (position, altitude,
//! velocity) at a bounded rate, keeps it as an append-only SQLite time series
//! and serves derived analytics as JSON. It can be used as a library or run
//! as a standalone binary with the `orbtrack` executable.
//!
//! # Architecture
//!
//! - **Storage**: SQLite (WAL) with a single writer actor and a read-only pool
//! - **Collector**: Rate-limited fetch/store loop over a [`TelemetrySource`]
//! - **Analytics**: Extrema and a windowed altitude delta per request
//! - **Server**: Axum JSON API, health probes and collector statistics
//!
//! # Example
//!
//! ```rust,no_run
//! use orbtrack::{AnalyticsEngine, StorageBuilder};
//! use std::time::Duration;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let handles = StorageBuilder::new("data/orbtrack.db").build().await?;
//! let mut snapshot = handles.reader.snapshot().await?;
//! let analytics = AnalyticsEngine::new(Duration::from_secs(3600))
//!     .compute(&mut snapshot)
//!     .await?;
//! println!("{}", serde_json::to_string(&analytics)?);
//! # drop(snapshot);
//! handles.shutdown().await?;
//! # Ok(())
//! # }
//! ```

pub mod analytics;
pub mod collector;
pub mod config;
pub mod server;
pub mod storage;

pub use analytics::{AltitudeDelta, AnalyticsEngine, AnalyticsResult, WindowDelta};
pub use collector::{
    CollectorError, CollectorHandle, CollectorLoop, CollectorMonitor, CollectorState,
    CollectorStatus, FetchError, HttpSource, HttpSourceConfig, LoopConfig, SampleSink,
    TelemetrySource,
};
pub use config::{AppConfig, ConfigError};
pub use storage::{
    Extrema, Sample, SampleReader, SampleWriter, Snapshot, StorageAdmin, StorageBuilder,
    StorageError, StorageHandles,
};
