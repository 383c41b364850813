//! Collector Layer
//!
//! A single long-running loop that polls a telemetry source and appends each
//! observation to storage. The loop runs in its own Tokio task and is the
//! only writer of the store.
//!
//! # Architecture
//!
//! - [`TelemetrySource`]: One bounded request per call, no retries
//! - [`SampleSink`]: Where samples go (the storage writer in production)
//! - [`CollectorLoop`]: Fetch, store, sleep; optional bounded run
//! - [`CollectorHandle`]: Spawned loop with cooperative shutdown
//!
//! # Example
//!
//! ```rust,no_run
//! use orbtrack::{CollectorHandle, CollectorLoop, HttpSource, HttpSourceConfig, LoopConfig, StorageBuilder};
//! use std::time::Duration;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let handles = StorageBuilder::new("/tmp/orbtrack.db").build().await?;
//! let source = HttpSource::new(HttpSourceConfig::new(
//!     "https://api.wheretheiss.at/v1/satellites/25544",
//! ))?;
//! let collector = CollectorLoop::new(
//!     source,
//!     handles.writer.clone(),
//!     LoopConfig::new(Duration::from_millis(1100)).with_limit(10),
//! );
//! let status = CollectorHandle::spawn(collector).join().await?;
//! println!("stored {} samples", status.stored);
//! handles.shutdown().await?;
//! # Ok(())
//! # }
//! ```

pub mod http;
mod runner;
mod traits;

pub use http::{HttpSource, HttpSourceConfig};
pub use runner::{
    CollectorHandle, CollectorLoop, CollectorMonitor, CollectorStatus, DEFAULT_SHUTDOWN_TIMEOUT,
    LoopConfig,
};
pub use traits::{
    CollectorError, CollectorState, FetchError, MIN_INTERVAL, SampleSink, TelemetrySource,
};
