//! Storage Layer
//!
//! Append-only SQLite time series of telemetry samples with read/write
//! separation:
//! - **Writer**: Async actor task owning the only write connection
//! - **Reader**: Read-only connection pool; each query runs in one snapshot
//!
//! # Components
//!
//! - [`SampleWriter`]: Appends samples and returns their sequence ids
//! - [`SampleReader`] / [`Snapshot`]: latest, range, nearest, extrema
//! - [`StorageAdmin`]: Checkpoint and shutdown
//! - [`StorageBuilder`] / [`StorageHandles`]: Initialization and lifecycle management

mod actor;
mod builder;
pub mod db;
mod error;
mod facades;
mod schema;
mod types;

pub use builder::{DEFAULT_CHANNEL_CAPACITY, StorageBuilder, StorageHandles};
pub use error::StorageError;
pub use facades::{DEFAULT_WRITE_TIMEOUT, SampleReader, SampleWriter, Snapshot, StorageAdmin};
pub use schema::init_schema;
pub use types::{Extrema, Sample};
