//! HTTP telemetry source.
//!
//! - [`HttpSource`]: Fetches one JSON telemetry record per call

mod source;

pub use source::{DEFAULT_TIMEOUT, HttpSource, HttpSourceConfig, parse_payload};
