//! Core data types for the storage layer.
//!
//! - [`Sample`]: One telemetry observation, immutable once appended
//! - [`Extrema`]: Longitude/altitude bounds over the whole series

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A telemetry observation stored in the `samples` table.
///
/// Samples produced by a source carry no `sequence_id`; the store assigns one
/// on append. Sequence order is the only ordering the store guarantees, since
/// source timestamps may jitter or arrive out of order.
///
/// # Example
///
/// ```
/// use orbtrack::Sample;
///
/// let sample = Sample::new(1_700_000_000, 51.5, -0.12, 420.3, 27_600.0);
/// assert!(sample.sequence_id.is_none());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Store-assigned insertion order (None until appended).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence_id: Option<i64>,
    /// Source-supplied Unix timestamp (seconds).
    pub timestamp_utc: i64,
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
    /// Altitude in kilometers.
    pub altitude: f64,
    /// Velocity in the source's native unit.
    pub velocity: f64,
}

impl Sample {
    /// Create a sample that has not been stored yet.
    pub fn new(
        timestamp_utc: i64,
        latitude: f64,
        longitude: f64,
        altitude: f64,
        velocity: f64,
    ) -> Self {
        Self {
            sequence_id: None,
            timestamp_utc,
            latitude,
            longitude,
            altitude,
            velocity,
        }
    }

    /// Source timestamp as a UTC datetime, if representable.
    pub fn observed_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.timestamp_utc, 0)
    }
}

/// Row shape of the `samples` table.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct SampleRow {
    pub id: i64,
    pub timestamp_utc: i64,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    pub velocity: f64,
}

impl From<SampleRow> for Sample {
    fn from(row: SampleRow) -> Self {
        Self {
            sequence_id: Some(row.id),
            timestamp_utc: row.timestamp_utc,
            latitude: row.latitude,
            longitude: row.longitude,
            altitude: row.altitude,
            velocity: row.velocity,
        }
    }
}

/// Longitude and altitude bounds across every stored sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Extrema {
    pub max_longitude: f64,
    pub min_longitude: f64,
    pub max_altitude: f64,
    pub min_altitude: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_sample_has_no_sequence_id() {
        let sample = Sample::new(100, 1.0, 2.0, 400.0, 27_000.0);
        assert_eq!(sample.sequence_id, None);
        assert_eq!(sample.timestamp_utc, 100);
    }

    #[test]
    fn test_sample_serialization_skips_missing_sequence_id() {
        let sample = Sample::new(100, 1.0, 2.0, 400.0, 27_000.0);
        let json = serde_json::to_value(sample).unwrap();
        assert!(json.get("sequence_id").is_none());
        assert_eq!(json["altitude"], 400.0);

        let stored = Sample {
            sequence_id: Some(7),
            ..sample
        };
        let json = serde_json::to_value(stored).unwrap();
        assert_eq!(json["sequence_id"], 7);
    }

    #[test]
    fn test_observed_at() {
        let sample = Sample::new(0, 0.0, 0.0, 0.0, 0.0);
        assert_eq!(sample.observed_at(), Some(DateTime::UNIX_EPOCH));
    }

    #[test]
    fn test_row_conversion_assigns_sequence_id() {
        let row = SampleRow {
            id: 3,
            timestamp_utc: 10,
            latitude: 1.0,
            longitude: 2.0,
            altitude: 3.0,
            velocity: 4.0,
        };
        let sample = Sample::from(row);
        assert_eq!(sample.sequence_id, Some(3));
        assert_eq!(sample.velocity, 4.0);
    }
}
