//! Analytics over the stored series.
//!
//! Everything is recomputed per request from one read snapshot: the extrema
//! and the altitude change between the latest sample and the sample nearest
//! to one window earlier.

use std::time::Duration;

use serde::{Serialize, Serializer};

use crate::storage::{Extrema, Sample, Snapshot, StorageError};

/// Altitude change over the configured window, as actually measured.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WindowDelta {
    /// `latest.altitude - past.altitude`, in kilometers.
    pub delta_km: f64,
    /// Timestamp of the past sample.
    pub from_timestamp: i64,
    /// Timestamp of the latest sample.
    pub to_timestamp: i64,
    /// `to_timestamp - from_timestamp`; shorter than the window for a young series.
    pub span_seconds: i64,
    /// Configured window.
    pub window_seconds: i64,
}

/// Altitude delta, or the `"unavailable"` sentinel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AltitudeDelta {
    /// No latest sample, or nothing to compare it with.
    Unavailable,
    Measured(WindowDelta),
}

impl AltitudeDelta {
    /// The measured delta in kilometers, if any.
    pub fn km(&self) -> Option<f64> {
        match self {
            Self::Unavailable => None,
            Self::Measured(delta) => Some(delta.delta_km),
        }
    }
}

impl Serialize for AltitudeDelta {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Unavailable => serializer.serialize_str("unavailable"),
            Self::Measured(delta) => delta.serialize(serializer),
        }
    }
}

/// Derived analytics for one request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AnalyticsResult {
    /// Bounds over the whole series; `null` when the store is empty.
    pub extrema: Option<Extrema>,
    pub altitude_delta: AltitudeDelta,
}

/// Computes [`AnalyticsResult`] for a fixed look-back window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnalyticsEngine {
    window_seconds: i64,
}

impl AnalyticsEngine {
    /// Create an engine; sub-second parts of `window` are dropped.
    pub fn new(window: Duration) -> Self {
        Self {
            window_seconds: i64::try_from(window.as_secs()).unwrap_or(i64::MAX),
        }
    }

    /// Configured window in seconds.
    pub fn window_seconds(&self) -> i64 {
        self.window_seconds
    }

    /// Compute analytics against one snapshot.
    pub async fn compute(&self, snapshot: &mut Snapshot) -> Result<AnalyticsResult, StorageError> {
        let latest = snapshot.latest().await?;
        self.compute_with_latest(snapshot, latest.as_ref()).await
    }

    /// Compute analytics for a latest sample already read from `snapshot`.
    pub async fn compute_with_latest(
        &self,
        snapshot: &mut Snapshot,
        latest: Option<&Sample>,
    ) -> Result<AnalyticsResult, StorageError> {
        let extrema = snapshot.extrema().await?;

        let Some(latest) = latest else {
            return Ok(AnalyticsResult {
                extrema,
                altitude_delta: AltitudeDelta::Unavailable,
            });
        };

        let target = latest.timestamp_utc.saturating_sub(self.window_seconds);
        let altitude_delta = match snapshot.nearest(target).await? {
            Some(past) => AltitudeDelta::Measured(WindowDelta {
                delta_km: latest.altitude - past.altitude,
                from_timestamp: past.timestamp_utc,
                to_timestamp: latest.timestamp_utc,
                span_seconds: latest.timestamp_utc.saturating_sub(past.timestamp_utc),
                window_seconds: self.window_seconds,
            }),
            None => AltitudeDelta::Unavailable,
        };

        tracing::trace!(
            target_timestamp = target,
            delta = ?altitude_delta.km(),
            "Analytics computed"
        );

        Ok(AnalyticsResult {
            extrema,
            altitude_delta,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{Sample, StorageBuilder, StorageHandles};
    use serde_json::json;
    use tempfile::TempDir;

    async fn store_with(samples: &[(i64, f64)]) -> (TempDir, StorageHandles) {
        let dir = tempfile::tempdir().unwrap();
        let handles = StorageBuilder::new(dir.path().join("analytics.db"))
            .build()
            .await
            .unwrap();
        for &(ts, alt) in samples {
            handles
                .writer
                .append(Sample::new(ts, 0.0, ts as f64 / 100.0, alt, 27_600.0))
                .await
                .unwrap();
        }
        (dir, handles)
    }

    async fn compute(handles: &StorageHandles, window: Duration) -> AnalyticsResult {
        let mut snapshot = handles.reader.snapshot().await.unwrap();
        AnalyticsEngine::new(window)
            .compute(&mut snapshot)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_delta_uses_nearest_to_window_start() {
        let (_dir, handles) = store_with(&[(0, 400.0), (3600, 410.0), (3601, 411.0)]).await;

        let result = compute(&handles, Duration::from_secs(3600)).await;
        let AltitudeDelta::Measured(delta) = result.altitude_delta else {
            panic!("expected a measured delta");
        };
        assert_eq!(delta.delta_km, 11.0);
        assert_eq!(delta.from_timestamp, 0);
        assert_eq!(delta.to_timestamp, 3601);
        assert_eq!(delta.span_seconds, 3601);
        assert_eq!(delta.window_seconds, 3600);

        let extrema = result.extrema.unwrap();
        assert_eq!(extrema.max_altitude, 411.0);
        assert_eq!(extrema.min_altitude, 400.0);

        handles.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_empty_store_is_unavailable() {
        let (_dir, handles) = store_with(&[]).await;

        let result = compute(&handles, Duration::from_secs(3600)).await;
        assert_eq!(
            serde_json::to_value(result).unwrap(),
            json!({ "extrema": null, "altitude_delta": "unavailable" })
        );

        handles.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_zero_altitude_is_a_value() {
        let (_dir, handles) = store_with(&[(100, 0.0), (200, 0.0)]).await;

        let result = compute(&handles, Duration::from_secs(100)).await;
        assert_eq!(result.altitude_delta.km(), Some(0.0));
        assert_eq!(result.extrema.unwrap().min_altitude, 0.0);

        let value = serde_json::to_value(result).unwrap();
        assert_eq!(value["altitude_delta"]["delta_km"], json!(0.0));

        handles.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_single_sample_compares_with_itself() {
        let (_dir, handles) = store_with(&[(5000, 420.5)]).await;

        let result = compute(&handles, Duration::from_secs(3600)).await;
        let AltitudeDelta::Measured(delta) = result.altitude_delta else {
            panic!("expected a measured delta");
        };
        assert_eq!(delta.delta_km, 0.0);
        assert_eq!(delta.span_seconds, 0);

        handles.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_young_series_reports_short_span() {
        let (_dir, handles) = store_with(&[(1000, 410.0), (1600, 409.5)]).await;

        let result = compute(&handles, Duration::from_secs(3600)).await;
        let AltitudeDelta::Measured(delta) = result.altitude_delta else {
            panic!("expected a measured delta");
        };
        assert_eq!(delta.delta_km, -0.5);
        assert_eq!(delta.span_seconds, 600);
        assert_eq!(delta.window_seconds, 3600);

        handles.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_compute_with_latest_matches_compute() {
        let (_dir, handles) = store_with(&[(0, 400.0), (1800, 405.0), (3600, 410.0)]).await;
        let engine = AnalyticsEngine::new(Duration::from_secs(1800));

        let mut snapshot = handles.reader.snapshot().await.unwrap();
        let latest = snapshot.latest().await.unwrap();
        let reused = engine
            .compute_with_latest(&mut snapshot, latest.as_ref())
            .await
            .unwrap();
        let fresh = engine.compute(&mut snapshot).await.unwrap();
        assert_eq!(reused, fresh);
        assert_eq!(reused.altitude_delta.km(), Some(5.0));

        let none = engine.compute_with_latest(&mut snapshot, None).await.unwrap();
        assert!(none.altitude_delta.km().is_none());
        assert!(none.extrema.is_some());
        drop(snapshot);

        handles.shutdown().await.unwrap();
    }

    #[test]
    fn test_window_truncates_to_seconds() {
        assert_eq!(AnalyticsEngine::new(Duration::from_millis(3600_900)).window_seconds(), 3600);
    }
}
