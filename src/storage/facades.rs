//! User-facing storage facades.
//!
//! - `SampleWriter`: Appends via the writer actor, bounded wait for the commit
//! - `SampleReader`: Opens read snapshots over the read-only pool
//! - `Snapshot`: One read transaction; every query in it sees the same data
//! - `StorageAdmin`: Checkpoint and shutdown

use std::time::Duration;

use sqlx::{Sqlite, Transaction};
use tokio::sync::{mpsc, oneshot};
use tokio_stream::{Stream, StreamExt};

use crate::storage::StorageError;
use crate::storage::actor::Command;
use crate::storage::db::SqlitePool;
use crate::storage::types::{Extrema, Sample, SampleRow};

// =============================================================================
// SQL
// =============================================================================

const LATEST_SQL: &str = "SELECT id, timestamp_utc, latitude, longitude, altitude, velocity
     FROM samples ORDER BY id DESC LIMIT 1";

const RANGE_SQL: &str = "SELECT id, timestamp_utc, latitude, longitude, altitude, velocity
     FROM samples WHERE timestamp_utc > ?1
     ORDER BY timestamp_utc ASC, id ASC";

/// Earliest-inserted sample at the greatest timestamp not after the target.
pub(crate) const NEAREST_AT_OR_BELOW_SQL: &str = "SELECT id, timestamp_utc, latitude, longitude, altitude, velocity
     FROM samples
     WHERE timestamp_utc = (SELECT MAX(timestamp_utc) FROM samples WHERE timestamp_utc <= ?1)
     ORDER BY id ASC LIMIT 1";

/// Earliest-inserted sample at the smallest timestamp not before the target.
pub(crate) const NEAREST_AT_OR_ABOVE_SQL: &str = "SELECT id, timestamp_utc, latitude, longitude, altitude, velocity
     FROM samples
     WHERE timestamp_utc = (SELECT MIN(timestamp_utc) FROM samples WHERE timestamp_utc >= ?1)
     ORDER BY id ASC LIMIT 1";

/// Each bound is a separate scalar subquery so SQLite answers it with one
/// index seek instead of an aggregate scan.
pub(crate) const EXTREMA_SQL: &str = "SELECT
        (SELECT MAX(longitude) FROM samples),
        (SELECT MIN(longitude) FROM samples),
        (SELECT MAX(altitude) FROM samples),
        (SELECT MIN(altitude) FROM samples)";

const COUNT_SQL: &str = "SELECT COUNT(*) FROM samples";

/// Default bound on waiting for the writer actor.
///
/// Twice the default busy timeout, so a locked insert fails inside the actor
/// and reports `WriteFailed` before the caller stops waiting.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(10);

// =============================================================================
// Writer
// =============================================================================

/// Storage writer for the single collector.
///
/// Unlike a fire-and-forget queue, `append` waits for the commit so the
/// caller learns the assigned sequence id or the failure.
#[derive(Clone)]
pub struct SampleWriter {
    tx: mpsc::Sender<Command>,
    timeout: Duration,
}

impl std::fmt::Debug for SampleWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SampleWriter")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl SampleWriter {
    pub(crate) fn new(tx: mpsc::Sender<Command>, timeout: Duration) -> Self {
        Self { tx, timeout }
    }

    /// Append a sample and return its sequence id.
    ///
    /// Both the enqueue and the wait for the commit are bounded by the
    /// writer timeout. A timeout while waiting for the commit does not
    /// cancel the insert: the actor may still store the row after this
    /// returns `Internal`. Keep the writer timeout above the busy timeout.
    pub async fn append(&self, sample: Sample) -> Result<i64, StorageError> {
        let (reply, rx) = oneshot::channel();

        tokio::time::timeout(self.timeout, self.tx.send(Command::Append { sample, reply }))
            .await
            .map_err(|_| StorageError::ChannelSend)?
            .map_err(|_| StorageError::ChannelSend)?;

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(StorageError::ChannelSend),
            Err(_) => Err(StorageError::Internal(format!(
                "writer did not acknowledge append within {:?}",
                self.timeout
            ))),
        }
    }
}

// =============================================================================
// Readers
// =============================================================================

/// Sample reader over the read-only pool.
///
/// The single-shot methods each open their own snapshot. Use
/// [`SampleReader::snapshot`] when several reads must agree with each other.
#[derive(Clone)]
pub struct SampleReader {
    pool: SqlitePool,
}

impl std::fmt::Debug for SampleReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SampleReader").finish_non_exhaustive()
    }
}

impl SampleReader {
    pub(crate) fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Begin a read transaction.
    ///
    /// The connection returns to the pool when the snapshot is dropped,
    /// on every exit path.
    pub async fn snapshot(&self) -> Result<Snapshot, StorageError> {
        let tx = self.pool.inner().begin().await.map_err(StorageError::read)?;
        Ok(Snapshot { tx })
    }

    /// Most recent sample by sequence id.
    pub async fn latest(&self) -> Result<Option<Sample>, StorageError> {
        self.snapshot().await?.latest().await
    }

    /// Sample closest in time to `target_timestamp`.
    pub async fn nearest(&self, target_timestamp: i64) -> Result<Option<Sample>, StorageError> {
        self.snapshot().await?.nearest(target_timestamp).await
    }

    /// Longitude/altitude bounds, `None` for an empty store.
    pub async fn extrema(&self) -> Result<Option<Extrema>, StorageError> {
        self.snapshot().await?.extrema().await
    }

    /// Number of stored samples.
    pub async fn count(&self) -> Result<u64, StorageError> {
        self.snapshot().await?.count().await
    }

    /// Collect every sample newer than `since_timestamp`, ascending.
    pub async fn range(&self, since_timestamp: i64) -> Result<Vec<Sample>, StorageError> {
        let mut snapshot = self.snapshot().await?;
        let mut stream = snapshot.range(since_timestamp);
        let mut samples = Vec::new();
        while let Some(sample) = stream.next().await {
            samples.push(sample?);
        }
        Ok(samples)
    }

    /// Close the read pool; later reads fail with `ReadFailed`.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// A consistent read view of the store.
pub struct Snapshot {
    tx: Transaction<'static, Sqlite>,
}

impl std::fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Snapshot").finish_non_exhaustive()
    }
}

impl Snapshot {
    /// Most recent sample by sequence id (not by source timestamp).
    pub async fn latest(&mut self) -> Result<Option<Sample>, StorageError> {
        let row = sqlx::query_as::<_, SampleRow>(LATEST_SQL)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(StorageError::read)?;
        Ok(row.map(Sample::from))
    }

    /// Lazy scan of samples with `timestamp_utc > since_timestamp`, ascending
    /// by timestamp with sequence id as tie-break.
    ///
    /// Calling it again re-runs the scan.
    pub fn range(
        &mut self,
        since_timestamp: i64,
    ) -> impl Stream<Item = Result<Sample, StorageError>> + Send + Unpin + '_ {
        sqlx::query_as::<_, SampleRow>(RANGE_SQL)
            .bind(since_timestamp)
            .fetch(&mut *self.tx)
            .map(|row| row.map(Sample::from).map_err(StorageError::read))
    }

    /// Sample minimizing `|timestamp_utc - target_timestamp|`; ties go to
    /// the smallest sequence id.
    ///
    /// Two index probes bracket the target, so the cost does not grow
    /// with the series.
    pub async fn nearest(&mut self, target_timestamp: i64) -> Result<Option<Sample>, StorageError> {
        let below = sqlx::query_as::<_, SampleRow>(NEAREST_AT_OR_BELOW_SQL)
            .bind(target_timestamp)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(StorageError::read)?;
        let above = sqlx::query_as::<_, SampleRow>(NEAREST_AT_OR_ABOVE_SQL)
            .bind(target_timestamp)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(StorageError::read)?;

        Ok(closest(
            target_timestamp,
            below.map(Sample::from),
            above.map(Sample::from),
        ))
    }

    /// Longitude/altitude bounds over the whole series.
    pub async fn extrema(&mut self) -> Result<Option<Extrema>, StorageError> {
        let (max_lon, min_lon, max_alt, min_alt): (
            Option<f64>,
            Option<f64>,
            Option<f64>,
            Option<f64>,
        ) = sqlx::query_as(EXTREMA_SQL)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(StorageError::read)?;

        Ok(match (max_lon, min_lon, max_alt, min_alt) {
            (Some(max_longitude), Some(min_longitude), Some(max_altitude), Some(min_altitude)) => {
                Some(Extrema {
                    max_longitude,
                    min_longitude,
                    max_altitude,
                    min_altitude,
                })
            }
            _ => None,
        })
    }

    /// Number of stored samples.
    pub async fn count(&mut self) -> Result<u64, StorageError> {
        let count: i64 = sqlx::query_scalar(COUNT_SQL)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(StorageError::read)?;
        Ok(u64::try_from(count).unwrap_or_default())
    }
}

/// Pick the candidate closest to `target`, preferring the earlier insert on
/// equal distance.
fn closest(target: i64, below: Option<Sample>, above: Option<Sample>) -> Option<Sample> {
    let key = |s: &Sample| {
        (
            s.timestamp_utc.abs_diff(target),
            s.sequence_id.unwrap_or(i64::MAX),
        )
    };
    match (below, above) {
        (Some(b), Some(a)) => Some(if key(&a) < key(&b) { a } else { b }),
        (b, a) => b.or(a),
    }
}

// =============================================================================
// Admin
// =============================================================================

/// Storage administration facade.
#[derive(Clone)]
pub struct StorageAdmin {
    tx: mpsc::Sender<Command>,
}

impl std::fmt::Debug for StorageAdmin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageAdmin").finish_non_exhaustive()
    }
}

impl StorageAdmin {
    pub(crate) fn new(tx: mpsc::Sender<Command>) -> Self {
        Self { tx }
    }

    /// Force a WAL checkpoint and wait for it.
    pub async fn checkpoint(&self) -> Result<(), StorageError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Checkpoint { reply })
            .await
            .map_err(|_| StorageError::ChannelSend)?;
        rx.await.map_err(|_| StorageError::ChannelSend)?
    }

    /// Ask the writer actor to stop after the commands already queued.
    pub async fn shutdown(&self) -> Result<(), StorageError> {
        self.tx
            .send(Command::Shutdown)
            .await
            .map_err(|_| StorageError::ChannelSend)
    }

    pub(crate) fn try_shutdown(&self) {
        let _ = self.tx.try_send(Command::Shutdown);
    }
}
