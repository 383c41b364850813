//! Storage builder and handles.
//!
//! Provides a builder pattern for constructing the storage layer
//! and a handles struct for accessing all storage facades.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::storage::StorageError;
use crate::storage::actor::{DEFAULT_CHECKPOINT_INTERVAL, DbActor};
use crate::storage::db::{
    DEFAULT_ACQUIRE_TIMEOUT, DEFAULT_BUSY_TIMEOUT, DEFAULT_MAX_CONNECTIONS, SqlitePool,
};
use crate::storage::facades::DEFAULT_WRITE_TIMEOUT;
use crate::storage::{SampleReader, SampleWriter, StorageAdmin};

/// Default channel capacity for writer commands.
///
/// The collector appends roughly once per second and waits for each commit,
/// so the queue only needs headroom for admin commands.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Minimum connection pool size.
const MIN_POOL_SIZE: u32 = 1;

/// Maximum connection pool size.
const MAX_POOL_SIZE: u32 = 32;

/// Builder for constructing the storage layer.
pub struct StorageBuilder {
    db_path: PathBuf,
    pool_size: u32,
    channel_capacity: usize,
    acquire_timeout: Duration,
    busy_timeout: Duration,
    write_timeout: Duration,
    checkpoint_interval: Duration,
}

impl StorageBuilder {
    /// Create a new storage builder for the database file at `db_path`.
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
            pool_size: DEFAULT_MAX_CONNECTIONS,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            acquire_timeout: DEFAULT_ACQUIRE_TIMEOUT,
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            checkpoint_interval: DEFAULT_CHECKPOINT_INTERVAL,
        }
    }

    /// Set the connection pool size for readers (clamped to 1-32).
    pub fn pool_size(mut self, size: u32) -> Self {
        self.pool_size = size.clamp(MIN_POOL_SIZE, MAX_POOL_SIZE);
        self
    }

    /// Set the channel capacity for writer commands.
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }

    /// Set how long a reader waits for a pooled connection.
    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    /// Set the SQLite busy timeout for all connections.
    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    /// Set how long an append waits for the writer actor.
    ///
    /// Keep it above the busy timeout so a busy insert reports its own
    /// error before the caller gives up.
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Set the WAL checkpoint interval.
    pub fn checkpoint_interval(mut self, interval: Duration) -> Self {
        self.checkpoint_interval = interval;
        self
    }

    /// Build the storage layer and return handles.
    ///
    /// Safe to run against an existing store: the schema is only created
    /// where missing.
    pub async fn build(self) -> Result<StorageHandles, StorageError> {
        // Create parent directory if it doesn't exist
        if let Some(parent) = self.db_path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                StorageError::Internal(format!(
                    "Failed to create database directory '{}': {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        // Writer first: it creates the file and schema the readers depend on.
        let (actor_handle, tx) = DbActor::spawn(
            &self.db_path,
            self.busy_timeout,
            self.channel_capacity,
            self.checkpoint_interval,
        )
        .await?;

        let pool = match SqlitePool::connect_readonly(
            &self.db_path,
            self.pool_size,
            self.acquire_timeout,
            self.busy_timeout,
        )
        .await
        {
            Ok(pool) => pool,
            Err(e) => {
                let _ = tx.send(crate::storage::actor::Command::Shutdown).await;
                let _ = actor_handle.await;
                return Err(e);
            }
        };

        tracing::debug!(
            path = %self.db_path.display(),
            pool_size = self.pool_size,
            "Storage initialized"
        );

        Ok(StorageHandles {
            writer: SampleWriter::new(tx.clone(), self.write_timeout),
            reader: SampleReader::new(pool.clone()),
            admin: StorageAdmin::new(tx),
            pool,
            actor_handle: Some(actor_handle),
        })
    }
}

/// Handles to all storage layer facades.
pub struct StorageHandles {
    /// Writer facade used by the collector.
    pub writer: SampleWriter,
    /// Facade for reading samples.
    pub reader: SampleReader,
    /// Facade for storage administration.
    pub admin: StorageAdmin,
    pool: SqlitePool,
    /// Internal actor handle for graceful shutdown.
    actor_handle: Option<JoinHandle<()>>,
}

impl StorageHandles {
    /// Gracefully shutdown the storage layer.
    ///
    /// Sends shutdown command to the writer actor, waits for its final
    /// checkpoint and closes the read pool.
    pub async fn shutdown(mut self) -> Result<(), StorageError> {
        self.admin.shutdown().await?;

        if let Some(handle) = self.actor_handle.take() {
            handle
                .await
                .map_err(|e| StorageError::Internal(format!("Failed to join actor task: {e}")))?;
        }

        self.pool.close().await;
        Ok(())
    }
}

impl Drop for StorageHandles {
    fn drop(&mut self) {
        // Best effort when shutdown() was never awaited
        if self.actor_handle.take().is_some() {
            self.admin.try_shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Sample;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_storage_builder_creates_parent_dir() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("nested").join("deeper").join("store.db");

        let handles = StorageBuilder::new(&db_path)
            .pool_size(2)
            .channel_capacity(8)
            .build()
            .await
            .unwrap();

        assert!(db_path.exists());
        assert_eq!(handles.reader.count().await.unwrap(), 0);
        handles.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_storage_reopen_preserves_rows() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("reopen.db");

        // Phase 1: write and shut down
        {
            let handles = StorageBuilder::new(&db_path).build().await.unwrap();
            for ts in 0..5 {
                handles
                    .writer
                    .append(Sample::new(ts, 1.0, 2.0, 400.0 + ts as f64, 27_000.0))
                    .await
                    .unwrap();
            }
            handles.admin.checkpoint().await.unwrap();
            handles.shutdown().await.unwrap();
        }

        // Phase 2: reopen runs schema setup again against the existing file
        let handles = StorageBuilder::new(&db_path).build().await.unwrap();
        assert_eq!(handles.reader.count().await.unwrap(), 5);

        let id = handles
            .writer
            .append(Sample::new(99, 0.0, 0.0, 0.0, 0.0))
            .await
            .unwrap();
        assert_eq!(id, 6);

        let latest = handles.reader.latest().await.unwrap().unwrap();
        assert_eq!(latest.timestamp_utc, 99);

        handles.shutdown().await.unwrap();
    }

    #[test]
    fn test_pool_size_is_clamped() {
        let builder = StorageBuilder::new("unused.db").pool_size(0);
        assert_eq!(builder.pool_size, MIN_POOL_SIZE);
        let builder = StorageBuilder::new("unused.db").pool_size(1000);
        assert_eq!(builder.pool_size, MAX_POOL_SIZE);
    }
}
