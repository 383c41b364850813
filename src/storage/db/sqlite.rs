//! SQLite backend implementation using sqlx.
//!
//! The writer actor owns one read-write connection; queries go through a
//! read-only pool over the same file. WAL mode lets readers proceed while the
//! writer commits.

use std::path::Path;
use std::time::Duration;

use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool as SqlxPool, SqlitePoolOptions,
    SqliteSynchronous,
};
use sqlx::{Connection, SqliteConnection};

use crate::storage::StorageError;

/// Default maximum connections in the read pool.
pub const DEFAULT_MAX_CONNECTIONS: u32 = 4;

/// Default pool acquire timeout.
pub const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// Default SQLite busy timeout.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Connection options for the single writer.
///
/// - WAL journal mode so readers never wait on the writer
/// - Full synchronous mode: every committed sample survives a crash
/// - Create database if not exists
pub fn writer_options(path: &Path, busy_timeout: Duration) -> SqliteConnectOptions {
    SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Full)
        .busy_timeout(busy_timeout)
}

/// Connection options for readers. The journal mode is persistent in the
/// file, so readers leave it alone.
pub fn reader_options(path: &Path, busy_timeout: Duration) -> SqliteConnectOptions {
    SqliteConnectOptions::new()
        .filename(path)
        .read_only(true)
        .busy_timeout(busy_timeout)
}

/// Open the writer connection.
pub async fn open_writer(
    path: &Path,
    busy_timeout: Duration,
) -> Result<SqliteConnection, StorageError> {
    let conn = SqliteConnection::connect_with(&writer_options(path, busy_timeout)).await?;
    Ok(conn)
}

/// Read-only SQLite connection pool.
#[derive(Clone)]
pub struct SqlitePool {
    inner: SqlxPool,
}

impl std::fmt::Debug for SqlitePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlitePool").finish_non_exhaustive()
    }
}

impl SqlitePool {
    /// Connect a read-only pool to an existing database file.
    ///
    /// The schema must already exist; the writer actor creates it before
    /// readers are opened.
    pub async fn connect_readonly(
        path: &Path,
        max_connections: u32,
        acquire_timeout: Duration,
        busy_timeout: Duration,
    ) -> Result<Self, StorageError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .connect_with(reader_options(path, busy_timeout))
            .await?;

        Ok(Self { inner: pool })
    }

    /// Get the underlying sqlx pool for direct query execution.
    #[inline]
    pub fn inner(&self) -> &SqlxPool {
        &self.inner
    }

    /// Close the connection pool gracefully.
    pub async fn close(&self) {
        self.inner.close().await;
    }

    /// Check if the pool is closed.
    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_writer_uses_wal() {
        let dir = tempdir().unwrap();
        let mut conn = open_writer(&dir.path().join("wal.db"), DEFAULT_BUSY_TIMEOUT)
            .await
            .unwrap();

        let mode: String = sqlx::query_scalar("PRAGMA journal_mode")
            .fetch_one(&mut conn)
            .await
            .unwrap();
        assert_eq!(mode, "wal");
        conn.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_readonly_pool_rejects_writes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ro.db");
        let mut writer = open_writer(&path, DEFAULT_BUSY_TIMEOUT).await.unwrap();
        sqlx::query("CREATE TABLE t (x INTEGER)")
            .execute(&mut writer)
            .await
            .unwrap();

        let pool = SqlitePool::connect_readonly(
            &path,
            2,
            DEFAULT_ACQUIRE_TIMEOUT,
            DEFAULT_BUSY_TIMEOUT,
        )
        .await
        .unwrap();
        assert!(!pool.is_closed());

        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM t")
            .fetch_one(pool.inner())
            .await
            .unwrap();
        assert_eq!(row.0, 0);

        let result = sqlx::query("INSERT INTO t (x) VALUES (1)")
            .execute(pool.inner())
            .await;
        assert!(result.is_err());

        pool.close().await;
        assert!(pool.is_closed());
    }
}
