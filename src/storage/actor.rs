//! Writer actor with dedicated connection and MPSC channel.
//!
//! Single-writer pattern: one task owns the write connection and processes
//! commands in arrival order. Each append commits before its reply is sent,
//! so a sample the caller saw acknowledged is visible to every reader.

use std::path::Path;
use std::time::Duration;

use sqlx::{Connection, SqliteConnection};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::storage::StorageError;
use crate::storage::db::open_writer;
use crate::storage::schema::init_schema;
use crate::storage::types::Sample;

/// Default interval between passive WAL checkpoints.
pub const DEFAULT_CHECKPOINT_INTERVAL: Duration = Duration::from_secs(60);

const INSERT_SAMPLE_SQL: &str = "INSERT INTO samples (timestamp_utc, latitude, longitude, altitude, velocity)
     VALUES (?1, ?2, ?3, ?4, ?5)";

// =============================================================================
// Commands
// =============================================================================

/// Commands sent to the writer actor.
#[derive(Debug)]
pub enum Command {
    /// Append one sample; replies with the assigned sequence id.
    Append {
        sample: Sample,
        reply: oneshot::Sender<Result<i64, StorageError>>,
    },
    /// Force a WAL checkpoint.
    Checkpoint {
        reply: oneshot::Sender<Result<(), StorageError>>,
    },
    /// Graceful shutdown.
    Shutdown,
}

// =============================================================================
// Actor
// =============================================================================

/// Database writer actor.
pub struct DbActor {
    conn: SqliteConnection,
    rx: mpsc::Receiver<Command>,
    checkpoint_interval: Duration,
}

impl DbActor {
    /// Open the write connection, ensure the schema and spawn the actor task.
    ///
    /// The schema exists by the time this returns, so readers may be opened
    /// right after.
    pub async fn spawn(
        db_path: &Path,
        busy_timeout: Duration,
        channel_capacity: usize,
        checkpoint_interval: Duration,
    ) -> Result<(JoinHandle<()>, mpsc::Sender<Command>), StorageError> {
        let (tx, rx) = mpsc::channel(channel_capacity);
        let mut conn = open_writer(db_path, busy_timeout).await?;
        init_schema(&mut conn).await?;

        let actor = DbActor {
            conn,
            rx,
            checkpoint_interval,
        };
        let handle = tokio::spawn(actor.run());

        Ok((handle, tx))
    }

    async fn run(mut self) {
        tracing::info!("DbActor started");

        let mut checkpoint_timer = tokio::time::interval(self.checkpoint_interval);
        checkpoint_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick completes immediately.
        checkpoint_timer.tick().await;

        loop {
            tokio::select! {
                cmd = self.rx.recv() => match cmd {
                    Some(cmd) => {
                        if self.handle_command(cmd).await {
                            break; // Shutdown requested
                        }
                    }
                    None => {
                        tracing::warn!("Channel disconnected, shutting down");
                        break;
                    }
                },
                _ = checkpoint_timer.tick() => {
                    if let Err(e) = self.checkpoint().await {
                        tracing::error!(error = %e, "Periodic checkpoint failed");
                    }
                }
            }
        }

        if let Err(e) = self.checkpoint().await {
            tracing::warn!(error = %e, "Final checkpoint failed");
        }
        if let Err(e) = self.conn.close().await {
            tracing::warn!(error = %e, "Failed to close writer connection");
        }
        tracing::info!("DbActor stopped");
    }

    async fn handle_command(&mut self, cmd: Command) -> bool {
        match cmd {
            Command::Append { sample, reply } => {
                let result = self.insert_sample(&sample).await;
                if let Err(ref e) = result {
                    tracing::error!(error = %e, timestamp_utc = sample.timestamp_utc, "Sample insert failed");
                }
                // Caller may have timed out and dropped the receiver.
                let _ = reply.send(result);
            }
            Command::Checkpoint { reply } => {
                let _ = reply.send(self.checkpoint().await);
            }
            Command::Shutdown => {
                tracing::info!("DbActor shutting down");
                return true;
            }
        }
        false
    }

    /// Insert a single sample in its own implicit transaction.
    async fn insert_sample(&mut self, s: &Sample) -> Result<i64, StorageError> {
        let result = sqlx::query(INSERT_SAMPLE_SQL)
            .bind(s.timestamp_utc)
            .bind(s.latitude)
            .bind(s.longitude)
            .bind(s.altitude)
            .bind(s.velocity)
            .execute(&mut self.conn)
            .await
            .map_err(StorageError::write)?;

        let id = result.last_insert_rowid();
        tracing::trace!(sequence_id = id, "Sample inserted");
        Ok(id)
    }

    async fn checkpoint(&mut self) -> Result<(), StorageError> {
        sqlx::query("PRAGMA wal_checkpoint(PASSIVE)")
            .execute(&mut self.conn)
            .await
            .map_err(StorageError::write)?;
        tracing::debug!("WAL checkpoint completed");
        Ok(())
    }
}
