//! Database backend for the telemetry store.
//!
//! Currently SQLite only, using sqlx:
//! - `open_writer`: the single read-write connection owned by the writer actor
//! - `SqlitePool`: read-only connection pool for queries

mod sqlite;

pub use sqlite::{
    DEFAULT_ACQUIRE_TIMEOUT, DEFAULT_BUSY_TIMEOUT, DEFAULT_MAX_CONNECTIONS, SqlitePool,
    open_writer, reader_options, writer_options,
};
