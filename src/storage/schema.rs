//! Database schema definitions.
//!
//! Every statement is `IF NOT EXISTS`, so running setup against an existing
//! store never alters or duplicates rows.

use sqlx::SqliteConnection;

use crate::storage::StorageError;

/// SQL statement for creating the samples table.
///
/// `AUTOINCREMENT` keeps sequence ids strictly increasing and never reused.
pub const SAMPLES_TABLE_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS samples (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp_utc INTEGER NOT NULL,
    latitude      REAL NOT NULL,
    longitude     REAL NOT NULL,
    altitude      REAL NOT NULL,
    velocity      REAL NOT NULL
)
"#;

/// Index backing range scans and nearest-timestamp lookups.
///
/// `id` is part of the key so ties on a timestamp resolve to the earliest
/// insert without a sort.
pub const SAMPLES_TIMESTAMP_INDEX_DDL: &str = r#"
CREATE INDEX IF NOT EXISTS idx_samples_timestamp ON samples (timestamp_utc, id)
"#;

/// Index letting MIN/MAX(longitude) resolve with a single seek.
pub const SAMPLES_LONGITUDE_INDEX_DDL: &str = r#"
CREATE INDEX IF NOT EXISTS idx_samples_longitude ON samples (longitude)
"#;

/// Index letting MIN/MAX(altitude) resolve with a single seek.
pub const SAMPLES_ALTITUDE_INDEX_DDL: &str = r#"
CREATE INDEX IF NOT EXISTS idx_samples_altitude ON samples (altitude)
"#;

/// Initialize the database schema.
///
/// Creates the samples table and its indexes if they don't exist.
pub async fn init_schema(conn: &mut SqliteConnection) -> Result<(), StorageError> {
    for ddl in [
        SAMPLES_TABLE_DDL,
        SAMPLES_TIMESTAMP_INDEX_DDL,
        SAMPLES_LONGITUDE_INDEX_DDL,
        SAMPLES_ALTITUDE_INDEX_DDL,
    ] {
        sqlx::query(ddl).execute(&mut *conn).await?;
    }

    tracing::info!("Database schema initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::db::{DEFAULT_BUSY_TIMEOUT, open_writer};
    use tempfile::tempdir;

    async fn object_count(conn: &mut SqliteConnection, kind: &str, name: &str) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM sqlite_master WHERE type = ?1 AND name = ?2")
            .bind(kind)
            .bind(name)
            .fetch_one(conn)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_schema_initialization() {
        let dir = tempdir().unwrap();
        let mut conn = open_writer(&dir.path().join("schema.db"), DEFAULT_BUSY_TIMEOUT)
            .await
            .unwrap();
        init_schema(&mut conn).await.unwrap();

        assert_eq!(object_count(&mut conn, "table", "samples").await, 1);
        assert_eq!(
            object_count(&mut conn, "index", "idx_samples_timestamp").await,
            1
        );
        assert_eq!(
            object_count(&mut conn, "index", "idx_samples_longitude").await,
            1
        );
        assert_eq!(
            object_count(&mut conn, "index", "idx_samples_altitude").await,
            1
        );
    }

    #[tokio::test]
    async fn test_schema_is_idempotent() {
        let dir = tempdir().unwrap();
        let mut conn = open_writer(&dir.path().join("idem.db"), DEFAULT_BUSY_TIMEOUT)
            .await
            .unwrap();
        init_schema(&mut conn).await.unwrap();

        sqlx::query(
            "INSERT INTO samples (timestamp_utc, latitude, longitude, altitude, velocity)
             VALUES (1, 10.0, 20.0, 400.0, 27000.0), (2, 11.0, 21.0, 401.0, 27001.0)",
        )
        .execute(&mut conn)
        .await
        .unwrap();

        init_schema(&mut conn).await.unwrap();

        let rows: Vec<(i64, i64, f64)> =
            sqlx::query_as("SELECT id, timestamp_utc, altitude FROM samples ORDER BY id")
                .fetch_all(&mut conn)
                .await
                .unwrap();
        assert_eq!(rows, vec![(1, 1, 400.0), (2, 2, 401.0)]);
    }

    #[tokio::test]
    async fn test_lookups_use_indexes() {
        use crate::storage::facades::{
            EXTREMA_SQL, NEAREST_AT_OR_ABOVE_SQL, NEAREST_AT_OR_BELOW_SQL,
        };

        let dir = tempdir().unwrap();
        let mut conn = open_writer(&dir.path().join("plan.db"), DEFAULT_BUSY_TIMEOUT)
            .await
            .unwrap();
        init_schema(&mut conn).await.unwrap();

        let cases: [(&str, bool, &[&str]); 3] = [
            (NEAREST_AT_OR_BELOW_SQL, true, &["idx_samples_timestamp"]),
            (NEAREST_AT_OR_ABOVE_SQL, true, &["idx_samples_timestamp"]),
            (
                EXTREMA_SQL,
                false,
                &["idx_samples_longitude", "idx_samples_altitude"],
            ),
        ];

        for (sql, bound, indexes) in cases {
            let explain = format!("EXPLAIN QUERY PLAN {}", sql);
            let mut query = sqlx::query_as::<_, (i64, i64, i64, String)>(&explain);
            if bound {
                query = query.bind(100_i64);
            }
            let plan = query.fetch_all(&mut conn).await.unwrap();

            for index in indexes {
                assert!(
                    plan.iter().any(|(_, _, _, detail)| detail.contains(index)),
                    "{index} unused in {plan:?}"
                );
            }
            assert!(
                plan.iter()
                    .all(|(_, _, _, detail)| !detail.contains("SCAN samples")),
                "full scan in {plan:?}"
            );
        }
    }
}
