//! Postgres-backed snapshot source.
//!
//! Reads the `optionchain_snapshots` / `optionchain` tables: one row
//! per captured snapshot keyed by `(ticker, snapshot_id)` and one row
//! per strike within it.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use tracing::debug;

use oi_monitor_core::config::DatabaseConfig;
use oi_monitor_core::snapshot::{Snapshot, SnapshotRow};
use oi_monitor_core::traits::{SnapshotSource, SourceError};

pub struct PgSnapshotSource {
    pool: PgPool,
}

impl PgSnapshotSource {
    /// Connects a pool according to the database configuration.
    ///
    /// # Errors
    /// Returns a transient [`SourceError`] if the connection cannot be
    /// established within the configured timeout.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, SourceError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .connect(&config.url)
            .await
            .map_err(map_sqlx_error)?;
        Ok(Self { pool })
    }

    /// Wraps an existing pool, mainly for tests.
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SnapshotSource for PgSnapshotSource {
    async fn latest_snapshot_id(&self, ticker: &str) -> Result<Option<i64>, SourceError> {
        let id: Option<i64> = sqlx::query_scalar(
            r"
            SELECT MAX(snapshot_id)
            FROM optionchain_snapshots
            WHERE ticker = $1
            ",
        )
        .bind(ticker)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        debug!(ticker, latest = ?id, "Queried latest snapshot id");
        Ok(id)
    }

    async fn fetch_snapshot(&self, ticker: &str, id: i64) -> Result<Option<Snapshot>, SourceError> {
        let captured_at: Option<DateTime<Utc>> = sqlx::query_scalar(
            r"
            SELECT captured_at
            FROM optionchain_snapshots
            WHERE ticker = $1 AND snapshot_id = $2
            ",
        )
        .bind(ticker)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        let Some(captured_at) = captured_at else {
            return Ok(None);
        };

        let rows = sqlx::query(
            r"
            SELECT strike, open_interest, last_price, volume
            FROM optionchain
            WHERE ticker = $1 AND snapshot_id = $2
            ORDER BY strike ASC
            ",
        )
        .bind(ticker)
        .bind(id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        let mut snapshot_rows = Vec::with_capacity(rows.len());
        for row in rows {
            snapshot_rows.push(SnapshotRow {
                strike: row.try_get("strike").map_err(map_sqlx_error)?,
                open_interest: row.try_get("open_interest").map_err(map_sqlx_error)?,
                last_price: row.try_get("last_price").map_err(map_sqlx_error)?,
                volume: row.try_get("volume").map_err(map_sqlx_error)?,
            });
        }

        debug!(ticker, id, rows = snapshot_rows.len(), "Fetched snapshot");
        Ok(Some(Snapshot {
            id,
            ticker: ticker.to_string(),
            captured_at,
            rows: snapshot_rows,
        }))
    }
}

/// Classifies sqlx failures: connectivity and pool exhaustion are
/// retryable next tick, decode problems are not.
fn map_sqlx_error(err: sqlx::Error) -> SourceError {
    match err {
        sqlx::Error::PoolTimedOut => SourceError::Timeout(err.to_string()),
        sqlx::Error::Io(_) | sqlx::Error::PoolClosed | sqlx::Error::Tls(_) => {
            SourceError::Connection(err.to_string())
        }
        sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::TypeNotFound { .. }
        | sqlx::Error::Decode(_) => SourceError::Decode(err.to_string()),
        other => SourceError::Connection(other.to_string()),
    }
}
