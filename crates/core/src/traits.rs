//! Collaborator seams: the snapshot store and the replication sink.

use async_trait::async_trait;
use thiserror::Error;

use crate::snapshot::Snapshot;

/// Errors surfaced by a snapshot source.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Connectivity failure reaching the store.
    #[error("source connection error: {0}")]
    Connection(String),

    /// Query exceeded its deadline.
    #[error("source timeout: {0}")]
    Timeout(String),

    /// Returned data could not be decoded into snapshot rows.
    #[error("source decode error: {0}")]
    Decode(String),
}

impl SourceError {
    /// True when the same query should be retried on the next tick.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Timeout(_))
    }
}

/// Read-only surface over the external snapshot store.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Current maximum snapshot id for the ticker, `None` when the
    /// store holds no snapshots yet.
    async fn latest_snapshot_id(&self, ticker: &str) -> Result<Option<i64>, SourceError>;

    /// Fetches one snapshot by id. `Ok(None)` when the id does not
    /// exist (gaps in the sequence are expected and skipped).
    async fn fetch_snapshot(&self, ticker: &str, id: i64) -> Result<Option<Snapshot>, SourceError>;
}

/// Fire-and-forget mirroring of the serialized portfolio state.
///
/// Runs off the critical path: the durable local file is the source of
/// truth and a replication failure must never roll it back.
#[async_trait]
pub trait ReplicationSink: Send + Sync {
    async fn replicate(&self, state: &str) -> anyhow::Result<()>;
}
