//! Change detection over the strictly increasing snapshot id.
//!
//! The watcher holds the only piece of polling state, `last_seen_id`,
//! and delivers each new maximum id at most once. When the poll
//! interval misses intermediate snapshots, only the most recent K are
//! retrieved; the skipped ids are a declared non-goal, not an error.

use tracing::{debug, info, warn};

use oi_monitor_core::snapshot::SnapshotWindow;
use oi_monitor_core::traits::{SnapshotSource, SourceError};

pub struct SnapshotWatcher<S> {
    source: S,
    ticker: String,
    window_len: usize,
    last_seen_id: Option<i64>,
}

impl<S: SnapshotSource> SnapshotWatcher<S> {
    #[must_use]
    pub fn new(source: S, ticker: impl Into<String>, window_len: usize) -> Self {
        Self {
            source,
            ticker: ticker.into(),
            window_len,
            last_seen_id: None,
        }
    }

    #[must_use]
    pub const fn last_seen_id(&self) -> Option<i64> {
        self.last_seen_id
    }

    #[cfg(test)]
    pub(crate) fn source(&self) -> &S {
        &self.source
    }

    /// Polls the source once.
    ///
    /// The first successful poll primes `last_seen_id` at the current
    /// maximum and delivers nothing: the process is restarted each
    /// trading day and whatever maximum already exists is the previous
    /// session's data, never a fresh observation.
    ///
    /// Returns `Ok(None)` when the store is empty or the maximum id
    /// has not advanced. On advancement, fetches the trailing window
    /// ending at the new maximum and records it as seen. Malformed
    /// snapshots (no usable rows) are dropped from the window but the
    /// maximum is still marked seen so the id is never reprocessed.
    ///
    /// # Errors
    /// Propagates source failures with `last_seen_id` unchanged, so
    /// the same gap is re-attempted on the next tick.
    pub async fn poll(&mut self) -> Result<Option<SnapshotWindow>, SourceError> {
        let Some(latest) = self.source.latest_snapshot_id(&self.ticker).await? else {
            debug!(ticker = %self.ticker, "No snapshots in source yet");
            return Ok(None);
        };
        let Some(seen) = self.last_seen_id else {
            debug!(ticker = %self.ticker, latest, "Primed at current maximum");
            self.last_seen_id = Some(latest);
            return Ok(None);
        };
        if latest <= seen {
            debug!(ticker = %self.ticker, latest, "No new snapshot");
            return Ok(None);
        }

        let first = (latest - (self.window_len as i64 - 1)).max(1);
        let mut snapshots = Vec::with_capacity(self.window_len);
        for id in first..=latest {
            match self.source.fetch_snapshot(&self.ticker, id).await? {
                None => debug!(ticker = %self.ticker, id, "Snapshot id absent, skipping"),
                Some(snapshot) if !snapshot.is_well_formed() => {
                    warn!(ticker = %self.ticker, id, "Malformed snapshot skipped");
                }
                Some(snapshot) => snapshots.push(snapshot),
            }
        }

        // All fetches succeeded: the new maximum is now seen even if
        // parts of the window were unusable.
        self.last_seen_id = Some(latest);

        if snapshots.is_empty() {
            warn!(ticker = %self.ticker, latest, "No usable snapshots in window");
            return Ok(None);
        }
        let window = SnapshotWindow::new(snapshots)
            .map_err(|e| SourceError::Decode(e.to_string()))?;
        info!(
            ticker = %self.ticker,
            latest,
            window = window.len(),
            "New snapshot detected"
        );
        Ok(Some(window))
    }
}
