//! In-memory snapshot source for unit tests.

use std::collections::BTreeMap;
use std::ops::RangeInclusive;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;

use oi_monitor_core::snapshot::{Snapshot, SnapshotRow};
use oi_monitor_core::traits::{SnapshotSource, SourceError};

/// One-row snapshot whose aggregates equal the given price and OI.
pub fn snapshot(id: i64, price: Decimal, open_interest: i64) -> Snapshot {
    Snapshot {
        id,
        ticker: "NIFTY50".to_string(),
        captured_at: Utc::now(),
        rows: vec![SnapshotRow {
            strike: Decimal::from(22000),
            open_interest,
            last_price: price,
            volume: 100,
        }],
    }
}

#[derive(Default)]
pub struct MockSource {
    snapshots: Mutex<BTreeMap<i64, Snapshot>>,
    fail_next_latest: AtomicBool,
    fail_next_fetch: AtomicBool,
}

impl MockSource {
    pub fn with_snapshots(snapshots: Vec<Snapshot>) -> Self {
        let source = Self::default();
        for snapshot in snapshots {
            source.insert(snapshot);
        }
        source
    }

    /// Snapshots over `ids` with price and open interest both strictly
    /// increasing in id.
    pub fn with_rising_snapshots(ids: RangeInclusive<i64>) -> Self {
        let source = Self::default();
        for id in ids {
            source.insert(snapshot(
                id,
                Decimal::from(100 + 5 * id),
                1000 + 100 * id,
            ));
        }
        source
    }

    pub fn insert(&self, snapshot: Snapshot) {
        self.snapshots
            .lock()
            .unwrap()
            .insert(snapshot.id, snapshot);
    }

    pub fn remove(&self, id: i64) {
        self.snapshots.lock().unwrap().remove(&id);
    }

    /// Empties the row set of a stored snapshot, making it malformed.
    pub fn clear_rows(&self, id: i64) {
        if let Some(snapshot) = self.snapshots.lock().unwrap().get_mut(&id) {
            snapshot.rows.clear();
        }
    }

    pub fn fail_next_latest(&self) {
        self.fail_next_latest.store(true, Ordering::SeqCst);
    }

    pub fn fail_next_fetch(&self) {
        self.fail_next_fetch.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl SnapshotSource for MockSource {
    async fn latest_snapshot_id(&self, _ticker: &str) -> Result<Option<i64>, SourceError> {
        if self.fail_next_latest.swap(false, Ordering::SeqCst) {
            return Err(SourceError::Timeout("injected".to_string()));
        }
        Ok(self.snapshots.lock().unwrap().keys().max().copied())
    }

    async fn fetch_snapshot(&self, _ticker: &str, id: i64) -> Result<Option<Snapshot>, SourceError> {
        if self.fail_next_fetch.swap(false, Ordering::SeqCst) {
            return Err(SourceError::Connection("injected".to_string()));
        }
        Ok(self.snapshots.lock().unwrap().get(&id).cloned())
    }
}
