//! Immutable option-chain snapshots and the trailing evaluation window.

use anyhow::Result;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One per-strike row of an option-chain snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotRow {
    pub strike: Decimal,
    pub open_interest: i64,
    pub last_price: Decimal,
    pub volume: i64,
}

/// A captured option-chain snapshot, immutable once retrieved.
///
/// Identified by a strictly increasing integer id scoped to a ticker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: i64,
    pub ticker: String,
    pub captured_at: DateTime<Utc>,
    pub rows: Vec<SnapshotRow>,
}

impl Snapshot {
    /// Aggregate reference price: mean of `last_price` across rows.
    ///
    /// Deterministic and order-independent. Returns `None` for an
    /// empty row set, which marks the snapshot as malformed.
    #[must_use]
    pub fn reference_price(&self) -> Option<Decimal> {
        if self.rows.is_empty() {
            return None;
        }
        let sum: Decimal = self.rows.iter().map(|r| r.last_price).sum();
        Some(sum / Decimal::from(self.rows.len() as u64))
    }

    /// Aggregate open interest: sum of `open_interest` across rows.
    #[must_use]
    pub fn total_open_interest(&self) -> Option<i64> {
        if self.rows.is_empty() {
            return None;
        }
        Some(self.rows.iter().map(|r| r.open_interest).sum())
    }

    /// True when the snapshot carries usable rows.
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        !self.rows.is_empty()
    }
}

/// An ordered window of trailing snapshots, oldest first, with
/// strictly increasing ids. Evaluator input only; never persisted.
#[derive(Debug, Clone)]
pub struct SnapshotWindow {
    snapshots: Vec<Snapshot>,
}

impl SnapshotWindow {
    /// Builds a window from oldest-first snapshots.
    ///
    /// # Errors
    /// Returns an error if the sequence is empty or ids are not
    /// strictly increasing.
    pub fn new(snapshots: Vec<Snapshot>) -> Result<Self> {
        if snapshots.is_empty() {
            anyhow::bail!("snapshot window cannot be empty");
        }
        for pair in snapshots.windows(2) {
            if pair[1].id <= pair[0].id {
                anyhow::bail!(
                    "snapshot ids must be strictly increasing, got {} then {}",
                    pair[0].id,
                    pair[1].id
                );
            }
        }
        Ok(Self { snapshots })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// The most recent snapshot in the window.
    #[must_use]
    pub fn newest(&self) -> &Snapshot {
        // Invariant: constructor rejects empty windows.
        &self.snapshots[self.snapshots.len() - 1]
    }

    #[must_use]
    pub fn snapshots(&self) -> &[Snapshot] {
        &self.snapshots
    }

    /// Oldest-first aggregate `(reference_price, total_open_interest)`
    /// pairs, or `None` if any member is malformed.
    #[must_use]
    pub fn aggregates(&self) -> Option<Vec<(Decimal, i64)>> {
        self.snapshots
            .iter()
            .map(|s| Some((s.reference_price()?, s.total_open_interest()?)))
            .collect()
    }
}
