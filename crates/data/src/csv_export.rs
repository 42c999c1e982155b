//! Optional CSV dump of each delivered snapshot window.
//!
//! One file per window, named after the newest snapshot id. Export
//! failures are reported to the caller but never affect trading.

use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use csv::Writer;

use oi_monitor_core::snapshot::SnapshotWindow;

pub struct CsvExporter {
    dir: PathBuf,
}

impl CsvExporter {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Writes the window to `snapshot_<newest_id>_<timestamp>.csv`.
    ///
    /// Format: snapshot_id,captured_at,strike,open_interest,last_price,volume
    ///
    /// # Errors
    /// Returns an error if the directory or file cannot be created or
    /// writing fails.
    pub fn write_window(&self, window: &SnapshotWindow) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create export dir: {}", self.dir.display()))?;

        let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
        let path = self
            .dir
            .join(format!("snapshot_{}_{}.csv", window.newest().id, timestamp));
        self.write_to(&path, window)?;
        Ok(path)
    }

    fn write_to(&self, path: &Path, window: &SnapshotWindow) -> Result<()> {
        let file = File::create(path)
            .with_context(|| format!("Failed to create CSV file: {}", path.display()))?;
        let mut writer = Writer::from_writer(file);

        writer.write_record([
            "snapshot_id",
            "captured_at",
            "strike",
            "open_interest",
            "last_price",
            "volume",
        ])?;

        for snapshot in window.snapshots() {
            for row in &snapshot.rows {
                writer.write_record(&[
                    snapshot.id.to_string(),
                    snapshot.captured_at.to_rfc3339(),
                    row.strike.to_string(),
                    row.open_interest.to_string(),
                    row.last_price.to_string(),
                    row.volume.to_string(),
                ])?;
            }
        }

        writer.flush()?;
        Ok(())
    }
}
