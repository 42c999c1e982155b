//! Durable portfolio storage with write-new-then-rename discipline.
//!
//! A concurrent reader (the status command, a dashboard) only ever
//! sees a complete file: the serialized state is written to a sibling
//! temp file and atomically renamed over the target. Each write also
//! keeps the previous state in a `.bak` sibling, read back when the
//! main file turns out damaged at startup.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::ledger::Portfolio;

pub struct PortfolioStore {
    path: PathBuf,
}

impl PortfolioStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the persisted portfolio, or initializes and persists a
    /// fresh one with the given starting cash. Idempotent startup: an
    /// existing file always wins over re-initialization.
    ///
    /// # Errors
    /// Returns an error if an existing file cannot be read or parsed,
    /// or if the initial write fails.
    pub fn load_or_init(&self, initial_cash: Decimal) -> Result<Portfolio> {
        if self.path.exists() {
            let portfolio = self.load()?;
            info!(
                path = %self.path.display(),
                cash = %portfolio.cash,
                trades = portfolio.trades.len(),
                open_position = portfolio.position.is_some(),
                "Loaded existing portfolio"
            );
            return Ok(portfolio);
        }

        let portfolio = Portfolio::new(initial_cash, Utc::now());
        self.save(&portfolio)?;
        info!(
            path = %self.path.display(),
            cash = %initial_cash,
            "Initialized new portfolio"
        );
        Ok(portfolio)
    }

    /// Reads and parses the persisted portfolio, falling back to the
    /// `.bak` copy of the previous state when the main file is
    /// unreadable or corrupted.
    ///
    /// # Errors
    /// Returns an error if neither the main file nor the backup can be
    /// parsed. Both files are left in place for manual inspection.
    pub fn load(&self) -> Result<Portfolio> {
        match self.read_from(&self.path) {
            Ok(portfolio) => Ok(portfolio),
            Err(e) => {
                let backup = self.backup_path();
                if backup.exists() {
                    warn!(
                        path = %self.path.display(),
                        error = %format!("{e:#}"),
                        "Portfolio file unreadable, loading backup"
                    );
                    return self.read_from(&backup).with_context(|| {
                        format!("Backup portfolio file {} is also unreadable", backup.display())
                    });
                }
                Err(e)
            }
        }
    }

    /// Durably writes the portfolio: serialize to `<path>.tmp`, copy
    /// the previous file to `<path>.bak`, then rename over `<path>`.
    ///
    /// # Errors
    /// Returns an error if serialization, the temp write, or the
    /// rename fails. The previous file is left intact on failure; a
    /// failed backup copy is logged but does not block the write.
    pub fn save(&self, portfolio: &Portfolio) -> Result<()> {
        let json = Self::serialize(portfolio)?;
        let tmp = self.tmp_path();

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create portfolio dir {}", parent.display())
                })?;
            }
        }
        std::fs::write(&tmp, &json)
            .with_context(|| format!("Failed to write temp portfolio file {}", tmp.display()))?;
        if self.path.exists() {
            if let Err(e) = std::fs::copy(&self.path, self.backup_path()) {
                warn!(path = %self.path.display(), error = %e, "Portfolio backup copy failed");
            }
        }
        std::fs::rename(&tmp, &self.path).with_context(|| {
            format!(
                "Failed to replace portfolio file {} with {}",
                self.path.display(),
                tmp.display()
            )
        })?;

        debug!(path = %self.path.display(), bytes = json.len(), "Portfolio saved");
        Ok(())
    }

    fn read_from(&self, path: &Path) -> Result<Portfolio> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read portfolio file {}", path.display()))?;
        let portfolio = serde_json::from_str(&contents)
            .with_context(|| format!("Portfolio file {} is corrupted", path.display()))?;
        Ok(portfolio)
    }

    /// Serializes the portfolio in the on-disk format. Used both for
    /// the durable write and as the replication payload.
    ///
    /// # Errors
    /// Returns an error if serialization fails.
    pub fn serialize(portfolio: &Portfolio) -> Result<String> {
        let json = serde_json::to_string_pretty(portfolio)
            .context("Failed to serialize portfolio")?;
        Ok(json)
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }

    fn backup_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".bak");
        PathBuf::from(name)
    }
}
