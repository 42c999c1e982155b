//! The session-gated monitor loop.
//!
//! One tick: gate on the trading session, retry any pending durable
//! write, poll for a new snapshot window, evaluate, apply the decision
//! to the ledger, persist, and hand the serialized state to the
//! replication sink without awaiting it.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use oi_monitor_core::config::AppConfig;
use oi_monitor_core::session::SessionClock;
use oi_monitor_core::signal::{evaluate, Action, SignalParams};
use oi_monitor_core::traits::{ReplicationSink, SnapshotSource};
use oi_monitor_data::CsvExporter;
use oi_monitor_portfolio::{Portfolio, PortfolioStore};

use crate::watcher::SnapshotWatcher;

/// Runtime parameters of the monitor, extracted from [`AppConfig`].
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub ticker: String,
    pub poll_interval: Duration,
    pub lot_size: i64,
    pub window_len: usize,
    pub params: SignalParams,
    pub initial_cash: Decimal,
    pub max_write_failures: u32,
}

impl MonitorConfig {
    /// # Errors
    /// Returns an error if a numeric strategy parameter cannot be
    /// represented as a `Decimal`.
    pub fn from_app_config(config: &AppConfig) -> Result<Self> {
        let initial_cash = Decimal::try_from(config.initial_cash)
            .map_err(|e| anyhow::anyhow!("invalid initial_cash: {e}"))?;
        Ok(Self {
            ticker: config.ticker.clone(),
            poll_interval: Duration::from_secs(config.poll_interval_secs),
            lot_size: config.lot_size,
            window_len: config.window_len,
            params: SignalParams::from_config(config)?,
            initial_cash,
            max_write_failures: config.max_write_failures,
        })
    }
}

/// What a single tick did. `run` reads this to decide when to stop;
/// tests read it to observe the loop without a clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Session not open yet.
    Idle,
    /// An active session has ended; the loop should exit.
    SessionEnded,
    /// Session active but the snapshot id has not advanced.
    NoNewData,
    /// A window was evaluated and the ledger persisted.
    Decided(Action),
    /// The durable write failed; it is retried before new decisions.
    WritePending,
}

pub struct Monitor<S> {
    config: MonitorConfig,
    watcher: SnapshotWatcher<S>,
    portfolio: Portfolio,
    store: PortfolioStore,
    exporter: Option<CsvExporter>,
    sink: Arc<dyn ReplicationSink>,
    clock: SessionClock,
    session_was_active: bool,
    write_pending: bool,
    write_failures: u32,
}

impl<S: SnapshotSource> Monitor<S> {
    /// Loads (or initializes) the durable portfolio and assembles the
    /// loop around it.
    ///
    /// # Errors
    /// Returns an error if the portfolio file cannot be loaded or
    /// initialized.
    pub fn new(
        config: MonitorConfig,
        source: S,
        clock: SessionClock,
        store: PortfolioStore,
        exporter: Option<CsvExporter>,
        sink: Arc<dyn ReplicationSink>,
    ) -> Result<Self> {
        let portfolio = store.load_or_init(config.initial_cash)?;
        let watcher = SnapshotWatcher::new(source, config.ticker.clone(), config.window_len);
        Ok(Self {
            config,
            watcher,
            portfolio,
            store,
            exporter,
            sink,
            clock,
            session_was_active: false,
            write_pending: false,
            write_failures: 0,
        })
    }

    #[must_use]
    pub fn portfolio(&self) -> &Portfolio {
        &self.portfolio
    }

    /// Runs ticks on a fixed delay until the active session ends or
    /// shutdown is signalled, then makes a best-effort final save.
    ///
    /// # Errors
    /// Returns an error when consecutive durable-write failures exceed
    /// the configured limit.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let mut ticks = tokio::time::interval(self.config.poll_interval);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            ticker = %self.config.ticker,
            interval_secs = self.config.poll_interval.as_secs(),
            "Monitor started"
        );

        loop {
            tokio::select! {
                _ = ticks.tick() => {
                    match self.step(Utc::now()).await? {
                        StepOutcome::SessionEnded => {
                            info!("Trading session ended, stopping");
                            break;
                        }
                        outcome => debug!(?outcome, "Tick complete"),
                    }
                }
                changed = shutdown.changed() => {
                    // A dropped sender counts as shutdown.
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Shutdown requested, stopping");
                        break;
                    }
                }
            }
        }

        self.final_save();
        Ok(())
    }

    /// Executes one tick at the given instant.
    ///
    /// # Errors
    /// Returns an error when consecutive durable-write failures exceed
    /// the configured limit. Source failures are logged and absorbed;
    /// the watcher re-attempts the same gap next tick.
    pub async fn step(&mut self, now: DateTime<Utc>) -> Result<StepOutcome> {
        if !self.clock.is_active(now) {
            if self.session_was_active {
                return Ok(StepOutcome::SessionEnded);
            }
            debug!("Outside trading session");
            return Ok(StepOutcome::Idle);
        }
        self.session_was_active = true;

        // A failed write is retried before any new decision so the
        // on-disk ledger never falls more than one step behind.
        if self.write_pending {
            self.persist()?;
            if self.write_pending {
                return Ok(StepOutcome::WritePending);
            }
            self.spawn_replication();
        }

        let window = match self.watcher.poll().await {
            Ok(Some(window)) => window,
            Ok(None) => return Ok(StepOutcome::NoNewData),
            Err(e) if e.is_transient() => {
                warn!(error = %e, "Snapshot source unavailable, retrying next tick");
                return Ok(StepOutcome::NoNewData);
            }
            Err(e) => {
                error!(error = %e, "Snapshot source returned bad data, retrying next tick");
                return Ok(StepOutcome::NoNewData);
            }
        };

        if let Some(exporter) = &self.exporter {
            if let Err(e) = exporter.write_window(&window) {
                warn!(error = %format!("{e:#}"), "Snapshot export failed");
            }
        }

        let signal = evaluate(&window, &self.portfolio.position_view(), &self.config.params);
        match signal.action {
            Action::Buy => {
                if let Err(e) =
                    self.portfolio
                        .apply_buy(signal.snapshot_id, signal.price, self.config.lot_size, now)
                {
                    // Evaluation gates on position state, so a
                    // rejection here means the two disagree.
                    error!(error = %e, snapshot_id = signal.snapshot_id, "BUY rejected by ledger");
                }
            }
            Action::Sell => {
                if let Err(e) = self.portfolio.apply_sell(signal.snapshot_id, signal.price, now) {
                    error!(error = %e, snapshot_id = signal.snapshot_id, "SELL rejected by ledger");
                }
            }
            Action::Hold => {}
        }
        self.portfolio.mark_to_market(signal.price, now);

        self.persist()?;
        if self.write_pending {
            return Ok(StepOutcome::WritePending);
        }
        self.spawn_replication();
        Ok(StepOutcome::Decided(signal.action))
    }

    /// Attempts the durable write, tracking consecutive failures.
    ///
    /// # Errors
    /// Returns an error once failures reach `max_write_failures`.
    fn persist(&mut self) -> Result<()> {
        match self.store.save(&self.portfolio) {
            Ok(()) => {
                self.write_pending = false;
                self.write_failures = 0;
                Ok(())
            }
            Err(e) => {
                self.write_pending = true;
                self.write_failures += 1;
                if self.write_failures >= self.config.max_write_failures {
                    return Err(e.context(format!(
                        "{} consecutive portfolio write failures, aborting",
                        self.write_failures
                    )));
                }
                warn!(
                    error = %format!("{e:#}"),
                    failures = self.write_failures,
                    limit = self.config.max_write_failures,
                    "Portfolio write failed, will retry next tick"
                );
                Ok(())
            }
        }
    }

    /// Hands the just-persisted state to the replication sink without
    /// awaiting it. Failures are the sink's to log; the durable local
    /// file remains the source of truth.
    fn spawn_replication(&self) {
        let state = match PortfolioStore::serialize(&self.portfolio) {
            Ok(state) => state,
            Err(e) => {
                warn!(error = %format!("{e:#}"), "Skipping replication");
                return;
            }
        };
        let sink = Arc::clone(&self.sink);
        tokio::spawn(async move {
            if let Err(e) = sink.replicate(&state).await {
                warn!(error = %format!("{e:#}"), "Replication failed");
            }
        });
    }

    fn final_save(&mut self) {
        if let Err(e) = self.store.save(&self.portfolio) {
            warn!(error = %format!("{e:#}"), "Final portfolio save failed");
        }
    }
}
