//! Signal rules: turn a trailing snapshot window plus position state
//! into a BUY/SELL/HOLD decision.
//!
//! Evaluation is a pure function of its inputs. Momentum is read from
//! two aggregates per snapshot, the reference price and the total open
//! interest, compared across consecutive snapshots in the window.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::config::AppConfig;
use crate::snapshot::SnapshotWindow;

/// The discrete decision for one evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    Buy,
    Sell,
    Hold,
}

/// An evaluated decision, priced at the newest snapshot in the window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signal {
    pub action: Action,
    /// Reference price of the newest snapshot.
    pub price: Decimal,
    /// Id of the newest snapshot.
    pub snapshot_id: i64,
}

/// Strategy parameters relevant to evaluation.
#[derive(Debug, Clone)]
pub struct SignalParams {
    /// Snapshots required in the window before any non-HOLD decision.
    pub window_len: usize,
    /// Minimum snapshot-id steps since entry before a sell.
    pub min_hold: i64,
    /// Minimum snapshot-id steps since the last buy before another buy.
    pub cooldown: i64,
    /// Loss fraction relative to entry price that forces a sell.
    pub stop_loss_fraction: Decimal,
}

impl SignalParams {
    /// Extracts evaluation parameters from the application config.
    ///
    /// # Errors
    /// Returns an error if `stop_loss_fraction` is not a finite number.
    pub fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        let stop_loss_fraction = Decimal::try_from(config.stop_loss_fraction)
            .map_err(|e| anyhow::anyhow!("invalid stop_loss_fraction: {e}"))?;
        Ok(Self {
            window_len: config.window_len,
            min_hold: config.min_hold_snapshots,
            cooldown: config.cooldown_snapshots,
            stop_loss_fraction,
        })
    }
}

/// The slice of portfolio state the evaluator may see.
#[derive(Debug, Clone, Default)]
pub struct PositionView {
    /// Entry snapshot id and entry price of the open position, if any.
    pub open_position: Option<(i64, Decimal)>,
    /// Snapshot id of the most recent buy, open or since closed.
    /// Cooldown is anchored here, not at the sell.
    pub last_buy_snapshot_id: Option<i64>,
}

/// Evaluates the window against the current position state.
///
/// HOLD carries no ledger mutation; the caller still refreshes the
/// portfolio valuation at the returned price.
#[must_use]
pub fn evaluate(window: &SnapshotWindow, view: &PositionView, params: &SignalParams) -> Signal {
    let newest = window.newest();
    let snapshot_id = newest.id;
    let price = newest.reference_price().unwrap_or(Decimal::ZERO);
    let hold = Signal {
        action: Action::Hold,
        price,
        snapshot_id,
    };

    if window.len() < params.window_len {
        tracing::debug!(
            snapshot_id,
            have = window.len(),
            need = params.window_len,
            "Window not yet full, holding"
        );
        return hold;
    }
    let Some(aggregates) = window.aggregates() else {
        // Watcher filters malformed snapshots; treat a leak as HOLD.
        tracing::debug!(snapshot_id, "Window contains malformed snapshot, holding");
        return hold;
    };

    match view.open_position {
        None => {
            let momentum_up = aggregates.windows(2).all(|pair| {
                pair[1].0 > pair[0].0 && pair[1].1 > pair[0].1
            });
            let cooldown_ok = view
                .last_buy_snapshot_id
                .map_or(true, |last_buy| snapshot_id - last_buy >= params.cooldown);

            if momentum_up && cooldown_ok {
                return Signal {
                    action: Action::Buy,
                    price,
                    snapshot_id,
                };
            }
            hold
        }
        Some((entry_id, entry_price)) => {
            let held_steps = snapshot_id - entry_id;
            if held_steps < params.min_hold {
                tracing::debug!(
                    snapshot_id,
                    held_steps,
                    min_hold = params.min_hold,
                    "Minimum hold not reached, holding"
                );
                return hold;
            }

            let price_falling = aggregates.windows(2).all(|pair| pair[1].0 < pair[0].0);
            let stop_loss_hit = entry_price > Decimal::ZERO
                && (entry_price - price) / entry_price >= params.stop_loss_fraction;

            if price_falling || stop_loss_hit {
                return Signal {
                    action: Action::Sell,
                    price,
                    snapshot_id,
                };
            }
            hold
        }
    }
}
