//! The owned, mutable portfolio aggregate: cash, the single open
//! position, and the append-only trade history.
//!
//! State machine: `NoPosition` <-> `OpenPosition`. Every buy either
//! remains open or is paired with exactly one later sell; cash and
//! realized P&L are always derivable by replaying the trade sequence
//! from the initial cash balance.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use oi_monitor_core::signal::PositionView;

/// Rejected ledger transitions. These are defensive: the evaluator
/// already gates on position state, so hitting one in normal operation
/// indicates a bug upstream. The caller logs and continues.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("buy rejected: position already open since snapshot {entry_snapshot_id}")]
    PositionAlreadyOpen { entry_snapshot_id: i64 },

    #[error("sell rejected: no open position")]
    NoOpenPosition,

    #[error("buy rejected: insufficient cash, need {required}, have {available}")]
    InsufficientCash {
        required: Decimal,
        available: Decimal,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeSide {
    Buy,
    Sell,
}

/// The open position, present in `OpenPosition` state only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub entry_snapshot_id: i64,
    pub entry_price: Decimal,
    pub quantity: i64,
    pub entered_at: DateTime<Utc>,
    /// Display-only valuation, refreshed by mark-to-market.
    #[serde(default)]
    pub unrealized_pnl: Decimal,
}

/// Immutable record of one side of a trade cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trade {
    pub side: TradeSide,
    pub snapshot_id: i64,
    pub price: Decimal,
    pub quantity: i64,
    pub executed_at: DateTime<Utc>,
    /// Realized P&L, present on the closing side only.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub pnl: Option<Decimal>,
}

/// The persistent portfolio aggregate. Single writer: only the
/// monitor loop mutates it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Portfolio {
    pub cash: Decimal,
    pub realized_pnl: Decimal,
    pub position: Option<Position>,
    pub trades: Vec<Trade>,
    /// Cooldown anchor: snapshot id of the most recent buy. Survives
    /// the sell that closes the position.
    pub last_buy_snapshot_id: Option<i64>,
    pub last_update: DateTime<Utc>,
}

/// Read-only valuation summary for the status surface.
#[derive(Debug, Clone, Serialize)]
pub struct PortfolioSummary {
    pub cash: Decimal,
    pub position_value: Decimal,
    pub total_value: Decimal,
    pub realized_pnl: Decimal,
    pub unrealized_pnl: Decimal,
    pub unrealized_pnl_pct: Decimal,
    pub total_trades: usize,
    pub has_open_position: bool,
}

impl Portfolio {
    #[must_use]
    pub fn new(initial_cash: Decimal, now: DateTime<Utc>) -> Self {
        Self {
            cash: initial_cash,
            realized_pnl: Decimal::ZERO,
            position: None,
            trades: Vec::new(),
            last_buy_snapshot_id: None,
            last_update: now,
        }
    }

    /// The slice of state the signal evaluator is allowed to see.
    #[must_use]
    pub fn position_view(&self) -> PositionView {
        PositionView {
            open_position: self
                .position
                .as_ref()
                .map(|p| (p.entry_snapshot_id, p.entry_price)),
            last_buy_snapshot_id: self.last_buy_snapshot_id,
        }
    }

    /// Opens the position: debits cash, appends the buy trade, and
    /// records the cooldown anchor.
    ///
    /// # Errors
    /// Rejected without mutation while a position is already open or
    /// when cash cannot cover `price * quantity`.
    pub fn apply_buy(
        &mut self,
        snapshot_id: i64,
        price: Decimal,
        quantity: i64,
        now: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        if let Some(position) = &self.position {
            return Err(LedgerError::PositionAlreadyOpen {
                entry_snapshot_id: position.entry_snapshot_id,
            });
        }
        let cost = price * Decimal::from(quantity);
        if cost > self.cash {
            return Err(LedgerError::InsufficientCash {
                required: cost,
                available: self.cash,
            });
        }

        self.cash -= cost;
        self.position = Some(Position {
            entry_snapshot_id: snapshot_id,
            entry_price: price,
            quantity,
            entered_at: now,
            unrealized_pnl: Decimal::ZERO,
        });
        self.last_buy_snapshot_id = Some(snapshot_id);
        self.trades.push(Trade {
            side: TradeSide::Buy,
            snapshot_id,
            price,
            quantity,
            executed_at: now,
            pnl: None,
        });
        self.last_update = now;

        tracing::info!(
            snapshot_id,
            price = %price,
            cost = %cost,
            cash = %self.cash,
            "BUY executed"
        );
        Ok(())
    }

    /// Closes the position: credits proceeds, accumulates realized
    /// P&L, and appends the sell trade. The cooldown anchor keeps the
    /// original buy's snapshot id.
    ///
    /// # Errors
    /// Rejected without mutation when no position is open.
    pub fn apply_sell(
        &mut self,
        snapshot_id: i64,
        price: Decimal,
        now: DateTime<Utc>,
    ) -> Result<Decimal, LedgerError> {
        let Some(position) = self.position.take() else {
            return Err(LedgerError::NoOpenPosition);
        };

        let quantity = position.quantity;
        let proceeds = price * Decimal::from(quantity);
        let pnl = (price - position.entry_price) * Decimal::from(quantity);
        self.cash += proceeds;
        self.realized_pnl += pnl;
        self.trades.push(Trade {
            side: TradeSide::Sell,
            snapshot_id,
            price,
            quantity,
            executed_at: now,
            pnl: Some(pnl),
        });
        self.last_update = now;

        tracing::info!(
            snapshot_id,
            price = %price,
            pnl = %pnl,
            cash = %self.cash,
            "SELL executed"
        );
        Ok(pnl)
    }

    /// Refreshes the valuation timestamp and, for an open position,
    /// its display-only unrealized P&L. Never touches cash, trades,
    /// or position identity.
    pub fn mark_to_market(&mut self, price: Decimal, now: DateTime<Utc>) {
        if let Some(position) = &mut self.position {
            position.unrealized_pnl =
                (price - position.entry_price) * Decimal::from(position.quantity);
        }
        self.last_update = now;
    }

    /// Valuation summary at an optional mark price.
    #[must_use]
    pub fn summary(&self, mark_price: Option<Decimal>) -> PortfolioSummary {
        let (position_value, unrealized_pnl, unrealized_pnl_pct) = match (&self.position, mark_price)
        {
            (Some(position), Some(price)) => {
                let quantity = Decimal::from(position.quantity);
                let value = price * quantity;
                let pnl = (price - position.entry_price) * quantity;
                let entry_cost = position.entry_price * quantity;
                let pct = if entry_cost.is_zero() {
                    Decimal::ZERO
                } else {
                    pnl / entry_cost * Decimal::from(100)
                };
                (value, pnl, pct)
            }
            (Some(position), None) => (
                Decimal::ZERO,
                position.unrealized_pnl,
                Decimal::ZERO,
            ),
            (None, _) => (Decimal::ZERO, Decimal::ZERO, Decimal::ZERO),
        };

        PortfolioSummary {
            cash: self.cash,
            position_value,
            total_value: self.cash + position_value,
            realized_pnl: self.realized_pnl,
            unrealized_pnl,
            unrealized_pnl_pct,
            total_trades: self.trades.len(),
            has_open_position: self.position.is_some(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn now() -> DateTime<Utc> {
        use chrono::TimeZone;
        Utc.with_ymd_and_hms(2025, 6, 11, 4, 30, 0).unwrap()
    }

    fn funded() -> Portfolio {
        Portfolio::new(dec!(100000), now())
    }

    #[test]
    fn buy_debits_cash_and_opens_position() {
        let mut portfolio = funded();
        portfolio.apply_buy(12, dec!(110), 150, now()).unwrap();

        assert_eq!(portfolio.cash, dec!(83500)); // 100000 - 110*150
        let position = portfolio.position.as_ref().unwrap();
        assert_eq!(position.entry_snapshot_id, 12);
        assert_eq!(position.entry_price, dec!(110));
        assert_eq!(position.quantity, 150);
        assert_eq!(portfolio.last_buy_snapshot_id, Some(12));
        assert_eq!(portfolio.trades.len(), 1);
        assert_eq!(portfolio.trades[0].side, TradeSide::Buy);
        assert!(portfolio.trades[0].pnl.is_none());
    }

    #[test]
    fn sell_credits_proceeds_and_realizes_pnl() {
        let mut portfolio = funded();
        portfolio.apply_buy(12, dec!(110), 150, now()).unwrap();
        let pnl = portfolio.apply_sell(19, dec!(120), now()).unwrap();

        assert_eq!(pnl, dec!(1500)); // (120 - 110) * 150
        assert_eq!(portfolio.cash, dec!(101500));
        assert_eq!(portfolio.realized_pnl, dec!(1500));
        assert!(portfolio.position.is_none());
        assert_eq!(portfolio.trades.len(), 2);
        assert_eq!(portfolio.trades[1].pnl, Some(dec!(1500)));
        // Cooldown anchor stays at the buy, not the sell.
        assert_eq!(portfolio.last_buy_snapshot_id, Some(12));
    }

    #[test]
    fn buy_while_open_is_rejected_without_mutation() {
        let mut portfolio = funded();
        portfolio.apply_buy(12, dec!(110), 150, now()).unwrap();
        let before = portfolio.clone();

        let err = portfolio.apply_buy(13, dec!(120), 150, now()).unwrap_err();
        assert!(matches!(
            err,
            LedgerError::PositionAlreadyOpen {
                entry_snapshot_id: 12
            }
        ));
        assert_eq!(portfolio, before);
    }

    #[test]
    fn sell_without_position_is_rejected_without_mutation() {
        let mut portfolio = funded();
        let before = portfolio.clone();

        let err = portfolio.apply_sell(19, dec!(120), now()).unwrap_err();
        assert!(matches!(err, LedgerError::NoOpenPosition));
        assert_eq!(portfolio, before);
    }

    #[test]
    fn buy_beyond_cash_is_rejected_without_mutation() {
        let mut portfolio = Portfolio::new(dec!(1000), now());
        let before = portfolio.clone();

        let err = portfolio.apply_buy(12, dec!(110), 150, now()).unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientCash { .. }));
        assert_eq!(portfolio, before);
    }

    #[test]
    fn at_most_one_position_across_cycles() {
        let mut portfolio = funded();
        for cycle in 0..3 {
            let buy_id = 10 + cycle * 30;
            portfolio.apply_buy(buy_id, dec!(100), 150, now()).unwrap();
            assert!(portfolio.position.is_some());
            assert!(portfolio.apply_buy(buy_id + 1, dec!(100), 150, now()).is_err());
            portfolio.apply_sell(buy_id + 7, dec!(105), now()).unwrap();
            assert!(portfolio.position.is_none());
        }
        assert_eq!(portfolio.trades.len(), 6);
    }

    #[test]
    fn trades_sequence_only_grows() {
        let mut portfolio = funded();
        let mut seen = Vec::new();
        portfolio.apply_buy(12, dec!(110), 150, now()).unwrap();
        seen.push(portfolio.trades.clone());
        portfolio.mark_to_market(dec!(115), now());
        seen.push(portfolio.trades.clone());
        portfolio.apply_sell(19, dec!(120), now()).unwrap();
        seen.push(portfolio.trades.clone());

        for pair in seen.windows(2) {
            assert!(pair[1].len() >= pair[0].len());
            assert_eq!(&pair[1][..pair[0].len()], &pair[0][..]);
        }
    }

    #[test]
    fn cash_and_realized_pnl_replay_from_trades() {
        let initial = dec!(100000);
        let mut portfolio = Portfolio::new(initial, now());
        portfolio.apply_buy(12, dec!(110), 150, now()).unwrap();
        portfolio.apply_sell(19, dec!(95), now()).unwrap();
        portfolio.apply_buy(40, dec!(80), 150, now()).unwrap();

        let mut replayed_cash = initial;
        let mut replayed_pnl = Decimal::ZERO;
        for trade in &portfolio.trades {
            let notional = trade.price * Decimal::from(trade.quantity);
            match trade.side {
                TradeSide::Buy => replayed_cash -= notional,
                TradeSide::Sell => {
                    replayed_cash += notional;
                    replayed_pnl += trade.pnl.unwrap();
                }
            }
        }
        assert_eq!(replayed_cash, portfolio.cash);
        assert_eq!(replayed_pnl, portfolio.realized_pnl);
    }

    #[test]
    fn mark_to_market_with_unchanged_price_is_idempotent() {
        let mut portfolio = funded();
        portfolio.apply_buy(12, dec!(110), 150, now()).unwrap();
        portfolio.mark_to_market(dec!(100), now());
        let before = portfolio.clone();

        portfolio.mark_to_market(dec!(100), now());
        assert_eq!(portfolio.cash, before.cash);
        assert_eq!(portfolio.realized_pnl, before.realized_pnl);
        assert_eq!(portfolio.trades, before.trades);
        assert_eq!(portfolio, before);
    }

    #[test]
    fn mark_to_market_updates_display_pnl_only() {
        let mut portfolio = funded();
        portfolio.apply_buy(12, dec!(110), 150, now()).unwrap();
        let cash_before = portfolio.cash;

        portfolio.mark_to_market(dec!(90), now());
        assert_eq!(
            portfolio.position.as_ref().unwrap().unrealized_pnl,
            dec!(-3000) // (90 - 110) * 150
        );
        assert_eq!(portfolio.cash, cash_before);
        assert_eq!(portfolio.trades.len(), 1);
    }

    #[test]
    fn serde_round_trip_is_exact() {
        let mut portfolio = funded();
        portfolio.apply_buy(12, dec!(110), 150, now()).unwrap();
        portfolio.apply_sell(19, dec!(95), now()).unwrap();
        portfolio.apply_buy(45, dec!(70), 150, now()).unwrap();
        portfolio.mark_to_market(dec!(72), now());

        let json = serde_json::to_string_pretty(&portfolio).unwrap();
        let reloaded: Portfolio = serde_json::from_str(&json).unwrap();
        assert_eq!(reloaded, portfolio);
    }

    #[test]
    fn open_position_carries_forward_across_reload() {
        // Session ends with the position open; nothing force-closes it.
        let mut portfolio = funded();
        portfolio.apply_buy(40, dec!(110), 150, now()).unwrap();
        let json = serde_json::to_string(&portfolio).unwrap();

        // Next session reloads the file and the evaluator still sees
        // the original entry id for hold-duration counting.
        let reloaded: Portfolio = serde_json::from_str(&json).unwrap();
        let view = reloaded.position_view();
        assert_eq!(view.open_position, Some((40, dec!(110))));
        assert_eq!(view.last_buy_snapshot_id, Some(40));
        assert_eq!(reloaded.trades.len(), 1);
    }

    #[test]
    fn summary_reflects_mark_price() {
        let mut portfolio = funded();
        portfolio.apply_buy(12, dec!(100), 150, now()).unwrap();

        let summary = portfolio.summary(Some(dec!(110)));
        assert_eq!(summary.cash, dec!(85000));
        assert_eq!(summary.position_value, dec!(16500));
        assert_eq!(summary.total_value, dec!(101500));
        assert_eq!(summary.unrealized_pnl, dec!(1500));
        assert_eq!(summary.unrealized_pnl_pct, dec!(10));
        assert!(summary.has_open_position);
    }

    #[test]
    fn summary_without_position_is_cash_only() {
        let portfolio = funded();
        let summary = portfolio.summary(None);
        assert_eq!(summary.total_value, dec!(100000));
        assert_eq!(summary.position_value, Decimal::ZERO);
        assert!(!summary.has_open_position);
        assert_eq!(summary.total_trades, 0);
    }
}
