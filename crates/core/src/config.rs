use serde::{Deserialize, Serialize};

/// Top-level application configuration.
///
/// Every field has a documented default so the monitor can start from
/// environment variables alone (prefix `OI_`, see [`crate::ConfigLoader`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Ticker symbol to monitor.
    pub ticker: String,
    /// Seconds between polls. Fixed delay, not fixed rate.
    pub poll_interval_secs: u64,
    /// Contracts per trade.
    pub lot_size: i64,
    /// Number of trailing snapshots fed to the evaluator.
    pub window_len: usize,
    /// Minimum snapshot-id steps a position must age before a sell.
    pub min_hold_snapshots: i64,
    /// Minimum snapshot-id steps after a buy before the next buy.
    pub cooldown_snapshots: i64,
    /// Unrealized loss fraction that forces a sell (0.5 = -50%).
    pub stop_loss_fraction: f64,
    /// Starting cash when no portfolio file exists.
    pub initial_cash: f64,
    /// Path of the durable portfolio file.
    pub portfolio_path: String,
    /// Consecutive durable-write failures tolerated before aborting.
    pub max_write_failures: u32,
    pub database: DatabaseConfig,
    pub session: SessionConfig,
    pub export: ExportConfig,
    pub replication: ReplicationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub connect_timeout_secs: u64,
}

/// Trading-session window, evaluated in a fixed reference zone rather
/// than the host's local zone.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// IANA zone name, e.g. "Asia/Kolkata".
    pub timezone: String,
    /// Session open, `HH:MM:SS`, inclusive.
    pub open: String,
    /// Session close, `HH:MM:SS`, inclusive.
    pub close: String,
}

/// Optional CSV dump of each delivered snapshot window.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub enabled: bool,
    pub dir: String,
}

/// Best-effort git mirroring of the portfolio file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplicationConfig {
    pub enabled: bool,
    pub remote: String,
    pub branch: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            ticker: "NIFTY50".to_string(),
            poll_interval_secs: 60,
            lot_size: 150,
            window_len: 3,
            min_hold_snapshots: 7,
            cooldown_snapshots: 20,
            stop_loss_fraction: 0.5,
            initial_cash: 100_000.0,
            portfolio_path: "portfolio.json".to_string(),
            max_write_failures: 5,
            database: DatabaseConfig::default(),
            session: SessionConfig::default(),
            export: ExportConfig::default(),
            replication: ReplicationConfig::default(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgresql://localhost/optionchaindata".to_string(),
            max_connections: 5,
            connect_timeout_secs: 30,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timezone: "Asia/Kolkata".to_string(),
            open: "09:15:00".to_string(),
            close: "15:29:59".to_string(),
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            dir: "output".to_string(),
        }
    }
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            remote: "origin".to_string(),
            branch: "main".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_strategy_parameters() {
        let config = AppConfig::default();
        assert_eq!(config.ticker, "NIFTY50");
        assert_eq!(config.poll_interval_secs, 60);
        assert_eq!(config.lot_size, 150);
        assert_eq!(config.window_len, 3);
        assert_eq!(config.min_hold_snapshots, 7);
        assert_eq!(config.cooldown_snapshots, 20);
        assert!((config.stop_loss_fraction - 0.5).abs() < f64::EPSILON);
        assert!((config.initial_cash - 100_000.0).abs() < f64::EPSILON);
        assert_eq!(config.max_write_failures, 5);
    }

    #[test]
    fn default_session_is_ist_trading_hours() {
        let session = SessionConfig::default();
        assert_eq!(session.timezone, "Asia/Kolkata");
        assert_eq!(session.open, "09:15:00");
        assert_eq!(session.close, "15:29:59");
    }

    #[test]
    fn config_deserializes_with_partial_fields() {
        let config: AppConfig = serde_json::from_str(r#"{"ticker": "BANKNIFTY"}"#).unwrap();
        assert_eq!(config.ticker, "BANKNIFTY");
        assert_eq!(config.lot_size, 150);
    }
}
