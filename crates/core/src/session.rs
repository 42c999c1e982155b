//! Trading-session gating against a fixed reference time zone.
//!
//! The clock takes an explicit instant so session boundaries can be
//! tested deterministically regardless of the host's local zone.

use anyhow::{Context, Result};
use chrono::{DateTime, Datelike, NaiveTime, Utc, Weekday};
use chrono_tz::Tz;

use crate::config::SessionConfig;

/// Decides whether an instant falls inside the trading session.
#[derive(Debug, Clone)]
pub struct SessionClock {
    tz: Tz,
    open: NaiveTime,
    close: NaiveTime,
}

impl SessionClock {
    /// Creates a clock for the given zone and inclusive open/close times.
    #[must_use]
    pub const fn new(tz: Tz, open: NaiveTime, close: NaiveTime) -> Self {
        Self { tz, open, close }
    }

    /// Builds a clock from configuration strings.
    ///
    /// # Errors
    /// Returns an error if the zone name or a time string cannot be parsed.
    pub fn from_config(config: &SessionConfig) -> Result<Self> {
        let tz: Tz = config
            .timezone
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid timezone {:?}: {e}", config.timezone))?;
        let open = NaiveTime::parse_from_str(&config.open, "%H:%M:%S")
            .with_context(|| format!("invalid session open time {:?}", config.open))?;
        let close = NaiveTime::parse_from_str(&config.close, "%H:%M:%S")
            .with_context(|| format!("invalid session close time {:?}", config.close))?;
        Ok(Self::new(tz, open, close))
    }

    /// Returns true iff `now` is a trading weekday (Mon-Fri) and the
    /// time-of-day in the reference zone lies within `[open, close]`,
    /// both bounds inclusive. Pure function of its input.
    #[must_use]
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        let local = now.with_timezone(&self.tz);
        let weekday = local.weekday();
        if matches!(weekday, Weekday::Sat | Weekday::Sun) {
            return false;
        }
        let time = local.time();
        time >= self.open && time <= self.close
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use chrono_tz::Asia::Kolkata;

    fn clock() -> SessionClock {
        SessionClock::from_config(&SessionConfig::default()).unwrap()
    }

    fn ist(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> DateTime<Utc> {
        Kolkata
            .with_ymd_and_hms(y, m, d, h, min, s)
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn wednesday_boundaries_are_inclusive() {
        let clock = clock();
        // 2025-06-11 is a Wednesday.
        assert!(!clock.is_active(ist(2025, 6, 11, 9, 14, 59)));
        assert!(clock.is_active(ist(2025, 6, 11, 9, 15, 0)));
        assert!(clock.is_active(ist(2025, 6, 11, 15, 29, 59)));
        assert!(!clock.is_active(ist(2025, 6, 11, 15, 30, 0)));
    }

    #[test]
    fn midday_weekday_is_active() {
        assert!(clock().is_active(ist(2025, 6, 13, 12, 0, 0)));
    }

    #[test]
    fn weekend_is_never_active() {
        let clock = clock();
        // 2025-06-14/15 are Saturday and Sunday.
        assert!(!clock.is_active(ist(2025, 6, 14, 12, 0, 0)));
        assert!(!clock.is_active(ist(2025, 6, 15, 12, 0, 0)));
    }

    #[test]
    fn evaluation_ignores_host_zone() {
        // 03:45 UTC on a Wednesday is 09:15 IST, the session open.
        let clock = clock();
        let now = Utc.with_ymd_and_hms(2025, 6, 11, 3, 45, 0).unwrap();
        assert!(clock.is_active(now));
        let before = Utc.with_ymd_and_hms(2025, 6, 11, 3, 44, 59).unwrap();
        assert!(!clock.is_active(before));
    }

    #[test]
    fn bad_timezone_is_rejected() {
        let config = SessionConfig {
            timezone: "Mars/Olympus".to_string(),
            ..SessionConfig::default()
        };
        assert!(SessionClock::from_config(&config).is_err());
    }
}
