//! OHLCV bar representation and bar intervals.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// One closed price bar. Prices and volume are finite and non-negative.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    /// (high + low + close) / 3
    pub fn hlc3(&self) -> f64 {
        (self.high + self.low + self.close) / 3.0
    }

    /// Close price times volume.
    pub fn quote_volume(&self) -> f64 {
        self.close * self.volume
    }

    pub fn is_well_formed(&self) -> bool {
        [self.open, self.high, self.low, self.close, self.volume]
            .iter()
            .all(|v| v.is_finite() && *v >= 0.0)
    }
}

/// Bar interval supported by the data and live layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Interval {
    OneMinute,
    FiveMinutes,
    FifteenMinutes,
    OneHour,
    FourHours,
    OneDay,
}

impl Interval {
    pub fn as_str(&self) -> &'static str {
        match self {
            Interval::OneMinute => "1m",
            Interval::FiveMinutes => "5m",
            Interval::FifteenMinutes => "15m",
            Interval::OneHour => "1h",
            Interval::FourHours => "4h",
            Interval::OneDay => "1d",
        }
    }

    pub fn duration(&self) -> Duration {
        let secs = match self {
            Interval::OneMinute => 60,
            Interval::FiveMinutes => 300,
            Interval::FifteenMinutes => 900,
            Interval::OneHour => 3_600,
            Interval::FourHours => 14_400,
            Interval::OneDay => 86_400,
        };
        Duration::from_secs(secs)
    }

    /// How often the live loop polls for a newly closed bar.
    ///
    /// One second per minute of interval, so a 1h feed is checked every minute.
    pub fn poll_period(&self) -> Duration {
        Duration::from_secs(self.duration().as_secs() / 60)
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Interval {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "1m" | "1min" => Ok(Interval::OneMinute),
            "5m" | "5min" => Ok(Interval::FiveMinutes),
            "15m" | "15min" => Ok(Interval::FifteenMinutes),
            "1h" | "60m" => Ok(Interval::OneHour),
            "4h" => Ok(Interval::FourHours),
            "1d" | "d" => Ok(Interval::OneDay),
            other => Err(format!("unsupported interval: {other}")),
        }
    }
}
