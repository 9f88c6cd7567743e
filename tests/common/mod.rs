#![allow(dead_code)]

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt::Write as _;
use std::io::Write;
use std::path::Path;
pub use wavetrader::domain::bar_series::BarSeries;
use wavetrader::domain::error::TraderError;
pub use wavetrader::domain::ohlcv::{Bar, Interval};
use wavetrader::ports::market_data_port::{BarStream, MarketDataPort};

pub const BASE_TS: i64 = 1_700_000_000;

pub fn ts(i: usize) -> DateTime<Utc> {
    DateTime::from_timestamp(BASE_TS + i as i64 * 3600, 0).unwrap()
}

/// Hourly bar with high/low one unit either side of `close`.
pub fn make_bar(i: usize, close: f64) -> Bar {
    Bar {
        timestamp: ts(i),
        open: close,
        high: close + 1.0,
        low: (close - 1.0).max(0.0),
        close,
        volume: 10.0,
    }
}

pub fn bars_from_closes(closes: &[f64]) -> Vec<Bar> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &c)| make_bar(i, c))
        .collect()
}

pub fn series(closes: &[f64]) -> BarSeries {
    BarSeries::from_bars(bars_from_closes(closes)).unwrap()
}

pub fn sine_closes(n: usize, period: f64, amplitude: f64) -> Vec<f64> {
    (0..n)
        .map(|i| 100.0 + amplitude * (2.0 * std::f64::consts::PI * i as f64 / period).sin())
        .collect()
}

pub struct MockMarketData {
    pub bars: HashMap<String, Vec<Bar>>,
    pub errors: HashMap<String, String>,
}

impl MockMarketData {
    pub fn new() -> Self {
        Self {
            bars: HashMap::new(),
            errors: HashMap::new(),
        }
    }

    pub fn with_bars(mut self, symbol: &str, bars: Vec<Bar>) -> Self {
        self.bars.insert(symbol.to_string(), bars);
        self
    }

    pub fn with_error(mut self, symbol: &str, reason: &str) -> Self {
        self.errors.insert(symbol.to_string(), reason.to_string());
        self
    }
}

impl MarketDataPort for MockMarketData {
    fn get_bars(
        &self,
        symbol: &str,
        interval: Interval,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        limit: Option<usize>,
    ) -> Result<Vec<Bar>, TraderError> {
        if let Some(reason) = self.errors.get(symbol) {
            return Err(TraderError::market_data(symbol, reason.clone()));
        }
        let bars = self.bars.get(symbol).ok_or_else(|| TraderError::NoData {
            symbol: symbol.to_string(),
            interval: interval.to_string(),
        })?;
        let mut selected: Vec<Bar> = bars
            .iter()
            .filter(|b| start.is_none_or(|s| b.timestamp >= s))
            .filter(|b| end.is_none_or(|e| b.timestamp <= e))
            .cloned()
            .collect();
        if let Some(limit) = limit {
            let excess = selected.len().saturating_sub(limit);
            selected.drain(..excess);
        }
        Ok(selected)
    }

    fn stream_closed_bars(
        &self,
        symbol: &str,
        interval: Interval,
    ) -> Result<BarStream, TraderError> {
        let bars = self.get_bars(symbol, interval, None, None, None)?;
        Ok(Box::new(bars.into_iter().map(Ok)))
    }

    fn list_symbols(&self) -> Result<Vec<String>, TraderError> {
        let mut symbols: Vec<String> = self
            .bars
            .keys()
            .chain(self.errors.keys())
            .cloned()
            .collect();
        symbols.sort();
        symbols.dedup();
        Ok(symbols)
    }
}

/// Write `bars` to `<dir>/<symbol>_<interval>.csv` with epoch-millisecond timestamps.
pub fn write_csv(dir: &Path, symbol: &str, interval: Interval, bars: &[Bar]) {
    let mut content = String::from("timestamp,open,high,low,close,volume\n");
    for bar in bars {
        writeln!(
            content,
            "{},{},{},{},{},{}",
            bar.timestamp.timestamp_millis(),
            bar.open,
            bar.high,
            bar.low,
            bar.close,
            bar.volume
        )
        .unwrap();
    }
    std::fs::write(dir.join(format!("{symbol}_{interval}.csv")), content).unwrap();
}

pub fn write_temp_ini(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}
