//! CSV file market data adapter.
//!
//! Bars for one symbol and interval live in `<dir>/<SYMBOL>_<interval>.csv`
//! with a `timestamp,open,high,low,close,volume` header. Timestamps may be
//! epoch milliseconds, RFC 3339, `%Y-%m-%d %H:%M:%S` or a bare `%Y-%m-%d`.

use crate::domain::error::TraderError;
use crate::domain::ohlcv::{Bar, Interval};
use crate::ports::market_data_port::{BarStream, MarketDataPort};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use std::fs;
use std::path::PathBuf;
use tracing::debug;

pub struct CsvMarketData {
    base_path: PathBuf,
}

impl CsvMarketData {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    fn csv_path(&self, symbol: &str, interval: Interval) -> PathBuf {
        self.base_path.join(format!("{}_{}.csv", symbol, interval))
    }

    /// Every bar in the symbol's file, sorted oldest first.
    fn load(&self, symbol: &str, interval: Interval) -> Result<Vec<Bar>, TraderError> {
        let path = self.csv_path(symbol, interval);
        if !path.exists() {
            return Err(TraderError::NoData {
                symbol: symbol.to_string(),
                interval: interval.to_string(),
            });
        }
        let content = fs::read_to_string(&path).map_err(|e| {
            TraderError::market_data(symbol, format!("failed to read {}: {}", path.display(), e))
        })?;

        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(content.as_bytes());
        let mut bars = Vec::new();

        for (row, result) in rdr.records().enumerate() {
            let record = result
                .map_err(|e| TraderError::market_data(symbol, format!("CSV parse error: {}", e)))?;
            let field = |idx: usize, name: &str| {
                record.get(idx).ok_or_else(|| {
                    let reason = format!("row {}: missing {} column", row + 1, name);
                    TraderError::market_data(symbol, reason)
                })
            };
            let number = |idx: usize, name: &str| -> Result<f64, TraderError> {
                field(idx, name)?.parse::<f64>().map_err(|e| {
                    let reason = format!("row {}: invalid {} value: {}", row + 1, name, e);
                    TraderError::market_data(symbol, reason)
                })
            };

            let raw_ts = field(0, "timestamp")?;
            let timestamp = parse_timestamp(raw_ts).ok_or_else(|| {
                let reason = format!("row {}: invalid timestamp {:?}", row + 1, raw_ts);
                TraderError::market_data(symbol, reason)
            })?;

            let bar = Bar {
                timestamp,
                open: number(1, "open")?,
                high: number(2, "high")?,
                low: number(3, "low")?,
                close: number(4, "close")?,
                volume: number(5, "volume")?,
            };
            if !bar.is_well_formed() {
                return Err(TraderError::market_data(
                    symbol,
                    format!("row {}: prices and volume must be finite and non-negative", row + 1),
                ));
            }
            bars.push(bar);
        }

        bars.sort_by_key(|b| b.timestamp);
        bars.dedup_by_key(|b| b.timestamp);
        debug!(symbol, %interval, bars = bars.len(), path = %path.display(), "loaded csv bars");
        Ok(bars)
    }
}

pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ms) = raw.parse::<i64>() {
        return DateTime::from_timestamp_millis(ms);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Some(dt.and_utc());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

impl MarketDataPort for CsvMarketData {
    fn get_bars(
        &self,
        symbol: &str,
        interval: Interval,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        limit: Option<usize>,
    ) -> Result<Vec<Bar>, TraderError> {
        let mut bars: Vec<Bar> = self
            .load(symbol, interval)?
            .into_iter()
            .filter(|b| start.is_none_or(|s| b.timestamp >= s))
            .filter(|b| end.is_none_or(|e| b.timestamp <= e))
            .collect();

        if let Some(limit) = limit {
            if bars.len() > limit {
                bars.drain(..bars.len() - limit);
            }
        }
        Ok(bars)
    }

    /// Replays the file as a closed-bar feed. The stream ends after the last row.
    fn stream_closed_bars(
        &self,
        symbol: &str,
        interval: Interval,
    ) -> Result<BarStream, TraderError> {
        let bars = self.load(symbol, interval)?;
        Ok(Box::new(bars.into_iter().map(Ok)))
    }

    /// Symbols present under the base directory, any interval.
    fn list_symbols(&self) -> Result<Vec<String>, TraderError> {
        let entries = fs::read_dir(&self.base_path)?;

        let mut symbols = Vec::new();
        for entry in entries {
            let name = entry?.file_name();
            let name_str = name.to_string_lossy();

            let Some(stem) = name_str.strip_suffix(".csv") else {
                continue;
            };
            if let Some((symbol, interval)) = stem.rsplit_once('_') {
                if interval.parse::<Interval>().is_ok() && !symbol.is_empty() {
                    symbols.push(symbol.to_string());
                }
            }
        }

        symbols.sort();
        symbols.dedup();
        Ok(symbols)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup_test_data() -> (TempDir, PathBuf) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().to_path_buf();

        let csv_content = "timestamp,open,high,low,close,volume\n\
            2024-01-15 00:00:00,100.0,110.0,90.0,105.0,500\n\
            2024-01-15 01:00:00,105.0,115.0,100.0,110.0,600\n\
            2024-01-15T02:00:00Z,110.0,120.0,105.0,115.0,550\n\
            1705287600000,115.0,125.0,110.0,120.0,700\n";

        fs::write(path.join("BTCUSDT_1h.csv"), csv_content).unwrap();
        fs::write(
            path.join("ETHUSDT_1h.csv"),
            "timestamp,open,high,low,close,volume\n",
        )
        .unwrap();
        fs::write(
            path.join("ETHUSDT_1d.csv"),
            "timestamp,open,high,low,close,volume\n2024-01-15,1,2,0.5,1.5,10\n",
        )
        .unwrap();
        fs::write(path.join("notes.txt"), "ignored").unwrap();

        (dir, path)
    }

    fn ts(raw: &str) -> DateTime<Utc> {
        parse_timestamp(raw).unwrap()
    }

    #[test]
    fn get_bars_returns_all_formats_in_order() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvMarketData::new(path);

        let bars = adapter
            .get_bars("BTCUSDT", Interval::OneHour, None, None, None)
            .unwrap();

        assert_eq!(bars.len(), 4);
        assert_eq!(bars[0].timestamp, ts("2024-01-15T00:00:00Z"));
        assert_eq!(bars[0].open, 100.0);
        assert_eq!(bars[0].high, 110.0);
        assert_eq!(bars[0].low, 90.0);
        assert_eq!(bars[0].close, 105.0);
        assert_eq!(bars[0].volume, 500.0);
        // 1705287600000 ms is 2024-01-15 03:00 UTC
        assert_eq!(bars[3].timestamp, ts("2024-01-15T03:00:00Z"));
    }

    #[test]
    fn get_bars_filters_by_range_and_limit() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvMarketData::new(path);

        let bars = adapter
            .get_bars(
                "BTCUSDT",
                Interval::OneHour,
                Some(ts("2024-01-15 01:00:00")),
                Some(ts("2024-01-15 02:00:00")),
                None,
            )
            .unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].close, 110.0);

        let latest = adapter
            .get_bars("BTCUSDT", Interval::OneHour, None, None, Some(2))
            .unwrap();
        assert_eq!(latest.len(), 2);
        assert_eq!(latest[1].close, 120.0);
    }

    #[test]
    fn missing_file_is_no_data() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvMarketData::new(path);

        let result = adapter.get_bars("XRPUSDT", Interval::OneHour, None, None, None);
        assert!(matches!(result, Err(TraderError::NoData { .. })));
    }

    #[test]
    fn malformed_row_is_market_data_error() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("BAD_1h.csv"),
            "timestamp,open,high,low,close,volume\n2024-01-15,1,2,0.5,-1.5,10\n",
        )
        .unwrap();
        let adapter = CsvMarketData::new(dir.path());

        let result = adapter.get_bars("BAD", Interval::OneHour, None, None, None);
        assert!(matches!(result, Err(TraderError::MarketData { .. })));
    }

    #[test]
    fn stream_replays_file() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvMarketData::new(path);

        let closes: Vec<f64> = adapter
            .stream_closed_bars("BTCUSDT", Interval::OneHour)
            .unwrap()
            .map(|r| r.unwrap().close)
            .collect();
        assert_eq!(closes, vec![105.0, 110.0, 115.0, 120.0]);
    }

    #[test]
    fn list_symbols_deduplicates_intervals() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvMarketData::new(path);

        assert_eq!(adapter.list_symbols().unwrap(), vec!["BTCUSDT", "ETHUSDT"]);
    }

    #[test]
    fn parse_timestamp_rejects_garbage() {
        assert!(parse_timestamp("yesterday").is_none());
        assert_eq!(ts("2024-01-15"), ts("2024-01-15T00:00:00+00:00"));
    }
}
