//! Market data port trait.

use crate::domain::error::TraderError;
use crate::domain::ohlcv::{Bar, Interval};
use chrono::{DateTime, Utc};

/// Lazily produced closed bars. The stream ends when the feed disconnects;
/// call [`MarketDataPort::stream_closed_bars`] again to reconnect.
pub type BarStream = Box<dyn Iterator<Item = Result<Bar, TraderError>> + Send>;

pub trait MarketDataPort: Send + Sync {
    /// Closed bars for `symbol`, oldest first, optionally bounded in time.
    ///
    /// With a `limit`, only the most recent `limit` bars of the range are returned.
    fn get_bars(
        &self,
        symbol: &str,
        interval: Interval,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        limit: Option<usize>,
    ) -> Result<Vec<Bar>, TraderError>;

    fn stream_closed_bars(&self, symbol: &str, interval: Interval)
    -> Result<BarStream, TraderError>;

    fn list_symbols(&self) -> Result<Vec<String>, TraderError>;
}

/// Parameters of one historical fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct BarRequest {
    pub symbol: String,
    pub interval: Interval,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl BarRequest {
    pub fn new(symbol: impl Into<String>, interval: Interval) -> Self {
        BarRequest {
            symbol: symbol.into(),
            interval,
            start: None,
            end: None,
            limit: None,
        }
    }

    pub fn between(mut self, start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Self {
        self.start = start;
        self.end = end;
        self
    }

    pub fn latest(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn fetch(&self, port: &dyn MarketDataPort) -> Result<Vec<Bar>, TraderError> {
        port.get_bars(&self.symbol, self.interval, self.start, self.end, self.limit)
    }
}
