//! Market-wide signal scanner.
//!
//! Each symbol runs through fetch, indicators, signal at the last bar and a
//! trend label on a private rayon pool. Actionable hits are published as soon
//! as they are found; the consolidated [`ScanReport`] is sorted by quote volume.

use std::fmt;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::domain::error::TraderError;
use crate::domain::indicator::{rsi, sma, IndicatorSeries};
use crate::domain::ohlcv::{Bar, Interval};
use crate::domain::signal::{evaluate_signal, Signal, SignalWindow};
use crate::domain::strategy::Strategy;
use crate::engine::cancel::CancelToken;
use crate::ports::market_data_port::MarketDataPort;

pub const DEFAULT_WORKERS: usize = 4;
pub const DEFAULT_SCAN_LIMIT: usize = 50;
pub const DEFAULT_MAX_CONSECUTIVE_FAILURES: usize = 3;
pub const DEFAULT_SCAN_PERIOD: Duration = Duration::from_secs(15 * 60);

const TREND_RSI_LENGTH: usize = 14;
const TREND_SMA_LENGTH: usize = 20;
const TREND_MIDLINE: f64 = 50.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Trend {
    Bullish,
    Bearish,
    Neutral,
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trend::Bullish => write!(f, "BULLISH"),
            Trend::Bearish => write!(f, "BEARISH"),
            Trend::Neutral => write!(f, "NEUTRAL"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScanConfig {
    pub interval: Interval,
    /// Size of the scan thread pool.
    pub workers: usize,
    /// Hits below this 24h quote volume are dropped.
    pub min_quote_volume: f64,
    /// Bars fetched per symbol; raised to the strategy's warm-up if smaller.
    pub limit: usize,
    /// Delay between rounds of [`spawn_periodic_scan`].
    pub period: Duration,
    pub max_consecutive_failures: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        ScanConfig {
            interval: Interval::OneHour,
            workers: DEFAULT_WORKERS,
            min_quote_volume: 0.0,
            limit: DEFAULT_SCAN_LIMIT,
            period: DEFAULT_SCAN_PERIOD,
            max_consecutive_failures: DEFAULT_MAX_CONSECUTIVE_FAILURES,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanHit {
    pub symbol: String,
    pub signal: Signal,
    pub trend: Trend,
    pub close: f64,
    pub quote_volume: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ScanFailure {
    pub symbol: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ScanReport {
    /// Sorted by quote volume, largest first.
    pub hits: Vec<ScanHit>,
    pub failed: Vec<ScanFailure>,
    pub scanned: usize,
    pub cancelled: bool,
}

enum SymbolOutcome {
    Hit(ScanHit),
    Quiet,
    Failed(String),
    Skipped,
}

/// BULLISH when RSI(14) is above 50 and the close is above SMA(20),
/// BEARISH when both are below, otherwise NEUTRAL.
pub fn trend_label(bars: &[Bar]) -> Trend {
    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let Some(&close) = closes.last() else {
        return Trend::Neutral;
    };
    let rsi_last = rsi(&closes, TREND_RSI_LENGTH).last();
    let sma_last = sma(&IndicatorSeries::from(closes.as_slice()), TREND_SMA_LENGTH).last();

    match (rsi_last, sma_last) {
        (Some(r), Some(s)) if r > TREND_MIDLINE && close > s => Trend::Bullish,
        (Some(r), Some(s)) if r < TREND_MIDLINE && close < s => Trend::Bearish,
        _ => Trend::Neutral,
    }
}

/// Quote volume traded in the 24 hours ending at the last bar.
pub fn rolling_quote_volume(bars: &[Bar]) -> f64 {
    let Some(last) = bars.last() else {
        return 0.0;
    };
    let since = last.timestamp - TimeDelta::hours(24);
    bars.iter()
        .rev()
        .take_while(|b| b.timestamp > since)
        .map(Bar::quote_volume)
        .sum()
}

/// Run one symbol's pipeline. Returns `None` unless the last bar carries a
/// BUY or SELL and the symbol clears the volume floor.
pub fn scan_symbol(
    symbol: &str,
    strategy: &Strategy,
    config: &ScanConfig,
    market: &dyn MarketDataPort,
) -> Result<Option<ScanHit>, TraderError> {
    let limit = config.limit.max(strategy.warmup_bars() + 1);
    let bars = market.get_bars(symbol, config.interval, None, None, Some(limit))?;
    let Some(last) = bars.last() else {
        return Ok(None);
    };

    let indicators = strategy.compute(&bars);
    let signal = evaluate_signal(strategy, &SignalWindow::at_last(&bars, indicators.as_ref()));
    if signal == Signal::Neutral {
        return Ok(None);
    }

    let quote_volume = rolling_quote_volume(&bars);
    if quote_volume < config.min_quote_volume {
        debug!(symbol, quote_volume, "below volume floor");
        return Ok(None);
    }

    Ok(Some(ScanHit {
        symbol: symbol.to_string(),
        signal,
        trend: trend_label(&bars),
        close: last.close,
        quote_volume,
        timestamp: last.timestamp,
    }))
}

/// Scan `symbols` on a pool of `config.workers` threads.
///
/// `on_partial` sees every hit as it is found, in completion order.
/// Cancellation is checked before each symbol; symbols not started are left
/// out of the report.
pub fn scan_market(
    symbols: &[String],
    strategy: &Strategy,
    config: &ScanConfig,
    market: &dyn MarketDataPort,
    cancel: &CancelToken,
    on_partial: &(dyn Fn(&ScanHit) + Sync),
) -> Result<ScanReport, TraderError> {
    strategy.validate()?;
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.workers.max(1))
        .thread_name(|i| format!("wavetrader-scan-{i}"))
        .build()
        .map_err(|e| TraderError::Io(std::io::Error::other(e.to_string())))?;

    let outcomes: Vec<(&String, SymbolOutcome)> = pool.install(|| {
        symbols
            .par_iter()
            .map(|symbol| {
                if cancel.is_cancelled() {
                    return (symbol, SymbolOutcome::Skipped);
                }
                let outcome = match scan_symbol(symbol, strategy, config, market) {
                    Ok(Some(hit)) => {
                        on_partial(&hit);
                        SymbolOutcome::Hit(hit)
                    }
                    Ok(None) => SymbolOutcome::Quiet,
                    Err(e) => {
                        warn!(symbol = %symbol, error = %e, "scan failed");
                        SymbolOutcome::Failed(e.to_string())
                    }
                };
                (symbol, outcome)
            })
            .collect()
    });

    let mut report = ScanReport {
        cancelled: cancel.is_cancelled(),
        ..ScanReport::default()
    };
    for (symbol, outcome) in outcomes {
        match outcome {
            SymbolOutcome::Hit(hit) => {
                report.scanned += 1;
                report.hits.push(hit);
            }
            SymbolOutcome::Quiet => report.scanned += 1,
            SymbolOutcome::Failed(reason) => {
                report.scanned += 1;
                report.failed.push(ScanFailure {
                    symbol: symbol.clone(),
                    reason,
                });
            }
            SymbolOutcome::Skipped => {}
        }
    }
    report
        .hits
        .sort_by(|a, b| b.quote_volume.total_cmp(&a.quote_volume));

    info!(
        symbols = symbols.len(),
        scanned = report.scanned,
        hits = report.hits.len(),
        failed = report.failed.len(),
        cancelled = report.cancelled,
        "scan complete"
    );
    Ok(report)
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScanEvent {
    Hit(ScanHit),
    Report { round: usize, report: ScanReport },
    RoundFailed { round: usize, reason: String },
    /// Gave up after this many consecutive failed rounds.
    Aborted { failures: usize },
}

pub struct PeriodicScanHandle {
    cancel: CancelToken,
    events: Receiver<ScanEvent>,
    worker: JoinHandle<usize>,
}

impl PeriodicScanHandle {
    pub fn events(&self) -> &Receiver<ScanEvent> {
        &self.events
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Wait for the worker and return the number of rounds it ran.
    pub fn join(self) -> Result<usize, TraderError> {
        self.worker
            .join()
            .map_err(|_| TraderError::Io(std::io::Error::other("scan worker panicked")))
    }
}

/// Repeat [`scan_market`] every `config.period` on a background thread.
///
/// An empty `symbols` list scans whatever the market lists each round. A round
/// fails when listing fails, the scan errors, or every scanned symbol failed.
pub fn spawn_periodic_scan(
    symbols: Vec<String>,
    strategy: Strategy,
    config: ScanConfig,
    market: Arc<dyn MarketDataPort>,
) -> Result<PeriodicScanHandle, TraderError> {
    strategy.validate()?;
    let (tx, rx) = mpsc::channel();
    let cancel = CancelToken::new();
    let worker_cancel = cancel.clone();

    let worker = thread::Builder::new()
        .name("wavetrader-scan".into())
        .spawn(move || {
            let mut round = 0;
            let mut failures = 0;
            while !worker_cancel.is_cancelled() {
                round += 1;
                let partial_tx = tx.clone();
                let publish = move |hit: &ScanHit| {
                    let _ = partial_tx.send(ScanEvent::Hit(hit.clone()));
                };

                let result = if symbols.is_empty() {
                    market.list_symbols()
                } else {
                    Ok(symbols.clone())
                }
                .and_then(|list| {
                    scan_market(
                        &list,
                        &strategy,
                        &config,
                        market.as_ref(),
                        &worker_cancel,
                        &publish,
                    )
                });

                let failed_round = match result {
                    Ok(report) if report.scanned > 0 && report.failed.len() == report.scanned => {
                        Some(format!("all {} symbols failed", report.scanned))
                    }
                    Ok(report) => {
                        let _ = tx.send(ScanEvent::Report { round, report });
                        None
                    }
                    Err(e) => Some(e.to_string()),
                };

                if let Some(reason) = failed_round {
                    failures += 1;
                    warn!(round, failures, reason = %reason, "scan round failed");
                    let _ = tx.send(ScanEvent::RoundFailed { round, reason });
                    if failures >= config.max_consecutive_failures {
                        warn!(failures, "stopping periodic scan");
                        let _ = tx.send(ScanEvent::Aborted { failures });
                        break;
                    }
                } else {
                    failures = 0;
                }

                if worker_cancel.wait_timeout(config.period) {
                    break;
                }
            }
            round
        })?;

    Ok(PeriodicScanHandle {
        cancel,
        events: rx,
        worker,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::indicator::test_support::{bars_from_closes, sine};
    use crate::ports::market_data_port::BarStream;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    struct FixtureMarket {
        bars: HashMap<String, Vec<Bar>>,
        list_calls: Mutex<usize>,
        list_fails: bool,
    }

    impl FixtureMarket {
        fn new(entries: Vec<(&str, Vec<Bar>)>) -> Self {
            FixtureMarket {
                bars: entries
                    .into_iter()
                    .map(|(s, b)| (s.to_string(), b))
                    .collect(),
                list_calls: Mutex::new(0),
                list_fails: false,
            }
        }
    }

    impl MarketDataPort for FixtureMarket {
        fn get_bars(
            &self,
            symbol: &str,
            interval: Interval,
            _start: Option<DateTime<Utc>>,
            _end: Option<DateTime<Utc>>,
            limit: Option<usize>,
        ) -> Result<Vec<Bar>, TraderError> {
            let bars = self.bars.get(symbol).ok_or_else(|| TraderError::NoData {
                symbol: symbol.to_string(),
                interval: interval.to_string(),
            })?;
            let from = limit.map_or(0, |l| bars.len().saturating_sub(l));
            Ok(bars[from..].to_vec())
        }

        fn stream_closed_bars(
            &self,
            symbol: &str,
            _interval: Interval,
        ) -> Result<BarStream, TraderError> {
            Err(TraderError::market_data(symbol, "streaming not supported"))
        }

        fn list_symbols(&self) -> Result<Vec<String>, TraderError> {
            *self.list_calls.lock() += 1;
            if self.list_fails {
                return Err(TraderError::market_data("*", "exchange unavailable"));
            }
            let mut symbols: Vec<String> = self.bars.keys().cloned().collect();
            symbols.sort();
            Ok(symbols)
        }
    }

    // Wave Trend(10, 21) on sine(period 40): BUY at 71, SELL at 53
    fn fixture() -> FixtureMarket {
        let wave = sine(200, 40.0, 10.0);
        FixtureMarket::new(vec![
            ("BUYUSDT", bars_from_closes(&wave[..72])),
            ("SELLUSDT", bars_from_closes(&wave[..54])),
            ("QUIETUSDT", bars_from_closes(&wave[..60])),
            ("FLATUSDT", bars_from_closes(&[10.0; 80])),
        ])
    }

    fn config() -> ScanConfig {
        ScanConfig {
            limit: 500,
            ..ScanConfig::default()
        }
    }

    fn symbols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn finds_buy_and_sell_sorted_by_volume() {
        let market = fixture();
        let partials = Mutex::new(Vec::new());
        let report = scan_market(
            &symbols(&["QUIETUSDT", "SELLUSDT", "FLATUSDT", "BUYUSDT", "MISSINGUSDT"]),
            &Strategy::default(),
            &config(),
            &market,
            &CancelToken::new(),
            &|hit: &ScanHit| partials.lock().push(hit.symbol.clone()),
        )
        .unwrap();

        let hits: Vec<(&str, Signal)> = report
            .hits
            .iter()
            .map(|h| (h.symbol.as_str(), h.signal))
            .collect();
        assert_eq!(hits, vec![("BUYUSDT", Signal::Buy), ("SELLUSDT", Signal::Sell)]);
        assert_eq!(report.scanned, 5);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].symbol, "MISSINGUSDT");
        assert!(!report.cancelled);

        let mut seen = partials.into_inner();
        seen.sort();
        assert_eq!(seen, vec!["BUYUSDT", "SELLUSDT"]);
    }

    #[test]
    fn volume_floor_drops_thin_symbols() {
        let market = fixture();
        let config = ScanConfig {
            min_quote_volume: 60_000.0,
            ..config()
        };
        let report = scan_market(
            &symbols(&["BUYUSDT", "SELLUSDT"]),
            &Strategy::default(),
            &config,
            &market,
            &CancelToken::new(),
            &|_: &ScanHit| {},
        )
        .unwrap();
        assert_eq!(report.hits.len(), 1);
        assert_eq!(report.hits[0].symbol, "BUYUSDT");
    }

    #[test]
    fn cancelled_scan_skips_everything() {
        let market = fixture();
        let cancel = CancelToken::new();
        cancel.cancel();
        let report = scan_market(
            &symbols(&["BUYUSDT", "SELLUSDT"]),
            &Strategy::default(),
            &config(),
            &market,
            &cancel,
            &|_: &ScanHit| {},
        )
        .unwrap();
        assert!(report.cancelled);
        assert_eq!(report.scanned, 0);
        assert!(report.hits.is_empty());
    }

    #[test]
    fn trend_labels() {
        let rising: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        let falling: Vec<f64> = (0..30).map(|i| 100.0 - i as f64).collect();
        assert_eq!(trend_label(&bars_from_closes(&rising)), Trend::Bullish);
        assert_eq!(trend_label(&bars_from_closes(&falling)), Trend::Bearish);
        assert_eq!(trend_label(&bars_from_closes(&[50.0; 30])), Trend::Neutral);
        assert_eq!(trend_label(&bars_from_closes(&rising[..10])), Trend::Neutral);
        assert_eq!(trend_label(&[]), Trend::Neutral);
    }

    #[test]
    fn rolling_volume_only_counts_last_day() {
        let mut bars = bars_from_closes(&[10.0, 10.0, 10.0]);
        bars[0].timestamp = bars[2].timestamp - TimeDelta::hours(30);
        // two bars of 10 * 10 inside the window
        assert_eq!(rolling_quote_volume(&bars), 200.0);
        assert_eq!(rolling_quote_volume(&[]), 0.0);
    }

    #[test]
    fn periodic_scan_aborts_after_consecutive_failures() {
        let mut market = fixture();
        market.list_fails = true;
        let market = Arc::new(market);
        let config = ScanConfig {
            period: Duration::from_millis(1),
            ..config()
        };

        let handle =
            spawn_periodic_scan(Vec::new(), Strategy::default(), config, market.clone()).unwrap();
        let rounds = handle.join().unwrap();

        assert_eq!(rounds, DEFAULT_MAX_CONSECUTIVE_FAILURES);
        assert_eq!(*market.list_calls.lock(), DEFAULT_MAX_CONSECUTIVE_FAILURES);
    }

    #[test]
    fn periodic_scan_publishes_reports_until_stopped() {
        let market = Arc::new(fixture());
        let config = ScanConfig {
            period: Duration::from_millis(5),
            ..config()
        };
        let handle =
            spawn_periodic_scan(symbols(&["BUYUSDT"]), Strategy::default(), config, market)
                .unwrap();

        let mut reports = 0;
        let mut hits = 0;
        while reports < 2 {
            match handle.events().recv_timeout(Duration::from_secs(10)).unwrap() {
                ScanEvent::Hit(hit) => {
                    assert_eq!(hit.symbol, "BUYUSDT");
                    hits += 1;
                }
                ScanEvent::Report { report, .. } => {
                    assert_eq!(report.hits.len(), 1);
                    reports += 1;
                }
                other => panic!("unexpected event {:?}", other),
            }
        }
        handle.stop();
        assert!(handle.join().unwrap() >= 2);
        assert!(hits >= 2);
    }
}
