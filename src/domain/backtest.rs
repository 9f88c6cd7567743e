//! Backtest simulator.
//!
//! Indicators are computed once over the whole series, then bars are walked
//! from index 1: each bar's signal is evaluated and applied to the ledger, with
//! capital booked through the configured accounting mode. Runs are pure and
//! deterministic; an empty or too-short series simply produces no trades.

use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::domain::bar_series::BarSeries;
use crate::domain::ledger::Ledger;
use crate::domain::metrics::BacktestStats;
use crate::domain::ohlcv::Bar;
use crate::domain::portfolio::{return_pct, CapitalAccount, EquityPoint, MarkToMarket};
use crate::domain::position::{Position, TradeRecord};
use crate::domain::signal::{evaluate_signal, Signal, SignalWindow};
use crate::domain::strategy::StrategyConfig;
use crate::ports::market_data_port::{BarRequest, MarketDataPort};

pub const DEFAULT_INITIAL_CAPITAL: f64 = 100_000.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BacktestResult {
    pub trades: Vec<TradeRecord>,
    pub initial_capital: f64,
    /// Realized capital; an open position is not included.
    pub final_capital: f64,
    pub total_return_pct: f64,
    pub total_trades: usize,
    pub win_rate_pct: f64,
    pub open_position: Option<Position>,
    pub mark_to_market: Option<MarkToMarket>,
    pub stats: BacktestStats,
    pub equity_curve: Vec<EquityPoint>,
}

impl BacktestResult {
    pub fn empty(initial_capital: f64) -> Self {
        BacktestResult {
            trades: Vec::new(),
            initial_capital,
            final_capital: initial_capital,
            total_return_pct: 0.0,
            total_trades: 0,
            win_rate_pct: 0.0,
            open_position: None,
            mark_to_market: None,
            stats: BacktestStats::default(),
            equity_curve: Vec::new(),
        }
    }
}

pub fn run_backtest(
    series: &BarSeries,
    config: &StrategyConfig,
    initial_capital: f64,
) -> BacktestResult {
    simulate(&series.to_vec(), config, initial_capital)
}

fn simulate(bars: &[Bar], config: &StrategyConfig, initial_capital: f64) -> BacktestResult {
    let strategy = &config.strategy;
    let Some(first) = bars.first() else {
        return BacktestResult::empty(initial_capital);
    };

    let indicators = strategy.compute(bars);
    let mut ledger = Ledger::new();
    let mut account = CapitalAccount::new(initial_capital, config.accounting);
    account.record_equity(first.timestamp);

    for (i, bar) in bars.iter().enumerate().skip(1) {
        let window = SignalWindow::new(bars, i, indicators.as_ref());
        let price = bar.close;
        match evaluate_signal(strategy, &window) {
            Signal::Buy if ledger.would_fire(Signal::Buy) => {
                let size = account.open(price);
                ledger.open_long(bar.timestamp, price, size);
                debug!(index = i, price, size, "BUY");
            }
            Signal::Sell => {
                let closed = ledger
                    .close_long(bar.timestamp, price, |pos| account.close(pos, price))
                    .and_then(|t| t.realized_profit);
                if let Some(profit) = closed {
                    account.record_equity(bar.timestamp);
                    debug!(index = i, price, profit, "SELL");
                }
            }
            _ => {}
        }
    }

    let last_close = bars[bars.len() - 1].close;
    let (trades, open_position) = ledger.into_parts();
    let mark_to_market = open_position
        .as_ref()
        .filter(|_| config.accounting.force_close_open_position)
        .map(|pos| account.mark_to_market(pos, last_close));

    let final_capital = account.capital();
    let stats = BacktestStats::compute(&trades, account.equity_curve());

    info!(
        strategy = strategy.name(),
        bars = bars.len(),
        trades = stats.total_trades,
        final_capital,
        "backtest complete"
    );

    BacktestResult {
        total_trades: stats.total_trades,
        win_rate_pct: stats.win_rate_pct,
        total_return_pct: return_pct(initial_capital, final_capital),
        trades,
        initial_capital,
        final_capital,
        open_position,
        mark_to_market,
        equity_curve: account.equity_curve().to_vec(),
        stats,
    }
}

/// Fetch bars through `port` and backtest them.
///
/// A failed fetch or malformed history is logged and yields the empty result.
pub fn run_backtest_from_port(
    port: &dyn MarketDataPort,
    request: &BarRequest,
    config: &StrategyConfig,
    initial_capital: f64,
) -> BacktestResult {
    let bars = match request.fetch(port) {
        Ok(bars) => bars,
        Err(e) => {
            warn!(symbol = %request.symbol, error = %e, "historical fetch failed");
            return BacktestResult::empty(initial_capital);
        }
    };
    match BarSeries::from_bars(bars) {
        Ok(series) => run_backtest(&series, config, initial_capital),
        Err(e) => {
            warn!(symbol = %request.symbol, error = %e, "historical bars rejected");
            BacktestResult::empty(initial_capital)
        }
    }
}

/// Backtest several named series in parallel. Output order matches input order.
pub fn run_many(
    runs: &[(String, BarSeries)],
    config: &StrategyConfig,
    initial_capital: f64,
) -> Vec<(String, BacktestResult)> {
    runs.par_iter()
        .map(|(name, series)| (name.clone(), run_backtest(series, config, initial_capital)))
        .collect()
}
