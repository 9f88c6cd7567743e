//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use crate::adapters::csv_adapter::{parse_timestamp, CsvMarketData};
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::paper_broker::PaperBroker;
use crate::domain::backtest::{self as backtest_engine, BacktestResult, DEFAULT_INITIAL_CAPITAL};
use crate::domain::bar_series::BarSeries;
use crate::domain::config_validation::{
    validate_backtest_config, validate_data_config, validate_live_config,
    validate_logging_config, validate_scan_config, validate_strategy_config,
};
use crate::domain::error::TraderError;
use crate::domain::ohlcv::Interval;
use crate::domain::portfolio::{
    AccountingConfig, CapitalMode, DEFAULT_COMMISSION_FEE, DEFAULT_POSITION_SIZE,
};
use crate::domain::strategy::{
    MacdParams, RsiParams, Strategy, StrategyConfig, StrategyRegistry, WaveTrendMode,
    WaveTrendParams, DEFAULT_CUSTOM_WINDOW, DEFAULT_WT_BAND,
};
use crate::engine::cancel::CancelToken;
use crate::engine::live::{
    FeedMode, LiveConfig, LiveOutcome, LiveSession, DEFAULT_ALLOCATION, DEFAULT_WINDOW,
};
use crate::engine::scanner::{self, ScanConfig, ScanEvent, ScanHit, ScanReport};
use crate::ports::config_port::ConfigPort;
use crate::ports::market_data_port::{BarRequest, MarketDataPort};
use crate::ports::order_port::OrderPort;

#[derive(Parser, Debug)]
#[command(name = "wavetrader", about = "Oscillator signal backtester and market scanner")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Backtest the configured strategy over CSV history
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        /// Symbols to test; defaults to [backtest] symbols, then every file in the data dir
        #[arg(short, long)]
        symbol: Vec<String>,
        #[arg(long)]
        start: Option<String>,
        #[arg(long)]
        end: Option<String>,
        /// Print the full results as JSON on stdout
        #[arg(long)]
        json: bool,
        #[arg(long)]
        dry_run: bool,
    },
    /// Scan symbols for a BUY or SELL on the latest bar
    Scan {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        symbol: Vec<String>,
        /// Repeat the scan for this many successful rounds
        #[arg(long)]
        rounds: Option<usize>,
    },
    /// Replay a CSV file through the live loop against a paper broker
    Replay {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        symbol: String,
    },
    /// Validate a configuration file
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Backtest {
            config,
            symbol,
            start,
            end,
            json,
            dry_run,
        } => {
            if dry_run {
                run_validate(&config)
            } else {
                run_backtest(&config, &symbol, start.as_deref(), end.as_deref(), json)
            }
        }
        Command::Scan {
            config,
            symbol,
            rounds,
        } => run_scan(&config, &symbol, rounds),
        Command::Replay { config, symbol } => run_replay(&config, &symbol),
        Command::Validate { config } => run_validate(&config),
    }
}

fn fail(err: TraderError) -> ExitCode {
    eprintln!("error: {err}");
    (&err).into()
}

pub fn load_config(path: &PathBuf) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(fail)
}

/// Install the global subscriber. `WAVETRADER_LOG` overrides `level`.
pub fn init_tracing(level: &str, format: &str) -> Result<(), String> {
    let filter = std::env::var("WAVETRADER_LOG").unwrap_or_else(|_| level.to_string());
    let env_filter = tracing_subscriber::EnvFilter::try_new(filter)
        .map_err(|err| format!("invalid log filter: {err}"))?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);
    let result = if format.trim().eq_ignore_ascii_case("json") {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    result.map_err(|err| format!("failed to install tracing subscriber: {err}"))
}

fn init_logging(adapter: &dyn ConfigPort) {
    let level = adapter
        .get_string("logging", "level")
        .unwrap_or_else(|| "info".to_string());
    let format = adapter
        .get_string("logging", "format")
        .unwrap_or_else(|| "text".to_string());
    if let Err(e) = init_tracing(&level, &format) {
        eprintln!("warning: {e}");
    }
}

/// Validate the [strategy] and [backtest] sections and build a run config.
pub fn build_strategy_config(
    adapter: &dyn ConfigPort,
    registry: &StrategyRegistry,
) -> Result<StrategyConfig, TraderError> {
    validate_strategy_config(adapter)?;
    validate_backtest_config(adapter)?;

    let kind = adapter
        .get_string("strategy", "kind")
        .map(|k| k.trim().to_lowercase())
        .unwrap_or_default();
    let length = |key: &str, default: usize| {
        adapter.get_int("strategy", key, default as i64).max(0) as usize
    };

    let strategy = match kind.as_str() {
        "wave_trend" => {
            let band = adapter.get_double("strategy", "wt_band", DEFAULT_WT_BAND);
            let mode = match adapter
                .get_string("strategy", "wt_mode")
                .map(|m| m.trim().to_lowercase())
                .as_deref()
            {
                Some("gated") => WaveTrendMode::Gated { band },
                Some("band_exit") => WaveTrendMode::BandExit { band },
                _ => WaveTrendMode::Crossover,
            };
            let defaults = WaveTrendParams::default();
            Strategy::WaveTrend(WaveTrendParams {
                channel_length: length("wt_channel_length", defaults.channel_length),
                average_length: length("wt_average_length", defaults.average_length),
                mode,
            })
        }
        "rsi" => {
            let defaults = RsiParams::default();
            Strategy::Rsi(RsiParams {
                length: length("rsi_length", defaults.length),
                oversold: adapter.get_double("strategy", "rsi_oversold", defaults.oversold),
                overbought: adapter.get_double("strategy", "rsi_overbought", defaults.overbought),
            })
        }
        "macd" => {
            let defaults = MacdParams::default();
            Strategy::Macd(MacdParams {
                fast: length("macd_fast", defaults.fast),
                slow: length("macd_slow", defaults.slow),
                signal: length("macd_signal", defaults.signal),
            })
        }
        _ => {
            let name = adapter.get_string("strategy", "name").unwrap_or_default();
            registry.resolve(&name, length("window", DEFAULT_CUSTOM_WINDOW))?
        }
    };
    strategy.validate()?;

    let mode = match adapter
        .get_string("backtest", "capital_mode")
        .map(|m| m.trim().to_lowercase())
        .as_deref()
    {
        Some("fixed") => CapitalMode::FixedSize {
            size: adapter.get_double("backtest", "position_size", DEFAULT_POSITION_SIZE),
        },
        _ => CapitalMode::Compounding,
    };

    Ok(StrategyConfig {
        strategy,
        accounting: AccountingConfig {
            mode,
            commission_fee: adapter.get_double(
                "backtest",
                "commission_fee",
                DEFAULT_COMMISSION_FEE,
            ),
            force_close_open_position: adapter.get_bool("backtest", "force_close", true),
        },
    })
}

pub fn build_data_source(
    adapter: &dyn ConfigPort,
) -> Result<(CsvMarketData, Interval), TraderError> {
    validate_data_config(adapter)?;
    let dir = adapter
        .get_string("data", "dir")
        .unwrap_or_else(|| "data".to_string());
    let interval = match adapter.get_string("data", "interval") {
        Some(raw) => raw
            .parse()
            .map_err(|reason| TraderError::config_invalid("data", "interval", reason))?,
        None => Interval::OneHour,
    };
    Ok((CsvMarketData::new(dir), interval))
}

pub fn build_live_config(
    adapter: &dyn ConfigPort,
    interval: Interval,
) -> Result<LiveConfig, TraderError> {
    validate_live_config(adapter)?;
    let poll_interval = adapter
        .get_string("live", "poll_secs")
        .and_then(|raw| raw.trim().parse::<f64>().ok())
        .map(Duration::from_secs_f64);
    let feed = match adapter
        .get_string("live", "feed")
        .map(|f| f.trim().to_lowercase())
        .as_deref()
    {
        Some("stream") => FeedMode::Stream,
        _ => FeedMode::Poll,
    };
    Ok(LiveConfig {
        interval,
        window: adapter.get_int("live", "window", DEFAULT_WINDOW as i64).max(1) as usize,
        allocation: adapter.get_double("live", "allocation", DEFAULT_ALLOCATION),
        poll_interval,
        feed,
    })
}

pub fn build_scan_config(
    adapter: &dyn ConfigPort,
    interval: Interval,
) -> Result<ScanConfig, TraderError> {
    validate_scan_config(adapter)?;
    let defaults = ScanConfig::default();
    let period = adapter
        .get_string("scan", "period_secs")
        .and_then(|raw| raw.trim().parse::<u64>().ok())
        .map_or(defaults.period, Duration::from_secs);
    Ok(ScanConfig {
        interval,
        workers: adapter.get_int("scan", "workers", defaults.workers as i64).max(1) as usize,
        min_quote_volume: adapter.get_double("scan", "min_quote_volume", defaults.min_quote_volume),
        limit: adapter.get_int("scan", "limit", defaults.limit as i64).max(1) as usize,
        period,
        max_consecutive_failures: adapter
            .get_int("scan", "max_consecutive_failures", defaults.max_consecutive_failures as i64)
            .max(1) as usize,
    })
}

/// Symbols from the command line, else `[section] symbols`, else the data dir.
pub fn resolve_symbols(
    overrides: &[String],
    adapter: &dyn ConfigPort,
    section: &str,
    market: &dyn MarketDataPort,
) -> Result<Vec<String>, TraderError> {
    if !overrides.is_empty() {
        return Ok(overrides.iter().map(|s| s.trim().to_uppercase()).collect());
    }
    if let Some(list) = adapter.get_string(section, "symbols") {
        let symbols: Vec<String> = list
            .split(',')
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect();
        if !symbols.is_empty() {
            return Ok(symbols);
        }
    }
    market.list_symbols()
}

fn parse_bound(
    raw: Option<String>,
    key: &str,
) -> Result<Option<chrono::DateTime<chrono::Utc>>, TraderError> {
    raw.map(|r| {
        parse_timestamp(&r).ok_or_else(|| {
            TraderError::config_invalid("backtest", key, format!("unrecognised timestamp '{r}'"))
        })
    })
    .transpose()
}

fn run_backtest(
    config_path: &PathBuf,
    symbols: &[String],
    start: Option<&str>,
    end: Option<&str>,
    json: bool,
) -> ExitCode {
    eprintln!("Loading config from {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };
    init_logging(&adapter);

    let config = match build_strategy_config(&adapter, &StrategyRegistry::with_builtins()) {
        Ok(c) => c,
        Err(e) => return fail(e),
    };
    let (market, interval) = match build_data_source(&adapter) {
        Ok(d) => d,
        Err(e) => return fail(e),
    };
    let start = start
        .map(str::to_string)
        .or_else(|| adapter.get_string("backtest", "start"));
    let start = match parse_bound(start, "start") {
        Ok(s) => s,
        Err(e) => return fail(e),
    };
    let end = end
        .map(str::to_string)
        .or_else(|| adapter.get_string("backtest", "end"));
    let end = match parse_bound(end, "end") {
        Ok(e) => e,
        Err(e) => return fail(e),
    };
    let symbols = match resolve_symbols(symbols, &adapter, "backtest", &market) {
        Ok(s) if !s.is_empty() => s,
        Ok(_) => {
            eprintln!("error: no symbols configured");
            return ExitCode::from(2);
        }
        Err(e) => return fail(e),
    };
    let initial_capital =
        adapter.get_double("backtest", "initial_capital", DEFAULT_INITIAL_CAPITAL);

    eprintln!(
        "Running {} on {} symbol(s) at {}",
        config.strategy.name(),
        symbols.len(),
        interval
    );
    let runs = load_series(&market, &symbols, interval, start, end);
    let results = backtest_engine::run_many(&runs, &config, initial_capital);

    for (symbol, result) in &results {
        print_summary(symbol, result);
    }

    if json {
        let payload: serde_json::Map<String, serde_json::Value> = results
            .iter()
            .map(|(symbol, result)| {
                (
                    symbol.clone(),
                    serde_json::to_value(result).unwrap_or(serde_json::Value::Null),
                )
            })
            .collect();
        match serde_json::to_string_pretty(&payload) {
            Ok(text) => println!("{text}"),
            Err(e) => {
                eprintln!("error: failed to serialise results: {e}");
                return ExitCode::from(1);
            }
        }
    }
    ExitCode::SUCCESS
}

/// Fetch each symbol's history. Symbols whose fetch fails get an empty series.
pub fn load_series(
    market: &dyn MarketDataPort,
    symbols: &[String],
    interval: Interval,
    start: Option<chrono::DateTime<chrono::Utc>>,
    end: Option<chrono::DateTime<chrono::Utc>>,
) -> Vec<(String, BarSeries)> {
    symbols
        .iter()
        .map(|symbol| {
            let request = BarRequest::new(symbol.clone(), interval).between(start, end);
            let series = request
                .fetch(market)
                .and_then(BarSeries::from_bars)
                .unwrap_or_else(|e| {
                    eprintln!("warning: {symbol}: {e}");
                    BarSeries::new()
                });
            (symbol.clone(), series)
        })
        .collect()
}

fn print_summary(symbol: &str, result: &BacktestResult) {
    eprintln!("\n=== {symbol} ===");
    eprintln!("Initial Capital:  {:.2}", result.initial_capital);
    eprintln!("Final Capital:    {:.2}", result.final_capital);
    eprintln!("Total Return:     {:.2}%", result.total_return_pct);
    eprintln!("Total Trades:     {}", result.total_trades);
    eprintln!("Win Rate:         {:.1}%", result.win_rate_pct);
    eprintln!("Profit Factor:    {:.2}", result.stats.profit_factor);
    eprintln!("Max Drawdown:     -{:.1}%", result.stats.max_drawdown * 100.0);
    if let (Some(pos), Some(mtm)) = (&result.open_position, &result.mark_to_market) {
        eprintln!(
            "Open Position:    {:.4} @ {:.4}, marked {:.2} ({:+.2}%)",
            pos.size, pos.entry_price, mtm.capital, mtm.return_pct
        );
    }
}

fn run_scan(config_path: &PathBuf, symbols: &[String], rounds: Option<usize>) -> ExitCode {
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };
    init_logging(&adapter);

    let config = match build_strategy_config(&adapter, &StrategyRegistry::with_builtins()) {
        Ok(c) => c,
        Err(e) => return fail(e),
    };
    let (market, interval) = match build_data_source(&adapter) {
        Ok(d) => d,
        Err(e) => return fail(e),
    };
    let scan_config = match build_scan_config(&adapter, interval) {
        Ok(c) => c,
        Err(e) => return fail(e),
    };
    let symbols = match resolve_symbols(symbols, &adapter, "scan", &market) {
        Ok(s) => s,
        Err(e) => return fail(e),
    };

    match rounds {
        None => {
            eprintln!("Scanning {} symbol(s) with {}", symbols.len(), config.strategy.name());
            match scanner::scan_market(
                &symbols,
                &config.strategy,
                &scan_config,
                &market,
                &CancelToken::new(),
                &|hit: &ScanHit| eprintln!("  found {} {}", hit.symbol, hit.signal),
            ) {
                Ok(report) => {
                    print_scan_report(&report);
                    ExitCode::SUCCESS
                }
                Err(e) => fail(e),
            }
        }
        Some(wanted) => {
            let handle = match scanner::spawn_periodic_scan(
                symbols,
                config.strategy,
                scan_config,
                Arc::new(market),
            ) {
                Ok(h) => h,
                Err(e) => return fail(e),
            };
            let mut completed = 0;
            let mut aborted = false;
            for event in handle.events() {
                match event {
                    ScanEvent::Hit(hit) => eprintln!("  found {} {}", hit.symbol, hit.signal),
                    ScanEvent::Report { round, report } => {
                        eprintln!("\n--- round {round} ---");
                        print_scan_report(&report);
                        completed += 1;
                    }
                    ScanEvent::RoundFailed { round, reason } => {
                        eprintln!("warning: round {round} failed: {reason}");
                    }
                    ScanEvent::Aborted { failures } => {
                        eprintln!("error: scan stopped after {failures} consecutive failures");
                        aborted = true;
                    }
                }
                if completed >= wanted || aborted {
                    break;
                }
            }
            handle.stop();
            if let Err(e) = handle.join() {
                return fail(e);
            }
            if aborted { ExitCode::from(3) } else { ExitCode::SUCCESS }
        }
    }
}

fn print_scan_report(report: &ScanReport) {
    println!(
        "{:<14} {:<8} {:<8} {:>14} {:>16}",
        "SYMBOL", "SIGNAL", "TREND", "CLOSE", "QUOTE VOLUME"
    );
    for hit in &report.hits {
        println!(
            "{:<14} {:<8} {:<8} {:>14.6} {:>16.2}",
            hit.symbol,
            hit.signal.to_string(),
            hit.trend.to_string(),
            hit.close,
            hit.quote_volume
        );
    }
    eprintln!(
        "{} scanned, {} hit(s), {} failed{}",
        report.scanned,
        report.hits.len(),
        report.failed.len(),
        if report.cancelled { " (cancelled)" } else { "" }
    );
    for failure in &report.failed {
        eprintln!("  {}: {}", failure.symbol, failure.reason);
    }
}

fn run_replay(config_path: &PathBuf, symbol: &str) -> ExitCode {
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };
    init_logging(&adapter);

    let config = match build_strategy_config(&adapter, &StrategyRegistry::with_builtins()) {
        Ok(c) => c,
        Err(e) => return fail(e),
    };
    let (market, interval) = match build_data_source(&adapter) {
        Ok(d) => d,
        Err(e) => return fail(e),
    };
    let live = match build_live_config(&adapter, interval) {
        Ok(l) => l,
        Err(e) => return fail(e),
    };
    let stream = match market.stream_closed_bars(symbol, interval) {
        Ok(s) => s,
        Err(e) => return fail(e),
    };

    let capital = adapter.get_double("backtest", "initial_capital", DEFAULT_INITIAL_CAPITAL);
    let broker = Arc::new(PaperBroker::new(capital));
    let mut session = LiveSession::new(symbol, config, &live, broker.clone());

    eprintln!("Replaying {symbol} ({interval}) with a paper balance of {capital:.2}");
    for item in stream {
        let bar = match item {
            Ok(b) => b,
            Err(e) => return fail(e),
        };
        broker.set_price(symbol, bar.close);
        let timestamp = bar.timestamp;
        match session.on_closed_bar(bar) {
            Ok(LiveOutcome::Traded { trade, receipt }) => println!(
                "{} {} {:.4} @ {:.6} ({})",
                timestamp, trade.kind, trade.size, trade.price, receipt.order_id
            ),
            Ok(LiveOutcome::Unfunded) => eprintln!("{timestamp} BUY skipped: balance too small"),
            Ok(_) => {}
            Err(e) => eprintln!("warning: {timestamp}: {e}"),
        }
    }

    let summary = session.into_summary();
    let balance = broker.quote_balance(symbol).unwrap_or(0.0);
    eprintln!(
        "\n{} bars, {} trades, quote balance {:.2}, holding {:.4}",
        summary.bars_processed,
        summary.trades.len(),
        balance,
        broker.holding(symbol)
    );
    ExitCode::SUCCESS
}

fn run_validate(config_path: &PathBuf) -> ExitCode {
    eprintln!("Loading config from {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    let checks: [fn(&dyn ConfigPort) -> Result<(), TraderError>; 4] = [
        validate_data_config,
        validate_live_config,
        validate_scan_config,
        validate_logging_config,
    ];
    let config = match build_strategy_config(&adapter, &StrategyRegistry::with_builtins()) {
        Ok(c) => c,
        Err(e) => return fail(e),
    };
    for check in checks {
        if let Err(e) = check(&adapter) {
            return fail(e);
        }
    }

    eprintln!("Config validated successfully");
    eprintln!("  strategy: {}", config.strategy.name());
    if let Some(kind) = config.strategy.indicator_kind() {
        eprintln!("  indicator: {kind}");
    }
    eprintln!("  warm-up bars: {}", config.strategy.warmup_bars());
    ExitCode::SUCCESS
}
