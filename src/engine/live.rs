//! Live decision loop.
//!
//! [`LiveSession`] is the synchronous core: it owns a bounded bar window and a
//! ledger, and turns each newly closed bar into at most one order.
//! [`track_symbol`] runs a session on its own thread against a
//! [`MarketDataPort`] feed and publishes [`LiveEvent`]s over a channel.
//!
//! An order is placed before the ledger transitions; a rejected order leaves
//! the position untouched so the same signal can fire again on a later bar.

use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::domain::bar_series::BarSeries;
use crate::domain::error::TraderError;
use crate::domain::ledger::Ledger;
use crate::domain::ohlcv::{Bar, Interval};
use crate::domain::position::{Position, TradeRecord};
use crate::domain::signal::{evaluate_signal, Signal, SignalWindow};
use crate::domain::strategy::{Strategy, StrategyConfig};
use crate::engine::cancel::CancelToken;
use crate::ports::market_data_port::MarketDataPort;
use crate::ports::order_port::{OrderPort, OrderReceipt, OrderSide};

pub const DEFAULT_WINDOW: usize = 50;
pub const DEFAULT_ALLOCATION: f64 = 0.95;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FeedMode {
    /// Re-fetch the latest bars every polling period.
    #[default]
    Poll,
    /// Consume a closed-bar stream, reconnecting when it ends.
    Stream,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LiveConfig {
    pub interval: Interval,
    pub window: usize,
    /// Fraction of the quote balance committed on a BUY.
    pub allocation: f64,
    /// Overrides the period derived from `interval`.
    pub poll_interval: Option<Duration>,
    pub feed: FeedMode,
}

impl Default for LiveConfig {
    fn default() -> Self {
        LiveConfig {
            interval: Interval::OneHour,
            window: DEFAULT_WINDOW,
            allocation: DEFAULT_ALLOCATION,
            poll_interval: None,
            feed: FeedMode::Poll,
        }
    }
}

impl LiveConfig {
    pub fn poll_period(&self) -> Duration {
        self.poll_interval
            .unwrap_or_else(|| self.interval.poll_period())
    }

    /// Window size `strategy` can evaluate in: the configured window, raised to
    /// the strategy's warm-up plus the bar being decided.
    pub fn window_for(&self, strategy: &Strategy) -> usize {
        self.window.max(strategy.warmup_bars() + 1)
    }
}

/// What a single closed bar did to the session.
#[derive(Debug, Clone, PartialEq)]
pub enum LiveOutcome {
    /// Not newer than the last bar in the window.
    Stale,
    /// Evaluated without a state transition.
    Hold(Signal),
    /// A BUY fired but the balance buys zero units.
    Unfunded,
    Traded {
        trade: TradeRecord,
        receipt: OrderReceipt,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum LiveEvent {
    Started {
        symbol: String,
        warmup_bars: usize,
    },
    Decision {
        symbol: String,
        timestamp: DateTime<Utc>,
        signal: Signal,
    },
    Trade {
        symbol: String,
        trade: TradeRecord,
        receipt: OrderReceipt,
    },
    Error {
        symbol: String,
        message: String,
    },
    Stopped {
        symbol: String,
    },
}

/// Final state of a live session.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveSummary {
    pub symbol: String,
    pub trades: Vec<TradeRecord>,
    pub position: Option<Position>,
    pub bars_processed: usize,
}

pub struct LiveSession {
    symbol: String,
    config: StrategyConfig,
    allocation: f64,
    window: BarSeries,
    ledger: Ledger,
    orders: Arc<dyn OrderPort>,
    bars_processed: usize,
}

impl LiveSession {
    pub fn new(
        symbol: impl Into<String>,
        config: StrategyConfig,
        live: &LiveConfig,
        orders: Arc<dyn OrderPort>,
    ) -> Self {
        let symbol = symbol.into();
        let window = live.window_for(&config.strategy);
        if window > live.window {
            warn!(
                symbol = %symbol,
                strategy = config.strategy.name(),
                configured = live.window,
                window,
                "live window raised to cover the strategy warm-up"
            );
        }
        LiveSession {
            symbol,
            config,
            allocation: live.allocation,
            window: BarSeries::bounded(window),
            ledger: Ledger::new(),
            orders,
            bars_processed: 0,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn window(&self) -> &BarSeries {
        &self.window
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Fill the window with history without trading. Returns the bars accepted.
    pub fn warm_up(&mut self, bars: impl IntoIterator<Item = Bar>) -> usize {
        let mut accepted = 0;
        for bar in bars {
            if self.is_stale(&bar) {
                continue;
            }
            if self.window.push(bar).is_ok() {
                accepted += 1;
            }
        }
        accepted
    }

    fn is_stale(&self, bar: &Bar) -> bool {
        self.window
            .last()
            .is_some_and(|last| bar.timestamp <= last.timestamp)
    }

    pub fn on_closed_bar(&mut self, bar: Bar) -> Result<LiveOutcome, TraderError> {
        if self.is_stale(&bar) {
            return Ok(LiveOutcome::Stale);
        }
        let timestamp = bar.timestamp;
        let price = bar.close;
        self.window.push(bar)?;
        self.bars_processed += 1;

        let signal = {
            let bars = self.window.make_contiguous();
            let indicators = self.config.strategy.compute(bars);
            evaluate_signal(
                &self.config.strategy,
                &SignalWindow::at_last(bars, indicators.as_ref()),
            )
        };
        debug!(symbol = %self.symbol, %timestamp, price, %signal, "evaluated closed bar");

        if !self.ledger.would_fire(signal) {
            return Ok(LiveOutcome::Hold(signal));
        }

        let (receipt, trade) = match signal {
            Signal::Buy => {
                let balance = self.orders.quote_balance(&self.symbol)?;
                let quantity = if price > 0.0 {
                    (balance * self.allocation / price).floor()
                } else {
                    0.0
                };
                if quantity <= 0.0 {
                    warn!(symbol = %self.symbol, balance, price, "BUY skipped, balance too small");
                    return Ok(LiveOutcome::Unfunded);
                }
                let receipt = self.submit(OrderSide::Buy, quantity)?;
                let fill = receipt.fill_price.unwrap_or(price);
                let trade = self.ledger.open_long(timestamp, fill, quantity).cloned();
                (receipt, trade)
            }
            Signal::Sell => {
                let Some(quantity) = self.ledger.position().map(|p| p.size) else {
                    return Ok(LiveOutcome::Hold(signal));
                };
                let receipt = self.submit(OrderSide::Sell, quantity)?;
                let fill = receipt.fill_price.unwrap_or(price);
                let trade = self
                    .ledger
                    .close_long(timestamp, fill, |pos| pos.unrealized_pnl(fill))
                    .cloned();
                (receipt, trade)
            }
            Signal::Neutral => return Ok(LiveOutcome::Hold(signal)),
        };

        let Some(trade) = trade else {
            return Ok(LiveOutcome::Hold(signal));
        };
        info!(
            symbol = %self.symbol,
            kind = %trade.kind,
            price = trade.price,
            size = trade.size,
            order_id = %receipt.order_id,
            "live trade"
        );
        Ok(LiveOutcome::Traded { trade, receipt })
    }

    fn submit(&self, side: OrderSide, quantity: f64) -> Result<OrderReceipt, TraderError> {
        self.orders
            .place_order(&self.symbol, side, quantity)
            .map_err(|e| match e {
                TraderError::Order { .. } => e,
                other => TraderError::Order {
                    symbol: self.symbol.clone(),
                    reason: other.to_string(),
                },
            })
    }

    pub fn into_summary(self) -> LiveSummary {
        let (trades, position) = self.ledger.into_parts();
        LiveSummary {
            symbol: self.symbol,
            trades,
            position,
            bars_processed: self.bars_processed,
        }
    }
}

/// Handle to a running [`track_symbol`] worker.
pub struct LiveHandle {
    symbol: String,
    cancel: CancelToken,
    events: Receiver<LiveEvent>,
    worker: JoinHandle<LiveSummary>,
}

impl LiveHandle {
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn events(&self) -> &Receiver<LiveEvent> {
        &self.events
    }

    /// Request a cooperative stop. The worker exits at its next iteration.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.worker.is_finished()
    }

    pub fn join(self) -> Result<LiveSummary, TraderError> {
        self.worker.join().map_err(|_| {
            TraderError::Io(std::io::Error::other(format!(
                "live worker for {} panicked",
                self.symbol
            )))
        })
    }
}

/// Track `symbol` on a dedicated thread until [`LiveHandle::stop`] is called.
pub fn track_symbol(
    symbol: &str,
    config: StrategyConfig,
    live: LiveConfig,
    market: Arc<dyn MarketDataPort>,
    orders: Arc<dyn OrderPort>,
) -> Result<LiveHandle, TraderError> {
    config.strategy.validate()?;

    let (tx, rx) = mpsc::channel();
    let cancel = CancelToken::new();
    let session = LiveSession::new(symbol, config, &live, orders);
    let worker_cancel = cancel.clone();

    let worker = thread::Builder::new()
        .name(format!("wavetrader-live-{symbol}"))
        .spawn(move || run_live(session, market, live, worker_cancel, tx))?;

    Ok(LiveHandle {
        symbol: symbol.to_string(),
        cancel,
        events: rx,
        worker,
    })
}

fn run_live(
    mut session: LiveSession,
    market: Arc<dyn MarketDataPort>,
    live: LiveConfig,
    cancel: CancelToken,
    tx: Sender<LiveEvent>,
) -> LiveSummary {
    let symbol = session.symbol().to_string();
    let window = session.window().capacity().unwrap_or(live.window);
    let publish = |event: LiveEvent| {
        // a dropped receiver only means nobody is listening
        let _ = tx.send(event);
    };

    let warmup_bars = match market.get_bars(&symbol, live.interval, None, None, Some(window)) {
        Ok(bars) => session.warm_up(bars),
        Err(e) => {
            warn!(symbol = %symbol, error = %e, "history prefill failed");
            publish(LiveEvent::Error {
                symbol: symbol.clone(),
                message: e.to_string(),
            });
            0
        }
    };
    info!(symbol = %symbol, warmup_bars, feed = ?live.feed, "live session started");
    publish(LiveEvent::Started {
        symbol: symbol.clone(),
        warmup_bars,
    });

    let period = live.poll_period();
    match live.feed {
        FeedMode::Poll => {
            while !cancel.wait_timeout(period) {
                match market.get_bars(&symbol, live.interval, None, None, Some(window)) {
                    Ok(bars) => {
                        for bar in bars {
                            if cancel.is_cancelled() {
                                break;
                            }
                            handle_bar(&mut session, bar, &publish);
                        }
                    }
                    Err(e) => report(&symbol, &e, &publish),
                }
            }
        }
        FeedMode::Stream => {
            'feed: while !cancel.is_cancelled() {
                match market.stream_closed_bars(&symbol, live.interval) {
                    Ok(stream) => {
                        for item in stream {
                            if cancel.is_cancelled() {
                                break 'feed;
                            }
                            match item {
                                Ok(bar) => handle_bar(&mut session, bar, &publish),
                                Err(e) => {
                                    report(&symbol, &e, &publish);
                                    break;
                                }
                            }
                        }
                        debug!(symbol = %symbol, "bar stream ended, reconnecting");
                    }
                    Err(e) => report(&symbol, &e, &publish),
                }
                if cancel.wait_timeout(period) {
                    break;
                }
            }
        }
    }

    info!(symbol = %symbol, bars = session.bars_processed, "live session stopped");
    publish(LiveEvent::Stopped {
        symbol: symbol.clone(),
    });
    session.into_summary()
}

fn handle_bar(session: &mut LiveSession, bar: Bar, publish: &impl Fn(LiveEvent)) {
    let timestamp = bar.timestamp;
    let symbol = session.symbol().to_string();
    match session.on_closed_bar(bar) {
        Ok(LiveOutcome::Stale) => {}
        Ok(LiveOutcome::Hold(signal)) => publish(LiveEvent::Decision {
            symbol,
            timestamp,
            signal,
        }),
        Ok(LiveOutcome::Unfunded) => publish(LiveEvent::Decision {
            symbol,
            timestamp,
            signal: Signal::Buy,
        }),
        Ok(LiveOutcome::Traded { trade, receipt }) => {
            publish(LiveEvent::Trade {
                symbol,
                trade,
                receipt,
            })
        }
        Err(e) => report(&symbol, &e, publish),
    }
}

fn report(symbol: &str, error: &TraderError, publish: &impl Fn(LiveEvent)) {
    warn!(symbol, error = %error, "live iteration failed");
    publish(LiveEvent::Error {
        symbol: symbol.to_string(),
        message: error.to_string(),
    });
}
