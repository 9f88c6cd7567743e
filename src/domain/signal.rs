//! Decision evaluation.
//!
//! # Evaluation Semantics
//!
//! - Crossover rules need the previous and current values of both lines and
//!   return NEUTRAL at index 0 or when either is undefined
//! - Equality belongs to the "before" state: a cross above needs
//!   `prev_left <= prev_right` and `curr_left > curr_right`. Values within
//!   [`TIE_TOLERANCE`] of each other count as equal
//! - Custom strategies are not invoked until their trailing window is full;
//!   an invalid label, an `Err` or a panic inside the decision is NEUTRAL

use crate::domain::indicator::{IndicatorSeries, Indicators};
use crate::domain::ohlcv::Bar;
use crate::domain::strategy::{CustomStrategy, RsiParams, Strategy, WaveTrendMode};
use serde::Serialize;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::str::FromStr;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Signal {
    Buy,
    Sell,
    Neutral,
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::Buy => write!(f, "BUY"),
            Signal::Sell => write!(f, "SELL"),
            Signal::Neutral => write!(f, "NEUTRAL"),
        }
    }
}

impl FromStr for Signal {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "BUY" => Ok(Signal::Buy),
            "SELL" => Ok(Signal::Sell),
            "NEUTRAL" => Ok(Signal::Neutral),
            other => Err(format!("invalid signal label: {other}")),
        }
    }
}

/// View of a bar sequence at one evaluation point.
#[derive(Debug, Clone, Copy)]
pub struct SignalWindow<'a> {
    pub bars: &'a [Bar],
    pub index: usize,
    /// Indicators computed over `bars`; `None` for custom strategies.
    pub indicators: Option<&'a Indicators>,
}

impl<'a> SignalWindow<'a> {
    pub fn new(bars: &'a [Bar], index: usize, indicators: Option<&'a Indicators>) -> Self {
        SignalWindow {
            bars,
            index,
            indicators,
        }
    }

    /// Window positioned at the most recent bar.
    pub fn at_last(bars: &'a [Bar], indicators: Option<&'a Indicators>) -> Self {
        Self::new(bars, bars.len().saturating_sub(1), indicators)
    }

    /// Bars up to and including the current one.
    pub fn history(&self) -> &'a [Bar] {
        let end = (self.index + 1).min(self.bars.len());
        &self.bars[..end]
    }
}

/// Relative width inside which two line values count as equal.
///
/// EMAs seeded from an SMA track a linear ramp with a constant lag, so lines
/// such as MACD and its signal are equal in exact arithmetic and differ only
/// by rounding. Those ties belong to the "before" state.
pub const TIE_TOLERANCE: f64 = 1e-9;

/// `a == b` within [`TIE_TOLERANCE`] of the larger of `|a|`, `|b|` and `scale`.
pub fn ties(a: f64, b: f64, scale: f64) -> bool {
    (a - b).abs() <= TIE_TOLERANCE * a.abs().max(b.abs()).max(scale.abs())
}

/// `(prev, curr)` of `left` crosses above `(prev, curr)` of `right`.
pub fn crossed_above(left: (f64, f64), right: (f64, f64)) -> bool {
    crosses_above(left, right, 0.0)
}

/// `(prev, curr)` of `left` crosses below `(prev, curr)` of `right`.
pub fn crossed_below(left: (f64, f64), right: (f64, f64)) -> bool {
    crosses_below(left, right, 0.0)
}

fn crosses_above(left: (f64, f64), right: (f64, f64), scale: f64) -> bool {
    let before = left.0 <= right.0 || ties(left.0, right.0, scale);
    before && left.1 > right.1 && !ties(left.1, right.1, scale)
}

fn crosses_below(left: (f64, f64), right: (f64, f64), scale: f64) -> bool {
    let before = left.0 >= right.0 || ties(left.0, right.0, scale);
    before && left.1 < right.1 && !ties(left.1, right.1, scale)
}

pub fn evaluate_signal(strategy: &Strategy, window: &SignalWindow<'_>) -> Signal {
    match (strategy, window.indicators) {
        (Strategy::Custom(custom), _) => evaluate_custom(custom, window),
        (Strategy::WaveTrend(p), Some(Indicators::WaveTrend(wt))) => {
            evaluate_wave_trend(p.mode, &wt.wt1, &wt.wt2, window.index)
        }
        (Strategy::Rsi(p), Some(Indicators::Single(rsi))) => evaluate_rsi(p, rsi, window.index),
        (Strategy::Macd(_), Some(Indicators::Macd(m))) => {
            // the lines are price differences, so rounding scales with price
            let scale = window.bars.get(window.index).map_or(0.0, |b| b.close);
            evaluate_crossover(&m.macd, &m.signal, window.index, scale)
        }
        _ => Signal::Neutral,
    }
}

fn evaluate_crossover(
    left: &IndicatorSeries,
    right: &IndicatorSeries,
    index: usize,
    scale: f64,
) -> Signal {
    let (Some(l), Some(r)) = (left.pair(index), right.pair(index)) else {
        return Signal::Neutral;
    };
    if crosses_above(l, r, scale) {
        Signal::Buy
    } else if crosses_below(l, r, scale) {
        Signal::Sell
    } else {
        Signal::Neutral
    }
}

fn evaluate_wave_trend(
    mode: WaveTrendMode,
    wt1: &IndicatorSeries,
    wt2: &IndicatorSeries,
    index: usize,
) -> Signal {
    let (Some(w1), Some(w2)) = (wt1.pair(index), wt2.pair(index)) else {
        return Signal::Neutral;
    };

    match mode {
        WaveTrendMode::Crossover => evaluate_crossover(wt1, wt2, index, 0.0),
        WaveTrendMode::Gated { band } => match evaluate_crossover(wt1, wt2, index, 0.0) {
            Signal::Buy if w2.1 < -band => Signal::Buy,
            Signal::Sell if w2.1 > band => Signal::Sell,
            _ => Signal::Neutral,
        },
        WaveTrendMode::BandExit { band } => {
            let was_oversold = w1.0 <= -band || w2.0 <= -band;
            let now_above = w1.1 > -band && w2.1 > -band;
            let was_overbought = w1.0 >= band || w2.0 >= band;
            let now_below = w1.1 < band && w2.1 < band;
            if was_oversold && now_above {
                Signal::Buy
            } else if was_overbought && now_below {
                Signal::Sell
            } else {
                Signal::Neutral
            }
        }
    }
}

fn evaluate_rsi(params: &RsiParams, rsi: &IndicatorSeries, index: usize) -> Signal {
    let Some(r) = rsi.pair(index) else {
        return Signal::Neutral;
    };
    let oversold = (params.oversold, params.oversold);
    let overbought = (params.overbought, params.overbought);
    if crossed_above(r, oversold) {
        Signal::Buy
    } else if crossed_below(r, overbought) {
        Signal::Sell
    } else {
        Signal::Neutral
    }
}

fn evaluate_custom(custom: &CustomStrategy, window: &SignalWindow<'_>) -> Signal {
    let history = window.history();
    if custom.window == 0 || history.len() < custom.window {
        return Signal::Neutral;
    }
    let trailing = &history[history.len() - custom.window..];

    let outcome = catch_unwind(AssertUnwindSafe(|| custom.decision.decide(trailing)));
    match outcome {
        Ok(Ok(label)) => label.parse().unwrap_or_else(|_| {
            warn!(strategy = %custom.name, %label, "invalid signal label, treating as NEUTRAL");
            Signal::Neutral
        }),
        Ok(Err(reason)) => {
            warn!(strategy = %custom.name, %reason, "custom strategy failed, treating as NEUTRAL");
            Signal::Neutral
        }
        Err(_) => {
            warn!(strategy = %custom.name, "custom strategy panicked, treating as NEUTRAL");
            Signal::Neutral
        }
    }
}
