//! Technical indicator implementations.
//!
//! Every indicator returns an [`IndicatorSeries`] aligned index-for-index with
//! its input. Warm-up positions and positions derived from undefined inputs hold
//! `None`; they are never coerced to zero.
//!
//! A length of zero is a contract violation and panics. Configuration paths call
//! [`IndicatorKind::validate`] first so user input never reaches that panic.

pub mod ema;
pub mod sma;
pub mod rsi;
pub mod macd;
pub mod wave_trend;

pub use ema::ema;
pub use macd::{macd, MacdOutput};
pub use rsi::rsi;
pub use sma::sma;
pub use wave_trend::{wave_trend, wave_trend_typical, WaveTrendOutput};

use crate::domain::error::TraderError;
use crate::domain::ohlcv::Bar;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct IndicatorSeries {
    values: Vec<Option<f64>>,
}

impl IndicatorSeries {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value at `index`; `None` when undefined or out of range.
    pub fn get(&self, index: usize) -> Option<f64> {
        self.values.get(index).copied().flatten()
    }

    pub fn last(&self) -> Option<f64> {
        self.values.last().copied().flatten()
    }

    /// Values at `index - 1` and `index`, both defined.
    pub fn pair(&self, index: usize) -> Option<(f64, f64)> {
        let prev = self.get(index.checked_sub(1)?)?;
        let curr = self.get(index)?;
        Some((prev, curr))
    }

    pub fn first_defined(&self) -> Option<usize> {
        self.values.iter().position(Option::is_some)
    }

    pub fn values(&self) -> &[Option<f64>] {
        &self.values
    }

    /// Element-wise combination; undefined on either side stays undefined.
    pub fn zip_with(&self, other: &IndicatorSeries, f: impl Fn(f64, f64) -> f64) -> Self {
        let values = self
            .values
            .iter()
            .zip(&other.values)
            .map(|(a, b)| Some(f((*a)?, (*b)?)))
            .collect();
        IndicatorSeries { values }
    }
}

impl From<Vec<Option<f64>>> for IndicatorSeries {
    fn from(values: Vec<Option<f64>>) -> Self {
        IndicatorSeries { values }
    }
}

impl From<&[f64]> for IndicatorSeries {
    fn from(values: &[f64]) -> Self {
        IndicatorSeries {
            values: values.iter().copied().map(Some).collect(),
        }
    }
}

/// Indicator identity plus parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum IndicatorKind {
    Ema(usize),
    Sma(usize),
    Rsi(usize),
    Macd {
        fast: usize,
        slow: usize,
        signal: usize,
    },
    WaveTrend {
        channel_length: usize,
        average_length: usize,
    },
}

impl IndicatorKind {
    pub fn validate(&self) -> Result<(), TraderError> {
        let lengths: &[(&str, usize)] = match self {
            IndicatorKind::Ema(n) => &[("ema_length", *n)],
            IndicatorKind::Sma(n) => &[("sma_length", *n)],
            IndicatorKind::Rsi(n) => &[("rsi_length", *n)],
            IndicatorKind::Macd { fast, slow, signal } => &[
                ("macd_fast", *fast),
                ("macd_slow", *slow),
                ("macd_signal", *signal),
            ],
            IndicatorKind::WaveTrend {
                channel_length,
                average_length,
            } => &[
                ("wt_channel_length", *channel_length),
                ("wt_average_length", *average_length),
            ],
        };
        for (name, length) in lengths {
            if *length == 0 {
                return Err(TraderError::InvalidLength {
                    name: name.to_string(),
                    length: *length,
                });
            }
        }
        Ok(())
    }

    /// Index of the first bar at which the primary output can be defined.
    pub fn warmup(&self) -> usize {
        match *self {
            IndicatorKind::Ema(n) | IndicatorKind::Sma(n) => n.saturating_sub(1),
            IndicatorKind::Rsi(n) => n,
            IndicatorKind::Macd { fast, slow, signal } => {
                fast.max(slow).saturating_sub(1) + signal.saturating_sub(1)
            }
            IndicatorKind::WaveTrend {
                channel_length,
                average_length,
            } => {
                2 * channel_length.saturating_sub(1)
                    + average_length.saturating_sub(1)
                    + wave_trend::WT2_LENGTH
                    - 1
            }
        }
    }

    /// # Panics
    /// Panics on a zero length; see [`compute_indicators`] for the checked form.
    pub fn compute(&self, bars: &[Bar]) -> Indicators {
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        let series = || IndicatorSeries::from(&closes[..]);
        match *self {
            IndicatorKind::Ema(n) => Indicators::Single(ema(&series(), n)),
            IndicatorKind::Sma(n) => Indicators::Single(sma(&series(), n)),
            IndicatorKind::Rsi(n) => Indicators::Single(rsi(&closes, n)),
            IndicatorKind::Macd { fast, slow, signal } => {
                Indicators::Macd(macd(&closes, fast, slow, signal))
            }
            IndicatorKind::WaveTrend {
                channel_length,
                average_length,
            } => {
                let typical: Vec<f64> = bars.iter().map(Bar::hlc3).collect();
                Indicators::WaveTrend(wave_trend_typical(&typical, channel_length, average_length))
            }
        }
    }
}

impl fmt::Display for IndicatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndicatorKind::Ema(n) => write!(f, "EMA({n})"),
            IndicatorKind::Sma(n) => write!(f, "SMA({n})"),
            IndicatorKind::Rsi(n) => write!(f, "RSI({n})"),
            IndicatorKind::Macd { fast, slow, signal } => {
                write!(f, "MACD({fast},{slow},{signal})")
            }
            IndicatorKind::WaveTrend {
                channel_length,
                average_length,
            } => write!(f, "WT({channel_length},{average_length})"),
        }
    }
}

/// Output of [`compute_indicators`], shaped by the requested kind.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Indicators {
    Single(IndicatorSeries),
    Macd(MacdOutput),
    WaveTrend(WaveTrendOutput),
}

impl Indicators {
    pub fn len(&self) -> usize {
        match self {
            Indicators::Single(s) => s.len(),
            Indicators::Macd(m) => m.macd.len(),
            Indicators::WaveTrend(w) => w.wt1.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Compute one indicator over a bar window, validating its lengths first.
pub fn compute_indicators(bars: &[Bar], kind: IndicatorKind) -> Result<Indicators, TraderError> {
    kind.validate()?;
    Ok(kind.compute(bars))
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::domain::ohlcv::Bar;
    use chrono::DateTime;

    pub fn bars_from_closes(closes: &[f64]) -> Vec<Bar> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| Bar {
                timestamp: DateTime::from_timestamp(1_700_000_000 + i as i64 * 60, 0).unwrap(),
                open: close,
                high: close + 1.0,
                low: close - 1.0,
                close,
                volume: 10.0,
            })
            .collect()
    }

    pub fn sine(n: usize, period: f64, amplitude: f64) -> Vec<f64> {
        (0..n)
            .map(|i| 100.0 + amplitude * (2.0 * std::f64::consts::PI * i as f64 / period).sin())
            .collect()
    }
}
