//! Strategy selection and parameters.
//!
//! A [`Strategy`] names the indicator family that drives decisions plus its
//! parameters. User-defined strategies plug in through [`CustomDecision`] and
//! are looked up by name in a [`StrategyRegistry`].

use crate::domain::error::TraderError;
use crate::domain::indicator::{macd, rsi, sma, IndicatorKind, IndicatorSeries, Indicators};
use crate::domain::ohlcv::Bar;
use crate::domain::portfolio::AccountingConfig;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

pub const DEFAULT_WT_CHANNEL: usize = 10;
pub const DEFAULT_WT_AVERAGE: usize = 21;
pub const DEFAULT_WT_BAND: f64 = 60.0;
pub const DEFAULT_RSI_LENGTH: usize = 14;
pub const DEFAULT_RSI_OVERSOLD: f64 = 30.0;
pub const DEFAULT_RSI_OVERBOUGHT: f64 = 70.0;
pub const DEFAULT_CUSTOM_WINDOW: usize = 50;

/// How Wave Trend crossovers become decisions.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum WaveTrendMode {
    /// Any wt1/wt2 crossover.
    #[default]
    Crossover,
    /// Crossover that happens beyond the band. The band is checked against
    /// wt2 on the crossing bar only: BUY needs wt2 < -band, SELL needs
    /// wt2 > +band. The previous bar's values and wt1 are not gated.
    Gated { band: f64 },
    /// BUY when either line leaves the oversold band upward; SELL when either
    /// line leaves the overbought band downward.
    BandExit { band: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WaveTrendParams {
    pub channel_length: usize,
    pub average_length: usize,
    pub mode: WaveTrendMode,
}

impl Default for WaveTrendParams {
    fn default() -> Self {
        WaveTrendParams {
            channel_length: DEFAULT_WT_CHANNEL,
            average_length: DEFAULT_WT_AVERAGE,
            mode: WaveTrendMode::Crossover,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RsiParams {
    pub length: usize,
    pub oversold: f64,
    pub overbought: f64,
}

impl Default for RsiParams {
    fn default() -> Self {
        RsiParams {
            length: DEFAULT_RSI_LENGTH,
            oversold: DEFAULT_RSI_OVERSOLD,
            overbought: DEFAULT_RSI_OVERBOUGHT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MacdParams {
    pub fast: usize,
    pub slow: usize,
    pub signal: usize,
}

impl Default for MacdParams {
    fn default() -> Self {
        MacdParams {
            fast: macd::DEFAULT_FAST,
            slow: macd::DEFAULT_SLOW,
            signal: macd::DEFAULT_SIGNAL,
        }
    }
}

/// User-supplied decision function over a trailing bar window.
///
/// The returned label is matched case-insensitively against
/// `BUY`/`SELL`/`NEUTRAL`; anything else counts as NEUTRAL.
pub trait CustomDecision: Send + Sync {
    fn decide(&self, bars: &[Bar]) -> Result<String, String>;
}

impl<F> CustomDecision for F
where
    F: Fn(&[Bar]) -> Result<String, String> + Send + Sync,
{
    fn decide(&self, bars: &[Bar]) -> Result<String, String> {
        self(bars)
    }
}

#[derive(Clone)]
pub struct CustomStrategy {
    pub name: String,
    pub window: usize,
    pub decision: Arc<dyn CustomDecision>,
}

impl fmt::Debug for CustomStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomStrategy")
            .field("name", &self.name)
            .field("window", &self.window)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub enum Strategy {
    WaveTrend(WaveTrendParams),
    Rsi(RsiParams),
    Macd(MacdParams),
    Custom(CustomStrategy),
}

impl Default for Strategy {
    fn default() -> Self {
        Strategy::WaveTrend(WaveTrendParams::default())
    }
}

impl Strategy {
    pub fn name(&self) -> &str {
        match self {
            Strategy::WaveTrend(_) => "wave_trend",
            Strategy::Rsi(_) => "rsi",
            Strategy::Macd(_) => "macd",
            Strategy::Custom(c) => &c.name,
        }
    }

    /// Indicator the strategy evaluates, `None` for custom strategies.
    pub fn indicator_kind(&self) -> Option<IndicatorKind> {
        match self {
            Strategy::WaveTrend(p) => Some(IndicatorKind::WaveTrend {
                channel_length: p.channel_length,
                average_length: p.average_length,
            }),
            Strategy::Rsi(p) => Some(IndicatorKind::Rsi(p.length)),
            Strategy::Macd(p) => Some(IndicatorKind::Macd {
                fast: p.fast,
                slow: p.slow,
                signal: p.signal,
            }),
            Strategy::Custom(_) => None,
        }
    }

    pub fn validate(&self) -> Result<(), TraderError> {
        match self {
            Strategy::Custom(c) if c.window == 0 => Err(TraderError::InvalidLength {
                name: "window".into(),
                length: 0,
            }),
            Strategy::Custom(_) => Ok(()),
            other => other
                .indicator_kind()
                .map_or(Ok(()), |kind| kind.validate()),
        }
    }

    /// Index of the first bar at which a signal can fire.
    ///
    /// Crossover rules compare two consecutive defined values, so this is one
    /// past the indicator warm-up. Custom strategies need a full window.
    pub fn warmup_bars(&self) -> usize {
        match self {
            Strategy::Custom(c) => c.window.saturating_sub(1),
            other => other.indicator_kind().map_or(0, |k| k.warmup() + 1),
        }
    }

    /// Compute this strategy's indicators over `bars`.
    ///
    /// # Panics
    /// Panics on a zero length; call [`Strategy::validate`] on untrusted input.
    pub fn compute(&self, bars: &[Bar]) -> Option<Indicators> {
        self.indicator_kind().map(|kind| kind.compute(bars))
    }
}

/// Everything a run needs to turn bars into trades.
#[derive(Debug, Clone, Default)]
pub struct StrategyConfig {
    pub strategy: Strategy,
    pub accounting: AccountingConfig,
}

/// Named custom strategies available to configuration.
#[derive(Clone, Default)]
pub struct StrategyRegistry {
    entries: BTreeMap<String, Arc<dyn CustomDecision>>,
}

impl fmt::Debug for StrategyRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.entries.keys()).finish()
    }
}

impl StrategyRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry with the built-in `rsi_sma` strategy.
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register("rsi_sma", rsi_sma);
        registry
    }

    pub fn register(&mut self, name: &str, decision: impl CustomDecision + 'static) {
        self.entries
            .insert(name.trim().to_lowercase(), Arc::new(decision));
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn resolve(&self, name: &str, window: usize) -> Result<Strategy, TraderError> {
        let key = name.trim().to_lowercase();
        let decision = self
            .entries
            .get(&key)
            .cloned()
            .ok_or_else(|| TraderError::UnknownStrategy(name.to_string()))?;
        Ok(Strategy::Custom(CustomStrategy {
            name: key,
            window,
            decision,
        }))
    }
}

/// BUY when RSI(14) < 30 and close > SMA(20); SELL when RSI(14) > 70 and
/// close < SMA(20).
pub fn rsi_sma(bars: &[Bar]) -> Result<String, String> {
    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let last = closes.len().checked_sub(1).ok_or("empty window")?;

    let rsi_values = rsi(&closes, DEFAULT_RSI_LENGTH);
    let sma_values = sma(&IndicatorSeries::from(&closes[..]), 20);
    let (Some(r), Some(avg)) = (rsi_values.get(last), sma_values.get(last)) else {
        return Ok("NEUTRAL".into());
    };

    let close = closes[last];
    let label = if r < DEFAULT_RSI_OVERSOLD && close > avg {
        "BUY"
    } else if r > DEFAULT_RSI_OVERBOUGHT && close < avg {
        "SELL"
    } else {
        "NEUTRAL"
    };
    Ok(label.into())
}
