//! Wave Trend oscillator (LazyBear formulation).
//!
//! ap  = hlc3
//! esa = EMA(ap, channel)
//! d   = EMA(|ap - esa|, channel)
//! ci  = (ap - esa) / (0.015 * d)
//! wt1 = EMA(ci, average)
//! wt2 = SMA(wt1, 4)
//!
//! `ci` is undefined wherever `d` is zero, so a constant price series produces
//! no wt1/wt2 values at all.

use crate::domain::indicator::{ema, sma, IndicatorSeries};
use serde::Serialize;

/// Length of the SMA that turns wt1 into wt2.
pub const WT2_LENGTH: usize = 4;

const CI_SCALE: f64 = 0.015;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WaveTrendOutput {
    pub wt1: IndicatorSeries,
    pub wt2: IndicatorSeries,
}

pub fn wave_trend(
    highs: &[f64],
    lows: &[f64],
    closes: &[f64],
    channel_length: usize,
    average_length: usize,
) -> WaveTrendOutput {
    assert!(
        highs.len() == closes.len() && lows.len() == closes.len(),
        "wave trend inputs must be the same length"
    );

    let ap: Vec<f64> = highs
        .iter()
        .zip(lows)
        .zip(closes)
        .map(|((h, l), c)| (h + l + c) / 3.0)
        .collect();
    wave_trend_typical(&ap, channel_length, average_length)
}

/// Wave Trend over precomputed typical prices (`ap`, one hlc3 per bar).
pub fn wave_trend_typical(
    ap: &[f64],
    channel_length: usize,
    average_length: usize,
) -> WaveTrendOutput {
    assert!(
        channel_length > 0 && average_length > 0,
        "wave trend lengths must be at least 1"
    );

    let ap = IndicatorSeries::from(ap);
    let esa = ema(&ap, channel_length);
    let deviation = ap.zip_with(&esa, |a, e| (a - e).abs());
    let d = ema(&deviation, channel_length);

    let ci: Vec<Option<f64>> = (0..ap.len())
        .map(|i| {
            let (a, e, d) = (ap.get(i)?, esa.get(i)?, d.get(i)?);
            // deviation at rounding-noise level counts as flat
            if d <= f64::EPSILON * e.abs() {
                None
            } else {
                Some((a - e) / (CI_SCALE * d))
            }
        })
        .collect();

    let wt1 = ema(&IndicatorSeries::from(ci), average_length);
    let wt2 = sma(&wt1, WT2_LENGTH);
    WaveTrendOutput { wt1, wt2 }
}
