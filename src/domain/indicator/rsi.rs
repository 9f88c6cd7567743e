//! RSI (Relative Strength Index) with Wilder's smoothing.
//!
//! - First average: simple mean of gains/losses over the first n changes
//! - Subsequent: avg = (prev_avg * (n-1) + current) / n
//!
//! RSI = 100 * avg_gain / (avg_gain + avg_loss), equivalent to
//! 100 - 100 / (1 + avg_gain / avg_loss) without the division by zero.
//! A window with neither gains nor losses has no defined RSI.
//!
//! Warmup: the first n bars are undefined (n changes are needed to seed).

use crate::domain::indicator::IndicatorSeries;

pub fn rsi(closes: &[f64], length: usize) -> IndicatorSeries {
    assert!(length > 0, "rsi length must be at least 1");

    let mut out = vec![None; closes.len()];
    if closes.len() <= length {
        return IndicatorSeries::from(out);
    }

    let changes: Vec<f64> = closes.windows(2).map(|w| w[1] - w[0]).collect();
    let gain = |c: f64| c.max(0.0);
    let loss = |c: f64| (-c).max(0.0);

    let n = length as f64;
    let mut avg_gain = changes[..length].iter().copied().map(gain).sum::<f64>() / n;
    let mut avg_loss = changes[..length].iter().copied().map(loss).sum::<f64>() / n;
    out[length] = rsi_value(avg_gain, avg_loss);

    for i in (length + 1)..closes.len() {
        let change = changes[i - 1];
        avg_gain = (avg_gain * (n - 1.0) + gain(change)) / n;
        avg_loss = (avg_loss * (n - 1.0) + loss(change)) / n;
        out[i] = rsi_value(avg_gain, avg_loss);
    }

    IndicatorSeries::from(out)
}

fn rsi_value(avg_gain: f64, avg_loss: f64) -> Option<f64> {
    let total = avg_gain + avg_loss;
    if total == 0.0 {
        None
    } else {
        Some(100.0 * avg_gain / total)
    }
}
