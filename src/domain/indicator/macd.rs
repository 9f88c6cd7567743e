//! MACD (Moving Average Convergence Divergence).
//!
//! MACD Line = EMA(fast) - EMA(slow)
//! Signal Line = EMA(signal) of the MACD line, seeded once the MACD line exists
//! Histogram = MACD Line - Signal Line
//!
//! Default parameters: fast=12, slow=26, signal=9
//! Warmup: max(fast, slow) - 1 + signal - 1 bars.

use crate::domain::indicator::{ema, IndicatorSeries};
use serde::Serialize;

pub const DEFAULT_FAST: usize = 12;
pub const DEFAULT_SLOW: usize = 26;
pub const DEFAULT_SIGNAL: usize = 9;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MacdOutput {
    pub macd: IndicatorSeries,
    pub signal: IndicatorSeries,
    pub histogram: IndicatorSeries,
}

pub fn macd(closes: &[f64], fast: usize, slow: usize, signal: usize) -> MacdOutput {
    assert!(
        fast > 0 && slow > 0 && signal > 0,
        "macd lengths must be at least 1"
    );

    let input = IndicatorSeries::from(closes);
    let ema_fast = ema(&input, fast);
    let ema_slow = ema(&input, slow);
    let macd_line = ema_fast.zip_with(&ema_slow, |f, s| f - s);
    let signal_line = ema(&macd_line, signal);
    let histogram = macd_line.zip_with(&signal_line, |m, s| m - s);

    MacdOutput {
        macd: macd_line,
        signal: signal_line,
        histogram,
    }
}

pub fn macd_default(closes: &[f64]) -> MacdOutput {
    macd(closes, DEFAULT_FAST, DEFAULT_SLOW, DEFAULT_SIGNAL)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn macd_warmup_default() {
        let closes: Vec<f64> = (0..40).map(|i| 100.0 + i as f64).collect();
        let out = macd_default(&closes);

        assert_eq!(out.macd.first_defined(), Some(25));
        // slow - 1 + signal - 1 = 25 + 8 = 33
        assert_eq!(out.signal.first_defined(), Some(33));
        assert_eq!(out.histogram.first_defined(), Some(33));
        assert_eq!(out.macd.len(), 40);
    }

    #[test]
    fn macd_fast_slower_than_slow_uses_longer_warmup() {
        let closes: Vec<f64> = (0..30).map(|i| 50.0 + (i % 4) as f64).collect();
        let out = macd(&closes, 10, 5, 3);
        assert_eq!(out.macd.first_defined(), Some(9));
        assert_eq!(out.signal.first_defined(), Some(11));
    }

    #[test]
    fn macd_equal_prices_is_zero() {
        let out = macd(&[100.0; 50], 12, 26, 9);
        for i in 33..50 {
            assert!(out.macd.get(i).unwrap().abs() < 1e-10);
            assert!(out.signal.get(i).unwrap().abs() < 1e-10);
            assert!(out.histogram.get(i).unwrap().abs() < 1e-10);
        }
    }

    #[test]
    fn macd_line_is_ema_difference() {
        let closes: Vec<f64> = (0..30).map(|i| 100.0 + (i as f64 * 0.7).sin()).collect();
        let out = macd(&closes, 3, 6, 4);
        let input = IndicatorSeries::from(&closes[..]);
        let fast = ema(&input, 3);
        let slow = ema(&input, 6);
        for i in 5..30 {
            let expected = fast.get(i).unwrap() - slow.get(i).unwrap();
            assert!((out.macd.get(i).unwrap() - expected).abs() < f64::EPSILON);
        }
    }

    #[test]
    fn macd_histogram_is_line_minus_signal() {
        let closes: Vec<f64> = (0..60).map(|i| 100.0 * 1.01f64.powi(i)).collect();
        let out = macd_default(&closes);
        for i in 33..60 {
            let expected = out.macd.get(i).unwrap() - out.signal.get(i).unwrap();
            assert!((out.histogram.get(i).unwrap() - expected).abs() < f64::EPSILON);
            // steady growth keeps the fast average above the signal
            assert!(out.histogram.get(i).unwrap() > 0.0);
        }
    }

    #[test]
    fn macd_short_input_all_undefined() {
        let out = macd_default(&[1.0, 2.0, 3.0]);
        assert_eq!(out.macd.first_defined(), None);
        assert_eq!(out.signal.first_defined(), None);
    }

    #[test]
    #[should_panic(expected = "macd lengths must be at least 1")]
    fn macd_zero_length_panics() {
        let _ = macd(&[1.0, 2.0], 0, 26, 9);
    }
}
