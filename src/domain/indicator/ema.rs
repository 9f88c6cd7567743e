//! Exponential Moving Average.
//!
//! k = 2/(n+1), seeded with the SMA of the first n defined inputs, then
//! EMA[i] = X[i]*k + EMA[i-1]*(1-k), evaluated as EMA[i-1] + k*(X[i] - EMA[i-1])
//! so a constant input stays exactly constant.
//!
//! The input may itself be a derived series with undefined positions. Each
//! maximal run of consecutive defined values is smoothed independently: an
//! undefined input yields an undefined output and restarts the seed.

use crate::domain::indicator::IndicatorSeries;

pub fn ema(input: &IndicatorSeries, length: usize) -> IndicatorSeries {
    assert!(length > 0, "ema length must be at least 1");

    let k = 2.0 / (length as f64 + 1.0);
    let mut out = Vec::with_capacity(input.len());
    let mut run = 0usize;
    let mut seed_sum = 0.0;
    let mut prev = 0.0;

    for value in input.values() {
        let Some(x) = *value else {
            run = 0;
            seed_sum = 0.0;
            out.push(None);
            continue;
        };

        run += 1;
        if run < length {
            seed_sum += x;
            out.push(None);
        } else if run == length {
            seed_sum += x;
            prev = seed_sum / length as f64;
            out.push(Some(prev));
        } else {
            prev += k * (x - prev);
            out.push(Some(prev));
        }
    }

    IndicatorSeries::from(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(prices: &[f64]) -> IndicatorSeries {
        IndicatorSeries::from(prices)
    }

    #[test]
    fn ema_warmup() {
        let out = ema(&series(&[10.0, 20.0, 30.0, 40.0, 50.0]), 3);

        assert!(out.get(0).is_none());
        assert!(out.get(1).is_none());
        assert!(out.get(2).is_some());
        assert!(out.get(4).is_some());
        assert_eq!(out.len(), 5);
    }

    #[test]
    fn ema_length_1_is_identity() {
        let out = ema(&series(&[10.0, 20.0, 30.0]), 1);
        assert_eq!(out.values(), &[Some(10.0), Some(20.0), Some(30.0)]);
    }

    #[test]
    fn ema_recursive_calculation() {
        let out = ema(&series(&[10.0, 20.0, 30.0, 40.0, 50.0]), 3);

        let k = 2.0 / 4.0;
        let sma = (10.0 + 20.0 + 30.0) / 3.0;
        assert!((out.get(2).unwrap() - sma).abs() < f64::EPSILON);

        let ema_3 = 40.0 * k + sma * (1.0 - k);
        assert!((out.get(3).unwrap() - ema_3).abs() < f64::EPSILON);

        let ema_4 = 50.0 * k + ema_3 * (1.0 - k);
        assert!((out.get(4).unwrap() - ema_4).abs() < f64::EPSILON);
    }

    #[test]
    fn ema_equal_prices() {
        let out = ema(&series(&[100.0; 5]), 3);
        for i in 2..5 {
            assert!((out.get(i).unwrap() - 100.0).abs() < f64::EPSILON);
        }
    }

    #[test]
    fn ema_skips_leading_undefined() {
        let input = IndicatorSeries::from(vec![None, None, Some(3.0), Some(6.0), Some(9.0)]);
        let out = ema(&input, 2);
        assert_eq!(out.get(2), None);
        assert!((out.get(3).unwrap() - 4.5).abs() < f64::EPSILON);
        // k = 2/3: 9*2/3 + 4.5/3 = 7.5
        assert!((out.get(4).unwrap() - 7.5).abs() < 1e-12);
    }

    #[test]
    fn ema_gap_restarts_seed() {
        let input = IndicatorSeries::from(vec![
            Some(1.0),
            Some(3.0),
            None,
            Some(10.0),
            Some(20.0),
        ]);
        let out = ema(&input, 2);
        assert!((out.get(1).unwrap() - 2.0).abs() < f64::EPSILON);
        assert_eq!(out.get(2), None);
        assert_eq!(out.get(3), None);
        assert!((out.get(4).unwrap() - 15.0).abs() < f64::EPSILON);
    }

    #[test]
    fn ema_shorter_than_length_is_all_undefined() {
        let out = ema(&series(&[1.0, 2.0]), 5);
        assert_eq!(out.first_defined(), None);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn ema_empty_input() {
        assert!(ema(&IndicatorSeries::default(), 3).is_empty());
    }

    #[test]
    #[should_panic(expected = "ema length must be at least 1")]
    fn ema_length_0_panics() {
        let _ = ema(&series(&[1.0]), 0);
    }
}
