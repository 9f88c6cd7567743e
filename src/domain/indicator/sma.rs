//! Simple Moving Average.
//!
//! O(n) sliding window sum. SMA(n)[i] is the mean of X[i-n+1..=i], defined
//! once the window holds n consecutive defined inputs.

use crate::domain::indicator::IndicatorSeries;

pub fn sma(input: &IndicatorSeries, length: usize) -> IndicatorSeries {
    assert!(length > 0, "sma length must be at least 1");

    let values = input.values();
    let mut out = Vec::with_capacity(values.len());
    let mut window_sum = 0.0;
    let mut run = 0usize;

    for (i, value) in values.iter().enumerate() {
        let Some(x) = *value else {
            run = 0;
            window_sum = 0.0;
            out.push(None);
            continue;
        };

        run += 1;
        window_sum += x;
        if run > length {
            // run > length means the value leaving the window is defined
            window_sum -= values[i - length].unwrap_or_default();
        }

        if run >= length {
            out.push(Some(window_sum / length as f64));
        } else {
            out.push(None);
        }
    }

    IndicatorSeries::from(out)
}
