//! Chronological bar storage with an optional fixed capacity.
//!
//! A bounded series is a ring buffer: once full, each append overwrites the
//! oldest slot and advances `head`. Reads always yield bars oldest-first.

use crate::domain::error::TraderError;
use crate::domain::ohlcv::Bar;

#[derive(Debug, Clone, Default)]
pub struct BarSeries {
    bars: Vec<Bar>,
    head: usize,
    capacity: Option<usize>,
}

impl BarSeries {
    /// Unbounded series, used for historical ranges.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sliding window holding at most `capacity` bars.
    ///
    /// # Panics
    /// Panics if `capacity` is zero.
    pub fn bounded(capacity: usize) -> Self {
        assert!(capacity > 0, "bar series capacity must be at least 1");
        BarSeries {
            bars: Vec::with_capacity(capacity),
            head: 0,
            capacity: Some(capacity),
        }
    }

    /// Build an unbounded series, rejecting bars that go backward in time.
    pub fn from_bars(bars: Vec<Bar>) -> Result<Self, TraderError> {
        let mut series = BarSeries::new();
        for bar in bars {
            series.push(bar)?;
        }
        Ok(series)
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.capacity.is_some_and(|cap| self.bars.len() == cap)
    }

    /// Append a bar, evicting the oldest one when the window is full.
    ///
    /// Returns the evicted bar, if any.
    pub fn push(&mut self, bar: Bar) -> Result<Option<Bar>, TraderError> {
        if let Some(last) = self.last() {
            if bar.timestamp <= last.timestamp {
                return Err(TraderError::OutOfOrderBar {
                    timestamp: bar.timestamp,
                    last: last.timestamp,
                });
            }
        }

        match self.capacity {
            Some(cap) if self.bars.len() == cap => {
                let evicted = std::mem::replace(&mut self.bars[self.head], bar);
                self.head = (self.head + 1) % cap;
                Ok(Some(evicted))
            }
            _ => {
                self.bars.push(bar);
                Ok(None)
            }
        }
    }

    pub fn first(&self) -> Option<&Bar> {
        self.get(0)
    }

    pub fn last(&self) -> Option<&Bar> {
        self.len().checked_sub(1).and_then(|i| self.get(i))
    }

    /// Bar at chronological position `index` (0 = oldest).
    pub fn get(&self, index: usize) -> Option<&Bar> {
        if index >= self.bars.len() {
            return None;
        }
        let physical = (self.head + index) % self.bars.len();
        self.bars.get(physical)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Bar> + '_ {
        let (newer, older) = self.bars.split_at(self.head);
        older.iter().chain(newer.iter())
    }

    /// Rotate the ring so storage order matches chronological order.
    pub fn make_contiguous(&mut self) -> &[Bar] {
        if self.head != 0 {
            self.bars.rotate_left(self.head);
            self.head = 0;
        }
        &self.bars
    }

    pub fn to_vec(&self) -> Vec<Bar> {
        self.iter().cloned().collect()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.iter().map(|b| b.close).collect()
    }
}
