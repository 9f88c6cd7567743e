//! FLAT/LONG position state machine with an append-only trade log.
//!
//! - FLAT --BUY--> LONG: records the entry and appends a BUY record
//! - LONG --SELL--> FLAT: settles the position and appends a SELL record
//! - BUY while LONG and SELL while FLAT are no-ops returning `None`

use crate::domain::position::{Position, TradeKind, TradeRecord};
use crate::domain::signal::Signal;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Default)]
pub struct Ledger {
    position: Option<Position>,
    trades: Vec<TradeRecord>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn position(&self) -> Option<&Position> {
        self.position.as_ref()
    }

    pub fn is_flat(&self) -> bool {
        self.position.is_none()
    }

    pub fn trades(&self) -> &[TradeRecord] {
        &self.trades
    }

    pub fn into_parts(self) -> (Vec<TradeRecord>, Option<Position>) {
        (self.trades, self.position)
    }

    /// Whether `signal` would cause a transition from the current state.
    pub fn would_fire(&self, signal: Signal) -> bool {
        match signal {
            Signal::Buy => self.is_flat(),
            Signal::Sell => !self.is_flat(),
            Signal::Neutral => false,
        }
    }

    pub fn open_long(
        &mut self,
        timestamp: DateTime<Utc>,
        price: f64,
        size: f64,
    ) -> Option<&TradeRecord> {
        if self.position.is_some() {
            return None;
        }
        self.position = Some(Position {
            entry_price: price,
            entry_timestamp: timestamp,
            size,
        });
        self.trades.push(TradeRecord {
            timestamp,
            kind: TradeKind::Buy,
            price,
            size,
            realized_profit: None,
        });
        self.trades.last()
    }

    /// Close the open position. `settle` receives it and returns the realized
    /// profit; it is only called when a position exists.
    pub fn close_long(
        &mut self,
        timestamp: DateTime<Utc>,
        price: f64,
        settle: impl FnOnce(&Position) -> f64,
    ) -> Option<&TradeRecord> {
        let position = self.position.take()?;
        let profit = settle(&position);
        self.trades.push(TradeRecord {
            timestamp,
            kind: TradeKind::Sell,
            price,
            size: position.size,
            realized_profit: Some(profit),
        });
        self.trades.last()
    }
}
