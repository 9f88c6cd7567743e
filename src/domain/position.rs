//! Open position and trade records.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// An open LONG position. FLAT is the absence of a position.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Position {
    pub entry_price: f64,
    pub entry_timestamp: DateTime<Utc>,
    pub size: f64,
}

impl Position {
    pub fn market_value(&self, price: f64) -> f64 {
        self.size * price
    }

    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        self.size * (price - self.entry_price)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeKind {
    Buy,
    Sell,
}

impl fmt::Display for TradeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeKind::Buy => write!(f, "BUY"),
            TradeKind::Sell => write!(f, "SELL"),
        }
    }
}

/// One accepted ledger transition.
///
/// `realized_profit` is `None` for BUY records and `Some` for SELL records.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TradeRecord {
    pub timestamp: DateTime<Utc>,
    pub kind: TradeKind,
    pub price: f64,
    pub size: f64,
    pub realized_profit: Option<f64>,
}

impl TradeRecord {
    pub fn is_win(&self) -> bool {
        self.realized_profit.is_some_and(|p| p > 0.0)
    }
}
