//! Order placement port trait.

use crate::domain::error::TraderError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

/// Confirmation of an accepted market order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderReceipt {
    pub order_id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: f64,
    pub fill_price: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

pub trait OrderPort: Send + Sync {
    fn place_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: f64,
    ) -> Result<OrderReceipt, TraderError>;

    /// Free balance of the quote asset used to size BUY orders.
    fn quote_balance(&self, symbol: &str) -> Result<f64, TraderError>;
}
