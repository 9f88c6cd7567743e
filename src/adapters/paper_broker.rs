//! In-memory paper broker.
//!
//! Fills market orders at the price set through [`PaperBroker::set_price`]
//! and keeps a single quote balance plus per-symbol base holdings.

use crate::domain::error::TraderError;
use crate::ports::order_port::{OrderPort, OrderReceipt, OrderSide};
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::info;

#[derive(Debug, Default)]
struct BrokerState {
    quote_balance: f64,
    holdings: HashMap<String, f64>,
    prices: HashMap<String, f64>,
    receipts: Vec<OrderReceipt>,
    next_id: u64,
    /// Number of upcoming orders to reject.
    pending_failures: usize,
}

#[derive(Debug, Default)]
pub struct PaperBroker {
    state: Mutex<BrokerState>,
}

impl PaperBroker {
    pub fn new(quote_balance: f64) -> Self {
        PaperBroker {
            state: Mutex::new(BrokerState {
                quote_balance,
                ..BrokerState::default()
            }),
        }
    }

    pub fn set_price(&self, symbol: &str, price: f64) {
        self.state.lock().prices.insert(symbol.to_string(), price);
    }

    /// Reject the next `count` orders.
    pub fn fail_next_orders(&self, count: usize) {
        self.state.lock().pending_failures = count;
    }

    pub fn receipts(&self) -> Vec<OrderReceipt> {
        self.state.lock().receipts.clone()
    }

    pub fn holding(&self, symbol: &str) -> f64 {
        self.state.lock().holdings.get(symbol).copied().unwrap_or(0.0)
    }
}

impl OrderPort for PaperBroker {
    fn place_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: f64,
    ) -> Result<OrderReceipt, TraderError> {
        let reject = |reason: &str| TraderError::Order {
            symbol: symbol.to_string(),
            reason: reason.to_string(),
        };

        let mut state = self.state.lock();
        if state.pending_failures > 0 {
            state.pending_failures -= 1;
            return Err(reject("injected failure"));
        }
        if !(quantity.is_finite() && quantity > 0.0) {
            return Err(reject("quantity must be positive"));
        }
        let price = state.prices.get(symbol).copied();
        let notional = price.map(|p| p * quantity);

        match side {
            OrderSide::Buy => {
                if let Some(cost) = notional {
                    if cost > state.quote_balance {
                        return Err(reject("insufficient balance"));
                    }
                    state.quote_balance -= cost;
                }
                *state.holdings.entry(symbol.to_string()).or_insert(0.0) += quantity;
            }
            OrderSide::Sell => {
                let held = state.holdings.get(symbol).copied().unwrap_or(0.0);
                if held + 1e-12 < quantity {
                    return Err(reject("insufficient holdings"));
                }
                state.holdings.insert(symbol.to_string(), (held - quantity).max(0.0));
                if let Some(proceeds) = notional {
                    state.quote_balance += proceeds;
                }
            }
        }

        state.next_id += 1;
        let receipt = OrderReceipt {
            order_id: format!("paper-{}", state.next_id),
            symbol: symbol.to_string(),
            side,
            quantity,
            fill_price: price,
            timestamp: Utc::now(),
        };
        info!(symbol, %side, quantity, fill_price = ?price, "paper order filled");
        state.receipts.push(receipt.clone());
        Ok(receipt)
    }

    fn quote_balance(&self, _symbol: &str) -> Result<f64, TraderError> {
        Ok(self.state.lock().quote_balance)
    }
}
