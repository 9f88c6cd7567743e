//! Capital accounting and realized equity tracking.
//!
//! Two accounting modes are supported:
//!
//! - `FixedSize { size }`: every BUY takes `size` units. Commission is
//!   `fee * price * size` per transition and profit is absolute:
//!   `(exit - entry) * size - entry_commission - exit_commission`.
//! - `Compounding`: the whole capital is committed. BUY applies
//!   `capital *= 1 - fee` and buys `capital / price` units; SELL applies
//!   `capital *= 1 + (exit / entry - 1) * (1 - fee)`.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::position::Position;

pub const DEFAULT_COMMISSION_FEE: f64 = 0.001;
pub const DEFAULT_POSITION_SIZE: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub enum CapitalMode {
    FixedSize { size: f64 },
    #[default]
    Compounding,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AccountingConfig {
    pub mode: CapitalMode,
    pub commission_fee: f64,
    /// Mark an open position to market at the last close when a run ends.
    pub force_close_open_position: bool,
}

impl Default for AccountingConfig {
    fn default() -> Self {
        AccountingConfig {
            mode: CapitalMode::Compounding,
            commission_fee: DEFAULT_COMMISSION_FEE,
            force_close_open_position: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EquityPoint {
    pub timestamp: DateTime<Utc>,
    pub equity: f64,
}

/// Valuation of a still-open position at the end of a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarkToMarket {
    pub price: f64,
    pub capital: f64,
    pub return_pct: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CapitalAccount {
    initial_capital: f64,
    capital: f64,
    config: AccountingConfig,
    capital_before_entry: f64,
    entry_commission: f64,
    equity_curve: Vec<EquityPoint>,
}

impl CapitalAccount {
    pub fn new(initial_capital: f64, config: AccountingConfig) -> Self {
        CapitalAccount {
            initial_capital,
            capital: initial_capital,
            config,
            capital_before_entry: initial_capital,
            entry_commission: 0.0,
            equity_curve: Vec::new(),
        }
    }

    pub fn initial_capital(&self) -> f64 {
        self.initial_capital
    }

    /// Realized capital.
    pub fn capital(&self) -> f64 {
        self.capital
    }

    pub fn config(&self) -> &AccountingConfig {
        &self.config
    }

    pub fn equity_curve(&self) -> &[EquityPoint] {
        &self.equity_curve
    }

    pub fn record_equity(&mut self, timestamp: DateTime<Utc>) {
        self.equity_curve.push(EquityPoint {
            timestamp,
            equity: self.capital,
        });
    }

    /// Book a BUY at `price` and return the position size.
    pub fn open(&mut self, price: f64) -> f64 {
        let fee = self.config.commission_fee;
        self.capital_before_entry = self.capital;
        match self.config.mode {
            CapitalMode::FixedSize { size } => {
                self.entry_commission = fee * price * size;
                size
            }
            CapitalMode::Compounding => {
                self.capital *= 1.0 - fee;
                if price > 0.0 { self.capital / price } else { 0.0 }
            }
        }
    }

    /// Book a SELL of `position` at `price` and return the realized profit.
    pub fn close(&mut self, position: &Position, price: f64) -> f64 {
        let fee = self.config.commission_fee;
        match self.config.mode {
            CapitalMode::FixedSize { .. } => {
                let exit_commission = fee * price * position.size;
                let profit = (price - position.entry_price) * position.size
                    - self.entry_commission
                    - exit_commission;
                self.capital += profit;
                profit
            }
            CapitalMode::Compounding => {
                if position.entry_price > 0.0 {
                    let change = price / position.entry_price - 1.0;
                    self.capital *= 1.0 + change * (1.0 - fee);
                }
                self.capital - self.capital_before_entry
            }
        }
    }

    /// Capital if `position` were closed at `price`, without booking it.
    pub fn mark_to_market(&self, position: &Position, price: f64) -> MarkToMarket {
        let mut scratch = self.clone();
        scratch.close(position, price);
        MarkToMarket {
            price,
            capital: scratch.capital,
            return_pct: return_pct(self.initial_capital, scratch.capital),
        }
    }
}

pub fn return_pct(initial: f64, current: f64) -> f64 {
    if initial == 0.0 {
        0.0
    } else {
        (current - initial) / initial * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn position(entry_price: f64, size: f64) -> Position {
        Position {
            entry_price,
            entry_timestamp: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
            size,
        }
    }

    fn fixed(size: f64, fee: f64) -> AccountingConfig {
        AccountingConfig {
            mode: CapitalMode::FixedSize { size },
            commission_fee: fee,
            force_close_open_position: true,
        }
    }

    fn compounding(fee: f64) -> AccountingConfig {
        AccountingConfig {
            mode: CapitalMode::Compounding,
            commission_fee: fee,
            force_close_open_position: true,
        }
    }

    #[test]
    fn defaults() {
        let config = AccountingConfig::default();
        assert_eq!(config.mode, CapitalMode::Compounding);
        assert!((config.commission_fee - 0.001).abs() < f64::EPSILON);
        assert!(config.force_close_open_position);
    }

    #[test]
    fn compounding_commission_impact() {
        let mut account = CapitalAccount::new(1000.0, compounding(0.001));
        let size = account.open(100.0);
        assert_relative_eq!(size, 9.99, epsilon = 1e-12);
        assert_relative_eq!(account.capital(), 999.0, epsilon = 1e-12);

        let profit = account.close(&position(100.0, size), 110.0);
        let expected = 1000.0 * (1.0 - 0.001) * (1.0 + (110.0 / 100.0 - 1.0) * (1.0 - 0.001));
        assert_relative_eq!(account.capital(), expected, epsilon = 1e-9);
        assert_relative_eq!(profit, expected - 1000.0, epsilon = 1e-9);
    }

    #[test]
    fn compounding_loss() {
        let mut account = CapitalAccount::new(1000.0, compounding(0.0));
        let size = account.open(100.0);
        let profit = account.close(&position(100.0, size), 90.0);
        assert_relative_eq!(account.capital(), 900.0, epsilon = 1e-9);
        assert_relative_eq!(profit, -100.0, epsilon = 1e-9);
    }

    #[test]
    fn fixed_size_profit_with_commission() {
        let mut account = CapitalAccount::new(10_000.0, fixed(2.0, 0.01));
        let size = account.open(100.0);
        assert_eq!(size, 2.0);
        // capital is unchanged until the SELL
        assert_eq!(account.capital(), 10_000.0);

        let profit = account.close(&position(100.0, size), 110.0);
        // 20 gross - 2.0 entry commission - 2.2 exit commission
        assert_relative_eq!(profit, 15.8, epsilon = 1e-9);
        assert_relative_eq!(account.capital(), 10_015.8, epsilon = 1e-9);
    }

    #[test]
    fn fixed_size_without_commission() {
        let mut account = CapitalAccount::new(1000.0, fixed(1.0, 0.0));
        let size = account.open(50.0);
        let profit = account.close(&position(50.0, size), 45.0);
        assert_relative_eq!(profit, -5.0, epsilon = 1e-12);
        assert_relative_eq!(account.capital(), 995.0, epsilon = 1e-12);
    }

    #[test]
    fn mark_to_market_does_not_book() {
        let mut account = CapitalAccount::new(1000.0, compounding(0.0));
        let size = account.open(100.0);
        let mtm = account.mark_to_market(&position(100.0, size), 120.0);
        assert_relative_eq!(mtm.capital, 1200.0, epsilon = 1e-9);
        assert_relative_eq!(mtm.return_pct, 20.0, epsilon = 1e-9);
        assert_relative_eq!(account.capital(), 1000.0, epsilon = 1e-9);
    }

    #[test]
    fn equity_curve_records_realized_capital() {
        let mut account = CapitalAccount::new(500.0, compounding(0.0));
        let ts = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        account.record_equity(ts);
        assert_eq!(account.equity_curve().len(), 1);
        assert_eq!(account.equity_curve()[0].equity, 500.0);
    }

    #[test]
    fn return_pct_zero_initial() {
        assert_eq!(return_pct(0.0, 10.0), 0.0);
        assert_relative_eq!(return_pct(200.0, 250.0), 25.0);
    }
}
