//! Core domain types and logic.

pub mod ohlcv;
pub mod bar_series;
pub mod indicator;
pub mod signal;
pub mod strategy;
pub mod position;
pub mod ledger;
pub mod portfolio;
pub mod backtest;
pub mod metrics;
pub mod config_validation;
pub mod error;
