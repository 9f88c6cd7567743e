//! wavetrader: oscillator signal engine, backtester and live decision loop.
//!
//! Hexagonal architecture: pure indicator/signal/ledger logic in [`domain`],
//! port traits in [`ports`], concrete implementations in [`adapters`], and the
//! threaded drivers (live loop, market scanner) in [`engine`].

pub mod domain;
pub mod ports;
pub mod adapters;
pub mod engine;
pub mod cli;
