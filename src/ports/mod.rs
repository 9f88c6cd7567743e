//! Port traits: the boundary between the trading core and its collaborators.

pub mod config_port;
pub mod market_data_port;
pub mod order_port;
