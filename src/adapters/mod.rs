//! Adapters implementing the port traits.

pub mod csv_adapter;
pub mod file_config_adapter;
pub mod paper_broker;
