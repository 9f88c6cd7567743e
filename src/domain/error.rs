//! Domain error types.

use chrono::{DateTime, Utc};

/// Top-level error type for wavetrader.
#[derive(Debug, thiserror::Error)]
pub enum TraderError {
    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("invalid length for {name}: {length} (must be at least 1)")]
    InvalidLength { name: String, length: usize },

    #[error("unknown strategy: {0}")]
    UnknownStrategy(String),

    #[error("bar at {timestamp} is not after the last bar at {last}")]
    OutOfOrderBar {
        timestamp: DateTime<Utc>,
        last: DateTime<Utc>,
    },

    #[error("market data error for {symbol}: {reason}")]
    MarketData { symbol: String, reason: String },

    #[error("no data for {symbol} ({interval})")]
    NoData { symbol: String, interval: String },

    #[error("order rejected for {symbol}: {reason}")]
    Order { symbol: String, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl TraderError {
    pub fn market_data(symbol: &str, reason: impl Into<String>) -> Self {
        TraderError::MarketData {
            symbol: symbol.to_string(),
            reason: reason.into(),
        }
    }

    pub fn config_invalid(section: &str, key: &str, reason: impl Into<String>) -> Self {
        TraderError::ConfigInvalid {
            section: section.to_string(),
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<&TraderError> for std::process::ExitCode {
    fn from(err: &TraderError) -> Self {
        let code: u8 = match err {
            TraderError::Io(_) => 1,
            TraderError::ConfigParse { .. }
            | TraderError::ConfigMissing { .. }
            | TraderError::ConfigInvalid { .. }
            | TraderError::InvalidLength { .. } => 2,
            TraderError::MarketData { .. }
            | TraderError::NoData { .. }
            | TraderError::OutOfOrderBar { .. } => 3,
            TraderError::UnknownStrategy(_) => 4,
            TraderError::Order { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}
