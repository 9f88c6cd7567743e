//! Configuration validation.
//!
//! Validates config fields before any run starts, so bad input fails fast
//! with a [`TraderError`] instead of reaching an indicator contract panic.

use crate::domain::error::TraderError;
use crate::domain::ohlcv::Interval;
use crate::ports::config_port::ConfigPort;

pub const STRATEGY_KINDS: &[&str] = &["wave_trend", "rsi", "macd", "custom"];
pub const WAVE_TREND_MODES: &[&str] = &["crossover", "gated", "band_exit"];
pub const CAPITAL_MODES: &[&str] = &["compounding", "fixed"];
pub const FEED_MODES: &[&str] = &["poll", "stream"];
pub const LOG_FORMATS: &[&str] = &["text", "json"];

pub fn validate_strategy_config(config: &dyn ConfigPort) -> Result<(), TraderError> {
    let kind = require_choice(config, "strategy", "kind", STRATEGY_KINDS)?;
    match kind.as_str() {
        "wave_trend" => {
            validate_length(config, "strategy", "wt_channel_length")?;
            validate_length(config, "strategy", "wt_average_length")?;
            optional_choice(config, "strategy", "wt_mode", WAVE_TREND_MODES)?;
            validate_positive(config, "strategy", "wt_band")?;
        }
        "rsi" => {
            validate_length(config, "strategy", "rsi_length")?;
            validate_rsi_thresholds(config)?;
        }
        "macd" => {
            validate_length(config, "strategy", "macd_fast")?;
            validate_length(config, "strategy", "macd_slow")?;
            validate_length(config, "strategy", "macd_signal")?;
            let fast = config.get_int("strategy", "macd_fast", 12);
            let slow = config.get_int("strategy", "macd_slow", 26);
            if fast >= slow {
                return Err(TraderError::config_invalid(
                    "strategy",
                    "macd_fast",
                    "macd_fast must be shorter than macd_slow",
                ));
            }
        }
        _ => {
            match config.get_string("strategy", "name") {
                Some(s) if !s.trim().is_empty() => {}
                _ => {
                    return Err(TraderError::ConfigMissing {
                        section: "strategy".to_string(),
                        key: "name".to_string(),
                    });
                }
            }
            validate_length(config, "strategy", "window")?;
        }
    }
    Ok(())
}

pub fn validate_backtest_config(config: &dyn ConfigPort) -> Result<(), TraderError> {
    let capital = config.get_double("backtest", "initial_capital", 100_000.0);
    if capital <= 0.0 {
        return Err(TraderError::config_invalid(
            "backtest",
            "initial_capital",
            "initial_capital must be positive",
        ));
    }

    optional_choice(config, "backtest", "capital_mode", CAPITAL_MODES)?;

    let fee = config.get_double("backtest", "commission_fee", 0.001);
    if !(0.0..1.0).contains(&fee) {
        return Err(TraderError::config_invalid(
            "backtest",
            "commission_fee",
            "commission_fee must be in [0, 1)",
        ));
    }

    validate_positive(config, "backtest", "position_size")?;
    Ok(())
}

pub fn validate_data_config(config: &dyn ConfigPort) -> Result<(), TraderError> {
    if let Some(raw) = config.get_string("data", "interval") {
        raw.parse::<Interval>()
            .map_err(|reason| TraderError::config_invalid("data", "interval", reason))?;
    }
    Ok(())
}

pub fn validate_live_config(config: &dyn ConfigPort) -> Result<(), TraderError> {
    validate_length(config, "live", "window")?;

    let allocation = config.get_double("live", "allocation", 0.95);
    if allocation <= 0.0 || allocation > 1.0 {
        return Err(TraderError::config_invalid(
            "live",
            "allocation",
            "allocation must be in (0, 1]",
        ));
    }

    validate_positive(config, "live", "poll_secs")?;
    optional_choice(config, "live", "feed", FEED_MODES)?;
    Ok(())
}

pub fn validate_scan_config(config: &dyn ConfigPort) -> Result<(), TraderError> {
    validate_length(config, "scan", "workers")?;
    validate_length(config, "scan", "limit")?;
    let min_volume = config.get_double("scan", "min_quote_volume", 0.0);
    if min_volume < 0.0 {
        return Err(TraderError::config_invalid(
            "scan",
            "min_quote_volume",
            "min_quote_volume must be non-negative",
        ));
    }
    Ok(())
}

pub fn validate_logging_config(config: &dyn ConfigPort) -> Result<(), TraderError> {
    optional_choice(config, "logging", "format", LOG_FORMATS)?;
    Ok(())
}

/// A length key, when present, must be an integer of at least 1.
fn validate_length(config: &dyn ConfigPort, section: &str, key: &str) -> Result<(), TraderError> {
    let Some(raw) = config.get_string(section, key) else {
        return Ok(());
    };
    let value: i64 = raw.trim().parse().map_err(|_| {
        TraderError::config_invalid(section, key, format!("expected an integer, got '{raw}'"))
    })?;
    if value < 1 {
        return Err(TraderError::InvalidLength {
            name: key.to_string(),
            length: value.max(0) as usize,
        });
    }
    Ok(())
}

fn validate_positive(config: &dyn ConfigPort, section: &str, key: &str) -> Result<(), TraderError> {
    let Some(raw) = config.get_string(section, key) else {
        return Ok(());
    };
    match raw.trim().parse::<f64>() {
        Ok(v) if v > 0.0 && v.is_finite() => Ok(()),
        _ => Err(TraderError::config_invalid(
            section,
            key,
            format!("{key} must be a positive number"),
        )),
    }
}

fn validate_rsi_thresholds(config: &dyn ConfigPort) -> Result<(), TraderError> {
    let oversold = config.get_double("strategy", "rsi_oversold", 30.0);
    let overbought = config.get_double("strategy", "rsi_overbought", 70.0);
    if !(0.0..=100.0).contains(&oversold) || !(0.0..=100.0).contains(&overbought) {
        return Err(TraderError::config_invalid(
            "strategy",
            "rsi_oversold",
            "RSI thresholds must be within [0, 100]",
        ));
    }
    if oversold >= overbought {
        return Err(TraderError::config_invalid(
            "strategy",
            "rsi_oversold",
            "rsi_oversold must be below rsi_overbought",
        ));
    }
    Ok(())
}

fn require_choice(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    allowed: &[&str],
) -> Result<String, TraderError> {
    optional_choice(config, section, key, allowed)?.ok_or_else(|| TraderError::ConfigMissing {
        section: section.to_string(),
        key: key.to_string(),
    })
}

fn optional_choice(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    allowed: &[&str],
) -> Result<Option<String>, TraderError> {
    let Some(raw) = config.get_string(section, key) else {
        return Ok(None);
    };
    let value = raw.trim().to_lowercase();
    if allowed.contains(&value.as_str()) {
        Ok(Some(value))
    } else {
        Err(TraderError::config_invalid(
            section,
            key,
            format!("expected one of {}, got '{raw}'", allowed.join("|")),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::file_config_adapter::FileConfigAdapter;

    fn make_config(content: &str) -> FileConfigAdapter {
        FileConfigAdapter::from_string(content).unwrap()
    }

    #[test]
    fn valid_wave_trend_config_passes() {
        let config = make_config(
            r#"
[strategy]
kind = wave_trend
wt_channel_length = 10
wt_average_length = 21
wt_mode = gated
wt_band = 60
"#,
        );
        assert!(validate_strategy_config(&config).is_ok());
    }

    #[test]
    fn missing_kind_fails() {
        let config = make_config("[strategy]\nrsi_length = 14\n");
        let err = validate_strategy_config(&config).unwrap_err();
        assert!(matches!(err, TraderError::ConfigMissing { ref key, .. } if key == "kind"));
    }

    #[test]
    fn unknown_kind_fails() {
        let config = make_config("[strategy]\nkind = ichimoku\n");
        assert!(matches!(
            validate_strategy_config(&config),
            Err(TraderError::ConfigInvalid { .. })
        ));
    }

    #[test]
    fn zero_length_is_invalid_length() {
        let config = make_config("[strategy]\nkind = rsi\nrsi_length = 0\n");
        let err = validate_strategy_config(&config).unwrap_err();
        assert!(matches!(
            err,
            TraderError::InvalidLength { ref name, length: 0 } if name == "rsi_length"
        ));
    }

    #[test]
    fn negative_length_is_invalid_length() {
        let config = make_config("[strategy]\nkind = wave_trend\nwt_channel_length = -3\n");
        assert!(matches!(
            validate_strategy_config(&config),
            Err(TraderError::InvalidLength { .. })
        ));
    }

    #[test]
    fn non_numeric_length_fails() {
        let config = make_config("[strategy]\nkind = macd\nmacd_fast = twelve\n");
        assert!(matches!(
            validate_strategy_config(&config),
            Err(TraderError::ConfigInvalid { .. })
        ));
    }

    #[test]
    fn macd_fast_must_be_shorter() {
        let config = make_config("[strategy]\nkind = macd\nmacd_fast = 26\nmacd_slow = 12\n");
        assert!(validate_strategy_config(&config).is_err());
    }

    #[test]
    fn rsi_thresholds_must_be_ordered() {
        let config =
            make_config("[strategy]\nkind = rsi\nrsi_oversold = 70\nrsi_overbought = 30\n");
        assert!(validate_strategy_config(&config).is_err());
        let config = make_config("[strategy]\nkind = rsi\nrsi_overbought = 170\n");
        assert!(validate_strategy_config(&config).is_err());
    }

    #[test]
    fn custom_requires_name() {
        let config = make_config("[strategy]\nkind = custom\nwindow = 30\n");
        let err = validate_strategy_config(&config).unwrap_err();
        assert!(matches!(err, TraderError::ConfigMissing { ref key, .. } if key == "name"));

        let config = make_config("[strategy]\nkind = custom\nname = rsi_sma\n");
        assert!(validate_strategy_config(&config).is_ok());
    }

    #[test]
    fn valid_backtest_config_passes() {
        let config = make_config(
            r#"
[backtest]
initial_capital = 1000
capital_mode = fixed
commission_fee = 0.001
position_size = 2.5
force_close = false
"#,
        );
        assert!(validate_backtest_config(&config).is_ok());
    }

    #[test]
    fn empty_backtest_section_uses_defaults() {
        assert!(validate_backtest_config(&make_config("")).is_ok());
    }

    #[test]
    fn initial_capital_must_be_positive() {
        let config = make_config("[backtest]\ninitial_capital = 0\n");
        assert!(validate_backtest_config(&config).is_err());
    }

    #[test]
    fn commission_fee_range() {
        let config = make_config("[backtest]\ncommission_fee = 1.0\n");
        assert!(validate_backtest_config(&config).is_err());
        let config = make_config("[backtest]\ncommission_fee = -0.1\n");
        assert!(validate_backtest_config(&config).is_err());
    }

    #[test]
    fn capital_mode_choice() {
        let config = make_config("[backtest]\ncapital_mode = leveraged\n");
        assert!(validate_backtest_config(&config).is_err());
    }

    #[test]
    fn position_size_must_be_positive() {
        let config = make_config("[backtest]\nposition_size = 0\n");
        assert!(validate_backtest_config(&config).is_err());
    }

    #[test]
    fn data_interval_parses() {
        assert!(validate_data_config(&make_config("[data]\ninterval = 4h\n")).is_ok());
        assert!(validate_data_config(&make_config("[data]\ninterval = 3w\n")).is_err());
    }

    #[test]
    fn live_config_rules() {
        let good = make_config("[live]\nwindow = 50\nallocation = 0.95\nfeed = stream\n");
        assert!(validate_live_config(&good).is_ok());
        assert!(validate_live_config(&make_config("[live]\nallocation = 1.5\n")).is_err());
        assert!(validate_live_config(&make_config("[live]\nwindow = 0\n")).is_err());
        assert!(validate_live_config(&make_config("[live]\npoll_secs = 0\n")).is_err());
        assert!(validate_live_config(&make_config("[live]\nfeed = websocket\n")).is_err());
    }

    #[test]
    fn scan_config_rules() {
        assert!(validate_scan_config(&make_config("[scan]\nworkers = 4\nlimit = 50\n")).is_ok());
        assert!(validate_scan_config(&make_config("[scan]\nworkers = 0\n")).is_err());
        assert!(validate_scan_config(&make_config("[scan]\nmin_quote_volume = -1\n")).is_err());
    }

    #[test]
    fn logging_format_choice() {
        assert!(validate_logging_config(&make_config("[logging]\nformat = JSON\n")).is_ok());
        assert!(validate_logging_config(&make_config("[logging]\nformat = xml\n")).is_err());
    }
}
