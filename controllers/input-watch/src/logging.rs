//! Logger setup.
//!
//! `LOG_LEVEL` accepts a level name (`trace`, `debug`, `info`, `warn`,
//! `error`, plus `dpanic`/`panic`/`fatal` which map to `error`) or a numeric
//! verbosity from -9 (most verbose) to 5 (least verbose): -1 is debug, 0 is
//! info, 1 is warn, 2 and above is error, -2 and below is trace.

use crate::config::LogFormat;
use crate::error::ControllerError;
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Map a `LOG_LEVEL` value to a tracing level
pub fn parse_level(value: &str) -> Result<Level, ControllerError> {
    let value = value.trim();
    if let Ok(numeric) = value.parse::<i8>() {
        return match numeric {
            -9..=-2 => Ok(Level::TRACE),
            -1 => Ok(Level::DEBUG),
            0 => Ok(Level::INFO),
            1 => Ok(Level::WARN),
            2..=5 => Ok(Level::ERROR),
            _ => Err(ControllerError::InvalidConfig(format!(
                "numeric LOG_LEVEL must be between -9 and 5, got {numeric}"
            ))),
        };
    }

    match value.to_ascii_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" | "warning" => Ok(Level::WARN),
        "error" | "dpanic" | "panic" | "fatal" => Ok(Level::ERROR),
        other => Err(ControllerError::InvalidConfig(format!("unknown LOG_LEVEL `{other}`"))),
    }
}

/// Install the global subscriber.
///
/// `RUST_LOG` directives, when set, take precedence over `LOG_LEVEL`.
pub fn init(level: &str, format: LogFormat) -> Result<(), ControllerError> {
    let level = parse_level(level)?;
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_ascii_lowercase()));

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);
    let result = match format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Console => builder.try_init(),
    };
    result.map_err(|e| ControllerError::InvalidConfig(format!("failed to install logger: {e}")))
}
