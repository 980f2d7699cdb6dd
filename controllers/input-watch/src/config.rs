//! Controller configuration.
//!
//! Everything is read from environment variables, each with a default.

use crate::error::ControllerError;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// How selector kinds are resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolverMode {
    /// Query the API server's discovery endpoints
    Discovery,
    /// Fixed table of built-in core kinds
    Static,
}

impl FromStr for ResolverMode {
    type Err = ControllerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "discovery" => Ok(Self::Discovery),
            "static" => Ok(Self::Static),
            other => Err(ControllerError::InvalidConfig(format!(
                "KIND_RESOLVER must be `discovery` or `static`, got `{other}`"
            ))),
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per line
    Json,
    /// Human readable
    Console,
}

impl FromStr for LogFormat {
    type Err = ControllerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "console" => Ok(Self::Console),
            other => Err(ControllerError::InvalidConfig(format!(
                "LOG_FORMAT must be `json` or `console`, got `{other}`"
            ))),
        }
    }
}

/// Controller configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// YAML file with the input resource set; built-in set when unset
    pub input_resources_file: Option<PathBuf>,
    /// Kind resolver to use
    pub kind_resolver: ResolverMode,
    /// Capacity of the dispatcher's event channel
    pub event_channel_capacity: usize,
    /// Time allowed for the initial backfill
    pub cache_sync_timeout: Duration,
    /// Log level name or numeric verbosity
    pub log_level: String,
    /// Log output format
    pub log_format: LogFormat,
    /// Port of the metrics/probe server; `None` disables it
    pub metrics_port: Option<u16>,
    /// First retry delay after a failed reconcile
    pub backoff_min: Duration,
    /// Retry delay cap
    pub backoff_max: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            input_resources_file: None,
            kind_resolver: ResolverMode::Discovery,
            event_channel_capacity: watch_engine::initializer::DEFAULT_CHANNEL_CAPACITY,
            cache_sync_timeout: watch_engine::initializer::DEFAULT_SYNC_TIMEOUT,
            log_level: "info".to_string(),
            log_format: LogFormat::Json,
            metrics_port: Some(8080),
            backoff_min: Duration::from_secs(1),
            backoff_max: Duration::from_secs(60),
        }
    }
}

impl ControllerConfig {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self, ControllerError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through `lookup` (environment variable name -> value)
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ControllerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let event_channel_capacity = match get("EVENT_CHANNEL_CAPACITY") {
            Some(v) => parse_number::<usize>("EVENT_CHANNEL_CAPACITY", &v)?,
            None => defaults.event_channel_capacity,
        };
        if event_channel_capacity == 0 {
            return Err(ControllerError::InvalidConfig(
                "EVENT_CHANNEL_CAPACITY must be at least 1".to_string(),
            ));
        }

        let cache_sync_timeout = match get("CACHE_SYNC_TIMEOUT_SECS") {
            Some(v) => Duration::from_secs(parse_number("CACHE_SYNC_TIMEOUT_SECS", &v)?),
            None => defaults.cache_sync_timeout,
        };

        let metrics_port = match get("METRICS_PORT") {
            Some(v) => match parse_number::<u16>("METRICS_PORT", &v)? {
                0 => None,
                port => Some(port),
            },
            None => defaults.metrics_port,
        };

        let backoff_min = match get("BACKOFF_MIN_SECS") {
            Some(v) => Duration::from_secs(parse_number("BACKOFF_MIN_SECS", &v)?),
            None => defaults.backoff_min,
        };
        let backoff_max = match get("BACKOFF_MAX_SECS") {
            Some(v) => Duration::from_secs(parse_number("BACKOFF_MAX_SECS", &v)?),
            None => defaults.backoff_max,
        };
        if backoff_min.is_zero() || backoff_min > backoff_max {
            return Err(ControllerError::InvalidConfig(format!(
                "backoff bounds must satisfy 0 < BACKOFF_MIN_SECS <= BACKOFF_MAX_SECS, got {}s and {}s",
                backoff_min.as_secs(),
                backoff_max.as_secs()
            )));
        }

        Ok(Self {
            input_resources_file: get("INPUT_RESOURCES_FILE").map(PathBuf::from),
            kind_resolver: get("KIND_RESOLVER")
                .map(|v| v.parse())
                .transpose()?
                .unwrap_or(defaults.kind_resolver),
            event_channel_capacity,
            cache_sync_timeout,
            log_level: get("LOG_LEVEL").unwrap_or(defaults.log_level),
            log_format: get("LOG_FORMAT")
                .map(|v| v.parse())
                .transpose()?
                .unwrap_or(defaults.log_format),
            metrics_port,
            backoff_min,
            backoff_max,
        })
    }
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T, ControllerError> {
    value
        .trim()
        .parse()
        .map_err(|_| ControllerError::InvalidConfig(format!("{key} must be a non-negative integer, got `{value}`")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<ControllerConfig, ControllerError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        ControllerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).expect("defaults are valid");
        assert_eq!(config, ControllerConfig::default());
        assert_eq!(config.event_channel_capacity, 1024);
        assert_eq!(config.cache_sync_timeout, Duration::from_secs(120));
        assert_eq!(config.metrics_port, Some(8080));
        assert_eq!(config.kind_resolver, ResolverMode::Discovery);
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("INPUT_RESOURCES_FILE", "/etc/input-watch/resources.yaml"),
            ("KIND_RESOLVER", "Static"),
            ("EVENT_CHANNEL_CAPACITY", "16"),
            ("CACHE_SYNC_TIMEOUT_SECS", "30"),
            ("LOG_LEVEL", "-2"),
            ("LOG_FORMAT", "console"),
            ("METRICS_PORT", "0"),
            ("BACKOFF_MIN_SECS", "2"),
            ("BACKOFF_MAX_SECS", "30"),
        ])
        .expect("valid config");

        assert_eq!(
            config.input_resources_file,
            Some(PathBuf::from("/etc/input-watch/resources.yaml"))
        );
        assert_eq!(config.kind_resolver, ResolverMode::Static);
        assert_eq!(config.event_channel_capacity, 16);
        assert_eq!(config.cache_sync_timeout, Duration::from_secs(30));
        assert_eq!(config.log_level, "-2");
        assert_eq!(config.log_format, LogFormat::Console);
        assert_eq!(config.metrics_port, None);
        assert_eq!(config.backoff_min, Duration::from_secs(2));
        assert_eq!(config.backoff_max, Duration::from_secs(30));
    }

    #[test]
    fn test_empty_values_use_defaults() {
        let config = load(&[("LOG_LEVEL", ""), ("METRICS_PORT", "  ")]).expect("valid config");
        assert_eq!(config.log_level, "info");
        assert_eq!(config.metrics_port, Some(8080));
    }

    #[test]
    fn test_invalid_values() {
        for vars in [
            vec![("EVENT_CHANNEL_CAPACITY", "0")],
            vec![("EVENT_CHANNEL_CAPACITY", "lots")],
            vec![("METRICS_PORT", "70000")],
            vec![("KIND_RESOLVER", "mapper")],
            vec![("LOG_FORMAT", "xml")],
            vec![("BACKOFF_MIN_SECS", "0")],
            vec![("BACKOFF_MIN_SECS", "10"), ("BACKOFF_MAX_SECS", "5")],
        ] {
            let err = load(&vars).unwrap_err();
            assert!(
                matches!(err, ControllerError::InvalidConfig(_)),
                "{vars:?} should be rejected, got {err}"
            );
        }
    }
}
