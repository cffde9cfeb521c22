//! Subscriber initialization

use std::str::FromStr;
use std::sync::Once;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

static INIT: Once = Once::new();

/// Filter used when `RUST_LOG` is unset or invalid.
pub const DEFAULT_FILTER: &str = "info";

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("Invalid log filter '{filter}': {reason}")]
    InvalidFilter { filter: String, reason: String },

    #[error("Failed to install subscriber: {0}")]
    Install(String),

    #[error("Unknown log format '{0}' (expected 'pretty' or 'json')")]
    UnknownFormat(String),
}

/// Console output style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = TelemetryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(TelemetryError::UnknownFormat(other.to_string())),
        }
    }
}

/// Build the filter from `RUST_LOG`, falling back to `fallback`.
pub fn env_filter(fallback: &str) -> Result<EnvFilter, TelemetryError> {
    EnvFilter::try_from_default_env().or_else(|_| {
        EnvFilter::try_new(fallback).map_err(|e| TelemetryError::InvalidFilter {
            filter: fallback.to_string(),
            reason: e.to_string(),
        })
    })
}

/// Initialize console logging.
///
/// Only the first call installs a subscriber; later calls are no-ops.
///
/// # Example
/// ```
/// use fala_telemetry::init_telemetry;
/// init_telemetry("fala-cli").expect("Failed to initialize telemetry");
/// ```
pub fn init_telemetry(service_name: &str) -> Result<(), TelemetryError> {
    init_with_format(service_name, LogFormat::Pretty, DEFAULT_FILTER)
}

/// Initialize logging with an explicit format and fallback filter.
pub fn init_with_format(
    service_name: &str,
    format: LogFormat,
    fallback_filter: &str,
) -> Result<(), TelemetryError> {
    let filter = env_filter(fallback_filter)?;
    let mut result = Ok(());

    INIT.call_once(|| {
        let registry = tracing_subscriber::registry().with(filter);
        let installed = match format {
            LogFormat::Pretty => registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_target(true)
                        .with_thread_ids(true)
                        .with_line_number(true),
                )
                .try_init(),
            LogFormat::Json => registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_current_span(true)
                        .with_span_list(false),
                )
                .try_init(),
        };

        result = installed.map_err(|e| TelemetryError::Install(e.to_string()));
        if result.is_ok() {
            tracing::info!(service.name = service_name, ?format, "Telemetry initialized");
        }
    });

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_parsing() {
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("Pretty".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert!(matches!(
            "yaml".parse::<LogFormat>(),
            Err(TelemetryError::UnknownFormat(f)) if f == "yaml"
        ));
    }

    #[test]
    fn test_init_is_idempotent() {
        init_telemetry("fala-test").unwrap();
        init_telemetry("fala-test").unwrap();
        init_with_format("fala-test", LogFormat::Json, "debug").unwrap();
    }
}
