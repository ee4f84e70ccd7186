//! Modbus telemetry collector for PV inverters.
//!
//! Polls one or more inverters over Modbus TCP on a fixed cadence, decodes
//! raw register words into engineering values, and fans each sample out to
//! the configured sinks:
//!
//! - [`decode`] - register word decoding (encodings and scaling)
//! - [`sample`] - the decoded telemetry unit
//! - [`config`] - configuration loading (JSON5 format)
//! - [`transport`] - Modbus TCP session behind a narrow trait
//! - [`poller`] - per-device poll loop
//! - [`fanout`] - sample distribution to sinks
//! - [`sink`] - MQTT and CSV delivery targets
//!
//! Each device runs its own poller task; samples flow over one bounded
//! channel to a single fan-out task that owns every sink.

pub mod config;
pub mod decode;
pub mod fanout;
pub mod poller;
pub mod sample;
pub mod sink;
pub mod transport;

pub use config::{CollectorConfig, ConfigError, LogFormat, LoggingConfig};
pub use sample::Sample;

/// Initialize tracing with the given configuration.
///
/// Supports two output formats:
/// - [`LogFormat::Text`] (default): Human-readable text format
/// - [`LogFormat::Json`]: Structured JSON format for log aggregation systems
pub fn init_tracing(config: &LoggingConfig) -> Result<(), ConfigError> {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let init = match config.format {
        LogFormat::Text => tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .try_init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .try_init(),
    };

    init.map_err(|e| ConfigError::Validation(format!("Failed to initialize tracing: {}", e)))
}
