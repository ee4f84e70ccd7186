//! Configuration for the collector.
//!
//! Loaded once at startup from a JSON5 file, validated, and passed by
//! reference into the pollers and sinks. Nothing here is mutable at runtime.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::decode::Encoding;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] json5::Error),
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Complete collector configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectorConfig {
    /// Devices to poll.
    pub devices: Vec<DeviceConfig>,

    /// MQTT sink settings.
    #[serde(default)]
    pub mqtt: MqttConfig,

    /// CSV sink settings.
    #[serde(default)]
    pub csv: CsvConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Configuration for a single Modbus TCP device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Device name, used in log lines.
    pub name: String,

    /// Host address (IP or hostname).
    pub host: String,

    /// TCP port (default: 502).
    #[serde(default = "default_modbus_port")]
    pub port: u16,

    /// Modbus unit/slave ID (1-247).
    #[serde(default = "default_unit_id")]
    pub unit_id: u8,

    /// Poll interval in seconds.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Per-read and per-connect timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Registers to poll each cycle, in declared order.
    pub registers: Vec<RegisterSpec>,
}

fn default_modbus_port() -> u16 {
    502
}

fn default_unit_id() -> u8 {
    1
}

fn default_poll_interval() -> u64 {
    60
}

fn default_timeout_ms() -> u64 {
    1000
}

/// Declares how to read and decode one metric.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterSpec {
    /// Starting address (0-based).
    pub address: u16,

    /// Stable metric identifier, e.g. "solar/inverter1/powerWatt".
    pub metric: String,

    /// Which register table to read (default: input).
    #[serde(default)]
    pub table: RegisterTable,

    /// Word-to-integer mapping (default: u16).
    ///
    /// An unrecognized encoding tag is rejected when the file is parsed.
    #[serde(default = "default_encoding")]
    pub encoding: Encoding,

    /// Divisor applied to the decoded integer (must be positive).
    #[serde(default = "default_scale")]
    pub scale: f64,
}

fn default_encoding() -> Encoding {
    Encoding::U16
}

fn default_scale() -> f64 {
    1.0
}

impl RegisterSpec {
    /// Number of 16-bit words to request for this register.
    pub fn word_count(&self) -> u16 {
        self.encoding.word_count() as u16
    }
}

/// Modbus register tables the collector reads from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegisterTable {
    /// Input registers (read-only, 16-bit).
    #[default]
    Input,
    /// Holding registers (read/write, 16-bit); the collector only reads.
    Holding,
}

impl RegisterTable {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegisterTable::Input => "input",
            RegisterTable::Holding => "holding",
        }
    }
}

/// MQTT sink configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqttConfig {
    /// Whether the MQTT sink is active.
    #[serde(default)]
    pub enabled: bool,

    /// Broker host.
    #[serde(default)]
    pub broker: String,

    /// Broker port (default: 1883).
    #[serde(default = "default_mqtt_port")]
    pub port: u16,

    /// Client identifier presented to the broker.
    #[serde(default = "default_client_id")]
    pub client_id: String,

    /// Topic prefix; the metric name is appended directly, with no
    /// separator inserted. Include a trailing slash if one is wanted.
    #[serde(default)]
    pub base_topic: String,

    /// Optional username for broker authentication.
    pub username: Option<String>,

    /// Optional password for broker authentication.
    pub password: Option<String>,

    /// Publish QoS: 0, 1 or 2 (default: 0).
    #[serde(default)]
    pub qos: u8,

    /// Transport-layer encryption.
    #[serde(default)]
    pub tls: TlsConfig,
}

fn default_mqtt_port() -> u16 {
    1883
}

fn default_client_id() -> String {
    "pvlog".to_string()
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            broker: String::new(),
            port: default_mqtt_port(),
            client_id: default_client_id(),
            base_topic: String::new(),
            username: None,
            password: None,
            qos: 0,
            tls: TlsConfig::default(),
        }
    }
}

/// TLS settings for the MQTT connection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TlsConfig {
    /// Whether to wrap the connection in TLS.
    #[serde(default)]
    pub enabled: bool,

    /// Path to the CA certificate (PEM). Required when enabled.
    pub ca_cert: Option<PathBuf>,

    /// Path to the client certificate (PEM), for mutual TLS.
    pub client_cert: Option<PathBuf>,

    /// Path to the client private key (PEM), for mutual TLS.
    pub client_key: Option<PathBuf>,
}

/// CSV sink configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CsvConfig {
    /// Whether the CSV sink is active.
    #[serde(default)]
    pub enabled: bool,

    /// File to append rows to.
    #[serde(default = "default_csv_path")]
    pub path: PathBuf,
}

fn default_csv_path() -> PathBuf {
    PathBuf::from("pvlog.csv")
}

impl Default for CsvConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: default_csv_path(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable text format (default).
    #[default]
    Text,
    /// Structured JSON format.
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log output format: "text" or "json".
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

impl CollectorConfig {
    /// Load configuration from a JSON5 file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: CollectorConfig = json5::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.devices.is_empty() {
            return Err(ConfigError::Validation(
                "At least one device must be configured".to_string(),
            ));
        }

        for device in &self.devices {
            if device.name.is_empty() {
                return Err(ConfigError::Validation(
                    "Device name cannot be empty".to_string(),
                ));
            }

            if device.host.is_empty() {
                return Err(ConfigError::Validation(format!(
                    "Device '{}': host cannot be empty",
                    device.name
                )));
            }

            if device.unit_id == 0 {
                return Err(ConfigError::Validation(format!(
                    "Device '{}': unit_id must be 1-247",
                    device.name
                )));
            }

            if device.poll_interval_secs == 0 {
                return Err(ConfigError::Validation(format!(
                    "Device '{}': poll_interval_secs must be at least 1",
                    device.name
                )));
            }

            if device.registers.is_empty() {
                return Err(ConfigError::Validation(format!(
                    "Device '{}': must declare at least one register",
                    device.name
                )));
            }

            for register in &device.registers {
                if register.metric.is_empty() {
                    return Err(ConfigError::Validation(format!(
                        "Device '{}': register {} has an empty metric name",
                        device.name, register.address
                    )));
                }

                if !(register.scale > 0.0 && register.scale.is_finite()) {
                    return Err(ConfigError::Validation(format!(
                        "Device '{}': register '{}' scale must be a positive number",
                        device.name, register.metric
                    )));
                }
            }
        }

        if !self.mqtt.enabled && !self.csv.enabled {
            return Err(ConfigError::Validation(
                "At least one sink (mqtt or csv) must be enabled".to_string(),
            ));
        }

        if self.mqtt.enabled {
            if self.mqtt.broker.is_empty() {
                return Err(ConfigError::Validation(
                    "mqtt: broker cannot be empty".to_string(),
                ));
            }

            if self.mqtt.qos > 2 {
                return Err(ConfigError::Validation(format!(
                    "mqtt: qos must be 0, 1 or 2 (got {})",
                    self.mqtt.qos
                )));
            }

            if self.mqtt.tls.enabled && self.mqtt.tls.ca_cert.is_none() {
                return Err(ConfigError::Validation(
                    "mqtt: tls.ca_cert is required when TLS is enabled".to_string(),
                ));
            }

            let have_cert = self.mqtt.tls.client_cert.is_some();
            let have_key = self.mqtt.tls.client_key.is_some();
            if have_cert != have_key {
                return Err(ConfigError::Validation(
                    "mqtt: tls.client_cert and tls.client_key must be given together".to_string(),
                ));
            }
        }

        if self.csv.enabled && self.csv.path.as_os_str().is_empty() {
            return Err(ConfigError::Validation(
                "csv: path cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}
