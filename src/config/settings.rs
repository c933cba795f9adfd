use clap::ArgMatches;
use log::info;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::registry::{DeviceRegistry, DeviceTypeConfig, MetricConfig, RegisterWindow};
use crate::devices::layout::{Endianness, FieldWidth, RegisterLayout};
use crate::utils::error::ConfigError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub serial: SerialConfig,
    pub polling: PollingConfig,
    pub output: OutputConfig,
    #[serde(default)]
    pub device_types: Vec<DeviceTypeConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerialConfig {
    pub port: String,
    pub baud_rate: u32,
    pub parity: ParityConfig,
    #[serde(default = "default_data_bits")]
    pub data_bits: u8,
    #[serde(default = "default_stop_bits")]
    pub stop_bits: u8,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl SerialConfig {
    /// Reject framing the serial driver cannot apply.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(5..=8).contains(&self.data_bits) {
            return Err(ConfigError::InvalidValue(format!(
                "serial data_bits must be 5 to 8, got {}",
                self.data_bits
            )));
        }
        if !(1..=2).contains(&self.stop_bits) {
            return Err(ConfigError::InvalidValue(format!(
                "serial stop_bits must be 1 or 2, got {}",
                self.stop_bits
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParityConfig {
    None,
    Even,
    Odd,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    pub interval_seconds: u64,
    /// Stop after this many cycles; run until signalled when absent.
    #[serde(default)]
    pub max_cycles: Option<u64>,
    /// Silence kept on the line between two requests.
    #[serde(default = "default_request_gap_ms")]
    pub request_gap_ms: u64,
}

impl PollingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }

    pub fn request_gap(&self) -> Duration {
        Duration::from_millis(self.request_gap_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    pub directory: PathBuf,
    #[serde(default)]
    pub empty_rows: EmptyRowPolicy,
}

/// What the sink does with a measurement that carries no values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmptyRowPolicy {
    /// Write nothing; the gap is logged.
    #[default]
    Skip,
    /// Write one row of `NA` markers.
    Placeholder,
}

fn default_data_bits() -> u8 {
    8
}

fn default_stop_bits() -> u8 {
    1
}

fn default_timeout_ms() -> u64 {
    1000
}

fn default_request_gap_ms() -> u64 {
    50
}

impl Default for Config {
    fn default() -> Self {
        // Belimo valve: signed 16-bit values, registers 19..24.
        let belimo = DeviceTypeConfig {
            type_id: "belimo".to_string(),
            addresses: vec![2],
            byte_order: Endianness::Big,
            word_order: Endianness::Little,
            metrics: vec![MetricConfig {
                name: "measurements".to_string(),
                window: RegisterWindow::new(
                    19,
                    6,
                    RegisterLayout::uniform(19, 6, FieldWidth::Bits16, true),
                ),
            }],
        };

        // ZP energy meters: eight unsigned 32-bit counters from register 0.
        let zp_meter = DeviceTypeConfig {
            type_id: "zp_meter".to_string(),
            addresses: vec![34, 23, 21, 36],
            byte_order: Endianness::Big,
            word_order: Endianness::Big,
            metrics: vec![MetricConfig {
                name: "all".to_string(),
                window: RegisterWindow::new(
                    0,
                    16,
                    RegisterLayout::uniform(0, 8, FieldWidth::Bits32, false),
                ),
            }],
        };

        Self {
            serial: SerialConfig {
                port: "/dev/ttyUSB0".to_string(),
                baud_rate: 9600,
                parity: ParityConfig::Even,
                data_bits: default_data_bits(),
                stop_bits: default_stop_bits(),
                timeout_ms: default_timeout_ms(),
            },
            polling: PollingConfig {
                interval_seconds: 60,
                max_cycles: None,
                request_gap_ms: default_request_gap_ms(),
            },
            output: OutputConfig {
                directory: PathBuf::from("data"),
                empty_rows: EmptyRowPolicy::Skip,
            },
            device_types: vec![belimo, zp_meter],
        }
    }
}

impl Config {
    /// Load from `--config` when given, otherwise start from defaults, then
    /// apply command line overrides.
    pub fn from_matches(matches: &ArgMatches) -> Result<Self, ConfigError> {
        let mut config = match matches.get_one::<String>("config") {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };

        if let Some(port) = matches.get_one::<String>("port") {
            config.serial.port = port.clone();
        }
        if let Some(baud) = matches.get_one::<String>("baud") {
            config.serial.baud_rate = parse_arg("baud", baud)?;
        }
        if let Some(interval) = matches.get_one::<String>("interval") {
            config.polling.interval_seconds = parse_arg("interval", interval)?;
        }
        if let Some(cycles) = matches.get_one::<String>("cycles") {
            config.polling.max_cycles = Some(parse_arg("cycles", cycles)?);
        }
        if let Some(dir) = matches.get_one::<String>("output-dir") {
            config.output.directory = PathBuf::from(dir);
        }

        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = toml::from_str(&content)?;
        info!("📄 Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let write_err = |source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };

        // Create directory if it doesn't exist
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(write_err)?;
        Ok(())
    }

    /// Validate the device section into a registry.
    pub fn registry(&self) -> Result<DeviceRegistry, ConfigError> {
        self.serial.validate()?;
        if self.polling.interval_seconds == 0 {
            return Err(ConfigError::InvalidValue(
                "polling interval must be at least one second".to_string(),
            ));
        }
        DeviceRegistry::new(self.device_types.clone())
    }
}

fn parse_arg<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, ConfigError> {
    value
        .parse()
        .map_err(|_| ConfigError::InvalidValue(format!("--{} '{}'", name, value)))
}
