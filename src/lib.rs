//! Modbus RTU register logger
//!
//! Polls a fixed set of field devices sharing one serial bus, decodes their
//! holding registers through declared per-metric layouts and appends every
//! cycle to per-metric log files.

pub mod config;
pub mod modbus;
pub mod devices;
pub mod services;
pub mod output;
pub mod utils;
pub mod cli;

// Re-export commonly used types
pub use config::{Config, DeviceRegistry, DeviceTypeConfig, MetricConfig, RegisterWindow, TargetKey};
pub use devices::{decode, Endianness, FieldSpec, FieldWidth, Measurement, RegisterLayout, SlaveDevice};
pub use modbus::{ModbusClient, ModbusResponse, RegisterTransport};
pub use output::{CsvSink, MeasurementSink};
pub use services::{CycleResult, MeasurementOrchestrator, PollScheduler, RunSummary};
pub use utils::error::{AcquisitionError, ConfigError, DecodeError, ModbusError, PersistenceError};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
