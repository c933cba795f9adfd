//! Static device/metric registry.
//!
//! Loaded once at startup and validated before the first cycle; after that it
//! is read-only. Iteration order (device types, then addresses, then metrics)
//! is the bus access order.

use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::devices::layout::{Endianness, RegisterLayout};
use crate::modbus::protocol::MAX_READ_REGISTERS;
use crate::utils::error::ConfigError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterWindow {
    pub start_address: u16,
    pub register_count: u16,
    #[serde(rename = "fields")]
    pub layout: RegisterLayout,
}

impl RegisterWindow {
    pub fn new(start_address: u16, register_count: u16, layout: RegisterLayout) -> Self {
        Self {
            start_address,
            register_count,
            layout,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricConfig {
    pub name: String,
    #[serde(flatten)]
    pub window: RegisterWindow,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceTypeConfig {
    pub type_id: String,
    pub addresses: Vec<u8>,
    pub byte_order: Endianness,
    pub word_order: Endianness,
    pub metrics: Vec<MetricConfig>,
}

/// Identifies one (device type, address, metric) triple: one measurement per
/// cycle and one sink file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TargetKey {
    pub type_id: String,
    pub address: u8,
    pub metric: String,
}

impl fmt::Display for TargetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}/{}", self.type_id, self.address, self.metric)
    }
}

/// Borrowed view of one configured triple.
#[derive(Debug, Clone, Copy)]
pub struct Target<'a> {
    pub device_type: &'a DeviceTypeConfig,
    pub address: u8,
    pub metric: &'a MetricConfig,
}

impl Target<'_> {
    pub fn key(&self) -> TargetKey {
        TargetKey {
            type_id: self.device_type.type_id.clone(),
            address: self.address,
            metric: self.metric.name.clone(),
        }
    }
}

/// Validated, immutable registry.
#[derive(Debug, Clone)]
pub struct DeviceRegistry {
    device_types: Vec<DeviceTypeConfig>,
}

impl DeviceRegistry {
    /// Validate `device_types`; any violation is fatal.
    pub fn new(device_types: Vec<DeviceTypeConfig>) -> Result<Self, ConfigError> {
        let mut type_ids = HashSet::new();
        let mut address_owner: HashMap<u8, &str> = HashMap::new();

        for device_type in &device_types {
            if !type_ids.insert(device_type.type_id.as_str()) {
                return Err(ConfigError::DuplicateDeviceType(device_type.type_id.clone()));
            }
            validate_device_type(device_type)?;

            for &address in &device_type.addresses {
                if let Some(owner) = address_owner.insert(address, &device_type.type_id) {
                    warn!(
                        "⚠️  Address {} is configured for both '{}' and '{}'",
                        address, owner, device_type.type_id
                    );
                }
            }
        }

        Ok(Self { device_types })
    }

    pub fn device_types(&self) -> &[DeviceTypeConfig] {
        &self.device_types
    }

    /// All configured triples in bus access order.
    pub fn targets(&self) -> impl Iterator<Item = Target<'_>> + '_ {
        self.device_types.iter().flat_map(|device_type| {
            device_type.addresses.iter().flat_map(move |&address| {
                device_type.metrics.iter().map(move |metric| Target {
                    device_type,
                    address,
                    metric,
                })
            })
        })
    }

    pub fn target_count(&self) -> usize {
        self.device_types
            .iter()
            .map(|d| d.addresses.len() * d.metrics.len())
            .sum()
    }
}

fn validate_device_type(device_type: &DeviceTypeConfig) -> Result<(), ConfigError> {
    let type_id = &device_type.type_id;

    if device_type.addresses.is_empty() {
        return Err(ConfigError::NoAddresses(type_id.clone()));
    }

    let mut seen = HashSet::new();
    for &address in &device_type.addresses {
        if !(1..=247).contains(&address) {
            return Err(ConfigError::InvalidAddress {
                type_id: type_id.clone(),
                address,
            });
        }
        if !seen.insert(address) {
            return Err(ConfigError::DuplicateAddress {
                type_id: type_id.clone(),
                address,
            });
        }
    }

    let mut names = HashSet::new();
    for metric in &device_type.metrics {
        if !names.insert(metric.name.as_str()) {
            return Err(ConfigError::DuplicateMetric {
                type_id: type_id.clone(),
                metric: metric.name.clone(),
            });
        }
        validate_window(type_id, metric)?;
    }

    Ok(())
}

fn validate_window(type_id: &str, metric: &MetricConfig) -> Result<(), ConfigError> {
    let window = &metric.window;
    let invalid = |reason: String| ConfigError::InvalidWindow {
        type_id: type_id.to_string(),
        metric: metric.name.clone(),
        reason,
    };

    if window.layout.arity() == 0 {
        return Err(invalid("layout declares no fields".to_string()));
    }
    if window.register_count > MAX_READ_REGISTERS {
        return Err(invalid(format!(
            "{} registers exceed the {} register read limit",
            window.register_count, MAX_READ_REGISTERS
        )));
    }
    if window.start_address as u32 + window.register_count as u32 > 0x1_0000 {
        return Err(invalid("window runs past register 0xFFFF".to_string()));
    }

    let layout_registers = window.layout.register_count();
    if layout_registers != window.register_count as usize {
        return Err(ConfigError::WindowLayoutMismatch {
            type_id: type_id.to_string(),
            metric: metric.name.clone(),
            register_count: window.register_count,
            layout_registers,
        });
    }

    Ok(())
}
