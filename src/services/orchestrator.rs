use chrono::{DateTime, Utc};
use log::{error, info, warn};
use std::time::Duration;
use tokio::time::sleep;

use crate::config::registry::DeviceRegistry;
use crate::devices::{Measurement, SlaveDevice};
use crate::modbus::RegisterTransport;
use crate::utils::error::ModbusError;

/// Every configured (device type, address, metric) measurement of one cycle,
/// in registry order.
#[derive(Debug, Clone)]
pub struct CycleResult {
    pub cycle: u64,
    pub started_at: DateTime<Utc>,
    pub measurements: Vec<Measurement>,
}

impl CycleResult {
    pub fn len(&self) -> usize {
        self.measurements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.measurements.is_empty()
    }

    pub fn succeeded(&self) -> usize {
        self.measurements.iter().filter(|m| m.failure.is_none()).count()
    }

    pub fn failed(&self) -> usize {
        self.len() - self.succeeded()
    }
}

/// Drives every slave of the registry through one poll cycle.
pub struct MeasurementOrchestrator {
    registry: DeviceRegistry,
    request_gap: Duration,
}

impl MeasurementOrchestrator {
    pub fn new(registry: DeviceRegistry, request_gap: Duration) -> Self {
        Self {
            registry,
            request_gap,
        }
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    /// Connect, poll every triple in order, close.
    ///
    /// A failing metric becomes an empty measurement and the cycle moves on,
    /// so the result always holds one entry per configured triple. `Err` is
    /// returned only when the bus itself is lost.
    pub async fn run_cycle(
        &self,
        client: &dyn RegisterTransport,
        cycle: u64,
    ) -> Result<CycleResult, ModbusError> {
        let started_at = Utc::now();
        info!(
            "🔄 Cycle {} started at {}",
            cycle,
            started_at.format("%Y-%m-%d %H:%M:%S")
        );

        client.connect().await.map_err(|e| {
            error!("❌ Cycle {}: cannot connect to the bus: {}", cycle, e);
            e
        })?;

        let result = self.poll_all(client, cycle).await;
        client.close().await;

        let measurements = result?;
        let outcome = CycleResult {
            cycle,
            started_at,
            measurements,
        };
        info!(
            "📊 Cycle {} finished: {} ok, {} failed",
            cycle,
            outcome.succeeded(),
            outcome.failed()
        );
        Ok(outcome)
    }

    async fn poll_all(
        &self,
        client: &dyn RegisterTransport,
        cycle: u64,
    ) -> Result<Vec<Measurement>, ModbusError> {
        let mut measurements = Vec::with_capacity(self.registry.target_count());
        let mut first = true;

        for device_type in self.registry.device_types() {
            for &address in &device_type.addresses {
                let mut slave = SlaveDevice::new(
                    device_type.type_id.as_str(),
                    address,
                    device_type.byte_order,
                    device_type.word_order,
                );

                for metric in &device_type.metrics {
                    if !first && !self.request_gap.is_zero() {
                        sleep(self.request_gap).await;
                    }
                    first = false;

                    let measurement = match slave.get_measurement(client, metric).await {
                        Ok(m) => m,
                        Err(e) => {
                            error!(
                                "💥 Cycle {}: bus lost while polling {} at address {} metric '{}': {}",
                                cycle, device_type.type_id, address, metric.name, e
                            );
                            return Err(e);
                        }
                    };

                    if let Some(kind) = measurement.failure {
                        warn!(
                            "📵 Cycle {}: {} at address {} metric '{}' failed ({})",
                            cycle, device_type.type_id, address, metric.name, kind
                        );
                    }
                    measurements.push(measurement);
                }
            }
        }

        Ok(measurements)
    }
}
