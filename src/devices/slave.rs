use log::debug;

use super::layout::{decode, Endianness};
use super::measurement::Measurement;
use crate::config::registry::{MetricConfig, RegisterWindow, TargetKey};
use crate::modbus::{ModbusResponse, RegisterTransport};
use crate::utils::error::{FailureKind, ModbusError, PollError};

/// Where a slave is in its poll/decode sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlaveState {
    Idle,
    Polling,
    Decoded,
    Failed(FailureKind),
}

/// One bus address of a device type.
#[derive(Debug, Clone)]
pub struct SlaveDevice {
    pub type_id: String,
    pub address: u8,
    pub byte_order: Endianness,
    pub word_order: Endianness,
    state: SlaveState,
}

impl SlaveDevice {
    pub fn new(
        type_id: impl Into<String>,
        address: u8,
        byte_order: Endianness,
        word_order: Endianness,
    ) -> Self {
        Self {
            type_id: type_id.into(),
            address,
            byte_order,
            word_order,
            state: SlaveState::Idle,
        }
    }

    pub fn state(&self) -> SlaveState {
        self.state
    }

    /// Read the raw registers of `window`.
    pub async fn poll(
        &mut self,
        client: &dyn RegisterTransport,
        window: &RegisterWindow,
    ) -> Result<Vec<u16>, PollError> {
        self.state = SlaveState::Polling;

        let reply = client
            .read_holding_registers(self.address, window.start_address, window.register_count)
            .await;

        match reply {
            Ok(ModbusResponse::Registers(registers)) => Ok(registers),
            Ok(ModbusResponse::Exception { code, .. }) => {
                let err = PollError::Protocol { code };
                self.state = SlaveState::Failed(err.kind());
                Err(err)
            }
            Err(e) => {
                self.state = SlaveState::Failed(FailureKind::Transport);
                Err(PollError::Transport(e))
            }
        }
    }

    /// Poll and decode one metric.
    ///
    /// Protocol, request-level transport and decode failures come back as an
    /// empty measurement tagged with the failure kind. Only a lost bus is
    /// returned as `Err`.
    pub async fn get_measurement(
        &mut self,
        client: &dyn RegisterTransport,
        metric: &MetricConfig,
    ) -> Result<Measurement, ModbusError> {
        let key = TargetKey {
            type_id: self.type_id.clone(),
            address: self.address,
            metric: metric.name.clone(),
        };

        let result = match self.poll(client, &metric.window).await {
            Ok(raw) => decode(&raw, self.byte_order, self.word_order, &metric.window.layout)
                .map_err(PollError::from),
            Err(e) => Err(e),
        };

        match result {
            Ok(values) => {
                self.state = SlaveState::Decoded;
                debug!("🔹 {} decoded {:?}", key, values);
                Ok(Measurement::success(key, values))
            }
            Err(PollError::Transport(e)) if e.is_fatal() => {
                self.state = SlaveState::Failed(FailureKind::Transport);
                Err(e)
            }
            Err(e) => {
                let kind = e.kind();
                self.state = SlaveState::Failed(kind);
                debug!("📵 {} failed: {}", key, e);
                Ok(Measurement::failed(key, kind))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::layout::{FieldWidth, RegisterLayout};
    use crate::utils::error::ExceptionCode;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct OneShot(Mutex<Option<Result<ModbusResponse, ModbusError>>>);

    impl OneShot {
        fn new(reply: Result<ModbusResponse, ModbusError>) -> Self {
            Self(Mutex::new(Some(reply)))
        }
    }

    #[async_trait]
    impl RegisterTransport for OneShot {
        async fn connect(&self) -> Result<(), ModbusError> {
            Ok(())
        }

        async fn read_holding_registers(
            &self,
            _slave_id: u8,
            _start_addr: u16,
            _count: u16,
        ) -> Result<ModbusResponse, ModbusError> {
            self.0
                .lock()
                .unwrap()
                .take()
                .unwrap_or(Err(ModbusError::Timeout))
        }

        async fn close(&self) {}
    }

    fn metric(count: usize) -> MetricConfig {
        MetricConfig {
            name: "all".to_string(),
            window: RegisterWindow::new(
                0,
                (count * 2) as u16,
                RegisterLayout::uniform(0, count, FieldWidth::Bits32, false),
            ),
        }
    }

    fn slave() -> SlaveDevice {
        SlaveDevice::new("zp", 34, Endianness::Big, Endianness::Big)
    }

    #[tokio::test]
    async fn decodes_on_success() {
        let client = OneShot::new(Ok(ModbusResponse::Registers(vec![0x0001, 0x0002])));
        let mut device = slave();
        assert_eq!(device.state(), SlaveState::Idle);

        let m = device.get_measurement(&client, &metric(1)).await.unwrap();
        assert_eq!(m.values, vec![0x0001_0002]);
        assert_eq!(m.device_address(), 34);
        assert_eq!(m.metric_name(), "all");
        assert_eq!(device.state(), SlaveState::Decoded);
    }

    #[tokio::test]
    async fn exception_reply_yields_empty_measurement() {
        let client = OneShot::new(Ok(ModbusResponse::Exception {
            function: 0x03,
            code: ExceptionCode(2),
        }));
        let mut device = slave();

        let m = device.get_measurement(&client, &metric(1)).await.unwrap();
        assert!(m.is_empty());
        assert_eq!(m.failure, Some(FailureKind::Protocol(ExceptionCode(2))));
        assert_eq!(
            device.state(),
            SlaveState::Failed(FailureKind::Protocol(ExceptionCode(2)))
        );
    }

    #[tokio::test]
    async fn short_reply_is_a_decode_failure() {
        let client = OneShot::new(Ok(ModbusResponse::Registers(vec![1, 2])));
        let mut device = slave();

        let m = device.get_measurement(&client, &metric(2)).await.unwrap();
        assert!(m.is_empty());
        assert_eq!(m.failure, Some(FailureKind::Decode));
    }

    #[tokio::test]
    async fn timeout_is_recovered_but_lost_bus_is_not() {
        let client = OneShot::new(Err(ModbusError::Timeout));
        let mut device = slave();
        let m = device.get_measurement(&client, &metric(1)).await.unwrap();
        assert_eq!(m.failure, Some(FailureKind::Transport));

        let client = OneShot::new(Err(ModbusError::NotConnected));
        let err = device.get_measurement(&client, &metric(1)).await.unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(device.state(), SlaveState::Failed(FailureKind::Transport));
    }
}
