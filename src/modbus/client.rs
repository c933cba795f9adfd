use async_trait::async_trait;
use log::{debug, error, info};
use serialport::{ClearBuffer, SerialPort};
use std::io::{Read, Write};
use std::sync::Mutex;
use std::time::Duration;

use super::protocol::{self, ModbusRequest, ModbusResponse};
use crate::config::settings::{ParityConfig, SerialConfig};
use crate::utils::error::ModbusError;

/// The capability the acquisition core needs from a bus.
///
/// Calls are strictly sequential: a half-duplex line carries one request and
/// one reply at a time.
#[async_trait]
pub trait RegisterTransport: Send + Sync {
    async fn connect(&self) -> Result<(), ModbusError>;

    /// Read `count` holding registers starting at `start_addr` from `slave_id`.
    ///
    /// `Ok(ModbusResponse::Exception { .. })` is a valid negative reply;
    /// `Err` means the request never produced a usable reply.
    async fn read_holding_registers(
        &self,
        slave_id: u8,
        start_addr: u16,
        count: u16,
    ) -> Result<ModbusResponse, ModbusError>;

    async fn close(&self);
}

/// Modbus RTU master over a serial port.
pub struct ModbusClient {
    settings: SerialConfig,
    port: Mutex<Option<Box<dyn SerialPort>>>,
}

impl ModbusClient {
    pub fn new(settings: SerialConfig) -> Self {
        Self {
            settings,
            port: Mutex::new(None),
        }
    }

    fn open_port(&self) -> Result<Box<dyn SerialPort>, ModbusError> {
        let s = &self.settings;
        info!("🔌 Connecting to Modbus RTU port: {}", s.port);
        info!(
            "⚙️  Configuration: {} baud, {} data bits, {:?} parity, {} stop bit(s)",
            s.baud_rate, s.data_bits, s.parity, s.stop_bits
        );

        let parity = match s.parity {
            ParityConfig::None => serialport::Parity::None,
            ParityConfig::Even => serialport::Parity::Even,
            ParityConfig::Odd => serialport::Parity::Odd,
        };
        let data_bits = match s.data_bits {
            5 => serialport::DataBits::Five,
            6 => serialport::DataBits::Six,
            7 => serialport::DataBits::Seven,
            8 => serialport::DataBits::Eight,
            other => {
                return Err(ModbusError::ConnectionError(format!(
                    "Unsupported data bits: {}",
                    other
                )))
            }
        };
        let stop_bits = match s.stop_bits {
            1 => serialport::StopBits::One,
            2 => serialport::StopBits::Two,
            other => {
                return Err(ModbusError::ConnectionError(format!(
                    "Unsupported stop bits: {}",
                    other
                )))
            }
        };

        serialport::new(&s.port, s.baud_rate)
            .timeout(Duration::from_millis(s.timeout_ms))
            .data_bits(data_bits)
            .stop_bits(stop_bits)
            .parity(parity)
            .open()
            .map_err(|e| {
                error!("❌ Failed to open serial port {}: {}", s.port, e);
                ModbusError::ConnectionError(format!("Failed to open port {}: {}", s.port, e))
            })
    }
}

#[async_trait]
impl RegisterTransport for ModbusClient {
    async fn connect(&self) -> Result<(), ModbusError> {
        let mut guard = self.port.lock().map_err(|_| ModbusError::LockError)?;
        if guard.is_none() {
            *guard = Some(self.open_port()?);
            info!("✅ Modbus RTU connection established");
        }
        Ok(())
    }

    async fn read_holding_registers(
        &self,
        slave_id: u8,
        start_addr: u16,
        count: u16,
    ) -> Result<ModbusResponse, ModbusError> {
        debug!(
            "📊 Reading {} registers from device {} starting at address {}",
            count, slave_id, start_addr
        );

        let request = ModbusRequest::ReadHoldingRegisters {
            slave_id,
            start_register: start_addr,
            quantity: count,
        }
        .to_frame();

        let mut guard = self.port.lock().map_err(|_| ModbusError::LockError)?;
        let port = guard.as_mut().ok_or(ModbusError::NotConnected)?;

        // Drop anything a previous, timed-out reply left behind.
        port.clear(ClearBuffer::Input)
            .map_err(|e| ModbusError::CommunicationError(format!("Clear failed: {}", e)))?;

        port.write_all(&request)?;
        port.flush()?;

        let mut head = [0u8; 3];
        port.read_exact(&mut head)?;

        let mut frame = head.to_vec();
        let mut rest = vec![0u8; protocol::remaining_len(&head)];
        port.read_exact(&mut rest)?;
        frame.extend_from_slice(&rest);

        debug!("📥 Reply from device {}: {}", slave_id, hex::encode(&frame));

        protocol::parse_read_response(slave_id, count, &frame)
    }

    async fn close(&self) {
        if let Ok(mut guard) = self.port.lock() {
            if guard.take().is_some() {
                info!("🔌 Modbus RTU connection closed");
            }
        }
    }
}
