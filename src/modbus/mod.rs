pub mod client;
pub mod protocol;
pub mod crc;

pub use client::{ModbusClient, RegisterTransport};
pub use protocol::{ModbusRequest, ModbusResponse};
pub use crc::crc16_modbus;
