#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use mbus_logger::config::{DeviceRegistry, DeviceTypeConfig, MetricConfig, RegisterWindow};
use mbus_logger::devices::{Endianness, FieldWidth, RegisterLayout};
use mbus_logger::modbus::{ModbusResponse, RegisterTransport};
use mbus_logger::utils::{ExceptionCode, ModbusError};

#[derive(Debug, Clone)]
pub enum Reply {
    Registers(Vec<u16>),
    Exception(u8),
    Timeout,
    Disconnect,
}

/// In-memory bus. Each slave answers from its own script; the last entry
/// repeats once the script runs out.
pub struct ScriptedTransport {
    scripts: Mutex<HashMap<u8, VecDeque<Reply>>>,
    connect_fails: bool,
    pub calls: Mutex<Vec<(u8, u16, u16)>>,
    pub connects: AtomicUsize,
    pub closes: AtomicUsize,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            connect_fails: false,
            calls: Mutex::new(Vec::new()),
            connects: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
        }
    }

    pub fn unreachable() -> Self {
        Self {
            connect_fails: true,
            ..Self::new()
        }
    }

    pub fn with(self, slave: u8, replies: Vec<Reply>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(slave, replies.into_iter().collect());
        self
    }

    pub fn calls(&self) -> Vec<(u8, u16, u16)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RegisterTransport for ScriptedTransport {
    async fn connect(&self) -> Result<(), ModbusError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.connect_fails {
            return Err(ModbusError::ConnectionError("no such port".to_string()));
        }
        Ok(())
    }

    async fn read_holding_registers(
        &self,
        slave_id: u8,
        start_addr: u16,
        count: u16,
    ) -> Result<ModbusResponse, ModbusError> {
        self.calls.lock().unwrap().push((slave_id, start_addr, count));

        let reply = {
            let mut scripts = self.scripts.lock().unwrap();
            match scripts.get_mut(&slave_id) {
                Some(script) if script.len() > 1 => script.pop_front(),
                Some(script) => script.front().cloned(),
                None => None,
            }
        };

        match reply.unwrap_or(Reply::Timeout) {
            Reply::Registers(regs) => Ok(ModbusResponse::Registers(regs)),
            Reply::Exception(code) => Ok(ModbusResponse::Exception {
                function: 0x03,
                code: ExceptionCode(code),
            }),
            Reply::Timeout => Err(ModbusError::Timeout),
            Reply::Disconnect => Err(ModbusError::CommunicationError(
                "device disconnected".to_string(),
            )),
        }
    }

    async fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn zp_meter(addresses: Vec<u8>, word_order: Endianness) -> DeviceTypeConfig {
    DeviceTypeConfig {
        type_id: "zp_meter".to_string(),
        addresses,
        byte_order: Endianness::Big,
        word_order,
        metrics: vec![MetricConfig {
            name: "all".to_string(),
            window: RegisterWindow::new(
                0,
                16,
                RegisterLayout::uniform(0, 8, FieldWidth::Bits32, false),
            ),
        }],
    }
}

pub fn belimo(address: u8) -> DeviceTypeConfig {
    DeviceTypeConfig {
        type_id: "belimo".to_string(),
        addresses: vec![address],
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
    }
}

pub fn registry(types: Vec<DeviceTypeConfig>) -> DeviceRegistry {
    DeviceRegistry::new(types).unwrap()
}

pub fn counting_block() -> Vec<u16> {
    vec![0, 1, 0, 2, 0, 3, 0, 4, 0, 5, 0, 6, 0, 7, 0, 8]
}
