use super::crc::crc16_modbus;
use crate::utils::error::{ExceptionCode, ModbusError};

pub const READ_HOLDING_REGISTERS: u8 = 0x03;
pub const EXCEPTION_FLAG: u8 = 0x80;

/// Largest register count a single 0x03 request may ask for.
pub const MAX_READ_REGISTERS: u16 = 125;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModbusRequest {
    ReadHoldingRegisters {
        slave_id: u8,
        start_register: u16,
        quantity: u16,
    },
}

impl ModbusRequest {
    /// RTU frame: address, function, payload, CRC (low byte first).
    pub fn to_frame(&self) -> Vec<u8> {
        match self {
            ModbusRequest::ReadHoldingRegisters {
                slave_id,
                start_register,
                quantity,
            } => {
                let mut frame = vec![*slave_id, READ_HOLDING_REGISTERS];
                frame.extend_from_slice(&start_register.to_be_bytes());
                frame.extend_from_slice(&quantity.to_be_bytes());

                let crc = crc16_modbus(&frame);
                frame.extend_from_slice(&crc.to_le_bytes());
                frame
            }
        }
    }
}

/// A reply that made it through framing and CRC checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModbusResponse {
    Registers(Vec<u16>),
    /// Valid negative reply; the device is alive but refused the request.
    Exception { function: u8, code: ExceptionCode },
}

/// Number of bytes still to read once the 3-byte reply head is in.
pub fn remaining_len(head: &[u8; 3]) -> usize {
    if head[1] & EXCEPTION_FLAG != 0 {
        2
    } else {
        head[2] as usize + 2
    }
}

/// Validate a complete read-holding-registers reply frame.
pub fn parse_read_response(
    slave_id: u8,
    quantity: u16,
    frame: &[u8],
) -> Result<ModbusResponse, ModbusError> {
    if frame.len() < 5 {
        return Err(ModbusError::InvalidResponse(format!(
            "frame too short ({} bytes)",
            frame.len()
        )));
    }

    let data_len = frame.len() - 2;
    let received_crc = u16::from_le_bytes([frame[data_len], frame[data_len + 1]]);
    if received_crc != crc16_modbus(&frame[..data_len]) {
        return Err(ModbusError::CrcError);
    }

    if frame[0] != slave_id {
        return Err(ModbusError::InvalidResponse(format!(
            "reply from address {} while polling {}",
            frame[0], slave_id
        )));
    }

    let function = frame[1];
    if function == READ_HOLDING_REGISTERS | EXCEPTION_FLAG {
        return Ok(ModbusResponse::Exception {
            function: READ_HOLDING_REGISTERS,
            code: ExceptionCode(frame[2]),
        });
    }
    if function != READ_HOLDING_REGISTERS {
        return Err(ModbusError::InvalidResponse(format!(
            "unexpected function code 0x{:02X}",
            function
        )));
    }

    let byte_count = frame[2] as usize;
    if byte_count != quantity as usize * 2 || data_len != 3 + byte_count {
        return Err(ModbusError::InvalidResponse(format!(
            "byte count {} for {} registers",
            byte_count, quantity
        )));
    }

    let registers = frame[3..data_len]
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect();

    Ok(ModbusResponse::Registers(registers))
}
