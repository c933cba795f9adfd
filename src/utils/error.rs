use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Bus-level failures raised by the transport.
#[derive(Error, Debug)]
pub enum ModbusError {
    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Communication error: {0}")]
    CommunicationError(String),

    #[error("Not connected to the bus")]
    NotConnected,

    #[error("CRC checksum mismatch")]
    CrcError,

    #[error("Invalid response from device: {0}")]
    InvalidResponse(String),

    #[error("Lock acquisition failed")]
    LockError,

    #[error("Timeout occurred")]
    Timeout,
}

impl ModbusError {
    /// True when the bus itself is gone and the run cannot continue.
    ///
    /// Timeouts, CRC mismatches and malformed replies concern a single
    /// request and are recovered by the next cycle.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ModbusError::ConnectionError(_)
                | ModbusError::CommunicationError(_)
                | ModbusError::NotConnected
                | ModbusError::LockError
        )
    }
}

impl From<std::io::Error> for ModbusError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::TimedOut => ModbusError::Timeout,
            _ => ModbusError::CommunicationError(format!("IO error: {}", err)),
        }
    }
}

impl From<serialport::Error> for ModbusError {
    fn from(err: serialport::Error) -> Self {
        ModbusError::ConnectionError(err.to_string())
    }
}

/// Registry or configuration file problems. Always fatal at startup.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Failed to write config file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Device type '{type_id}', metric '{metric}': window count {register_count} but layout needs {layout_registers} registers")]
    WindowLayoutMismatch {
        type_id: String,
        metric: String,
        register_count: u16,
        layout_registers: usize,
    },

    #[error("Device type '{type_id}': address {address} listed more than once")]
    DuplicateAddress { type_id: String, address: u8 },

    #[error("Device type '{type_id}': address {address} outside 1..=247")]
    InvalidAddress { type_id: String, address: u8 },

    #[error("Device type '{type_id}': metric '{metric}' declared more than once")]
    DuplicateMetric { type_id: String, metric: String },

    #[error("Device type '{0}' declared more than once")]
    DuplicateDeviceType(String),

    #[error("Device type '{type_id}', metric '{metric}': {reason}")]
    InvalidWindow {
        type_id: String,
        metric: String,
        reason: String,
    },

    #[error("Device type '{0}' has no addresses")]
    NoAddresses(String),

    #[error("Invalid value: {0}")]
    InvalidValue(String),
}

/// Raised by the decode engine when the raw block is shorter than the layout.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Insufficient registers at field {field}: need {needed}, {available} left")]
    InsufficientRegisters {
        field: usize,
        needed: usize,
        available: usize,
    },
}

/// Sink create/open/write failures. Fatal for the affected sink only.
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Cannot create output directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Cannot open {path}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Cannot write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("{path} already holds header '{found}', expected '{expected}'")]
    HeaderMismatch {
        path: PathBuf,
        expected: String,
        found: String,
    },

    #[error("Row has {values} values but {path} declares {arity} columns")]
    ArityMismatch {
        path: PathBuf,
        arity: usize,
        values: usize,
    },

    #[error("Sink {0} disabled after an earlier failure")]
    Disabled(PathBuf),
}

/// Why a single (device, metric) poll produced no values.
#[derive(Error, Debug)]
pub enum PollError {
    #[error("Protocol exception: {code}")]
    Protocol { code: ExceptionCode },

    #[error("Transport failure: {0}")]
    Transport(#[from] ModbusError),

    #[error("Decode failure: {0}")]
    Decode(#[from] DecodeError),
}

impl PollError {
    pub fn kind(&self) -> FailureKind {
        match self {
            PollError::Protocol { code } => FailureKind::Protocol(*code),
            PollError::Transport(_) => FailureKind::Transport,
            PollError::Decode(_) => FailureKind::Decode,
        }
    }
}

/// Failure kind recorded on an empty measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Protocol(ExceptionCode),
    Transport,
    Decode,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Protocol(code) => write!(f, "protocol ({})", code),
            FailureKind::Transport => write!(f, "transport"),
            FailureKind::Decode => write!(f, "decode"),
        }
    }
}

/// Modbus exception code carried by a negative reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExceptionCode(pub u8);

impl ExceptionCode {
    pub fn name(&self) -> &'static str {
        match self.0 {
            0x01 => "illegal function",
            0x02 => "illegal data address",
            0x03 => "illegal data value",
            0x04 => "server device failure",
            0x05 => "acknowledge",
            0x06 => "server device busy",
            0x08 => "memory parity error",
            0x0A => "gateway path unavailable",
            0x0B => "gateway target device failed to respond",
            _ => "unknown exception",
        }
    }
}

impl fmt::Display for ExceptionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02X} {}", self.0, self.name())
    }
}

/// Terminal condition of a polling run.
#[derive(Error, Debug)]
pub enum AcquisitionError {
    #[error("Bus lost: {0}")]
    Transport(#[from] ModbusError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_level_faults_are_not_fatal() {
        assert!(!ModbusError::Timeout.is_fatal());
        assert!(!ModbusError::CrcError.is_fatal());
        assert!(!ModbusError::InvalidResponse("short".into()).is_fatal());
        assert!(ModbusError::NotConnected.is_fatal());
        assert!(ModbusError::CommunicationError("port gone".into()).is_fatal());
    }

    #[test]
    fn timed_out_io_maps_to_timeout() {
        let err: ModbusError = std::io::Error::new(std::io::ErrorKind::TimedOut, "t").into();
        assert!(matches!(err, ModbusError::Timeout));

        let err: ModbusError = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "b").into();
        assert!(err.is_fatal());
    }

    #[test]
    fn exception_code_display() {
        assert_eq!(ExceptionCode(2).to_string(), "0x02 illegal data address");
        assert_eq!(ExceptionCode(0x42).name(), "unknown exception");
    }
}
