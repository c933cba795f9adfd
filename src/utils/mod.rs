pub mod error;

pub use error::{
    AcquisitionError, ConfigError, DecodeError, ExceptionCode, FailureKind, ModbusError,
    PersistenceError, PollError,
};
