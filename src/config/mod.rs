pub mod settings;
pub mod registry;

pub use settings::{Config, EmptyRowPolicy, OutputConfig, ParityConfig, PollingConfig, SerialConfig};
pub use registry::{
    DeviceRegistry, DeviceTypeConfig, MetricConfig, RegisterWindow, Target, TargetKey,
};
