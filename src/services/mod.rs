pub mod orchestrator;
pub mod scheduler;

pub use orchestrator::{CycleResult, MeasurementOrchestrator};
pub use scheduler::{PollScheduler, RunSummary};
