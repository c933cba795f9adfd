use async_trait::async_trait;

use crate::services::orchestrator::CycleResult;

/// Per-cycle persistence summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SinkReport {
    pub rows_written: usize,
    pub rows_skipped: usize,
    pub errors: usize,
}

/// Destination for cycle results.
///
/// An implementation must never let one target's failure stop the others;
/// problems are logged and counted in the report.
#[async_trait]
pub trait MeasurementSink: Send {
    async fn write_cycle(&mut self, cycle: &CycleResult) -> SinkReport;
    fn sink_type(&self) -> &str;
    fn destination(&self) -> String;
}
