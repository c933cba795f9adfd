use log::{error, info};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{sleep_until, Instant};

use super::orchestrator::MeasurementOrchestrator;
use crate::modbus::RegisterTransport;
use crate::output::{MeasurementSink, SinkReport};
use crate::utils::error::AcquisitionError;

/// Totals over a whole run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub cycles: u64,
    pub measurements_ok: usize,
    pub measurements_failed: usize,
    pub rows_written: usize,
    pub rows_skipped: usize,
    pub sink_errors: usize,
}

impl RunSummary {
    fn absorb(&mut self, succeeded: usize, failed: usize, report: SinkReport) {
        self.cycles += 1;
        self.measurements_ok += succeeded;
        self.measurements_failed += failed;
        self.rows_written += report.rows_written;
        self.rows_skipped += report.rows_skipped;
        self.sink_errors += report.errors;
    }
}

/// Runs a cycle immediately, then one per interval until stopped.
///
/// The stop signal is only looked at between cycles: a cycle that has
/// started is always finished and written out.
pub struct PollScheduler {
    orchestrator: MeasurementOrchestrator,
    interval: Duration,
    max_cycles: Option<u64>,
}

impl PollScheduler {
    pub fn new(
        orchestrator: MeasurementOrchestrator,
        interval: Duration,
        max_cycles: Option<u64>,
    ) -> Self {
        Self {
            orchestrator,
            interval,
            max_cycles,
        }
    }

    pub fn orchestrator(&self) -> &MeasurementOrchestrator {
        &self.orchestrator
    }

    /// Poll until `stop` turns true or `max_cycles` is reached.
    ///
    /// Losing the bus ends the run with `Err`.
    pub async fn run(
        &self,
        client: &dyn RegisterTransport,
        sink: &mut dyn MeasurementSink,
        mut stop: watch::Receiver<bool>,
    ) -> Result<RunSummary, AcquisitionError> {
        info!(
            "🚀 Polling {} targets every {:?}, writing to {} ({})",
            self.orchestrator.registry().target_count(),
            self.interval,
            sink.destination(),
            sink.sink_type()
        );

        let mut summary = RunSummary::default();

        loop {
            let cycle = self
                .orchestrator
                .run_cycle(client, summary.cycles + 1)
                .await
                .map_err(|e| {
                    error!("💥 Stopping after {} cycles: {}", summary.cycles, e);
                    AcquisitionError::Transport(e)
                })?;

            let report = sink.write_cycle(&cycle).await;
            summary.absorb(cycle.succeeded(), cycle.failed(), report);

            if self.max_cycles.is_some_and(|max| summary.cycles >= max) {
                info!("🏁 Reached {} cycles", summary.cycles);
                break;
            }

            if wait_for_stop(&mut stop, self.interval).await {
                info!("🛑 Stop requested after {} cycles", summary.cycles);
                break;
            }
        }

        Ok(summary)
    }
}

/// Wait out `interval`; true when a stop arrives first.
async fn wait_for_stop(stop: &mut watch::Receiver<bool>, interval: Duration) -> bool {
    let deadline = Instant::now() + interval;

    loop {
        if *stop.borrow_and_update() {
            return true;
        }

        tokio::select! {
            _ = sleep_until(deadline) => return false,
            changed = stop.changed() => {
                if changed.is_err() {
                    // Nobody can signal a stop any more.
                    sleep_until(deadline).await;
                    return false;
                }
            }
        }
    }
}
