//! Append-only text logs, one file per (device type, metric, address).
//!
//! The first line of each file is a comma-space-separated header of field
//! names; every following line is one cycle's values in field order. Files
//! are opened and closed around every write.

use async_trait::async_trait;
use log::{error, info, warn};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use super::senders::{MeasurementSink, SinkReport};
use crate::config::registry::{DeviceRegistry, TargetKey};
use crate::config::settings::{EmptyRowPolicy, OutputConfig};
use crate::devices::Measurement;
use crate::services::orchestrator::CycleResult;
use crate::utils::error::PersistenceError;

pub const SEPARATOR: &str = ", ";
pub const PLACEHOLDER: &str = "NA";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowOutcome {
    Written,
    Placeholder,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum SinkStatus {
    Ready,
    Disabled(String),
}

/// One target file.
#[derive(Debug, Clone)]
pub struct SinkHandle {
    pub key: TargetKey,
    pub path: PathBuf,
    header: String,
    arity: usize,
    status: SinkStatus,
}

impl SinkHandle {
    pub fn new(directory: &Path, key: TargetKey, field_names: &[&str]) -> Self {
        let file_name = format!(
            "{}_{}_{}.csv",
            sanitize(&key.type_id),
            sanitize(&key.metric),
            key.address
        );
        Self {
            path: directory.join(file_name),
            header: field_names.join(SEPARATOR),
            arity: field_names.len(),
            key,
            status: SinkStatus::Ready,
        }
    }

    pub fn arity(&self) -> usize {
        self.arity
    }

    pub fn is_ready(&self) -> bool {
        self.status == SinkStatus::Ready
    }

    pub fn disabled_reason(&self) -> Option<&str> {
        match &self.status {
            SinkStatus::Ready => None,
            SinkStatus::Disabled(reason) => Some(reason),
        }
    }

    fn disable(&mut self, err: &PersistenceError) {
        self.status = SinkStatus::Disabled(err.to_string());
    }

    /// Make sure the file exists and starts with this sink's header.
    ///
    /// An existing file with the same header is kept and appended to.
    pub fn initialize(&self) -> Result<(), PersistenceError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| PersistenceError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        if self.path.exists() {
            let file = File::open(&self.path).map_err(|source| PersistenceError::Open {
                path: self.path.clone(),
                source,
            })?;
            let mut first_line = String::new();
            BufReader::new(file)
                .read_line(&mut first_line)
                .map_err(|source| PersistenceError::Open {
                    path: self.path.clone(),
                    source,
                })?;

            let found = first_line.trim_end_matches(['\r', '\n']);
            if found == self.header {
                self.drop_partial_row()?;
                info!("📝 Appending to existing log {}", self.path.display());
                return Ok(());
            }
            if !found.is_empty() {
                return Err(PersistenceError::HeaderMismatch {
                    path: self.path.clone(),
                    expected: self.header.clone(),
                    found: found.to_string(),
                });
            }
        }

        self.append_line(&self.header)?;
        info!("📝 Created log {}", self.path.display());
        Ok(())
    }

    /// Append one row for `measurement` under `policy`.
    pub fn append_row(
        &self,
        measurement: &Measurement,
        policy: EmptyRowPolicy,
    ) -> Result<RowOutcome, PersistenceError> {
        if measurement.is_empty() {
            return match policy {
                EmptyRowPolicy::Skip => Ok(RowOutcome::Skipped),
                EmptyRowPolicy::Placeholder => {
                    let row = vec![PLACEHOLDER; self.arity].join(SEPARATOR);
                    self.append_line(&row)?;
                    Ok(RowOutcome::Placeholder)
                }
            };
        }

        if measurement.values.len() != self.arity {
            return Err(PersistenceError::ArityMismatch {
                path: self.path.clone(),
                arity: self.arity,
                values: measurement.values.len(),
            });
        }

        let row = measurement
            .values
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(SEPARATOR);
        self.append_line(&row)?;
        Ok(RowOutcome::Written)
    }

    /// Cut back a row left unfinished by an interrupted write, so the next
    /// row starts on its own line.
    fn drop_partial_row(&self) -> Result<(), PersistenceError> {
        let open_err = |source| PersistenceError::Open {
            path: self.path.clone(),
            source,
        };
        let content = fs::read(&self.path).map_err(open_err)?;
        if content.last() == Some(&b'\n') {
            return Ok(());
        }

        match content.iter().rposition(|&b| b == b'\n') {
            Some(end) => {
                let file = OpenOptions::new()
                    .write(true)
                    .open(&self.path)
                    .map_err(open_err)?;
                file.set_len(end as u64 + 1)
                    .map_err(|source| PersistenceError::Write {
                        path: self.path.clone(),
                        source,
                    })?;
                warn!(
                    "✂️  Dropped {} bytes of an unfinished row from {}",
                    content.len() - end - 1,
                    self.path.display()
                );
                Ok(())
            }
            // Header written without its line break.
            None => self.append_line(""),
        }
    }

    fn append_line(&self, line: &str) -> Result<(), PersistenceError> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|source| PersistenceError::Open {
                path: self.path.clone(),
                source,
            })?;

        writeln!(file, "{}", line).map_err(|source| PersistenceError::Write {
            path: self.path.clone(),
            source,
        })
    }
}

fn sanitize(part: &str) -> String {
    part.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// All per-target files of a registry.
pub struct CsvSink {
    directory: PathBuf,
    policy: EmptyRowPolicy,
    handles: Vec<SinkHandle>,
    index: HashMap<TargetKey, usize>,
}

impl CsvSink {
    /// Create one handle per configured triple and write headers.
    ///
    /// A handle that cannot be initialised is disabled and logged; the others
    /// are unaffected.
    pub fn create_sinks(registry: &DeviceRegistry, output: &OutputConfig) -> Self {
        let mut handles = Vec::with_capacity(registry.target_count());
        let mut index = HashMap::new();

        for target in registry.targets() {
            let names = target.metric.window.layout.header_names();
            let mut handle = SinkHandle::new(&output.directory, target.key(), &names);

            if let Err(e) = handle.initialize() {
                error!("❌ Sink for {} unavailable: {}", handle.key, e);
                handle.disable(&e);
            }

            index.insert(handle.key.clone(), handles.len());
            handles.push(handle);
        }

        info!(
            "📤 {} sinks in {} ({} unavailable)",
            handles.len(),
            output.directory.display(),
            handles.iter().filter(|h| !h.is_ready()).count()
        );

        Self {
            directory: output.directory.clone(),
            policy: output.empty_rows,
            handles,
            index,
        }
    }

    pub fn disabled(&self) -> impl Iterator<Item = &SinkHandle> {
        self.handles.iter().filter(|h| !h.is_ready())
    }

    /// Write one measurement to its sink.
    pub fn append(&mut self, measurement: &Measurement) -> Result<RowOutcome, PersistenceError> {
        let slot = match self.index.get(&measurement.key) {
            Some(&slot) => slot,
            None => {
                return Err(PersistenceError::Disabled(
                    self.directory.join(measurement.key.to_string()),
                ))
            }
        };
        let handle = &mut self.handles[slot];

        if !handle.is_ready() {
            return Err(PersistenceError::Disabled(handle.path.clone()));
        }

        match handle.append_row(measurement, self.policy) {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                if !matches!(e, PersistenceError::ArityMismatch { .. }) {
                    handle.disable(&e);
                }
                Err(e)
            }
        }
    }
}

#[async_trait]
impl MeasurementSink for CsvSink {
    async fn write_cycle(&mut self, cycle: &CycleResult) -> SinkReport {
        let mut report = SinkReport::default();

        for measurement in &cycle.measurements {
            match self.append(measurement) {
                Ok(RowOutcome::Written) | Ok(RowOutcome::Placeholder) => report.rows_written += 1,
                Ok(RowOutcome::Skipped) => {
                    report.rows_skipped += 1;
                    warn!(
                        "⏭️  Cycle {}: no row for {} ({})",
                        cycle.cycle,
                        measurement.key,
                        measurement
                            .failure
                            .map(|k| k.to_string())
                            .unwrap_or_else(|| "no values".to_string())
                    );
                }
                Err(PersistenceError::Disabled(_)) => {
                    report.errors += 1;
                    warn!(
                        "🚫 Cycle {}: {} not written, its sink is disabled",
                        cycle.cycle, measurement.key
                    );
                }
                Err(e) => {
                    report.errors += 1;
                    error!("❌ Cycle {}: write for {} failed: {}", cycle.cycle, measurement.key, e);
                }
            }
        }

        report
    }

    fn sink_type(&self) -> &str {
        "csv"
    }

    fn destination(&self) -> String {
        self.directory.display().to_string()
    }
}
