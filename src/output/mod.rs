pub mod csv_sink;
pub mod senders;

pub use csv_sink::{CsvSink, RowOutcome, SinkHandle};
pub use senders::{MeasurementSink, SinkReport};
