//! CSV log-file sink.

use async_trait::async_trait;
use std::fs::{File, OpenOptions};
use std::path::PathBuf;
use tracing::{debug, info};

use super::{Sink, SinkError};
use crate::config::CsvConfig;
use crate::sample::Sample;

/// Appends one row per sample to a CSV file.
///
/// The `timestamp, metric, value` header is written exactly once, when the
/// file does not exist yet; reopening an existing file keeps appending below
/// the rows already there.
pub struct CsvSink {
    writer: csv::Writer<File>,
    path: PathBuf,
}

impl CsvSink {
    /// Open (or create) the log file for appending.
    pub fn open(config: &CsvConfig) -> Result<Self, SinkError> {
        let write_header = !config.path.exists();

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&config.path)?;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);

        if write_header {
            writer.write_record(["timestamp", "metric", "value"])?;
            writer.flush()?;
        }

        info!(path = %config.path.display(), "CSV sink ready");

        Ok(Self {
            writer,
            path: config.path.clone(),
        })
    }
}

#[async_trait]
impl Sink for CsvSink {
    fn name(&self) -> &'static str {
        "csv"
    }

    async fn emit(&mut self, sample: &Sample) -> Result<(), SinkError> {
        self.writer.write_record([
            sample.timestamp.to_rfc3339(),
            sample.metric.clone(),
            sample.value.to_string(),
        ])?;
        // Flush per row so a crash loses at most the in-flight sample.
        self.writer.flush()?;
        Ok(())
    }

    async fn close(&mut self) {
        if let Err(e) = self.writer.flush() {
            debug!(path = %self.path.display(), error = %e, "Flush on close failed");
        }
    }
}
