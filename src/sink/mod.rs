//! Sample delivery targets.
//!
//! Every sink implements the single [`Sink::emit`] contract; the fan-out
//! treats them uniformly and isolates their failures from one another.

use async_trait::async_trait;
use thiserror::Error;

use crate::sample::Sample;

mod csv;
mod mqtt;

pub use csv::CsvSink;
pub use mqtt::MqttSink;

/// Failures scoped to a single sink.
#[derive(Debug, Error)]
pub enum SinkError {
    /// The sink could not be brought up at startup.
    #[error("Connection failed: {0}")]
    Connect(String),

    /// A publish to the message bus failed.
    #[error("Publish failed: {0}")]
    Publish(String),

    /// I/O error while appending to a file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] ::csv::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A delivery target for decoded samples.
///
/// Sinks own their connection or file-handle state exclusively; the fan-out
/// task serializes calls, so `emit` never runs concurrently on one sink.
#[async_trait]
pub trait Sink: Send {
    /// Short name used in log lines.
    fn name(&self) -> &'static str;

    /// Deliver one sample.
    async fn emit(&mut self, sample: &Sample) -> Result<(), SinkError>;

    /// Release the sink's resources. Called once, after the last `emit`.
    async fn close(&mut self) {}
}
