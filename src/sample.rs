//! The decoded telemetry unit handed to sinks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One decoded, scaled metric value.
///
/// Produced by the poll scheduler at the instant a register read decodes
/// successfully, then fanned out to every configured sink without mutation.
/// Serializes to the wire payload
/// `{"timestamp": <RFC 3339>, "metric": <name>, "value": <number>}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// UTC instant of the successful decode.
    pub timestamp: DateTime<Utc>,

    /// Stable metric identifier, used as topic suffix and log column.
    pub metric: String,

    /// Engineering value after scaling.
    pub value: f64,
}

impl Sample {
    /// Create a sample stamped with the current UTC time.
    pub fn now(metric: impl Into<String>, value: f64) -> Self {
        Self {
            timestamp: Utc::now(),
            metric: metric.into(),
            value,
        }
    }
}
