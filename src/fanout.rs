//! Sample fan-out.
//!
//! A single task owns every sink and drains the sample channel fed by the
//! device pollers. Each sample goes to each sink exactly once; one sink
//! failing never stops the others from receiving it.

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::sample::Sample;
use crate::sink::Sink;

/// Capacity of the channel carrying samples from pollers to the fan-out.
pub const SAMPLE_CHANNEL_CAPACITY: usize = 256;

/// Dispatches each incoming sample to every configured sink.
pub struct SinkFanout {
    sinks: Vec<Box<dyn Sink>>,
}

impl SinkFanout {
    pub fn new(sinks: Vec<Box<dyn Sink>>) -> Self {
        Self { sinks }
    }

    /// Deliver one sample to every sink.
    ///
    /// A failing sink is reported and skipped; the remaining sinks still
    /// receive the sample.
    pub async fn dispatch(&mut self, sample: &Sample) {
        for sink in &mut self.sinks {
            if let Err(e) = sink.emit(sample).await {
                warn!(
                    sink = sink.name(),
                    metric = %sample.metric,
                    error = %e,
                    "Sink emit failed"
                );
            }
        }
    }

    /// Receive samples until every poller has dropped its sender, then close
    /// the sinks. Samples already queued at shutdown are still delivered.
    pub async fn run(mut self, mut rx: mpsc::Receiver<Sample>) {
        info!(sinks = self.sinks.len(), "Sink fan-out running");

        while let Some(sample) = rx.recv().await {
            self.dispatch(&sample).await;
        }

        for sink in &mut self.sinks {
            sink.close().await;
        }

        info!("Sink fan-out stopped");
    }
}
