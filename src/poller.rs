//! Device polling and sample production.
//!
//! One [`DevicePoller`] task runs per configured device, so a stalled device
//! never holds up the others. Decoded samples go over the shared channel to
//! the sink fan-out.

use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::config::DeviceConfig;
use crate::decode::decode;
use crate::sample::Sample;
use crate::transport::RegisterTransport;

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Polls one device on a fixed cadence.
pub struct DevicePoller<T: RegisterTransport> {
    device: DeviceConfig,
    transport: T,
    tx: mpsc::Sender<Sample>,
    shutdown: watch::Receiver<bool>,
}

impl<T: RegisterTransport> DevicePoller<T> {
    pub fn new(
        device: DeviceConfig,
        transport: T,
        tx: mpsc::Sender<Sample>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            device,
            transport,
            tx,
            shutdown,
        }
    }

    /// Run the poll loop until shutdown is signalled.
    ///
    /// Timing is fixed-delay: the full poll interval elapses between the end
    /// of one cycle and the start of the next, so total cycle spacing is
    /// interval plus read latency. Connect failures back off exponentially
    /// (capped) instead of tearing the process down.
    pub async fn run(mut self) {
        let interval = Duration::from_secs(self.device.poll_interval_secs);
        let mut backoff = INITIAL_BACKOFF;

        info!(
            device = %self.device.name,
            host = %self.device.host,
            interval_secs = self.device.poll_interval_secs,
            registers = self.device.registers.len(),
            "Starting poller"
        );

        loop {
            if *self.shutdown.borrow() {
                break;
            }

            if !self.transport.is_connected() {
                match self.transport.connect().await {
                    Ok(()) => {
                        info!(device = %self.device.name, "Device connected");
                        backoff = INITIAL_BACKOFF;
                    }
                    Err(e) => {
                        warn!(
                            device = %self.device.name,
                            error = %e,
                            retry_in = ?backoff,
                            "Connect failed"
                        );
                        if self.wait(backoff).await {
                            break;
                        }
                        backoff = (backoff * 2).min(MAX_BACKOFF);
                        continue;
                    }
                }
            }

            let published = self.poll_cycle().await;
            debug!(device = %self.device.name, samples = published, "Cycle complete");

            if self.wait(interval).await {
                break;
            }
        }

        self.transport.close().await;
        info!(device = %self.device.name, "Poller stopped");
    }

    /// One pass over the declared registers, in order.
    ///
    /// A read or decode failure is reported and scoped to that register; the
    /// rest of the cycle proceeds. Nothing is retried until the next cycle.
    async fn poll_cycle(&mut self) -> usize {
        let mut published = 0;

        for spec in &self.device.registers {
            if *self.shutdown.borrow() {
                break;
            }

            let words = match self
                .transport
                .read_words(spec.table, spec.address, spec.word_count())
                .await
            {
                Ok(words) => words,
                Err(e) => {
                    warn!(
                        device = %self.device.name,
                        metric = %spec.metric,
                        address = spec.address,
                        error = %e,
                        "Read failed"
                    );
                    continue;
                }
            };

            let value = match decode(&words, spec.encoding, spec.scale) {
                Ok(value) => value,
                Err(e) => {
                    warn!(
                        device = %self.device.name,
                        metric = %spec.metric,
                        address = spec.address,
                        error = %e,
                        "Decode failed"
                    );
                    continue;
                }
            };

            debug!(
                device = %self.device.name,
                metric = %spec.metric,
                address = spec.address,
                value,
                "Decoded"
            );

            let sample = Sample::now(spec.metric.as_str(), value);
            if self.tx.send(sample).await.is_err() {
                // The fan-out is gone; there is nowhere left to deliver.
                warn!(device = %self.device.name, "Sample channel closed");
                break;
            }
            published += 1;
        }

        published
    }

    /// Sleep for `duration`, returning `true` if shutdown arrived first.
    async fn wait(&mut self, duration: Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(duration) => false,
            _ = self.shutdown.changed() => true,
        }
    }
}
