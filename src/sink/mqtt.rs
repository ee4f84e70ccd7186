//! MQTT message-bus sink.

use async_trait::async_trait;
use rumqttc::{
    AsyncClient, ConnectReturnCode, Event, MqttOptions, Packet, QoS, TlsConfiguration, Transport,
};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{Sink, SinkError};
use crate::config::MqttConfig;
use crate::sample::Sample;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Publishes each sample as a JSON payload to `base_topic + metric`.
///
/// `emit` only enqueues onto the client's internal queue; the spawned event
/// loop task performs the actual network I/O and reconnects on its own if the
/// broker connection drops mid-run.
pub struct MqttSink {
    client: AsyncClient,
    base_topic: String,
    qos: QoS,
    driver: JoinHandle<()>,
}

impl MqttSink {
    /// Connect to the broker and wait for its acknowledgment.
    ///
    /// An unreachable broker or refused credentials fail here, at startup,
    /// rather than silently dropping every publish later.
    pub async fn connect(config: &MqttConfig) -> Result<Self, SinkError> {
        let mut options = MqttOptions::new(&config.client_id, &config.broker, config.port);
        options.set_keep_alive(Duration::from_secs(30));

        if let (Some(user), Some(pass)) = (&config.username, &config.password) {
            options.set_credentials(user, pass);
        }

        if config.tls.enabled {
            let ca_path = config
                .tls
                .ca_cert
                .as_ref()
                .ok_or_else(|| SinkError::Connect("tls.ca_cert not set".to_string()))?;
            let ca = std::fs::read(ca_path)?;

            let client_auth = match (&config.tls.client_cert, &config.tls.client_key) {
                (Some(cert), Some(key)) => Some((std::fs::read(cert)?, std::fs::read(key)?)),
                _ => None,
            };

            options.set_transport(Transport::Tls(TlsConfiguration::Simple {
                ca,
                alpn: None,
                client_auth,
            }));
        }

        let (client, mut eventloop) = AsyncClient::new(options, 64);

        let acked = tokio::time::timeout(CONNECT_TIMEOUT, async {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                        if ack.code == ConnectReturnCode::Success {
                            return Ok(());
                        }
                        return Err(SinkError::Connect(format!(
                            "Broker refused connection: {:?}",
                            ack.code
                        )));
                    }
                    Ok(_) => {}
                    Err(e) => return Err(SinkError::Connect(e.to_string())),
                }
            }
        })
        .await;

        match acked {
            Err(_) => {
                return Err(SinkError::Connect(
                    "Broker did not acknowledge in time".to_string(),
                ));
            }
            Ok(Err(e)) => return Err(e),
            Ok(Ok(())) => {}
        }

        info!(broker = %config.broker, port = config.port, "Connected to MQTT broker");

        let driver = tokio::spawn(async move {
            loop {
                match eventloop.poll().await {
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "MQTT connection lost, retrying");
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                }
            }
        });

        let qos = match config.qos {
            2 => QoS::ExactlyOnce,
            1 => QoS::AtLeastOnce,
            _ => QoS::AtMostOnce,
        };

        Ok(Self {
            client,
            base_topic: config.base_topic.clone(),
            qos,
            driver,
        })
    }
}

#[async_trait]
impl Sink for MqttSink {
    fn name(&self) -> &'static str {
        "mqtt"
    }

    async fn emit(&mut self, sample: &Sample) -> Result<(), SinkError> {
        let topic = format!("{}{}", self.base_topic, sample.metric);
        let payload = serde_json::to_vec(sample)?;

        self.client
            .publish(topic.as_str(), self.qos, false, payload)
            .await
            .map_err(|e| SinkError::Publish(format!("{}: {}", topic, e)))?;

        debug!(topic = %topic, value = sample.value, "Published");
        Ok(())
    }

    async fn close(&mut self) {
        if let Err(e) = self.client.disconnect().await {
            debug!(error = %e, "MQTT disconnect failed");
        }
        self.driver.abort();
    }
}
