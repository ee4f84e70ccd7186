//! Collector entry point.
//!
//! Wires configuration, sinks, fan-out and one poller task per device, then
//! runs until Ctrl+C. Shutdown lets each poller finish its in-flight read and
//! the fan-out drain queued samples before sinks are closed.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tokio::sync::{mpsc, watch};
use tracing::info;

use pvlog::config::CollectorConfig;
use pvlog::fanout::{SAMPLE_CHANNEL_CAPACITY, SinkFanout};
use pvlog::poller::DevicePoller;
use pvlog::sink::{CsvSink, MqttSink, Sink};
use pvlog::transport::ModbusTcpTransport;

/// Polls PV inverters over Modbus TCP and fans out telemetry to MQTT and CSV.
#[derive(Parser, Debug)]
#[command(name = "pvlog")]
#[command(about = "Polls PV inverters and fans out telemetry to MQTT and CSV")]
#[command(version)]
struct Args {
    /// Path to configuration file (JSON5 format)
    #[arg(short, long, default_value = "pvlog.json5")]
    config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = CollectorConfig::load_from_file(&args.config)
        .with_context(|| format!("Failed to load config from {:?}", args.config))?;

    let mut logging = config.logging.clone();
    if let Some(level) = &args.log_level {
        logging.level = level.clone();
    }
    pvlog::init_tracing(&logging).context("Failed to initialize logging")?;

    info!("Starting pvlog");
    info!("Loaded configuration from {:?}", args.config);

    // Bring up sinks first; a sink that cannot start is fatal at startup.
    let mut sinks: Vec<Box<dyn Sink>> = Vec::new();
    if config.mqtt.enabled {
        let sink = MqttSink::connect(&config.mqtt)
            .await
            .context("Failed to connect MQTT sink")?;
        sinks.push(Box::new(sink));
    }
    if config.csv.enabled {
        let sink = CsvSink::open(&config.csv).context("Failed to open CSV sink")?;
        sinks.push(Box::new(sink));
    }

    let (sample_tx, sample_rx) = mpsc::channel(SAMPLE_CHANNEL_CAPACITY);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let fanout = tokio::spawn(SinkFanout::new(sinks).run(sample_rx));

    let mut pollers = Vec::new();
    for device in &config.devices {
        let transport = ModbusTcpTransport::new(device);
        let poller = DevicePoller::new(
            device.clone(),
            transport,
            sample_tx.clone(),
            shutdown_rx.clone(),
        );
        pollers.push(tokio::spawn(poller.run()));
    }
    // The fan-out stops once every poller has dropped its sender.
    drop(sample_tx);

    info!(devices = config.devices.len(), "Collector running");

    tokio::signal::ctrl_c().await?;
    info!("Received shutdown signal");

    let _ = shutdown_tx.send(true);
    for poller in pollers {
        let _ = poller.await;
    }
    let _ = fanout.await;

    info!("Collector stopped");
    Ok(())
}
