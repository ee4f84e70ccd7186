//! Integration tests for pvlog.
//!
//! Drive the public pipeline end to end with a scripted transport: poller
//! tasks decode register words into samples, the channel carries them to the
//! fan-out, and every sink sees every sample.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};

use pvlog::config::{CsvConfig, DeviceConfig, RegisterSpec, RegisterTable};
use pvlog::decode::Encoding;
use pvlog::fanout::{SAMPLE_CHANNEL_CAPACITY, SinkFanout};
use pvlog::poller::DevicePoller;
use pvlog::sample::Sample;
use pvlog::sink::{CsvSink, Sink, SinkError};
use pvlog::transport::{RegisterTransport, TransportError};

/// Transport answering from a canned address-to-words map.
struct ScriptedTransport {
    responses: HashMap<u16, Vec<u16>>,
    connected: bool,
    refuse_connect: bool,
}

impl ScriptedTransport {
    fn new(responses: HashMap<u16, Vec<u16>>) -> Self {
        Self {
            responses,
            connected: false,
            refuse_connect: false,
        }
    }

    fn refusing() -> Self {
        Self {
            responses: HashMap::new(),
            connected: false,
            refuse_connect: true,
        }
    }
}

#[async_trait]
impl RegisterTransport for ScriptedTransport {
    async fn connect(&mut self) -> Result<(), TransportError> {
        if self.refuse_connect {
            return Err(TransportError::Connect("connection refused".to_string()));
        }
        self.connected = true;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn read_words(
        &mut self,
        _table: RegisterTable,
        address: u16,
        _count: u16,
    ) -> Result<Vec<u16>, TransportError> {
        self.responses
            .get(&address)
            .cloned()
            .ok_or_else(|| TransportError::Read(format!("no response at {}", address)))
    }

    async fn close(&mut self) {
        self.connected = false;
    }
}

/// Sink that records everything it is handed, optionally failing each emit.
struct RecordingSink {
    received: Arc<Mutex<Vec<Sample>>>,
    closed: Arc<Mutex<bool>>,
    fail: bool,
}

impl RecordingSink {
    fn new(fail: bool) -> (Self, Arc<Mutex<Vec<Sample>>>, Arc<Mutex<bool>>) {
        let received = Arc::new(Mutex::new(Vec::new()));
        let closed = Arc::new(Mutex::new(false));
        (
            Self {
                received: received.clone(),
                closed: closed.clone(),
                fail,
            },
            received,
            closed,
        )
    }
}

#[async_trait]
impl Sink for RecordingSink {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn emit(&mut self, sample: &Sample) -> Result<(), SinkError> {
        self.received.lock().unwrap().push(sample.clone());
        if self.fail {
            Err(SinkError::Publish("broker unreachable".to_string()))
        } else {
            Ok(())
        }
    }

    async fn close(&mut self) {
        *self.closed.lock().unwrap() = true;
    }
}

fn inverter(name: &str, registers: Vec<RegisterSpec>) -> DeviceConfig {
    DeviceConfig {
        name: name.to_string(),
        host: "127.0.0.1".to_string(),
        port: 502,
        unit_id: 1,
        poll_interval_secs: 1,
        timeout_ms: 100,
        registers,
    }
}

fn register(address: u16, metric: &str, encoding: Encoding) -> RegisterSpec {
    RegisterSpec {
        address,
        metric: metric.to_string(),
        table: RegisterTable::Input,
        encoding,
        scale: 1.0,
    }
}

async fn wait_for<F: Fn() -> bool>(condition: F) {
    for _ in 0..1000 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

/// A device with a U16 and an S32 register produces both samples, and every
/// sink receives both even though the first sink fails each emit.
#[tokio::test(start_paused = true)]
async fn test_end_to_end_register_map_to_all_sinks() {
    let registers = vec![
        register(5016, "solar/inverter1/powerWatt", Encoding::U16),
        register(13009, "solar/grid/exportWatt", Encoding::S32),
    ];
    let responses = HashMap::from([(5016, vec![1200]), (13009, vec![0, 300])]);

    let (failing, failing_received, _) = RecordingSink::new(true);
    let (healthy, healthy_received, healthy_closed) = RecordingSink::new(false);

    let (tx, rx) = mpsc::channel(SAMPLE_CHANNEL_CAPACITY);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let fanout = tokio::spawn(
        SinkFanout::new(vec![Box::new(failing), Box::new(healthy)]).run(rx),
    );

    let poller = DevicePoller::new(
        inverter("inverter1", registers),
        ScriptedTransport::new(responses),
        tx,
        shutdown_rx,
    );
    let poller = tokio::spawn(poller.run());

    {
        let healthy_received = healthy_received.clone();
        wait_for(move || healthy_received.lock().unwrap().len() >= 2).await;
    }

    shutdown_tx.send(true).unwrap();
    poller.await.unwrap();
    fanout.await.unwrap();

    let samples = healthy_received.lock().unwrap();
    assert_eq!(samples[0].metric, "solar/inverter1/powerWatt");
    assert_eq!(samples[0].value, 1200.0);
    assert_eq!(samples[1].metric, "solar/grid/exportWatt");
    assert_eq!(samples[1].value, 300.0);

    // The failing sink still received every sample.
    assert!(failing_received.lock().unwrap().len() >= 2);

    // Sinks were closed after the channel drained.
    assert!(*healthy_closed.lock().unwrap());
}

/// An endpoint that cannot connect never blocks a healthy endpoint's samples.
#[tokio::test(start_paused = true)]
async fn test_unreachable_device_does_not_block_others() {
    let healthy_registers = vec![register(5016, "solar/inverter1/powerWatt", Encoding::U16)];
    let dead_registers = vec![register(5016, "solar/inverter2/powerWatt", Encoding::U16)];

    let (sink, received, _) = RecordingSink::new(false);

    let (tx, rx) = mpsc::channel(SAMPLE_CHANNEL_CAPACITY);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let fanout = tokio::spawn(SinkFanout::new(vec![Box::new(sink)]).run(rx));

    let healthy = DevicePoller::new(
        inverter("inverter1", healthy_registers),
        ScriptedTransport::new(HashMap::from([(5016, vec![1200])])),
        tx.clone(),
        shutdown_rx.clone(),
    );
    let dead = DevicePoller::new(
        inverter("inverter2", dead_registers),
        ScriptedTransport::refusing(),
        tx,
        shutdown_rx,
    );

    let healthy = tokio::spawn(healthy.run());
    let dead = tokio::spawn(dead.run());

    {
        let received = received.clone();
        wait_for(move || received.lock().unwrap().len() >= 3).await;
    }

    shutdown_tx.send(true).unwrap();
    healthy.await.unwrap();
    dead.await.unwrap();
    fanout.await.unwrap();

    let samples = received.lock().unwrap();
    assert!(samples.len() >= 3);
    assert!(samples.iter().all(|s| s.metric == "solar/inverter1/powerWatt"));
}

/// Quirk encodings flow through the whole pipeline with their thresholds.
#[tokio::test(start_paused = true)]
async fn test_quirk_encodings_end_to_end() {
    let registers = vec![
        register(
            13009,
            "solar/grid/exportWatt",
            Encoding::WraparoundSigned(50000),
        ),
        register(
            13033,
            "solar/grid/usedPower",
            Encoding::ClampedUnsigned(50000),
        ),
    ];
    let responses = HashMap::from([(13009, vec![60000]), (13033, vec![60000])]);

    let (sink, received, _) = RecordingSink::new(false);

    let (tx, rx) = mpsc::channel(SAMPLE_CHANNEL_CAPACITY);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let fanout = tokio::spawn(SinkFanout::new(vec![Box::new(sink)]).run(rx));
    let poller = DevicePoller::new(
        inverter("inverter1", registers),
        ScriptedTransport::new(responses),
        tx,
        shutdown_rx,
    );
    let poller = tokio::spawn(poller.run());

    {
        let received = received.clone();
        wait_for(move || received.lock().unwrap().len() >= 2).await;
    }

    shutdown_tx.send(true).unwrap();
    poller.await.unwrap();
    fanout.await.unwrap();

    let samples = received.lock().unwrap();
    assert_eq!(samples[0].value, -5535.0);
    assert_eq!(samples[1].value, 0.0);
}

/// Samples reaching the fan-out land in the CSV file below the single header.
#[tokio::test]
async fn test_csv_sink_through_fanout() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("samples.csv");

    let csv_sink = CsvSink::open(&CsvConfig {
        enabled: true,
        path: path.clone(),
    })
    .unwrap();

    let (tx, rx) = mpsc::channel(SAMPLE_CHANNEL_CAPACITY);
    let fanout = tokio::spawn(SinkFanout::new(vec![Box::new(csv_sink)]).run(rx));

    tx.send(Sample::now("solar/inverter1/powerWatt", 1200.0))
        .await
        .unwrap();
    tx.send(Sample::now("solar/battery/levelPercent", 95.5))
        .await
        .unwrap();
    drop(tx);
    fanout.await.unwrap();

    let content = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines[0], "timestamp,metric,value");
    assert!(lines[1].contains("solar/inverter1/powerWatt,1200"));
    assert!(lines[2].contains("solar/battery/levelPercent,95.5"));
}
