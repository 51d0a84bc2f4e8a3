//! End-to-end ingestion over loopback UDP

use conveyor_gateway::domain::{AlignmentZone, SensorFrame};
use conveyor_gateway::infra::{AlignmentSampling, Config, IngestMetrics};
use conveyor_gateway::io::{encode_frame, AlertSink, DatagramReceiver, JsonlMetricsSink, SinkError};
use conveyor_gateway::services::{create_flush_worker, IngestionLoop};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::tempdir;
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tokio::task::JoinHandle;

#[derive(Default)]
struct RecordingAlerts {
    messages: Mutex<Vec<String>>,
}

impl AlertSink for RecordingAlerts {
    fn publish(&self, message: &str) -> Result<(), SinkError> {
        self.messages.lock().unwrap().push(message.to_string());
        Ok(())
    }
}

struct Harness {
    target: SocketAddr,
    sender: UdpSocket,
    shutdown: watch::Sender<bool>,
    ingestion: JoinHandle<()>,
    worker: JoinHandle<()>,
    alerts: Arc<RecordingAlerts>,
    metrics: Arc<IngestMetrics>,
}

impl Harness {
    async fn start(config: Config, metrics_file: &std::path::Path) -> Self {
        let metrics = Arc::new(IngestMetrics::new());
        let alerts = Arc::new(RecordingAlerts::default());
        let sink = Arc::new(JsonlMetricsSink::new(metrics_file));
        let (flush, worker) = create_flush_worker(sink, metrics.clone(), 16);
        let worker = tokio::spawn(worker.run());

        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let receiver =
            DatagramReceiver::from_socket(socket, 1024, Duration::from_millis(10), metrics.clone());
        let target = receiver.local_addr().unwrap();

        let (shutdown, shutdown_rx) = watch::channel(false);
        let ingestion = IngestionLoop::new(config, flush, alerts.clone(), metrics.clone());
        let ingestion = tokio::spawn(ingestion.run_with_receiver(receiver, shutdown_rx));

        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        Self { target, sender, shutdown, ingestion, worker, alerts, metrics }
    }

    async fn send(&self, frame: &SensorFrame) {
        self.sender.send_to(&encode_frame(frame), self.target).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    async fn stop(self) -> (Vec<String>, Arc<IngestMetrics>) {
        self.shutdown.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(2), self.ingestion).await.unwrap().unwrap();
        tokio::time::timeout(Duration::from_secs(2), self.worker).await.unwrap().unwrap();
        let messages = self.alerts.messages.lock().unwrap().clone();
        (messages, self.metrics)
    }
}

fn frame(pulse: u32, right_align: f32, left_align: f32, distance: f32) -> SensorFrame {
    SensorFrame { area: 500.0, right_align, left_align, profile_count: 0, pulse_count: pulse, distance }
}

fn read_records(path: &std::path::Path) -> Vec<serde_json::Value> {
    std::fs::read_to_string(path)
        .unwrap_or_default()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect()
}

#[tokio::test]
async fn test_stream_is_flushed_to_jsonl() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("metrics.jsonl");
    let config = Config::default().with_flush_interval(Duration::from_millis(150));
    let harness = Harness::start(config, &file).await;

    for k in 0..40u32 {
        harness.send(&frame(1000 + 50 * k, 1.0, -1.0, 50.0)).await;
    }
    // One out-of-band frame and one malformed datagram, both tolerated
    harness.send(&frame(1000 + 50 * 40, 90.0, 90.0, 80.0)).await;
    harness.sender.send_to(&[1, 2, 3], harness.target).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let (messages, metrics) = harness.stop().await;

    let records = read_records(&file);
    assert!(!records.is_empty(), "at least one window flushed");
    assert_eq!(records.len() as u64, metrics.records_flushed_total());
    for record in &records {
        assert!(record["velocity"].as_f64().unwrap() > 0.0);
        assert!(record["volume"].as_f64().unwrap() > 0.0);
        assert_eq!(record["right_align"], 0.1);
        assert_eq!(record["left_align"], -0.1);
        assert!(record["timestamp"].is_string());
    }
    assert_eq!(metrics.malformed_total(), 1);
    assert_eq!(metrics.datagrams_total(), 42);

    // Only the bootstrap announcement; the belt never left center
    assert_eq!(messages, vec![AlignmentZone::Centered.initial_message().to_string()]);
}

#[tokio::test]
async fn test_drift_raises_one_alert() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("metrics.jsonl");
    let config = Config::default()
        .with_alignment_sampling(AlignmentSampling::Reading)
        .with_announce_initial(false);
    let harness = Harness::start(config, &file).await;

    harness.send(&frame(0, 1.0, -1.0, 50.0)).await;
    // Belt moves far right: center = (25 + 5) / 20 = 1.5
    for k in 1..=6u32 {
        harness.send(&frame(k * 50, 25.0, 5.0, 50.0)).await;
    }
    // Out-of-band readings claiming the belt is back are ignored
    for k in 7..=10u32 {
        harness.send(&frame(k * 50, 0.0, 0.0, 30.0)).await;
    }

    let (messages, _metrics) = harness.stop().await;
    assert_eq!(messages, vec![AlignmentZone::FarRight.transition_message().to_string()]);
}
