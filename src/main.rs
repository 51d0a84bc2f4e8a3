//! Conveyor gateway - laser profile sensor ingestion service
//!
//! Receives telemetry frames over UDP, aggregates volume and velocity per
//! flush window, persists one record per window and publishes alignment
//! alerts over MQTT.
//!
//! Module structure:
//! - `domain/` - Core types (Reading, AlignmentZone, MetricsRecord)
//! - `io/` - External interfaces (UDP, frame codec, persistence, alerts, capture)
//! - `services/` - Business logic (accumulator, debouncer, monitor, ingestion)
//! - `infra/` - Infrastructure (Config, IngestMetrics)

use anyhow::Context;
use clap::Parser;
use conveyor_gateway::infra::{Config, IngestMetrics};
use conveyor_gateway::io::{
    build_persistence_sink, create_alert_channel, AlertSink, LogAlertSink, MqttAlertPublisher,
};
use conveyor_gateway::services::{create_flush_worker, IngestionLoop};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Alert queue depth; alerts are rare, a backlog means the broker is gone
const ALERT_QUEUE_CAPACITY: usize = 32;

/// How long to wait for queued records to reach the sink at shutdown
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Conveyor gateway - laser profile sensor ingestion
#[derive(Parser, Debug)]
#[command(name = "conveyor-gateway", version, about)]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "config/dev.toml")]
    config: String,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,
}

fn init_logging(json: bool) {
    // Default: INFO, use RUST_LOG=debug for per-datagram visibility
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.log_json);

    info!(revision = env!("GATEWAY_REVISION"), "conveyor-gateway starting");

    let config = Config::load_from_path(&args.config);
    info!(
        config_file = %config.config_file(),
        site = %config.site_id(),
        udp_bind = %config.udp_bind_address(),
        flush_interval_secs = config.flush_interval().as_secs(),
        distance_band_mm = ?config.distance_band_mm(),
        sampling = ?config.alignment_sampling(),
        mqtt_enabled = config.mqtt_enabled(),
        persistence = ?config.persistence_backend(),
        capture = config.capture_enabled(),
        "config_loaded"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let metrics = Arc::new(IngestMetrics::new());

    // Start metrics reporter (lock-free reads with full summary)
    let metrics_clone = metrics.clone();
    let metrics_interval = config.metrics_interval_secs().max(1);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(metrics_interval));
        // First tick completes immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            metrics_clone.report().log();
        }
    });

    // Alerts: MQTT publisher actor, or the log when MQTT is disabled
    let (alerts, publisher_handle) = if config.mqtt_enabled() {
        let (alert_sender, alert_rx) = create_alert_channel(ALERT_QUEUE_CAPACITY);
        let publisher = MqttAlertPublisher::new(&config, alert_rx, metrics.clone());
        let handle = tokio::spawn(publisher.run(shutdown_rx.clone()));
        (Arc::new(alert_sender) as Arc<dyn AlertSink>, Some(handle))
    } else {
        info!("mqtt_disabled_alerts_to_log");
        (Arc::new(LogAlertSink) as Arc<dyn AlertSink>, None)
    };

    let sink = build_persistence_sink(&config).await.context("Failed to build persistence sink")?;
    let (flush_sender, flush_worker) =
        create_flush_worker(sink, metrics.clone(), config.flush_queue_capacity());
    let worker_handle = tokio::spawn(flush_worker.run());

    // Handle shutdown on Ctrl+C
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        let _ = shutdown_tx.send(true);
    });

    let ingestion = IngestionLoop::new(config, flush_sender, alerts, metrics.clone());
    ingestion.run(shutdown_rx).await.context("UDP ingestion failed")?;

    // Ingestion dropped its sender; the worker exits once the queue drains
    if tokio::time::timeout(DRAIN_TIMEOUT, worker_handle).await.is_err() {
        warn!("flush_worker_drain_timeout");
    }
    if let Some(handle) = publisher_handle {
        if tokio::time::timeout(DRAIN_TIMEOUT, handle).await.is_err() {
            warn!("alert_publisher_drain_timeout");
        }
    }

    metrics.report().log();
    info!("conveyor-gateway shutdown complete");
    Ok(())
}
