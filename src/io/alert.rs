//! Alignment alert delivery
//!
//! Alerts are short human-readable texts. The ingestion loop hands them to an
//! `AlertSink` without blocking; the MQTT publisher actor drains the channel
//! and publishes each text to the alert topic with QoS 0.

use crate::domain::types::epoch_ms;
use crate::infra::config::Config;
use crate::infra::metrics::IngestMetrics;
use crate::io::error::SinkError;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// Best-effort destination for alert texts
pub trait AlertSink: Send + Sync {
    fn publish(&self, message: &str) -> Result<(), SinkError>;
}

/// An alert queued for publishing
#[derive(Debug, Clone)]
pub struct AlertMessage {
    pub text: String,
    /// Enqueue time (epoch ms)
    pub ts: u64,
}

/// Sender handle for alerts
///
/// Non-blocking - if the channel is full, the alert is rejected.
#[derive(Clone)]
pub struct AlertSender {
    tx: mpsc::Sender<AlertMessage>,
}

impl AlertSender {
    pub fn new(tx: mpsc::Sender<AlertMessage>) -> Self {
        Self { tx }
    }
}

impl AlertSink for AlertSender {
    fn publish(&self, message: &str) -> Result<(), SinkError> {
        let alert = AlertMessage { text: message.to_string(), ts: epoch_ms() };
        match self.tx.try_send(alert) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(SinkError::Unavailable("alert queue full".into())),
            Err(TrySendError::Closed(_)) => {
                Err(SinkError::Unavailable("alert publisher stopped".into()))
            }
        }
    }
}

/// Create a new alert channel pair
pub fn create_alert_channel(buffer_size: usize) -> (AlertSender, mpsc::Receiver<AlertMessage>) {
    let (tx, rx) = mpsc::channel(buffer_size);
    (AlertSender::new(tx), rx)
}

/// Alert sink used when MQTT is disabled: alerts only reach the log
pub struct LogAlertSink;

impl AlertSink for LogAlertSink {
    fn publish(&self, message: &str) -> Result<(), SinkError> {
        info!(message = %message, "alert");
        Ok(())
    }
}

/// MQTT publisher actor
///
/// Receives alerts from the channel and publishes them to the alert topic.
pub struct MqttAlertPublisher {
    client: AsyncClient,
    rx: mpsc::Receiver<AlertMessage>,
    topic: String,
    metrics: Arc<IngestMetrics>,
}

impl MqttAlertPublisher {
    /// Create a new MQTT publisher
    ///
    /// Connects to the broker at the configured MQTT host/port.
    pub fn new(config: &Config, rx: mpsc::Receiver<AlertMessage>, metrics: Arc<IngestMetrics>) -> Self {
        let client_id = format!("{}-{}", config.mqtt_client_id(), std::process::id());
        let mut mqttoptions = MqttOptions::new(client_id, config.mqtt_host(), config.mqtt_port());
        mqttoptions.set_keep_alive(Duration::from_secs(30));
        mqttoptions.set_clean_session(true);

        // Set credentials if configured
        if let (Some(username), Some(password)) = (config.mqtt_username(), config.mqtt_password()) {
            mqttoptions.set_credentials(username, password);
        }

        let (client, eventloop) = AsyncClient::new(mqttoptions, 32);

        // Spawn the eventloop handler
        tokio::spawn(async move {
            let mut eventloop = eventloop;
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!("mqtt_alert_connected");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "mqtt_alert_connection_error");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        });

        Self { client, rx, topic: config.mqtt_topic().to_string(), metrics }
    }

    /// Run the publisher loop until shutdown
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(topic = %self.topic, "mqtt_alert_publisher_started");

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("mqtt_alert_publisher_shutdown");
                        // Drain remaining alerts
                        while let Ok(alert) = self.rx.try_recv() {
                            self.publish_alert(alert).await;
                        }
                        return;
                    }
                }
                maybe_alert = self.rx.recv() => {
                    match maybe_alert {
                        Some(alert) => self.publish_alert(alert).await,
                        None => return,
                    }
                }
            }
        }
    }

    async fn publish_alert(&self, alert: AlertMessage) {
        match self
            .client
            .publish(&self.topic, QoS::AtMostOnce, false, alert.text.as_bytes().to_vec())
            .await
        {
            Ok(()) => {
                self.metrics.record_alert_published();
                debug!(topic = %self.topic, queued_ms = epoch_ms().saturating_sub(alert.ts), "alert_published");
            }
            Err(e) => {
                self.metrics.record_alert_failed();
                warn!(error = %e, text = %alert.text, "alert_publish_failed");
            }
        }
    }
}
