//! Ingestion loop - receive, decode, aggregate, dispatch
//!
//! Sequence:
//! 1. wait out the startup delay (link establishment)
//! 2. bind the UDP socket, retrying until it succeeds
//! 3. bootstrap the monitor from the first decodable datagram and announce
//!    the initial zone
//! 4. feed every further datagram to the monitor; hand records to the flush
//!    worker and alerts to the alert sink, neither of which blocks
//!
//! Runs until shutdown. The window in progress at shutdown is not flushed.

use crate::domain::types::Reading;
use crate::infra::config::Config;
use crate::infra::metrics::IngestMetrics;
use crate::io::alert::AlertSink;
use crate::io::capture::CaptureLogger;
use crate::io::frame::decode_frame;
use crate::io::udp::{Datagram, DatagramReceiver, UdpError};
use crate::services::accumulator::Contribution;
use crate::services::flush_worker::FlushSender;
use crate::services::monitor::{ConveyorMonitor, ReadingOutcome};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

pub struct IngestionLoop {
    config: Config,
    flush: FlushSender,
    alerts: Arc<dyn AlertSink>,
    metrics: Arc<IngestMetrics>,
    capture: Option<CaptureLogger>,
}

impl IngestionLoop {
    pub fn new(
        config: Config,
        flush: FlushSender,
        alerts: Arc<dyn AlertSink>,
        metrics: Arc<IngestMetrics>,
    ) -> Self {
        let capture = config
            .capture_enabled()
            .then(|| CaptureLogger::new(config.capture_dir(), config.site_id()));
        Self { config, flush, alerts, metrics, capture }
    }

    /// Startup delay, bind, then ingest until shutdown
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<(), UdpError> {
        let delay = self.config.startup_delay();
        if !delay.is_zero() {
            info!(delay_secs = delay.as_secs(), "startup_delay");
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = wait_for_shutdown(&mut shutdown) => {
                    info!("ingestion_shutdown_during_startup");
                    return Ok(());
                }
            }
        }

        let receiver =
            match DatagramReceiver::bind(&self.config, self.metrics.clone(), &mut shutdown).await {
                Ok(receiver) => receiver,
                Err(UdpError::Shutdown) => return Ok(()),
                Err(e) => return Err(e),
            };

        self.run_with_receiver(receiver, shutdown).await;
        Ok(())
    }

    /// Ingest from an already bound receiver until shutdown
    pub async fn run_with_receiver(
        mut self,
        mut receiver: DatagramReceiver,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!(site = %self.config.site_id(), "ingestion_waiting_for_first_frame");

        let mut monitor = loop {
            tokio::select! {
                _ = wait_for_shutdown(&mut shutdown) => {
                    info!("ingestion_shutdown_before_bootstrap");
                    return;
                }
                datagram = receiver.recv() => {
                    if let Some(reading) = self.decode(&datagram) {
                        break ConveyorMonitor::bootstrap(&self.config, &reading);
                    }
                }
            }
        };

        if self.config.announce_initial() {
            self.publish_alert(monitor.confirmed_zone().initial_message());
        }

        info!(
            flush_interval_ms = self.config.flush_interval().as_millis() as u64,
            sampling = ?self.config.alignment_sampling(),
            "ingestion_loop_started"
        );

        loop {
            tokio::select! {
                _ = wait_for_shutdown(&mut shutdown) => {
                    info!(pending_samples = monitor.accumulator().samples(), "ingestion_loop_shutdown");
                    return;
                }
                datagram = receiver.recv() => {
                    if let Some(reading) = self.decode(&datagram) {
                        let outcome = monitor.process(&reading);
                        self.dispatch(outcome);
                    }
                }
            }
        }
    }

    /// Decode a datagram, capturing it if enabled; malformed frames are dropped
    fn decode(&mut self, datagram: &Datagram) -> Option<Reading> {
        let decoded = decode_frame(&datagram.payload);

        if let Some(capture) = self.capture.as_mut() {
            capture.log_datagram(datagram.peer, &datagram.payload, decoded.as_ref());
        }

        match decoded {
            Ok(frame) => Some(frame.into_reading(datagram.received_at)),
            Err(e) => {
                self.metrics.record_malformed();
                warn!(peer = %datagram.peer, error = %e, "frame_dropped");
                None
            }
        }
    }

    fn dispatch(&self, outcome: ReadingOutcome) {
        match outcome.contribution {
            Contribution::Duplicate => self.metrics.record_duplicate_pulse(),
            Contribution::OutOfOrder => self.metrics.record_out_of_order(),
            Contribution::Accumulated { .. } | Contribution::CounterReset => {}
        }
        if !outcome.alignment_trusted {
            self.metrics.record_out_of_band();
        }

        if let Some(transition) = outcome.transition {
            self.metrics.record_transition();
            self.publish_alert(transition.message());
        }

        if let Some(flush) = outcome.flush {
            self.metrics.record_flushed();
            if flush.empty_window {
                self.metrics.record_empty_window();
            }
            self.flush.submit(flush.record);
        }
    }

    fn publish_alert(&self, message: &str) {
        match self.alerts.publish(message) {
            Ok(()) => debug!(message = %message, "alert_dispatched"),
            Err(e) => {
                self.metrics.record_alert_failed();
                warn!(message = %message, error = %e, "alert_dropped");
            }
        }
    }
}

/// Resolves once shutdown is signalled or the signal sender is gone
async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow() {
            return;
        }
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}
