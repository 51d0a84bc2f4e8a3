//! Flush worker - persists metrics records off the receive path
//!
//! The ingestion loop enqueues each flushed `MetricsRecord` via `try_send`
//! and never awaits the sink. A single worker drains the queue in FIFO order,
//! so at most one write is in flight. Failed writes are logged and the
//! record is lost; retrying would reorder windows.

use crate::domain::types::MetricsRecord;
use crate::infra::metrics::IngestMetrics;
use crate::io::persistence::PersistenceSink;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};

/// Queue delays above this indicate a slow sink
const QUEUE_DELAY_WARN: Duration = Duration::from_secs(1);

/// A record waiting to be persisted
#[derive(Debug)]
pub struct FlushJob {
    pub record: MetricsRecord,
    /// When the job was enqueued (for queue delay measurement)
    pub enqueued_at: Instant,
}

/// Non-blocking handle used by the ingestion loop
#[derive(Clone)]
pub struct FlushSender {
    tx: mpsc::Sender<FlushJob>,
    metrics: Arc<IngestMetrics>,
}

impl FlushSender {
    /// Enqueue a record; returns false if it was dropped
    pub fn submit(&self, record: MetricsRecord) -> bool {
        let job = FlushJob { record, enqueued_at: Instant::now() };
        match self.tx.try_send(job) {
            Ok(()) => true,
            Err(TrySendError::Full(job)) => {
                self.metrics.record_dropped();
                warn!(volume = %job.record.volume, "flush_queue_full_record_dropped");
                false
            }
            Err(TrySendError::Closed(job)) => {
                self.metrics.record_dropped();
                warn!(volume = %job.record.volume, "flush_worker_stopped_record_dropped");
                false
            }
        }
    }
}

pub struct FlushWorker {
    sink: Arc<dyn PersistenceSink>,
    rx: mpsc::Receiver<FlushJob>,
    metrics: Arc<IngestMetrics>,
}

impl FlushWorker {
    pub fn new(
        sink: Arc<dyn PersistenceSink>,
        rx: mpsc::Receiver<FlushJob>,
        metrics: Arc<IngestMetrics>,
    ) -> Self {
        Self { sink, rx, metrics }
    }

    /// Run the worker until every sender is dropped and the queue is drained
    pub async fn run(mut self) {
        info!(sink = self.sink.name(), "flush_worker_started");

        while let Some(job) = self.rx.recv().await {
            let queue_delay = job.enqueued_at.elapsed();
            let write_start = Instant::now();

            match self.sink.append_metrics_record(&job.record).await {
                Ok(()) => {
                    debug!(
                        sink = self.sink.name(),
                        queue_delay_ms = queue_delay.as_millis() as u64,
                        write_ms = write_start.elapsed().as_millis() as u64,
                        "metrics_record_persisted"
                    );
                }
                Err(e) => {
                    self.metrics.record_sink_failure();
                    warn!(sink = self.sink.name(), error = %e, "metrics_record_lost");
                }
            }

            if queue_delay > QUEUE_DELAY_WARN {
                warn!(queue_delay_ms = queue_delay.as_millis() as u64, "flush_queue_delay_high");
            }
        }

        info!("flush_worker_stopped");
    }
}

/// Create a flush channel and worker
///
/// Returns the sender (for the ingestion loop) and the worker (to be spawned)
pub fn create_flush_worker(
    sink: Arc<dyn PersistenceSink>,
    metrics: Arc<IngestMetrics>,
    buffer_size: usize,
) -> (FlushSender, FlushWorker) {
    let (tx, rx) = mpsc::channel(buffer_size);
    let worker = FlushWorker::new(sink, rx, metrics.clone());
    (FlushSender { tx, metrics }, worker)
}
