//! Lock-free ingest counters and periodic reporting
//!
//! NOTE: All atomics use Relaxed ordering intentionally; these are statistical
//! counters only. Do NOT use them for coordination or logic decisions.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Lock-free metrics collector for the ingestion pipeline
pub struct IngestMetrics {
    /// Datagrams received (monotonic)
    datagrams_total: AtomicU64,
    /// Datagrams since last report (reset on report)
    datagrams_since_report: AtomicU64,
    /// Datagrams shorter than a frame (monotonic)
    malformed_total: AtomicU64,
    /// Readings repeating the previous pulse count (monotonic)
    duplicate_pulse_total: AtomicU64,
    /// Late readings slightly behind the pulse baseline (monotonic)
    out_of_order_total: AtomicU64,
    /// Readings whose distance fell outside the plausibility band (monotonic)
    out_of_band_total: AtomicU64,
    /// Receive errors that were retried (monotonic)
    socket_errors_total: AtomicU64,
    /// Flush windows emitted (monotonic)
    records_flushed_total: AtomicU64,
    /// Records rejected by a full or closed flush queue (monotonic)
    records_dropped_total: AtomicU64,
    /// Persistence writes that failed (monotonic)
    sink_failures_total: AtomicU64,
    /// Flush windows with no distinct-pulse reading (monotonic)
    empty_windows_total: AtomicU64,
    /// Confirmed alignment transitions (monotonic)
    transitions_total: AtomicU64,
    alerts_published_total: AtomicU64,
    alerts_failed_total: AtomicU64,
    /// Last report time (only accessed from reporter)
    last_report_time: parking_lot::Mutex<Instant>,
}

impl Default for IngestMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl IngestMetrics {
    pub fn new() -> Self {
        Self {
            datagrams_total: AtomicU64::new(0),
            datagrams_since_report: AtomicU64::new(0),
            malformed_total: AtomicU64::new(0),
            duplicate_pulse_total: AtomicU64::new(0),
            out_of_order_total: AtomicU64::new(0),
            out_of_band_total: AtomicU64::new(0),
            socket_errors_total: AtomicU64::new(0),
            records_flushed_total: AtomicU64::new(0),
            records_dropped_total: AtomicU64::new(0),
            sink_failures_total: AtomicU64::new(0),
            empty_windows_total: AtomicU64::new(0),
            transitions_total: AtomicU64::new(0),
            alerts_published_total: AtomicU64::new(0),
            alerts_failed_total: AtomicU64::new(0),
            last_report_time: parking_lot::Mutex::new(Instant::now()),
        }
    }

    #[inline]
    pub fn record_datagram(&self) {
        self.datagrams_total.fetch_add(1, Ordering::Relaxed);
        self.datagrams_since_report.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_malformed(&self) {
        self.malformed_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_duplicate_pulse(&self) {
        self.duplicate_pulse_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_out_of_order(&self) {
        self.out_of_order_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_out_of_band(&self) {
        self.out_of_band_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_socket_error(&self) {
        self.socket_errors_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_flushed(&self) {
        self.records_flushed_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_dropped(&self) {
        self.records_dropped_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_sink_failure(&self) {
        self.sink_failures_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_empty_window(&self) {
        self.empty_windows_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_transition(&self) {
        self.transitions_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_alert_published(&self) {
        self.alerts_published_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_alert_failed(&self) {
        self.alerts_failed_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn datagrams_total(&self) -> u64 {
        self.datagrams_total.load(Ordering::Relaxed)
    }

    pub fn malformed_total(&self) -> u64 {
        self.malformed_total.load(Ordering::Relaxed)
    }

    pub fn records_flushed_total(&self) -> u64 {
        self.records_flushed_total.load(Ordering::Relaxed)
    }

    pub fn records_dropped_total(&self) -> u64 {
        self.records_dropped_total.load(Ordering::Relaxed)
    }

    pub fn sink_failures_total(&self) -> u64 {
        self.sink_failures_total.load(Ordering::Relaxed)
    }

    pub fn alerts_failed_total(&self) -> u64 {
        self.alerts_failed_total.load(Ordering::Relaxed)
    }

    /// Snapshot counters; the per-interval datagram count is reset
    pub fn report(&self) -> IngestSummary {
        let datagrams_interval = self.datagrams_since_report.swap(0, Ordering::Relaxed);

        let elapsed = {
            let mut last = self.last_report_time.lock();
            let elapsed = last.elapsed();
            *last = Instant::now();
            elapsed
        };

        let secs = elapsed.as_secs_f64();
        let datagrams_per_sec = if secs > 0.0 { datagrams_interval as f64 / secs } else { 0.0 };

        IngestSummary {
            datagrams_total: self.datagrams_total.load(Ordering::Relaxed),
            datagrams_per_sec,
            malformed_total: self.malformed_total.load(Ordering::Relaxed),
            duplicate_pulse_total: self.duplicate_pulse_total.load(Ordering::Relaxed),
            out_of_order_total: self.out_of_order_total.load(Ordering::Relaxed),
            out_of_band_total: self.out_of_band_total.load(Ordering::Relaxed),
            socket_errors_total: self.socket_errors_total.load(Ordering::Relaxed),
            records_flushed_total: self.records_flushed_total.load(Ordering::Relaxed),
            records_dropped_total: self.records_dropped_total.load(Ordering::Relaxed),
            sink_failures_total: self.sink_failures_total.load(Ordering::Relaxed),
            empty_windows_total: self.empty_windows_total.load(Ordering::Relaxed),
            transitions_total: self.transitions_total.load(Ordering::Relaxed),
            alerts_published_total: self.alerts_published_total.load(Ordering::Relaxed),
            alerts_failed_total: self.alerts_failed_total.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of the ingest counters
#[derive(Debug, Clone)]
pub struct IngestSummary {
    pub datagrams_total: u64,
    pub datagrams_per_sec: f64,
    pub malformed_total: u64,
    pub duplicate_pulse_total: u64,
    pub out_of_order_total: u64,
    pub out_of_band_total: u64,
    pub socket_errors_total: u64,
    pub records_flushed_total: u64,
    pub records_dropped_total: u64,
    pub sink_failures_total: u64,
    pub empty_windows_total: u64,
    pub transitions_total: u64,
    pub alerts_published_total: u64,
    pub alerts_failed_total: u64,
}

impl IngestSummary {
    pub fn log(&self) {
        info!(
            datagrams_total = %self.datagrams_total,
            datagrams_per_sec = format!("{:.1}", self.datagrams_per_sec),
            malformed = %self.malformed_total,
            duplicates = %self.duplicate_pulse_total,
            out_of_order = %self.out_of_order_total,
            out_of_band = %self.out_of_band_total,
            socket_errors = %self.socket_errors_total,
            flushed = %self.records_flushed_total,
            dropped = %self.records_dropped_total,
            sink_failures = %self.sink_failures_total,
            empty_windows = %self.empty_windows_total,
            transitions = %self.transitions_total,
            alerts_published = %self.alerts_published_total,
            alerts_failed = %self.alerts_failed_total,
            "ingest_metrics"
        );
    }
}
