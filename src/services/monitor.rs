//! Conveyor monitor - the per-reading state machine behind ingestion
//!
//! Owns the accumulator, the alignment debouncer and the flush window.
//! Time comes from `Reading::received_at`, so the monitor is fully
//! deterministic under test: feed readings with synthetic instants and the
//! same records and transitions come out.
//!
//! Per reading:
//! 1. validity filter: alignment is trusted only when distance lies inside the
//!    plausibility band (and both alignments are finite); otherwise the last
//!    trusted alignment is kept
//! 2. accumulate volume/velocity deltas (area and pulse are always trusted)
//! 3. in `reading` sampling mode, debounce the trusted alignment
//! 4. once the flush interval has elapsed since the window start, debounce
//!    the latest trusted alignment once more, emit a `MetricsRecord` and
//!    start a new window

use crate::domain::types::{AlignmentZone, MetricsRecord, Reading};
use crate::infra::config::{AlignmentSampling, Config};
use crate::services::accumulator::{Contribution, MetricsAccumulator};
use crate::services::alignment::{classify, AlignmentDebouncer, ZoneTransition};
use chrono::Utc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const MM_PER_CM: f64 = 10.0;

/// A record produced by a flush
#[derive(Debug, Clone, PartialEq)]
pub struct FlushOutcome {
    pub record: MetricsRecord,
    /// No distinct-pulse reading arrived; velocity was reported as 0.0
    pub empty_window: bool,
}

/// Everything one reading caused
#[derive(Debug, Clone, PartialEq)]
pub struct ReadingOutcome {
    pub contribution: Contribution,
    pub alignment_trusted: bool,
    pub transition: Option<ZoneTransition>,
    pub flush: Option<FlushOutcome>,
}

pub struct ConveyorMonitor {
    accumulator: MetricsAccumulator,
    debouncer: AlignmentDebouncer,
    /// Last trusted alignment (mm)
    right_align: f64,
    left_align: f64,
    /// Trusted readings in the current window
    alignment_samples: u32,
    window_start: Instant,
    flush_interval: Duration,
    distance_band: (f64, f64),
    sampling: AlignmentSampling,
}

impl ConveyorMonitor {
    /// Initialize from the first decoded reading
    ///
    /// The confirmed zone is taken directly from this reading, bypassing the
    /// debouncer and the distance band.
    pub fn bootstrap(config: &Config, first: &Reading) -> Self {
        let right_align = if first.right_align.is_finite() { first.right_align } else { 0.0 };
        let left_align = if first.left_align.is_finite() { first.left_align } else { 0.0 };
        let initial = classify(right_align, left_align);

        info!(
            zone = %initial,
            pulse = first.pulse_count,
            distance = first.distance,
            "conveyor_bootstrapped"
        );

        Self {
            accumulator: MetricsAccumulator::new(config.calibration(), first),
            debouncer: AlignmentDebouncer::new(initial),
            right_align,
            left_align,
            alignment_samples: 0,
            window_start: first.received_at,
            flush_interval: config.flush_interval(),
            distance_band: config.distance_band_mm(),
            sampling: config.alignment_sampling(),
        }
    }

    pub fn confirmed_zone(&self) -> AlignmentZone {
        self.debouncer.confirmed()
    }

    pub fn debouncer(&self) -> &AlignmentDebouncer {
        &self.debouncer
    }

    pub fn accumulator(&self) -> &MetricsAccumulator {
        &self.accumulator
    }

    /// Last trusted (right, left) alignment in mm
    pub fn alignment_mm(&self) -> (f64, f64) {
        (self.right_align, self.left_align)
    }

    pub fn window_start(&self) -> Instant {
        self.window_start
    }

    /// Distance inside the inclusive plausibility band and both alignments finite
    fn is_trusted(&self, reading: &Reading) -> bool {
        let (min, max) = self.distance_band;
        (min..=max).contains(&reading.distance)
            && reading.right_align.is_finite()
            && reading.left_align.is_finite()
    }

    pub fn process(&mut self, reading: &Reading) -> ReadingOutcome {
        let alignment_trusted = self.is_trusted(reading);
        if alignment_trusted {
            self.right_align = reading.right_align;
            self.left_align = reading.left_align;
            self.alignment_samples = self.alignment_samples.saturating_add(1);
        } else {
            debug!(distance = reading.distance, "alignment_out_of_band");
        }

        let contribution = self.accumulator.accumulate(reading);

        let mut transition = None;
        if alignment_trusted && self.sampling == AlignmentSampling::Reading {
            transition = self.debouncer.observe(self.right_align, self.left_align);
        }

        let flush = if reading.received_at.saturating_duration_since(self.window_start)
            >= self.flush_interval
        {
            let at_flush = self.debouncer.observe(self.right_align, self.left_align);
            transition = transition.or(at_flush);
            Some(self.flush(reading.received_at))
        } else {
            None
        };

        ReadingOutcome { contribution, alignment_trusted, transition, flush }
    }

    fn flush(&mut self, now: Instant) -> FlushOutcome {
        let (velocity, empty_window) = match self.accumulator.velocity() {
            Ok(velocity) => (velocity, false),
            Err(e) => {
                warn!(error = %e, "velocity_window_empty");
                (0.0, true)
            }
        };

        if self.alignment_samples == 0 {
            warn!(
                right_align_mm = self.right_align,
                left_align_mm = self.left_align,
                "alignment_stale"
            );
        }

        let record = MetricsRecord {
            volume: self.accumulator.volume(),
            velocity,
            right_align: self.right_align / MM_PER_CM,
            left_align: self.left_align / MM_PER_CM,
            alignment_samples: self.alignment_samples,
            timestamp: Utc::now(),
        };

        info!(
            volume = %record.volume,
            velocity = %record.velocity,
            right_align_cm = %record.right_align,
            left_align_cm = %record.left_align,
            samples = self.accumulator.samples(),
            zone = %self.debouncer.confirmed(),
            "metrics_flushed"
        );

        self.accumulator.reset();
        self.alignment_samples = 0;
        self.window_start = now;

        FlushOutcome { record, empty_window }
    }
}
