//! Window-scoped volume and velocity integration
//!
//! Volume is integrated on every reading that carries a new encoder pulse
//! count (trapezoid of the two cross-section areas times belt travel).
//! Velocity is derived at flush time from the mean pulse and time deltas
//! collected during the window.

use crate::domain::types::Reading;
use crate::infra::config::Calibration;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, trace, warn};

/// Wrapped pulse deltas above this are backward steps, not forward motion
const MAX_FORWARD_PULSE_DELTA: u32 = u32::MAX / 2;

/// Backward steps up to this many pulses are late datagrams; larger ones are
/// a counter reset
const MAX_REORDER_PULSE_DELTA: u32 = 1 << 16;

#[derive(Debug, Error, PartialEq)]
pub enum MetricsError {
    #[error("Velocity undefined: no distinct-pulse readings in window")]
    DivisionByEmptyWindow,

    #[error("Velocity undefined: mean time delta is {0} s")]
    NonPositiveElapsed(f64),
}

/// Outcome of feeding one reading to the accumulator
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Contribution {
    /// New pulse count: volume added and deltas recorded
    Accumulated { delta_volume: f64, delta_pulse: u32 },
    /// Same pulse count as the baseline: ignored
    Duplicate,
    /// Slightly behind the baseline: a late datagram, ignored
    OutOfOrder,
    /// Counter went far backwards: baseline moved, nothing accumulated
    CounterReset,
}

/// Volume contribution (m³) of a belt advance between two profiles
pub fn volume_increment(calibration: &Calibration, last_area: f64, area: f64, delta_pulse: u32) -> f64 {
    let mean_area = (area + last_area) / 2.0 * calibration.mm2_to_m2;
    let delta_distance = f64::from(delta_pulse) * calibration.pulse_to_mm * calibration.mm_to_m;
    mean_area * delta_distance * calibration.volume_approx
}

pub struct MetricsAccumulator {
    calibration: Calibration,
    volume_accumulated: f64,
    pulse_deltas: Vec<u32>,
    time_deltas: Vec<f64>,
    /// Baselines for the next distinct reading; survive resets
    last_area: f64,
    last_pulse: u32,
    last_received_at: Instant,
}

impl MetricsAccumulator {
    /// Create an accumulator whose baseline is the bootstrap reading
    pub fn new(calibration: Calibration, baseline: &Reading) -> Self {
        Self {
            calibration,
            volume_accumulated: 0.0,
            pulse_deltas: Vec::new(),
            time_deltas: Vec::new(),
            last_area: baseline.area,
            last_pulse: baseline.pulse_count,
            last_received_at: baseline.received_at,
        }
    }

    pub fn accumulate(&mut self, reading: &Reading) -> Contribution {
        if reading.pulse_count == self.last_pulse {
            trace!(pulse = reading.pulse_count, "duplicate_pulse_ignored");
            return Contribution::Duplicate;
        }

        let delta_pulse = reading.pulse_count.wrapping_sub(self.last_pulse);
        if delta_pulse > MAX_FORWARD_PULSE_DELTA {
            let behind = self.last_pulse.wrapping_sub(reading.pulse_count);
            if behind <= MAX_REORDER_PULSE_DELTA {
                debug!(
                    last_pulse = self.last_pulse,
                    pulse = reading.pulse_count,
                    behind = behind,
                    "pulse_out_of_order"
                );
                return Contribution::OutOfOrder;
            }
            warn!(
                last_pulse = self.last_pulse,
                pulse = reading.pulse_count,
                "pulse_counter_reset"
            );
            self.rebaseline(reading);
            return Contribution::CounterReset;
        }

        let delta_volume =
            volume_increment(&self.calibration, self.last_area, reading.area, delta_pulse);
        let delta_time =
            reading.received_at.saturating_duration_since(self.last_received_at).as_secs_f64();

        self.volume_accumulated += delta_volume;
        self.pulse_deltas.push(delta_pulse);
        self.time_deltas.push(delta_time);
        self.rebaseline(reading);

        Contribution::Accumulated { delta_volume, delta_pulse }
    }

    fn rebaseline(&mut self, reading: &Reading) {
        self.last_area = reading.area;
        self.last_pulse = reading.pulse_count;
        self.last_received_at = reading.received_at;
    }

    /// Mean belt velocity (m/s) over the current window
    pub fn velocity(&self) -> Result<f64, MetricsError> {
        if self.pulse_deltas.is_empty() || self.time_deltas.is_empty() {
            return Err(MetricsError::DivisionByEmptyWindow);
        }

        let mean_pulse = self.pulse_deltas.iter().map(|&p| f64::from(p)).sum::<f64>()
            / self.pulse_deltas.len() as f64;
        let mean_time = self.time_deltas.iter().sum::<f64>() / self.time_deltas.len() as f64;

        if mean_time <= 0.0 {
            return Err(MetricsError::NonPositiveElapsed(mean_time));
        }

        Ok(mean_pulse * self.calibration.pulse_to_mm * self.calibration.mm_to_m / mean_time)
    }

    /// Volume accumulated in the current window (m³)
    pub fn volume(&self) -> f64 {
        self.volume_accumulated
    }

    /// Number of distinct-pulse readings in the current window
    pub fn samples(&self) -> usize {
        self.pulse_deltas.len()
    }

    pub fn last_pulse(&self) -> u32 {
        self.last_pulse
    }

    /// Clear the window; baselines carry over for cross-window deltas
    pub fn reset(&mut self) {
        self.volume_accumulated = 0.0;
        self.pulse_deltas.clear();
        self.time_deltas.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn reading(area: f64, pulse: u32, at: Instant) -> Reading {
        Reading {
            area,
            right_align: 0.0,
            left_align: 0.0,
            distance: 50.0,
            profile_count: 0,
            pulse_count: pulse,
            received_at: at,
        }
    }

    #[test]
    fn test_volume_increment_exact() {
        let t0 = Instant::now();
        let mut acc = MetricsAccumulator::new(Calibration::default(), &reading(500.0, 1000, t0));

        let contribution = acc.accumulate(&reading(500.0, 2000, t0 + Duration::from_millis(100)));

        let expected = 500e-6 * ((2000.0 - 1000.0) * 0.05 * 0.001) * 0.94;
        match contribution {
            Contribution::Accumulated { delta_volume, delta_pulse } => {
                assert_eq!(delta_pulse, 1000);
                assert!((delta_volume - expected).abs() < 1e-18);
            }
            other => panic!("unexpected contribution {:?}", other),
        }
        assert!((acc.volume() - 2.35e-5).abs() < 1e-12);
    }

    #[test]
    fn test_trapezoid_uses_both_areas() {
        let cal = Calibration::default();
        let v = volume_increment(&cal, 400.0, 600.0, 100);
        assert!((v - volume_increment(&cal, 500.0, 500.0, 100)).abs() < 1e-18);
    }

    #[test]
    fn test_duplicate_pulse_contributes_nothing() {
        let t0 = Instant::now();
        let mut acc = MetricsAccumulator::new(Calibration::default(), &reading(500.0, 1000, t0));

        assert_eq!(
            acc.accumulate(&reading(900.0, 1000, t0 + Duration::from_millis(100))),
            Contribution::Duplicate
        );
        assert_eq!(acc.volume(), 0.0);
        assert_eq!(acc.samples(), 0);
        assert_eq!(acc.velocity(), Err(MetricsError::DivisionByEmptyWindow));
    }

    #[test]
    fn test_duplicate_does_not_move_time_baseline() {
        let t0 = Instant::now();
        let mut acc = MetricsAccumulator::new(Calibration::default(), &reading(500.0, 0, t0));

        // Duplicate at 100ms, distinct at 200ms: delta time must span 200ms
        acc.accumulate(&reading(500.0, 0, t0 + Duration::from_millis(100)));
        acc.accumulate(&reading(500.0, 40, t0 + Duration::from_millis(200)));

        // 40 pulses * 0.05 mm = 2 mm over 0.2 s = 0.01 m/s
        let velocity = acc.velocity().unwrap();
        assert!((velocity - 0.01).abs() < 1e-12);
    }

    #[test]
    fn test_velocity_uses_means() {
        let t0 = Instant::now();
        let mut acc = MetricsAccumulator::new(Calibration::default(), &reading(500.0, 0, t0));

        acc.accumulate(&reading(500.0, 50, t0 + Duration::from_millis(100)));
        acc.accumulate(&reading(500.0, 200, t0 + Duration::from_millis(400)));

        // mean pulse 100, mean time 0.2 s -> 100 * 0.05e-3 / 0.2 = 0.025 m/s
        let velocity = acc.velocity().unwrap();
        assert!((velocity - 0.025).abs() < 1e-12);
        assert_eq!(acc.samples(), 2);
    }

    #[test]
    fn test_zero_elapsed_is_rejected() {
        let t0 = Instant::now();
        let mut acc = MetricsAccumulator::new(Calibration::default(), &reading(500.0, 0, t0));
        acc.accumulate(&reading(500.0, 10, t0));
        assert_eq!(acc.velocity(), Err(MetricsError::NonPositiveElapsed(0.0)));
    }

    #[test]
    fn test_reset_keeps_baseline() {
        let t0 = Instant::now();
        let mut acc = MetricsAccumulator::new(Calibration::default(), &reading(500.0, 0, t0));
        acc.accumulate(&reading(500.0, 100, t0 + Duration::from_millis(100)));
        acc.reset();

        assert_eq!(acc.volume(), 0.0);
        assert_eq!(acc.samples(), 0);
        assert_eq!(acc.last_pulse(), 100);

        // Next delta is measured from the carried-over baseline
        match acc.accumulate(&reading(500.0, 150, t0 + Duration::from_millis(200))) {
            Contribution::Accumulated { delta_pulse, .. } => assert_eq!(delta_pulse, 50),
            other => panic!("unexpected contribution {:?}", other),
        }
    }

    #[test]
    fn test_counter_wrap_is_forward_motion() {
        let t0 = Instant::now();
        let mut acc =
            MetricsAccumulator::new(Calibration::default(), &reading(500.0, u32::MAX - 9, t0));
        match acc.accumulate(&reading(500.0, 10, t0 + Duration::from_millis(100))) {
            Contribution::Accumulated { delta_pulse, .. } => assert_eq!(delta_pulse, 20),
            other => panic!("unexpected contribution {:?}", other),
        }
    }

    #[test]
    fn test_late_datagram_is_not_counted_twice() {
        let t0 = Instant::now();
        let mut acc = MetricsAccumulator::new(Calibration::default(), &reading(500.0, 1000, t0));

        acc.accumulate(&reading(500.0, 1100, t0 + Duration::from_millis(100)));
        assert_eq!(
            acc.accumulate(&reading(500.0, 1050, t0 + Duration::from_millis(150))),
            Contribution::OutOfOrder
        );
        assert_eq!(acc.last_pulse(), 1100);

        match acc.accumulate(&reading(500.0, 1200, t0 + Duration::from_millis(200))) {
            Contribution::Accumulated { delta_pulse, .. } => assert_eq!(delta_pulse, 100),
            other => panic!("unexpected contribution {:?}", other),
        }

        // 200 pulses of belt travel, counted once
        let expected = volume_increment(&Calibration::default(), 500.0, 500.0, 200);
        assert!((acc.volume() - expected).abs() < 1e-15);
        assert_eq!(acc.samples(), 2);
        // 100 pulses per 0.1 s -> 100 * 0.05e-3 / 0.1 = 0.05 m/s
        assert!((acc.velocity().unwrap() - 0.05).abs() < 1e-12);
    }

    #[test]
    fn test_late_datagram_across_wrap_is_ignored() {
        let t0 = Instant::now();
        let mut acc = MetricsAccumulator::new(Calibration::default(), &reading(500.0, 5, t0));
        assert_eq!(
            acc.accumulate(&reading(500.0, u32::MAX - 5, t0 + Duration::from_millis(100))),
            Contribution::OutOfOrder
        );
        assert_eq!(acc.last_pulse(), 5);
    }

    #[test]
    fn test_counter_reset_rebaselines() {
        let t0 = Instant::now();
        let mut acc =
            MetricsAccumulator::new(Calibration::default(), &reading(500.0, 5_000_000, t0));

        assert_eq!(
            acc.accumulate(&reading(500.0, 10, t0 + Duration::from_millis(100))),
            Contribution::CounterReset
        );
        assert_eq!(acc.volume(), 0.0);
        assert_eq!(acc.samples(), 0);
        assert_eq!(acc.last_pulse(), 10);
    }
}
