//! Shared types for the conveyor gateway

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Get current epoch milliseconds
#[inline]
pub fn epoch_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

/// Raw telemetry fields as they appear on the wire
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorFrame {
    /// Cross-section area of the material on the belt (mm²)
    pub area: f32,
    /// Right edge offset from the sensor axis (mm)
    pub right_align: f32,
    /// Left edge offset from the sensor axis (mm)
    pub left_align: f32,
    pub profile_count: u32,
    /// Encoder tick counter, proportional to belt travel
    pub pulse_count: u32,
    /// Sensor-to-belt distance (mm)
    pub distance: f32,
}

impl SensorFrame {
    /// Attach a receive timestamp, widening measurements to f64
    pub fn into_reading(self, received_at: Instant) -> Reading {
        Reading {
            area: f64::from(self.area),
            right_align: f64::from(self.right_align),
            left_align: f64::from(self.left_align),
            distance: f64::from(self.distance),
            profile_count: self.profile_count,
            pulse_count: self.pulse_count,
            received_at,
        }
    }
}

/// One decoded datagram, ready for aggregation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    pub area: f64,
    pub right_align: f64,
    pub left_align: f64,
    pub distance: f64,
    pub profile_count: u32,
    pub pulse_count: u32,
    pub received_at: Instant,
}

/// Discrete lateral alignment of the belt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum AlignmentZone {
    FarLeft = 0,
    SlightLeft = 1,
    Centered = 2,
    SlightRight = 3,
    FarRight = 4,
}

impl AlignmentZone {
    pub const ALL: [AlignmentZone; 5] = [
        AlignmentZone::FarLeft,
        AlignmentZone::SlightLeft,
        AlignmentZone::Centered,
        AlignmentZone::SlightRight,
        AlignmentZone::FarRight,
    ];

    #[inline]
    pub fn index(self) -> u8 {
        self as u8
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AlignmentZone::FarLeft => "far_left",
            AlignmentZone::SlightLeft => "slight_left",
            AlignmentZone::Centered => "centered",
            AlignmentZone::SlightRight => "slight_right",
            AlignmentZone::FarRight => "far_right",
        }
    }

    /// Alert text published when the belt is confirmed to have moved into this zone
    pub fn transition_message(&self) -> &'static str {
        match self {
            AlignmentZone::FarLeft => "ALERTA! ESTEIRA DESALINHADA: MUITO À ESQUERDA",
            AlignmentZone::SlightLeft => "ALERTA! ESTEIRA DESALINHADA: UM POUCO À ESQUERDA",
            AlignmentZone::Centered => "TUDO CERTO! A ESTEIRA ESTÁ NOVAMENTE CENTRALIZADA",
            AlignmentZone::SlightRight => "ALERTA! ESTEIRA DESALINHADA: UM POUCO À DIREITA",
            AlignmentZone::FarRight => "ALERTA! ESTEIRA DESALINHADA: MUITO À DIREITA",
        }
    }

    /// Status text published once at startup for the bootstrap zone
    pub fn initial_message(&self) -> &'static str {
        match self {
            AlignmentZone::Centered => "A ESTEIRA ESTÁ CENTRALIZADA",
            other => other.transition_message(),
        }
    }
}

impl std::fmt::Display for AlignmentZone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Aggregated metrics for one flush window
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsRecord {
    /// Volume transported during the window (m³)
    pub volume: f64,
    /// Mean belt velocity during the window (m/s)
    pub velocity: f64,
    /// Right alignment (cm)
    pub right_align: f64,
    /// Left alignment (cm)
    pub left_align: f64,
    /// In-band readings that refreshed the alignment during the window
    pub alignment_samples: u32,
    pub timestamp: DateTime<Utc>,
}
