//! Domain models - core types shared by the ingestion pipeline
//!
//! - `SensorFrame` - raw fields of one telemetry datagram
//! - `Reading` - a decoded, timestamped frame
//! - `AlignmentZone` - discrete lateral belt position
//! - `MetricsRecord` - aggregated output of one flush window

pub mod types;

pub use types::{epoch_ms, AlignmentZone, MetricsRecord, Reading, SensorFrame};
