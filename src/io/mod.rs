//! IO modules - external system interfaces
//!
//! This module contains all external IO operations:
//! - `frame` - Sensor telemetry frame codec
//! - `udp` - UDP datagram receiver
//! - `capture` - Raw datagram capture (JSONL)
//! - `persistence` - Metrics record sinks (JSONL file, PostgreSQL)
//! - `alert` - Alignment alert delivery (MQTT, log)

pub mod alert;
pub mod capture;
pub mod error;
pub mod frame;
pub mod persistence;
pub mod udp;

// Re-export commonly used types
pub use alert::{create_alert_channel, AlertSender, AlertSink, LogAlertSink, MqttAlertPublisher};
pub use capture::CaptureLogger;
pub use error::SinkError;
pub use frame::{decode_frame, encode_frame, FrameError, FRAME_LEN};
pub use persistence::{build_persistence_sink, JsonlMetricsSink, PersistenceSink};
pub use udp::{Datagram, DatagramReceiver, UdpError};
