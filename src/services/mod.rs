//! Services - business logic and state management
//!
//! This module contains the core business logic services:
//! - `accumulator` - Window-scoped volume and velocity integration
//! - `alignment` - Alignment zone classification and debouncing
//! - `monitor` - Per-reading validity filter and flush scheduling
//! - `flush_worker` - Async persistence worker
//! - `ingestion` - UDP receive loop driving the monitor

pub mod accumulator;
pub mod alignment;
pub mod flush_worker;
pub mod ingestion;
pub mod monitor;

// Re-export commonly used types
pub use accumulator::{Contribution, MetricsAccumulator, MetricsError};
pub use alignment::{classify, AlignmentDebouncer, AlignmentWindow, ZoneTransition};
pub use flush_worker::{create_flush_worker, FlushJob, FlushSender, FlushWorker};
pub use ingestion::IngestionLoop;
pub use monitor::{ConveyorMonitor, FlushOutcome, ReadingOutcome};
