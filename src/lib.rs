//! Conveyor gateway library
//!
//! Laser-profile sensor ingestion: frame decoding, volume/velocity
//! aggregation, alignment debouncing, and the sinks that receive the results.
//! Exposes modules for integration testing and binary reuse.

pub mod domain;
pub mod infra;
pub mod io;
pub mod services;
