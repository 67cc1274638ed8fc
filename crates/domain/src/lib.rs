//! Domain-level building blocks shared across the API, monitor and storage
//! crates: the watch-set and transfer model, storage contracts, environment
//! configuration and telemetry wiring.

pub mod config;
pub mod model;
pub mod services;
pub mod storage;

pub use storage::*;
