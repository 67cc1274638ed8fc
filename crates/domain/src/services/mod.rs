//! Shared service helpers such as label caching and telemetry wiring.

pub mod cache;
pub mod rate_limit;
pub mod telemetry;

pub use cache::*;
pub use rate_limit::*;
pub use telemetry::*;
