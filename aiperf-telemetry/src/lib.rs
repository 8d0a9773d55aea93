//! Optional GPU telemetry collection.

pub mod collector;
pub mod manager;

pub use collector::parse_gauge_lines;
pub use manager::TelemetryManager;
