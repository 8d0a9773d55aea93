//! Shared foundation for the AIPerf benchmarking system.
//!
//! Provides:
//! - The closed message catalog and wire models
//! - The comms fabric (pub/sub, push/pull, req/rep clients over a brokered hub)
//! - The service lifecycle runtime and hook-driven service harness
//! - Configuration and the common error taxonomy

pub mod comms;
pub mod config;
pub mod constants;
pub mod enums;
pub mod error;
pub mod lifecycle;
pub mod messages;
pub mod models;
pub mod service;

pub use error::{AIPerfError, AIPerfResult};

/// Current wall-clock time in nanoseconds since the Unix epoch.
pub fn time_ns() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

/// Monotonic clock reading in nanoseconds, anchored at process start.
///
/// Only differences between two readings are meaningful.
pub fn perf_ns() -> i64 {
    use std::sync::OnceLock;
    use std::time::Instant;
    static ANCHOR: OnceLock<Instant> = OnceLock::new();
    let anchor = ANCHOR.get_or_init(Instant::now);
    anchor.elapsed().as_nanos() as i64
}
