//! GPU telemetry models.

use serde::{Deserialize, Serialize};

use crate::models::error_models::{ErrorDetails, ErrorDetailsCount};

/// One sampled GPU metric value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryRecord {
    /// The metrics endpoint the sample came from.
    pub endpoint: String,
    /// GPU index on that endpoint.
    pub gpu_index: u32,
    /// Metric tag, e.g. `gpu_utilization`.
    pub tag: String,
    pub value: f64,
    /// Wall-clock ns the sample was taken.
    pub timestamp_ns: u64,
}

/// Accumulated telemetry data for the run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TelemetryResults {
    /// All records grouped by endpoint, in collection order.
    pub records: Vec<TelemetryRecord>,
    pub start_ns: u64,
    pub end_ns: u64,
    pub endpoints_configured: Vec<String>,
    pub endpoints_successful: Vec<String>,
    pub error_summary: Vec<ErrorDetailsCount>,
}

/// Final telemetry answer: results plus processor/collection errors.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessTelemetryResult {
    pub results: TelemetryResults,
    pub errors: Vec<ErrorDetails>,
}
