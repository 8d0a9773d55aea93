//! Summarized metric results.

use serde::{Deserialize, Serialize};

/// Summary statistics for one metric across all accepted records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricResult {
    /// Stable string id of the metric.
    pub tag: String,
    /// Display header.
    pub header: String,
    /// Display unit, when the metric has one.
    pub unit: Option<String>,
    pub avg: f64,
    pub min: f64,
    pub max: f64,
    pub p1: f64,
    pub p5: f64,
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub p90: f64,
    pub p95: f64,
    pub p99: f64,
    pub std: f64,
    /// Number of samples summarized.
    pub count: u64,
    /// Whether the metric only applies to streaming endpoints.
    #[serde(default)]
    pub streaming_only: bool,
    /// Most recent value, for realtime displays.
    pub current: Option<f64>,
}
