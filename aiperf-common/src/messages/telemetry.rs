//! Telemetry messages.

use serde::{Deserialize, Serialize};

use crate::models::{ErrorDetails, MetricResult, ProcessTelemetryResult, TelemetryRecord};

/// A batch of telemetry samples from one collection cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryRecordsMessage {
    pub service_id: String,
    pub request_ns: u64,
    pub records: Vec<TelemetryRecord>,
    /// Collection error for this cycle; set means `records` is empty.
    pub error: Option<ErrorDetails>,
}

impl TelemetryRecordsMessage {
    /// Whether the batch carries usable records.
    pub fn valid(&self) -> bool {
        self.error.is_none()
    }
}

/// Whether telemetry results will be available for this run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryStatusMessage {
    pub service_id: String,
    pub request_ns: u64,
    pub enabled: bool,
    pub endpoints_configured: Vec<String>,
    pub endpoints_reachable: Vec<String>,
    pub reason: Option<String>,
}

/// The final processed telemetry results of the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessTelemetryResultMessage {
    pub service_id: String,
    pub request_ns: u64,
    pub telemetry_result: ProcessTelemetryResult,
}

/// Realtime telemetry snapshot for live displays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealtimeTelemetryMetricsMessage {
    pub service_id: String,
    pub request_ns: u64,
    pub metrics: Vec<MetricResult>,
}
