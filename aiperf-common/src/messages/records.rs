//! Result and records messages.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::models::{
    MetricRecordData, MetricResult, ProcessRecordsResult, ProcessingStats, RequestRecord,
};

/// A raw request record pushed by a worker to the record processors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceResultsMessage {
    pub service_id: String,
    pub request_ns: u64,
    pub record: RequestRecord,
}

/// Processed per-request metric values pushed to the records manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRecordsMessage {
    pub service_id: String,
    pub request_ns: u64,
    #[serde(flatten)]
    pub data: MetricRecordData,
}

/// Periodic processing stats from the records manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordsProcessingStatsMessage {
    pub service_id: String,
    pub request_ns: u64,
    pub processing_stats: ProcessingStats,
    pub worker_stats: HashMap<String, ProcessingStats>,
}

/// One-shot signal that the records manager has seen every expected record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllRecordsReceivedMessage {
    pub service_id: String,
    pub request_ns: u64,
    pub final_processing_stats: ProcessingStats,
}

/// The final processed results of the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessRecordsResultMessage {
    pub service_id: String,
    pub request_ns: u64,
    pub results: ProcessRecordsResult,
}

/// Realtime metric snapshot for live displays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealtimeMetricsMessage {
    pub service_id: String,
    pub request_ns: u64,
    pub metrics: Vec<MetricResult>,
}
