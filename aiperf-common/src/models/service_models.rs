//! Service tracking, processing stats, and worker health models.

use serde::{Deserialize, Serialize};

use crate::enums::{LifecycleState, ServiceRegistrationStatus, ServiceType};
use crate::models::error_models::ErrorDetailsCount;
use crate::models::metric::MetricResult;

/// What the controller knows about one running service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceRunInfo {
    pub service_type: ServiceType,
    pub service_id: String,
    pub registration_status: ServiceRegistrationStatus,
    /// Wall-clock ns the service was first seen.
    pub first_seen: u64,
    /// Wall-clock ns of the last heartbeat or status update.
    pub last_seen: u64,
    pub state: LifecycleState,
}

/// Aggregate record processing counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingStats {
    /// Valid records processed.
    pub processed: u64,
    /// Error records processed.
    pub errors: u64,
    /// Total requests expected, when known up front.
    pub total_expected_requests: Option<u64>,
}

impl ProcessingStats {
    /// Total records seen, valid and errored.
    pub fn total_records(&self) -> u64 {
        self.processed + self.errors
    }
}

/// Per-phase task counters tracked by a worker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerTaskStats {
    pub total: u64,
    pub in_progress: u64,
    pub completed: u64,
    pub failed: u64,
}

/// A point-in-time health snapshot published by a worker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkerHealth {
    /// Process CPU usage percentage over the last sampling window.
    pub cpu_usage: f64,
    /// Uptime of the worker in seconds.
    pub uptime_sec: f64,
}

/// Final results of a profile run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileResults {
    /// Summarized metric results across all accepted records.
    pub records: Vec<MetricResult>,
    /// Number of valid requests included.
    pub completed: u64,
    /// Wall-clock ns the profiling phase started.
    pub start_ns: u64,
    /// Wall-clock ns the profiling phase ended.
    pub end_ns: u64,
    /// Error records grouped by identity.
    pub error_summary: Vec<ErrorDetailsCount>,
    /// Whether the run was cancelled before completing.
    pub was_cancelled: bool,
}

impl ProfileResults {
    /// Look up a summarized metric by tag.
    pub fn get(&self, tag: &str) -> Option<&MetricResult> {
        self.records.iter().find(|r| r.tag == tag)
    }
}

/// The records manager's final answer: results plus processor-level errors.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessRecordsResult {
    pub results: ProfileResults,
    pub errors: Vec<crate::models::ErrorDetails>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_records() {
        let stats = ProcessingStats {
            processed: 7,
            errors: 3,
            total_expected_requests: Some(10),
        };
        assert_eq!(stats.total_records(), 10);
    }
}
