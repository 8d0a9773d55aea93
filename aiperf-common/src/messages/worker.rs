//! Worker health messages.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::enums::WorkerStatus;
use crate::models::{WorkerHealth, WorkerTaskStats};

/// Periodic health snapshot published by each worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerHealthMessage {
    pub service_id: String,
    pub request_ns: u64,
    pub health: WorkerHealth,
    /// Task counters aggregated across phases.
    pub task_stats: WorkerTaskStats,
}

/// Periodic status roll-up published by the worker manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerStatusSummaryMessage {
    pub service_id: String,
    pub request_ns: u64,
    pub worker_statuses: HashMap<String, WorkerStatus>,
}
