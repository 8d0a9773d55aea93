//! Lifecycle and error messages.

use serde::{Deserialize, Serialize};

use crate::enums::{LifecycleState, ServiceType};
use crate::models::ErrorDetails;

/// Published by a service on every lifecycle state change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusMessage {
    pub service_id: String,
    pub service_type: ServiceType,
    pub request_ns: u64,
    pub state: LifecycleState,
}

/// Published periodically by component services while alive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeartbeatMessage {
    pub service_id: String,
    pub service_type: ServiceType,
    pub request_ns: u64,
    pub state: LifecycleState,
}

/// Generic error reply, e.g. from a req/rep responder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorMessage {
    pub service_id: String,
    pub request_ns: u64,
    pub request_id: Option<String>,
    pub error: ErrorDetails,
}
