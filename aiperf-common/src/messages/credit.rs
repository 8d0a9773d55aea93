//! Credit scheduling messages.

use serde::{Deserialize, Serialize};

use crate::enums::CreditPhase;

/// A scheduling token granting one request execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditDropMessage {
    pub service_id: String,
    pub request_ns: u64,
    pub phase: CreditPhase,
    /// Conversation to execute; unset lets the dataset manager pick.
    pub conversation_id: Option<String>,
    /// Target wall-clock ns at which the request should be sent.
    pub credit_drop_ns: Option<u64>,
    /// Whether the request should be cancelled after `cancel_after_ns`.
    #[serde(default)]
    pub should_cancel: bool,
    /// Cancellation budget in nanoseconds.
    pub cancel_after_ns: Option<u64>,
}

/// Acknowledgement that one credit finished processing.
///
/// Every dropped credit is returned exactly once, even on failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditReturnMessage {
    pub service_id: String,
    pub request_ns: u64,
    pub phase: CreditPhase,
    /// How late the worker was relative to the scheduled drop time.
    pub delayed_ns: Option<u64>,
    /// Whether the credit's request failed.
    #[serde(default)]
    pub failed: bool,
}

/// A credit phase has begun.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditPhaseStartMessage {
    pub service_id: String,
    pub request_ns: u64,
    pub phase: CreditPhase,
    /// Wall-clock ns the phase started.
    pub start_ns: u64,
    /// Total requests the phase will issue (request-count benchmarks).
    pub total_expected_requests: Option<u64>,
    /// Planned duration (duration benchmarks).
    pub expected_duration_sec: Option<f64>,
}

/// Periodic progress for an in-flight credit phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditPhaseProgressMessage {
    pub service_id: String,
    pub request_ns: u64,
    pub phase: CreditPhase,
    /// Credits dropped so far.
    pub sent: u64,
    /// Credits returned so far.
    pub completed: u64,
}

/// The phase's sender is done producing credits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditPhaseSendingCompleteMessage {
    pub service_id: String,
    pub request_ns: u64,
    pub phase: CreditPhase,
    pub sent: u64,
    /// Wall-clock ns the last credit was dropped.
    pub sent_end_ns: u64,
}

/// All issued credits for the phase have returned (or the phase was cut
/// short by a timeout or cancellation).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditPhaseCompleteMessage {
    pub service_id: String,
    pub request_ns: u64,
    pub phase: CreditPhase,
    /// Wall-clock ns the phase ended.
    pub end_ns: u64,
    /// Number of credits issued in the phase.
    pub final_request_count: u64,
    /// Whether a duration timeout cut the phase short.
    #[serde(default)]
    pub timeout_triggered: bool,
    /// Whether the phase was cancelled.
    #[serde(default)]
    pub cancelled: bool,
}

/// Every phase has fully drained; the timing manager is done.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditsCompleteMessage {
    pub service_id: String,
    pub request_ns: u64,
}
