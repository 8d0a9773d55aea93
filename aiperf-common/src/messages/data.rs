//! Dataset req/rep messages.

use serde::{Deserialize, Serialize};

use crate::enums::CreditPhase;
use crate::models::{Conversation, TimingEntry};

/// Request one conversation from the dataset manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationRequestMessage {
    pub service_id: String,
    pub request_ns: u64,
    pub request_id: Option<String>,
    /// Specific conversation to fetch; unset lets the manager pick.
    pub conversation_id: Option<String>,
    pub credit_phase: CreditPhase,
}

/// The requested conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationResponseMessage {
    pub service_id: String,
    pub request_ns: u64,
    pub request_id: Option<String>,
    pub conversation: Conversation,
}

/// Request the static timing table for fixed-schedule mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetTimingRequestMessage {
    pub service_id: String,
    pub request_ns: u64,
    pub request_id: Option<String>,
}

/// The static timing table, sorted by delay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetTimingResponseMessage {
    pub service_id: String,
    pub request_ns: u64,
    pub request_id: Option<String>,
    pub timing_data: Vec<TimingEntry>,
}
