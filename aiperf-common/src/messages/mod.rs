//! The closed message catalog.
//!
//! Every message on the wire is one variant of [`Message`], discriminated by
//! the `message_type` tag. Unknown message types fail deserialization.

mod command;
mod credit;
mod data;
mod lifecycle;
mod records;
mod telemetry;
mod worker;

pub use command::*;
pub use credit::*;
pub use data::*;
pub use lifecycle::*;
pub use records::*;
pub use telemetry::*;
pub use worker::*;

use serde::{Deserialize, Serialize};

/// Discriminant for every message in the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Status,
    Heartbeat,
    Error,
    Command,
    CommandResponse,
    CreditDrop,
    CreditReturn,
    CreditPhaseStart,
    CreditPhaseProgress,
    CreditPhaseSendingComplete,
    CreditPhaseComplete,
    CreditsComplete,
    ConversationRequest,
    ConversationResponse,
    DatasetTimingRequest,
    DatasetTimingResponse,
    InferenceResults,
    MetricRecords,
    RecordsProcessingStats,
    AllRecordsReceived,
    ProcessRecordsResult,
    RealtimeMetrics,
    TelemetryRecords,
    TelemetryStatus,
    ProcessTelemetryResult,
    RealtimeTelemetryMetrics,
    WorkerHealth,
    WorkerStatusSummary,
}

/// Every message that can cross the comms fabric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "message_type", rename_all = "snake_case")]
pub enum Message {
    Status(StatusMessage),
    Heartbeat(HeartbeatMessage),
    Error(ErrorMessage),
    Command(CommandMessage),
    CommandResponse(CommandResponse),
    CreditDrop(CreditDropMessage),
    CreditReturn(CreditReturnMessage),
    CreditPhaseStart(CreditPhaseStartMessage),
    CreditPhaseProgress(CreditPhaseProgressMessage),
    CreditPhaseSendingComplete(CreditPhaseSendingCompleteMessage),
    CreditPhaseComplete(CreditPhaseCompleteMessage),
    CreditsComplete(CreditsCompleteMessage),
    ConversationRequest(ConversationRequestMessage),
    ConversationResponse(ConversationResponseMessage),
    DatasetTimingRequest(DatasetTimingRequestMessage),
    DatasetTimingResponse(DatasetTimingResponseMessage),
    InferenceResults(InferenceResultsMessage),
    MetricRecords(MetricRecordsMessage),
    RecordsProcessingStats(RecordsProcessingStatsMessage),
    AllRecordsReceived(AllRecordsReceivedMessage),
    ProcessRecordsResult(ProcessRecordsResultMessage),
    RealtimeMetrics(RealtimeMetricsMessage),
    TelemetryRecords(TelemetryRecordsMessage),
    TelemetryStatus(TelemetryStatusMessage),
    ProcessTelemetryResult(ProcessTelemetryResultMessage),
    RealtimeTelemetryMetrics(RealtimeTelemetryMetricsMessage),
    WorkerHealth(WorkerHealthMessage),
    WorkerStatusSummary(WorkerStatusSummaryMessage),
}

impl Message {
    /// The discriminant of this message.
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::Status(_) => MessageType::Status,
            Message::Heartbeat(_) => MessageType::Heartbeat,
            Message::Error(_) => MessageType::Error,
            Message::Command(_) => MessageType::Command,
            Message::CommandResponse(_) => MessageType::CommandResponse,
            Message::CreditDrop(_) => MessageType::CreditDrop,
            Message::CreditReturn(_) => MessageType::CreditReturn,
            Message::CreditPhaseStart(_) => MessageType::CreditPhaseStart,
            Message::CreditPhaseProgress(_) => MessageType::CreditPhaseProgress,
            Message::CreditPhaseSendingComplete(_) => MessageType::CreditPhaseSendingComplete,
            Message::CreditPhaseComplete(_) => MessageType::CreditPhaseComplete,
            Message::CreditsComplete(_) => MessageType::CreditsComplete,
            Message::ConversationRequest(_) => MessageType::ConversationRequest,
            Message::ConversationResponse(_) => MessageType::ConversationResponse,
            Message::DatasetTimingRequest(_) => MessageType::DatasetTimingRequest,
            Message::DatasetTimingResponse(_) => MessageType::DatasetTimingResponse,
            Message::InferenceResults(_) => MessageType::InferenceResults,
            Message::MetricRecords(_) => MessageType::MetricRecords,
            Message::RecordsProcessingStats(_) => MessageType::RecordsProcessingStats,
            Message::AllRecordsReceived(_) => MessageType::AllRecordsReceived,
            Message::ProcessRecordsResult(_) => MessageType::ProcessRecordsResult,
            Message::RealtimeMetrics(_) => MessageType::RealtimeMetrics,
            Message::TelemetryRecords(_) => MessageType::TelemetryRecords,
            Message::TelemetryStatus(_) => MessageType::TelemetryStatus,
            Message::ProcessTelemetryResult(_) => MessageType::ProcessTelemetryResult,
            Message::RealtimeTelemetryMetrics(_) => MessageType::RealtimeTelemetryMetrics,
            Message::WorkerHealth(_) => MessageType::WorkerHealth,
            Message::WorkerStatusSummary(_) => MessageType::WorkerStatusSummary,
        }
    }

    /// The sending service's id.
    pub fn service_id(&self) -> &str {
        match self {
            Message::Status(m) => &m.service_id,
            Message::Heartbeat(m) => &m.service_id,
            Message::Error(m) => &m.service_id,
            Message::Command(m) => &m.service_id,
            Message::CommandResponse(m) => &m.service_id,
            Message::CreditDrop(m) => &m.service_id,
            Message::CreditReturn(m) => &m.service_id,
            Message::CreditPhaseStart(m) => &m.service_id,
            Message::CreditPhaseProgress(m) => &m.service_id,
            Message::CreditPhaseSendingComplete(m) => &m.service_id,
            Message::CreditPhaseComplete(m) => &m.service_id,
            Message::CreditsComplete(m) => &m.service_id,
            Message::ConversationRequest(m) => &m.service_id,
            Message::ConversationResponse(m) => &m.service_id,
            Message::DatasetTimingRequest(m) => &m.service_id,
            Message::DatasetTimingResponse(m) => &m.service_id,
            Message::InferenceResults(m) => &m.service_id,
            Message::MetricRecords(m) => &m.service_id,
            Message::RecordsProcessingStats(m) => &m.service_id,
            Message::AllRecordsReceived(m) => &m.service_id,
            Message::ProcessRecordsResult(m) => &m.service_id,
            Message::RealtimeMetrics(m) => &m.service_id,
            Message::TelemetryRecords(m) => &m.service_id,
            Message::TelemetryStatus(m) => &m.service_id,
            Message::ProcessTelemetryResult(m) => &m.service_id,
            Message::RealtimeTelemetryMetrics(m) => &m.service_id,
            Message::WorkerHealth(m) => &m.service_id,
            Message::WorkerStatusSummary(m) => &m.service_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enums::{CreditPhase, LifecycleState, ServiceType};

    #[test]
    fn test_message_round_trip() {
        let msg = Message::Status(StatusMessage {
            service_id: "worker_abc123".to_string(),
            service_type: ServiceType::Worker,
            request_ns: 42,
            state: LifecycleState::Running,
        });
        let json = serde_json::to_string(&msg).expect("serialize");
        assert!(json.contains("\"message_type\":\"status\""));
        let back: Message = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, msg);
    }

    #[test]
    fn test_credit_drop_round_trip() {
        let msg = Message::CreditDrop(CreditDropMessage {
            service_id: "timing_manager_1".to_string(),
            request_ns: 7,
            phase: CreditPhase::Profiling,
            conversation_id: Some("session-9".to_string()),
            credit_drop_ns: Some(123_456),
            should_cancel: true,
            cancel_after_ns: Some(1_000_000),
        });
        let json = serde_json::to_string(&msg).expect("serialize");
        let back: Message = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, msg);
        assert_eq!(back.message_type(), MessageType::CreditDrop);
        assert_eq!(back.service_id(), "timing_manager_1");
    }

    #[test]
    fn test_unknown_message_type_rejected() {
        let json = r#"{"message_type":"mystery","service_id":"x","request_ns":0}"#;
        let result: Result<Message, _> = serde_json::from_str(json);
        assert!(result.is_err());
    }

    #[test]
    fn test_metric_records_message_round_trip() {
        use crate::models::{MetricRecordData, MetricRecordMetadata, MetricValue};
        use std::collections::HashMap;

        let mut metrics = HashMap::new();
        metrics.insert("request_latency".to_string(), MetricValue::Scalar(12.5));
        metrics.insert(
            "inter_token_latency".to_string(),
            MetricValue::List(vec![1.0, 2.0]),
        );
        let msg = Message::MetricRecords(MetricRecordsMessage {
            service_id: "record_processor_1".to_string(),
            request_ns: 3,
            data: MetricRecordData {
                metadata: MetricRecordMetadata {
                    session_num: 9,
                    worker_id: "worker_1".to_string(),
                    record_processor_id: "record_processor_1".to_string(),
                    benchmark_phase: CreditPhase::Profiling,
                    request_start_ns: 100,
                    request_end_ns: 200,
                    ..Default::default()
                },
                metrics,
                error: None,
            },
        });
        let json = serde_json::to_string(&msg).expect("serialize");
        let back: Message = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, msg);
    }

    #[test]
    fn test_command_and_response_round_trip() {
        let command = Message::Command(CommandMessage::to_service_type(
            "controller_1",
            ServiceType::RecordsManager,
            Command::ProcessRecords { cancelled: true },
        ));
        let json = serde_json::to_string(&command).expect("serialize");
        assert!(json.contains("\"command_type\":\"process_records\""));
        let back: Message = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, command);

        let Message::Command(original) = &command else {
            unreachable!()
        };
        let response = Message::CommandResponse(CommandResponse::failure(
            "records_manager_1",
            original,
            crate::models::ErrorDetails::new("ServiceError", "boom").with_code(500),
        ));
        let json = serde_json::to_string(&response).expect("serialize");
        let back: Message = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, response);
    }
}
