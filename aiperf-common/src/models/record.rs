//! Request records and their parsed/processed forms.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::enums::CreditPhase;
use crate::models::error_models::ErrorDetails;

/// A single raw response (full body, or one SSE event) with the monotonic
/// time it was observed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseData {
    /// Monotonic clock reading when this response arrived.
    pub perf_ns: i64,
    /// Raw response text (an SSE `data` value for streamed responses).
    pub raw: String,
}

/// Per-attempt record produced by a worker for one credit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestRecord {
    /// Conversation this request belongs to.
    pub conversation_id: Option<String>,
    /// Index of the turn within the conversation.
    #[serde(default)]
    pub turn_index: usize,
    /// Model the request targeted.
    pub model_name: Option<String>,
    /// Wall-clock start of the request in nanoseconds.
    #[serde(default)]
    pub timestamp_ns: u64,
    /// Monotonic clock at request send.
    #[serde(default)]
    pub start_perf_ns: i64,
    /// Monotonic clock at final response.
    #[serde(default)]
    pub end_perf_ns: i64,
    /// Ordered responses (one entry for unary, one per event for SSE).
    #[serde(default)]
    pub responses: Vec<ResponseData>,
    /// HTTP status code, when a response was received.
    pub status: Option<u16>,
    /// Error details when the attempt failed.
    pub error: Option<ErrorDetails>,
    /// Which benchmark phase the credit belonged to.
    pub credit_phase: Option<CreditPhase>,
    /// start_perf_ns minus the monotonic time the credit drop arrived at
    /// the worker.
    #[serde(default)]
    pub credit_drop_latency: i64,
    /// How late the worker was relative to the scheduled drop time.
    pub delayed_ns: Option<u64>,
    /// Cancellation budget that applied to this request.
    pub cancel_after_ns: Option<u64>,
    /// Client-side input token estimate for the issued turn.
    pub input_token_count: Option<u64>,
}

impl RequestRecord {
    /// A record is valid iff it has no error, a positive monotonic start,
    /// and at least one response with monotonically increasing positive
    /// perf timestamps.
    pub fn valid(&self) -> bool {
        if self.error.is_some() || self.start_perf_ns <= 0 || self.responses.is_empty() {
            return false;
        }
        let mut last = self.start_perf_ns;
        for response in &self.responses {
            if response.perf_ns <= 0 || response.perf_ns < last {
                return false;
            }
            last = response.perf_ns;
        }
        true
    }

    /// Describe why this record is structurally invalid, if it is.
    ///
    /// Errors already attached to the record are not structural invalidity.
    pub fn invalid_reason(&self) -> Option<String> {
        if self.error.is_some() {
            return None;
        }
        if self.start_perf_ns <= 0 {
            return Some(format!(
                "non-positive start_perf_ns: {}",
                self.start_perf_ns
            ));
        }
        if self.responses.is_empty() {
            return Some("no responses received".to_string());
        }
        let mut last = self.start_perf_ns;
        for (i, response) in self.responses.iter().enumerate() {
            if response.perf_ns <= 0 {
                return Some(format!("response {i} has non-positive perf_ns"));
            }
            if response.perf_ns < last {
                return Some(format!("response {i} perf_ns is not monotonic"));
            }
            last = response.perf_ns;
        }
        None
    }

    /// Downgrade structural invalidity into an attached error so downstream
    /// processing counts the record as an error record.
    pub fn create_error_from_invalid(&mut self) {
        if let Some(reason) = self.invalid_reason() {
            self.error = Some(ErrorDetails::new("InvalidInferenceResultError", reason));
        }
    }
}

/// Content extracted from one parsed response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResponseContent {
    Text { text: String },
    ReasoningText { text: String },
    Embedding { values: Vec<f32> },
    Ranking { scores: Vec<f32> },
}

/// One parsed response with its arrival time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedResponse {
    pub perf_ns: i64,
    pub data: ResponseContent,
}

/// A request record plus parsed responses and token accounting.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedResponseRecord {
    pub record: RequestRecord,
    #[serde(default)]
    pub responses: Vec<ParsedResponse>,
    #[serde(default)]
    pub input_token_count: u64,
    #[serde(default)]
    pub output_token_count: u64,
    pub reasoning_token_count: Option<u64>,
    /// Prompt token count reported by the API usage block, when present.
    pub api_prompt_token_count: Option<u64>,
    /// Completion token count reported by the API usage block, when present.
    pub api_completion_token_count: Option<u64>,
}

/// A metric value for one record: scalar or per-response list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Scalar(f64),
    List(Vec<f64>),
}

impl MetricValue {
    /// Flatten into the individual sample values.
    pub fn samples(&self) -> Vec<f64> {
        match self {
            MetricValue::Scalar(v) => vec![*v],
            MetricValue::List(vs) => vs.clone(),
        }
    }

    /// The scalar value, if this is a scalar.
    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            MetricValue::Scalar(v) => Some(*v),
            MetricValue::List(_) => None,
        }
    }
}

/// Fixed metadata accompanying the per-metric values for one request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricRecordMetadata {
    /// Monotonically increasing per-processor sequence number.
    pub session_num: u64,
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub turn_index: usize,
    /// Wall-clock start of the request.
    pub request_start_ns: u64,
    /// Wall-clock first-byte acknowledgement, when known.
    pub request_ack_ns: Option<u64>,
    /// Wall-clock end of the request.
    pub request_end_ns: u64,
    pub worker_id: String,
    pub record_processor_id: String,
    pub benchmark_phase: CreditPhase,
    pub x_request_id: Option<String>,
    pub x_correlation_id: Option<String>,
}

/// The per-record data the records manager consumes: metadata plus the
/// computed metric values (or an error).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricRecordData {
    pub metadata: MetricRecordMetadata,
    #[serde(default)]
    pub metrics: HashMap<String, MetricValue>,
    pub error: Option<ErrorDetails>,
}

impl MetricRecordData {
    /// Valid iff no error is attached.
    pub fn valid(&self) -> bool {
        self.error.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_record() -> RequestRecord {
        RequestRecord {
            start_perf_ns: 1_000,
            end_perf_ns: 5_000,
            responses: vec![
                ResponseData {
                    perf_ns: 2_000,
                    raw: "a".to_string(),
                },
                ResponseData {
                    perf_ns: 3_000,
                    raw: "b".to_string(),
                },
            ],
            ..Default::default()
        }
    }

    #[test]
    fn test_valid_record() {
        assert!(valid_record().valid());
        assert_eq!(valid_record().invalid_reason(), None);
    }

    #[test]
    fn test_negative_start_is_invalid() {
        let mut record = valid_record();
        record.start_perf_ns = -1;
        assert!(!record.valid());
        record.create_error_from_invalid();
        let error = record.error.expect("expected downgraded error");
        assert_eq!(error.error_type, "InvalidInferenceResultError");
    }

    #[test]
    fn test_no_responses_is_invalid() {
        let mut record = valid_record();
        record.responses.clear();
        assert!(!record.valid());
        record.create_error_from_invalid();
        assert!(record
            .error
            .expect("expected downgraded error")
            .message
            .contains("no responses"));
    }

    #[test]
    fn test_non_monotonic_responses_are_invalid() {
        let mut record = valid_record();
        record.responses[1].perf_ns = 1_500;
        assert!(!record.valid());
    }

    #[test]
    fn test_errored_record_is_not_structurally_invalid() {
        let mut record = valid_record();
        record.error = Some(ErrorDetails::new("TimeoutError", "timed out"));
        assert!(!record.valid());
        // Existing errors are preserved, not overwritten.
        record.create_error_from_invalid();
        assert_eq!(
            record.error.expect("error kept").error_type,
            "TimeoutError"
        );
    }

    #[test]
    fn test_metric_value_samples() {
        assert_eq!(MetricValue::Scalar(2.0).samples(), vec![2.0]);
        assert_eq!(
            MetricValue::List(vec![1.0, 2.0]).samples(),
            vec![1.0, 2.0]
        );
    }
}
