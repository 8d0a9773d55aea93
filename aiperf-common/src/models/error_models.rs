//! Wire-level error details and exit error tracking.

use serde::{Deserialize, Serialize};

use crate::error::AIPerfError;

/// Structured error details carried inside messages and records.
///
/// Identity (Eq + Hash) is by all three fields, so identical failures
/// aggregate in error summaries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ErrorDetails {
    /// Stable error type name, e.g. `InvalidInferenceResultError`.
    pub error_type: String,
    /// Human-readable message.
    pub message: String,
    /// Optional status code (e.g. HTTP status).
    pub code: Option<u16>,
}

impl ErrorDetails {
    pub fn new(error_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error_type: error_type.into(),
            message: message.into(),
            code: None,
        }
    }

    pub fn with_code(mut self, code: u16) -> Self {
        self.code = Some(code);
        self
    }
}

impl From<&AIPerfError> for ErrorDetails {
    fn from(err: &AIPerfError) -> Self {
        Self {
            error_type: err.error_type().to_string(),
            message: err.to_string(),
            code: err.code(),
        }
    }
}

impl std::fmt::Display for ErrorDetails {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.code {
            Some(code) => write!(f, "{} ({}): {}", self.error_type, code, self.message),
            None => write!(f, "{}: {}", self.error_type, self.message),
        }
    }
}

/// An error details value together with how many times it was observed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetailsCount {
    pub error_details: ErrorDetails,
    pub count: u64,
}

/// A fatal error tied to a controller operation, reported at exit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitErrorInfo {
    pub error_details: ErrorDetails,
    /// The operation that failed, e.g. `Register Services`.
    pub operation: String,
    /// The service the error came from, when known.
    pub service_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_details_identity_aggregates() {
        use std::collections::HashMap;
        let a = ErrorDetails::new("TimeoutError", "timed out");
        let b = ErrorDetails::new("TimeoutError", "timed out");
        let mut summary: HashMap<ErrorDetails, u64> = HashMap::new();
        *summary.entry(a).or_default() += 1;
        *summary.entry(b).or_default() += 1;
        assert_eq!(summary.len(), 1);
        assert_eq!(summary.values().sum::<u64>(), 2);
    }

    #[test]
    fn test_from_aiperf_error_carries_code() {
        let err = AIPerfError::SSEResponse {
            message: "RateLimit".to_string(),
            code: 502,
        };
        let details = ErrorDetails::from(&err);
        assert_eq!(details.error_type, "SSEResponseError");
        assert_eq!(details.code, Some(502));
        assert!(details.message.contains("RateLimit"));
    }
}
