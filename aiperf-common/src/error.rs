//! Error types for the AIPerf system.

use thiserror::Error;

/// Result type for AIPerf operations.
pub type AIPerfResult<T> = Result<T, AIPerfError>;

/// Comprehensive error types for the AIPerf system.
#[derive(Error, Debug)]
pub enum AIPerfError {
    /// Invalid or contradictory user configuration. Fatal at start.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A service lifecycle operation failed.
    #[error("Lifecycle operation '{operation}' failed for {lifecycle_id}: {reason}")]
    LifecycleOperation {
        operation: String,
        lifecycle_id: String,
        reason: String,
    },

    /// A service failed outside of a specific lifecycle operation.
    #[error("Service error: {0}")]
    Service(String),

    /// No comms client exists for the requested address.
    #[error("Communication client not found for address: {0}")]
    CommunicationClientNotFound(String),

    /// The comms fabric could not be brought up.
    #[error("Failed to create communication: {0}")]
    CommunicationCreate(String),

    /// Comms used before initialization.
    #[error("Communication is not initialized")]
    CommunicationNotInitialized,

    /// An awaited RPC exceeded its timeout.
    #[error("Operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Structural invalidity of a request record.
    #[error("Invalid inference result: {0}")]
    InvalidInferenceResult(String),

    /// An explicit error event in an SSE stream.
    #[error("SSE response error: {message}")]
    SSEResponse { message: String, code: u16 },

    /// Metric dependency resolution could not make progress.
    #[error("Circular or unsatisfiable metric dependencies: {missing:?}")]
    CircularDependency { missing: Vec<String> },

    /// A factory could not create the requested instance.
    #[error("Factory creation error: {0}")]
    FactoryCreation(String),

    /// A results processor is disabled for this configuration.
    #[error("Post processor disabled: {0}")]
    PostProcessorDisabled(String),

    /// A component was used before it was initialized.
    #[error("Not initialized: {0}")]
    NotInitialized(String),

    /// An operation was attempted in an invalid state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Failure in the underlying HTTP transport.
    #[error("Inference request error: {0}")]
    InferenceRequest(String),

    /// Filesystem failure writing artifacts or logs.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization failure for a message or artifact.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AIPerfError {
    /// Stable type name used in wire-level error details.
    pub fn error_type(&self) -> &'static str {
        match self {
            AIPerfError::Configuration(_) => "ConfigurationError",
            AIPerfError::LifecycleOperation { .. } => "LifecycleOperationError",
            AIPerfError::Service(_) => "ServiceError",
            AIPerfError::CommunicationClientNotFound(_) => "CommunicationClientNotFoundError",
            AIPerfError::CommunicationCreate(_) => "CommunicationCreateError",
            AIPerfError::CommunicationNotInitialized => "CommunicationNotInitializedError",
            AIPerfError::Timeout(_) => "TimeoutError",
            AIPerfError::InvalidInferenceResult(_) => "InvalidInferenceResultError",
            AIPerfError::SSEResponse { .. } => "SSEResponseError",
            AIPerfError::CircularDependency { .. } => "CircularDependencyError",
            AIPerfError::FactoryCreation(_) => "FactoryCreationError",
            AIPerfError::PostProcessorDisabled(_) => "PostProcessorDisabled",
            AIPerfError::NotInitialized(_) => "NotInitializedError",
            AIPerfError::InvalidState(_) => "InvalidStateError",
            AIPerfError::InferenceRequest(_) => "InferenceRequestError",
            AIPerfError::Io(_) => "IoError",
            AIPerfError::Serialization(_) => "SerializationError",
        }
    }

    /// Optional wire-level status code associated with this error.
    pub fn code(&self) -> Option<u16> {
        match self {
            AIPerfError::SSEResponse { code, .. } => Some(*code),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_types_are_stable() {
        let err = AIPerfError::InvalidInferenceResult("no responses".to_string());
        assert_eq!(err.error_type(), "InvalidInferenceResultError");

        let err = AIPerfError::SSEResponse {
            message: "RateLimit".to_string(),
            code: 502,
        };
        assert_eq!(err.error_type(), "SSEResponseError");
        assert_eq!(err.code(), Some(502));
    }

    #[test]
    fn test_timeout_is_not_fatal_kind() {
        let err = AIPerfError::Timeout(std::time::Duration::from_secs(5));
        assert_eq!(err.error_type(), "TimeoutError");
        assert!(err.to_string().contains("timed out"));
    }
}
