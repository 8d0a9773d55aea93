//! Closed enums shared across the AIPerf system.

use serde::{Deserialize, Serialize};

/// The type of a running service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceType {
    SystemController,
    DatasetManager,
    TimingManager,
    WorkerManager,
    Worker,
    RecordsManager,
    RecordProcessor,
    TelemetryManager,
}

impl ServiceType {
    /// Short prefix used when generating service ids.
    pub fn id_prefix(&self) -> &'static str {
        match self {
            ServiceType::SystemController => "system_controller",
            ServiceType::DatasetManager => "dataset_manager",
            ServiceType::TimingManager => "timing_manager",
            ServiceType::WorkerManager => "worker_manager",
            ServiceType::Worker => "worker",
            ServiceType::RecordsManager => "records_manager",
            ServiceType::RecordProcessor => "record_processor",
            ServiceType::TelemetryManager => "telemetry_manager",
        }
    }

    /// Human-readable display name.
    pub fn display_name(&self) -> &'static str {
        match self {
            ServiceType::SystemController => "System Controller",
            ServiceType::DatasetManager => "Dataset Manager",
            ServiceType::TimingManager => "Timing Manager",
            ServiceType::WorkerManager => "Worker Manager",
            ServiceType::Worker => "Worker",
            ServiceType::RecordsManager => "Records Manager",
            ServiceType::RecordProcessor => "Record Processor",
            ServiceType::TelemetryManager => "Telemetry Manager",
        }
    }
}

impl std::fmt::Display for ServiceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id_prefix())
    }
}

/// Lifecycle state of a service or lifecycle-bearing component.
///
/// Transitions are strictly monotonic except Failed, which is reachable from
/// any non-terminal state and is itself terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Created,
    Initializing,
    Initialized,
    Starting,
    Running,
    Stopping,
    Stopped,
    Failed,
}

impl LifecycleState {
    /// Whether no further transitions are permitted from this state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, LifecycleState::Stopped | LifecycleState::Failed)
    }

    /// Whether `next` is a legal transition from this state.
    pub fn can_transition_to(&self, next: LifecycleState) -> bool {
        if self.is_terminal() {
            return false;
        }
        if next == LifecycleState::Failed {
            return true;
        }
        // Monotonic forward progress only.
        (*self as u8) < (next as u8) && next != LifecycleState::Created
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LifecycleState::Created => "created",
            LifecycleState::Initializing => "initializing",
            LifecycleState::Initialized => "initialized",
            LifecycleState::Starting => "starting",
            LifecycleState::Running => "running",
            LifecycleState::Stopping => "stopping",
            LifecycleState::Stopped => "stopped",
            LifecycleState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Registration status of a service as tracked by the system controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceRegistrationStatus {
    Unregistered,
    Registered,
}

/// The benchmark phase a credit belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreditPhase {
    /// Requests issued to warm the target; records are discarded.
    Warmup,
    /// Measured requests.
    Profiling,
}

impl Default for CreditPhase {
    fn default() -> Self {
        CreditPhase::Profiling
    }
}

impl std::fmt::Display for CreditPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CreditPhase::Warmup => f.write_str("warmup"),
            CreditPhase::Profiling => f.write_str("profiling"),
        }
    }
}

/// Commands carried on the command bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandType {
    RegisterService,
    Shutdown,
    ProfileConfigure,
    ProfileStart,
    ProfileCancel,
    ProcessRecords,
    SpawnWorkers,
    ShutdownWorkers,
    RealtimeMetrics,
    StartRealtimeTelemetry,
}

/// Status of a command response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandResponseStatus {
    Success,
    Acknowledged,
    Unhandled,
    Failure,
}

/// Derived health status of a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    Healthy,
    Idle,
    HighLoad,
    Error,
    Stale,
}

/// The credit issuing strategy selected by the timing manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimingMode {
    FixedSchedule,
    Concurrency,
    RequestRate,
}

/// Inter-arrival distribution for the request-rate strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateDistribution {
    Constant,
    Poisson,
}

/// The wire format family of an inference endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointType {
    Chat,
    Completions,
    Embeddings,
    Rankings,
}

impl EndpointType {
    /// Whether responses from this endpoint may arrive as an SSE stream.
    pub fn supports_streaming(&self) -> bool {
        matches!(self, EndpointType::Chat | EndpointType::Completions)
    }
}

/// GPU telemetry collection mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GpuTelemetryMode {
    #[default]
    Disabled,
    Summary,
    RealtimeDashboard,
}

/// Why a records phase was considered complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionReason {
    AllRequestsProcessed,
    DurationTimeout,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_monotonic_transitions() {
        assert!(LifecycleState::Created.can_transition_to(LifecycleState::Initializing));
        assert!(LifecycleState::Initializing.can_transition_to(LifecycleState::Initialized));
        assert!(LifecycleState::Running.can_transition_to(LifecycleState::Stopping));
        assert!(!LifecycleState::Running.can_transition_to(LifecycleState::Starting));
        assert!(!LifecycleState::Stopped.can_transition_to(LifecycleState::Running));
    }

    #[test]
    fn test_failed_is_reachable_and_terminal() {
        assert!(LifecycleState::Created.can_transition_to(LifecycleState::Failed));
        assert!(LifecycleState::Running.can_transition_to(LifecycleState::Failed));
        assert!(LifecycleState::Stopping.can_transition_to(LifecycleState::Failed));
        assert!(!LifecycleState::Failed.can_transition_to(LifecycleState::Stopped));
        assert!(!LifecycleState::Failed.can_transition_to(LifecycleState::Failed));
        assert!(!LifecycleState::Stopped.can_transition_to(LifecycleState::Failed));
    }

    #[test]
    fn test_service_type_serde_round_trip() {
        let json = serde_json::to_string(&ServiceType::RecordsManager).expect("serialize");
        assert_eq!(json, "\"records_manager\"");
        let back: ServiceType = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, ServiceType::RecordsManager);
    }

    #[test]
    fn test_unknown_enum_value_rejected() {
        let result: Result<ServiceType, _> = serde_json::from_str("\"mystery_service\"");
        assert!(result.is_err());
    }
}
