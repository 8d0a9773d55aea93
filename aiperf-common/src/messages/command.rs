//! Command and command-response envelopes.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::UserConfig;
use crate::enums::{CommandResponseStatus, CommandType, LifecycleState, ServiceType};
use crate::models::ErrorDetails;
use crate::time_ns;

/// A command plus its typed payload, discriminated by `command_type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command_type", rename_all = "snake_case")]
pub enum Command {
    /// Register the sending service with the system controller.
    /// Never broadcast; always targeted at the controller.
    RegisterService {
        service_type: ServiceType,
        state: LifecycleState,
    },
    Shutdown,
    ProfileConfigure {
        config: Box<UserConfig>,
    },
    ProfileStart,
    ProfileCancel,
    ProcessRecords {
        cancelled: bool,
    },
    SpawnWorkers {
        num_workers: usize,
    },
    ShutdownWorkers {
        all_workers: bool,
    },
    RealtimeMetrics,
    StartRealtimeTelemetry,
}

impl Command {
    /// The command discriminant.
    pub fn command_type(&self) -> CommandType {
        match self {
            Command::RegisterService { .. } => CommandType::RegisterService,
            Command::Shutdown => CommandType::Shutdown,
            Command::ProfileConfigure { .. } => CommandType::ProfileConfigure,
            Command::ProfileStart => CommandType::ProfileStart,
            Command::ProfileCancel => CommandType::ProfileCancel,
            Command::ProcessRecords { .. } => CommandType::ProcessRecords,
            Command::SpawnWorkers { .. } => CommandType::SpawnWorkers,
            Command::ShutdownWorkers { .. } => CommandType::ShutdownWorkers,
            Command::RealtimeMetrics => CommandType::RealtimeMetrics,
            Command::StartRealtimeTelemetry => CommandType::StartRealtimeTelemetry,
        }
    }
}

/// The command bus envelope.
///
/// When both `target_service_id` and `target_service_type` are unset the
/// command is a broadcast. `command_id` is stable across retries so
/// responders can deduplicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandMessage {
    pub service_id: String,
    pub request_ns: u64,
    pub command_id: String,
    #[serde(flatten)]
    pub command: Command,
    pub target_service_id: Option<String>,
    pub target_service_type: Option<ServiceType>,
    #[serde(default)]
    pub require_response: bool,
}

impl CommandMessage {
    /// Build a broadcast command requiring responses.
    pub fn broadcast(service_id: impl Into<String>, command: Command) -> Self {
        Self {
            service_id: service_id.into(),
            request_ns: time_ns(),
            command_id: Uuid::new_v4().to_string(),
            command,
            target_service_id: None,
            target_service_type: None,
            require_response: true,
        }
    }

    /// Build a command targeted at one service type.
    pub fn to_service_type(
        service_id: impl Into<String>,
        target: ServiceType,
        command: Command,
    ) -> Self {
        Self {
            target_service_type: Some(target),
            ..Self::broadcast(service_id, command)
        }
    }

    /// Build a command targeted at one specific service id.
    pub fn to_service_id(
        service_id: impl Into<String>,
        target: impl Into<String>,
        command: Command,
    ) -> Self {
        Self {
            target_service_id: Some(target.into()),
            ..Self::broadcast(service_id, command)
        }
    }

    /// Whether the given service should act on this command.
    pub fn targets(&self, service_id: &str, service_type: ServiceType) -> bool {
        match (&self.target_service_id, &self.target_service_type) {
            (Some(id), _) => id == service_id,
            (None, Some(ty)) => *ty == service_type,
            (None, None) => true,
        }
    }
}

/// Response to a command, correlated by `command_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandResponse {
    pub service_id: String,
    pub request_ns: u64,
    pub command_id: String,
    pub command: CommandType,
    pub status: CommandResponseStatus,
    /// Result payload for Success responses that carry data.
    pub result: Option<serde_json::Value>,
    /// Error details for Failure responses.
    pub error: Option<ErrorDetails>,
}

impl CommandResponse {
    pub fn success(
        service_id: impl Into<String>,
        message: &CommandMessage,
        result: Option<serde_json::Value>,
    ) -> Self {
        Self {
            service_id: service_id.into(),
            request_ns: time_ns(),
            command_id: message.command_id.clone(),
            command: message.command.command_type(),
            status: CommandResponseStatus::Success,
            result,
            error: None,
        }
    }

    pub fn acknowledged(service_id: impl Into<String>, message: &CommandMessage) -> Self {
        Self {
            status: CommandResponseStatus::Acknowledged,
            ..Self::success(service_id, message, None)
        }
    }

    pub fn unhandled(service_id: impl Into<String>, message: &CommandMessage) -> Self {
        Self {
            status: CommandResponseStatus::Unhandled,
            ..Self::success(service_id, message, None)
        }
    }

    pub fn failure(
        service_id: impl Into<String>,
        message: &CommandMessage,
        error: ErrorDetails,
    ) -> Self {
        Self {
            status: CommandResponseStatus::Failure,
            error: Some(error),
            ..Self::success(service_id, message, None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_targeting() {
        let broadcast = CommandMessage::broadcast("controller", Command::ProfileStart);
        assert!(broadcast.targets("worker_1", ServiceType::Worker));
        assert!(broadcast.targets("records_manager_1", ServiceType::RecordsManager));

        let typed = CommandMessage::to_service_type(
            "controller",
            ServiceType::RecordsManager,
            Command::RealtimeMetrics,
        );
        assert!(typed.targets("records_manager_1", ServiceType::RecordsManager));
        assert!(!typed.targets("worker_1", ServiceType::Worker));

        let direct =
            CommandMessage::to_service_id("controller", "worker_1", Command::Shutdown);
        assert!(direct.targets("worker_1", ServiceType::Worker));
        assert!(!direct.targets("worker_2", ServiceType::Worker));
    }

    #[test]
    fn test_command_round_trip_with_flattened_payload() {
        let msg = CommandMessage::broadcast(
            "worker_manager_1",
            Command::SpawnWorkers { num_workers: 8 },
        );
        let json = serde_json::to_string(&msg).expect("serialize");
        assert!(json.contains("\"command_type\":\"spawn_workers\""));
        let back: CommandMessage = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, msg);
        assert_eq!(back.command.command_type(), CommandType::SpawnWorkers);
    }

    #[test]
    fn test_command_id_is_stable_for_clones() {
        let msg = CommandMessage::broadcast("svc", Command::ProfileStart);
        let retry = msg.clone();
        assert_eq!(msg.command_id, retry.command_id);
    }
}
