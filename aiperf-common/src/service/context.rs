//! Per-service runtime context: identity, comms handles, state, and
//! command/response RPC.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::watch;
use tracing::debug;
use uuid::Uuid;

use crate::comms::{CommAddress, Comms, PubClient};
use crate::config::ServiceConfig;
use crate::enums::ServiceType;
use crate::error::{AIPerfError, AIPerfResult};
use crate::lifecycle::{ChildLifecycles, StateCell};
use crate::messages::{CommandMessage, CommandResponse, Message};
use crate::models::ErrorDetails;
use crate::time_ns;

/// Shared runtime context handed to every service hook.
pub struct ServiceContext {
    pub service_id: String,
    pub service_type: ServiceType,
    pub service_config: Arc<ServiceConfig>,
    comms: Comms,
    pub(crate) state: StateCell,
    pub(crate) children: ChildLifecycles,
    event_pub: PubClient,
    command_pub: PubClient,
    response_pub: PubClient,
    stop_tx: watch::Sender<bool>,
    /// In-flight command RPCs awaiting responses, keyed by command id.
    pending_responses: DashMap<String, flume::Sender<CommandResponse>>,
    /// Responses already produced, re-published verbatim on retries.
    pub(crate) seen_commands: DashMap<String, CommandResponse>,
}

impl ServiceContext {
    /// Create a context with a generated `{type}_{8-hex}` service id.
    pub fn new(
        service_type: ServiceType,
        comms: Comms,
        service_config: Arc<ServiceConfig>,
    ) -> AIPerfResult<Arc<Self>> {
        let suffix = Uuid::new_v4().simple().to_string();
        let service_id = format!("{}_{}", service_type.id_prefix(), &suffix[..8]);
        Self::with_id(service_id, service_type, comms, service_config)
    }

    /// Create a context with an explicit service id (used when the service
    /// manager assigns ids).
    pub fn with_id(
        service_id: String,
        service_type: ServiceType,
        comms: Comms,
        service_config: Arc<ServiceConfig>,
    ) -> AIPerfResult<Arc<Self>> {
        let event_pub = comms.create_pub_client(CommAddress::EventBus)?;
        let command_pub = comms.create_pub_client(CommAddress::Command)?;
        let response_pub = comms.create_pub_client(CommAddress::Response)?;
        let (stop_tx, _) = watch::channel(false);
        Ok(Arc::new(Self {
            service_id,
            service_type,
            service_config,
            comms,
            state: StateCell::new(),
            children: ChildLifecycles::new(),
            event_pub,
            command_pub,
            response_pub,
            stop_tx,
            pending_responses: DashMap::new(),
            seen_commands: DashMap::new(),
        }))
    }

    /// The comms fabric handle for creating additional clients.
    pub fn comms(&self) -> &Comms {
        &self.comms
    }

    /// Current lifecycle state.
    pub fn state(&self) -> crate::enums::LifecycleState {
        self.state.current()
    }

    /// Publish a message on the event bus.
    pub fn publish(&self, message: Message) {
        self.event_pub.publish(message);
    }

    /// Publish a command on the command bus.
    pub fn publish_command(&self, message: CommandMessage) {
        self.command_pub.publish(Message::Command(message));
    }

    /// Publish a command response on the response bus.
    pub fn publish_response(&self, response: CommandResponse) {
        self.response_pub.publish(Message::CommandResponse(response));
    }

    /// Attach a child lifecycle to this service.
    pub async fn attach_child_lifecycle(&self, child: Box<dyn crate::lifecycle::ChildLifecycle>) {
        self.children.attach(child).await;
    }

    /// Send a command and wait for the first response to it.
    ///
    /// The same [`CommandMessage`] (with its stable command id) may be passed
    /// again to retry; responders deduplicate by command id.
    pub async fn send_command_and_wait_for_response(
        &self,
        message: CommandMessage,
        timeout: Duration,
    ) -> AIPerfResult<CommandResponse> {
        let command_id = message.command_id.clone();
        let (tx, rx) = flume::bounded(8);
        self.pending_responses.insert(command_id.clone(), tx);
        self.publish_command(message);

        let result = match tokio::time::timeout(timeout, rx.recv_async()).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(AIPerfError::CommunicationNotInitialized),
            Err(_) => Err(AIPerfError::Timeout(timeout)),
        };
        self.pending_responses.remove(&command_id);
        result
    }

    /// Send a command and collect one response from every target service.
    ///
    /// Returns the collected responses plus the ids of targets that did not
    /// respond within the timeout.
    pub async fn send_command_and_wait_for_all_responses(
        &self,
        message: CommandMessage,
        target_ids: &[String],
        timeout: Duration,
    ) -> (Vec<CommandResponse>, Vec<String>) {
        let command_id = message.command_id.clone();
        let (tx, rx) = flume::unbounded();
        self.pending_responses.insert(command_id.clone(), tx);
        self.publish_command(message);

        let mut outstanding: std::collections::HashSet<String> =
            target_ids.iter().cloned().collect();
        let mut responses = Vec::with_capacity(target_ids.len());
        let deadline = tokio::time::Instant::now() + timeout;

        while !outstanding.is_empty() {
            match tokio::time::timeout_at(deadline, rx.recv_async()).await {
                Ok(Ok(response)) => {
                    if outstanding.remove(&response.service_id) {
                        responses.push(response);
                    } else {
                        debug!(
                            service_id = %response.service_id,
                            "duplicate or unexpected command response ignored"
                        );
                    }
                }
                Ok(Err(_)) | Err(_) => break,
            }
        }
        self.pending_responses.remove(&command_id);
        let missing = outstanding.into_iter().collect();
        (responses, missing)
    }

    /// Route an incoming command response to any waiting RPC.
    pub(crate) fn route_command_response(&self, response: CommandResponse) {
        if let Some(pending) = self.pending_responses.get(&response.command_id) {
            let _ = pending.value().send(response);
        }
    }

    /// Request graceful shutdown. Idempotent.
    pub fn request_stop(&self) {
        if !self.stop_requested() {
            debug!(service_id = %self.service_id, "stop requested");
        }
        let _ = self.stop_tx.send(true);
    }

    /// Whether shutdown has been requested.
    pub fn stop_requested(&self) -> bool {
        *self.stop_tx.borrow()
    }

    /// Resolve once shutdown has been requested.
    pub async fn wait_for_stop(&self) {
        let mut rx = self.stop_tx.subscribe();
        while !*rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Build an error-details value attributed to this service.
    pub fn error_details(&self, err: &AIPerfError) -> ErrorDetails {
        ErrorDetails::from(err)
    }

    /// Convenience wall-clock timestamp for message construction.
    pub fn now_ns(&self) -> u64 {
        time_ns()
    }
}
