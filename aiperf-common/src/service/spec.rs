//! Declarative service registration tables.

use std::time::Duration;

use crate::comms::CommAddress;
use crate::constants::DEFAULT_PULL_CLIENT_MAX_CONCURRENCY;
use crate::enums::ServiceType;
use crate::messages::MessageType;

/// A pull-queue binding: one handler per address with bounded concurrency.
#[derive(Debug, Clone)]
pub struct PullBinding {
    pub address: CommAddress,
    /// At most this many handler invocations in flight; the unconsumed
    /// remainder backs up in the queue.
    pub max_concurrency: usize,
}

impl PullBinding {
    pub fn new(address: CommAddress) -> Self {
        Self {
            address,
            max_concurrency: DEFAULT_PULL_CLIENT_MAX_CONCURRENCY,
        }
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }
}

/// A supervised background task, started on start and cancelled on stop.
#[derive(Debug, Clone)]
pub struct BackgroundTaskSpec {
    /// Name passed back to `on_background_task`.
    pub name: &'static str,
    /// Time between iterations; `None` runs the task once.
    pub interval: Option<Duration>,
    /// Run once immediately instead of sleeping first.
    pub immediate: bool,
    /// Terminate the task on error instead of logging and continuing.
    pub stop_on_error: bool,
}

impl BackgroundTaskSpec {
    pub fn interval(name: &'static str, interval: Duration) -> Self {
        Self {
            name,
            interval: Some(interval),
            immediate: false,
            stop_on_error: false,
        }
    }

    pub fn once(name: &'static str) -> Self {
        Self {
            name,
            interval: None,
            immediate: true,
            stop_on_error: false,
        }
    }

    pub fn immediate(mut self) -> Self {
        self.immediate = true;
        self
    }

    pub fn stop_on_error(mut self) -> Self {
        self.stop_on_error = true;
        self
    }
}

/// Everything the harness needs to wire a service into the fabric.
#[derive(Debug, Clone)]
pub struct ServiceSpec {
    pub service_type: ServiceType,
    /// Component services self-register with the controller and heartbeat.
    pub component: bool,
    /// Event-bus message types routed to `on_message`.
    pub subscriptions: Vec<MessageType>,
    /// Pull queues routed to `on_pull_message`.
    pub pull_bindings: Vec<PullBinding>,
    /// Req/rep addresses served by `on_request`.
    pub reply_bindings: Vec<CommAddress>,
    /// Supervised background tasks.
    pub background_tasks: Vec<BackgroundTaskSpec>,
}

impl ServiceSpec {
    /// A component service with no bindings.
    pub fn component(service_type: ServiceType) -> Self {
        Self {
            service_type,
            component: true,
            subscriptions: Vec::new(),
            pull_bindings: Vec::new(),
            reply_bindings: Vec::new(),
            background_tasks: Vec::new(),
        }
    }

    /// A non-registering service (the system controller).
    pub fn controller(service_type: ServiceType) -> Self {
        Self {
            component: false,
            ..Self::component(service_type)
        }
    }
}

/// What a command handler did with a command.
#[derive(Debug, Clone)]
pub enum CommandOutcome {
    /// Handled successfully, optionally with a result payload.
    Success(Option<serde_json::Value>),
    /// Received and acted on asynchronously.
    Acknowledged,
    /// Not a command this service handles.
    Unhandled,
}
