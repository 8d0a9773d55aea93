//! The service runtime: hook trait, registration spec, context, and the
//! harness that drives every service's lifecycle and event loops.

mod context;
mod harness;
mod spec;

pub use context::ServiceContext;
pub use harness::ServiceHarness;
pub use spec::{BackgroundTaskSpec, CommandOutcome, PullBinding, ServiceSpec};

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::comms::CommAddress;
use crate::enums::LifecycleState;
use crate::error::{AIPerfError, AIPerfResult};
use crate::messages::{CommandMessage, Message};

/// A service's hook surface.
///
/// Hooks are registered declaratively through [`ServiceSpec`] and invoked by
/// the [`ServiceHarness`]; handlers of the same kind run sequentially in the
/// order events arrive. Services keep their mutable state behind internal
/// locks, so every hook takes `&self`.
#[async_trait]
pub trait Service: Send + Sync + 'static {
    /// Declarative registration table: subscriptions, pull bindings,
    /// background tasks.
    fn spec(&self) -> ServiceSpec;

    /// Runs while the service transitions Initializing -> Initialized.
    /// An error here aborts the service.
    async fn on_init(&self, _ctx: &Arc<ServiceContext>) -> AIPerfResult<()> {
        Ok(())
    }

    /// Runs while the service transitions Starting -> Running.
    /// An error here aborts the service.
    async fn on_start(&self, _ctx: &Arc<ServiceContext>) -> AIPerfResult<()> {
        Ok(())
    }

    /// Runs while the service transitions Stopping -> Stopped.
    async fn on_stop(&self, _ctx: &Arc<ServiceContext>) -> AIPerfResult<()> {
        Ok(())
    }

    /// Observes every lifecycle transition.
    async fn on_state_change(
        &self,
        _ctx: &Arc<ServiceContext>,
        _old: LifecycleState,
        _new: LifecycleState,
    ) {
    }

    /// Handles event-bus messages of the subscribed types.
    async fn on_message(&self, _ctx: &Arc<ServiceContext>, _message: Message) -> AIPerfResult<()> {
        Ok(())
    }

    /// Handles messages delivered through a pull binding.
    async fn on_pull_message(
        &self,
        _ctx: &Arc<ServiceContext>,
        _address: CommAddress,
        _message: Message,
    ) -> AIPerfResult<()> {
        Ok(())
    }

    /// Handles commands addressed to this service. Shutdown is handled by
    /// the harness before this is called.
    async fn on_command(
        &self,
        _ctx: &Arc<ServiceContext>,
        _command: &CommandMessage,
    ) -> AIPerfResult<CommandOutcome> {
        Ok(CommandOutcome::Unhandled)
    }

    /// Handles req/rep requests on the service's reply bindings.
    async fn on_request(
        &self,
        _ctx: &Arc<ServiceContext>,
        _message: Message,
    ) -> AIPerfResult<Message> {
        Err(AIPerfError::InvalidState(
            "service has no request handler".to_string(),
        ))
    }

    /// One iteration of the named background task.
    async fn on_background_task(&self, _ctx: &Arc<ServiceContext>, _name: &str) -> AIPerfResult<()> {
        Ok(())
    }

    /// Dynamic override of a background task's interval, re-read every
    /// iteration. `None` keeps the interval declared in the registration
    /// table.
    fn task_interval(&self, _name: &str) -> Option<Duration> {
        None
    }
}
