//! The harness that drives a service's lifecycle and event loops.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::comms::CommAddress;
use crate::constants::{
    DEFAULT_MAX_REGISTRATION_ATTEMPTS, DEFAULT_REGISTRATION_RETRY_INTERVAL,
};
use crate::enums::{CommandResponseStatus, CommandType, LifecycleState, ServiceType};
use crate::error::{AIPerfError, AIPerfResult};
use crate::messages::{
    Command, CommandMessage, CommandResponse, ErrorMessage, HeartbeatMessage, Message,
    StatusMessage,
};
use crate::service::spec::{BackgroundTaskSpec, CommandOutcome, PullBinding, ServiceSpec};
use crate::service::{Service, ServiceContext};
use crate::time_ns;

/// Drives one service: ordered lifecycle transitions, bus dispatch, pull
/// loops, req/rep serving, background tasks, registration, and heartbeats.
pub struct ServiceHarness<S: Service + ?Sized> {
    service: Arc<S>,
    ctx: Arc<ServiceContext>,
    spec: ServiceSpec,
    tasks: Vec<JoinHandle<()>>,
}

impl<S: Service + ?Sized> ServiceHarness<S> {
    pub fn new(service: Arc<S>, ctx: Arc<ServiceContext>) -> Self {
        let spec = service.spec();
        Self {
            service,
            ctx,
            spec,
            tasks: Vec::new(),
        }
    }

    /// Run the service to completion: init, start, event loops, stop.
    pub async fn run(mut self) -> AIPerfResult<()> {
        let service_id = self.ctx.service_id.clone();
        debug!(service_id = %service_id, "service harness starting");

        if let Err(e) = self.initialize().await {
            self.fail("initialize", &e).await;
            return Err(e);
        }
        if let Err(e) = self.start().await {
            self.fail("start", &e).await;
            return Err(e);
        }

        self.ctx.wait_for_stop().await;
        self.stop().await;
        debug!(service_id = %service_id, "service harness finished");
        Ok(())
    }

    async fn initialize(&mut self) -> AIPerfResult<()> {
        self.set_state(LifecycleState::Initializing).await?;

        // Bus loops come up before the service's own init so that command
        // and response traffic is never missed.
        self.spawn_response_loop()?;
        self.spawn_command_loop()?;
        self.spawn_event_loop()?;

        self.service
            .on_init(&self.ctx)
            .await
            .map_err(|e| self.lifecycle_error("on_init", e))?;
        self.ctx.children.initialize_all().await?;

        self.set_state(LifecycleState::Initialized).await?;
        Ok(())
    }

    async fn start(&mut self) -> AIPerfResult<()> {
        self.set_state(LifecycleState::Starting).await?;
        self.service
            .on_start(&self.ctx)
            .await
            .map_err(|e| self.lifecycle_error("on_start", e))?;

        for binding in self.spec.pull_bindings.clone() {
            self.spawn_pull_loop(binding)?;
        }
        for address in self.spec.reply_bindings.clone() {
            self.spawn_reply_loop(address)?;
        }
        for task in self.spec.background_tasks.clone() {
            self.spawn_background_task(task);
        }
        if self.spec.component {
            self.spawn_registration_and_heartbeat();
        }

        self.set_state(LifecycleState::Running).await?;
        Ok(())
    }

    async fn stop(&mut self) {
        if let Err(e) = self.set_state(LifecycleState::Stopping).await {
            debug!("stop transition skipped: {e}");
        }
        if let Err(e) = self.service.on_stop(&self.ctx).await {
            warn!(service_id = %self.ctx.service_id, "on_stop hook failed: {e}");
        }
        for e in self.ctx.children.stop_all().await {
            warn!(service_id = %self.ctx.service_id, "child stop failed: {e}");
        }
        for task in self.tasks.drain(..) {
            task.abort();
        }
        if let Err(e) = self.set_state(LifecycleState::Stopped).await {
            debug!("stopped transition skipped: {e}");
        }
    }

    async fn fail(&mut self, operation: &str, err: &AIPerfError) {
        error!(
            service_id = %self.ctx.service_id,
            operation, "service failed: {err}"
        );
        for task in self.tasks.drain(..) {
            task.abort();
        }
        let _ = self.set_state(LifecycleState::Failed).await;
    }

    fn lifecycle_error(&self, operation: &str, err: AIPerfError) -> AIPerfError {
        AIPerfError::LifecycleOperation {
            operation: operation.to_string(),
            lifecycle_id: self.ctx.service_id.clone(),
            reason: err.to_string(),
        }
    }

    /// Transition state, run the state-change hook, and publish a status
    /// message while the transport is up.
    async fn set_state(&self, new: LifecycleState) -> AIPerfResult<()> {
        let old = self.ctx.state.transition(new)?;
        self.service.on_state_change(&self.ctx, old, new).await;
        if self.ctx.comms().is_up() && new != LifecycleState::Stopped {
            self.ctx.publish(Message::Status(StatusMessage {
                service_id: self.ctx.service_id.clone(),
                service_type: self.ctx.service_type,
                request_ns: time_ns(),
                state: new,
            }));
        }
        Ok(())
    }

    fn spawn_response_loop(&mut self) -> AIPerfResult<()> {
        let mut sub = self.ctx.comms().create_sub_client(CommAddress::Response)?;
        let ctx = self.ctx.clone();
        self.tasks.push(tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = ctx.wait_for_stop() => break,
                    msg = sub.recv() => match msg {
                        Some(Message::CommandResponse(response)) => {
                            ctx.route_command_response(response);
                        }
                        Some(_) => {}
                        None => break,
                    },
                }
            }
        }));
        Ok(())
    }

    fn spawn_command_loop(&mut self) -> AIPerfResult<()> {
        let mut sub = self.ctx.comms().create_sub_client(CommAddress::Command)?;
        let ctx = self.ctx.clone();
        let service = self.service.clone();
        let service_type = self.spec.service_type;
        self.tasks.push(tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = ctx.wait_for_stop() => break,
                    msg = sub.recv() => match msg {
                        Some(Message::Command(command)) => {
                            Self::handle_command(&service, &ctx, service_type, command).await;
                        }
                        Some(_) => {}
                        None => break,
                    },
                }
            }
        }));
        Ok(())
    }

    async fn handle_command(
        service: &Arc<S>,
        ctx: &Arc<ServiceContext>,
        service_type: ServiceType,
        command: CommandMessage,
    ) {
        if !command.targets(&ctx.service_id, service_type) {
            return;
        }

        // Stable command ids make retries idempotent: replay the original
        // response instead of re-running the handler.
        if let Some(cached) = ctx.seen_commands.get(&command.command_id) {
            if command.require_response {
                ctx.publish_response(cached.clone());
            }
            return;
        }

        if matches!(command.command, Command::Shutdown) {
            debug!(service_id = %ctx.service_id, "shutdown command received");
            if command.require_response {
                ctx.publish_response(CommandResponse::acknowledged(
                    ctx.service_id.clone(),
                    &command,
                ));
            }
            ctx.request_stop();
            return;
        }

        let response = match service.on_command(ctx, &command).await {
            Ok(CommandOutcome::Success(result)) => {
                CommandResponse::success(ctx.service_id.clone(), &command, result)
            }
            Ok(CommandOutcome::Acknowledged) => {
                CommandResponse::acknowledged(ctx.service_id.clone(), &command)
            }
            Ok(CommandOutcome::Unhandled) => {
                CommandResponse::unhandled(ctx.service_id.clone(), &command)
            }
            Err(e) => {
                warn!(
                    service_id = %ctx.service_id,
                    command = ?command.command.command_type(),
                    "command handler failed: {e}"
                );
                CommandResponse::failure(ctx.service_id.clone(), &command, ctx.error_details(&e))
            }
        };

        ctx.seen_commands
            .insert(command.command_id.clone(), response.clone());
        if command.require_response {
            ctx.publish_response(response);
        }
    }

    fn spawn_event_loop(&mut self) -> AIPerfResult<()> {
        let mut sub = self.ctx.comms().create_sub_client(CommAddress::EventBus)?;
        let ctx = self.ctx.clone();
        let service = self.service.clone();
        let subscriptions = self.spec.subscriptions.clone();
        self.tasks.push(tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = ctx.wait_for_stop() => break,
                    msg = sub.recv() => match msg {
                        Some(message) => {
                            if !subscriptions.contains(&message.message_type()) {
                                continue;
                            }
                            if let Err(e) = service.on_message(&ctx, message).await {
                                // Handler failures drop the message, never
                                // the delivery loop.
                                warn!(
                                    service_id = %ctx.service_id,
                                    "message handler failed: {e}"
                                );
                            }
                        }
                        None => break,
                    },
                }
            }
        }));
        Ok(())
    }

    fn spawn_pull_loop(&mut self, binding: PullBinding) -> AIPerfResult<()> {
        let client = self.ctx.comms().create_pull_client(binding.address)?;
        let semaphore = Arc::new(Semaphore::new(binding.max_concurrency));
        let ctx = self.ctx.clone();
        let service = self.service.clone();
        let address = binding.address;
        self.tasks.push(tokio::spawn(async move {
            loop {
                let permit = tokio::select! {
                    _ = ctx.wait_for_stop() => break,
                    permit = semaphore.clone().acquire_owned() => match permit {
                        Ok(permit) => permit,
                        Err(_) => break,
                    },
                };
                let message = tokio::select! {
                    _ = ctx.wait_for_stop() => break,
                    msg = client.recv() => match msg {
                        Some(msg) => msg,
                        None => break,
                    },
                };
                let service = service.clone();
                let ctx = ctx.clone();
                tokio::spawn(async move {
                    if let Err(e) = service.on_pull_message(&ctx, address, message).await {
                        warn!(
                            service_id = %ctx.service_id,
                            address = %address,
                            "pull handler failed: {e}"
                        );
                    }
                    drop(permit);
                });
            }
        }));
        Ok(())
    }

    fn spawn_reply_loop(&mut self, address: CommAddress) -> AIPerfResult<()> {
        let client = self.ctx.comms().create_reply_client(address)?;
        let ctx = self.ctx.clone();
        let service = self.service.clone();
        self.tasks.push(tokio::spawn(async move {
            loop {
                let (message, responder) = tokio::select! {
                    _ = ctx.wait_for_stop() => break,
                    req = client.recv() => match req {
                        Some(pair) => pair,
                        None => break,
                    },
                };
                let service = service.clone();
                let ctx = ctx.clone();
                tokio::spawn(async move {
                    match service.on_request(&ctx, message).await {
                        Ok(reply) => responder.send(reply),
                        Err(e) => responder.send(Message::Error(ErrorMessage {
                            service_id: ctx.service_id.clone(),
                            request_ns: time_ns(),
                            request_id: None,
                            error: ctx.error_details(&e),
                        })),
                    }
                });
            }
        }));
        Ok(())
    }

    fn spawn_background_task(&mut self, spec: BackgroundTaskSpec) {
        let ctx = self.ctx.clone();
        let service = self.service.clone();
        self.tasks.push(tokio::spawn(async move {
            let name = spec.name;
            let run_once = |service: Arc<S>, ctx: Arc<ServiceContext>| async move {
                service.on_background_task(&ctx, name).await
            };

            let Some(base_interval) = spec.interval else {
                // One-shot task.
                if let Err(e) = run_once(service.clone(), ctx.clone()).await {
                    warn!(task = name, "background task failed: {e}");
                }
                return;
            };

            if spec.immediate {
                if let Err(e) = run_once(service.clone(), ctx.clone()).await {
                    if spec.stop_on_error {
                        warn!(task = name, "background task stopped on error: {e}");
                        return;
                    }
                    warn!(task = name, "background task failed: {e}");
                }
            }

            loop {
                let interval = service.task_interval(name).unwrap_or(base_interval);
                tokio::select! {
                    _ = ctx.wait_for_stop() => break,
                    _ = tokio::time::sleep(interval) => {}
                }
                if ctx.stop_requested() {
                    break;
                }
                if let Err(e) = run_once(service.clone(), ctx.clone()).await {
                    if spec.stop_on_error {
                        warn!(task = name, "background task stopped on error: {e}");
                        break;
                    }
                    warn!(task = name, "background task failed: {e}");
                }
            }
        }));
    }

    /// Self-registration with retry (reusing one command id so the
    /// controller deduplicates), followed by the heartbeat loop.
    fn spawn_registration_and_heartbeat(&mut self) {
        let ctx = self.ctx.clone();
        let service_type = self.spec.service_type;
        let heartbeat_interval = self.ctx.service_config.heartbeat_interval;
        self.tasks.push(tokio::spawn(async move {
            let register = CommandMessage::to_service_type(
                ctx.service_id.clone(),
                ServiceType::SystemController,
                Command::RegisterService {
                    service_type,
                    state: ctx.state(),
                },
            );

            let mut registered = false;
            for attempt in 1..=DEFAULT_MAX_REGISTRATION_ATTEMPTS {
                if ctx.stop_requested() {
                    return;
                }
                match ctx
                    .send_command_and_wait_for_response(
                        register.clone(),
                        DEFAULT_REGISTRATION_RETRY_INTERVAL,
                    )
                    .await
                {
                    Ok(response)
                        if response.status == CommandResponseStatus::Success
                            && response.command == CommandType::RegisterService =>
                    {
                        info!(service_id = %ctx.service_id, "registered with controller");
                        registered = true;
                        break;
                    }
                    Ok(response) => {
                        debug!(
                            service_id = %ctx.service_id,
                            attempt,
                            status = ?response.status,
                            "registration not accepted, retrying"
                        );
                    }
                    Err(e) => {
                        debug!(
                            service_id = %ctx.service_id,
                            attempt, "registration attempt failed: {e}"
                        );
                    }
                }
            }
            if !registered {
                warn!(
                    service_id = %ctx.service_id,
                    "failed to register with the system controller"
                );
                return;
            }

            loop {
                tokio::select! {
                    _ = ctx.wait_for_stop() => break,
                    _ = tokio::time::sleep(heartbeat_interval) => {}
                }
                if ctx.stop_requested() {
                    break;
                }
                ctx.publish(Message::Heartbeat(HeartbeatMessage {
                    service_id: ctx.service_id.clone(),
                    service_type: ctx.service_type,
                    request_ns: time_ns(),
                    state: ctx.state(),
                }));
            }
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comms::{Comms, MessageBusHub, ProxyManager};
    use crate::config::{CommsConfig, ServiceConfig};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::Duration;

    struct CountingService {
        handled: AtomicU64,
        transitions: Mutex<Vec<(LifecycleState, LifecycleState)>>,
    }

    #[async_trait]
    impl Service for CountingService {
        fn spec(&self) -> crate::service::ServiceSpec {
            crate::service::ServiceSpec::controller(ServiceType::RecordProcessor)
        }

        async fn on_state_change(
            &self,
            _ctx: &Arc<ServiceContext>,
            old: LifecycleState,
            new: LifecycleState,
        ) {
            self.transitions.lock().push((old, new));
        }

        async fn on_command(
            &self,
            _ctx: &Arc<ServiceContext>,
            command: &CommandMessage,
        ) -> AIPerfResult<CommandOutcome> {
            match command.command {
                Command::ProcessRecords { .. } => {
                    self.handled.fetch_add(1, Ordering::SeqCst);
                    Ok(CommandOutcome::Success(None))
                }
                _ => Ok(CommandOutcome::Unhandled),
            }
        }
    }

    fn test_fabric() -> (Comms, ProxyManager) {
        let hub = Arc::new(MessageBusHub::new());
        let proxies = ProxyManager::new(hub.clone(), CommsConfig::default());
        proxies.initialize_and_start().expect("proxies");
        (Comms::new(hub, CommsConfig::default()), proxies)
    }

    async fn wait_for_state(ctx: &Arc<ServiceContext>, state: LifecycleState) {
        for _ in 0..100 {
            if ctx.state() == state {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("service never reached {state}");
    }

    /// Invariant: sending the same command id N times runs the handler once
    /// and yields a Success response every time.
    #[tokio::test]
    async fn test_repeated_command_id_is_idempotent() {
        let (comms, _proxies) = test_fabric();
        let service = Arc::new(CountingService {
            handled: AtomicU64::new(0),
            transitions: Mutex::new(Vec::new()),
        });
        let ctx = ServiceContext::new(
            ServiceType::RecordProcessor,
            comms.clone(),
            Arc::new(ServiceConfig::default()),
        )
        .expect("ctx");
        let run = tokio::spawn(ServiceHarness::new(service.clone(), ctx.clone()).run());
        wait_for_state(&ctx, LifecycleState::Running).await;

        // A bare sender context: route responses into it manually.
        let sender = ServiceContext::new(
            ServiceType::SystemController,
            comms.clone(),
            Arc::new(ServiceConfig::default()),
        )
        .expect("sender ctx");
        let mut response_sub = comms
            .create_sub_client(CommAddress::Response)
            .expect("response sub");
        let route_ctx = sender.clone();
        tokio::spawn(async move {
            while let Some(msg) = response_sub.recv().await {
                if let Message::CommandResponse(response) = msg {
                    route_ctx.route_command_response(response);
                }
            }
        });

        let command = CommandMessage::to_service_type(
            sender.service_id.clone(),
            ServiceType::RecordProcessor,
            Command::ProcessRecords { cancelled: false },
        );
        for _ in 0..3 {
            let response = sender
                .send_command_and_wait_for_response(command.clone(), Duration::from_secs(2))
                .await
                .expect("command response");
            assert_eq!(response.status, CommandResponseStatus::Success);
            assert_eq!(response.command_id, command.command_id);
        }
        assert_eq!(service.handled.load(Ordering::SeqCst), 1);

        ctx.request_stop();
        run.await.expect("join").expect("harness run");
    }

    /// Invariant: observed transitions are a prefix of the full lifecycle
    /// order.
    #[tokio::test]
    async fn test_lifecycle_transitions_are_monotonic() {
        let (comms, _proxies) = test_fabric();
        let service = Arc::new(CountingService {
            handled: AtomicU64::new(0),
            transitions: Mutex::new(Vec::new()),
        });
        let ctx = ServiceContext::new(
            ServiceType::RecordProcessor,
            comms,
            Arc::new(ServiceConfig::default()),
        )
        .expect("ctx");
        let run = tokio::spawn(ServiceHarness::new(service.clone(), ctx.clone()).run());
        wait_for_state(&ctx, LifecycleState::Running).await;
        ctx.request_stop();
        run.await.expect("join").expect("harness run");

        let observed: Vec<LifecycleState> =
            service.transitions.lock().iter().map(|(_, new)| *new).collect();
        assert_eq!(
            observed,
            vec![
                LifecycleState::Initializing,
                LifecycleState::Initialized,
                LifecycleState::Starting,
                LifecycleState::Running,
                LifecycleState::Stopping,
                LifecycleState::Stopped,
            ]
        );
    }
}
