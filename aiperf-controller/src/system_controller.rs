//! The system controller service.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use aiperf_common::config::{ServiceConfig, UserConfig};
use aiperf_common::constants::{
    DEFAULT_CANCEL_GRACE, DEFAULT_PROFILE_CONFIGURE_TIMEOUT, DEFAULT_PROFILE_START_TIMEOUT,
    DEFAULT_RECORD_PROCESSOR_SCALE_FACTOR, DEFAULT_SHUTDOWN_BROADCAST_GRACE,
};
use aiperf_common::enums::{CommandResponseStatus, ServiceType};
use aiperf_common::messages::{Command, CommandMessage, Message, MessageType};
use aiperf_common::models::{
    ErrorDetails, ExitErrorInfo, ProcessRecordsResult, TelemetryResults,
};
use aiperf_common::service::{
    CommandOutcome, Service, ServiceContext, ServiceSpec,
};
use aiperf_common::{AIPerfError, AIPerfResult};
use aiperf_metrics::builtin::tags;

use crate::exit_errors::render_exit_errors;
use crate::exporters::ExporterManager;
use crate::registry::ServiceRegistry;
use crate::service_manager::ServiceManager;

/// Result-collection state, guarded by one lock so the profile and
/// telemetry results cannot race the shutdown trigger.
#[derive(Default)]
struct CollectionState {
    profile_results: Option<ProcessRecordsResult>,
    profile_results_received: bool,
    telemetry_results: Option<TelemetryResults>,
    should_wait_for_telemetry: bool,
    endpoints_configured: Vec<String>,
    endpoints_reachable: Vec<String>,
    shutdown_triggered: bool,
    was_cancelled: bool,
}

/// Supervises every other service and drives the profiling protocol:
/// CONFIGURE -> START -> (PROFILE | CANCEL) -> collect -> export.
pub struct SystemController {
    user_config: Arc<UserConfig>,
    #[allow(dead_code)]
    service_config: Arc<ServiceConfig>,
    registry: Arc<ServiceRegistry>,
    service_manager: Arc<dyn ServiceManager>,
    /// Record processors scale with workers unless a count is pinned.
    scale_record_processors: bool,
    collection: Mutex<CollectionState>,
    exit_errors: Mutex<Vec<ExitErrorInfo>>,
}

impl SystemController {
    pub fn new(
        user_config: Arc<UserConfig>,
        service_config: Arc<ServiceConfig>,
        registry: Arc<ServiceRegistry>,
        service_manager: Arc<dyn ServiceManager>,
    ) -> Self {
        let scale_record_processors = service_config.record_processor_count.is_none();
        Self {
            user_config,
            service_config,
            registry,
            service_manager,
            scale_record_processors,
            collection: Mutex::new(CollectionState::default()),
            exit_errors: Mutex::new(Vec::new()),
        }
    }

    /// Exit errors accumulated over the run; a non-empty list means exit
    /// code 1.
    pub async fn exit_errors(&self) -> Vec<ExitErrorInfo> {
        self.exit_errors.lock().await.clone()
    }

    pub async fn was_cancelled(&self) -> bool {
        self.collection.lock().await.was_cancelled
    }

    async fn record_exit_error(
        &self,
        operation: &str,
        error: ErrorDetails,
        service_id: Option<String>,
    ) {
        error!(operation, %error, "exit error recorded");
        self.exit_errors.lock().await.push(ExitErrorInfo {
            error_details: error,
            operation: operation.to_string(),
            service_id,
        });
    }

    /// Run a fatal-at-start operation; on failure record the exit error and
    /// request shutdown.
    async fn try_operation_or_stop<F>(
        &self,
        ctx: &Arc<ServiceContext>,
        operation: &str,
        fut: F,
    ) -> bool
    where
        F: std::future::Future<Output = AIPerfResult<()>>,
    {
        match fut.await {
            Ok(()) => true,
            Err(e) => {
                self.record_exit_error(operation, ErrorDetails::from(&e), None)
                    .await;
                ctx.request_stop();
                false
            }
        }
    }

    /// Broadcast a profiling command to every registered service and fold
    /// failures and missing responses into exit errors.
    async fn broadcast_and_collect(
        &self,
        ctx: &Arc<ServiceContext>,
        operation: &str,
        command: Command,
        timeout: Duration,
    ) -> bool {
        let targets = self.registry.registered_ids();
        let message = CommandMessage::broadcast(ctx.service_id.clone(), command);
        let begin = std::time::Instant::now();
        let (responses, missing) = ctx
            .send_command_and_wait_for_all_responses(message, &targets, timeout)
            .await;
        debug!(
            operation,
            responses = responses.len(),
            elapsed_sec = begin.elapsed().as_secs_f64(),
            "collected command responses"
        );

        let mut ok = true;
        for response in responses {
            if response.status == CommandResponseStatus::Failure {
                ok = false;
                let error = response.error.clone().unwrap_or_else(|| {
                    ErrorDetails::new("ServiceError", "command failed with no details")
                });
                self.record_exit_error(operation, error, Some(response.service_id.clone()))
                    .await;
            }
        }
        for service_id in missing {
            ok = false;
            self.record_exit_error(
                operation,
                ErrorDetails::from(&AIPerfError::Timeout(timeout)),
                Some(service_id),
            )
            .await;
        }
        if !ok {
            ctx.request_stop();
        }
        ok
    }

    /// Publish ProfileCancel, give services a moment to wind down, then
    /// stop. Driven by the first SIGINT/SIGTERM.
    pub async fn cancel_profiling(&self, ctx: &Arc<ServiceContext>) {
        info!("cancelling profiling");
        {
            let mut collection = self.collection.lock().await;
            collection.was_cancelled = true;
        }
        ctx.publish_command(CommandMessage::broadcast(
            ctx.service_id.clone(),
            Command::ProfileCancel,
        ));
        tokio::time::sleep(DEFAULT_CANCEL_GRACE).await;
        ctx.request_stop();
    }

    /// Trigger shutdown exactly once, after profile results are in AND
    /// (telemetry disabled OR telemetry results received).
    async fn check_and_trigger_shutdown(&self, ctx: &Arc<ServiceContext>) {
        let mut collection = self.collection.lock().await;
        if collection.shutdown_triggered || !collection.profile_results_received {
            return;
        }
        let telemetry_ready =
            !collection.should_wait_for_telemetry || collection.telemetry_results.is_some();
        if telemetry_ready {
            collection.shutdown_triggered = true;
            debug!("all results received, initiating shutdown");
            ctx.request_stop();
        } else {
            debug!("waiting for telemetry results before shutdown");
        }
    }

    async fn handle_spawn_workers(&self, num_workers: usize) -> AIPerfResult<()> {
        self.service_manager
            .run_service(ServiceType::Worker, num_workers)
            .await?;
        if self.scale_record_processors {
            let processors = (num_workers / DEFAULT_RECORD_PROCESSOR_SCALE_FACTOR).max(1);
            self.service_manager
                .run_service(ServiceType::RecordProcessor, processors)
                .await?;
        }
        Ok(())
    }

    async fn handle_shutdown_workers(&self) {
        self.service_manager.stop_service(ServiceType::Worker).await;
        if self.scale_record_processors {
            self.service_manager
                .stop_service(ServiceType::RecordProcessor)
                .await;
        }
    }

    /// Export artifacts and print the post-benchmark summary.
    async fn export_and_report(&self) {
        let collection = self.collection.lock().await;
        let Some(profile) = collection.profile_results.as_ref() else {
            warn!("no profile results to export");
            return;
        };
        let mut telemetry = collection.telemetry_results.clone();
        if let Some(results) = telemetry.as_mut() {
            results.endpoints_configured = collection.endpoints_configured.clone();
            results.endpoints_successful = collection.endpoints_reachable.clone();
        }
        let was_cancelled = collection.was_cancelled || profile.results.was_cancelled;

        let mut exporter_manager = ExporterManager::new();
        if let Err(e) = exporter_manager.export_data(
            &profile.results,
            telemetry.as_ref(),
            &self.user_config,
        ) {
            warn!("failed to export data artifacts: {e}");
        }
        match exporter_manager.export_console(&profile.results, &self.user_config) {
            Ok(rendered) => println!("{rendered}"),
            Err(e) => warn!("failed to render console summary: {e}"),
        }

        if !self.user_config.cli_command.is_empty() {
            println!("CLI Command: {}", self.user_config.cli_command);
        }
        if let Some(duration) = profile.results.get(tags::BENCHMARK_DURATION) {
            let mut line = format!("Benchmark Duration: {:.2} sec", duration.avg);
            if was_cancelled {
                line.push_str(" (cancelled early)");
            }
            println!("{line}");
        }
        for info in exporter_manager.exported_file_infos() {
            println!("{}: {}", info.export_type, info.file_path.display());
        }
        println!("Log File: {}", self.user_config.log_file_path().display());
        if was_cancelled {
            println!("The profile run was cancelled early. Results may be incomplete.");
        }
    }
}

#[async_trait]
impl Service for SystemController {
    fn spec(&self) -> ServiceSpec {
        let mut spec = ServiceSpec::controller(ServiceType::SystemController);
        spec.subscriptions = vec![
            MessageType::Status,
            MessageType::Heartbeat,
            MessageType::CreditsComplete,
            MessageType::TelemetryStatus,
            MessageType::ProcessRecordsResult,
            MessageType::ProcessTelemetryResult,
        ];
        spec
    }

    async fn on_start(&self, ctx: &Arc<ServiceContext>) -> AIPerfResult<()> {
        // Spawn every required service plus telemetry, then gate profiling
        // on registration.
        let started = self
            .try_operation_or_stop(ctx, "Start Service Manager", self.service_manager.start())
            .await;
        if !started {
            return Ok(());
        }

        let registered = self
            .try_operation_or_stop(
                ctx,
                "Register Services",
                self.service_manager.wait_for_all_services_registration(ctx),
            )
            .await;
        if !registered {
            return Ok(());
        }

        info!("AIPerf system is CONFIGURING");
        let configured = self
            .broadcast_and_collect(
                ctx,
                "Configure Profiling",
                Command::ProfileConfigure {
                    config: Box::new((*self.user_config).clone()),
                },
                DEFAULT_PROFILE_CONFIGURE_TIMEOUT,
            )
            .await;
        if !configured {
            return Ok(());
        }
        info!("AIPerf system is CONFIGURED");

        let profiling = self
            .broadcast_and_collect(
                ctx,
                "Start Profiling",
                Command::ProfileStart,
                DEFAULT_PROFILE_START_TIMEOUT,
            )
            .await;
        if profiling {
            info!("AIPerf system is PROFILING");
        }
        Ok(())
    }

    async fn on_message(&self, ctx: &Arc<ServiceContext>, message: Message) -> AIPerfResult<()> {
        match message {
            Message::Status(status) => {
                if !self.registry.observe(&status.service_id, status.state) {
                    debug!(
                        service_id = %status.service_id,
                        "status update from unregistered service"
                    );
                }
            }
            Message::Heartbeat(heartbeat) => {
                if !self.registry.observe(&heartbeat.service_id, heartbeat.state) {
                    warn!(
                        service_id = %heartbeat.service_id,
                        "heartbeat from unknown service"
                    );
                }
            }
            Message::CreditsComplete(credits) => {
                info!(service_id = %credits.service_id, "credits complete");
            }
            Message::TelemetryStatus(status) => {
                let mut collection = self.collection.lock().await;
                collection.should_wait_for_telemetry = status.enabled;
                collection.endpoints_configured = status.endpoints_configured;
                collection.endpoints_reachable = status.endpoints_reachable;
                if status.enabled {
                    info!(
                        reachable = collection.endpoints_reachable.len(),
                        configured = collection.endpoints_configured.len(),
                        "GPU telemetry enabled"
                    );
                } else {
                    info!(
                        reason = status.reason.as_deref().unwrap_or(""),
                        "GPU telemetry disabled"
                    );
                }
            }
            Message::ProcessRecordsResult(result) => {
                debug!("received process records result");
                if !result.results.errors.is_empty() {
                    error!(
                        errors = result.results.errors.len(),
                        "process records result carried errors"
                    );
                }
                {
                    let mut collection = self.collection.lock().await;
                    collection.profile_results = Some(result.results);
                    collection.profile_results_received = true;
                }
                self.check_and_trigger_shutdown(ctx).await;
            }
            Message::ProcessTelemetryResult(result) => {
                debug!("received process telemetry result");
                {
                    let mut collection = self.collection.lock().await;
                    collection.telemetry_results = Some(result.telemetry_result.results);
                }
                self.check_and_trigger_shutdown(ctx).await;
            }
            _ => {}
        }
        Ok(())
    }

    async fn on_command(
        &self,
        _ctx: &Arc<ServiceContext>,
        command: &CommandMessage,
    ) -> AIPerfResult<CommandOutcome> {
        match &command.command {
            Command::RegisterService {
                service_type,
                state,
            } => {
                self.registry
                    .register(&command.service_id, *service_type, *state);
                info!(
                    service_id = %command.service_id,
                    "registered {}",
                    service_type.display_name()
                );
                Ok(CommandOutcome::Success(None))
            }
            Command::SpawnWorkers { num_workers } => {
                debug!(num_workers, "spawn workers command");
                self.handle_spawn_workers(*num_workers).await?;
                Ok(CommandOutcome::Success(None))
            }
            Command::ShutdownWorkers { .. } => {
                debug!("shutdown workers command");
                self.handle_shutdown_workers().await;
                Ok(CommandOutcome::Success(None))
            }
            _ => Ok(CommandOutcome::Unhandled),
        }
    }

    async fn on_stop(&self, ctx: &Arc<ServiceContext>) -> AIPerfResult<()> {
        // Broadcast shutdown so services stop volunteering work before
        // their tasks are torn down.
        ctx.publish_command(CommandMessage::broadcast(
            ctx.service_id.clone(),
            Command::Shutdown,
        ));
        tokio::time::sleep(DEFAULT_SHUTDOWN_BROADCAST_GRACE).await;
        self.service_manager.shutdown_all_services().await;

        let exit_errors = self.exit_errors.lock().await.clone();
        if exit_errors.is_empty() {
            self.export_and_report().await;
        } else {
            println!("{}", render_exit_errors(&exit_errors));
            println!("Log File: {}", self.user_config.log_file_path().display());
        }
        Ok(())
    }
}
