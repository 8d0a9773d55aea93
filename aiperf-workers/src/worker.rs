//! The worker service: executes credits against the inference endpoint.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, trace};

use aiperf_common::comms::{CommAddress, PushClient, RequestClient};
use aiperf_common::config::UserConfig;
use aiperf_common::constants::DEFAULT_WORKER_HEALTH_INTERVAL;
use aiperf_common::enums::{CreditPhase, ServiceType};
use aiperf_common::messages::{
    Command, CommandMessage, ConversationRequestMessage, CreditDropMessage,
    CreditReturnMessage, InferenceResultsMessage, Message, WorkerHealthMessage,
};
use aiperf_common::models::{
    ErrorDetails, RequestRecord, Turn, WorkerHealth, WorkerTaskStats,
};
use aiperf_common::service::{
    BackgroundTaskSpec, CommandOutcome, PullBinding, Service, ServiceContext, ServiceSpec,
};
use aiperf_common::{perf_ns, time_ns, AIPerfError, AIPerfResult};

use crate::client::{HttpInferenceClient, InferenceClient};
use crate::endpoints::{request_path, EndpointPlugin, EndpointRegistry};
use crate::health::ProcessTimeSampler;

const HEALTH_TASK: &str = "worker_health";

struct WorkerComms {
    conversation: RequestClient,
    results: PushClient,
    credit_return: PushClient,
}

/// Executes one credit at a time: fetch the conversation turn, format the
/// payload, send the request, push the record, and always return the credit.
pub struct Worker {
    config: RwLock<Arc<UserConfig>>,
    plugin: Arc<dyn EndpointPlugin>,
    client: Arc<dyn InferenceClient>,
    comms: RwLock<Option<Arc<WorkerComms>>>,
    task_stats: Mutex<HashMap<CreditPhase, WorkerTaskStats>>,
    sampler: ProcessTimeSampler,
    started_at: Instant,
}

impl Worker {
    pub fn new(config: Arc<UserConfig>, registry: &EndpointRegistry) -> AIPerfResult<Self> {
        let client = Arc::new(HttpInferenceClient::new(&config.endpoint)?);
        Self::with_client(config, registry, client)
    }

    /// Construct with an injected inference client (used by tests and by
    /// service managers that share one client).
    pub fn with_client(
        config: Arc<UserConfig>,
        registry: &EndpointRegistry,
        client: Arc<dyn InferenceClient>,
    ) -> AIPerfResult<Self> {
        let plugin = registry.get(config.endpoint.endpoint_type)?;
        Ok(Self {
            config: RwLock::new(config),
            plugin,
            client,
            comms: RwLock::new(None),
            task_stats: Mutex::new(HashMap::new()),
            sampler: ProcessTimeSampler::new(),
            started_at: Instant::now(),
        })
    }

    fn worker_comms(&self) -> AIPerfResult<Arc<WorkerComms>> {
        self.comms
            .read()
            .clone()
            .ok_or_else(|| AIPerfError::NotInitialized("worker comms".to_string()))
    }

    /// Aggregate task stats across phases.
    fn aggregated_stats(&self) -> WorkerTaskStats {
        let stats = self.task_stats.lock();
        let mut total = WorkerTaskStats::default();
        for phase_stats in stats.values() {
            total.total += phase_stats.total;
            total.in_progress += phase_stats.in_progress;
            total.completed += phase_stats.completed;
            total.failed += phase_stats.failed;
        }
        total
    }

    /// Process one credit drop.
    ///
    /// Whatever happens, the record is pushed (best-effort) and the credit is
    /// returned. The pull binding's concurrency of one means this method
    /// fully owns the worker while it runs.
    async fn process_credit(&self, ctx: &Arc<ServiceContext>, message: CreditDropMessage) {
        trace!(service_id = %ctx.service_id, "processing credit drop");
        let drop_perf_ns = perf_ns();
        {
            let mut stats = self.task_stats.lock();
            let entry = stats.entry(message.phase).or_default();
            entry.total += 1;
            entry.in_progress += 1;
        }

        let mut record = match self.execute_single_credit(&message).await {
            Ok(record) => record,
            Err(e) => {
                debug!(service_id = %ctx.service_id, "credit execution failed: {e}");
                RequestRecord {
                    error: Some(ErrorDetails::from(&e)),
                    end_perf_ns: perf_ns(),
                    ..Default::default()
                }
            }
        };
        record.credit_phase = Some(message.phase);
        record.credit_drop_latency = record.start_perf_ns - drop_perf_ns;

        let valid = record.valid();
        {
            let mut stats = self.task_stats.lock();
            let entry = stats.entry(message.phase).or_default();
            entry.in_progress = entry.in_progress.saturating_sub(1);
            if valid {
                entry.completed += 1;
            } else {
                entry.failed += 1;
            }
        }
        let delayed_ns = record.delayed_ns;

        let comms = match self.worker_comms() {
            Ok(comms) => comms,
            Err(e) => {
                error!(service_id = %ctx.service_id, "cannot return credit: {e}");
                return;
            }
        };

        // Best-effort: a lost record is an accounting gap, not a stall.
        if let Err(e) = comms
            .results
            .push(Message::InferenceResults(InferenceResultsMessage {
                service_id: ctx.service_id.clone(),
                request_ns: time_ns(),
                record,
            }))
            .await
        {
            error!(service_id = %ctx.service_id, "failed to push inference results: {e}");
        }

        // The credit return is the hard contract: the timing manager stalls
        // without it.
        if let Err(e) = comms
            .credit_return
            .push(Message::CreditReturn(CreditReturnMessage {
                service_id: ctx.service_id.clone(),
                request_ns: time_ns(),
                phase: message.phase,
                delayed_ns,
                failed: !valid,
            }))
            .await
        {
            error!(
                service_id = %ctx.service_id,
                "FAILED TO RETURN CREDIT, the run may never complete: {e}"
            );
        }
    }

    async fn execute_single_credit(
        &self,
        message: &CreditDropMessage,
    ) -> AIPerfResult<RequestRecord> {
        let comms = self.worker_comms()?;
        let config = self.config.read().clone();

        let response = comms
            .conversation
            .request(Message::ConversationRequest(ConversationRequestMessage {
                service_id: String::new(),
                request_ns: time_ns(),
                request_id: None,
                conversation_id: message.conversation_id.clone(),
                credit_phase: message.phase,
            }))
            .await?;

        let conversation = match response {
            Message::ConversationResponse(response) => response.conversation,
            Message::Error(error) => {
                return Ok(RequestRecord {
                    model_name: Some(config.endpoint.model_name.clone()),
                    conversation_id: message.conversation_id.clone(),
                    timestamp_ns: time_ns(),
                    start_perf_ns: perf_ns(),
                    end_perf_ns: perf_ns(),
                    error: Some(error.error),
                    ..Default::default()
                });
            }
            other => {
                return Err(AIPerfError::InvalidState(format!(
                    "unexpected conversation reply: {:?}",
                    other.message_type()
                )));
            }
        };

        let turn = conversation.turns.first().cloned().ok_or_else(|| {
            AIPerfError::InvalidState(format!(
                "conversation {} has no turns",
                conversation.session_id
            ))
        })?;

        let mut record = self.call_inference_api(&config, message, &turn).await?;
        record.model_name = Some(config.endpoint.model_name.clone());
        record.conversation_id = Some(conversation.session_id);
        record.turn_index = 0;
        // Tokenizer-free client-side estimate; the record processor compares
        // it against the API usage block.
        record.input_token_count = Some(turn.word_count() as u64);
        Ok(record)
    }

    async fn call_inference_api(
        &self,
        config: &UserConfig,
        message: &CreditDropMessage,
        turn: &Turn,
    ) -> AIPerfResult<RequestRecord> {
        let payload = self.plugin.format_payload(&config.endpoint, turn)?;
        let path = request_path(&config.endpoint, self.plugin.as_ref());

        // Hold the request until its scheduled drop time; record lateness
        // otherwise.
        let mut delayed_ns = None;
        if let Some(drop_ns) = message.credit_drop_ns {
            let now_ns = time_ns();
            if drop_ns > now_ns {
                tokio::time::sleep(Duration::from_nanos(drop_ns - now_ns)).await;
            } else if drop_ns < now_ns {
                delayed_ns = Some(now_ns - drop_ns);
            }
        }

        let send = self.client.send_request(&config.endpoint, &path, &payload);
        let mut record = match (message.should_cancel, message.cancel_after_ns) {
            (true, Some(cancel_after_ns)) => {
                let budget = Duration::from_nanos(cancel_after_ns);
                match tokio::time::timeout(budget, send).await {
                    Ok(result) => result?,
                    Err(_) => return Err(AIPerfError::Timeout(budget)),
                }
            }
            _ => send.await?,
        };

        record.delayed_ns = delayed_ns;
        if message.should_cancel {
            record.cancel_after_ns = message.cancel_after_ns;
        }
        Ok(record)
    }
}

#[async_trait]
impl Service for Worker {
    fn spec(&self) -> ServiceSpec {
        let mut spec = ServiceSpec::component(ServiceType::Worker);
        spec.pull_bindings = vec![PullBinding::new(CommAddress::CreditDrop).with_max_concurrency(1)];
        spec.background_tasks = vec![
            BackgroundTaskSpec::interval(HEALTH_TASK, DEFAULT_WORKER_HEALTH_INTERVAL).immediate(),
        ];
        spec
    }

    async fn on_init(&self, ctx: &Arc<ServiceContext>) -> AIPerfResult<()> {
        let comms = ctx.comms();
        *self.comms.write() = Some(Arc::new(WorkerComms {
            conversation: comms.create_request_client(CommAddress::DatasetManagerProxyFrontend)?,
            results: comms.create_push_client(CommAddress::InferenceResults)?,
            credit_return: comms.create_push_client(CommAddress::CreditReturn)?,
        }));
        Ok(())
    }

    async fn on_pull_message(
        &self,
        ctx: &Arc<ServiceContext>,
        _address: CommAddress,
        message: Message,
    ) -> AIPerfResult<()> {
        if let Message::CreditDrop(credit) = message {
            self.process_credit(ctx, credit).await;
        }
        Ok(())
    }

    async fn on_command(
        &self,
        _ctx: &Arc<ServiceContext>,
        command: &CommandMessage,
    ) -> AIPerfResult<CommandOutcome> {
        match &command.command {
            Command::ProfileConfigure { config } => {
                *self.config.write() = Arc::new((**config).clone());
                Ok(CommandOutcome::Success(None))
            }
            Command::ProfileStart => Ok(CommandOutcome::Success(None)),
            Command::ProfileCancel => Ok(CommandOutcome::Acknowledged),
            _ => Ok(CommandOutcome::Unhandled),
        }
    }

    async fn on_background_task(
        &self,
        ctx: &Arc<ServiceContext>,
        name: &str,
    ) -> AIPerfResult<()> {
        if name != HEALTH_TASK {
            return Ok(());
        }
        ctx.publish(Message::WorkerHealth(WorkerHealthMessage {
            service_id: ctx.service_id.clone(),
            request_ns: time_ns(),
            health: WorkerHealth {
                cpu_usage: self.sampler.sample_cpu_usage(),
                uptime_sec: self.started_at.elapsed().as_secs_f64(),
            },
            task_stats: self.aggregated_stats(),
        }));
        Ok(())
    }
}
