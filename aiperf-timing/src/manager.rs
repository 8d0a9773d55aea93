//! The timing manager service.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use aiperf_common::comms::CommAddress;
use aiperf_common::constants::DEFAULT_CREDIT_PHASE_PROGRESS_INTERVAL;
use aiperf_common::enums::ServiceType;
use aiperf_common::messages::{
    Command, CommandMessage, CreditsCompleteMessage, DatasetTimingRequestMessage, Message,
};
use aiperf_common::models::TimingEntry;
use aiperf_common::service::{
    BackgroundTaskSpec, CommandOutcome, PullBinding, Service, ServiceContext, ServiceSpec,
};
use aiperf_common::{time_ns, AIPerfError, AIPerfResult};

use crate::config::TimingManagerConfig;
use crate::phase::PhaseOrchestrator;
use crate::strategy::{create_strategy, CreditIssuingStrategy};

const PROGRESS_TASK: &str = "credit_phase_progress";

/// Issues timing credits for requests according to the configured strategy.
pub struct TimingManager {
    config: RwLock<Option<TimingManagerConfig>>,
    phases: RwLock<Option<Arc<PhaseOrchestrator>>>,
    strategy: RwLock<Option<Arc<dyn CreditIssuingStrategy>>>,
}

impl TimingManager {
    pub fn new() -> Self {
        Self {
            config: RwLock::new(None),
            phases: RwLock::new(None),
            strategy: RwLock::new(None),
        }
    }

    async fn configure(
        &self,
        ctx: &Arc<ServiceContext>,
        config: TimingManagerConfig,
    ) -> AIPerfResult<()> {
        let drop_client = ctx.comms().create_push_client(CommAddress::CreditDrop)?;
        let phases = Arc::new(PhaseOrchestrator::new(
            ctx.clone(),
            drop_client,
            config.request_cancellation_ns,
        ));

        let schedule = if config.timing_mode == aiperf_common::enums::TimingMode::FixedSchedule {
            Some(self.fetch_timing_schedule(ctx).await?)
        } else {
            None
        };

        let strategy = create_strategy(&config, phases.clone(), schedule)?;
        info!(mode = ?config.timing_mode, "timing manager configured");

        *self.config.write() = Some(config);
        *self.phases.write() = Some(phases);
        *self.strategy.write() = Some(strategy);
        Ok(())
    }

    /// Blocks until the dataset manager serves the static schedule.
    async fn fetch_timing_schedule(
        &self,
        ctx: &Arc<ServiceContext>,
    ) -> AIPerfResult<Vec<TimingEntry>> {
        let client = ctx
            .comms()
            .create_request_client(CommAddress::DatasetManagerProxyFrontend)?;
        let reply = client
            .request(Message::DatasetTimingRequest(DatasetTimingRequestMessage {
                service_id: ctx.service_id.clone(),
                request_ns: time_ns(),
                request_id: None,
            }))
            .await?;
        match reply {
            Message::DatasetTimingResponse(response) => {
                debug!(entries = response.timing_data.len(), "received timing schedule");
                Ok(response.timing_data)
            }
            Message::Error(error) => Err(AIPerfError::Service(error.error.to_string())),
            other => Err(AIPerfError::InvalidState(format!(
                "unexpected timing reply: {:?}",
                other.message_type()
            ))),
        }
    }

    fn start_profiling(&self, ctx: &Arc<ServiceContext>) -> AIPerfResult<()> {
        let strategy = self
            .strategy
            .read()
            .clone()
            .ok_or_else(|| AIPerfError::InvalidState("no credit issuing strategy".to_string()))?;
        let ctx = ctx.clone();
        tokio::spawn(async move {
            if let Err(e) = strategy.run().await {
                warn!("credit issuing strategy failed: {e}");
            }
            ctx.publish(Message::CreditsComplete(CreditsCompleteMessage {
                service_id: ctx.service_id.clone(),
                request_ns: time_ns(),
            }));
        });
        info!("profiling started");
        Ok(())
    }

    fn cancel(&self) {
        if let Some(phases) = self.phases.read().clone() {
            phases.cancel();
        }
    }
}

impl Default for TimingManager {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Service for TimingManager {
    fn spec(&self) -> ServiceSpec {
        let mut spec = ServiceSpec::component(ServiceType::TimingManager);
        spec.pull_bindings = vec![PullBinding::new(CommAddress::CreditReturn)];
        spec.background_tasks = vec![BackgroundTaskSpec::interval(
            PROGRESS_TASK,
            DEFAULT_CREDIT_PHASE_PROGRESS_INTERVAL,
        )];
        spec
    }

    async fn on_command(
        &self,
        ctx: &Arc<ServiceContext>,
        command: &CommandMessage,
    ) -> AIPerfResult<CommandOutcome> {
        match &command.command {
            Command::ProfileConfigure { config } => {
                let timing_config = TimingManagerConfig::from_user_config(config)?;
                self.configure(ctx, timing_config).await?;
                Ok(CommandOutcome::Success(None))
            }
            Command::ProfileStart => {
                self.start_profiling(ctx)?;
                Ok(CommandOutcome::Success(None))
            }
            Command::ProfileCancel => {
                debug!("profile cancel received, stopping strategy");
                self.cancel();
                Ok(CommandOutcome::Acknowledged)
            }
            _ => Ok(CommandOutcome::Unhandled),
        }
    }

    async fn on_pull_message(
        &self,
        _ctx: &Arc<ServiceContext>,
        _address: CommAddress,
        message: Message,
    ) -> AIPerfResult<()> {
        if let Message::CreditReturn(credit_return) = message {
            if let Some(phases) = self.phases.read().clone() {
                phases.note_return(&credit_return);
            }
        }
        Ok(())
    }

    async fn on_background_task(&self, _ctx: &Arc<ServiceContext>, name: &str) -> AIPerfResult<()> {
        if name == PROGRESS_TASK {
            if let Some(phases) = self.phases.read().clone() {
                phases.publish_progress();
            }
        }
        Ok(())
    }

    async fn on_stop(&self, _ctx: &Arc<ServiceContext>) -> AIPerfResult<()> {
        self.cancel();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aiperf_common::comms::{Comms, MessageBusHub, ProxyManager};
    use aiperf_common::config::{CommsConfig, ServiceConfig};
    use aiperf_common::enums::CreditPhase;
    use aiperf_common::messages::CreditReturnMessage;

    fn test_ctx() -> Arc<ServiceContext> {
        let hub = Arc::new(MessageBusHub::new());
        let proxies = ProxyManager::new(hub.clone(), CommsConfig::default());
        proxies.initialize_and_start().expect("proxies");
        // Leak the proxy manager so the hub stays bound for the test.
        std::mem::forget(proxies);
        let comms = Comms::new(hub, CommsConfig::default());
        ServiceContext::new(
            ServiceType::TimingManager,
            comms,
            Arc::new(ServiceConfig::default()),
        )
        .expect("ctx")
    }

    /// Credit conservation: every drop is matched by exactly one return
    /// before the phase completes.
    #[tokio::test]
    async fn test_concurrency_strategy_conserves_credits() {
        let ctx = test_ctx();
        let drop_client = ctx
            .comms()
            .create_push_client(CommAddress::CreditDrop)
            .expect("push");
        let pull = ctx
            .comms()
            .create_pull_client(CommAddress::CreditDrop)
            .expect("pull");
        let phases = Arc::new(PhaseOrchestrator::new(ctx.clone(), drop_client, None));

        let config = TimingManagerConfig {
            timing_mode: aiperf_common::enums::TimingMode::Concurrency,
            concurrency: 2,
            request_rate: 0.0,
            rate_distribution: aiperf_common::enums::RateDistribution::Constant,
            request_count: Some(4),
            expected_duration_sec: None,
            warmup_request_count: 0,
            request_cancellation_ns: None,
        };
        let strategy =
            create_strategy(&config, phases.clone(), None).expect("strategy");

        // Echo every drop back as a return, as a worker pool would.
        let echo_phases = phases.clone();
        let echo = tokio::spawn(async move {
            let mut drops = 0u64;
            while let Some(Message::CreditDrop(drop)) = pull.recv().await {
                drops += 1;
                echo_phases.note_return(&CreditReturnMessage {
                    service_id: "worker_test".to_string(),
                    request_ns: 1,
                    phase: drop.phase,
                    delayed_ns: None,
                    failed: false,
                });
                if drops == 4 {
                    break;
                }
            }
            drops
        });

        strategy.run().await.expect("strategy run");
        let drops = echo.await.expect("echo task");
        assert_eq!(drops, 4);

        let snapshot = phases.snapshot().expect("snapshot");
        assert_eq!(snapshot.phase, CreditPhase::Profiling);
        assert_eq!(snapshot.sent, 4);
        assert_eq!(snapshot.completed, 4);
    }

    /// Cancellation halts issuing immediately and completes the phase with
    /// `cancelled = true`.
    #[tokio::test]
    async fn test_cancel_stops_issuing() {
        let ctx = test_ctx();
        let drop_client = ctx
            .comms()
            .create_push_client(CommAddress::CreditDrop)
            .expect("push");
        let _pull = ctx
            .comms()
            .create_pull_client(CommAddress::CreditDrop)
            .expect("pull");
        let phases = Arc::new(PhaseOrchestrator::new(ctx.clone(), drop_client, None));

        let config = TimingManagerConfig {
            timing_mode: aiperf_common::enums::TimingMode::RequestRate,
            concurrency: 1,
            request_rate: 1000.0,
            rate_distribution: aiperf_common::enums::RateDistribution::Constant,
            request_count: Some(1_000_000),
            expected_duration_sec: None,
            warmup_request_count: 0,
            request_cancellation_ns: None,
        };
        let strategy = create_strategy(&config, phases.clone(), None).expect("strategy");

        let cancel_phases = phases.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            cancel_phases.cancel();
        });

        tokio::time::timeout(std::time::Duration::from_secs(5), strategy.run())
            .await
            .expect("strategy should stop after cancel")
            .expect("strategy run");

        let snapshot = phases.snapshot().expect("snapshot");
        assert!(snapshot.sent < 1_000_000);
    }
}
