//! The worker manager service: pool sizing and health tracking.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, warn};

use aiperf_common::config::{ServiceConfig, UserConfig};
use aiperf_common::constants::{
    DEFAULT_MAX_WORKERS_CAP, DEFAULT_WORKER_CHECK_INTERVAL,
    DEFAULT_WORKER_ERROR_RECOVERY_TIME_SECS, DEFAULT_WORKER_HIGH_LOAD_CPU_USAGE,
    DEFAULT_WORKER_HIGH_LOAD_RECOVERY_TIME_SECS, DEFAULT_WORKER_STALE_TIME_SECS,
    DEFAULT_WORKER_STATUS_SUMMARY_INTERVAL, NANOS_PER_SECOND,
};
use aiperf_common::enums::{ServiceType, WorkerStatus};
use aiperf_common::messages::{
    Command, CommandMessage, Message, WorkerHealthMessage, WorkerStatusSummaryMessage,
};
use aiperf_common::messages::MessageType;
use aiperf_common::models::{WorkerHealth, WorkerTaskStats};
use aiperf_common::service::{
    BackgroundTaskSpec, CommandOutcome, Service, ServiceContext, ServiceSpec,
};
use aiperf_common::{time_ns, AIPerfResult};

const STATUS_CHECK_TASK: &str = "worker_status_check";
const STATUS_SUMMARY_TASK: &str = "worker_status_summary";

/// Tracked status for one worker.
#[derive(Debug, Clone)]
struct WorkerStatusInfo {
    status: WorkerStatus,
    health: WorkerHealth,
    task_stats: WorkerTaskStats,
    last_update_ns: u64,
    last_error_ns: Option<u64>,
    last_high_load_ns: Option<u64>,
}

/// Sizes the worker pool, asks the controller to spawn it, and tracks
/// per-worker health into periodic status summaries.
pub struct WorkerManager {
    initial_workers: usize,
    worker_infos: Mutex<HashMap<String, WorkerStatusInfo>>,
}

impl WorkerManager {
    pub fn new(user_config: &UserConfig, service_config: &ServiceConfig) -> Self {
        let initial_workers = Self::compute_worker_count(
            user_config,
            service_config,
            num_cpus::get(),
        );
        Self {
            initial_workers,
            worker_infos: Mutex::new(HashMap::new()),
        }
    }

    /// min(max(1, 0.75 * cpus - 1), cap), capped by concurrency, floored by
    /// the configured minimum.
    fn compute_worker_count(
        user_config: &UserConfig,
        service_config: &ServiceConfig,
        cpu_count: usize,
    ) -> usize {
        let mut max_workers = service_config.workers.max.unwrap_or_else(|| {
            ((cpu_count as f64 * 0.75) as usize)
                .saturating_sub(1)
                .clamp(1, DEFAULT_MAX_WORKERS_CAP)
        });

        if let Some(concurrency) = user_config.loadgen.concurrency {
            if concurrency < max_workers {
                max_workers = concurrency;
            }
        }

        max_workers.max(service_config.workers.min.unwrap_or(1))
    }

    pub fn initial_workers(&self) -> usize {
        self.initial_workers
    }

    fn update_worker_status(&self, message: &WorkerHealthMessage) {
        let now_ns = time_ns();
        let mut infos = self.worker_infos.lock();
        let info = infos
            .entry(message.service_id.clone())
            .or_insert_with(|| WorkerStatusInfo {
                status: WorkerStatus::Healthy,
                health: message.health,
                task_stats: message.task_stats,
                last_update_ns: now_ns,
                last_error_ns: None,
                last_high_load_ns: None,
            });

        info.last_update_ns = now_ns;

        let within = |since: Option<u64>, window_secs: f64| {
            since
                .map(|t| (now_ns.saturating_sub(t)) as f64 / (NANOS_PER_SECOND as f64) < window_secs)
                .unwrap_or(false)
        };

        if message.task_stats.failed > info.task_stats.failed {
            info.last_error_ns = Some(now_ns);
            info.status = WorkerStatus::Error;
        } else if within(info.last_error_ns, DEFAULT_WORKER_ERROR_RECOVERY_TIME_SECS) {
            info.status = WorkerStatus::Error;
        } else if message.health.cpu_usage > DEFAULT_WORKER_HIGH_LOAD_CPU_USAGE {
            info.last_high_load_ns = Some(now_ns);
            warn!(
                worker_id = %message.service_id,
                cpu_usage = message.health.cpu_usage,
                "worker CPU usage is high, results may be inaccurate"
            );
            info.status = WorkerStatus::HighLoad;
        } else if within(info.last_high_load_ns, DEFAULT_WORKER_HIGH_LOAD_RECOVERY_TIME_SECS) {
            info.status = WorkerStatus::HighLoad;
        } else if message.task_stats.total == 0 || message.task_stats.in_progress == 0 {
            info.status = WorkerStatus::Idle;
        } else {
            info.status = WorkerStatus::Healthy;
        }

        info.health = message.health;
        info.task_stats = message.task_stats;
    }

    fn mark_stale_workers(&self) {
        let now_ns = time_ns();
        let mut infos = self.worker_infos.lock();
        for info in infos.values_mut() {
            let silent_secs =
                (now_ns.saturating_sub(info.last_update_ns)) as f64 / NANOS_PER_SECOND as f64;
            if silent_secs > DEFAULT_WORKER_STALE_TIME_SECS {
                info.status = WorkerStatus::Stale;
            }
        }
    }

    fn status_snapshot(&self) -> HashMap<String, WorkerStatus> {
        self.worker_infos
            .lock()
            .iter()
            .map(|(id, info)| (id.clone(), info.status))
            .collect()
    }
}

#[async_trait]
impl Service for WorkerManager {
    fn spec(&self) -> ServiceSpec {
        let mut spec = ServiceSpec::component(ServiceType::WorkerManager);
        spec.subscriptions = vec![MessageType::WorkerHealth];
        spec.background_tasks = vec![
            BackgroundTaskSpec::interval(STATUS_CHECK_TASK, DEFAULT_WORKER_CHECK_INTERVAL),
            BackgroundTaskSpec::interval(
                STATUS_SUMMARY_TASK,
                DEFAULT_WORKER_STATUS_SUMMARY_INTERVAL,
            ),
        ];
        spec
    }

    async fn on_start(&self, ctx: &Arc<ServiceContext>) -> AIPerfResult<()> {
        debug!(
            workers = self.initial_workers,
            "requesting initial worker pool"
        );
        // Target the controller directly to avoid broadcasting to all
        // services.
        ctx.send_command_and_wait_for_response(
            CommandMessage::to_service_type(
                ctx.service_id.clone(),
                ServiceType::SystemController,
                Command::SpawnWorkers {
                    num_workers: self.initial_workers,
                },
            ),
            aiperf_common::constants::DEFAULT_COMMS_REQUEST_TIMEOUT,
        )
        .await?;
        Ok(())
    }

    async fn on_stop(&self, ctx: &Arc<ServiceContext>) -> AIPerfResult<()> {
        ctx.publish_command(CommandMessage::to_service_type(
            ctx.service_id.clone(),
            ServiceType::SystemController,
            Command::ShutdownWorkers { all_workers: true },
        ));
        Ok(())
    }

    async fn on_message(&self, _ctx: &Arc<ServiceContext>, message: Message) -> AIPerfResult<()> {
        if let Message::WorkerHealth(health) = message {
            self.update_worker_status(&health);
        }
        Ok(())
    }

    async fn on_command(
        &self,
        _ctx: &Arc<ServiceContext>,
        command: &CommandMessage,
    ) -> AIPerfResult<CommandOutcome> {
        match &command.command {
            Command::ProfileConfigure { .. } | Command::ProfileStart => {
                Ok(CommandOutcome::Success(None))
            }
            Command::ProfileCancel => Ok(CommandOutcome::Acknowledged),
            _ => Ok(CommandOutcome::Unhandled),
        }
    }

    async fn on_background_task(&self, ctx: &Arc<ServiceContext>, name: &str) -> AIPerfResult<()> {
        match name {
            STATUS_CHECK_TASK => self.mark_stale_workers(),
            STATUS_SUMMARY_TASK => {
                ctx.publish(Message::WorkerStatusSummary(WorkerStatusSummaryMessage {
                    service_id: ctx.service_id.clone(),
                    request_ns: time_ns(),
                    worker_statuses: self.status_snapshot(),
                }));
            }
            _ => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aiperf_common::config::WorkersConfig;

    fn configs(
        concurrency: Option<usize>,
        min: Option<usize>,
        max: Option<usize>,
    ) -> (UserConfig, ServiceConfig) {
        let mut user_config = UserConfig::default();
        user_config.loadgen.concurrency = concurrency;
        let service_config = ServiceConfig {
            workers: WorkersConfig { min, max },
            ..Default::default()
        };
        (user_config, service_config)
    }

    #[test]
    fn test_worker_count_auto_formula() {
        let (user, service) = configs(None, None, None);
        // 0.75 * 16 - 1 = 11
        assert_eq!(WorkerManager::compute_worker_count(&user, &service, 16), 11);
        // Small hosts still get one worker.
        assert_eq!(WorkerManager::compute_worker_count(&user, &service, 1), 1);
        // Giant hosts hit the cap.
        assert_eq!(
            WorkerManager::compute_worker_count(&user, &service, 128),
            DEFAULT_MAX_WORKERS_CAP
        );
    }

    #[test]
    fn test_worker_count_capped_by_concurrency() {
        let (user, service) = configs(Some(2), None, None);
        assert_eq!(WorkerManager::compute_worker_count(&user, &service, 16), 2);
    }

    #[test]
    fn test_worker_count_floored_by_min() {
        let (user, service) = configs(Some(2), Some(4), None);
        assert_eq!(WorkerManager::compute_worker_count(&user, &service, 16), 4);
    }

    #[test]
    fn test_worker_count_explicit_max_wins() {
        let (user, service) = configs(None, None, Some(3));
        assert_eq!(WorkerManager::compute_worker_count(&user, &service, 64), 3);
    }

    fn health_message(
        worker_id: &str,
        cpu: f64,
        failed: u64,
        in_progress: u64,
    ) -> WorkerHealthMessage {
        WorkerHealthMessage {
            service_id: worker_id.to_string(),
            request_ns: time_ns(),
            health: WorkerHealth {
                cpu_usage: cpu,
                uptime_sec: 1.0,
            },
            task_stats: WorkerTaskStats {
                total: 10,
                in_progress,
                completed: 10 - failed,
                failed,
            },
        }
    }

    #[test]
    fn test_status_derivation() {
        let (user, service) = configs(None, None, None);
        let manager = WorkerManager::new(&user, &service);

        manager.update_worker_status(&health_message("w1", 10.0, 0, 1));
        assert_eq!(manager.status_snapshot()["w1"], WorkerStatus::Healthy);

        // New failures flip the worker to Error.
        manager.update_worker_status(&health_message("w1", 10.0, 1, 1));
        assert_eq!(manager.status_snapshot()["w1"], WorkerStatus::Error);

        // High CPU on a fresh worker reads as high load.
        manager.update_worker_status(&health_message("w2", 95.0, 0, 1));
        assert_eq!(manager.status_snapshot()["w2"], WorkerStatus::HighLoad);

        // No work in flight reads as idle.
        manager.update_worker_status(&health_message("w3", 10.0, 0, 0));
        assert_eq!(manager.status_snapshot()["w3"], WorkerStatus::Idle);
    }
}
