//! The telemetry manager service.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, info};

use aiperf_common::comms::{CommAddress, PushClient};
use aiperf_common::config::UserConfig;
use aiperf_common::constants::DEFAULT_TELEMETRY_COLLECTION_INTERVAL;
use aiperf_common::enums::{GpuTelemetryMode, ServiceType};
use aiperf_common::messages::{
    Command, CommandMessage, Message, TelemetryRecordsMessage, TelemetryStatusMessage,
};
use aiperf_common::models::ErrorDetails;
use aiperf_common::service::{
    BackgroundTaskSpec, CommandOutcome, Service, ServiceContext, ServiceSpec,
};
use aiperf_common::{time_ns, AIPerfError, AIPerfResult};

use crate::collector::parse_gauge_lines;

const COLLECT_TASK: &str = "telemetry_collect";
const REACHABILITY_TIMEOUT: Duration = Duration::from_secs(2);

/// Scrapes configured GPU metrics endpoints and pushes sample batches to
/// the records manager. Disabled (and so reported) when no endpoints are
/// configured.
pub struct TelemetryManager {
    config: RwLock<Arc<UserConfig>>,
    http: reqwest::Client,
    push: RwLock<Option<PushClient>>,
    collecting: AtomicBool,
    reachable: RwLock<Vec<String>>,
}

impl TelemetryManager {
    pub fn new(config: Arc<UserConfig>) -> AIPerfResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(REACHABILITY_TIMEOUT)
            .build()
            .map_err(|e| AIPerfError::CommunicationCreate(e.to_string()))?;
        Ok(Self {
            config: RwLock::new(config),
            http,
            push: RwLock::new(None),
            collecting: AtomicBool::new(false),
            reachable: RwLock::new(Vec::new()),
        })
    }

    fn enabled(&self) -> bool {
        let config = self.config.read();
        config.telemetry.mode != GpuTelemetryMode::Disabled
            && !config.telemetry.endpoints.is_empty()
    }

    /// Probe each configured endpoint and announce availability.
    async fn configure(&self, ctx: &Arc<ServiceContext>, config: Arc<UserConfig>) {
        *self.config.write() = config.clone();
        let configured = config.telemetry.endpoints.clone();
        let mut reachable = Vec::new();
        if self.enabled() {
            for endpoint in &configured {
                match self.http.get(endpoint).send().await {
                    Ok(response) if response.status().is_success() => {
                        reachable.push(endpoint.clone());
                    }
                    Ok(response) => {
                        debug!(endpoint, status = %response.status(), "telemetry endpoint unhealthy");
                    }
                    Err(e) => {
                        debug!(endpoint, "telemetry endpoint unreachable: {e}");
                    }
                }
            }
        }
        *self.reachable.write() = reachable.clone();

        let enabled = self.enabled() && !reachable.is_empty();
        let reason = if configured.is_empty() {
            Some("no telemetry endpoints configured".to_string())
        } else if !enabled {
            Some("no telemetry endpoints reachable".to_string())
        } else {
            None
        };
        info!(
            enabled,
            configured = configured.len(),
            reachable = reachable.len(),
            "telemetry configured"
        );
        ctx.publish(Message::TelemetryStatus(TelemetryStatusMessage {
            service_id: ctx.service_id.clone(),
            request_ns: time_ns(),
            enabled,
            endpoints_configured: configured,
            endpoints_reachable: reachable,
            reason,
        }));
    }

    async fn collect_once(&self, ctx: &Arc<ServiceContext>) -> AIPerfResult<()> {
        let push = self
            .push
            .read()
            .clone()
            .ok_or_else(|| AIPerfError::NotInitialized("telemetry push client".to_string()))?;
        let endpoints = self.reachable.read().clone();
        for endpoint in endpoints {
            let message = match self.scrape(&endpoint).await {
                Ok(records) => TelemetryRecordsMessage {
                    service_id: ctx.service_id.clone(),
                    request_ns: time_ns(),
                    records,
                    error: None,
                },
                Err(e) => TelemetryRecordsMessage {
                    service_id: ctx.service_id.clone(),
                    request_ns: time_ns(),
                    records: Vec::new(),
                    error: Some(ErrorDetails::from(&e)),
                },
            };
            push.push(Message::TelemetryRecords(message)).await?;
        }
        Ok(())
    }

    async fn scrape(
        &self,
        endpoint: &str,
    ) -> AIPerfResult<Vec<aiperf_common::models::TelemetryRecord>> {
        let body = self
            .http
            .get(endpoint)
            .send()
            .await
            .map_err(|e| AIPerfError::Service(format!("telemetry scrape failed: {e}")))?
            .text()
            .await
            .map_err(|e| AIPerfError::Service(format!("telemetry body read failed: {e}")))?;
        Ok(parse_gauge_lines(endpoint, &body))
    }
}

#[async_trait]
impl Service for TelemetryManager {
    fn spec(&self) -> ServiceSpec {
        let mut spec = ServiceSpec::component(ServiceType::TelemetryManager);
        spec.background_tasks = vec![BackgroundTaskSpec::interval(
            COLLECT_TASK,
            DEFAULT_TELEMETRY_COLLECTION_INTERVAL,
        )];
        spec
    }

    async fn on_init(&self, ctx: &Arc<ServiceContext>) -> AIPerfResult<()> {
        *self.push.write() = Some(ctx.comms().create_push_client(CommAddress::Records)?);
        Ok(())
    }

    async fn on_command(
        &self,
        ctx: &Arc<ServiceContext>,
        command: &CommandMessage,
    ) -> AIPerfResult<CommandOutcome> {
        match &command.command {
            Command::ProfileConfigure { config } => {
                self.configure(ctx, Arc::new((**config).clone())).await;
                Ok(CommandOutcome::Success(None))
            }
            Command::ProfileStart => {
                self.collecting.store(true, Ordering::SeqCst);
                Ok(CommandOutcome::Success(None))
            }
            Command::ProfileCancel => {
                self.collecting.store(false, Ordering::SeqCst);
                Ok(CommandOutcome::Acknowledged)
            }
            Command::StartRealtimeTelemetry => {
                let mut config = (**self.config.read()).clone();
                config.telemetry.mode = GpuTelemetryMode::RealtimeDashboard;
                *self.config.write() = Arc::new(config);
                Ok(CommandOutcome::Success(None))
            }
            _ => Ok(CommandOutcome::Unhandled),
        }
    }

    async fn on_background_task(&self, ctx: &Arc<ServiceContext>, name: &str) -> AIPerfResult<()> {
        if name != COLLECT_TASK
            || !self.collecting.load(Ordering::SeqCst)
            || !self.enabled()
        {
            return Ok(());
        }
        self.collect_once(ctx).await
    }

    async fn on_stop(&self, _ctx: &Arc<ServiceContext>) -> AIPerfResult<()> {
        self.collecting.store(false, Ordering::SeqCst);
        Ok(())
    }
}
