//! The records manager service: the aggregation engine.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use aiperf_common::comms::CommAddress;
use aiperf_common::config::UserConfig;
use aiperf_common::constants::{
    DEFAULT_CANCEL_DRAIN_TIMEOUT, DEFAULT_PROGRESS_REPORT_INTERVAL,
    DEFAULT_PULL_CLIENT_MAX_CONCURRENCY, DEFAULT_REALTIME_METRICS_INTERVAL, NANOS_PER_SECOND,
};
use aiperf_common::enums::{CreditPhase, GpuTelemetryMode, ServiceType};
use aiperf_common::messages::{
    AllRecordsReceivedMessage, Command, CommandMessage, Message, MessageType,
    ProcessRecordsResultMessage, ProcessTelemetryResultMessage, RealtimeMetricsMessage,
    RealtimeTelemetryMetricsMessage, RecordsProcessingStatsMessage, TelemetryRecordsMessage,
};
use aiperf_common::models::{
    ErrorDetails, ErrorDetailsCount, MetricRecordData, MetricResult, ProcessRecordsResult,
    ProcessTelemetryResult, ProcessingStats, ProfileResults, TelemetryRecord, TelemetryResults,
};
use aiperf_common::service::{
    BackgroundTaskSpec, CommandOutcome, PullBinding, Service, ServiceContext, ServiceSpec,
};
use aiperf_common::{time_ns, AIPerfResult};
use aiperf_metrics::MetricRegistry;

use crate::completion::{PhaseCompletionChecker, PhaseCompletionContext};
use crate::results::{MetricSummaryProcessor, ResultsProcessor};

const PROGRESS_TASK: &str = "records_progress";
const REALTIME_METRICS_TASK: &str = "realtime_metrics";
const REALTIME_TELEMETRY_TASK: &str = "realtime_telemetry";

/// Everything guarded by the processing-status lock.
#[derive(Default)]
struct ProcessingStatus {
    start_time_ns: Option<u64>,
    expected_duration_sec: Option<f64>,
    processing_stats: ProcessingStats,
    final_request_count: Option<u64>,
    end_time_ns: Option<u64>,
    sent_all_records_received: bool,
    profile_cancelled: bool,
    timeout_triggered: bool,
    previous_realtime_records: Option<u64>,
}

/// Telemetry collection state, separate from inference records.
#[derive(Default)]
struct TelemetryState {
    records: Vec<TelemetryRecord>,
    error_counts: HashMap<ErrorDetails, u64>,
    endpoints_seen: Vec<String>,
}

/// Consumes metric and telemetry records, tracks phase completion, publishes
/// progress, and drives final processing through the results processors.
///
/// Lock ordering: `status` before `worker_stats` before `error_summary`.
/// Locks are never held across a publish.
pub struct RecordsManager {
    config: parking_lot::RwLock<Arc<UserConfig>>,
    status: Mutex<ProcessingStatus>,
    worker_stats: Mutex<HashMap<String, ProcessingStats>>,
    error_summary: Mutex<HashMap<ErrorDetails, u64>>,
    telemetry: Mutex<TelemetryState>,
    completion_checker: PhaseCompletionChecker,
    processors: Vec<Arc<dyn ResultsProcessor>>,
    results_published: AtomicBool,
}

impl RecordsManager {
    pub fn new(config: Arc<UserConfig>) -> AIPerfResult<Self> {
        let registry = Arc::new(MetricRegistry::with_builtin_metrics()?);
        let processors: Vec<Arc<dyn ResultsProcessor>> =
            vec![Arc::new(MetricSummaryProcessor::new(registry))];
        Ok(Self {
            config: parking_lot::RwLock::new(config),
            status: Mutex::new(ProcessingStatus::default()),
            worker_stats: Mutex::new(HashMap::new()),
            error_summary: Mutex::new(HashMap::new()),
            telemetry: Mutex::new(TelemetryState::default()),
            completion_checker: PhaseCompletionChecker::new(),
            processors,
            results_published: AtomicBool::new(false),
        })
    }

    /// Duration benchmarks enforce all-or-nothing inclusion: a request whose
    /// end crossed the grace boundary is discarded entirely.
    async fn should_include_by_duration(&self, data: &MetricRecordData) -> bool {
        let status = self.status.lock().await;
        let (Some(expected), Some(start_ns)) =
            (status.expected_duration_sec, status.start_time_ns)
        else {
            return true;
        };
        let grace = self.config.read().loadgen.benchmark_grace_period_sec;
        let duration_end_ns =
            start_ns + ((expected + grace) * NANOS_PER_SECOND as f64) as u64;
        if data.metadata.request_end_ns > duration_end_ns {
            debug!(
                overrun_ns = data.metadata.request_end_ns - duration_end_ns,
                "filtering out record past the benchmark window"
            );
            return false;
        }
        true
    }

    async fn handle_metric_records(&self, ctx: &Arc<ServiceContext>, data: MetricRecordData) {
        if data.metadata.benchmark_phase != CreditPhase::Profiling {
            debug!(
                phase = %data.metadata.benchmark_phase,
                "skipping non-profiling record"
            );
            return;
        }

        let include = self.should_include_by_duration(&data).await;
        if include {
            self.dispatch_to_processors(&data).await;
        }

        let worker_id = data.metadata.worker_id.clone();
        if data.valid() && include {
            {
                let mut status = self.status.lock().await;
                status.processing_stats.processed += 1;
            }
            let mut worker_stats = self.worker_stats.lock().await;
            worker_stats.entry(worker_id).or_default().processed += 1;
        } else if data.valid() {
            debug!(worker_id, "record filtered out past benchmark duration");
        } else {
            {
                let mut status = self.status.lock().await;
                status.processing_stats.errors += 1;
            }
            {
                let mut worker_stats = self.worker_stats.lock().await;
                worker_stats.entry(worker_id).or_default().errors += 1;
            }
            if let Some(error) = &data.error {
                let mut error_summary = self.error_summary.lock().await;
                *error_summary.entry(error.clone()).or_default() += 1;
            }
        }

        self.check_if_all_records_received(ctx).await;
    }

    async fn dispatch_to_processors(&self, data: &MetricRecordData) {
        let results = join_all(
            self.processors
                .iter()
                .map(|processor| processor.process_record(data)),
        )
        .await;
        for result in results {
            if let Err(e) = result {
                warn!("results processor failed on record: {e}");
            }
        }
    }

    async fn handle_telemetry_records(&self, message: TelemetryRecordsMessage) {
        let mut telemetry = self.telemetry.lock().await;
        if message.valid() {
            for record in message.records {
                if !telemetry.endpoints_seen.contains(&record.endpoint) {
                    telemetry.endpoints_seen.push(record.endpoint.clone());
                }
                telemetry.records.push(record);
            }
        } else if let Some(error) = message.error {
            *telemetry.error_counts.entry(error).or_default() += 1;
        }
    }

    /// Fires `AllRecordsReceived` and final processing exactly once.
    async fn check_if_all_records_received(&self, ctx: &Arc<ServiceContext>) {
        let (cancelled, stats) = {
            let mut status = self.status.lock().await;
            let context = PhaseCompletionContext {
                processing_stats: status.processing_stats,
                final_request_count: status.final_request_count,
                timeout_triggered: status.timeout_triggered,
                expected_duration_sec: status.expected_duration_sec,
            };
            let (complete, reason) = self.completion_checker.is_complete(&context);
            if !complete {
                return;
            }
            if let Some(expected) = status.final_request_count {
                if status.processing_stats.total_records() > expected {
                    warn!(
                        total = status.processing_stats.total_records(),
                        expected, "processed more records than expected"
                    );
                }
            }
            if status.sent_all_records_received {
                return;
            }
            status.sent_all_records_received = true;
            debug!(?reason, "all records received");
            (status.profile_cancelled, status.processing_stats)
        };

        info!(
            processed = stats.processed,
            errors = stats.errors,
            total = stats.total_records(),
            "all records processed"
        );
        self.publish_processing_stats(ctx).await;
        ctx.publish(Message::AllRecordsReceived(AllRecordsReceivedMessage {
            service_id: ctx.service_id.clone(),
            request_ns: time_ns(),
            final_processing_stats: stats,
        }));
        self.process_results(ctx, cancelled).await;
    }

    async fn publish_processing_stats(&self, ctx: &Arc<ServiceContext>) {
        let processing_stats = { self.status.lock().await.processing_stats };
        let worker_stats = { self.worker_stats.lock().await.clone() };
        ctx.publish(Message::RecordsProcessingStats(
            RecordsProcessingStatsMessage {
                service_id: ctx.service_id.clone(),
                request_ns: time_ns(),
                processing_stats,
                worker_stats,
            },
        ));
    }

    async fn error_summary_counts(&self) -> Vec<ErrorDetailsCount> {
        self.error_summary
            .lock()
            .await
            .iter()
            .map(|(error_details, count)| ErrorDetailsCount {
                error_details: error_details.clone(),
                count: *count,
            })
            .collect()
    }

    async fn summarize_all(&self) -> (Vec<MetricResult>, Vec<ErrorDetails>) {
        let results = join_all(self.processors.iter().map(|p| p.summarize())).await;
        let mut records = Vec::new();
        let mut errors = Vec::new();
        for result in results {
            match result {
                Ok(mut metrics) => records.append(&mut metrics),
                Err(e) => errors.push(ErrorDetails::from(&e)),
            }
        }
        (records, errors)
    }

    /// Summarize every processor and publish the final results (once).
    async fn process_results(
        &self,
        ctx: &Arc<ServiceContext>,
        cancelled: bool,
    ) -> ProcessRecordsResult {
        info!(cancelled, "processing records results");
        let (records, errors) = self.summarize_all().await;
        let (start_ns, end_ns) = {
            let status = self.status.lock().await;
            (
                status.start_time_ns.unwrap_or_else(time_ns),
                status.end_time_ns.unwrap_or_else(time_ns),
            )
        };
        let completed = records
            .iter()
            .find(|r| r.tag == aiperf_metrics::builtin::tags::REQUEST_COUNT)
            .map(|r| r.avg as u64)
            .unwrap_or(0);

        let result = ProcessRecordsResult {
            results: ProfileResults {
                records,
                completed,
                start_ns,
                end_ns,
                error_summary: self.error_summary_counts().await,
                was_cancelled: cancelled,
            },
            errors,
        };

        if !self.results_published.swap(true, Ordering::SeqCst) {
            ctx.publish(Message::ProcessRecordsResult(ProcessRecordsResultMessage {
                service_id: ctx.service_id.clone(),
                request_ns: time_ns(),
                results: result.clone(),
            }));
            self.publish_telemetry_results(ctx).await;
        }
        result
    }

    async fn publish_telemetry_results(&self, ctx: &Arc<ServiceContext>) {
        let (start_ns, end_ns) = {
            let status = self.status.lock().await;
            (
                status.start_time_ns.unwrap_or_else(time_ns),
                status.end_time_ns.unwrap_or_else(time_ns),
            )
        };
        let telemetry = self.telemetry.lock().await;
        let error_summary: Vec<ErrorDetailsCount> = telemetry
            .error_counts
            .iter()
            .map(|(error_details, count)| ErrorDetailsCount {
                error_details: error_details.clone(),
                count: *count,
            })
            .collect();
        let results = TelemetryResults {
            records: telemetry.records.clone(),
            start_ns,
            end_ns,
            endpoints_configured: self.config.read().telemetry.endpoints.clone(),
            endpoints_successful: telemetry.endpoints_seen.clone(),
            error_summary,
        };
        let errors: Vec<ErrorDetails> = telemetry.error_counts.keys().cloned().collect();
        ctx.publish(Message::ProcessTelemetryResult(
            ProcessTelemetryResultMessage {
                service_id: ctx.service_id.clone(),
                request_ns: time_ns(),
                telemetry_result: ProcessTelemetryResult { results, errors },
            },
        ));
    }

    /// Bounded wait for in-flight records after a cancel: finish as soon as
    /// counts stop moving, or at the drain deadline.
    async fn drain_after_cancel(&self) {
        let deadline = tokio::time::Instant::now() + DEFAULT_CANCEL_DRAIN_TIMEOUT;
        let mut last_total = {
            self.status.lock().await.processing_stats.total_records()
        };
        loop {
            let poll = tokio::time::Duration::from_millis(100);
            if tokio::time::Instant::now() + poll >= deadline {
                break;
            }
            tokio::time::sleep(poll).await;
            let total = { self.status.lock().await.processing_stats.total_records() };
            if total == last_total {
                break;
            }
            last_total = total;
        }
    }

    async fn realtime_metrics(&self) -> Vec<MetricResult> {
        let (records, _) = self.summarize_all().await;
        records
    }
}

#[async_trait]
impl Service for RecordsManager {
    fn spec(&self) -> ServiceSpec {
        let mut spec = ServiceSpec::component(ServiceType::RecordsManager);
        spec.subscriptions = vec![
            MessageType::CreditPhaseStart,
            MessageType::CreditPhaseSendingComplete,
            MessageType::CreditPhaseComplete,
        ];
        spec.pull_bindings = vec![PullBinding::new(CommAddress::Records)
            .with_max_concurrency(DEFAULT_PULL_CLIENT_MAX_CONCURRENCY)];
        spec.background_tasks = vec![
            BackgroundTaskSpec::interval(PROGRESS_TASK, DEFAULT_PROGRESS_REPORT_INTERVAL),
            BackgroundTaskSpec::interval(
                REALTIME_METRICS_TASK,
                DEFAULT_REALTIME_METRICS_INTERVAL,
            ),
            BackgroundTaskSpec::interval(
                REALTIME_TELEMETRY_TASK,
                DEFAULT_REALTIME_METRICS_INTERVAL,
            ),
        ];
        spec
    }

    async fn on_message(&self, ctx: &Arc<ServiceContext>, message: Message) -> AIPerfResult<()> {
        match message {
            Message::CreditPhaseStart(start) => {
                if start.phase != CreditPhase::Profiling {
                    return Ok(());
                }
                let mut status = self.status.lock().await;
                status.start_time_ns = Some(start.start_ns);
                status.expected_duration_sec = start.expected_duration_sec;
                status.processing_stats.total_expected_requests =
                    start.total_expected_requests;
            }
            Message::CreditPhaseSendingComplete(sending) => {
                if sending.phase == CreditPhase::Profiling {
                    info!(
                        sent = sending.sent,
                        "all conversations sent, waiting for completion"
                    );
                }
            }
            Message::CreditPhaseComplete(complete) => {
                if complete.phase != CreditPhase::Profiling {
                    return Ok(());
                }
                {
                    let mut status = self.status.lock().await;
                    status.final_request_count = Some(complete.final_request_count);
                    status.end_time_ns = Some(complete.end_ns);
                    status.timeout_triggered = complete.timeout_triggered;
                    if complete.cancelled {
                        status.profile_cancelled = true;
                    }
                    info!(
                        total = status.processing_stats.total_records(),
                        expected = complete.final_request_count,
                        "credit phase complete, waiting for remaining records"
                    );
                }
                // Guards the race where every record was processed before
                // the final request count was known.
                self.check_if_all_records_received(ctx).await;
            }
            _ => {}
        }
        Ok(())
    }

    async fn on_pull_message(
        &self,
        ctx: &Arc<ServiceContext>,
        _address: CommAddress,
        message: Message,
    ) -> AIPerfResult<()> {
        match message {
            Message::MetricRecords(records) => {
                self.handle_metric_records(ctx, records.data).await;
            }
            Message::TelemetryRecords(telemetry) => {
                self.handle_telemetry_records(telemetry).await;
            }
            _ => {}
        }
        Ok(())
    }

    async fn on_command(
        &self,
        ctx: &Arc<ServiceContext>,
        command: &CommandMessage,
    ) -> AIPerfResult<CommandOutcome> {
        match &command.command {
            Command::ProfileConfigure { config } => {
                *self.config.write() = Arc::new((**config).clone());
                Ok(CommandOutcome::Success(None))
            }
            Command::ProfileStart => Ok(CommandOutcome::Success(None)),
            Command::ProcessRecords { cancelled } => {
                let result = self.process_results(ctx, *cancelled).await;
                Ok(CommandOutcome::Success(Some(serde_json::to_value(result)?)))
            }
            Command::ProfileCancel => {
                {
                    let mut status = self.status.lock().await;
                    status.profile_cancelled = true;
                }
                self.drain_after_cancel().await;
                let result = self.process_results(ctx, true).await;
                Ok(CommandOutcome::Success(Some(serde_json::to_value(result)?)))
            }
            Command::StartRealtimeTelemetry => {
                let mut config = (**self.config.read()).clone();
                config.telemetry.mode = GpuTelemetryMode::RealtimeDashboard;
                *self.config.write() = Arc::new(config);
                Ok(CommandOutcome::Success(None))
            }
            Command::RealtimeMetrics => {
                let metrics = self.realtime_metrics().await;
                if !metrics.is_empty() {
                    ctx.publish(Message::RealtimeMetrics(RealtimeMetricsMessage {
                        service_id: ctx.service_id.clone(),
                        request_ns: time_ns(),
                        metrics,
                    }));
                }
                Ok(CommandOutcome::Success(None))
            }
            _ => Ok(CommandOutcome::Unhandled),
        }
    }

    async fn on_background_task(&self, ctx: &Arc<ServiceContext>, name: &str) -> AIPerfResult<()> {
        match name {
            PROGRESS_TASK => {
                let has_records = {
                    let status = self.status.lock().await;
                    status.processing_stats.total_records() > 0
                };
                if has_records {
                    self.publish_processing_stats(ctx).await;
                }
            }
            REALTIME_METRICS_TASK => {
                // Skip when nothing changed since the last snapshot.
                let changed = {
                    let mut status = self.status.lock().await;
                    let total = status.processing_stats.total_records();
                    let changed = status.previous_realtime_records != Some(total);
                    status.previous_realtime_records = Some(total);
                    changed && total > 0
                };
                if changed {
                    let metrics = self.realtime_metrics().await;
                    if !metrics.is_empty() {
                        ctx.publish(Message::RealtimeMetrics(RealtimeMetricsMessage {
                            service_id: ctx.service_id.clone(),
                            request_ns: time_ns(),
                            metrics,
                        }));
                    }
                }
            }
            REALTIME_TELEMETRY_TASK => {
                if self.config.read().telemetry.mode != GpuTelemetryMode::RealtimeDashboard {
                    return Ok(());
                }
                let telemetry = self.telemetry.lock().await;
                if telemetry.records.is_empty() {
                    return Ok(());
                }
                // Latest value per (endpoint, gpu, tag).
                let mut latest: HashMap<(String, u32, String), &TelemetryRecord> =
                    HashMap::new();
                for record in &telemetry.records {
                    latest.insert(
                        (record.endpoint.clone(), record.gpu_index, record.tag.clone()),
                        record,
                    );
                }
                let metrics: Vec<MetricResult> = latest
                    .into_values()
                    .map(|record| MetricResult {
                        tag: record.tag.clone(),
                        header: record.tag.clone(),
                        current: Some(record.value),
                        avg: record.value,
                        min: record.value,
                        max: record.value,
                        count: 1,
                        ..Default::default()
                    })
                    .collect();
                drop(telemetry);
                ctx.publish(Message::RealtimeTelemetryMetrics(
                    RealtimeTelemetryMetricsMessage {
                        service_id: ctx.service_id.clone(),
                        request_ns: time_ns(),
                        metrics,
                    },
                ));
            }
            _ => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aiperf_common::comms::{Comms, MessageBusHub, ProxyManager};
    use aiperf_common::config::{CommsConfig, ServiceConfig};
    use aiperf_common::models::{MetricRecordMetadata, MetricValue};
    use aiperf_metrics::builtin::tags;

    fn test_ctx() -> Arc<ServiceContext> {
        let hub = Arc::new(MessageBusHub::new());
        let proxies = ProxyManager::new(hub.clone(), CommsConfig::default());
        proxies.initialize_and_start().expect("proxies");
        std::mem::forget(proxies);
        ServiceContext::new(
            ServiceType::RecordsManager,
            Comms::new(hub, CommsConfig::default()),
            Arc::new(ServiceConfig::default()),
        )
        .expect("ctx")
    }

    fn manager() -> RecordsManager {
        let mut config = UserConfig::default();
        config.endpoint.model_name = "m".to_string();
        RecordsManager::new(Arc::new(config)).expect("manager")
    }

    fn metric_record(
        worker_id: &str,
        end_ns: u64,
        error: Option<ErrorDetails>,
    ) -> MetricRecordData {
        let mut metrics = HashMap::new();
        if error.is_none() {
            metrics.insert(
                tags::REQUEST_LATENCY.to_string(),
                MetricValue::Scalar(25.0),
            );
        }
        MetricRecordData {
            metadata: MetricRecordMetadata {
                worker_id: worker_id.to_string(),
                benchmark_phase: CreditPhase::Profiling,
                request_start_ns: 1,
                request_end_ns: end_ns,
                ..Default::default()
            },
            metrics,
            error,
        }
    }

    async fn set_phase_window(
        manager: &RecordsManager,
        expected_duration_sec: Option<f64>,
        final_request_count: Option<u64>,
        timeout_triggered: bool,
    ) {
        let mut status = manager.status.lock().await;
        status.start_time_ns = Some(0);
        status.expected_duration_sec = expected_duration_sec;
        status.final_request_count = final_request_count;
        status.timeout_triggered = timeout_triggered;
    }

    #[tokio::test]
    async fn test_request_count_completion_fires_once() {
        let ctx = test_ctx();
        let manager = manager();
        set_phase_window(&manager, None, Some(2), false).await;

        let mut sub = ctx
            .comms()
            .create_sub_client(CommAddress::EventBus)
            .expect("sub");

        manager
            .handle_metric_records(&ctx, metric_record("w1", 10, None))
            .await;
        manager
            .handle_metric_records(&ctx, metric_record("w1", 20, None))
            .await;
        // A straggler past the expected count must not re-fire completion.
        manager
            .handle_metric_records(&ctx, metric_record("w1", 30, None))
            .await;

        let mut all_records_received = 0;
        let mut process_results = 0;
        while let Ok(Some(msg)) =
            tokio::time::timeout(std::time::Duration::from_millis(200), sub.recv()).await
        {
            match msg {
                Message::AllRecordsReceived(_) => all_records_received += 1,
                Message::ProcessRecordsResult(_) => process_results += 1,
                _ => {}
            }
        }
        assert_eq!(all_records_received, 1, "AllRecordsReceived must latch");
        assert_eq!(process_results, 1, "ProcessRecordsResult must latch");
    }

    #[tokio::test]
    async fn test_duration_mode_never_completes_on_counts() {
        let ctx = test_ctx();
        let manager = manager();
        set_phase_window(&manager, Some(10.0), Some(2), false).await;

        for _ in 0..5 {
            manager
                .handle_metric_records(&ctx, metric_record("w1", 10, None))
                .await;
        }
        let status = manager.status.lock().await;
        assert!(!status.sent_all_records_received);
    }

    #[tokio::test]
    async fn test_grace_period_filter_excludes_late_records() {
        let ctx = test_ctx();
        let manager = manager();
        // 1 second benchmark, no grace.
        set_phase_window(&manager, Some(1.0), None, false).await;

        manager
            .handle_metric_records(
                &ctx,
                metric_record("w1", NANOS_PER_SECOND - 1, None),
            )
            .await;
        manager
            .handle_metric_records(
                &ctx,
                metric_record("w1", NANOS_PER_SECOND * 2, None),
            )
            .await;

        let status = manager.status.lock().await;
        assert_eq!(status.processing_stats.processed, 1);
        assert_eq!(status.processing_stats.errors, 0);
    }

    #[tokio::test]
    async fn test_error_records_feed_error_summary() {
        let ctx = test_ctx();
        let manager = manager();
        set_phase_window(&manager, None, None, false).await;

        let error = ErrorDetails::new("InvalidInferenceResultError", "no responses");
        manager
            .handle_metric_records(&ctx, metric_record("w1", 10, Some(error.clone())))
            .await;

        let status = manager.status.lock().await;
        assert_eq!(status.processing_stats.errors, 1);
        assert_eq!(status.processing_stats.processed, 0);
        drop(status);

        let worker_stats = manager.worker_stats.lock().await;
        assert_eq!(worker_stats["w1"].errors, 1);
        drop(worker_stats);

        let summary = manager.error_summary.lock().await;
        assert_eq!(summary[&error], 1);
    }

    #[tokio::test]
    async fn test_warmup_records_dropped() {
        let ctx = test_ctx();
        let manager = manager();
        set_phase_window(&manager, None, None, false).await;

        let mut record = metric_record("w1", 10, None);
        record.metadata.benchmark_phase = CreditPhase::Warmup;
        manager.handle_metric_records(&ctx, record).await;

        let status = manager.status.lock().await;
        assert_eq!(status.processing_stats.total_records(), 0);
    }

    #[tokio::test]
    async fn test_duration_completion_via_timeout() {
        let ctx = test_ctx();
        let manager = manager();
        set_phase_window(&manager, Some(1.0), Some(5), true).await;

        manager
            .handle_metric_records(&ctx, metric_record("w1", 10, None))
            .await;

        let status = manager.status.lock().await;
        assert!(status.sent_all_records_received);
    }

    #[tokio::test]
    async fn test_cancelled_results_flagged() {
        let ctx = test_ctx();
        let manager = manager();
        set_phase_window(&manager, None, None, false).await;
        let result = manager.process_results(&ctx, true).await;
        assert!(result.results.was_cancelled);
    }
}
