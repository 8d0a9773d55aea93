//! Whole-system integration tests: controller, service manager, and every
//! child service running on one hub, with a mock inference client standing
//! in for the HTTP transport.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use aiperf_common::comms::{CommAddress, Comms, MessageBusHub, ProxyManager};
use aiperf_common::config::{EndpointConfig, ServiceConfig, UserConfig};
use aiperf_common::enums::ServiceType;
use aiperf_common::messages::Message;
use aiperf_common::models::{RequestRecord, ResponseData};
use aiperf_common::service::{ServiceContext, ServiceHarness};
use aiperf_common::{perf_ns, time_ns, AIPerfError, AIPerfResult};
use aiperf_controller::service_manager::ServiceManager;
use aiperf_controller::{ServiceRegistry, SystemController, TaskServiceManager};
use aiperf_workers::InferenceClient;

/// Mock inference client: N streamed chunks after a configurable delay.
struct MockInferenceClient {
    delay: Duration,
    chunks: usize,
    calls: AtomicU64,
    /// When set, every record carries this start_perf_ns (used to force
    /// structural invalidity).
    forced_start_perf_ns: AtomicI64,
}

impl MockInferenceClient {
    fn new(delay: Duration, chunks: usize) -> Arc<Self> {
        Arc::new(Self {
            delay,
            chunks,
            calls: AtomicU64::new(0),
            forced_start_perf_ns: AtomicI64::new(0),
        })
    }

    fn with_invalid_records(self: Arc<Self>) -> Arc<Self> {
        self.forced_start_perf_ns.store(-1, Ordering::SeqCst);
        self
    }

    fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl InferenceClient for MockInferenceClient {
    async fn send_request(
        &self,
        _config: &EndpointConfig,
        _path: &str,
        _payload: &serde_json::Value,
    ) -> AIPerfResult<RequestRecord> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut record = RequestRecord {
            timestamp_ns: time_ns(),
            start_perf_ns: perf_ns(),
            ..Default::default()
        };
        tokio::time::sleep(self.delay).await;
        for i in 0..self.chunks {
            record.responses.push(ResponseData {
                perf_ns: perf_ns(),
                raw: format!(r#"{{"choices":[{{"delta":{{"content":"tok{i}"}}}}]}}"#),
            });
        }
        record.end_perf_ns = perf_ns();
        record.status = Some(200);
        let forced = self.forced_start_perf_ns.load(Ordering::SeqCst);
        if forced != 0 {
            record.start_perf_ns = forced;
        }
        Ok(record)
    }
}

struct TestSystem {
    controller: Arc<SystemController>,
    ctx: Arc<ServiceContext>,
    proxies: ProxyManager,
    collector: tokio::task::JoinHandle<Vec<Message>>,
    _artifacts: tempfile::TempDir,
}

/// Stand up the full system with a mock inference client.
fn build_system(mut user_config: UserConfig, client: Arc<MockInferenceClient>) -> TestSystem {
    let artifacts = tempfile::tempdir().expect("tempdir");
    user_config.endpoint.model_name = "mock-llm".to_string();
    user_config.output.artifact_directory = artifacts.path().to_path_buf();
    user_config.input.session_count = 8;
    user_config.input.random_seed = Some(1);
    user_config.validate().expect("valid test config");

    let user_config = Arc::new(user_config);
    let service_config = Arc::new(ServiceConfig::default());

    let hub = Arc::new(MessageBusHub::new());
    let proxies = ProxyManager::new(hub.clone(), service_config.comms.clone());
    proxies.initialize_and_start().expect("proxies");
    let comms = Comms::new(hub, service_config.comms.clone());

    let required = HashMap::from([
        (ServiceType::DatasetManager, 1),
        (ServiceType::TimingManager, 1),
        (ServiceType::WorkerManager, 1),
        (ServiceType::RecordsManager, 1),
    ]);
    let registry = Arc::new(ServiceRegistry::new());
    let service_manager = Arc::new(
        TaskServiceManager::new(
            comms.clone(),
            user_config.clone(),
            service_config.clone(),
            required,
            registry.clone(),
        )
        .with_inference_client(client),
    );
    let controller = Arc::new(SystemController::new(
        user_config,
        service_config.clone(),
        registry,
        service_manager,
    ));
    let ctx = ServiceContext::new(ServiceType::SystemController, comms.clone(), service_config)
        .expect("controller ctx");

    // Capture every event-bus message for later assertions.
    let mut sub = comms
        .create_sub_client(CommAddress::EventBus)
        .expect("event sub");
    let collector = tokio::spawn(async move {
        let mut seen = Vec::new();
        loop {
            match tokio::time::timeout(Duration::from_secs(2), sub.recv()).await {
                Ok(Some(msg)) => seen.push(msg),
                _ => break,
            }
        }
        seen
    });

    TestSystem {
        controller,
        ctx,
        proxies,
        collector,
        _artifacts: artifacts,
    }
}

async fn run_system(system: &TestSystem) -> AIPerfResult<()> {
    let harness = ServiceHarness::new(system.controller.clone(), system.ctx.clone());
    tokio::time::timeout(Duration::from_secs(60), harness.run())
        .await
        .unwrap_or(Err(AIPerfError::Timeout(Duration::from_secs(60))))
}

/// Request-count happy path: four credits flow through the whole system and
/// the controller collects a complete, uncancelled result.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_request_count_happy_path() {
    let client = MockInferenceClient::new(Duration::from_millis(10), 2);
    let mut user_config = UserConfig::default();
    user_config.loadgen.concurrency = Some(2);
    user_config.loadgen.request_count = Some(4);

    let system = build_system(user_config, client.clone());
    run_system(&system).await.expect("system run");
    system.proxies.stop();

    assert!(system.controller.exit_errors().await.is_empty());
    assert_eq!(client.calls(), 4);

    let messages = system.collector.await.expect("collector");
    let all_records_received: Vec<_> = messages
        .iter()
        .filter(|m| matches!(m, Message::AllRecordsReceived(_)))
        .collect();
    assert_eq!(all_records_received.len(), 1);

    let results: Vec<_> = messages
        .iter()
        .filter_map(|m| match m {
            Message::ProcessRecordsResult(result) => Some(result),
            _ => None,
        })
        .collect();
    assert_eq!(results.len(), 1);
    let profile = &results[0].results.results;
    assert!(!profile.was_cancelled);
    assert_eq!(profile.completed, 4);
    assert!(profile.error_summary.is_empty());
    assert!(profile.get("request_latency").is_some());
}

/// Structurally invalid records are downgraded to errors and summarized,
/// never dropped.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_invalid_records_counted_as_errors() {
    let client = MockInferenceClient::new(Duration::from_millis(5), 1).with_invalid_records();
    let mut user_config = UserConfig::default();
    user_config.loadgen.concurrency = Some(1);
    user_config.loadgen.request_count = Some(2);

    let system = build_system(user_config, client);
    run_system(&system).await.expect("system run");
    system.proxies.stop();

    let messages = system.collector.await.expect("collector");
    let result = messages
        .iter()
        .find_map(|m| match m {
            Message::ProcessRecordsResult(result) => Some(result),
            _ => None,
        })
        .expect("process records result");

    let profile = &result.results.results;
    assert_eq!(profile.completed, 0);
    let invalid = profile
        .error_summary
        .iter()
        .find(|entry| entry.error_details.error_type == "InvalidInferenceResultError")
        .expect("invalid inference result error in summary");
    assert_eq!(invalid.count, 2);
    // Processing errors are not system exit errors.
    assert!(system.controller.exit_errors().await.is_empty());
}

/// Cancelling mid-run drains and finalizes with `was_cancelled = true`.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_profile_cancel_mid_run() {
    let client = MockInferenceClient::new(Duration::from_millis(25), 1);
    let mut user_config = UserConfig::default();
    user_config.loadgen.concurrency = Some(1);
    user_config.loadgen.request_count = Some(100_000);

    let system = build_system(user_config, client);

    let cancel_controller = system.controller.clone();
    let cancel_ctx = system.ctx.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(400)).await;
        cancel_controller.cancel_profiling(&cancel_ctx).await;
    });

    run_system(&system).await.expect("system run");
    system.proxies.stop();

    assert!(system.controller.was_cancelled().await);
    assert!(system.controller.exit_errors().await.is_empty());

    let messages = system.collector.await.expect("collector");
    let result = messages
        .iter()
        .find_map(|m| match m {
            Message::ProcessRecordsResult(result) => Some(result),
            _ => None,
        })
        .expect("process records result");
    assert!(result.results.results.was_cancelled);
}

/// Duration benchmarks finish on the timing manager's timeout, not on
/// record counts.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_duration_timeout_path() {
    let client = MockInferenceClient::new(Duration::from_millis(20), 1);
    let mut user_config = UserConfig::default();
    user_config.loadgen.concurrency = Some(2);
    user_config.loadgen.request_count = None;
    user_config.loadgen.benchmark_duration_sec = Some(0.5);

    let system = build_system(user_config, client);
    run_system(&system).await.expect("system run");
    system.proxies.stop();

    assert!(system.controller.exit_errors().await.is_empty());
    let messages = system.collector.await.expect("collector");

    let phase_complete = messages
        .iter()
        .find_map(|m| match m {
            Message::CreditPhaseComplete(complete) => Some(complete),
            _ => None,
        })
        .expect("credit phase complete");
    assert!(phase_complete.timeout_triggered);

    assert!(messages
        .iter()
        .any(|m| matches!(m, Message::ProcessRecordsResult(_))));
}

/// A service that never registers fails the run before CONFIGURE with a
/// RegisterServices exit error.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_registration_failure_aborts_run() {
    struct NeverRegisteringManager;

    #[async_trait]
    impl ServiceManager for NeverRegisteringManager {
        async fn start(&self) -> AIPerfResult<()> {
            Ok(())
        }

        async fn wait_for_all_services_registration(
            &self,
            _ctx: &Arc<ServiceContext>,
        ) -> AIPerfResult<()> {
            Err(AIPerfError::Timeout(Duration::from_millis(10)))
        }

        async fn run_service(
            &self,
            _service_type: ServiceType,
            _count: usize,
        ) -> AIPerfResult<()> {
            Ok(())
        }

        async fn stop_service(&self, _service_type: ServiceType) {}

        async fn shutdown_all_services(&self) {}

        async fn kill_all_services(&self) {}
    }

    let artifacts = tempfile::tempdir().expect("tempdir");
    let mut user_config = UserConfig::default();
    user_config.endpoint.model_name = "mock-llm".to_string();
    user_config.output.artifact_directory = artifacts.path().to_path_buf();
    let user_config = Arc::new(user_config);
    let service_config = Arc::new(ServiceConfig::default());

    let hub = Arc::new(MessageBusHub::new());
    let proxies = ProxyManager::new(hub.clone(), service_config.comms.clone());
    proxies.initialize_and_start().expect("proxies");
    let comms = Comms::new(hub, service_config.comms.clone());

    let controller = Arc::new(SystemController::new(
        user_config,
        service_config.clone(),
        Arc::new(ServiceRegistry::new()),
        Arc::new(NeverRegisteringManager),
    ));
    let ctx = ServiceContext::new(ServiceType::SystemController, comms, service_config)
        .expect("ctx");

    tokio::time::timeout(
        Duration::from_secs(10),
        ServiceHarness::new(controller.clone(), ctx).run(),
    )
    .await
    .expect("run should finish quickly")
    .expect("controller run");
    proxies.stop();

    let exit_errors = controller.exit_errors().await;
    assert_eq!(exit_errors.len(), 1);
    assert_eq!(exit_errors[0].operation, "Register Services");
    assert_eq!(exit_errors[0].error_details.error_type, "TimeoutError");
}
