//! Service spawning and supervision.
//!
//! The `ServiceManager` trait is the seam between the controller and the
//! runtime hosting the services. The provided [`TaskServiceManager`] runs
//! every service as a supervised tokio task wired to the shared comms hub;
//! a subprocess or cluster manager would implement the same trait.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use aiperf_common::comms::Comms;
use aiperf_common::config::{ServiceConfig, UserConfig};
use aiperf_common::constants::DEFAULT_SERVICE_REGISTRATION_TIMEOUT;
use aiperf_common::enums::ServiceType;
use aiperf_common::service::{Service, ServiceContext, ServiceHarness};
use aiperf_common::{AIPerfError, AIPerfResult};
use aiperf_dataset::DatasetManager;
use aiperf_records::{RecordProcessor, RecordsManager};
use aiperf_telemetry::TelemetryManager;
use aiperf_timing::TimingManager;
use aiperf_workers::endpoints::EndpointRegistry;
use aiperf_workers::{InferenceClient, Worker, WorkerManager};

use crate::registry::ServiceRegistry;

const STOP_JOIN_TIMEOUT: Duration = Duration::from_secs(5);
const REGISTRATION_POLL: Duration = Duration::from_millis(100);

/// Spawns and stops services on some runtime.
#[async_trait]
pub trait ServiceManager: Send + Sync {
    /// Spawn every required service plus any optional ones.
    async fn start(&self) -> AIPerfResult<()>;

    /// Block until every required service type has registered. Fails after
    /// the registration timeout; interruptible through the context's stop
    /// signal.
    async fn wait_for_all_services_registration(
        &self,
        ctx: &Arc<ServiceContext>,
    ) -> AIPerfResult<()>;

    /// Spawn `count` instances of the given service type.
    async fn run_service(&self, service_type: ServiceType, count: usize) -> AIPerfResult<()>;

    /// Stop every instance of the given service type.
    async fn stop_service(&self, service_type: ServiceType);

    /// Stop everything, gracefully.
    async fn shutdown_all_services(&self);

    /// Hard-stop everything.
    async fn kill_all_services(&self);
}

struct ServiceHandle {
    service_type: ServiceType,
    ctx: Arc<ServiceContext>,
    join: JoinHandle<AIPerfResult<()>>,
}

/// Runs each service as a supervised tokio task on the shared hub.
pub struct TaskServiceManager {
    comms: Comms,
    user_config: Arc<UserConfig>,
    service_config: Arc<ServiceConfig>,
    required_services: HashMap<ServiceType, usize>,
    registry: Arc<ServiceRegistry>,
    handles: tokio::sync::Mutex<Vec<ServiceHandle>>,
    /// Test seam: inject a mock inference client into spawned workers.
    inference_client: Option<Arc<dyn InferenceClient>>,
}

impl TaskServiceManager {
    pub fn new(
        comms: Comms,
        user_config: Arc<UserConfig>,
        service_config: Arc<ServiceConfig>,
        required_services: HashMap<ServiceType, usize>,
        registry: Arc<ServiceRegistry>,
    ) -> Self {
        Self {
            comms,
            user_config,
            service_config,
            required_services,
            registry,
            handles: tokio::sync::Mutex::new(Vec::new()),
            inference_client: None,
        }
    }

    /// Replace the workers' inference client (used by integration tests).
    pub fn with_inference_client(mut self, client: Arc<dyn InferenceClient>) -> Self {
        self.inference_client = Some(client);
        self
    }

    pub fn required_services(&self) -> &HashMap<ServiceType, usize> {
        &self.required_services
    }

    /// Poll until every required service type has registered, or fail after
    /// the registration timeout. Interruptible through `stop`.
    async fn poll_registration(&self, ctx: &Arc<ServiceContext>) -> AIPerfResult<()> {
        let deadline = tokio::time::Instant::now() + DEFAULT_SERVICE_REGISTRATION_TIMEOUT;
        loop {
            let all_registered = self
                .required_services
                .iter()
                .all(|(service_type, count)| {
                    self.registry.registered_count(*service_type) >= *count
                });
            if all_registered {
                info!(services = self.registry.len(), "all required services registered");
                return Ok(());
            }
            if ctx.stop_requested() {
                return Err(AIPerfError::Service(
                    "stopped while waiting for service registration".to_string(),
                ));
            }
            if tokio::time::Instant::now() >= deadline {
                let missing: Vec<String> = self
                    .required_services
                    .iter()
                    .filter(|(service_type, count)| {
                        self.registry.registered_count(**service_type) < **count
                    })
                    .map(|(service_type, _)| service_type.to_string())
                    .collect();
                warn!(?missing, "services failed to register");
                return Err(AIPerfError::Timeout(DEFAULT_SERVICE_REGISTRATION_TIMEOUT));
            }
            tokio::time::sleep(REGISTRATION_POLL).await;
        }
    }

    fn build_service(
        &self,
        service_type: ServiceType,
    ) -> AIPerfResult<Arc<dyn Service>> {
        let service: Arc<dyn Service> = match service_type {
            ServiceType::DatasetManager => {
                Arc::new(DatasetManager::new(self.user_config.clone()))
            }
            ServiceType::TimingManager => Arc::new(TimingManager::new()),
            ServiceType::WorkerManager => Arc::new(WorkerManager::new(
                &self.user_config,
                &self.service_config,
            )),
            ServiceType::RecordsManager => {
                Arc::new(RecordsManager::new(self.user_config.clone())?)
            }
            ServiceType::RecordProcessor => {
                Arc::new(RecordProcessor::new(self.user_config.clone())?)
            }
            ServiceType::Worker => {
                let registry = EndpointRegistry::with_builtin_plugins();
                match &self.inference_client {
                    Some(client) => Arc::new(Worker::with_client(
                        self.user_config.clone(),
                        &registry,
                        client.clone(),
                    )?),
                    None => Arc::new(Worker::new(self.user_config.clone(), &registry)?),
                }
            }
            ServiceType::TelemetryManager => {
                Arc::new(TelemetryManager::new(self.user_config.clone())?)
            }
            ServiceType::SystemController => {
                return Err(AIPerfError::FactoryCreation(
                    "the system controller is not spawned through the service manager"
                        .to_string(),
                ));
            }
        };
        Ok(service)
    }

    async fn spawn_one(&self, service_type: ServiceType) -> AIPerfResult<()> {
        let service = self.build_service(service_type)?;
        let ctx = ServiceContext::new(
            service_type,
            self.comms.clone(),
            self.service_config.clone(),
        )?;
        debug!(service_id = %ctx.service_id, "spawning service task");
        let harness_ctx = ctx.clone();
        let join = tokio::spawn(run_service_task(service, harness_ctx));
        self.handles.lock().await.push(ServiceHandle {
            service_type,
            ctx,
            join,
        });
        Ok(())
    }

    async fn stop_handles(&self, handles: Vec<ServiceHandle>) {
        for handle in &handles {
            handle.ctx.request_stop();
        }
        for handle in handles {
            match tokio::time::timeout(STOP_JOIN_TIMEOUT, handle.join).await {
                Ok(Ok(Ok(()))) => {}
                Ok(Ok(Err(e))) => {
                    warn!(service_id = %handle.ctx.service_id, "service exited with error: {e}");
                }
                Ok(Err(join_error)) => {
                    warn!(service_id = %handle.ctx.service_id, "service task panicked: {join_error}");
                }
                Err(_) => {
                    warn!(service_id = %handle.ctx.service_id, "service did not stop in time");
                }
            }
            self.registry.remove(&handle.ctx.service_id);
        }
    }
}

async fn run_service_task(
    service: Arc<dyn Service>,
    ctx: Arc<ServiceContext>,
) -> AIPerfResult<()> {
    ServiceHarness::new(service, ctx).run().await
}

#[async_trait]
impl ServiceManager for TaskServiceManager {
    async fn start(&self) -> AIPerfResult<()> {
        let required = self.required_services.clone();
        for (service_type, count) in required {
            self.run_service(service_type, count).await?;
        }
        // Telemetry participates in configuration but is never required.
        self.run_service(ServiceType::TelemetryManager, 1).await?;
        Ok(())
    }

    async fn wait_for_all_services_registration(
        &self,
        ctx: &Arc<ServiceContext>,
    ) -> AIPerfResult<()> {
        self.poll_registration(ctx).await
    }

    async fn run_service(&self, service_type: ServiceType, count: usize) -> AIPerfResult<()> {
        for _ in 0..count {
            self.spawn_one(service_type).await?;
        }
        Ok(())
    }

    async fn stop_service(&self, service_type: ServiceType) {
        let to_stop = {
            let mut handles = self.handles.lock().await;
            let mut kept = Vec::new();
            let mut stopping = Vec::new();
            for handle in handles.drain(..) {
                if handle.service_type == service_type {
                    stopping.push(handle);
                } else {
                    kept.push(handle);
                }
            }
            *handles = kept;
            stopping
        };
        self.stop_handles(to_stop).await;
    }

    async fn shutdown_all_services(&self) {
        let handles = {
            let mut guard = self.handles.lock().await;
            std::mem::take(&mut *guard)
        };
        self.stop_handles(handles).await;
    }

    async fn kill_all_services(&self) {
        let handles = {
            let mut guard = self.handles.lock().await;
            std::mem::take(&mut *guard)
        };
        for handle in handles {
            handle.join.abort();
            self.registry.remove(&handle.ctx.service_id);
        }
    }
}
