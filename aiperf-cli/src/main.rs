//! The `aiperf` binary: parse arguments, bring up logging and the comms
//! fabric, run the system controller, and exit with its verdict.

mod args;
mod logging;

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};

use aiperf_common::comms::{Comms, MessageBusHub, ProxyManager};
use aiperf_common::enums::ServiceType;
use aiperf_common::service::{ServiceContext, ServiceHarness};
use aiperf_controller::{ServiceRegistry, SystemController, TaskServiceManager};

use crate::args::Args;

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let log_level = args.log_level.clone();
    let (user_config, service_config) = args.into_configs();
    user_config
        .validate()
        .context("invalid benchmark configuration")?;

    let _log_guard = logging::init_logging(&user_config, &log_level)?;

    let runtime = tokio::runtime::Runtime::new().context("starting async runtime")?;
    let exit_code = runtime.block_on(run(user_config, service_config))?;
    // Drop the runtime before exiting so service tasks are torn down.
    drop(runtime);
    std::process::exit(exit_code);
}

async fn run(
    user_config: aiperf_common::config::UserConfig,
    service_config: aiperf_common::config::ServiceConfig,
) -> anyhow::Result<i32> {
    let user_config = Arc::new(user_config);
    let service_config = Arc::new(service_config);

    // Proxies come up before any service binds or connects, and go down
    // last.
    let hub = Arc::new(MessageBusHub::new());
    let proxies = ProxyManager::new(hub.clone(), service_config.comms.clone());
    proxies
        .initialize_and_start()
        .context("starting comms proxies")?;
    let comms = Comms::new(hub, service_config.comms.clone());

    let mut required_services: HashMap<ServiceType, usize> = HashMap::from([
        (ServiceType::DatasetManager, 1),
        (ServiceType::TimingManager, 1),
        (ServiceType::WorkerManager, 1),
        (ServiceType::RecordsManager, 1),
    ]);
    if let Some(count) = service_config.record_processor_count {
        required_services.insert(ServiceType::RecordProcessor, count);
    }

    let registry = Arc::new(ServiceRegistry::new());
    let service_manager = Arc::new(TaskServiceManager::new(
        comms.clone(),
        user_config.clone(),
        service_config.clone(),
        required_services,
        registry.clone(),
    ));
    let controller = Arc::new(SystemController::new(
        user_config.clone(),
        service_config.clone(),
        registry,
        service_manager,
    ));
    let ctx = ServiceContext::new(ServiceType::SystemController, comms, service_config.clone())
        .context("creating controller context")?;

    spawn_signal_handler(controller.clone(), ctx.clone());

    info!("starting AIPerf system controller");
    let run_result = ServiceHarness::new(controller.clone(), ctx).run().await;
    proxies.stop();

    if let Err(e) = run_result {
        warn!("system controller exited with error: {e}");
        return Ok(1);
    }
    let exit_errors = controller.exit_errors().await;
    Ok(if exit_errors.is_empty() { 0 } else { 1 })
}

/// First SIGINT/SIGTERM cancels profiling gracefully; a second one kills the
/// process.
fn spawn_signal_handler(controller: Arc<SystemController>, ctx: Arc<ServiceContext>) {
    tokio::spawn(async move {
        let mut signals_seen = 0u32;
        loop {
            wait_for_shutdown_signal().await;
            signals_seen += 1;
            if signals_seen == 1 {
                warn!("shutdown signal received, cancelling profiling");
                let controller = controller.clone();
                let ctx = ctx.clone();
                tokio::spawn(async move {
                    controller.cancel_profiling(&ctx).await;
                });
            } else {
                warn!("second shutdown signal received, killing");
                std::process::exit(1);
            }
        }
    });
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(_) => {
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
