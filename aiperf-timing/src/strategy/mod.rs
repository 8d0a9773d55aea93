//! Credit issuing strategies.

mod concurrency;
mod fixed_schedule;
mod request_rate;

pub use concurrency::ConcurrencyStrategy;
pub use fixed_schedule::FixedScheduleStrategy;
pub use request_rate::RequestRateStrategy;

use std::sync::Arc;

use async_trait::async_trait;

use aiperf_common::enums::{CreditPhase, TimingMode};
use aiperf_common::models::TimingEntry;
use aiperf_common::{AIPerfError, AIPerfResult};

use crate::config::TimingManagerConfig;
use crate::phase::PhaseOrchestrator;

/// One load-generation strategy: drives the warmup and profiling phases to
/// completion through the shared orchestrator.
#[async_trait]
pub trait CreditIssuingStrategy: Send + Sync {
    /// Run all phases. Returns once the final phase completes or the run is
    /// cancelled.
    async fn run(&self) -> AIPerfResult<()>;
}

/// Build the strategy for the configured timing mode.
pub fn create_strategy(
    config: &TimingManagerConfig,
    phases: Arc<PhaseOrchestrator>,
    schedule: Option<Vec<TimingEntry>>,
) -> AIPerfResult<Arc<dyn CreditIssuingStrategy>> {
    match config.timing_mode {
        TimingMode::FixedSchedule => {
            let schedule = schedule.ok_or_else(|| {
                AIPerfError::InvalidState(
                    "fixed schedule mode requires a timing schedule".to_string(),
                )
            })?;
            Ok(Arc::new(FixedScheduleStrategy::new(phases, schedule)))
        }
        TimingMode::Concurrency => Ok(Arc::new(ConcurrencyStrategy::new(
            config.clone(),
            phases,
        ))),
        TimingMode::RequestRate => Ok(Arc::new(RequestRateStrategy::new(
            config.clone(),
            phases,
        ))),
    }
}

/// Issue `count` credits one at a time, each gated on the previous return.
/// Shared warmup behavior for the flow-controlled strategies.
pub(crate) async fn run_serial_warmup(
    phases: &PhaseOrchestrator,
    count: u64,
) -> AIPerfResult<()> {
    if count == 0 {
        return Ok(());
    }
    phases.begin(CreditPhase::Warmup, Some(count), None);
    let mut completed_rx = phases.subscribe_completed();
    let mut cancel_rx = phases.subscribe_cancel();
    for issued in 0..count {
        if phases.is_cancelled() {
            return Ok(());
        }
        phases.drop_credit(None, None).await?;
        loop {
            if *completed_rx.borrow_and_update() > issued {
                break;
            }
            tokio::select! {
                changed = completed_rx.changed() => {
                    if changed.is_err() {
                        return Ok(());
                    }
                }
                _ = cancel_rx.changed() => return Ok(()),
            }
        }
    }
    phases.finish_sending();
    phases.wait_done().await;
    Ok(())
}
