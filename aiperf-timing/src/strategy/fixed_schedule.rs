//! Fixed-schedule credit issuing.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use aiperf_common::constants::NANOS_PER_MILLIS;
use aiperf_common::enums::CreditPhase;
use aiperf_common::models::TimingEntry;
use aiperf_common::{time_ns, AIPerfResult};

use crate::phase::PhaseOrchestrator;
use crate::strategy::CreditIssuingStrategy;

/// Replays a static timing table: each credit drops at its scheduled offset
/// from phase start. No flow control and no warmup.
pub struct FixedScheduleStrategy {
    phases: Arc<PhaseOrchestrator>,
    /// Sorted by `delay_ms`.
    schedule: Vec<TimingEntry>,
}

impl FixedScheduleStrategy {
    pub fn new(phases: Arc<PhaseOrchestrator>, schedule: Vec<TimingEntry>) -> Self {
        Self { phases, schedule }
    }
}

#[async_trait]
impl CreditIssuingStrategy for FixedScheduleStrategy {
    async fn run(&self) -> AIPerfResult<()> {
        self.phases.begin(
            CreditPhase::Profiling,
            Some(self.schedule.len() as u64),
            None,
        );
        let start = tokio::time::Instant::now();
        let start_wall_ns = time_ns();
        let mut cancel_rx = self.phases.subscribe_cancel();

        for entry in &self.schedule {
            let drop_at = start + Duration::from_millis(entry.delay_ms);
            tokio::select! {
                _ = tokio::time::sleep_until(drop_at) => {}
                _ = cancel_rx.changed() => return Ok(()),
            }
            if self.phases.is_cancelled() {
                return Ok(());
            }
            let scheduled_wall_ns = start_wall_ns + entry.delay_ms * NANOS_PER_MILLIS;
            self.phases
                .drop_credit(Some(entry.conversation_id.clone()), Some(scheduled_wall_ns))
                .await?;
        }
        self.phases.finish_sending();
        self.phases.wait_done().await;
        Ok(())
    }
}
