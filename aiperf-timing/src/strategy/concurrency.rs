//! Concurrency-limited credit issuing.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use aiperf_common::enums::CreditPhase;
use aiperf_common::AIPerfResult;

use crate::config::TimingManagerConfig;
use crate::phase::PhaseOrchestrator;
use crate::strategy::{run_serial_warmup, CreditIssuingStrategy};

/// Keeps N credits in flight: every return funds the next drop.
pub struct ConcurrencyStrategy {
    config: TimingManagerConfig,
    phases: Arc<PhaseOrchestrator>,
}

impl ConcurrencyStrategy {
    pub fn new(config: TimingManagerConfig, phases: Arc<PhaseOrchestrator>) -> Self {
        Self { config, phases }
    }

    /// Top up the in-flight window, bounded by an optional remaining budget.
    async fn top_up(&self, budget: Option<u64>) -> AIPerfResult<u64> {
        let snapshot = match self.phases.snapshot() {
            Some(snapshot) => snapshot,
            None => return Ok(0),
        };
        let in_flight = snapshot.sent.saturating_sub(snapshot.completed);
        let mut to_drop = (self.config.concurrency as u64).saturating_sub(in_flight);
        if let Some(budget) = budget {
            to_drop = to_drop.min(budget.saturating_sub(snapshot.sent));
        }
        for _ in 0..to_drop {
            if self.phases.is_cancelled() {
                break;
            }
            self.phases.drop_credit(None, None).await?;
        }
        Ok(to_drop)
    }

    async fn run_count_based(&self, total: u64) -> AIPerfResult<()> {
        self.phases.begin(CreditPhase::Profiling, Some(total), None);
        let mut completed_rx = self.phases.subscribe_completed();
        let mut cancel_rx = self.phases.subscribe_cancel();

        self.top_up(Some(total)).await?;
        loop {
            if self.phases.is_cancelled() {
                return Ok(());
            }
            let snapshot = match self.phases.snapshot() {
                Some(snapshot) => snapshot,
                None => break,
            };
            if snapshot.sent >= total {
                break;
            }
            tokio::select! {
                changed = completed_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    self.top_up(Some(total)).await?;
                }
                _ = cancel_rx.changed() => return Ok(()),
            }
        }
        self.phases.finish_sending();
        self.phases.wait_done().await;
        Ok(())
    }

    async fn run_duration_based(&self, duration_sec: f64) -> AIPerfResult<()> {
        self.phases
            .begin(CreditPhase::Profiling, None, Some(duration_sec));
        let deadline = tokio::time::Instant::now() + Duration::from_secs_f64(duration_sec);
        let mut completed_rx = self.phases.subscribe_completed();
        let mut cancel_rx = self.phases.subscribe_cancel();

        self.top_up(None).await?;
        loop {
            if self.phases.is_cancelled() {
                return Ok(());
            }
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => {
                    debug!("benchmark duration reached, completing phase");
                    self.phases.timeout_complete();
                    break;
                }
                changed = completed_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    self.top_up(None).await?;
                }
                _ = cancel_rx.changed() => break,
            }
        }
        Ok(())
    }
}

#[async_trait]
impl CreditIssuingStrategy for ConcurrencyStrategy {
    async fn run(&self) -> AIPerfResult<()> {
        run_serial_warmup(&self.phases, self.config.warmup_request_count).await?;
        if self.phases.is_cancelled() {
            return Ok(());
        }
        match (self.config.expected_duration_sec, self.config.request_count) {
            (Some(duration), _) => self.run_duration_based(duration).await,
            (None, Some(total)) => self.run_count_based(total).await,
            (None, None) => Ok(()),
        }
    }
}
