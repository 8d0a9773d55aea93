//! Open-loop request-rate credit issuing.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use aiperf_common::enums::{CreditPhase, RateDistribution};
use aiperf_common::{time_ns, AIPerfResult};

use crate::config::TimingManagerConfig;
use crate::phase::PhaseOrchestrator;
use crate::strategy::{run_serial_warmup, CreditIssuingStrategy};

/// Drops credits at a configured rate, deliberately blind to worker load:
/// the point is to measure the server under open-loop offered load.
pub struct RequestRateStrategy {
    config: TimingManagerConfig,
    phases: Arc<PhaseOrchestrator>,
    rng: Mutex<StdRng>,
}

impl RequestRateStrategy {
    pub fn new(config: TimingManagerConfig, phases: Arc<PhaseOrchestrator>) -> Self {
        Self {
            config,
            phases,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Next inter-arrival gap for the configured distribution.
    fn next_interval(&self) -> Duration {
        let rate = self.config.request_rate.max(f64::MIN_POSITIVE);
        let seconds = match self.config.rate_distribution {
            RateDistribution::Constant => 1.0 / rate,
            RateDistribution::Poisson => {
                // Exponential inter-arrivals give a Poisson process.
                let u: f64 = self.rng.lock().gen_range(f64::EPSILON..1.0);
                -u.ln() / rate
            }
        };
        Duration::from_secs_f64(seconds)
    }

    async fn run_count_based(&self, total: u64) -> AIPerfResult<()> {
        self.phases.begin(CreditPhase::Profiling, Some(total), None);
        let mut cancel_rx = self.phases.subscribe_cancel();
        for _ in 0..total {
            tokio::select! {
                _ = tokio::time::sleep(self.next_interval()) => {}
                _ = cancel_rx.changed() => return Ok(()),
            }
            if self.phases.is_cancelled() {
                return Ok(());
            }
            self.phases.drop_credit(None, Some(time_ns())).await?;
        }
        self.phases.finish_sending();
        self.phases.wait_done().await;
        Ok(())
    }

    async fn run_duration_based(&self, duration_sec: f64) -> AIPerfResult<()> {
        self.phases
            .begin(CreditPhase::Profiling, None, Some(duration_sec));
        let deadline = tokio::time::Instant::now() + Duration::from_secs_f64(duration_sec);
        let mut cancel_rx = self.phases.subscribe_cancel();
        loop {
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => {
                    debug!("benchmark duration reached, completing phase");
                    self.phases.timeout_complete();
                    return Ok(());
                }
                _ = tokio::time::sleep(self.next_interval()) => {}
                _ = cancel_rx.changed() => return Ok(()),
            }
            if self.phases.is_cancelled() {
                return Ok(());
            }
            self.phases.drop_credit(None, Some(time_ns())).await?;
        }
    }
}

#[async_trait]
impl CreditIssuingStrategy for RequestRateStrategy {
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
