//! Timing manager configuration derived from the user config.

use aiperf_common::config::UserConfig;
use aiperf_common::constants::NANOS_PER_SECOND;
use aiperf_common::enums::{RateDistribution, TimingMode};
use aiperf_common::{AIPerfError, AIPerfResult};

/// Resolved load-generation settings.
#[derive(Debug, Clone)]
pub struct TimingManagerConfig {
    pub timing_mode: TimingMode,
    /// Credits kept in flight (concurrency mode).
    pub concurrency: usize,
    /// Offered requests per second (request-rate mode).
    pub request_rate: f64,
    pub rate_distribution: RateDistribution,
    /// Profiling credits to issue (request-count benchmarks).
    pub request_count: Option<u64>,
    /// Profiling duration (duration benchmarks).
    pub expected_duration_sec: Option<f64>,
    /// Warmup credits issued (and discarded) before profiling.
    pub warmup_request_count: u64,
    /// Per-request cancellation budget in nanoseconds.
    pub request_cancellation_ns: Option<u64>,
}

impl TimingManagerConfig {
    pub fn from_user_config(config: &UserConfig) -> AIPerfResult<Self> {
        let loadgen = &config.loadgen;
        let timing_mode = if loadgen.fixed_schedule {
            TimingMode::FixedSchedule
        } else if loadgen.request_rate.is_some() {
            TimingMode::RequestRate
        } else {
            TimingMode::Concurrency
        };

        if timing_mode != TimingMode::FixedSchedule
            && loadgen.request_count.is_none()
            && loadgen.benchmark_duration_sec.is_none()
        {
            return Err(AIPerfError::Configuration(
                "either request_count or benchmark_duration_sec must be set".to_string(),
            ));
        }

        Ok(Self {
            timing_mode,
            concurrency: loadgen.concurrency.unwrap_or(1),
            request_rate: loadgen.request_rate.unwrap_or(1.0),
            rate_distribution: loadgen.request_rate_distribution,
            request_count: loadgen.request_count,
            expected_duration_sec: loadgen.benchmark_duration_sec,
            warmup_request_count: loadgen.warmup_request_count,
            request_cancellation_ns: loadgen
                .request_cancellation_sec
                .map(|secs| (secs * NANOS_PER_SECOND as f64) as u64),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_selection() {
        let mut config = UserConfig::default();
        config.loadgen.concurrency = Some(4);
        let timing = TimingManagerConfig::from_user_config(&config).expect("config");
        assert_eq!(timing.timing_mode, TimingMode::Concurrency);
        assert_eq!(timing.concurrency, 4);

        config.loadgen.request_rate = Some(10.0);
        let timing = TimingManagerConfig::from_user_config(&config).expect("config");
        assert_eq!(timing.timing_mode, TimingMode::RequestRate);

        config.loadgen.fixed_schedule = true;
        let timing = TimingManagerConfig::from_user_config(&config).expect("config");
        assert_eq!(timing.timing_mode, TimingMode::FixedSchedule);
    }

    #[test]
    fn test_missing_completion_trigger_rejected() {
        let mut config = UserConfig::default();
        config.loadgen.request_count = None;
        config.loadgen.benchmark_duration_sec = None;
        assert!(TimingManagerConfig::from_user_config(&config).is_err());
    }

    #[test]
    fn test_cancellation_budget_converted_to_ns() {
        let mut config = UserConfig::default();
        config.loadgen.request_cancellation_sec = Some(1.5);
        let timing = TimingManagerConfig::from_user_config(&config).expect("config");
        assert_eq!(timing.request_cancellation_ns, Some(1_500_000_000));
    }
}
