//! Configuration models for the AIPerf system.
//!
//! `UserConfig` captures what to benchmark and how hard to push it.
//! `ServiceConfig` captures how the system itself runs (timings, scaling,
//! comms endpoints). Both are serde models so they can be carried inside
//! the ProfileConfigure command.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_HEARTBEAT_INTERVAL;
use crate::enums::{EndpointType, GpuTelemetryMode, RateDistribution};
use crate::error::{AIPerfError, AIPerfResult};

/// Inference endpoint settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Base URL of the inference server, e.g. `http://localhost:8000`.
    pub url: String,
    /// Wire format family of the endpoint.
    pub endpoint_type: EndpointType,
    /// Model name sent in request payloads.
    pub model_name: String,
    /// Whether to request streamed (SSE) responses.
    pub streaming: bool,
    /// Optional per-request max_tokens override.
    pub max_tokens: Option<u32>,
    /// Optional custom path overriding the endpoint-type default.
    pub custom_path: Option<String>,
    /// Request timeout for a single inference call.
    #[serde(default = "default_request_timeout")]
    pub request_timeout: Duration,
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(600)
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8000".to_string(),
            endpoint_type: EndpointType::Chat,
            model_name: String::new(),
            streaming: true,
            max_tokens: None,
            custom_path: None,
            request_timeout: default_request_timeout(),
        }
    }
}

/// Load generation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadGenConfig {
    /// Number of credits to keep in flight (concurrency mode).
    pub concurrency: Option<usize>,
    /// Requests per second (request-rate mode).
    pub request_rate: Option<f64>,
    /// Inter-arrival distribution for request-rate mode.
    #[serde(default = "default_rate_distribution")]
    pub request_rate_distribution: RateDistribution,
    /// Replay a fixed schedule served by the dataset manager.
    #[serde(default)]
    pub fixed_schedule: bool,
    /// Total number of profiling requests (request-count benchmarks).
    pub request_count: Option<u64>,
    /// Benchmark duration in seconds (duration benchmarks).
    pub benchmark_duration_sec: Option<f64>,
    /// Extra seconds past the duration during which in-flight responses
    /// still count.
    #[serde(default)]
    pub benchmark_grace_period_sec: f64,
    /// Number of warmup requests issued (and discarded) before profiling.
    #[serde(default)]
    pub warmup_request_count: u64,
    /// Cancel any single request that exceeds this many seconds.
    pub request_cancellation_sec: Option<f64>,
}

fn default_rate_distribution() -> RateDistribution {
    RateDistribution::Poisson
}

impl Default for LoadGenConfig {
    fn default() -> Self {
        Self {
            concurrency: None,
            request_rate: None,
            request_rate_distribution: default_rate_distribution(),
            fixed_schedule: false,
            request_count: Some(10),
            benchmark_duration_sec: None,
            benchmark_grace_period_sec: 0.0,
            warmup_request_count: 0,
            request_cancellation_sec: None,
        }
    }
}

/// Conversation corpus settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputConfig {
    /// Path to a conversation corpus file. When unset, a synthetic corpus
    /// is composed.
    pub file: Option<PathBuf>,
    /// Number of synthetic sessions to compose.
    #[serde(default = "default_session_count")]
    pub session_count: usize,
    /// Turns per synthetic session.
    #[serde(default = "default_turns_per_session")]
    pub turns_per_session: usize,
    /// Mean synthetic prompt length in words.
    #[serde(default = "default_prompt_mean")]
    pub prompt_mean_word_count: usize,
    /// Standard deviation of the synthetic prompt length in words.
    #[serde(default)]
    pub prompt_stddev_word_count: usize,
    /// Fixed delay between scheduled drops in fixed-schedule mode.
    #[serde(default = "default_schedule_delay")]
    pub schedule_delay_ms: u64,
    /// Seed for the synthetic composer.
    pub random_seed: Option<u64>,
}

fn default_session_count() -> usize {
    100
}

fn default_turns_per_session() -> usize {
    1
}

fn default_prompt_mean() -> usize {
    128
}

fn default_schedule_delay() -> u64 {
    100
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            file: None,
            session_count: default_session_count(),
            turns_per_session: default_turns_per_session(),
            prompt_mean_word_count: default_prompt_mean(),
            prompt_stddev_word_count: 0,
            schedule_delay_ms: default_schedule_delay(),
            random_seed: None,
        }
    }
}

/// Output artifact settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Directory receiving logs, inputs.json, and exported results.
    pub artifact_directory: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            artifact_directory: PathBuf::from("artifacts"),
        }
    }
}

/// GPU telemetry settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TelemetryConfig {
    /// Telemetry collection mode.
    #[serde(default = "default_telemetry_mode")]
    pub mode: GpuTelemetryMode,
    /// Metrics endpoints to scrape.
    #[serde(default)]
    pub endpoints: Vec<String>,
}

fn default_telemetry_mode() -> GpuTelemetryMode {
    GpuTelemetryMode::Disabled
}

/// Everything the user asked for: endpoint, load shape, corpus, outputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct UserConfig {
    pub endpoint: EndpointConfig,
    pub loadgen: LoadGenConfig,
    pub input: InputConfig,
    pub output: OutputConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    /// The CLI command line that produced this config, echoed in the
    /// post-benchmark summary.
    #[serde(default)]
    pub cli_command: String,
}

impl UserConfig {
    /// Validate cross-field constraints. Fatal at start when violated.
    pub fn validate(&self) -> AIPerfResult<()> {
        if self.endpoint.model_name.is_empty() {
            return Err(AIPerfError::Configuration(
                "endpoint.model_name must be set".to_string(),
            ));
        }
        if self.loadgen.request_count.is_none()
            && self.loadgen.benchmark_duration_sec.is_none()
            && !self.loadgen.fixed_schedule
        {
            return Err(AIPerfError::Configuration(
                "one of request_count, benchmark_duration_sec, or fixed_schedule is required"
                    .to_string(),
            ));
        }
        if let Some(rate) = self.loadgen.request_rate {
            if rate <= 0.0 {
                return Err(AIPerfError::Configuration(format!(
                    "request_rate must be positive, got {rate}"
                )));
            }
        }
        if let Some(concurrency) = self.loadgen.concurrency {
            if concurrency == 0 {
                return Err(AIPerfError::Configuration(
                    "concurrency must be at least 1".to_string(),
                ));
            }
        }
        if let Some(duration) = self.loadgen.benchmark_duration_sec {
            if duration <= 0.0 {
                return Err(AIPerfError::Configuration(format!(
                    "benchmark_duration_sec must be positive, got {duration}"
                )));
            }
        }
        Ok(())
    }

    /// The log file path under the artifact directory.
    pub fn log_file_path(&self) -> PathBuf {
        self.output
            .artifact_directory
            .join(crate::constants::LOG_FOLDER)
            .join(crate::constants::LOG_FILE)
    }
}

/// Worker pool sizing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct WorkersConfig {
    /// Minimum number of workers to spawn.
    pub min: Option<usize>,
    /// Maximum number of workers; auto-computed from CPU count when unset.
    pub max: Option<usize>,
}

/// How the system itself runs: intervals, scaling, comms endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Heartbeat publication interval for component services.
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval: Duration,
    /// Pinned record processor count; `None` scales with workers.
    pub record_processor_count: Option<usize>,
    /// Worker pool sizing.
    #[serde(default)]
    pub workers: WorkersConfig,
    /// Comms endpoint table.
    #[serde(default)]
    pub comms: CommsConfig,
}

fn default_heartbeat_interval() -> Duration {
    DEFAULT_HEARTBEAT_INTERVAL
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: default_heartbeat_interval(),
            record_processor_count: None,
            workers: WorkersConfig::default(),
            comms: CommsConfig::default(),
        }
    }
}

/// Host/port table mapping each logical comm address onto an endpoint.
///
/// The in-process hub transport routes purely by logical address; the table
/// is retained so a socket transport can implement the same client traits
/// without config changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommsConfig {
    pub host: String,
    pub event_bus_pub_port: u16,
    pub event_bus_sub_port: u16,
    pub inference_push_pull_port: u16,
    pub req_rep_port: u16,
    pub records_port: u16,
    pub conversation_data_port: u16,
    pub credit_drop_port: u16,
    pub credit_return_port: u16,
}

impl Default for CommsConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            event_bus_pub_port: 5555,
            event_bus_sub_port: 5556,
            inference_push_pull_port: 5557,
            req_rep_port: 5558,
            records_port: 5560,
            conversation_data_port: 5561,
            credit_drop_port: 5562,
            credit_return_port: 5563,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_validates() {
        let mut config = UserConfig::default();
        config.endpoint.model_name = "test-model".to_string();
        config.validate().expect("default config should validate");
    }

    #[test]
    fn test_missing_model_name_rejected() {
        let config = UserConfig::default();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_completion_trigger_rejected() {
        let mut config = UserConfig::default();
        config.endpoint.model_name = "test-model".to_string();
        config.loadgen.request_count = None;
        config.loadgen.benchmark_duration_sec = None;
        config.loadgen.fixed_schedule = false;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_round_trips_through_json() {
        let mut config = UserConfig::default();
        config.endpoint.model_name = "m".to_string();
        config.loadgen.concurrency = Some(4);
        let json = serde_json::to_string(&config).expect("serialize");
        let back: UserConfig = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back.endpoint.model_name, "m");
        assert_eq!(back.loadgen.concurrency, Some(4));
    }
}
