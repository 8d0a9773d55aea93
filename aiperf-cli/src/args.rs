//! Command line arguments and their mapping onto the config models.

use std::path::PathBuf;

use clap::Parser;

use aiperf_common::config::{ServiceConfig, UserConfig};
use aiperf_common::enums::{EndpointType, GpuTelemetryMode, RateDistribution};

/// AIPerf: a distributed LLM inference benchmarking harness.
#[derive(Debug, Parser)]
#[command(name = "aiperf", version, about)]
pub struct Args {
    /// Base URL of the inference server.
    #[arg(short, long, default_value = "http://localhost:8000")]
    pub url: String,

    /// Model name sent in request payloads.
    #[arg(short, long)]
    pub model: String,

    /// Endpoint wire format.
    #[arg(long, value_enum, default_value_t = EndpointTypeArg::Chat)]
    pub endpoint_type: EndpointTypeArg,

    /// Custom request path overriding the endpoint-type default.
    #[arg(long)]
    pub endpoint_path: Option<String>,

    /// Request streamed (SSE) responses (pass `--streaming false` to disable).
    #[arg(long, action = clap::ArgAction::Set, default_value_t = true)]
    pub streaming: bool,

    /// Per-request max_tokens.
    #[arg(long)]
    pub max_tokens: Option<u32>,

    /// Number of credits to keep in flight.
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Offered requests per second (open loop).
    #[arg(long)]
    pub request_rate: Option<f64>,

    /// Inter-arrival distribution for --request-rate.
    #[arg(long, value_enum, default_value_t = RateDistributionArg::Poisson)]
    pub request_rate_distribution: RateDistributionArg,

    /// Replay the dataset's fixed timing schedule.
    #[arg(long, default_value_t = false)]
    pub fixed_schedule: bool,

    /// Total profiling requests to issue.
    #[arg(long, default_value_t = 10)]
    pub request_count: u64,

    /// Benchmark duration in seconds (overrides --request-count).
    #[arg(long)]
    pub benchmark_duration: Option<f64>,

    /// Grace period in seconds added to the benchmark window.
    #[arg(long, default_value_t = 0.0)]
    pub benchmark_grace_period: f64,

    /// Warmup requests issued (and discarded) before profiling.
    #[arg(long, default_value_t = 0)]
    pub warmup_request_count: u64,

    /// Cancel any request exceeding this many seconds.
    #[arg(long)]
    pub request_cancellation: Option<f64>,

    /// Conversation corpus file (JSONL); synthetic when omitted.
    #[arg(long)]
    pub input_file: Option<PathBuf>,

    /// Synthetic sessions to compose.
    #[arg(long, default_value_t = 100)]
    pub session_count: usize,

    /// Turns per synthetic session.
    #[arg(long, default_value_t = 1)]
    pub turns_per_session: usize,

    /// Mean synthetic prompt length in words.
    #[arg(long, default_value_t = 128)]
    pub prompt_mean: usize,

    /// Standard deviation of the synthetic prompt length.
    #[arg(long, default_value_t = 0)]
    pub prompt_stddev: usize,

    /// Seed for the synthetic composer.
    #[arg(long)]
    pub random_seed: Option<u64>,

    /// Directory receiving logs and exported results.
    #[arg(long, default_value = "artifacts")]
    pub artifact_dir: PathBuf,

    /// Minimum worker count.
    #[arg(long)]
    pub workers_min: Option<usize>,

    /// Maximum worker count (auto-sized from CPUs when omitted).
    #[arg(long)]
    pub workers_max: Option<usize>,

    /// Pin the record processor count instead of scaling with workers.
    #[arg(long)]
    pub record_processors: Option<usize>,

    /// GPU telemetry mode.
    #[arg(long, value_enum, default_value_t = TelemetryModeArg::Disabled)]
    pub gpu_telemetry_mode: TelemetryModeArg,

    /// GPU metrics endpoints to scrape.
    #[arg(long = "gpu-telemetry-endpoint")]
    pub gpu_telemetry_endpoints: Vec<String>,

    /// Log filter, e.g. `info` or `aiperf=debug`.
    #[arg(long, default_value = "info", env = "AIPERF_LOG")]
    pub log_level: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum EndpointTypeArg {
    Chat,
    Completions,
    Embeddings,
    Rankings,
}

impl From<EndpointTypeArg> for EndpointType {
    fn from(value: EndpointTypeArg) -> Self {
        match value {
            EndpointTypeArg::Chat => EndpointType::Chat,
            EndpointTypeArg::Completions => EndpointType::Completions,
            EndpointTypeArg::Embeddings => EndpointType::Embeddings,
            EndpointTypeArg::Rankings => EndpointType::Rankings,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum RateDistributionArg {
    Constant,
    Poisson,
}

impl From<RateDistributionArg> for RateDistribution {
    fn from(value: RateDistributionArg) -> Self {
        match value {
            RateDistributionArg::Constant => RateDistribution::Constant,
            RateDistributionArg::Poisson => RateDistribution::Poisson,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum TelemetryModeArg {
    Disabled,
    Summary,
    RealtimeDashboard,
}

impl From<TelemetryModeArg> for GpuTelemetryMode {
    fn from(value: TelemetryModeArg) -> Self {
        match value {
            TelemetryModeArg::Disabled => GpuTelemetryMode::Disabled,
            TelemetryModeArg::Summary => GpuTelemetryMode::Summary,
            TelemetryModeArg::RealtimeDashboard => GpuTelemetryMode::RealtimeDashboard,
        }
    }
}

impl Args {
    /// Assemble the user and service configs.
    pub fn into_configs(self) -> (UserConfig, ServiceConfig) {
        let mut user_config = UserConfig::default();
        user_config.endpoint.url = self.url;
        user_config.endpoint.model_name = self.model;
        user_config.endpoint.endpoint_type = self.endpoint_type.into();
        user_config.endpoint.custom_path = self.endpoint_path;
        user_config.endpoint.streaming = self.streaming;
        user_config.endpoint.max_tokens = self.max_tokens;

        user_config.loadgen.concurrency = self.concurrency;
        user_config.loadgen.request_rate = self.request_rate;
        user_config.loadgen.request_rate_distribution = self.request_rate_distribution.into();
        user_config.loadgen.fixed_schedule = self.fixed_schedule;
        user_config.loadgen.request_count = if self.benchmark_duration.is_some() {
            None
        } else {
            Some(self.request_count)
        };
        user_config.loadgen.benchmark_duration_sec = self.benchmark_duration;
        user_config.loadgen.benchmark_grace_period_sec = self.benchmark_grace_period;
        user_config.loadgen.warmup_request_count = self.warmup_request_count;
        user_config.loadgen.request_cancellation_sec = self.request_cancellation;

        user_config.input.file = self.input_file;
        user_config.input.session_count = self.session_count;
        user_config.input.turns_per_session = self.turns_per_session;
        user_config.input.prompt_mean_word_count = self.prompt_mean;
        user_config.input.prompt_stddev_word_count = self.prompt_stddev;
        user_config.input.random_seed = self.random_seed;

        user_config.output.artifact_directory = self.artifact_dir;

        user_config.telemetry.mode = self.gpu_telemetry_mode.into();
        user_config.telemetry.endpoints = self.gpu_telemetry_endpoints;

        user_config.cli_command = std::env::args().collect::<Vec<_>>().join(" ");

        let mut service_config = ServiceConfig::default();
        service_config.workers.min = self.workers_min;
        service_config.workers.max = self.workers_max;
        service_config.record_processor_count = self.record_processors;

        (user_config, service_config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_args_parse() {
        let args = Args::parse_from(["aiperf", "--model", "test-llm"]);
        let (user_config, service_config) = args.into_configs();
        assert_eq!(user_config.endpoint.model_name, "test-llm");
        assert_eq!(user_config.loadgen.request_count, Some(10));
        assert!(service_config.record_processor_count.is_none());
        user_config.validate().expect("valid config");
    }

    #[test]
    fn test_duration_overrides_request_count() {
        let args = Args::parse_from([
            "aiperf",
            "--model",
            "m",
            "--benchmark-duration",
            "30",
            "--concurrency",
            "8",
        ]);
        let (user_config, _) = args.into_configs();
        assert_eq!(user_config.loadgen.request_count, None);
        assert_eq!(user_config.loadgen.benchmark_duration_sec, Some(30.0));
        assert_eq!(user_config.loadgen.concurrency, Some(8));
    }

    #[test]
    fn test_telemetry_endpoints_collect() {
        let args = Args::parse_from([
            "aiperf",
            "--model",
            "m",
            "--gpu-telemetry-mode",
            "summary",
            "--gpu-telemetry-endpoint",
            "http://a:9400/metrics",
            "--gpu-telemetry-endpoint",
            "http://b:9400/metrics",
        ]);
        let (user_config, _) = args.into_configs();
        assert_eq!(user_config.telemetry.endpoints.len(), 2);
        assert_eq!(user_config.telemetry.mode, GpuTelemetryMode::Summary);
    }
}
