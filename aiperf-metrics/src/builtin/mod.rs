//! Builtin metrics.

mod latency;
mod throughput;
mod tokens;
mod usage;

pub use latency::*;
pub use throughput::*;
pub use tokens::*;
pub use usage::*;

use crate::registry::MetricRegistryBuilder;

/// Stable metric tags.
pub mod tags {
    pub const REQUEST_LATENCY: &str = "request_latency";
    pub const TIME_TO_FIRST_TOKEN: &str = "time_to_first_token";
    pub const INTER_TOKEN_LATENCY: &str = "inter_token_latency";
    pub const INPUT_TOKEN_COUNT: &str = "input_token_count";
    pub const OUTPUT_TOKEN_COUNT: &str = "output_token_count";
    pub const REASONING_TOKEN_COUNT: &str = "reasoning_token_count";
    pub const OUTPUT_TOKEN_THROUGHPUT_PER_REQUEST: &str = "output_token_throughput_per_request";
    pub const USAGE_PROMPT_TOKENS_DIFF: &str = "usage_prompt_tokens_diff";
    pub const USAGE_COMPLETION_TOKENS_DIFF: &str = "usage_completion_tokens_diff";
    pub const USAGE_DISCREPANCY: &str = "usage_discrepancy";
    pub const BENCHMARK_DURATION: &str = "benchmark_duration";
    pub const REQUEST_COUNT: &str = "request_count";
    pub const REQUEST_THROUGHPUT: &str = "request_throughput";
    pub const OUTPUT_TOKEN_THROUGHPUT: &str = "output_token_throughput";
    pub const USAGE_DISCREPANCY_COUNT: &str = "usage_discrepancy_count";
}

/// Register every builtin metric.
pub fn register_all(builder: &mut MetricRegistryBuilder) {
    builder.record(RequestLatencyMetric::new());
    builder.record(TimeToFirstTokenMetric::new());
    builder.record(InterTokenLatencyMetric::new());
    builder.record(InputTokenCountMetric::new());
    builder.record(OutputTokenCountMetric::new());
    builder.record(ReasoningTokenCountMetric::new());
    builder.record(UsagePromptTokensDiffMetric::new());
    builder.record(UsageCompletionTokensDiffMetric::new());

    builder.record_with_state(OutputTokenThroughputPerRequestMetric::new());
    builder.record_with_state(UsageDiscrepancyMetric::new());

    builder.aggregate(BenchmarkDurationMetric::new());
    builder.aggregate(RequestCountMetric::new());
    builder.aggregate(RequestThroughputMetric::new());
    builder.aggregate(OutputTokenThroughputMetric::new());
    builder.aggregate(UsageDiscrepancyCountMetric::new());
}
