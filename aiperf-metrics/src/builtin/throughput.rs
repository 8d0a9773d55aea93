//! Run-level aggregate metrics.

use aiperf_common::AIPerfResult;

use crate::builtin::tags;
use crate::metric::{AggregateMetric, MetricInfo, MetricOutcome, RunSummaryContext};

const NANOS_PER_SECOND: f64 = 1_000_000_000.0;

/// Wall-clock duration of the profiling phase in seconds.
pub struct BenchmarkDurationMetric {
    info: MetricInfo,
}

impl BenchmarkDurationMetric {
    pub fn new() -> Self {
        Self {
            info: MetricInfo::new(tags::BENCHMARK_DURATION, "Benchmark Duration").unit("sec"),
        }
    }
}

impl Default for BenchmarkDurationMetric {
    fn default() -> Self {
        Self::new()
    }
}

impl AggregateMetric for BenchmarkDurationMetric {
    fn info(&self) -> &MetricInfo {
        &self.info
    }

    fn parse(&self, run: &RunSummaryContext<'_>) -> AIPerfResult<MetricOutcome> {
        if run.end_ns <= run.start_ns {
            return MetricOutcome::skip();
        }
        MetricOutcome::scalar((run.end_ns - run.start_ns) as f64 / NANOS_PER_SECOND)
    }
}

/// Number of requests that produced a latency sample.
pub struct RequestCountMetric {
    info: MetricInfo,
}

impl RequestCountMetric {
    pub fn new() -> Self {
        Self {
            info: MetricInfo::new(tags::REQUEST_COUNT, "Request Count")
                .unit("requests")
                .requires(&[tags::REQUEST_LATENCY]),
        }
    }
}

impl Default for RequestCountMetric {
    fn default() -> Self {
        Self::new()
    }
}

impl AggregateMetric for RequestCountMetric {
    fn info(&self) -> &MetricInfo {
        &self.info
    }

    fn parse(&self, run: &RunSummaryContext<'_>) -> AIPerfResult<MetricOutcome> {
        MetricOutcome::scalar(run.samples(tags::REQUEST_LATENCY).len() as f64)
    }
}

/// Completed requests per second over the benchmark duration.
pub struct RequestThroughputMetric {
    info: MetricInfo,
}

impl RequestThroughputMetric {
    pub fn new() -> Self {
        Self {
            info: MetricInfo::new(tags::REQUEST_THROUGHPUT, "Request Throughput")
                .unit("requests/sec")
                .requires(&[tags::REQUEST_COUNT, tags::BENCHMARK_DURATION]),
        }
    }
}

impl Default for RequestThroughputMetric {
    fn default() -> Self {
        Self::new()
    }
}

impl AggregateMetric for RequestThroughputMetric {
    fn info(&self) -> &MetricInfo {
        &self.info
    }

    fn parse(&self, run: &RunSummaryContext<'_>) -> AIPerfResult<MetricOutcome> {
        let Some(duration) = run.aggregate_value(tags::BENCHMARK_DURATION) else {
            return MetricOutcome::skip();
        };
        let Some(count) = run.aggregate_value(tags::REQUEST_COUNT) else {
            return MetricOutcome::skip();
        };
        if duration <= 0.0 {
            return MetricOutcome::skip();
        }
        MetricOutcome::scalar(count / duration)
    }
}

/// Total output tokens per second over the benchmark duration.
pub struct OutputTokenThroughputMetric {
    info: MetricInfo,
}

impl OutputTokenThroughputMetric {
    pub fn new() -> Self {
        Self {
            info: MetricInfo::new(tags::OUTPUT_TOKEN_THROUGHPUT, "Output Token Throughput")
                .unit("tokens/sec")
                .requires(&[tags::OUTPUT_TOKEN_COUNT, tags::BENCHMARK_DURATION]),
        }
    }
}

impl Default for OutputTokenThroughputMetric {
    fn default() -> Self {
        Self::new()
    }
}

impl AggregateMetric for OutputTokenThroughputMetric {
    fn info(&self) -> &MetricInfo {
        &self.info
    }

    fn parse(&self, run: &RunSummaryContext<'_>) -> AIPerfResult<MetricOutcome> {
        let Some(duration) = run.aggregate_value(tags::BENCHMARK_DURATION) else {
            return MetricOutcome::skip();
        };
        if duration <= 0.0 {
            return MetricOutcome::skip();
        }
        let total_tokens: f64 = run.samples(tags::OUTPUT_TOKEN_COUNT).iter().sum();
        if total_tokens <= 0.0 {
            return MetricOutcome::skip();
        }
        MetricOutcome::scalar(total_tokens / duration)
    }
}
