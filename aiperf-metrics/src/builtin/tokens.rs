//! Token count metrics.

use std::collections::HashMap;

use aiperf_common::models::{MetricValue, ParsedResponseRecord};
use aiperf_common::AIPerfResult;

use crate::builtin::tags;
use crate::flags::MetricFlags;
use crate::metric::{MetricInfo, MetricOutcome, RecordMetric, RecordWithStateMetric};

/// Client-side input token count.
pub struct InputTokenCountMetric {
    info: MetricInfo,
}

impl InputTokenCountMetric {
    pub fn new() -> Self {
        Self {
            info: MetricInfo::new(tags::INPUT_TOKEN_COUNT, "Input Token Count")
                .unit("tokens")
                .flags(MetricFlags::TOKENIZES_INPUT_ONLY),
        }
    }
}

impl Default for InputTokenCountMetric {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordMetric for InputTokenCountMetric {
    fn info(&self) -> &MetricInfo {
        &self.info
    }

    fn parse_record(&self, record: &ParsedResponseRecord) -> AIPerfResult<MetricOutcome> {
        MetricOutcome::scalar(record.input_token_count as f64)
    }
}

/// Server-produced output token count.
pub struct OutputTokenCountMetric {
    info: MetricInfo,
}

impl OutputTokenCountMetric {
    pub fn new() -> Self {
        Self {
            info: MetricInfo::new(tags::OUTPUT_TOKEN_COUNT, "Output Token Count")
                .unit("tokens")
                .flags(MetricFlags::PRODUCES_TOKENS_ONLY),
        }
    }
}

impl Default for OutputTokenCountMetric {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordMetric for OutputTokenCountMetric {
    fn info(&self) -> &MetricInfo {
        &self.info
    }

    fn parse_record(&self, record: &ParsedResponseRecord) -> AIPerfResult<MetricOutcome> {
        if record.output_token_count == 0 {
            return MetricOutcome::skip();
        }
        MetricOutcome::scalar(record.output_token_count as f64)
    }
}

/// Reasoning token count, for endpoints that report it.
pub struct ReasoningTokenCountMetric {
    info: MetricInfo,
}

impl ReasoningTokenCountMetric {
    pub fn new() -> Self {
        Self {
            info: MetricInfo::new(tags::REASONING_TOKEN_COUNT, "Reasoning Token Count")
                .unit("tokens")
                .flags(MetricFlags::SUPPORTS_REASONING | MetricFlags::NO_CONSOLE),
        }
    }
}

impl Default for ReasoningTokenCountMetric {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordMetric for ReasoningTokenCountMetric {
    fn info(&self) -> &MetricInfo {
        &self.info
    }

    fn parse_record(&self, record: &ParsedResponseRecord) -> AIPerfResult<MetricOutcome> {
        match record.reasoning_token_count {
            Some(count) => MetricOutcome::scalar(count as f64),
            None => MetricOutcome::skip(),
        }
    }
}

/// Output tokens per second for one request.
pub struct OutputTokenThroughputPerRequestMetric {
    info: MetricInfo,
}

impl OutputTokenThroughputPerRequestMetric {
    pub fn new() -> Self {
        Self {
            info: MetricInfo::new(
                tags::OUTPUT_TOKEN_THROUGHPUT_PER_REQUEST,
                "Output Token Throughput Per Request",
            )
            .unit("tokens/sec")
            .requires(&[tags::OUTPUT_TOKEN_COUNT, tags::REQUEST_LATENCY]),
        }
    }
}

impl Default for OutputTokenThroughputPerRequestMetric {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordWithStateMetric for OutputTokenThroughputPerRequestMetric {
    fn info(&self) -> &MetricInfo {
        &self.info
    }

    fn parse_record(
        &self,
        _record: &ParsedResponseRecord,
        computed: &HashMap<String, MetricValue>,
    ) -> AIPerfResult<MetricOutcome> {
        let tokens = computed
            .get(tags::OUTPUT_TOKEN_COUNT)
            .and_then(|v| v.as_scalar())
            .unwrap_or(0.0);
        let latency_ms = computed
            .get(tags::REQUEST_LATENCY)
            .and_then(|v| v.as_scalar())
            .unwrap_or(0.0);
        if latency_ms <= 0.0 {
            return MetricOutcome::skip();
        }
        MetricOutcome::scalar(tokens / (latency_ms / 1_000.0))
    }
}
