//! Latency metrics.

use aiperf_common::models::ParsedResponseRecord;
use aiperf_common::AIPerfResult;

use crate::builtin::tags;
use crate::flags::MetricFlags;
use crate::metric::{MetricInfo, MetricOutcome, RecordMetric};

const NANOS_PER_MILLI: f64 = 1_000_000.0;

/// End-to-end request latency in milliseconds.
pub struct RequestLatencyMetric {
    info: MetricInfo,
}

impl RequestLatencyMetric {
    pub fn new() -> Self {
        Self {
            info: MetricInfo::new(tags::REQUEST_LATENCY, "Request Latency").unit("ms"),
        }
    }
}

impl Default for RequestLatencyMetric {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordMetric for RequestLatencyMetric {
    fn info(&self) -> &MetricInfo {
        &self.info
    }

    fn parse_record(&self, record: &ParsedResponseRecord) -> AIPerfResult<MetricOutcome> {
        let latency_ns = record.record.end_perf_ns - record.record.start_perf_ns;
        if latency_ns <= 0 {
            return MetricOutcome::skip();
        }
        MetricOutcome::scalar(latency_ns as f64 / NANOS_PER_MILLI)
    }
}

/// Milliseconds from request send to the first streamed token.
pub struct TimeToFirstTokenMetric {
    info: MetricInfo,
}

impl TimeToFirstTokenMetric {
    pub fn new() -> Self {
        Self {
            info: MetricInfo::new(tags::TIME_TO_FIRST_TOKEN, "Time to First Token")
                .unit("ms")
                .flags(MetricFlags::STREAMING_ONLY),
        }
    }
}

impl Default for TimeToFirstTokenMetric {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordMetric for TimeToFirstTokenMetric {
    fn info(&self) -> &MetricInfo {
        &self.info
    }

    fn parse_record(&self, record: &ParsedResponseRecord) -> AIPerfResult<MetricOutcome> {
        let Some(first) = record.responses.first() else {
            return MetricOutcome::skip();
        };
        let ttft_ns = first.perf_ns - record.record.start_perf_ns;
        if ttft_ns <= 0 {
            return MetricOutcome::skip();
        }
        MetricOutcome::scalar(ttft_ns as f64 / NANOS_PER_MILLI)
    }
}

/// Milliseconds between consecutive streamed responses, one sample per gap.
pub struct InterTokenLatencyMetric {
    info: MetricInfo,
}

impl InterTokenLatencyMetric {
    pub fn new() -> Self {
        Self {
            info: MetricInfo::new(tags::INTER_TOKEN_LATENCY, "Inter Token Latency")
                .unit("ms")
                .flags(MetricFlags::STREAMING_ONLY),
        }
    }
}

impl Default for InterTokenLatencyMetric {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordMetric for InterTokenLatencyMetric {
    fn info(&self) -> &MetricInfo {
        &self.info
    }

    fn parse_record(&self, record: &ParsedResponseRecord) -> AIPerfResult<MetricOutcome> {
        if record.responses.len() < 2 {
            return MetricOutcome::skip();
        }
        let gaps = record
            .responses
            .windows(2)
            .map(|pair| (pair[1].perf_ns - pair[0].perf_ns) as f64 / NANOS_PER_MILLI)
            .collect();
        MetricOutcome::list(gaps)
    }
}
