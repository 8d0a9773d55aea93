//! Per-record metric evaluation.

use std::collections::HashMap;
use std::sync::Arc;

use aiperf_common::models::{MetricValue, ParsedResponseRecord};
use aiperf_common::AIPerfResult;
use tracing::trace;

use crate::registry::MetricRegistry;

/// Evaluates every per-record metric against one record.
pub struct RecordMetricPipeline {
    registry: Arc<MetricRegistry>,
}

impl RecordMetricPipeline {
    pub fn new(registry: Arc<MetricRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<MetricRegistry> {
        &self.registry
    }

    /// Evaluate all record metrics (tag order) then all record-with-state
    /// metrics (dependency order). A skipped metric leaves no entry; a
    /// dependent whose requirement skipped is itself skipped.
    pub fn evaluate(
        &self,
        record: &ParsedResponseRecord,
    ) -> AIPerfResult<HashMap<String, MetricValue>> {
        let mut computed: HashMap<String, MetricValue> = HashMap::new();

        for metric in self.registry.record_metrics() {
            match metric.parse_record(record)? {
                crate::metric::MetricOutcome::Value(value) => {
                    computed.insert(metric.info().tag.clone(), value);
                }
                crate::metric::MetricOutcome::Skip => {
                    trace!(tag = %metric.info().tag, "record metric skipped");
                }
            }
        }

        for metric in self.registry.state_metrics() {
            let satisfied = metric
                .info()
                .required_metrics
                .iter()
                .all(|dep| computed.contains_key(dep));
            if !satisfied {
                // A dependency skipped this record; dependents are excluded.
                continue;
            }
            match metric.parse_record(record, &computed)? {
                crate::metric::MetricOutcome::Value(value) => {
                    computed.insert(metric.info().tag.clone(), value);
                }
                crate::metric::MetricOutcome::Skip => {
                    trace!(tag = %metric.info().tag, "state metric skipped");
                }
            }
        }

        Ok(computed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aiperf_common::models::{
        ParsedResponse, RequestRecord, ResponseContent, ResponseData,
    };

    fn streaming_record(
        start_perf_ns: i64,
        response_times: &[i64],
        input_tokens: u64,
        output_tokens: u64,
    ) -> ParsedResponseRecord {
        ParsedResponseRecord {
            record: RequestRecord {
                start_perf_ns,
                end_perf_ns: *response_times.last().unwrap_or(&start_perf_ns),
                timestamp_ns: 1,
                responses: response_times
                    .iter()
                    .map(|t| ResponseData {
                        perf_ns: *t,
                        raw: "chunk".to_string(),
                    })
                    .collect(),
                ..Default::default()
            },
            responses: response_times
                .iter()
                .map(|t| ParsedResponse {
                    perf_ns: *t,
                    data: ResponseContent::Text {
                        text: "chunk".to_string(),
                    },
                })
                .collect(),
            input_token_count: input_tokens,
            output_token_count: output_tokens,
            reasoning_token_count: None,
            api_prompt_token_count: None,
            api_completion_token_count: None,
        }
    }

    #[test]
    fn test_pipeline_computes_core_metrics() {
        let registry = Arc::new(MetricRegistry::with_builtin_metrics().expect("registry"));
        let pipeline = RecordMetricPipeline::new(registry);
        let record = streaming_record(
            1_000_000_000,
            &[1_500_000_000, 2_000_000_000, 3_000_000_000],
            100,
            30,
        );

        let computed = pipeline.evaluate(&record).expect("evaluate");

        let latency = computed
            .get(crate::builtin::tags::REQUEST_LATENCY)
            .and_then(|v| v.as_scalar())
            .expect("request latency");
        assert!((latency - 2_000.0).abs() < 1e-6, "latency ms: {latency}");

        let ttft = computed
            .get(crate::builtin::tags::TIME_TO_FIRST_TOKEN)
            .and_then(|v| v.as_scalar())
            .expect("ttft");
        assert!((ttft - 500.0).abs() < 1e-6, "ttft ms: {ttft}");

        let itl = computed
            .get(crate::builtin::tags::INTER_TOKEN_LATENCY)
            .expect("inter token latency");
        assert_eq!(itl.samples(), vec![500.0, 1_000.0]);
    }

    #[test]
    fn test_dependency_order_holds_for_state_metrics() {
        let registry = Arc::new(MetricRegistry::with_builtin_metrics().expect("registry"));
        let pipeline = RecordMetricPipeline::new(registry);
        let record = streaming_record(1_000_000_000, &[2_000_000_000], 100, 50);

        let computed = pipeline.evaluate(&record).expect("evaluate");

        // Throughput depends on latency and token count, both present.
        let throughput = computed
            .get(crate::builtin::tags::OUTPUT_TOKEN_THROUGHPUT_PER_REQUEST)
            .and_then(|v| v.as_scalar())
            .expect("per request throughput");
        // 50 tokens over 1 second.
        assert!((throughput - 50.0).abs() < 1e-6);
    }
}
