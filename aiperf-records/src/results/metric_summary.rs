//! The metric summary results processor.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;

use aiperf_common::models::{MetricRecordData, MetricResult};
use aiperf_common::AIPerfResult;
use aiperf_metrics::{MetricAccumulator, MetricRegistry};

/// Accumulates per-record metric values and summarizes them (including the
/// aggregate metric pass) on demand.
pub struct MetricSummaryProcessor {
    registry: Arc<MetricRegistry>,
    state: Mutex<SummaryState>,
}

struct SummaryState {
    accumulator: MetricAccumulator,
    /// Observed benchmark window, tracked from record metadata.
    window_start_ns: Option<u64>,
    window_end_ns: u64,
}

impl MetricSummaryProcessor {
    pub fn new(registry: Arc<MetricRegistry>) -> Self {
        Self {
            registry,
            state: Mutex::new(SummaryState {
                accumulator: MetricAccumulator::new(),
                window_start_ns: None,
                window_end_ns: 0,
            }),
        }
    }

    /// Pin the benchmark window to the credit phase boundaries when known.
    pub fn set_window(&self, start_ns: Option<u64>, end_ns: Option<u64>) {
        let mut state = self.state.lock();
        if start_ns.is_some() {
            state.window_start_ns = start_ns;
        }
        if let Some(end_ns) = end_ns {
            state.window_end_ns = state.window_end_ns.max(end_ns);
        }
    }
}

#[async_trait]
impl super::ResultsProcessor for MetricSummaryProcessor {
    fn name(&self) -> &'static str {
        "metric_summary"
    }

    async fn process_record(&self, record: &MetricRecordData) -> AIPerfResult<()> {
        if !record.valid() {
            return Ok(());
        }
        let mut state = self.state.lock();
        state.accumulator.accumulate(&record.metrics);
        let start = record.metadata.request_start_ns;
        state.window_start_ns = Some(match state.window_start_ns {
            Some(existing) => existing.min(start),
            None => start,
        });
        state.window_end_ns = state.window_end_ns.max(record.metadata.request_end_ns);
        Ok(())
    }

    async fn summarize(&self) -> AIPerfResult<Vec<MetricResult>> {
        let state = self.state.lock();
        let start_ns = state.window_start_ns.unwrap_or(0);
        state
            .accumulator
            .summarize(&self.registry, start_ns, state.window_end_ns.max(start_ns))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::results::ResultsProcessor;
    use aiperf_common::models::{MetricRecordMetadata, MetricValue};
    use aiperf_metrics::builtin::tags;
    use std::collections::HashMap;

    fn record(start_ns: u64, end_ns: u64, latency_ms: f64) -> MetricRecordData {
        let mut metrics = HashMap::new();
        metrics.insert(
            tags::REQUEST_LATENCY.to_string(),
            MetricValue::Scalar(latency_ms),
        );
        MetricRecordData {
            metadata: MetricRecordMetadata {
                request_start_ns: start_ns,
                request_end_ns: end_ns,
                ..Default::default()
            },
            metrics,
            error: None,
        }
    }

    #[tokio::test]
    async fn test_window_tracked_from_records() {
        let registry = Arc::new(MetricRegistry::with_builtin_metrics().expect("registry"));
        let processor = MetricSummaryProcessor::new(registry);

        processor
            .process_record(&record(2_000_000_000, 3_000_000_000, 10.0))
            .await
            .expect("process");
        processor
            .process_record(&record(1_000_000_000, 2_500_000_000, 20.0))
            .await
            .expect("process");

        let results = processor.summarize().await.expect("summarize");
        let duration = results
            .iter()
            .find(|r| r.tag == tags::BENCHMARK_DURATION)
            .expect("duration");
        // Window spans 1s..3s.
        assert!((duration.avg - 2.0).abs() < 1e-9);

        let latency = results
            .iter()
            .find(|r| r.tag == tags::REQUEST_LATENCY)
            .expect("latency");
        assert_eq!(latency.count, 2);
        assert!((latency.avg - 15.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_error_records_do_not_accumulate() {
        let registry = Arc::new(MetricRegistry::with_builtin_metrics().expect("registry"));
        let processor = MetricSummaryProcessor::new(registry);
        let mut bad = record(1, 2, 10.0);
        bad.error = Some(aiperf_common::models::ErrorDetails::new(
            "TimeoutError",
            "late",
        ));
        processor.process_record(&bad).await.expect("process");
        let results = processor.summarize().await.expect("summarize");
        assert!(!results.iter().any(|r| r.tag == tags::REQUEST_LATENCY));
    }
}
