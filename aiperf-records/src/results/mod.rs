//! Stateful results processors consuming metric records.

mod metric_summary;

pub use metric_summary::MetricSummaryProcessor;

use async_trait::async_trait;

use aiperf_common::models::{MetricRecordData, MetricResult};
use aiperf_common::AIPerfResult;

/// Consumes per-record metric data during the run and produces summarized
/// metric results on demand (both realtime and final).
#[async_trait]
pub trait ResultsProcessor: Send + Sync {
    fn name(&self) -> &'static str;

    async fn process_record(&self, record: &MetricRecordData) -> AIPerfResult<()>;

    async fn summarize(&self) -> AIPerfResult<Vec<MetricResult>>;
}
