//! Metric traits and the skip-aware computation outcome.

use std::collections::{HashMap, HashSet};

use aiperf_common::models::{MetricValue, ParsedResponseRecord};
use aiperf_common::AIPerfResult;

use crate::flags::MetricFlags;

/// Static metadata describing a metric.
#[derive(Debug, Clone)]
pub struct MetricInfo {
    /// Stable string id.
    pub tag: String,
    /// Display header.
    pub header: String,
    /// Display unit, when the metric has one.
    pub unit: Option<String>,
    pub flags: MetricFlags,
    /// Tags this metric depends on.
    pub required_metrics: HashSet<String>,
}

impl MetricInfo {
    pub fn new(tag: &str, header: &str) -> Self {
        Self {
            tag: tag.to_string(),
            header: header.to_string(),
            unit: None,
            flags: MetricFlags::NONE,
            required_metrics: HashSet::new(),
        }
    }

    pub fn unit(mut self, unit: &str) -> Self {
        self.unit = Some(unit.to_string());
        self
    }

    pub fn flags(mut self, flags: MetricFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn requires(mut self, tags: &[&str]) -> Self {
        self.required_metrics = tags.iter().map(|t| t.to_string()).collect();
        self
    }
}

/// The outcome of evaluating a metric.
///
/// `Skip` is the typed "no metric value" signal: the record (or run) does
/// not contribute to this metric, and dependents are excluded for it.
/// Errors are programming or wiring failures and travel separately through
/// `AIPerfResult`.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricOutcome {
    Value(MetricValue),
    Skip,
}

impl MetricOutcome {
    pub fn scalar(value: f64) -> AIPerfResult<MetricOutcome> {
        Ok(MetricOutcome::Value(MetricValue::Scalar(value)))
    }

    pub fn list(values: Vec<f64>) -> AIPerfResult<MetricOutcome> {
        Ok(MetricOutcome::Value(MetricValue::List(values)))
    }

    pub fn skip() -> AIPerfResult<MetricOutcome> {
        Ok(MetricOutcome::Skip)
    }
}

/// A metric computed from the parsed record alone.
pub trait RecordMetric: Send + Sync {
    fn info(&self) -> &MetricInfo;

    fn parse_record(&self, record: &ParsedResponseRecord) -> AIPerfResult<MetricOutcome>;
}

/// A metric computed from the record plus previously computed per-record
/// values. Evaluated in dependency topological order.
pub trait RecordWithStateMetric: Send + Sync {
    fn info(&self) -> &MetricInfo;

    fn parse_record(
        &self,
        record: &ParsedResponseRecord,
        computed: &HashMap<String, MetricValue>,
    ) -> AIPerfResult<MetricOutcome>;
}

/// Everything an aggregate metric can see at end of run.
pub struct RunSummaryContext<'a> {
    /// Accumulated per-record samples by tag, plus previously produced
    /// aggregate values.
    pub values: &'a HashMap<String, Vec<f64>>,
    /// Wall-clock ns the profiling phase started.
    pub start_ns: u64,
    /// Wall-clock ns the profiling phase ended.
    pub end_ns: u64,
}

impl RunSummaryContext<'_> {
    /// Samples accumulated for a tag, empty when none contributed.
    pub fn samples(&self, tag: &str) -> &[f64] {
        self.values.get(tag).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// The single value of a previously produced aggregate.
    pub fn aggregate_value(&self, tag: &str) -> Option<f64> {
        self.values.get(tag).and_then(|v| v.first()).copied()
    }
}

/// A metric computed once per run from the accumulated values.
pub trait AggregateMetric: Send + Sync {
    fn info(&self) -> &MetricInfo;

    fn parse(&self, run: &RunSummaryContext<'_>) -> AIPerfResult<MetricOutcome>;
}
