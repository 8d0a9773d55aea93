//! Accumulation and end-of-run summarization.

use std::collections::{HashMap, HashSet};

use aiperf_common::models::{MetricResult, MetricValue};
use aiperf_common::{AIPerfError, AIPerfResult};

use crate::metric::{MetricOutcome, RunSummaryContext};
use crate::registry::MetricRegistry;

/// Accumulates per-record metric values across a run.
#[derive(Default)]
pub struct MetricAccumulator {
    values: HashMap<String, Vec<f64>>,
    records_seen: u64,
}

impl MetricAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one record's computed values into the accumulator.
    pub fn accumulate(&mut self, computed: &HashMap<String, MetricValue>) {
        self.records_seen += 1;
        for (tag, value) in computed {
            self.values
                .entry(tag.clone())
                .or_default()
                .extend(value.samples());
        }
    }

    pub fn records_seen(&self) -> u64 {
        self.records_seen
    }

    /// Most recent sample for a tag, for realtime displays.
    pub fn current(&self, tag: &str) -> Option<f64> {
        self.values.get(tag).and_then(|v| v.last()).copied()
    }

    /// Run every aggregate metric through the dependency-resolution loop,
    /// then summarize all values into [`MetricResult`]s.
    ///
    /// An aggregate runs once every tag in its `required_metrics` has been
    /// resolved: produced samples, produced an aggregate value, or skipped.
    /// A full pass with no progress while metrics remain is a circular
    /// dependency and fails.
    pub fn summarize(
        &self,
        registry: &MetricRegistry,
        start_ns: u64,
        end_ns: u64,
    ) -> AIPerfResult<Vec<MetricResult>> {
        let mut values = self.values.clone();
        // Every per-record tag is resolved: its metric ran for each record
        // (producing samples or skipping).
        let mut resolved: HashSet<String> = registry.per_record_tags();

        let mut remaining: Vec<_> = registry.aggregate_metrics().to_vec();
        while !remaining.is_empty() {
            let before = remaining.len();
            let mut still_remaining = Vec::new();
            for metric in remaining {
                let info = metric.info();
                let satisfied = info.required_metrics.iter().all(|dep| resolved.contains(dep));
                if !satisfied {
                    still_remaining.push(metric);
                    continue;
                }
                let run = RunSummaryContext {
                    values: &values,
                    start_ns,
                    end_ns,
                };
                match metric.parse(&run)? {
                    MetricOutcome::Value(value) => {
                        values.insert(info.tag.clone(), value.samples());
                    }
                    MetricOutcome::Skip => {}
                }
                resolved.insert(info.tag.clone());
            }
            remaining = still_remaining;
            if remaining.len() == before {
                let missing = remaining
                    .iter()
                    .map(|m| m.info().tag.clone())
                    .collect::<Vec<_>>();
                return Err(AIPerfError::CircularDependency { missing });
            }
        }

        let mut results: Vec<MetricResult> = values
            .iter()
            .filter(|(_, samples)| !samples.is_empty())
            .map(|(tag, samples)| self.build_result(registry, tag, samples))
            .collect();
        results.sort_by(|a, b| a.tag.cmp(&b.tag));
        Ok(results)
    }

    fn build_result(
        &self,
        registry: &MetricRegistry,
        tag: &str,
        samples: &[f64],
    ) -> MetricResult {
        let info = registry.info_for(tag);
        let mut sorted = samples.to_vec();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let stats = SampleStats::from_sorted(&sorted);
        MetricResult {
            tag: tag.to_string(),
            header: info
                .as_ref()
                .map(|i| i.header.clone())
                .unwrap_or_else(|| tag.to_string()),
            unit: info.as_ref().and_then(|i| i.unit.clone()),
            avg: stats.avg,
            min: stats.min,
            max: stats.max,
            p1: stats.quantile(0.01),
            p5: stats.quantile(0.05),
            p25: stats.quantile(0.25),
            p50: stats.quantile(0.50),
            p75: stats.quantile(0.75),
            p90: stats.quantile(0.90),
            p95: stats.quantile(0.95),
            p99: stats.quantile(0.99),
            std: stats.std,
            count: samples.len() as u64,
            streaming_only: info
                .map(|i| i.flags.contains(crate::flags::MetricFlags::STREAMING_ONLY))
                .unwrap_or(false),
            current: samples.last().copied(),
        }
    }
}

/// Sample statistics over a sorted slice.
struct SampleStats<'a> {
    sorted: &'a [f64],
    avg: f64,
    min: f64,
    max: f64,
    std: f64,
}

impl<'a> SampleStats<'a> {
    fn from_sorted(sorted: &'a [f64]) -> Self {
        let n = sorted.len() as f64;
        let avg = sorted.iter().sum::<f64>() / n;
        let variance = sorted.iter().map(|v| (v - avg).powi(2)).sum::<f64>() / n;
        Self {
            sorted,
            avg,
            min: sorted.first().copied().unwrap_or(0.0),
            max: sorted.last().copied().unwrap_or(0.0),
            std: variance.sqrt(),
        }
    }

    /// Linear-interpolated sample quantile.
    fn quantile(&self, q: f64) -> f64 {
        let n = self.sorted.len();
        if n == 1 {
            return self.sorted[0];
        }
        let position = q * (n - 1) as f64;
        let lower = position.floor() as usize;
        let upper = (lower + 1).min(n - 1);
        let fraction = position - lower as f64;
        self.sorted[lower] + fraction * (self.sorted[upper] - self.sorted[lower])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin::tags;
    use crate::registry::MetricRegistry;

    fn accumulate_scalars(
        accumulator: &mut MetricAccumulator,
        tag: &str,
        values: &[f64],
    ) {
        for v in values {
            let mut computed = HashMap::new();
            computed.insert(tag.to_string(), MetricValue::Scalar(*v));
            accumulator.accumulate(&computed);
        }
    }

    #[test]
    fn test_quantiles_over_known_samples() {
        let mut accumulator = MetricAccumulator::new();
        let samples: Vec<f64> = (1..=100).map(|v| v as f64).collect();
        accumulate_scalars(&mut accumulator, tags::REQUEST_LATENCY, &samples);

        let registry = MetricRegistry::with_builtin_metrics().expect("registry");
        let results = accumulator
            .summarize(&registry, 0, 1_000_000_000)
            .expect("summarize");
        let latency = results
            .iter()
            .find(|r| r.tag == tags::REQUEST_LATENCY)
            .expect("latency result");

        assert_eq!(latency.count, 100);
        assert!((latency.min - 1.0).abs() < 1e-9);
        assert!((latency.max - 100.0).abs() < 1e-9);
        assert!((latency.avg - 50.5).abs() < 1e-9);
        assert!((latency.p50 - 50.5).abs() < 1e-9);
        assert!((latency.p99 - 99.01).abs() < 1e-9);
    }

    #[test]
    fn test_aggregate_dependency_resolution() {
        let mut accumulator = MetricAccumulator::new();
        accumulate_scalars(&mut accumulator, tags::REQUEST_LATENCY, &[10.0, 20.0]);

        let registry = MetricRegistry::with_builtin_metrics().expect("registry");
        // 2 second run.
        let results = accumulator
            .summarize(&registry, 0, 2_000_000_000)
            .expect("summarize");

        let duration = results
            .iter()
            .find(|r| r.tag == tags::BENCHMARK_DURATION)
            .expect("duration");
        assert!((duration.avg - 2.0).abs() < 1e-9);

        let count = results
            .iter()
            .find(|r| r.tag == tags::REQUEST_COUNT)
            .expect("request count");
        assert!((count.avg - 2.0).abs() < 1e-9);

        // Throughput depends on both of the above: 2 requests / 2 seconds.
        let throughput = results
            .iter()
            .find(|r| r.tag == tags::REQUEST_THROUGHPUT)
            .expect("throughput");
        assert!((throughput.avg - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_accumulator_summarizes_aggregates_only() {
        let accumulator = MetricAccumulator::new();
        let registry = MetricRegistry::with_builtin_metrics().expect("registry");
        let results = accumulator
            .summarize(&registry, 0, 1_000_000_000)
            .expect("summarize");
        // No per-record samples, but duration still reports.
        assert!(results.iter().any(|r| r.tag == tags::BENCHMARK_DURATION));
        assert!(!results.iter().any(|r| r.tag == tags::REQUEST_LATENCY));
    }
}
