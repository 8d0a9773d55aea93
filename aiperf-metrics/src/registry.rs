//! The process-local metric registry.

use std::collections::HashSet;
use std::sync::Arc;

use aiperf_common::{AIPerfError, AIPerfResult};

use crate::builtin;
use crate::metric::{AggregateMetric, RecordMetric, RecordWithStateMetric};

/// All registered metrics, validated and ordered at build time.
///
/// Each process builds its own registry at startup; it is never shared
/// across processes.
pub struct MetricRegistry {
    record_metrics: Vec<Arc<dyn RecordMetric>>,
    /// Topologically ordered by `required_metrics`.
    state_metrics: Vec<Arc<dyn RecordWithStateMetric>>,
    aggregate_metrics: Vec<Arc<dyn AggregateMetric>>,
}

impl std::fmt::Debug for MetricRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricRegistry")
            .field("record_metrics", &self.record_metrics.len())
            .field("state_metrics", &self.state_metrics.len())
            .field("aggregate_metrics", &self.aggregate_metrics.len())
            .finish()
    }
}

impl MetricRegistry {
    /// Registry populated with every builtin metric.
    pub fn with_builtin_metrics() -> AIPerfResult<Self> {
        let mut builder = MetricRegistryBuilder::new();
        builtin::register_all(&mut builder);
        builder.build()
    }

    pub fn builder() -> MetricRegistryBuilder {
        MetricRegistryBuilder::new()
    }

    /// Record metrics in tag order.
    pub fn record_metrics(&self) -> &[Arc<dyn RecordMetric>] {
        &self.record_metrics
    }

    /// Record-with-state metrics in dependency topological order.
    pub fn state_metrics(&self) -> &[Arc<dyn RecordWithStateMetric>] {
        &self.state_metrics
    }

    pub fn aggregate_metrics(&self) -> &[Arc<dyn AggregateMetric>] {
        &self.aggregate_metrics
    }

    /// Tags of every per-record metric (record and record-with-state).
    pub fn per_record_tags(&self) -> HashSet<String> {
        self.record_metrics
            .iter()
            .map(|m| m.info().tag.clone())
            .chain(self.state_metrics.iter().map(|m| m.info().tag.clone()))
            .collect()
    }

    /// Look up display info for a tag.
    pub fn info_for(&self, tag: &str) -> Option<crate::metric::MetricInfo> {
        self.record_metrics
            .iter()
            .map(|m| m.info())
            .chain(self.state_metrics.iter().map(|m| m.info()))
            .chain(self.aggregate_metrics.iter().map(|m| m.info()))
            .find(|info| info.tag == tag)
            .cloned()
    }
}

/// Builder validating tags and dependency order.
#[derive(Default)]
pub struct MetricRegistryBuilder {
    record_metrics: Vec<Arc<dyn RecordMetric>>,
    state_metrics: Vec<Arc<dyn RecordWithStateMetric>>,
    aggregate_metrics: Vec<Arc<dyn AggregateMetric>>,
}

impl MetricRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, metric: impl RecordMetric + 'static) -> &mut Self {
        self.record_metrics.push(Arc::new(metric));
        self
    }

    pub fn record_with_state(
        &mut self,
        metric: impl RecordWithStateMetric + 'static,
    ) -> &mut Self {
        self.state_metrics.push(Arc::new(metric));
        self
    }

    pub fn aggregate(&mut self, metric: impl AggregateMetric + 'static) -> &mut Self {
        self.aggregate_metrics.push(Arc::new(metric));
        self
    }

    /// Validate uniqueness and dependencies, sort record metrics by tag and
    /// record-with-state metrics topologically. Unsatisfiable dependencies
    /// are a programming error surfaced here.
    pub fn build(mut self) -> AIPerfResult<MetricRegistry> {
        let mut seen = HashSet::new();
        for tag in self
            .record_metrics
            .iter()
            .map(|m| m.info().tag.clone())
            .chain(self.state_metrics.iter().map(|m| m.info().tag.clone()))
            .chain(self.aggregate_metrics.iter().map(|m| m.info().tag.clone()))
        {
            if !seen.insert(tag.clone()) {
                return Err(AIPerfError::FactoryCreation(format!(
                    "duplicate metric tag: {tag}"
                )));
            }
        }

        self.record_metrics.sort_by(|a, b| a.info().tag.cmp(&b.info().tag));

        // Record metrics may not declare dependencies.
        for metric in &self.record_metrics {
            if !metric.info().required_metrics.is_empty() {
                return Err(AIPerfError::FactoryCreation(format!(
                    "record metric {} declares dependencies",
                    metric.info().tag
                )));
            }
        }

        let state_metrics = Self::topo_sort_state_metrics(
            std::mem::take(&mut self.state_metrics),
            &self.record_metrics,
        )?;

        Ok(MetricRegistry {
            record_metrics: self.record_metrics,
            state_metrics,
            aggregate_metrics: self.aggregate_metrics,
        })
    }

    fn topo_sort_state_metrics(
        mut remaining: Vec<Arc<dyn RecordWithStateMetric>>,
        record_metrics: &[Arc<dyn RecordMetric>],
    ) -> AIPerfResult<Vec<Arc<dyn RecordWithStateMetric>>> {
        let mut available: HashSet<String> = record_metrics
            .iter()
            .map(|m| m.info().tag.clone())
            .collect();
        let mut ordered = Vec::with_capacity(remaining.len());

        while !remaining.is_empty() {
            let before = remaining.len();
            remaining.retain(|metric| {
                let satisfied = metric
                    .info()
                    .required_metrics
                    .iter()
                    .all(|dep| available.contains(dep));
                if satisfied {
                    available.insert(metric.info().tag.clone());
                    ordered.push(metric.clone());
                }
                !satisfied
            });
            if remaining.len() == before {
                let missing = remaining
                    .iter()
                    .map(|m| m.info().tag.clone())
                    .collect::<Vec<_>>();
                return Err(AIPerfError::CircularDependency { missing });
            }
        }
        Ok(ordered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metric::{MetricInfo, MetricOutcome};
    use aiperf_common::models::{MetricValue, ParsedResponseRecord};
    use std::collections::HashMap;

    struct StubRecord {
        info: MetricInfo,
    }

    impl RecordMetric for StubRecord {
        fn info(&self) -> &MetricInfo {
            &self.info
        }

        fn parse_record(&self, _record: &ParsedResponseRecord) -> AIPerfResult<MetricOutcome> {
            MetricOutcome::scalar(1.0)
        }
    }

    struct StubState {
        info: MetricInfo,
    }

    impl RecordWithStateMetric for StubState {
        fn info(&self) -> &MetricInfo {
            &self.info
        }

        fn parse_record(
            &self,
            _record: &ParsedResponseRecord,
            _computed: &HashMap<String, MetricValue>,
        ) -> AIPerfResult<MetricOutcome> {
            MetricOutcome::scalar(1.0)
        }
    }

    #[test]
    fn test_builtin_registry_builds() {
        let registry = MetricRegistry::with_builtin_metrics().expect("builtin registry");
        assert!(!registry.record_metrics().is_empty());
        assert!(!registry.aggregate_metrics().is_empty());
    }

    #[test]
    fn test_duplicate_tags_rejected() {
        let mut builder = MetricRegistry::builder();
        builder.record(StubRecord {
            info: MetricInfo::new("dup", "Dup"),
        });
        builder.record(StubRecord {
            info: MetricInfo::new("dup", "Dup"),
        });
        assert!(builder.build().is_err());
    }

    #[test]
    fn test_state_metrics_topo_sorted() {
        let mut builder = MetricRegistry::builder();
        builder.record(StubRecord {
            info: MetricInfo::new("base", "Base"),
        });
        // Registered in reverse dependency order on purpose.
        builder.record_with_state(StubState {
            info: MetricInfo::new("second", "Second").requires(&["first"]),
        });
        builder.record_with_state(StubState {
            info: MetricInfo::new("first", "First").requires(&["base"]),
        });
        let registry = builder.build().expect("registry");
        let tags: Vec<&str> = registry
            .state_metrics()
            .iter()
            .map(|m| m.info().tag.as_str())
            .collect();
        assert_eq!(tags, vec!["first", "second"]);
    }

    #[test]
    fn test_unsatisfiable_dependency_fails_fast() {
        let mut builder = MetricRegistry::builder();
        builder.record_with_state(StubState {
            info: MetricInfo::new("orphan", "Orphan").requires(&["missing"]),
        });
        match builder.build() {
            Err(AIPerfError::CircularDependency { missing }) => {
                assert_eq!(missing, vec!["orphan".to_string()]);
            }
            other => panic!("expected circular dependency error, got {other:?}"),
        }
    }
}
