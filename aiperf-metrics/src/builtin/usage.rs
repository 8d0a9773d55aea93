//! Usage-reporting diff metrics.
//!
//! These compare the token counts reported by the API's usage block against
//! client-side counts, surfacing servers that misreport usage.

use std::collections::HashMap;

use aiperf_common::constants::USAGE_PCT_DIFF_THRESHOLD;
use aiperf_common::models::{MetricValue, ParsedResponseRecord};
use aiperf_common::AIPerfResult;

use crate::builtin::tags;
use crate::flags::MetricFlags;
use crate::metric::{
    AggregateMetric, MetricInfo, MetricOutcome, RecordMetric, RecordWithStateMetric,
    RunSummaryContext,
};

fn pct_diff(api: u64, client: u64) -> Option<f64> {
    if client == 0 {
        // Division by zero: this record does not contribute.
        return None;
    }
    Some((api as f64 - client as f64).abs() / client as f64 * 100.0)
}

/// Percent difference between API-reported and client-side prompt tokens.
pub struct UsagePromptTokensDiffMetric {
    info: MetricInfo,
}

impl UsagePromptTokensDiffMetric {
    pub fn new() -> Self {
        Self {
            info: MetricInfo::new(tags::USAGE_PROMPT_TOKENS_DIFF, "Usage Prompt Tokens Diff")
                .unit("%")
                .flags(MetricFlags::NO_CONSOLE),
        }
    }
}

impl Default for UsagePromptTokensDiffMetric {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordMetric for UsagePromptTokensDiffMetric {
    fn info(&self) -> &MetricInfo {
        &self.info
    }

    fn parse_record(&self, record: &ParsedResponseRecord) -> AIPerfResult<MetricOutcome> {
        let Some(api) = record.api_prompt_token_count else {
            return MetricOutcome::skip();
        };
        match pct_diff(api, record.input_token_count) {
            Some(diff) => MetricOutcome::scalar(diff),
            None => MetricOutcome::skip(),
        }
    }
}

/// Percent difference between API-reported and client-observed completion
/// tokens.
pub struct UsageCompletionTokensDiffMetric {
    info: MetricInfo,
}

impl UsageCompletionTokensDiffMetric {
    pub fn new() -> Self {
        Self {
            info: MetricInfo::new(
                tags::USAGE_COMPLETION_TOKENS_DIFF,
                "Usage Completion Tokens Diff",
            )
            .unit("%")
            .flags(MetricFlags::NO_CONSOLE),
        }
    }
}

impl Default for UsageCompletionTokensDiffMetric {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordMetric for UsageCompletionTokensDiffMetric {
    fn info(&self) -> &MetricInfo {
        &self.info
    }

    fn parse_record(&self, record: &ParsedResponseRecord) -> AIPerfResult<MetricOutcome> {
        let Some(api) = record.api_completion_token_count else {
            return MetricOutcome::skip();
        };
        match pct_diff(api, record.output_token_count) {
            Some(diff) => MetricOutcome::scalar(diff),
            None => MetricOutcome::skip(),
        }
    }
}

/// 1.0 when any usage diff for the record strictly exceeds the threshold,
/// 0.0 when diffs are present but within it. Skips when no diff contributed.
pub struct UsageDiscrepancyMetric {
    info: MetricInfo,
    threshold: f64,
}

impl UsageDiscrepancyMetric {
    pub fn new() -> Self {
        Self::with_threshold(USAGE_PCT_DIFF_THRESHOLD)
    }

    pub fn with_threshold(threshold: f64) -> Self {
        Self {
            // No required set: the metric reads whichever diffs are present,
            // so one skipped diff does not exclude the record.
            info: MetricInfo::new(tags::USAGE_DISCREPANCY, "Usage Discrepancy")
                .flags(MetricFlags::NO_CONSOLE),
            threshold,
        }
    }
}

impl Default for UsageDiscrepancyMetric {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordWithStateMetric for UsageDiscrepancyMetric {
    fn info(&self) -> &MetricInfo {
        &self.info
    }

    fn parse_record(
        &self,
        _record: &ParsedResponseRecord,
        computed: &HashMap<String, MetricValue>,
    ) -> AIPerfResult<MetricOutcome> {
        let diffs: Vec<f64> = [tags::USAGE_PROMPT_TOKENS_DIFF, tags::USAGE_COMPLETION_TOKENS_DIFF]
            .iter()
            .filter_map(|tag| computed.get(*tag).and_then(|v| v.as_scalar()))
            .collect();
        if diffs.is_empty() {
            return MetricOutcome::skip();
        }
        let exceeded = diffs.iter().any(|diff| *diff > self.threshold);
        MetricOutcome::scalar(if exceeded { 1.0 } else { 0.0 })
    }
}

/// Number of records whose usage diffs exceeded the threshold.
pub struct UsageDiscrepancyCountMetric {
    info: MetricInfo,
}

impl UsageDiscrepancyCountMetric {
    pub fn new() -> Self {
        Self {
            info: MetricInfo::new(tags::USAGE_DISCREPANCY_COUNT, "Usage Discrepancy Count")
                .unit("requests")
                .flags(MetricFlags::NO_CONSOLE)
                .requires(&[tags::USAGE_DISCREPANCY]),
        }
    }
}

impl Default for UsageDiscrepancyCountMetric {
    fn default() -> Self {
        Self::new()
    }
}

impl AggregateMetric for UsageDiscrepancyCountMetric {
    fn info(&self) -> &MetricInfo {
        &self.info
    }

    fn parse(&self, run: &RunSummaryContext<'_>) -> AIPerfResult<MetricOutcome> {
        let samples = run.samples(tags::USAGE_DISCREPANCY);
        if samples.is_empty() {
            return MetricOutcome::skip();
        }
        MetricOutcome::scalar(samples.iter().sum())
    }
}
