//! Console summary rendering.

use std::fmt::Write as _;

use aiperf_common::config::UserConfig;
use aiperf_common::models::ProfileResults;
use aiperf_common::AIPerfResult;
use aiperf_metrics::{MetricFlags, MetricRegistry};

pub struct ConsoleExporter;

impl ConsoleExporter {
    /// Render the metric table as plain text. Metrics flagged NoConsole are
    /// hidden; streaming-only metrics are hidden for non-streaming runs.
    pub fn render(&self, results: &ProfileResults, config: &UserConfig) -> AIPerfResult<String> {
        let registry = MetricRegistry::with_builtin_metrics()?;
        let mut out = String::new();
        let _ = writeln!(out, "{:=^88}", " AIPerf Profile Results ");
        let _ = writeln!(
            out,
            "{:<38} {:>10} {:>10} {:>10} {:>10} {:>6}",
            "Metric", "avg", "p50", "p99", "max", "count"
        );
        let _ = writeln!(out, "{:-<88}", "");
        for record in &results.records {
            if let Some(info) = registry.info_for(&record.tag) {
                if info.flags.contains(MetricFlags::NO_CONSOLE) {
                    continue;
                }
                if info.flags.contains(MetricFlags::STREAMING_ONLY)
                    && !config.endpoint.streaming
                {
                    continue;
                }
            }
            let header = match &record.unit {
                Some(unit) => format!("{} ({unit})", record.header),
                None => record.header.clone(),
            };
            let _ = writeln!(
                out,
                "{:<38} {:>10.2} {:>10.2} {:>10.2} {:>10.2} {:>6}",
                header, record.avg, record.p50, record.p99, record.max, record.count
            );
        }
        if !results.error_summary.is_empty() {
            let _ = writeln!(out, "{:-<88}", "");
            let _ = writeln!(out, "Errors:");
            for entry in &results.error_summary {
                let _ = writeln!(out, "  {} x{}", entry.error_details, entry.count);
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aiperf_common::models::{ErrorDetails, ErrorDetailsCount, MetricResult};

    fn result_for(tag: &str, header: &str) -> MetricResult {
        MetricResult {
            tag: tag.to_string(),
            header: header.to_string(),
            avg: 1.0,
            count: 1,
            ..Default::default()
        }
    }

    #[test]
    fn test_no_console_metrics_hidden() {
        let results = ProfileResults {
            records: vec![
                result_for("request_latency", "Request Latency"),
                result_for("usage_prompt_tokens_diff", "Usage Prompt Tokens Diff"),
            ],
            ..Default::default()
        };
        let mut config = UserConfig::default();
        config.endpoint.streaming = true;
        let rendered = ConsoleExporter.render(&results, &config).expect("render");
        assert!(rendered.contains("Request Latency"));
        assert!(!rendered.contains("Usage Prompt Tokens Diff"));
    }

    #[test]
    fn test_streaming_only_metrics_hidden_for_unary_runs() {
        let results = ProfileResults {
            records: vec![result_for("time_to_first_token", "Time to First Token")],
            ..Default::default()
        };
        let mut config = UserConfig::default();
        config.endpoint.streaming = false;
        let rendered = ConsoleExporter.render(&results, &config).expect("render");
        assert!(!rendered.contains("Time to First Token"));
    }

    #[test]
    fn test_error_summary_rendered() {
        let results = ProfileResults {
            error_summary: vec![ErrorDetailsCount {
                error_details: ErrorDetails::new("TimeoutError", "timed out"),
                count: 3,
            }],
            ..Default::default()
        };
        let rendered = ConsoleExporter
            .render(&results, &UserConfig::default())
            .expect("render");
        assert!(rendered.contains("TimeoutError"));
        assert!(rendered.contains("x3"));
    }
}
