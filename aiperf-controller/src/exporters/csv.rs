//! CSV export of the summarized metrics.

use std::fmt::Write as _;

use aiperf_common::config::UserConfig;
use aiperf_common::models::{ProfileResults, TelemetryResults};
use aiperf_common::AIPerfResult;

use crate::exporters::{Exporter, FileExportInfo};

const FILE_NAME: &str = "profile_export.csv";

pub struct CsvExporter;

impl Exporter for CsvExporter {
    fn export(
        &self,
        results: &ProfileResults,
        _telemetry: Option<&TelemetryResults>,
        config: &UserConfig,
    ) -> AIPerfResult<Option<FileExportInfo>> {
        let mut out = String::new();
        out.push_str(
            "Metric,Unit,avg,min,max,p1,p5,p25,p50,p75,p90,p95,p99,std,count\n",
        );
        for record in &results.records {
            let _ = writeln!(
                out,
                "{},{},{:.4},{:.4},{:.4},{:.4},{:.4},{:.4},{:.4},{:.4},{:.4},{:.4},{:.4},{:.4},{}",
                escape(&record.header),
                record.unit.as_deref().unwrap_or(""),
                record.avg,
                record.min,
                record.max,
                record.p1,
                record.p5,
                record.p25,
                record.p50,
                record.p75,
                record.p90,
                record.p95,
                record.p99,
                record.std,
                record.count,
            );
        }

        let artifact_dir = &config.output.artifact_directory;
        std::fs::create_dir_all(artifact_dir)?;
        let path = artifact_dir.join(FILE_NAME);
        std::fs::write(&path, out)?;
        Ok(Some(FileExportInfo {
            export_type: "CSV Export".to_string(),
            file_path: path,
        }))
    }
}

fn escape(field: &str) -> String {
    if field.contains(',') || field.contains('"') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aiperf_common::models::MetricResult;

    #[test]
    fn test_csv_has_header_and_rows() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut config = UserConfig::default();
        config.output.artifact_directory = dir.path().to_path_buf();

        let results = ProfileResults {
            records: vec![MetricResult {
                tag: "request_latency".to_string(),
                header: "Request Latency".to_string(),
                unit: Some("ms".to_string()),
                avg: 10.0,
                count: 2,
                ..Default::default()
            }],
            ..Default::default()
        };
        let info = CsvExporter
            .export(&results, None, &config)
            .expect("export")
            .expect("info");
        let contents = std::fs::read_to_string(info.file_path).expect("read");
        let mut lines = contents.lines();
        assert!(lines.next().expect("header").starts_with("Metric,Unit,avg"));
        let row = lines.next().expect("row");
        assert!(row.starts_with("Request Latency,ms,10.0000"));
    }
}
