//! JSON export of the full results.

use serde_json::json;

use aiperf_common::config::UserConfig;
use aiperf_common::models::{ProfileResults, TelemetryResults};
use aiperf_common::AIPerfResult;

use crate::exporters::{Exporter, FileExportInfo};

const FILE_NAME: &str = "profile_export.json";

pub struct JsonExporter;

impl Exporter for JsonExporter {
    fn export(
        &self,
        results: &ProfileResults,
        telemetry: Option<&TelemetryResults>,
        config: &UserConfig,
    ) -> AIPerfResult<Option<FileExportInfo>> {
        let artifact_dir = &config.output.artifact_directory;
        std::fs::create_dir_all(artifact_dir)?;
        let path = artifact_dir.join(FILE_NAME);
        let document = json!({
            "generated_at": chrono::Utc::now().to_rfc3339(),
            "results": results,
            "telemetry": telemetry,
            "model": config.endpoint.model_name,
            "endpoint": config.endpoint.url,
        });
        std::fs::write(&path, serde_json::to_vec_pretty(&document)?)?;
        Ok(Some(FileExportInfo {
            export_type: "JSON Export".to_string(),
            file_path: path,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aiperf_common::models::MetricResult;

    #[test]
    fn test_json_export_writes_results() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut config = UserConfig::default();
        config.endpoint.model_name = "m".to_string();
        config.output.artifact_directory = dir.path().to_path_buf();

        let results = ProfileResults {
            records: vec![MetricResult {
                tag: "request_latency".to_string(),
                header: "Request Latency".to_string(),
                avg: 12.5,
                count: 3,
                ..Default::default()
            }],
            completed: 3,
            ..Default::default()
        };

        let info = JsonExporter
            .export(&results, None, &config)
            .expect("export")
            .expect("file info");
        let contents = std::fs::read_to_string(info.file_path).expect("read");
        let value: serde_json::Value = serde_json::from_str(&contents).expect("json");
        assert_eq!(value["results"]["completed"], 3);
        assert_eq!(value["results"]["records"][0]["tag"], "request_latency");
    }
}
