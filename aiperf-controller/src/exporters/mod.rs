//! Result exporters.

mod console;
mod csv;
mod json;

pub use console::ConsoleExporter;
pub use csv::CsvExporter;
pub use json::JsonExporter;

use std::path::PathBuf;

use aiperf_common::config::UserConfig;
use aiperf_common::models::{ProfileResults, TelemetryResults};
use aiperf_common::AIPerfResult;

/// Where an exporter wrote its artifact.
#[derive(Debug, Clone)]
pub struct FileExportInfo {
    /// Display label, e.g. `JSON Export`.
    pub export_type: String,
    pub file_path: PathBuf,
}

/// One output format for the final results.
pub trait Exporter: Send + Sync {
    fn export(
        &self,
        results: &ProfileResults,
        telemetry: Option<&TelemetryResults>,
        config: &UserConfig,
    ) -> AIPerfResult<Option<FileExportInfo>>;
}

/// Runs every file exporter and then the console rendering.
pub struct ExporterManager {
    file_exporters: Vec<Box<dyn Exporter>>,
    exported: Vec<FileExportInfo>,
}

impl ExporterManager {
    pub fn new() -> Self {
        Self {
            file_exporters: vec![Box::new(JsonExporter), Box::new(CsvExporter)],
            exported: Vec::new(),
        }
    }

    /// Write all data artifacts (JSON, CSV).
    pub fn export_data(
        &mut self,
        results: &ProfileResults,
        telemetry: Option<&TelemetryResults>,
        config: &UserConfig,
    ) -> AIPerfResult<()> {
        for exporter in &self.file_exporters {
            if let Some(info) = exporter.export(results, telemetry, config)? {
                self.exported.push(info);
            }
        }
        Ok(())
    }

    /// Render the console summary.
    pub fn export_console(
        &self,
        results: &ProfileResults,
        config: &UserConfig,
    ) -> AIPerfResult<String> {
        ConsoleExporter.render(results, config)
    }

    pub fn exported_file_infos(&self) -> &[FileExportInfo] {
        &self.exported
    }
}

impl Default for ExporterManager {
    fn default() -> Self {
        Self::new()
    }
}
