//! Exit error reporting.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use aiperf_common::models::{ErrorDetails, ExitErrorInfo};

/// Render the exit-errors panel: errors grouped by identity, with the
/// operations and services they affected.
pub fn render_exit_errors(errors: &[ExitErrorInfo]) -> String {
    let mut grouped: BTreeMap<String, (ErrorDetails, Vec<&ExitErrorInfo>)> = BTreeMap::new();
    for error in errors {
        let key = format!(
            "{}|{}|{:?}",
            error.error_details.error_type, error.error_details.message, error.error_details.code
        );
        grouped
            .entry(key)
            .or_insert_with(|| (error.error_details.clone(), Vec::new()))
            .1
            .push(error);
    }

    let mut out = String::new();
    let _ = writeln!(out, "{:=^88}", " AIPerf System Exit Errors ");
    for (details, infos) in grouped.values() {
        let _ = writeln!(out, "* {details}");
        let operations: Vec<&str> = infos.iter().map(|i| i.operation.as_str()).collect();
        let _ = writeln!(out, "    operations: {}", operations.join(", "));
        let services: Vec<&str> = infos
            .iter()
            .filter_map(|i| i.service_id.as_deref())
            .collect();
        if !services.is_empty() {
            let _ = writeln!(out, "    services: {}", services.join(", "));
        }
    }
    out
}
