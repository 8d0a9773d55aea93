//! DCGM-exporter gauge parsing.

use aiperf_common::models::TelemetryRecord;
use aiperf_common::time_ns;

/// Exporter field names mapped to stable telemetry tags.
const FIELD_TAGS: &[(&str, &str)] = &[
    ("DCGM_FI_DEV_GPU_UTIL", "gpu_utilization"),
    ("DCGM_FI_DEV_FB_USED", "gpu_memory_used"),
    ("DCGM_FI_DEV_FB_FREE", "gpu_memory_free"),
    ("DCGM_FI_DEV_POWER_USAGE", "gpu_power_usage"),
    ("DCGM_FI_DEV_GPU_TEMP", "gpu_temperature"),
    ("DCGM_FI_DEV_SM_CLOCK", "gpu_sm_clock"),
];

/// Parse Prometheus-style gauge lines from a metrics endpoint body.
///
/// Unrecognized families and malformed lines are skipped silently; the
/// exporter surface is wider than what this harness records.
pub fn parse_gauge_lines(endpoint: &str, body: &str) -> Vec<TelemetryRecord> {
    let now_ns = time_ns();
    let mut records = Vec::new();
    for line in body.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((name_and_labels, value)) = line.rsplit_once(' ') else {
            continue;
        };
        let Ok(value) = value.parse::<f64>() else {
            continue;
        };
        let (family, labels) = match name_and_labels.split_once('{') {
            Some((family, labels)) => (family, labels.trim_end_matches('}')),
            None => (name_and_labels, ""),
        };
        let Some(tag) = FIELD_TAGS
            .iter()
            .find(|(field, _)| *field == family)
            .map(|(_, tag)| *tag)
        else {
            continue;
        };
        let gpu_index = labels
            .split(',')
            .find_map(|label| {
                let (key, raw) = label.split_once('=')?;
                if key.trim() == "gpu" {
                    raw.trim().trim_matches('"').parse::<u32>().ok()
                } else {
                    None
                }
            })
            .unwrap_or(0);
        records.push(TelemetryRecord {
            endpoint: endpoint.to_string(),
            gpu_index,
            tag: tag.to_string(),
            value,
            timestamp_ns: now_ns,
        });
    }
    records
}
