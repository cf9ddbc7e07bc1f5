//! Pretty output formatting.

use serde_json::Value;

use clinicsync_core::cache::QueryKey;

use crate::evictor::CleanupReport;
use crate::query_client::CacheStats;

/// Format a cached record under its key.
pub fn format_record(key: &QueryKey, data: &Value) -> String {
    match data {
        Value::Array(items) => format_list(key, items),
        Value::Object(fields) => {
            let mut output = key.to_string();
            for (name, value) in fields {
                output.push_str(&format!("\n  {}: {}", name, format_scalar(value)));
            }
            output
        }
        other => format!("{}\n  {}", key, format_scalar(other)),
    }
}

fn format_list(key: &QueryKey, items: &[Value]) -> String {
    if items.is_empty() {
        return format!("{} (empty)", key);
    }
    let mut output = format!("{} ({})\n", key.to_string().to_uppercase(), items.len());
    output.push_str(&"-".repeat(40));
    for item in items {
        let label = item
            .get("name")
            .or_else(|| item.get("id"))
            .map(format_scalar)
            .unwrap_or_else(|| format_scalar(item));
        output.push_str(&format!("\n{}", label));
        if let Some(id) = item.get("id").filter(|_| item.get("name").is_some()) {
            output.push_str(&format!("\n  ID: {}", format_scalar(id)));
        }
    }
    output
}

fn format_scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "-".to_string(),
        other => other.to_string(),
    }
}

/// Format cache statistics for display.
pub fn format_stats(stats: &CacheStats) -> String {
    format!(
        "CACHE\n{}\n  Entries: {} ({} active, {} stale)\n  Pending mutations: {}\n  Size: {} / {} bytes",
        "-".repeat(40),
        stats.total_entries,
        stats.active_entries,
        stats.stale_entries,
        stats.pending_mutations,
        stats.size_bytes,
        stats.max_size_bytes,
    )
}

/// Format a cleanup run for display.
pub fn format_cleanup(report: &CleanupReport) -> String {
    let mut output = format!(
        "Cleanup: {} collected, {} evicted, {} -> {} bytes (threshold {})",
        report.collected.len(),
        report.evicted.len(),
        report.size_before,
        report.size_after,
        report.threshold,
    );
    if report.over_threshold {
        output.push_str("\n  Still over threshold: remaining entries are in use");
    }
    output
}
