//! Prometheus text exposition of the lock gauges.

use crate::config::MetricLabels;
use crate::model::MonitorMetrics;

/// Gauge name, help text and accessor, in output order.
const GAUGES: &[(&str, &str, fn(&MonitorMetrics) -> u64)] = &[
    ("p4_locks_db_read", "Database read locks", |m| m.db_read_locks),
    ("p4_locks_db_write", "Database write locks", |m| m.db_write_locks),
    ("p4_locks_cliententity_read", "clientEntity read locks", |m| {
        m.client_entity_read_locks
    }),
    ("p4_locks_cliententity_write", "clientEntity write locks", |m| {
        m.client_entity_write_locks
    }),
    ("p4_locks_meta_read", "meta db read locks", |m| m.meta_read_locks),
    ("p4_locks_meta_write", "meta db write locks", |m| m.meta_write_locks),
    ("p4_locks_replica_read", "replica read locks", |m| m.replica_read_locks),
    ("p4_locks_replica_write", "replica write locks", |m| m.replica_write_locks),
    ("p4_locks_cmds_blocked", "cmds blocked by locks", |m| m.blocked_commands),
];

/// Renders every counter as a gauge with `# HELP` and `# TYPE` lines.
pub fn format_metrics(metrics: &MonitorMetrics, labels: &MetricLabels) -> Vec<String> {
    let label_set = format_labels(labels);
    let mut lines = Vec::with_capacity(GAUGES.len() * 3);

    for (name, help, value) in GAUGES {
        lines.push(format!("# HELP {} {}", name, help));
        lines.push(format!("# TYPE {} gauge", name));
        lines.push(format!("{}{} {}", name, label_set, value(metrics)));
    }
    lines
}

/// `{serverid="...",sdpinst="..."}`, or an empty string when there are no labels.
fn format_labels(labels: &MetricLabels) -> String {
    let pairs = labels.pairs();
    if pairs.is_empty() {
        return String::new();
    }
    let body: Vec<String> = pairs
        .iter()
        .map(|(k, v)| format!("{}=\"{}\"", k, escape_label_value(v)))
        .collect();
    format!("{{{}}}", body.join(","))
}

/// Escape a label value for Prometheus format.
/// Backslash, double-quote, and newline must be escaped.
fn escape_label_value(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}
