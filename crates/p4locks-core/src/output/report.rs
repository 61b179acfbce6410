//! Human-readable diagnostic log lines.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::NaiveDateTime;

use crate::model::{MonitorMetrics, UNKNOWN};
use crate::util::{compare_pids, parse_elapsed};

/// Formats the `YYYY-MM-DD HH:MM:SS` prefix put in front of every log line.
pub fn timestamp_prefix(at: &NaiveDateTime) -> String {
    at.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// One line per blocking message, or a single "no blocked commands" line.
pub fn format_messages(metrics: &MonitorMetrics, prefix: &str) -> Vec<String> {
    if metrics.messages.is_empty() {
        return vec![format!("{} no blocked commands", prefix)];
    }
    metrics
        .messages
        .iter()
        .map(|m| format!("{} {}", prefix, m))
        .collect()
}

/// Longest-running first; unknown elapsed times last, then pid order.
fn oldest_first(a: (&str, &str), b: (&str, &str)) -> Ordering {
    let (pid_a, elapsed_a) = a;
    let (pid_b, elapsed_b) = b;
    match (parse_elapsed(elapsed_a), parse_elapsed(elapsed_b)) {
        (Some(x), Some(y)) => y.cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
    .then_with(|| compare_pids(pid_a, pid_b))
}

/// Joins hop counts as `1/2/3`; a root with nothing countable shows `0`.
fn format_levels(levels: &[u64]) -> String {
    if levels.is_empty() {
        return "0".to_string();
    }
    levels
        .iter()
        .map(u64::to_string)
        .collect::<Vec<_>>()
        .join("/")
}

/// One line per blocking root, oldest first, followed by the totals line.
///
/// `levels` maps each root pid to its per-hop counts (see
/// [`crate::graph::blocking_levels`]).
pub fn format_blockers(
    metrics: &MonitorMetrics,
    levels: &BTreeMap<String, Vec<u64>>,
    prefix: &str,
) -> Vec<String> {
    let mut roots: Vec<(&str, &str)> = levels
        .keys()
        .map(|pid| {
            let elapsed = metrics
                .blocking_commands
                .get(pid)
                .map(|b| b.elapsed.as_str())
                .unwrap_or(UNKNOWN);
            (pid.as_str(), elapsed)
        })
        .collect();
    roots.sort_by(|a, b| oldest_first(*a, *b));

    let mut lines = Vec::with_capacity(roots.len() + 2);
    if !roots.is_empty() {
        lines.push(format!("{} Blocking commands by oldest, with count", prefix));
    }

    for (pid, elapsed) in roots {
        let (user, command) = metrics
            .blocking_commands
            .get(pid)
            .map(|b| (b.user.as_str(), b.command.as_str()))
            .unwrap_or((UNKNOWN, UNKNOWN));
        let hops = &levels[pid];
        lines.push(format!(
            "{} blocking cmd: elapsed {}, pid {}, user {}, cmd {}, blocking directly/indirectly: {}, total {}",
            prefix,
            elapsed,
            pid,
            user,
            command,
            format_levels(hops),
            hops.iter().sum::<u64>()
        ));
    }

    lines.push(format!("{} blocking totals: {}", prefix, metrics.blocked_commands));
    lines
}
