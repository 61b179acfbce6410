//! One monitoring tick: collect, analyse, write.
//!
//! ```text
//! lslocks ──▶ parse_lock_listing ─┐
//!                                 ├─▶ find_locks ─▶ build_forest ─▶ blocking_levels
//! p4 monitor ▶ parse_process_table┘        │                              │
//!                                          ▼                              ▼
//!                                   format_metrics              format_blockers
//!                                   (locks.prom)                (diagnostic log)
//! ```

use std::collections::BTreeMap;

use chrono::{Local, NaiveDateTime};
use tracing::{debug, error, info, trace};

use crate::collector::{CommandRunner, LockCollector};
use crate::config::MonitorConfig;
use crate::correlate::find_locks;
use crate::graph::{BlockingForest, blocking_levels, build_forest};
use crate::model::MonitorMetrics;
use crate::output::{
    OutputError, append_log, format_blockers, format_messages, format_metrics, timestamp_prefix,
    write_metrics_file,
};
use crate::parser::{parse_lock_listing, parse_process_table};
use crate::replay::parse_replay;

/// Result of analysing one snapshot.
#[derive(Debug, Default)]
pub struct LockAnalysis {
    pub metrics: MonitorMetrics,
    pub forest: BlockingForest,
    /// Per-root hop counts, keyed by root pid.
    pub levels: BTreeMap<String, Vec<u64>>,
}

/// Parses both listings and derives counters, the blocking forest and the
/// per-root levels. Never fails; bad input yields zero counters.
pub fn analyze(lock_text: &str, process_text: &str) -> LockAnalysis {
    let records = parse_lock_listing(lock_text);
    let processes = parse_process_table(process_text);
    debug!("{} lock records, {} processes", records.len(), processes.len());

    let metrics = find_locks(&records, processes);
    let forest = build_forest(&metrics.blocking_commands);
    let levels = blocking_levels(&forest);
    trace!(
        "blocking forest: {}",
        serde_json::to_string(&forest).unwrap_or_default()
    );

    LockAnalysis {
        metrics,
        forest,
        levels,
    }
}

/// Diagnostic log lines: blocking messages first, then the blocker report.
pub fn log_lines(analysis: &LockAnalysis, prefix: &str) -> Vec<String> {
    let mut lines = format_messages(&analysis.metrics, prefix);
    lines.extend(format_blockers(&analysis.metrics, &analysis.levels, prefix));
    lines
}

/// Appends the report to the log file and replaces the metrics file.
pub fn write_outputs(
    config: &MonitorConfig,
    analysis: &LockAnalysis,
    at: &NaiveDateTime,
) -> Result<(), OutputError> {
    let prefix = timestamp_prefix(at);
    append_log(&config.log_file, &log_lines(analysis, &prefix))?;
    write_metrics_file(
        &config.metrics_path(),
        &format_metrics(&analysis.metrics, &config.labels),
    )
}

/// Collects live listings and writes outputs, stamped with the local time.
pub fn run_tick<R: CommandRunner>(
    collector: &LockCollector<R>,
    config: &MonitorConfig,
) -> Result<LockAnalysis, OutputError> {
    let lock_text = collector.collect_locks();
    let process_text = collector.collect_processes();
    let analysis = analyze(&lock_text, &process_text);
    write_outputs(config, &analysis, &Local::now().naive_local())?;
    info!(
        "locks: db {}/{}, blocked commands {}",
        analysis.metrics.db_read_locks,
        analysis.metrics.db_write_locks,
        analysis.metrics.blocked_commands
    );
    Ok(analysis)
}

/// Runs every snapshot found in a captured log through the pipeline.
///
/// Snapshots without a readable timestamp use the current time. Returns the
/// number of snapshots written; a failed write is logged and skipped.
pub fn replay(config: &MonitorConfig, capture: &str) -> usize {
    let mut written = 0;
    for snapshot in parse_replay(capture) {
        let at = snapshot
            .captured_at
            .unwrap_or_else(|| Local::now().naive_local());
        let analysis = analyze(&snapshot.lock_data, &snapshot.process_data);
        match write_outputs(config, &analysis, &at) {
            Ok(()) => written += 1,
            Err(e) => error!("replay of snapshot at {} failed: {}", at, e),
        }
    }
    info!("replayed {} snapshots", written);
    written
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::MockRunner;
    use crate::config::{MetricLabels, P4Connection};
    use chrono::NaiveDate;
    use std::time::Duration;

    const MONITOR: &str = "562 I perforce 00:01:01 monitor
2502 I fred 00:01:01 sync //...
2503 I susan 00:01:01 sync //...
166 I jim 00:02:01 sync -f //...
";

    fn at() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 4, 3)
            .unwrap()
            .and_hms_opt(23, 57, 2)
            .unwrap()
    }

    fn metric_value(contents: &str, name: &str) -> Option<u64> {
        contents
            .lines()
            .filter(|l| !l.starts_with('#'))
            .find(|l| l.split(['{', ' ']).next() == Some(name))
            .and_then(|l| l.rsplit(' ').next())
            .and_then(|v| v.parse().ok())
    }

    #[test]
    fn test_blocked_on_same_table() {
        let locks = r#"{"locks": [
            {"command": "p4d", "pid": 2502, "mode": "READ", "path": "/p4/1/root/db.have", "blocker": 166},
            {"command": "p4d", "pid": 2503, "mode": "READ", "path": "/p4/1/root/db.have", "blocker": 166},
            {"command": "p4d", "pid": 2502, "mode": "READ", "path": "/p4/1/root/db.have", "blocker": null}
        ]}"#;
        let analysis = analyze(locks, MONITOR);
        assert_eq!(analysis.metrics.db_read_locks, 3);
        assert_eq!(analysis.metrics.blocked_commands, 2);
        assert_eq!(analysis.levels.get("166"), Some(&vec![2]));

        let lines = log_lines(&analysis, "P");
        assert_eq!(lines.len(), 5);
        assert!(lines[0].contains("table db.have, blocked by pid 166"));
        assert!(lines[1].starts_with("P pid 2503"));
        assert_eq!(lines[2], "P Blocking commands by oldest, with count");
        assert_eq!(
            lines[3],
            "P blocking cmd: elapsed 00:02:01, pid 166, user jim, cmd sync, blocking directly/indirectly: 2, total 2"
        );
        assert_eq!(lines[4], "P blocking totals: 2");
    }

    #[test]
    fn test_chain_end_to_end() {
        let locks = r#"{"locks": [
            {"command": "p4d", "pid": 910, "mode": "WRITE", "path": "/p4/1/root/db.rev", "blocker": 920},
            {"command": "p4d", "pid": 920, "mode": "WRITE", "path": "/p4/1/root/db.rev", "blocker": 921},
            {"command": "p4d", "pid": 921, "mode": "WRITE", "path": "/p4/1/root/db.rev", "blocker": 900}
        ]}"#;
        let analysis = analyze(locks, "");
        assert_eq!(analysis.levels.len(), 1);
        assert_eq!(analysis.levels["900"], vec![1, 1, 1]);

        let lines = log_lines(&analysis, "P");
        assert!(
            lines
                .iter()
                .any(|l| l.contains("pid 900") && l.ends_with("blocking directly/indirectly: 1/1/1, total 3"))
        );
    }

    #[test]
    fn test_cycle_terminates() {
        let locks = r#"{"locks": [
            {"command": "p4d", "pid": 1, "mode": "WRITE", "path": "/p4/1/root/db.rev", "blocker": 2},
            {"command": "p4d", "pid": 2, "mode": "WRITE", "path": "/p4/1/root/db.rev", "blocker": 3},
            {"command": "p4d", "pid": 3, "mode": "WRITE", "path": "/p4/1/root/db.rev", "blocker": 1}
        ]}"#;
        let analysis = analyze(locks, "");
        assert_eq!(analysis.metrics.blocked_commands, 3);
        assert_eq!(analysis.metrics.edge_count(), 3);
        assert!(!analysis.forest.is_empty());
    }

    #[test]
    fn test_long_chain_terminates() {
        const LEN: u64 = 100_000;
        let entries: Vec<String> = (1..LEN)
            .map(|i| {
                format!(
                    r#"{{"command": "p4d", "pid": {}, "mode": "WRITE", "path": "/p4/1/root/db.rev", "blocker": {}}}"#,
                    i + 1,
                    i
                )
            })
            .collect();
        let locks = format!(r#"{{"locks": [{}]}}"#, entries.join(","));

        let analysis = analyze(&locks, "");
        assert_eq!(analysis.metrics.blocked_commands, LEN - 1);
        assert_eq!(analysis.levels.len(), 1);
        let levels = &analysis.levels["1"];
        assert_eq!(levels.len(), 9);
        assert_eq!(&levels[..8], &[1u64; 8]);
        assert_eq!(levels.iter().sum::<u64>(), LEN - 1);
    }

    #[test]
    fn test_pid_with_two_blockers_counted_once() {
        let locks = r#"{"locks": [
            {"command": "p4d", "pid": 2, "mode": "WRITE", "path": "/p4/1/root/db.rev", "blocker": 1},
            {"command": "p4d", "pid": 3, "mode": "WRITE", "path": "/p4/1/root/db.rev", "blocker": 1},
            {"command": "p4d", "pid": 4, "mode": "WRITE*", "path": "/p4/1/root/db.rev", "blocker": 2},
            {"command": "p4d", "pid": 4, "mode": "WRITE*", "path": "/p4/1/root/db.rev", "blocker": 3}
        ]}"#;
        let analysis = analyze(locks, "");
        assert_eq!(analysis.metrics.blocked_commands, 4);
        assert_eq!(analysis.levels["1"], vec![2, 1]);

        let lines = log_lines(&analysis, "P");
        assert!(lines.iter().any(|l| l.ends_with("blocking directly/indirectly: 2/1, total 3")));
    }

    #[test]
    fn test_null_path_with_blocker() {
        let locks = r#"{"locks": [
            {"command": "p4d", "pid": 2502, "mode": "READ", "path": null, "blocker": 166}
        ]}"#;
        let analysis = analyze(locks, MONITOR);
        assert_eq!(analysis.metrics.blocked_commands, 1);
        assert!(analysis.metrics.messages[0].contains("table unknown"));
    }

    #[test]
    fn test_write_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let config = MonitorConfig::new(dir.path(), dir.path().join("monitor.log"))
            .with_labels(MetricLabels::new(Some("master.1".into()), Some("1".into())));

        let locks = r#"{"locks": [
            {"command": "p4d", "pid": 2502, "mode": "READ", "path": "/p4/1/root/server.locks/meta/db", "blocker": null}
        ]}"#;
        write_outputs(&config, &analyze(locks, MONITOR), &at()).unwrap();
        write_outputs(&config, &analyze("", ""), &at()).unwrap();

        let prom = std::fs::read_to_string(config.metrics_path()).unwrap();
        assert!(prom.contains("p4_locks_meta_read{serverid=\"master.1\",sdpinst=\"1\"} 0"));
        assert_eq!(metric_value(&prom, "p4_locks_cmds_blocked"), Some(0));

        let log = std::fs::read_to_string(dir.path().join("monitor.log")).unwrap();
        let log_lines: Vec<&str> = log.lines().collect();
        assert_eq!(
            log_lines,
            vec![
                "2024-04-03 23:57:02 no blocked commands",
                "2024-04-03 23:57:02 blocking totals: 0",
                "2024-04-03 23:57:02 no blocked commands",
                "2024-04-03 23:57:02 blocking totals: 0",
            ]
        );
    }

    #[test]
    fn test_run_tick_with_mock_collector() {
        let dir = tempfile::tempdir().unwrap();
        let config = MonitorConfig::new(dir.path(), dir.path().join("monitor.log"));
        let runner = MockRunner::new()
            .with_output("lslocks -V", "lslocks from util-linux 2.37.2")
            .with_output(
                "sudo lslocks -o +BLOCKER -J",
                r#"{"locks": [{"command": "p4d", "pid": 2502, "mode": "WRITE", "path": "/p4/1/root/db.have", "blocker": 166}]}"#,
            )
            .with_output(
                "p4 -F \"%id% %runstate% %user% %elapsed% %function% %args%\" monitor show -al",
                MONITOR,
            );
        let collector = LockCollector::new(runner, P4Connection::default(), Duration::from_secs(1));

        let analysis = run_tick(&collector, &config).unwrap();
        assert_eq!(analysis.metrics.db_write_locks, 1);

        let prom = std::fs::read_to_string(config.metrics_path()).unwrap();
        assert_eq!(metric_value(&prom, "p4_locks_db_write"), Some(1));
        assert_eq!(metric_value(&prom, "p4_locks_cmds_blocked"), Some(1));
    }

    #[test]
    fn test_run_tick_collectors_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let config = MonitorConfig::new(dir.path(), dir.path().join("monitor.log"));
        let collector =
            LockCollector::new(MockRunner::new(), P4Connection::default(), Duration::from_secs(1));

        let analysis = run_tick(&collector, &config).unwrap();
        assert_eq!(analysis.metrics, MonitorMetrics::default());
        let prom = std::fs::read_to_string(config.metrics_path()).unwrap();
        assert_eq!(metric_value(&prom, "p4_locks_db_read"), Some(0));
    }

    #[test]
    fn test_replay_capture() {
        let dir = tempfile::tempdir().unwrap();
        let config = MonitorConfig::new(dir.path(), dir.path().join("monitor.log"));
        let capture = r#"DEBUG 2024-04-03 23:57:02,118 Running: sudo lslocks -o +BLOCKER -J
{
   "locks": [
      {"command":"p4d", "pid":2502, "mode":"READ", "path":"/p4/1/root/db.have", "blocker":166}
   ]
}
DEBUG 2024-04-03 23:57:02,313 Output:
2502 I fred 00:01:01 sync //...
166 I jim 00:02:01 sync -f //...
"#;
        assert_eq!(replay(&config, capture), 1);

        let log = std::fs::read_to_string(dir.path().join("monitor.log")).unwrap();
        assert!(log.starts_with("2024-04-03 23:57:02 pid 2502, user fred"));
        assert!(log.contains("2024-04-03 23:57:02 blocking totals: 1"));
    }

    #[test]
    fn test_write_outputs_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let config = MonitorConfig::new(dir.path().join("missing"), dir.path().join("monitor.log"));
        let err = write_outputs(&config, &LockAnalysis::default(), &at()).unwrap_err();
        assert!(matches!(err, OutputError::Io(..)));
    }
}
