//! Correlates lock records with the process table.
//!
//! Produces the per-category lock counters and the direct blocking edges
//! (`blocker -> [blocked pids]`) that the graph builder works from.

use tracing::{debug, trace};

use crate::classify::classify_path;
use crate::model::{
    Blocker, LockMode, LockRecord, MonitorMetrics, ProcessRecord, ProcessTable, ResourceCategory,
    UNKNOWN,
};

/// Substring identifying the monitored server process family.
const SERVER_COMMAND: &str = "p4d";
const CLIENT_ENTITY_MARKER: &str = "clientEntity";
const META_MARKER: &str = "server.locks/meta";

/// Identity fields of a pid, resolved against the process table.
struct ProcessIdentity<'a> {
    user: &'a str,
    command: &'a str,
    args: &'a str,
    elapsed: &'a str,
}

impl<'a> ProcessIdentity<'a> {
    fn resolve(processes: &'a ProcessTable, pid: &str) -> Self {
        match processes.get(pid) {
            Some(ProcessRecord {
                user,
                command,
                args,
                elapsed,
                ..
            }) => Self {
                user,
                command,
                args: args.as_deref().unwrap_or(""),
                elapsed,
            },
            None => Self {
                user: UNKNOWN,
                command: UNKNOWN,
                args: UNKNOWN,
                elapsed: UNKNOWN,
            },
        }
    }
}

/// Increments a read/write counter pair. Pending modes are not counted.
fn count_mode(mode: LockMode, read: &mut u64, write: &mut u64) {
    match mode {
        LockMode::Read => *read += 1,
        LockMode::Write => *write += 1,
        LockMode::ReadPending | LockMode::WritePending => {}
    }
}

/// Builds [`MonitorMetrics`] from one lock listing and one process table.
///
/// Category tallies are independent: a single record can count toward the
/// client-entity gauges and the table gauges at once. A (blocked, blocker)
/// edge is recorded once no matter how often the listing repeats it.
pub fn find_locks(records: &[LockRecord], processes: ProcessTable) -> MonitorMetrics {
    let mut metrics = MonitorMetrics::default();

    for record in records {
        if !record.command.contains(SERVER_COMMAND) {
            continue;
        }
        let path = record.path.as_deref();

        if path.is_some_and(|p| p.contains(CLIENT_ENTITY_MARKER)) {
            count_mode(
                record.mode,
                &mut metrics.client_entity_read_locks,
                &mut metrics.client_entity_write_locks,
            );
        }
        if path.is_some_and(|p| p.contains(META_MARKER)) {
            count_mode(
                record.mode,
                &mut metrics.meta_read_locks,
                &mut metrics.meta_write_locks,
            );
        }

        let category = classify_path(path);
        trace!(
            "pid {} holds {} lock on {}",
            record.pid,
            record.mode,
            category.label()
        );
        if category.is_db_table() {
            count_mode(
                record.mode,
                &mut metrics.db_read_locks,
                &mut metrics.db_write_locks,
            );
        } else if category == ResourceCategory::Replica {
            count_mode(
                record.mode,
                &mut metrics.replica_read_locks,
                &mut metrics.replica_write_locks,
            );
        }

        if let Some(blocker_pid) = record.blocker_pid.as_deref() {
            record_blocking(&mut metrics, &processes, record, blocker_pid, &category);
        }
    }

    debug!(
        "correlated {} lock records: {} blocked commands, {} blockers",
        records.len(),
        metrics.blocked_commands,
        metrics.blocking_commands.len()
    );

    metrics.processes = processes;
    metrics
}

fn record_blocking(
    metrics: &mut MonitorMetrics,
    processes: &ProcessTable,
    record: &LockRecord,
    blocker_pid: &str,
    category: &ResourceCategory,
) {
    let holder = ProcessIdentity::resolve(processes, &record.pid);
    let blocker = ProcessIdentity::resolve(processes, blocker_pid);
    let table = category.label();

    let entry = metrics
        .blocking_commands
        .entry(blocker_pid.to_string())
        .or_insert_with(|| {
            Blocker::new(
                blocker_pid,
                blocker.user,
                blocker.command,
                blocker.elapsed,
                table,
            )
        });

    if entry.add_blocked(&record.pid) {
        metrics.blocked_commands += 1;
        metrics.messages.push(format!(
            "pid {}, user {}, cmd {}, table {}, blocked by pid {}, user {}, cmd {}, args {}",
            record.pid,
            holder.user,
            holder.command,
            table,
            blocker_pid,
            blocker.user,
            blocker.command,
            blocker.args
        ));
    }
}
