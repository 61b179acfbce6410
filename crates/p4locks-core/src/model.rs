//! Data model shared by the parsers, the correlator and the graph builder.
//!
//! Every value here is built fresh from one pair of raw snapshots
//! (lock listing + process table) and dropped once the report and the
//! metrics file have been written.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::Serialize;

/// Placeholder used for any field that cannot be resolved from the process table.
pub const UNKNOWN: &str = "unknown";

/// Lock mode as reported by `lslocks`.
///
/// A trailing `*` in the raw listing marks a lock that is being waited for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LockMode {
    Read,
    Write,
    ReadPending,
    WritePending,
}

impl LockMode {
    /// Parses the raw `MODE` column. Returns `None` for anything unrecognised.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "READ" => Some(LockMode::Read),
            "WRITE" => Some(LockMode::Write),
            "READ*" => Some(LockMode::ReadPending),
            "WRITE*" => Some(LockMode::WritePending),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LockMode::Read => "READ",
            LockMode::Write => "WRITE",
            LockMode::ReadPending => "READ*",
            LockMode::WritePending => "WRITE*",
        }
    }
}

impl fmt::Display for LockMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of a filesystem lock listing, normalised from either input format.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LockRecord {
    /// Name of the process holding (or waiting for) the lock.
    pub command: String,
    pub pid: String,
    pub mode: LockMode,
    /// Locked file. Some lock sources omit it.
    pub path: Option<String>,
    /// PID of the process that blocks this one, if the lock is pending.
    pub blocker_pid: Option<String>,
}

/// One row of the server's active command table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ProcessRecord {
    pub pid: String,
    pub user: String,
    pub command: String,
    pub args: Option<String>,
    /// Elapsed time exactly as printed by the server (`HH:MM:SS`).
    pub elapsed: String,
}

/// Process table keyed by pid.
pub type ProcessTable = HashMap<String, ProcessRecord>;

/// Semantic category of a locked path.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ResourceCategory {
    /// A database table file; carries the file name (`db.have`, `rdb.lbr`, ...).
    DbTable(String),
    ClientEntity,
    MetaTable,
    Replica,
    UnknownPath,
}

impl ResourceCategory {
    /// Label used for the `table` field of blocking messages.
    pub fn label(&self) -> &str {
        match self {
            ResourceCategory::DbTable(name) => name,
            ResourceCategory::ClientEntity => "clientEntityLock",
            ResourceCategory::MetaTable => "metaLock",
            ResourceCategory::Replica => "replicaLock",
            ResourceCategory::UnknownPath => UNKNOWN,
        }
    }

    pub fn is_db_table(&self) -> bool {
        matches!(self, ResourceCategory::DbTable(_))
    }
}

/// A process that prevents at least one other process from taking a lock.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Blocker {
    pub pid: String,
    pub user: String,
    pub command: String,
    pub elapsed: String,
    /// Resource label of the first lock this blocker was seen holding up.
    pub resource_label: String,
    /// Blocked pids in first-seen order, without duplicates.
    pub blocked_pids: Vec<String>,
}

impl Blocker {
    pub fn new(
        pid: impl Into<String>,
        user: impl Into<String>,
        command: impl Into<String>,
        elapsed: impl Into<String>,
        resource_label: impl Into<String>,
    ) -> Self {
        Self {
            pid: pid.into(),
            user: user.into(),
            command: command.into(),
            elapsed: elapsed.into(),
            resource_label: resource_label.into(),
            blocked_pids: Vec::new(),
        }
    }

    /// Records `pid` as blocked by this process.
    ///
    /// Returns `false` if the edge was already known.
    pub fn add_blocked(&mut self, pid: &str) -> bool {
        if self.blocked_pids.iter().any(|p| p == pid) {
            return false;
        }
        self.blocked_pids.push(pid.to_string());
        true
    }
}

/// Lock counters and blocking relationships for one snapshot.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct MonitorMetrics {
    pub db_read_locks: u64,
    pub db_write_locks: u64,
    pub client_entity_read_locks: u64,
    pub client_entity_write_locks: u64,
    pub meta_read_locks: u64,
    pub meta_write_locks: u64,
    pub replica_read_locks: u64,
    pub replica_write_locks: u64,
    /// Number of distinct (blocked, blocker) edges.
    pub blocked_commands: u64,
    /// Human-readable blocking messages in scan order.
    pub messages: Vec<String>,
    pub blocking_commands: BTreeMap<String, Blocker>,
    /// Process table the scan was correlated against.
    #[serde(skip)]
    pub processes: ProcessTable,
}

impl MonitorMetrics {
    /// Total number of edges across all blockers.
    pub fn edge_count(&self) -> u64 {
        self.blocking_commands
            .values()
            .map(|b| b.blocked_pids.len() as u64)
            .sum()
    }
}
