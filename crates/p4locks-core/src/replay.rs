//! Reads captured collector output back from a debug log.
//!
//! Lets a problem seen in production be re-analysed offline. A capture looks
//! like:
//!
//! ```text
//! DEBUG 2024-04-03 23:57:02,211 Running: sudo lslocks -o +BLOCKER -J
//! {
//!    "locks": [ ... ]
//! }
//! DEBUG 2024-04-03 23:57:02,313 Output:
//! 2030 B svc_master-1666 05:24:42 ldapsync -g -i 1800
//! 162476 I svc_p4d_fs_brk 00:00:01 IDLE none
//!
//! ```
//!
//! The lock section is either JSON (from a line starting `{` to a line that
//! is exactly `}`) or the text table (from a `COMMAND` header to the first
//! blank line). Lines in between are ignored.

use chrono::{DateTime, Local, NaiveDateTime};
use tracing::debug;

/// One lock listing and process table recovered from a capture.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReplaySnapshot {
    /// When the process table was captured, if the header could be parsed.
    pub captured_at: Option<NaiveDateTime>,
    pub lock_data: String,
    pub process_data: String,
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum Stage {
    Idle,
    JsonLocks,
    TextLocks,
    AwaitOutput,
    Processes,
}

/// Splits a capture into snapshots. A trailing incomplete snapshot is kept.
pub fn parse_replay(content: &str) -> Vec<ReplaySnapshot> {
    let mut snapshots = Vec::new();
    let mut stage = Stage::Idle;
    let mut current = ReplaySnapshot::default();
    let mut locks: Vec<&str> = Vec::new();
    let mut procs: Vec<&str> = Vec::new();

    for line in content.lines().map(str::trim_end) {
        match stage {
            Stage::Idle => {
                if line.starts_with('{') {
                    locks.push(line);
                    stage = if line == "{}" {
                        Stage::AwaitOutput
                    } else {
                        Stage::JsonLocks
                    };
                } else if line.starts_with("COMMAND") {
                    locks.push(line);
                    stage = Stage::TextLocks;
                }
            }
            Stage::JsonLocks => {
                locks.push(line);
                if line == "}" {
                    stage = Stage::AwaitOutput;
                }
            }
            Stage::TextLocks => {
                if line.trim().is_empty() {
                    stage = Stage::AwaitOutput;
                } else {
                    locks.push(line);
                }
            }
            Stage::AwaitOutput => {
                if line.ends_with("Output:") {
                    current.captured_at = parse_capture_time(line);
                    stage = Stage::Processes;
                }
            }
            Stage::Processes => {
                if line.trim().is_empty() {
                    current.lock_data = locks.join("\n");
                    current.process_data = procs.join("\n");
                    snapshots.push(std::mem::take(&mut current));
                    locks.clear();
                    procs.clear();
                    stage = Stage::Idle;
                } else {
                    procs.push(line);
                }
            }
        }
    }

    if !locks.is_empty() || !procs.is_empty() {
        current.lock_data = locks.join("\n");
        current.process_data = procs.join("\n");
        snapshots.push(current);
    }

    debug!("recovered {} snapshots from capture", snapshots.len());
    snapshots
}

/// Parses the timestamp of a log header line.
///
/// Accepts `LEVEL YYYY-MM-DD HH:MM:SS[,mmm] ...` and lines starting with an
/// RFC 3339 timestamp (the default tracing format).
pub fn parse_capture_time(line: &str) -> Option<NaiveDateTime> {
    let tokens: Vec<&str> = line.split_whitespace().collect();

    if let Some(first) = tokens.first()
        && let Ok(ts) = DateTime::parse_from_rfc3339(first)
    {
        return Some(ts.with_timezone(&Local).naive_local());
    }

    for pair in tokens.windows(2).take(3) {
        let time = pair[1].split([',', '.']).next().unwrap_or(pair[1]);
        let joined = format!("{} {}", pair[0], time);
        if let Ok(ts) = NaiveDateTime::parse_from_str(&joined, "%Y-%m-%d %H:%M:%S") {
            return Some(ts);
        }
    }
    None
}
