//! Parsers for `lslocks` output.
//!
//! Newer util-linux releases print JSON (`lslocks -J`), older ones only the
//! fixed-column table. Both are normalised to [`LockRecord`] here so nothing
//! downstream cares which one the host produced.

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::ParseError;
use crate::model::{LockMode, LockRecord};

/// Minimum number of columns in a text row: `COMMAND PID TYPE SIZE MODE M START END PATH`.
const MIN_TEXT_FIELDS: usize = 9;

/// Parses a lock listing in either format.
///
/// Empty input and `{}` yield no records. Malformed input is logged and
/// yields whatever could be recovered.
pub fn parse_lock_listing(raw: &str) -> Vec<LockRecord> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == "{}" {
        debug!("empty lock listing");
        return Vec::new();
    }

    if trimmed.starts_with('{') {
        parse_json_locks(trimmed)
    } else {
        parse_text_locks(raw)
    }
}

/// Pid or blocker value; lslocks prints numbers, older wrappers print strings.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Num(i64),
    Text(String),
}

impl RawId {
    fn into_string(self) -> Option<String> {
        match self {
            RawId::Num(n) => Some(n.to_string()),
            RawId::Text(s) => {
                let s = s.trim();
                (!s.is_empty()).then(|| s.to_string())
            }
        }
    }
}

/// One element of the JSON `locks` array. Columns we do not use
/// (`type`, `size`, `m`, `start`, `end`) are ignored.
#[derive(Deserialize)]
struct RawLock {
    #[serde(default)]
    command: String,
    pid: Option<RawId>,
    #[serde(default)]
    mode: String,
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    blocker: Option<RawId>,
}

impl RawLock {
    fn into_record(self) -> Result<LockRecord, ParseError> {
        let pid = self
            .pid
            .and_then(RawId::into_string)
            .ok_or_else(|| ParseError::new("missing pid"))?;
        let mode = LockMode::parse(&self.mode)
            .ok_or_else(|| ParseError::new(format!("unknown lock mode '{}'", self.mode)))?;

        Ok(LockRecord {
            command: self.command,
            pid,
            mode,
            path: self.path.filter(|p| !p.is_empty()),
            blocker_pid: self.blocker.and_then(RawId::into_string),
        })
    }
}

/// Parses `lslocks -J` output.
///
/// Entries that fail to deserialise are dropped individually; a document that
/// is not valid JSON at all yields no records.
pub fn parse_json_locks(raw: &str) -> Vec<LockRecord> {
    let doc: Value = match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(e) => {
            warn!("failed to parse lock JSON: {}", e);
            debug!("lock JSON was: {}", raw);
            return Vec::new();
        }
    };

    let Some(entries) = doc.get("locks").and_then(Value::as_array) else {
        debug!("lock JSON has no 'locks' array");
        return Vec::new();
    };

    entries
        .iter()
        .filter_map(|entry| {
            let parsed = serde_json::from_value::<RawLock>(entry.clone())
                .map_err(|e| ParseError::new(e.to_string()))
                .and_then(RawLock::into_record);
            match parsed {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!("skipping lock entry {}: {}", entry, e);
                    None
                }
            }
        })
        .collect()
}

/// Parses the legacy text table printed by `lslocks -o +BLOCKER`.
///
/// ```text
/// COMMAND   PID  TYPE SIZE MODE  M START END PATH            BLOCKER
/// p4d       107 FLOCK  16K READ* 0     0   0 /path/db.config 105
/// ```
///
/// Paths containing spaces are not supported by this format.
pub fn parse_text_locks(raw: &str) -> Vec<LockRecord> {
    let mut records = Vec::new();

    for line in raw.lines() {
        match parse_text_line(line) {
            Ok(Some(record)) => records.push(record),
            Ok(None) => {}
            Err(e) => warn!("failed to parse lock line '{}': {}", line, e),
        }
    }

    debug!("parsed {} text lock records", records.len());
    records
}

/// Parses one text row. `Ok(None)` means the line is a header or blank.
fn parse_text_line(line: &str) -> Result<Option<LockRecord>, ParseError> {
    let fields: Vec<&str> = line.split_whitespace().collect();

    if fields.is_empty() {
        return Ok(None);
    }
    if fields.len() < MIN_TEXT_FIELDS {
        return Err(ParseError::new(format!(
            "not enough fields: expected {}+, got {}",
            MIN_TEXT_FIELDS,
            fields.len()
        )));
    }
    if fields[0] == "COMMAND" || fields[6] == "START" {
        return Ok(None);
    }

    let mode = LockMode::parse(fields[4])
        .ok_or_else(|| ParseError::new(format!("unknown lock mode '{}'", fields[4])))?;

    Ok(Some(LockRecord {
        command: fields[0].to_string(),
        pid: fields[1].to_string(),
        mode,
        path: Some(fields[8].to_string()),
        blocker_pid: fields.get(9).map(|s| s.to_string()),
    }))
}
