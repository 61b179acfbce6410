//! Parser for the server's active command table.
//!
//! Expected line format (from `p4 -F "%id% %runstate% %user% %elapsed% %function% %args%" monitor show -al`):
//!
//! ```text
//!   562 I perforce 00:01:01 monitor
//!  2502 I fred 00:01:01 sync //...
//! ```

use tracing::trace;

use crate::model::{ProcessRecord, ProcessTable};

/// Parses the command table into a pid-indexed map.
///
/// Lines that do not match `<pid> <runstate> <user> <elapsed> <command> [<args>]`
/// are skipped. A later line for the same pid replaces an earlier one.
pub fn parse_process_table(raw: &str) -> ProcessTable {
    let mut table = ProcessTable::new();
    for line in raw.lines() {
        match parse_process_line(line) {
            Some(record) => {
                table.insert(record.pid.clone(), record);
            }
            None => {
                if !line.trim().is_empty() {
                    trace!("skipping process line: {}", line);
                }
            }
        }
    }
    table
}

/// Parses a single line. Returns `None` if it does not have the expected shape.
pub fn parse_process_line(line: &str) -> Option<ProcessRecord> {
    let mut rest = line.trim();
    let mut fields: [&str; 5] = [""; 5];

    for field in fields.iter_mut() {
        let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
        if end == 0 {
            return None;
        }
        *field = &rest[..end];
        rest = rest[end..].trim_start();
    }

    let [pid, _runstate, user, elapsed, command] = fields;
    if !pid.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let args = rest.trim_end();
    Some(ProcessRecord {
        pid: pid.to_string(),
        user: user.to_string(),
        command: command.to_string(),
        args: (!args.is_empty()).then(|| args.to_string()),
        elapsed: elapsed.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_process_table() {
        let raw = "     562 I perforce 00:01:01 monitor
          2502 I fred 00:01:01 sync //...
          166 I jim 00:01:01 sync -f //...
        ";
        let table = parse_process_table(raw);
        assert_eq!(table.len(), 3);

        let monitor = &table["562"];
        assert_eq!(monitor.user, "perforce");
        assert_eq!(monitor.command, "monitor");
        assert_eq!(monitor.args, None);

        let sync = &table["166"];
        assert_eq!(sync.user, "jim");
        assert_eq!(sync.elapsed, "00:01:01");
        assert_eq!(sync.args.as_deref(), Some("-f //..."));
    }

    #[test]
    fn test_unparseable_lines_are_skipped() {
        let raw = "Perforce client error:\n\
                   abc I fred 00:00:01 sync\n\
                   12 I fred\n\
                   2030 B svc_master-1666 05:24:42 ldapsync -g -i 1800\n";
        let table = parse_process_table(raw);
        assert_eq!(table.len(), 1);
        assert_eq!(table["2030"].args.as_deref(), Some("-g -i 1800"));
    }

    #[test]
    fn test_empty_input() {
        assert!(parse_process_table("").is_empty());
    }
}
