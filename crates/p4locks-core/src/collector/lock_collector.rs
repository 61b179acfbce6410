//! Gathers the raw lock listing and command table for one tick.

use std::time::Duration;

use tracing::{debug, warn};

use super::{CommandRunner, command_line};
use crate::config::P4Connection;

/// First util-linux release whose `lslocks` supports `-J`.
const JSON_MIN_VERSION: (u32, u32) = (2, 27);

/// Output format string passed to `p4 -F`, matching the process table parser.
pub const MONITOR_FORMAT: &str = "%id% %runstate% %user% %elapsed% %function% %args%";

/// Extracts the version from `lslocks -V` output
/// (`lslocks from util-linux 2.23.2`). Falls back to `1.0`.
pub fn lslocks_version(output: &str) -> String {
    output
        .split_whitespace()
        .last()
        .filter(|v| v.starts_with(|c: char| c.is_ascii_digit()))
        .unwrap_or("1.0")
        .to_string()
}

/// Whether an `lslocks` of this version can print JSON.
pub fn json_supported(version: &str) -> bool {
    let mut parts = version
        .split('.')
        .map(|p| p.trim_end_matches(|c: char| !c.is_ascii_digit()).parse::<u32>().unwrap_or(0));
    let major = parts.next().unwrap_or(0);
    let minor = parts.next().unwrap_or(0);
    (major, minor) >= JSON_MIN_VERSION
}

/// Runs the external listings through a [`CommandRunner`].
pub struct LockCollector<R: CommandRunner> {
    runner: R,
    timeout: Duration,
    connection: P4Connection,
}

impl<R: CommandRunner> LockCollector<R> {
    pub fn new(runner: R, connection: P4Connection, timeout: Duration) -> Self {
        Self {
            runner,
            timeout,
            connection,
        }
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Runs a command, mapping any failure to empty output.
    fn run_or_empty(&self, program: &str, args: &[&str]) -> String {
        match self.runner.run(program, args, self.timeout) {
            Ok(out) => {
                debug!("{} Output:\n{}", command_line(program, args), out);
                out
            }
            Err(e) => {
                warn!("{}", e);
                String::new()
            }
        }
    }

    /// Returns the `lslocks` listing, JSON if supported, text otherwise.
    ///
    /// `sudo` is tried first so locks of other users are visible; without
    /// sudo rights the plain command is used.
    pub fn collect_locks(&self) -> String {
        let version = lslocks_version(&self.run_or_empty("lslocks", &["-V"]));
        let mut args = vec!["-o", "+BLOCKER"];
        if json_supported(&version) {
            args.push("-J");
        }
        debug!("lslocks version {}, args {:?}", version, args);

        let mut sudo_args = vec!["lslocks"];
        sudo_args.extend_from_slice(&args);
        let output = self.run_or_empty("sudo", &sudo_args);
        if !output.trim().is_empty() {
            return output;
        }
        self.run_or_empty("lslocks", &args)
    }

    /// Returns the server's active command table.
    pub fn collect_processes(&self) -> String {
        let mut args: Vec<&str> = Vec::new();
        if let Some(user) = self.connection.user.as_deref().filter(|u| !u.is_empty()) {
            args.extend(["-u", user]);
        }
        if let Some(port) = self.connection.port.as_deref().filter(|p| !p.is_empty()) {
            args.extend(["-p", port]);
        }
        args.extend(["-F", MONITOR_FORMAT, "monitor", "show", "-al"]);
        self.run_or_empty(&self.connection.p4bin, &args)
    }
}
