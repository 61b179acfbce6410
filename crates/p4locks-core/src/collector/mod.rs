//! Collector boundary: runs `lslocks` and `p4 monitor show` and hands back
//! their raw text.
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                 LockCollector                │
//! │  collect_locks()      collect_processes()    │
//! └───────────────┬──────────────────────────────┘
//!                 │
//!          ┌──────▼────────┐
//!          │ CommandRunner │ (trait)
//!          └──────┬────────┘
//!         ┌───────┴────────┐
//!  ┌──────▼──────┐  ┌──────▼──────┐
//!  │ SystemRunner│  │ MockRunner  │
//!  │ (processes) │  │ (Testing)   │
//!  └─────────────┘  └─────────────┘
//! ```
//!
//! Every failure here (spawn error, non-zero exit, timeout) degrades to empty
//! output, which the analysis treats as "no locks" / "no processes".

mod lock_collector;
pub mod mock;

pub use lock_collector::{LockCollector, json_supported, lslocks_version};
pub use mock::MockRunner;

use std::io::{self, Read};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, trace};

/// How often a running child is polled for exit.
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Error type for collection failures.
#[derive(Debug)]
pub enum CollectError {
    /// The program could not be started.
    Spawn(String, io::Error),
    /// The program did not finish within the timeout and was killed.
    Timeout(String, Duration),
    /// The program exited unsuccessfully.
    ExitStatus(String, ExitStatus),
    /// I/O error while waiting for or reading from the program.
    Io(io::Error),
}

impl std::fmt::Display for CollectError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CollectError::Spawn(cmd, e) => write!(f, "failed to run '{}': {}", cmd, e),
            CollectError::Timeout(cmd, t) => {
                write!(f, "'{}' timed out after {:.1}s", cmd, t.as_secs_f64())
            }
            CollectError::ExitStatus(cmd, status) => write!(f, "'{}' exited with {}", cmd, status),
            CollectError::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for CollectError {}

impl From<io::Error> for CollectError {
    fn from(e: io::Error) -> Self {
        CollectError::Io(e)
    }
}

/// Runs an external program and returns its standard output.
pub trait CommandRunner {
    fn run(&self, program: &str, args: &[&str], timeout: Duration)
    -> Result<String, CollectError>;
}

/// Runs real processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl SystemRunner {
    pub fn new() -> Self {
        Self
    }
}

/// Reads a pipe to the end on a helper thread so the child never blocks on a
/// full pipe while we poll for its exit.
fn drain<R: Read + Send + 'static>(mut pipe: R) -> thread::JoinHandle<io::Result<String>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        pipe.read_to_end(&mut buf)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    })
}

fn join_drain(handle: Option<thread::JoinHandle<io::Result<String>>>) -> io::Result<String> {
    match handle {
        Some(h) => h
            .join()
            .unwrap_or_else(|_| Err(io::Error::other("pipe reader panicked"))),
        None => Ok(String::new()),
    }
}

/// Kills an abandoned child, waits for it and joins its pipe readers.
fn reap(
    child: &mut Child,
    stdout: Option<thread::JoinHandle<io::Result<String>>>,
    stderr: Option<thread::JoinHandle<io::Result<String>>>,
) {
    if let Err(e) = child.kill() {
        debug!("kill of pid {} failed: {}", child.id(), e);
    }
    if let Err(e) = child.wait() {
        debug!("wait for pid {} failed: {}", child.id(), e);
    }
    // Output of an abandoned run is discarded.
    let _ = join_drain(stdout);
    let _ = join_drain(stderr);
}

impl CommandRunner for SystemRunner {
    fn run(
        &self,
        program: &str,
        args: &[&str],
        timeout: Duration,
    ) -> Result<String, CollectError> {
        let cmdline = command_line(program, args);
        debug!("Running: {}", cmdline);

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| CollectError::Spawn(cmdline.clone(), e))?;

        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);

        let deadline = Instant::now() + timeout;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if Instant::now() >= deadline => {
                    reap(&mut child, stdout, stderr);
                    return Err(CollectError::Timeout(cmdline, timeout));
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(e) => {
                    reap(&mut child, stdout, stderr);
                    return Err(CollectError::Io(e));
                }
            }
        };

        let output = join_drain(stdout)?;
        let errors = join_drain(stderr)?;

        if !errors.trim().is_empty() {
            debug!("stderr of '{}': {}", cmdline, errors.trim_end());
        }
        if !status.success() {
            return Err(CollectError::ExitStatus(cmdline, status));
        }

        trace!("Output:\n{}", output);
        Ok(output)
    }
}

/// Renders a program and its arguments as one string, for logs and mock lookups.
pub fn command_line(program: &str, args: &[&str]) -> String {
    let mut line = program.to_string();
    for arg in args {
        line.push(' ');
        if arg.contains(char::is_whitespace) {
            line.push('"');
            line.push_str(arg);
            line.push('"');
        } else {
            line.push_str(arg);
        }
    }
    line
}
