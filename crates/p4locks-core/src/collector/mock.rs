//! Canned command output for testing collectors without `lslocks` or `p4`.

use std::cell::RefCell;
use std::collections::HashMap;
use std::io;
use std::time::Duration;

use super::{CollectError, CommandRunner, command_line};

#[derive(Debug, Clone)]
enum Canned {
    Output(String),
    Timeout,
}

/// In-memory command runner for tests.
///
/// Responses are keyed by the full command line as rendered by
/// [`command_line`]. Unregistered commands fail as if the program did not
/// exist. Every invocation is recorded.
#[derive(Debug, Default)]
pub struct MockRunner {
    responses: HashMap<String, Canned>,
    calls: RefCell<Vec<String>>,
}

impl MockRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the stdout of a command line.
    pub fn with_output(mut self, cmdline: impl Into<String>, output: impl Into<String>) -> Self {
        self.responses
            .insert(cmdline.into(), Canned::Output(output.into()));
        self
    }

    /// Makes a command line time out.
    pub fn with_timeout(mut self, cmdline: impl Into<String>) -> Self {
        self.responses.insert(cmdline.into(), Canned::Timeout);
        self
    }

    /// Command lines run so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }
}

impl CommandRunner for MockRunner {
    fn run(
        &self,
        program: &str,
        args: &[&str],
        timeout: Duration,
    ) -> Result<String, CollectError> {
        let cmdline = command_line(program, args);
        self.calls.borrow_mut().push(cmdline.clone());

        match self.responses.get(&cmdline) {
            Some(Canned::Output(out)) => Ok(out.clone()),
            Some(Canned::Timeout) => Err(CollectError::Timeout(cmdline, timeout)),
            None => Err(CollectError::Spawn(
                cmdline,
                io::Error::new(io::ErrorKind::NotFound, "no canned output"),
            )),
        }
    }
}
