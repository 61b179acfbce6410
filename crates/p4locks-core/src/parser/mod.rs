//! Parsers for the raw collector output.
//!
//! These are pure functions over strings, so they can be tested without
//! running `lslocks` or `p4`.

mod locks;
mod monitor;

pub use locks::{parse_json_locks, parse_lock_listing, parse_text_locks};
pub use monitor::{parse_process_line, parse_process_table};

/// Error type for parsing failures.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
}

impl ParseError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self {
            message: msg.into(),
        }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Parse error: {}", self.message)
    }
}

impl std::error::Error for ParseError {}
