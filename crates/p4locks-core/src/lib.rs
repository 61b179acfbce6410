//! p4locks-core - lock contention analysis for a p4d server host.
//!
//! Provides:
//! - `collector` - runs `lslocks` and `p4 monitor show` behind a mockable runner
//! - `parser` - lock listings (JSON and text) and the command table
//! - `classify` - resource category of a lock path
//! - `correlate` - lock counters and blocking edges for one snapshot
//! - `graph` - cycle repair, blocking forest and per-hop counts
//! - `output` - Prometheus metrics file and diagnostic log
//! - `pipeline` - one tick from raw listings to written outputs
//! - `replay` - re-analysis of captured debug logs
//! - `config` - output locations, labels and server connection

pub mod classify;
pub mod collector;
pub mod config;
pub mod correlate;
pub mod graph;
pub mod model;
pub mod output;
pub mod parser;
pub mod pipeline;
pub mod replay;
pub mod util;

pub use model::{Blocker, LockMode, LockRecord, MonitorMetrics, ProcessRecord, ResourceCategory};
pub use pipeline::{LockAnalysis, analyze, write_outputs};
