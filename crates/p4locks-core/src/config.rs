//! Runtime configuration for a monitoring run.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::warn;

/// Default directory scraped by the node exporter textfile collector.
pub const DEFAULT_METRICS_ROOT: &str = "/p4/metrics";
/// Default metrics file name inside the metrics directory.
pub const DEFAULT_METRICS_FILE: &str = "locks.prom";
/// Default timeout for `lslocks` and `p4 monitor show`.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

/// Labels attached to every gauge. Empty values are left out entirely.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MetricLabels {
    pub server_id: Option<String>,
    pub sdp_instance: Option<String>,
}

impl MetricLabels {
    pub fn new(server_id: Option<String>, sdp_instance: Option<String>) -> Self {
        let non_empty = |v: Option<String>| v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
        Self {
            server_id: non_empty(server_id),
            sdp_instance: non_empty(sdp_instance),
        }
    }

    /// Builds labels for an SDP instance, reading the server id from
    /// `<sdp_root>/<instance>/root/server.id` unless one is given.
    ///
    /// A missing or unreadable `server.id` leaves `serverid` out.
    pub fn for_sdp_instance(
        sdp_root: &Path,
        instance: Option<&str>,
        server_id: Option<String>,
    ) -> Self {
        let server_id = server_id.or_else(|| {
            let instance = instance.filter(|i| !i.is_empty())?;
            let path = sdp_root.join(instance).join("root").join("server.id");
            match std::fs::read_to_string(&path) {
                Ok(id) => Some(id),
                Err(e) => {
                    warn!("cannot read server id from {}: {}", path.display(), e);
                    None
                }
            }
        });
        Self::new(server_id, instance.map(String::from))
    }

    /// Label pairs in output order.
    pub fn pairs(&self) -> Vec<(&'static str, &str)> {
        let mut pairs = Vec::with_capacity(2);
        if let Some(id) = &self.server_id {
            pairs.push(("serverid", id.as_str()));
        }
        if let Some(inst) = &self.sdp_instance {
            pairs.push(("sdpinst", inst.as_str()));
        }
        pairs
    }
}

/// How to reach the server for `p4 monitor show`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct P4Connection {
    /// Path to the `p4` binary.
    pub p4bin: String,
    pub port: Option<String>,
    pub user: Option<String>,
}

impl Default for P4Connection {
    fn default() -> Self {
        Self {
            p4bin: "p4".to_string(),
            port: None,
            user: None,
        }
    }
}

/// Where a run writes its outputs and how long collectors may take.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MonitorConfig {
    pub metrics_root: PathBuf,
    pub metrics_file: String,
    /// Append-only diagnostic log.
    pub log_file: PathBuf,
    pub command_timeout: Duration,
    pub labels: MetricLabels,
}

impl MonitorConfig {
    pub fn new(metrics_root: impl Into<PathBuf>, log_file: impl Into<PathBuf>) -> Self {
        Self {
            metrics_root: metrics_root.into(),
            metrics_file: DEFAULT_METRICS_FILE.to_string(),
            log_file: log_file.into(),
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            labels: MetricLabels::default(),
        }
    }

    pub fn with_labels(mut self, labels: MetricLabels) -> Self {
        self.labels = labels;
        self
    }

    pub fn with_metrics_file(mut self, name: impl Into<String>) -> Self {
        self.metrics_file = name.into();
        self
    }

    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Full path of the metrics file.
    pub fn metrics_path(&self) -> PathBuf {
        self.metrics_root.join(&self.metrics_file)
    }
}
