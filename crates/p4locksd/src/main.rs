//! p4locksd - p4d lock contention monitor.
//!
//! Samples file locks held by p4d processes, correlates them with the
//! server's command table and writes Prometheus gauges plus a diagnostic log
//! of blocked commands. Runs once per invocation (for cron or a systemd
//! timer) or in a loop with `--interval`.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use clap::Parser;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use p4locks_core::collector::{LockCollector, SystemRunner};
use p4locks_core::config::{
    DEFAULT_METRICS_FILE, DEFAULT_METRICS_ROOT, MetricLabels, MonitorConfig, P4Connection,
};
use p4locks_core::pipeline::{replay, run_tick};

/// Root of an SDP installation; instance directories live below it.
const SDP_ROOT: &str = "/p4";
/// Log directory used when `$LOGS` is not set.
const DEFAULT_LOGS_DIR: &str = "/p4/1/logs";
const LOG_FILE_NAME: &str = "p4locksd.log";

/// p4d lock contention monitor.
#[derive(Parser, Debug)]
#[command(name = "p4locksd", about = "p4d lock contention monitor", version)]
struct Args {
    /// Perforce server address.
    #[arg(short = 'p', long, env = "P4PORT")]
    p4port: Option<String>,

    /// Perforce user.
    #[arg(short = 'u', long, env = "P4USER")]
    p4user: Option<String>,

    /// Path to the p4 binary.
    #[arg(long, env = "P4BIN", default_value = "p4")]
    p4bin: String,

    /// Diagnostic log file. Default: $LOGS/p4locksd.log if that directory
    /// exists, otherwise ./p4locksd.log.
    #[arg(short = 'L', long, value_name = "PATH")]
    log: Option<PathBuf>,

    /// SDP instance, used for the `sdpinst` label and to find server.id.
    #[arg(short = 'i', long)]
    sdp_instance: Option<String>,

    /// Server id label. Overrides /p4/<instance>/root/server.id.
    #[arg(long)]
    server_id: Option<String>,

    /// Replay a captured debug log instead of running lslocks and p4.
    #[arg(short = 't', long, value_name = "PATH")]
    test_file: Option<PathBuf>,

    /// Metrics directory.
    #[arg(short = 'm', long, default_value = DEFAULT_METRICS_ROOT)]
    metrics_root: PathBuf,

    /// Metrics file name inside the metrics directory.
    #[arg(long, default_value = DEFAULT_METRICS_FILE)]
    metrics_file: String,

    /// Timeout in seconds for each external command.
    #[arg(long, default_value = "5")]
    timeout: u64,

    /// Collect every N seconds until interrupted. Without it, run once.
    #[arg(long, value_name = "SECONDS", value_parser = clap::value_parser!(u64).range(1..))]
    interval: Option<u64>,

    /// Increase logging verbosity (-v for debug, -vv for trace). Default is info level.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode - only show errors.
    #[arg(short, long)]
    quiet: bool,
}

/// Initializes the tracing subscriber with the appropriate log level.
fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let mut filter = EnvFilter::from_default_env();
    for target in ["p4locksd", "p4locks_core"] {
        match format!("{}={}", target, level).parse() {
            Ok(directive) => filter = filter.add_directive(directive),
            Err(e) => eprintln!("invalid log directive for {}: {}", target, e),
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// `$LOGS/p4locksd.log` when the log directory exists, else the bare name.
fn default_log_file(logs_dir: Option<&str>) -> PathBuf {
    let dir = Path::new(logs_dir.unwrap_or(DEFAULT_LOGS_DIR));
    if dir.is_dir() {
        dir.join(LOG_FILE_NAME)
    } else {
        PathBuf::from(LOG_FILE_NAME)
    }
}

fn build_config(args: &Args) -> MonitorConfig {
    let log_file = args.log.clone().unwrap_or_else(|| {
        default_log_file(std::env::var("LOGS").ok().as_deref())
    });
    let labels = MetricLabels::for_sdp_instance(
        Path::new(SDP_ROOT),
        args.sdp_instance.as_deref(),
        args.server_id.clone(),
    );
    MonitorConfig::new(&args.metrics_root, log_file)
        .with_metrics_file(&args.metrics_file)
        .with_command_timeout(Duration::from_secs(args.timeout))
        .with_labels(labels)
}

fn build_connection(args: &Args) -> P4Connection {
    P4Connection {
        p4bin: args.p4bin.clone(),
        port: args.p4port.clone(),
        user: args.p4user.clone(),
    }
}

/// Replays a capture file. Returns false if it could not be read.
fn run_replay(config: &MonitorConfig, path: &Path) -> bool {
    match std::fs::read_to_string(path) {
        Ok(capture) => {
            let written = replay(config, &capture);
            if written == 0 {
                warn!("no snapshots found in {}", path.display());
            }
            true
        }
        Err(e) => {
            error!("cannot read test file {}: {}", path.display(), e);
            false
        }
    }
}

fn main() {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    let config = build_config(&args);
    info!("p4locksd {} starting", env!("CARGO_PKG_VERSION"));
    info!(
        "Config: metrics={}, log={}, timeout={}s",
        config.metrics_path().display(),
        config.log_file.display(),
        args.timeout
    );
    debug!("Labels: {:?}", config.labels);

    if let Some(ref path) = args.test_file {
        if !run_replay(&config, path) {
            std::process::exit(1);
        }
        return;
    }

    let collector = LockCollector::new(
        SystemRunner::new(),
        build_connection(&args),
        config.command_timeout,
    );

    let Some(interval) = args.interval.map(Duration::from_secs) else {
        if let Err(e) = run_tick(&collector, &config) {
            error!("Failed to write outputs: {}", e);
            std::process::exit(1);
        }
        return;
    };

    // Setup graceful shutdown
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();

    if let Err(e) = ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        r.store(false, Ordering::SeqCst);
    }) {
        warn!("Failed to set Ctrl-C handler: {}", e);
    }

    info!("Starting collection loop, interval {}s", interval.as_secs());
    let mut tick_count: u64 = 0;

    while running.load(Ordering::SeqCst) {
        tick_count += 1;
        match run_tick(&collector, &config) {
            Ok(analysis) => debug!(
                "Tick #{}: {} blocking roots",
                tick_count,
                analysis.levels.len()
            ),
            Err(e) => error!("Tick #{} failed to write outputs: {}", tick_count, e),
        }

        // Sleep with periodic checks for shutdown signal
        let sleep_interval = Duration::from_millis(100);
        let mut remaining = interval;
        while remaining > Duration::ZERO && running.load(Ordering::SeqCst) {
            let sleep_time = remaining.min(sleep_interval);
            std::thread::sleep(sleep_time);
            remaining = remaining.saturating_sub(sleep_time);
        }
    }

    info!("Shutdown complete after {} ticks", tick_count);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Args {
        let mut argv = vec!["p4locksd"];
        argv.extend_from_slice(args);
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_defaults() {
        let args = parse(&["--p4bin", "p4", "-L", "/tmp/p4locksd.log"]);
        assert_eq!(args.metrics_root, PathBuf::from("/p4/metrics"));
        assert_eq!(args.metrics_file, "locks.prom");
        assert_eq!(args.timeout, 5);
        assert_eq!(args.interval, None);
        assert!(args.test_file.is_none());
    }

    #[test]
    fn test_short_flags() {
        let args = parse(&[
            "-p", "ssl:1666", "-u", "perforce", "-i", "1", "-m", "/tmp/m", "-t", "cap.log", "-vv",
        ]);
        assert_eq!(args.p4port.as_deref(), Some("ssl:1666"));
        assert_eq!(args.p4user.as_deref(), Some("perforce"));
        assert_eq!(args.sdp_instance.as_deref(), Some("1"));
        assert_eq!(args.metrics_root, PathBuf::from("/tmp/m"));
        assert_eq!(args.test_file, Some(PathBuf::from("cap.log")));
        assert_eq!(args.verbose, 2);
    }

    #[test]
    fn test_zero_interval_rejected() {
        assert!(Args::try_parse_from(["p4locksd", "--interval", "0"]).is_err());
    }

    #[test]
    fn test_build_config() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("x.log");
        let args = parse(&[
            "-L",
            log.to_str().unwrap(),
            "-m",
            dir.path().to_str().unwrap(),
            "--metrics-file",
            "p4locks.prom",
            "--server-id",
            "edge.1",
            "-i",
            "1",
            "--timeout",
            "9",
        ]);
        let config = build_config(&args);
        assert_eq!(config.log_file, log);
        assert_eq!(config.metrics_path(), dir.path().join("p4locks.prom"));
        assert_eq!(config.command_timeout, Duration::from_secs(9));
        assert_eq!(
            config.labels,
            MetricLabels::new(Some("edge.1".into()), Some("1".into()))
        );
    }

    #[test]
    fn test_default_log_file() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(
            default_log_file(dir.path().to_str()),
            dir.path().join("p4locksd.log")
        );
        assert_eq!(
            default_log_file(Some("/definitely/not/a/dir")),
            PathBuf::from("p4locksd.log")
        );
    }

    #[test]
    fn test_run_replay() {
        let dir = tempfile::tempdir().unwrap();
        let config = MonitorConfig::new(dir.path(), dir.path().join("monitor.log"));
        let capture = dir.path().join("capture.log");
        std::fs::write(
            &capture,
            "COMMAND PID TYPE SIZE MODE M START END PATH BLOCKER\n\
             p4d 107 FLOCK 16K WRITE 0 0 0 /p4/1/root/db.rev 105\n\
             \n\
             DEBUG 2024-04-03 23:57:02,313 Output:\n\
             107 I fred 00:00:01 sync\n",
        )
        .unwrap();

        assert!(run_replay(&config, &capture));
        let prom = std::fs::read_to_string(config.metrics_path()).unwrap();
        assert!(prom.contains("p4_locks_db_write 1"));
        assert!(prom.contains("p4_locks_cmds_blocked 1"));

        assert!(!run_replay(&config, &dir.path().join("missing.log")));
    }
}
