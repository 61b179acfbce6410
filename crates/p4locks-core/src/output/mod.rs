//! Output artifacts: the Prometheus metrics file and the diagnostic log.

mod prometheus;
mod report;

pub use prometheus::format_metrics;
pub use report::{format_blockers, format_messages, timestamp_prefix};

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::debug;

/// Error type for writing outputs.
#[derive(Debug)]
pub enum OutputError {
    /// I/O error creating or writing a file.
    Io(PathBuf, io::Error),
    /// Renaming the finished temporary file into place failed.
    Persist(PathBuf, io::Error),
}

impl std::fmt::Display for OutputError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputError::Io(path, e) => write!(f, "I/O error on {}: {}", path.display(), e),
            OutputError::Persist(path, e) => {
                write!(f, "cannot move metrics into {}: {}", path.display(), e)
            }
        }
    }
}

impl std::error::Error for OutputError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            OutputError::Io(_, e) | OutputError::Persist(_, e) => Some(e),
        }
    }
}

/// Writes `lines` to `path` so that readers only ever see a complete file.
///
/// The content goes to a temporary file in the same directory, which is then
/// renamed over `path`. The temporary file is removed if anything fails.
pub fn write_metrics_file(path: &Path, lines: &[String]) -> Result<(), OutputError> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let io_err = |e| OutputError::Io(path.to_path_buf(), e);

    let mut tmp = NamedTempFile::new_in(dir).map_err(io_err)?;
    for line in lines {
        writeln!(tmp, "{}", line).map_err(io_err)?;
    }
    tmp.as_file().sync_all().map_err(io_err)?;

    // NamedTempFile is created 0600; scrapers often run as another user.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(tmp.path(), std::fs::Permissions::from_mode(0o644))
            .map_err(io_err)?;
    }

    tmp.persist(path)
        .map_err(|e| OutputError::Persist(path.to_path_buf(), e.error))?;
    debug!("wrote {} metric lines to {}", lines.len(), path.display());
    Ok(())
}

/// Appends `lines` to the diagnostic log, creating it if needed.
pub fn append_log(path: &Path, lines: &[String]) -> Result<(), OutputError> {
    if lines.is_empty() {
        return Ok(());
    }
    let io_err = |e| OutputError::Io(path.to_path_buf(), e);

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(io_err)?;

    let mut buf = String::new();
    for line in lines {
        buf.push_str(line);
        buf.push('\n');
    }
    file.write_all(buf.as_bytes()).map_err(io_err)
}
