use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use atlas_config::AtlasLayout;
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Where the process logs, once resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogTarget {
    File(PathBuf),
    Stderr,
}

/// Pick the log destination: explicit flag, then config, then the theory's
/// atlas directory when it already exists, else stderr.
pub fn resolve_target(
    flag: Option<&Path>,
    configured: Option<&Path>,
    layout: Option<&AtlasLayout>,
) -> LogTarget {
    if let Some(path) = flag.or(configured) {
        return LogTarget::File(path.to_path_buf());
    }
    match layout {
        Some(layout) if layout.dir().is_dir() => LogTarget::File(layout.log_file()),
        _ => LogTarget::Stderr,
    }
}

/// An explicit filter must parse; otherwise `RUST_LOG`, else `info`.
pub fn env_filter(level: Option<&str>) -> Result<EnvFilter, ParseError> {
    match level {
        Some(level) => EnvFilter::try_new(level),
        None => Ok(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))),
    }
}

/// Install the global subscriber. Returns the target actually used, which
/// falls back to stderr when the log file cannot be opened.
pub fn init_tracing(filter: EnvFilter, target: LogTarget) -> LogTarget {

    let mut warnings = Vec::new();
    if let LogTarget::File(path) = &target {
        match open_log_file(path) {
            Ok(file) => {
                tracing_subscriber::registry()
                    .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
                    .with(filter)
                    .init();
                tracing::debug!(path = %path.display(), "Logging initialized");
                return target;
            }
            Err(e) => warnings.push(format!("Failed to open log file {}: {e}", path.display())),
        }
    }

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
    for warning in warnings {
        tracing::warn!("{warning}");
    }
    LogTarget::Stderr
}

/// Append mode, so every process of one session can share the file.
fn open_log_file(path: &Path) -> std::io::Result<File> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};

    use atlas_config::AtlasLayout;

    use super::{LogTarget, env_filter, resolve_target};

    #[test]
    fn explicit_filters_must_parse() {
        assert!(env_filter(Some("debug")).is_ok());
        assert!(env_filter(Some("atlas_core=trace,info")).is_ok());
        assert!(env_filter(Some("atlas_core=loud")).is_err());
    }

    #[test]
    fn flag_beats_config_beats_default() {
        let dir = tempfile::tempdir().expect("tempdir");
        let layout = AtlasLayout::at(dir.path());
        let flag = Path::new("/tmp/flag.log");
        let configured = Path::new("/tmp/config.log");

        assert_eq!(
            resolve_target(Some(flag), Some(configured), Some(&layout)),
            LogTarget::File(PathBuf::from("/tmp/flag.log"))
        );
        assert_eq!(
            resolve_target(None, Some(configured), Some(&layout)),
            LogTarget::File(PathBuf::from("/tmp/config.log"))
        );
        assert_eq!(
            resolve_target(None, None, Some(&layout)),
            LogTarget::File(layout.log_file())
        );
    }

    #[test]
    fn missing_atlas_dir_logs_to_stderr() {
        let dir = tempfile::tempdir().expect("tempdir");
        let layout = AtlasLayout::at(dir.path().join("sk"));
        assert_eq!(resolve_target(None, None, Some(&layout)), LogTarget::Stderr);
        assert_eq!(resolve_target(None, None, None), LogTarget::Stderr);
    }
}
