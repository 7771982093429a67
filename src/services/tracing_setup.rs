//! Tracing subscriber setup
//!
//! The terminal belongs to the console UI, so diagnostics go to a log file.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// Log file used when none is given: `{temp_dir}/serial-console-{PID}.log`
pub fn default_log_path() -> PathBuf {
    std::env::temp_dir().join(format!("serial-console-{}.log", std::process::id()))
}

/// Initialize the global tracing subscriber, logging to `log_file_path`.
///
/// Filtering follows `RUST_LOG`, with DEBUG as the default level.
pub fn init_global(log_file_path: &Path) -> std::io::Result<()> {
    let log_file = File::create(log_file_path)?;
    build_subscriber(log_file).init();
    Ok(())
}

/// Build a subscriber writing formatted events to `log_file`.
pub fn build_subscriber(log_file: File) -> impl tracing::Subscriber + Send + Sync {
    let env_filter = EnvFilter::builder()
        .with_default_directive(tracing::Level::DEBUG.into())
        .from_env_lossy();

    let fmt_layer = fmt::layer()
        .with_ansi(false)
        .with_writer(Arc::new(log_file));

    tracing_subscriber::registry().with(fmt_layer).with(env_filter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_events_reach_log_file() {
        let log_file = NamedTempFile::new().unwrap();
        let subscriber = build_subscriber(log_file.reopen().unwrap());

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("console attached");
            tracing::warn!("device closed");
        });

        let contents = std::fs::read_to_string(log_file.path()).unwrap();
        assert!(contents.contains("console attached"));
        assert!(contents.contains("WARN"));
        assert!(contents.contains("device closed"));
    }

    #[test]
    fn test_default_log_path_is_per_process() {
        let path = default_log_path();
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("serial-console-"));
        assert!(name.contains(&std::process::id().to_string()));
    }
}
