//! Tracing setup. Play mode owns the terminal, so logs go to a file.

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

/// Install a file-backed `fmt` subscriber.
///
/// `RUST_LOG` wins over `level`, which defaults to `info`. Safe to call more
/// than once; only the first call installs anything. Logging is optional, so a
/// log file that cannot be opened just leaves tracing disabled.
pub fn init_tracing(log_path: &Path, level: Option<&str>) {
    if let Some(parent) = log_path.parent() {
        if std::fs::create_dir_all(parent).is_err() {
            return;
        }
    }
    let Ok(file) = OpenOptions::new().create(true).append(true).open(log_path) else {
        return;
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.unwrap_or("info")));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_thread_names(true)
        .try_init();
}
