//! Subscriber setup for the orchestrator and for worker processes.

use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Orchestrator logging: human readable, on stderr.
pub fn init_cli_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(std::io::stderr)
        .try_init();
}

/// Default log file of a worker process.
pub fn worker_log_path(user_data_dir: &Path, worker_id: usize) -> PathBuf {
    user_data_dir.join("logs").join(format!("worker-{worker_id}.log"))
}

/// Worker logging goes to a file only; stdout carries the protocol.
/// Returns the guard that must be kept alive for the process lifetime.
pub fn init_worker_logging(log_path: &Path) -> Option<WorkerGuard> {
    let dir = log_path.parent()?;
    let file_name = log_path.file_name()?;
    if std::fs::create_dir_all(dir).is_err() {
        return None;
    }

    let file_appender = tracing_appender::rolling::never(dir, file_name);
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_target(true)
        .with_ansi(false)
        .with_writer(file_writer)
        .try_init()
        .ok()?;

    Some(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_logs_live_under_user_dir() {
        let path = worker_log_path(Path::new("/data/user"), 3);
        assert_eq!(path, PathBuf::from("/data/user/logs/worker-3.log"));
    }
}
