//! CLI argument parsing and help text

use anyhow::{anyhow, bail, Context, Result};
use std::path::PathBuf;

use crate::indexer::worker::WorkerArgs;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliCommand {
    Help,
    Version,
    /// Index the project configured through the environment.
    Index,
    Worker(WorkerArgs),
}

pub fn wants_help(args: &[String]) -> bool {
    args.iter()
        .skip(1)
        .any(|a| a == "-h" || a == "--help" || a == "help")
}

pub fn wants_version(args: &[String]) -> bool {
    args.iter()
        .skip(1)
        .any(|a| a == "-V" || a == "--version" || a == "version")
}

/// `args[0]` is the program name.
pub fn parse_args(args: &[String]) -> Result<CliCommand> {
    match args.get(1).map(String::as_str) {
        Some("worker") => parse_worker_args(&args[2..]).map(CliCommand::Worker),
        _ if wants_help(args) => Ok(CliCommand::Help),
        _ if wants_version(args) => Ok(CliCommand::Version),
        None | Some("index") => Ok(CliCommand::Index),
        Some(other) => bail!("Unknown command: {other} (see --help)"),
    }
}

fn parse_worker_args(args: &[String]) -> Result<WorkerArgs> {
    if !(4..=5).contains(&args.len()) {
        bail!(
            "worker expects <id> <run-id> <shared-dir> <user-dir> [log-path], got {} arguments",
            args.len()
        );
    }
    let worker_id: usize = args[0]
        .parse()
        .with_context(|| format!("Invalid worker id: {}", args[0]))?;
    if worker_id == 0 {
        return Err(anyhow!("Worker id 0 is reserved for the orchestrator"));
    }
    Ok(WorkerArgs {
        worker_id,
        run_id: args[1].clone(),
        shared_data_dir: PathBuf::from(&args[2]),
        user_data_dir: PathBuf::from(&args[3]),
        log_path: args.get(4).map(PathBuf::from),
    })
}

pub fn print_help() {
    println!("codegraph-indexer");
    println!();
    println!("Builds a code graph of a source tree with parallel workers.");
    println!();
    println!("Usage:");
    println!("  codegraph-indexer [index]");
    println!("  codegraph-indexer worker <id> <run-id> <shared-dir> <user-dir> [log-path]");
    println!("  codegraph-indexer --help");
    println!("  codegraph-indexer --version");
    println!();
    println!("Required env:");
    println!("  BASE_DIR=/absolute/path/to/repo");
    println!();
    println!("Common env (defaults shown):");
    println!("  DB_PATH=./.cgidx/codegraph.db           (resolved under BASE_DIR if relative)");
    println!("  TEMP_DB_PATH=<DB_PATH>.tmp");
    println!("  SHARED_DATA_DIR=./.cgidx/shared");
    println!("  USER_DATA_DIR=./.cgidx/user");
    println!("  PARALLEL_WORKERS=<cpu count>");
    println!("  MULTI_PROCESS=true|false                (default: true)");
    println!("  WORKER_BINARY=/path/to/binary           (default: this executable)");
    println!("  MAX_WORKER_RESTARTS=3");
    println!("  STORAGE_PROVIDER_THRESHOLD=10");
    println!("  POLL_INTERVAL_MS=25");
    println!("  QUEUE_BATCH_SIZE=20");
    println!("  REFRESH_MODE=none|updated|updated_incomplete|all (default: updated_incomplete)");
    println!("  SHALLOW_INDEX=true|false                (default: false)");
    println!("  ON_INTERRUPT=keep|discard               (default: discard)");
    println!("  INDEX_PATTERNS / EXCLUDE_PATTERNS       (comma separated globs)");
    println!("  COMPILER_FLAGS=-DFOO,-Iinclude");
    println!("  PROJECT_SETTINGS_PATH=./.cgidx/project.toml");
    println!("  METRICS_PATH=/path/to/metrics.prom");
    println!();
    println!("Ctrl-C stops indexing; finished work is kept or discarded per ON_INTERRUPT.");
}

pub fn print_version() {
    println!("{}", env!("CARGO_PKG_VERSION"));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn wants_help_and_version_detect_common_flags() {
        assert!(wants_help(&argv(&["bin", "--help"])));
        assert!(wants_help(&argv(&["bin", "-h"])));
        assert!(wants_version(&argv(&["bin", "--version"])));
        assert!(wants_version(&argv(&["bin", "-V"])));
        assert!(!wants_help(&argv(&["bin"])));
        assert!(!wants_version(&argv(&["bin"])));
    }

    #[test]
    fn parses_index_and_worker_commands() {
        assert_eq!(parse_args(&argv(&["bin"])).unwrap(), CliCommand::Index);
        assert_eq!(parse_args(&argv(&["bin", "index"])).unwrap(), CliCommand::Index);
        assert_eq!(parse_args(&argv(&["bin", "--help"])).unwrap(), CliCommand::Help);

        let cmd = parse_args(&argv(&["bin", "worker", "2", "abc", "/s", "/u", "/l.log"])).unwrap();
        assert_eq!(
            cmd,
            CliCommand::Worker(WorkerArgs {
                worker_id: 2,
                run_id: "abc".into(),
                shared_data_dir: "/s".into(),
                user_data_dir: "/u".into(),
                log_path: Some("/l.log".into()),
            })
        );
    }

    #[test]
    fn worker_arguments_round_trip() {
        let args = WorkerArgs {
            worker_id: 3,
            run_id: "r".into(),
            shared_data_dir: "/s".into(),
            user_data_dir: "/u".into(),
            log_path: None,
        };
        let mut argv = vec!["bin".to_string()];
        argv.extend(args.to_args());
        assert_eq!(parse_args(&argv).unwrap(), CliCommand::Worker(args));
    }

    #[test]
    fn rejects_bad_worker_arguments() {
        assert!(parse_args(&argv(&["bin", "worker", "1", "abc"])).is_err());
        assert!(parse_args(&argv(&["bin", "worker", "x", "abc", "/s", "/u"])).is_err());
        assert!(parse_args(&argv(&["bin", "worker", "0", "abc", "/s", "/u"])).is_err());
        assert!(parse_args(&argv(&["bin", "frobnicate"])).is_err());
    }
}
