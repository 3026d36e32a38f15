mod support;

use codegraph_indexer::indexer::pipeline::IndexingRun;
use codegraph_indexer::storage::intermediate::CRASHED_TRANSLATION_UNIT_MESSAGE;
use rstest::rstest;
use support::fixtures::project;
use support::helpers::{open_stable, stored_paths, test_config};
use tempfile::TempDir;

const WORKER_BINARY: &str = env!("CARGO_BIN_EXE_codegraph-indexer");

#[rstest]
fn process_workers_index_project(project: TempDir) {
    let mut config = test_config(project.path());
    config.multi_process = true;
    config.worker_binary = Some(WORKER_BINARY.into());

    let report = IndexingRun::new(config.clone()).run().unwrap();
    assert_eq!(report.files_indexed, 3);
    assert_eq!(report.files_crashed, 0);
    assert!(!report.interrupted);
    assert!(report.store_kept);
    assert_eq!(stored_paths(&config).len(), 3);

    let leftovers: Vec<_> = std::fs::read_dir(&config.shared_data_dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().starts_with("run-"))
        .collect();
    assert!(leftovers.is_empty());
    assert!(config.user_data_dir.join("logs").join("worker-1.log").exists());
}

#[rstest]
fn missing_worker_binary_interrupts_run(project: TempDir) {
    let mut config = test_config(project.path());
    config.multi_process = true;
    config.worker_binary = Some(project.path().join("no-such-worker"));

    let report = IndexingRun::new(config.clone()).run().unwrap();
    assert!(report.interrupted);
    assert_eq!(report.files_indexed, 0);
    assert!(report.store_discarded);
    assert!(!config.db_path.exists());
}

#[cfg(unix)]
#[rstest]
fn failing_worker_processes_exhaust_restart_budget(project: TempDir) {
    let mut config = test_config(project.path());
    config.multi_process = true;
    config.worker_binary = Some("/bin/false".into());
    config.max_worker_restarts = 1;

    let report = IndexingRun::new(config).run().unwrap();
    assert!(report.interrupted);
    assert_eq!(report.files_indexed, 0);
    assert_eq!(report.worker_restarts, 2);
}

/// Worker wrapper whose first instance claims a file and is then killed.
/// Every later instance runs the real worker.
#[cfg(unix)]
fn write_dying_worker(dir: &std::path::Path) -> std::path::PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let marker = dir.join("killed-once");
    let script = dir.join("dying-worker.sh");
    let body = format!(
        r#"#!/bin/sh
if mkdir "{marker}" 2>/dev/null; then
  printf '{{"op":"hello","worker_id":%s,"run_id":"%s"}}\n' "$2" "$3"
  read -r reply || exit 1
  while :; do
    printf '{{"op":"poll"}}\n'
    read -r reply || exit 1
    case "$reply" in
      *'"kind":"command"'*) kill -9 $$ ;;
      *'"kind":"drained"'*) exit 1 ;;
    esac
    sleep 0.01
  done
fi
exec "{binary}" "$@"
"#,
        marker = marker.display(),
        binary = WORKER_BINARY,
    );
    std::fs::write(&script, body).unwrap();
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
    script
}

#[cfg(unix)]
#[rstest]
fn killed_worker_process_loses_only_its_file(project: TempDir) {
    let scripts = tempfile::tempdir().unwrap();
    let mut config = test_config(project.path());
    config.multi_process = true;
    config.worker_binary = Some(write_dying_worker(scripts.path()));

    let report = IndexingRun::new(config.clone()).run().unwrap();
    assert!(!report.interrupted);
    assert!(report.store_kept);
    assert_eq!(report.files_total, 3);
    assert_eq!(report.files_crashed, 1);
    assert_eq!(report.files_indexed, 2);

    let errors = open_stable(&config).error_rows().unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].message, CRASHED_TRANSLATION_UNIT_MESSAGE);
    assert!(errors[0].fatal);
    assert_eq!(stored_paths(&config).len(), 3);
}

#[test]
fn worker_refuses_unknown_run() {
    let dir = tempfile::tempdir().unwrap();
    let status = std::process::Command::new(WORKER_BINARY)
        .arg("worker")
        .arg("1")
        .arg("does-not-exist")
        .arg(dir.path().join("shared"))
        .arg(dir.path().join("user"))
        .status()
        .unwrap();
    assert_eq!(status.code(), Some(2));
}
