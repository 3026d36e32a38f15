//! Worker side of indexing plus the per-slot supervisors that keep workers
//! alive on the orchestrator side.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::io::{self, BufReader};
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::command::IndexerCommand;
use super::frontend::{ParserFrontend, TreeSitterFrontend};
use crate::ipc::protocol::{read_message, serve_request, write_message, ReplyBody, Request};
use crate::ipc::{Coordinator, LocalLink, PipeLink, Pop, WorkerLink, WorkerStatus};
use crate::logging;
use crate::metrics::MetricsRegistry;
use crate::storage::intermediate::IntermediateStorage;

pub const EXIT_OK: i32 = 0;
pub const EXIT_FAILURE: i32 = 1;
pub const EXIT_UNKNOWN_RUN: i32 = 2;

/// Describes a run to the worker processes started for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunManifest {
    pub run_id: String,
    pub poll_interval_ms: u64,
    pub created_at_unix_s: i64,
}

impl RunManifest {
    pub fn new(run_id: &str, poll_interval: Duration) -> Self {
        Self {
            run_id: run_id.to_string(),
            poll_interval_ms: poll_interval.as_millis().max(1) as u64,
            created_at_unix_s: unix_now_s(),
        }
    }

    pub fn path_for(shared_data_dir: &Path, run_id: &str) -> PathBuf {
        shared_data_dir.join(format!("run-{run_id}.json"))
    }

    pub fn write(&self, shared_data_dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(shared_data_dir).with_context(|| {
            format!("Failed to create shared data dir: {}", shared_data_dir.display())
        })?;
        let path = Self::path_for(shared_data_dir, &self.run_id);
        let json = serde_json::to_vec_pretty(self).context("Failed to encode run manifest")?;
        std::fs::write(&path, json)
            .with_context(|| format!("Failed to write run manifest: {}", path.display()))?;
        Ok(path)
    }

    pub fn read(shared_data_dir: &Path, run_id: &str) -> Result<Self> {
        let path = Self::path_for(shared_data_dir, run_id);
        let raw = std::fs::read(&path)
            .with_context(|| format!("Unknown run {run_id}: {}", path.display()))?;
        let manifest: Self = serde_json::from_slice(&raw)
            .with_context(|| format!("Invalid run manifest: {}", path.display()))?;
        anyhow::ensure!(
            manifest.run_id == run_id,
            "Run manifest {} belongs to run {}",
            path.display(),
            manifest.run_id
        );
        Ok(manifest)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

pub fn unix_now_s() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .ok()
        .and_then(|d| i64::try_from(d.as_secs()).ok())
        .unwrap_or(0)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerSummary {
    pub files_indexed: usize,
    pub interrupted: bool,
}

/// Indexes one command. Front-end failures become a recorded error for the
/// translation unit instead of ending the worker.
pub fn index_command(frontend: &dyn ParserFrontend, command: &IndexerCommand) -> IntermediateStorage {
    match frontend.index(command) {
        Ok(storage) => storage,
        Err(err) => {
            tracing::warn!(
                file = %command.source_file_path.display(),
                error = %err,
                "Failed to index translation unit"
            );
            IntermediateStorage::for_translation_unit_error(
                &command.source_file_path,
                &format!("{err:#}"),
            )
        }
    }
}

/// Pulls commands until the queue is drained or an interrupt is observed.
pub fn worker_loop<L: WorkerLink + ?Sized>(
    link: &mut L,
    frontend: &dyn ParserFrontend,
    poll_interval: Duration,
) -> Result<WorkerSummary> {
    let worker_id = link.worker_id();
    let mut summary = WorkerSummary::default();
    loop {
        if link.is_interrupted()? {
            summary.interrupted = true;
            tracing::info!(worker_id, "Worker observed interruption");
            break;
        }
        match link.poll_command()? {
            Pop::Command(command) => {
                let path = command.source_file_path.clone();
                tracing::debug!(worker_id, file = %path.display(), "Indexing file");
                let storage = index_command(frontend, &command);
                link.push_result(storage)?;
                link.finish_file(&path)?;
                summary.files_indexed += 1;
            }
            Pop::Wait => thread::sleep(poll_interval),
            Pop::Drained => break,
        }
    }
    link.finish()?;
    tracing::info!(worker_id, files = summary.files_indexed, "Worker finished");
    Ok(summary)
}

/// Positional arguments of the worker process entry point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerArgs {
    pub worker_id: usize,
    pub run_id: String,
    pub shared_data_dir: PathBuf,
    pub user_data_dir: PathBuf,
    pub log_path: Option<PathBuf>,
}

impl WorkerArgs {
    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec![
            "worker".to_string(),
            self.worker_id.to_string(),
            self.run_id.clone(),
            self.shared_data_dir.to_string_lossy().to_string(),
            self.user_data_dir.to_string_lossy().to_string(),
        ];
        if let Some(log) = &self.log_path {
            args.push(log.to_string_lossy().to_string());
        }
        args
    }
}

/// Process entry point. Returns the exit code.
pub fn run_worker(args: &WorkerArgs) -> i32 {
    let log_path = args
        .log_path
        .clone()
        .unwrap_or_else(|| logging::worker_log_path(&args.user_data_dir, args.worker_id));
    let _guard = logging::init_worker_logging(&log_path);

    let manifest = match RunManifest::read(&args.shared_data_dir, &args.run_id) {
        Ok(m) => m,
        Err(err) => {
            tracing::error!(worker_id = args.worker_id, error = %err, "Refusing to start");
            return EXIT_UNKNOWN_RUN;
        }
    };

    let reader = io::stdin().lock();
    let writer = io::stdout().lock();
    let mut link = match PipeLink::connect(reader, writer, args.worker_id, &args.run_id) {
        Ok(link) => link,
        Err(err) => {
            tracing::error!(worker_id = args.worker_id, error = %err, "Failed to connect to supervisor");
            return EXIT_FAILURE;
        }
    };

    let frontend = TreeSitterFrontend::new();
    match worker_loop(&mut link, &frontend, manifest.poll_interval()) {
        Ok(_) => EXIT_OK,
        Err(err) => {
            tracing::error!(worker_id = args.worker_id, error = %err, "Worker failed");
            EXIT_FAILURE
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotOutcome {
    Finished,
    Crashed,
    MissingBinary,
}

#[derive(Clone)]
pub struct SlotSettings {
    pub worker_id: usize,
    pub max_restarts: u32,
    pub poll_interval: Duration,
    pub metrics: Option<Arc<MetricsRegistry>>,
}

/// Everything needed to launch a worker process.
#[derive(Debug, Clone)]
pub struct ProcessWorkerSpec {
    pub binary: PathBuf,
    pub shared_data_dir: PathBuf,
    pub user_data_dir: PathBuf,
}

/// Books a worker that went away. Returns whether the slot should restart.
fn handle_crash(coordinator: &Coordinator, settings: &SlotSettings) -> bool {
    let worker_id = settings.worker_id;
    let lost = coordinator.status().take_in_flight(worker_id);
    if let Some(m) = &settings.metrics {
        m.worker_crashes.inc();
    }
    for file in &lost {
        tracing::warn!(worker_id, file = %file.display(), "Worker crashed while indexing file");
    }

    if coordinator.queue().is_drained() || coordinator.status().is_interrupted() {
        coordinator.status().set_status(worker_id, WorkerStatus::Crashed);
        return false;
    }

    let restarts = coordinator.status().restart_count(worker_id);
    if restarts >= settings.max_restarts {
        tracing::error!(worker_id, restarts, "Worker exceeded its restart budget");
        coordinator.status().set_status(worker_id, WorkerStatus::Crashed);
        return false;
    }
    let attempt = coordinator.status().note_restart(worker_id);
    if let Some(m) = &settings.metrics {
        m.worker_restarts.inc();
    }
    tracing::info!(worker_id, attempt, "Restarting worker");
    true
}

pub fn spawn_thread_worker(
    coordinator: Arc<Coordinator>,
    frontend: Arc<dyn ParserFrontend>,
    settings: SlotSettings,
) -> Result<JoinHandle<SlotOutcome>> {
    let worker_id = settings.worker_id;
    thread::Builder::new()
        .name(format!("index-worker-{worker_id}"))
        .spawn(move || loop {
            coordinator.status().set_status(worker_id, WorkerStatus::Running);
            let mut link = LocalLink::new(coordinator.clone(), worker_id);
            let result = panic::catch_unwind(AssertUnwindSafe(|| {
                worker_loop(&mut link, frontend.as_ref(), settings.poll_interval)
            }));
            match result {
                Ok(Ok(_)) => {
                    coordinator
                        .status()
                        .set_status(worker_id, WorkerStatus::Finished);
                    return SlotOutcome::Finished;
                }
                Ok(Err(err)) => {
                    tracing::warn!(worker_id, error = %err, "Worker thread failed");
                }
                Err(_) => {
                    tracing::warn!(worker_id, "Worker thread panicked");
                }
            }
            if !handle_crash(&coordinator, &settings) {
                return SlotOutcome::Crashed;
            }
        })
        .context("Failed to spawn worker thread")
}

pub fn spawn_process_worker(
    coordinator: Arc<Coordinator>,
    spec: Arc<ProcessWorkerSpec>,
    settings: SlotSettings,
) -> Result<JoinHandle<SlotOutcome>> {
    let worker_id = settings.worker_id;
    thread::Builder::new()
        .name(format!("index-supervisor-{worker_id}"))
        .spawn(move || loop {
            let args = WorkerArgs {
                worker_id,
                run_id: coordinator.run_id().to_string(),
                shared_data_dir: spec.shared_data_dir.clone(),
                user_data_dir: spec.user_data_dir.clone(),
                log_path: None,
            };
            let mut command = Command::new(&spec.binary);
            command
                .args(args.to_args())
                .stdin(Stdio::piped())
                .stdout(Stdio::piped())
                .stderr(Stdio::inherit());
            // Keep terminal Ctrl-C away from workers; the orchestrator
            // forwards interruption through the protocol.
            #[cfg(unix)]
            std::os::unix::process::CommandExt::process_group(&mut command, 0);
            let spawned = command.spawn();
            let mut child = match spawned {
                Ok(child) => child,
                Err(err)
                    if matches!(
                        err.kind(),
                        io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied
                    ) =>
                {
                    tracing::error!(
                        worker_id,
                        binary = %spec.binary.display(),
                        error = %err,
                        "Worker executable is missing"
                    );
                    coordinator.status().set_interrupted(true);
                    coordinator.queue().clear();
                    coordinator
                        .status()
                        .set_status(worker_id, WorkerStatus::Crashed);
                    return SlotOutcome::MissingBinary;
                }
                Err(err) => {
                    tracing::warn!(worker_id, error = %err, "Failed to start worker process");
                    if !handle_crash(&coordinator, &settings) {
                        return SlotOutcome::Crashed;
                    }
                    thread::sleep(settings.poll_interval);
                    continue;
                }
            };

            let served = serve_child(&coordinator, worker_id, &mut child);
            let exit = child.wait();
            let clean_exit = exit.as_ref().is_ok_and(|s| s.success());
            match &served {
                Ok(true) if clean_exit => {
                    coordinator
                        .status()
                        .set_status(worker_id, WorkerStatus::Finished);
                    return SlotOutcome::Finished;
                }
                Ok(_) => {
                    tracing::warn!(worker_id, exit = ?exit, "Worker process ended abnormally");
                }
                Err(err) => {
                    tracing::warn!(worker_id, exit = ?exit, error = %err, "Lost connection to worker process");
                }
            }
            if !handle_crash(&coordinator, &settings) {
                return SlotOutcome::Crashed;
            }
        })
        .context("Failed to spawn worker supervisor")
}

/// Answers the child's requests until it says it is done or its stdout
/// closes. Returns whether the child finished cleanly.
fn serve_child(coordinator: &Coordinator, worker_id: usize, child: &mut Child) -> Result<bool> {
    let stdout = child
        .stdout
        .take()
        .context("Worker process has no stdout pipe")?;
    let mut stdin = child
        .stdin
        .take()
        .context("Worker process has no stdin pipe")?;
    let mut reader = BufReader::new(stdout);

    while let Some(request) = read_message::<_, Request>(&mut reader)? {
        let is_hello = matches!(request, Request::Hello { .. });
        let is_done = matches!(request, Request::Done);
        let reply = serve_request(coordinator, worker_id, request);
        if is_hello && reply.body == ReplyBody::Ack {
            coordinator
                .status()
                .set_status(worker_id, WorkerStatus::Running);
        }
        write_message(&mut stdin, &reply)?;
        if is_done {
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipc::WorkerStatus;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Front-end that panics on paths containing "crash" and records a
    /// single node otherwise.
    struct ScriptedFrontend {
        calls: AtomicUsize,
    }

    impl ParserFrontend for ScriptedFrontend {
        fn index(&self, command: &IndexerCommand) -> Result<IntermediateStorage> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let path = command.source_file_path.to_string_lossy().to_string();
            if path.contains("crash") {
                panic!("scripted crash");
            }
            if path.contains("bad") {
                anyhow::bail!("cannot parse");
            }
            let mut s = IntermediateStorage::new();
            s.add_file(crate::storage::intermediate::StorageFile {
                id: 0,
                path: command.source_file_path.clone(),
                language: "rust".into(),
                modification_time: 0,
                content_hash: "h".into(),
                indexed: true,
                complete: true,
            });
            Ok(s)
        }
    }

    fn frontend() -> Arc<ScriptedFrontend> {
        Arc::new(ScriptedFrontend {
            calls: AtomicUsize::new(0),
        })
    }

    fn settings(worker_id: usize, max_restarts: u32) -> SlotSettings {
        SlotSettings {
            worker_id,
            max_restarts,
            poll_interval: Duration::from_millis(1),
            metrics: None,
        }
    }

    #[test]
    fn loop_drains_queue_and_records_front_end_errors() {
        let coordinator = Coordinator::new("run", 8);
        coordinator.status().register(1);
        for p in ["a.rs", "bad.rs"] {
            coordinator.queue().push(IndexerCommand::new(p, "/")).unwrap();
        }
        coordinator.queue().set_stopped();

        let mut link = LocalLink::new(coordinator.clone(), 1);
        let fe = frontend();
        let summary = worker_loop(&mut link, fe.as_ref(), Duration::from_millis(1)).unwrap();
        assert_eq!(summary.files_indexed, 2);
        let results = coordinator.drain_results(usize::MAX);
        assert_eq!(results.len(), 2);
        assert_eq!(results.iter().map(|s| s.errors().len()).sum::<usize>(), 1);
    }

    #[test]
    fn loop_stops_on_interrupt() {
        let coordinator = Coordinator::new("run", 8);
        coordinator.status().register(1);
        coordinator.queue().push(IndexerCommand::new("a.rs", "/")).unwrap();
        coordinator.status().set_interrupted(true);

        let mut link = LocalLink::new(coordinator.clone(), 1);
        let summary = worker_loop(&mut link, frontend().as_ref(), Duration::from_millis(1)).unwrap();
        assert!(summary.interrupted);
        assert_eq!(summary.files_indexed, 0);
    }

    #[test]
    fn panicking_thread_worker_is_restarted_and_crash_is_recorded() {
        let coordinator = Coordinator::new("run", 8);
        coordinator.status().register(1);
        for p in ["crash.rs", "ok.rs"] {
            coordinator.queue().push(IndexerCommand::new(p, "/")).unwrap();
        }
        coordinator.queue().set_stopped();

        let handle = spawn_thread_worker(coordinator.clone(), frontend(), settings(1, 3)).unwrap();
        assert_eq!(handle.join().unwrap(), SlotOutcome::Finished);
        assert_eq!(coordinator.status().status(1), Some(WorkerStatus::Finished));
        assert_eq!(
            coordinator.status().take_crashed_files(),
            vec![PathBuf::from("crash.rs")]
        );
        assert_eq!(coordinator.pending_results(), 1);
        assert_eq!(coordinator.status().total_restarts(), 1);
    }

    #[test]
    fn restart_budget_bounds_crash_loops() {
        let coordinator = Coordinator::new("run", 8);
        coordinator.status().register(1);
        for p in ["crash-1.rs", "crash-2.rs", "crash-3.rs", "ok.rs"] {
            coordinator.queue().push(IndexerCommand::new(p, "/")).unwrap();
        }
        coordinator.queue().set_stopped();

        let handle = spawn_thread_worker(coordinator.clone(), frontend(), settings(1, 1)).unwrap();
        assert_eq!(handle.join().unwrap(), SlotOutcome::Crashed);
        assert_eq!(coordinator.status().status(1), Some(WorkerStatus::Crashed));
        assert_eq!(coordinator.status().crashed_file_count(), 2);
        assert_eq!(coordinator.status().total_restarts(), 1);
        assert_eq!(coordinator.queue().len(), 2);
    }

    #[test]
    fn file_claimed_by_a_worker_lost_before_indexing_is_recorded_crashed() {
        let coordinator = Coordinator::new("run", 8);
        coordinator.status().register(1);
        coordinator
            .queue()
            .push(IndexerCommand::new("victim.rs", "/"))
            .unwrap();
        coordinator.queue().set_stopped();

        let reply = serve_request(&coordinator, 1, Request::Poll);
        assert!(matches!(reply.body, ReplyBody::Command { .. }));
        assert!(!handle_crash(&coordinator, &settings(1, 3)));
        assert_eq!(
            coordinator.status().take_crashed_files(),
            vec![PathBuf::from("victim.rs")]
        );
        assert_eq!(coordinator.status().processed_file_count(), 1);
    }

    #[test]
    fn missing_binary_interrupts_the_run() {
        let coordinator = Coordinator::new("run", 8);
        coordinator.status().register(1);
        coordinator.queue().push(IndexerCommand::new("a.rs", "/")).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let spec = Arc::new(ProcessWorkerSpec {
            binary: dir.path().join("no-such-worker"),
            shared_data_dir: dir.path().join("shared"),
            user_data_dir: dir.path().join("user"),
        });
        let handle = spawn_process_worker(coordinator.clone(), spec, settings(1, 3)).unwrap();
        assert_eq!(handle.join().unwrap(), SlotOutcome::MissingBinary);
        assert!(coordinator.status().is_interrupted());
        assert!(coordinator.queue().is_empty());
    }

    #[test]
    fn manifest_round_trip_and_unknown_run() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = RunManifest::new("abc", Duration::from_millis(10));
        let path = manifest.write(dir.path()).unwrap();
        assert!(path.ends_with("run-abc.json"));
        assert_eq!(RunManifest::read(dir.path(), "abc").unwrap(), manifest);
        assert!(RunManifest::read(dir.path(), "other").is_err());
    }

    #[test]
    fn unknown_run_exits_with_code_two() {
        let dir = tempfile::tempdir().unwrap();
        let args = WorkerArgs {
            worker_id: 1,
            run_id: "missing".into(),
            shared_data_dir: dir.path().join("shared"),
            user_data_dir: dir.path().join("user"),
            log_path: Some(dir.path().join("worker.log")),
        };
        assert_eq!(run_worker(&args), EXIT_UNKNOWN_RUN);
    }
}
