use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::{
    env,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::indexer::command::RefreshMode;

pub const DEFAULT_INDEX_PATTERNS: &[&str] = &[
    "**/*.rs",
    "**/*.py",
    "**/*.go",
    "**/*.java",
    "**/*.c",
    "**/*.h",
    "**/*.cc",
    "**/*.cpp",
    "**/*.hpp",
    "**/*.js",
    "**/*.jsx",
    "**/*.ts",
    "**/*.tsx",
];

pub const DEFAULT_EXCLUDE_PATTERNS: &[&str] = &["**/target/**", "**/node_modules/**", "**/.git/**"];

const FALLBACK_WORKERS: usize = 4;

/// What happens to the working store when a run is interrupted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnInterrupt {
    Keep,
    Discard,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub base_dir: PathBuf,
    pub db_path: PathBuf,
    pub temp_db_path: PathBuf,
    pub shared_data_dir: PathBuf,
    pub user_data_dir: PathBuf,
    pub index_patterns: Vec<String>,
    pub exclude_patterns: Vec<String>,
    pub parallel_workers: usize,
    pub multi_process: bool,
    pub worker_binary: Option<PathBuf>,
    pub max_worker_restarts: u32,
    pub storage_provider_threshold: usize,
    pub poll_interval_ms: u64,
    pub queue_batch_size: usize,
    pub refresh_mode: RefreshMode,
    pub shallow_index: bool,
    pub on_interrupt: OnInterrupt,
    pub compiler_flags: Vec<String>,
    pub project_settings_path: PathBuf,
    pub metrics_path: Option<PathBuf>,
}

/// Per-run worker pool settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunConfig {
    pub process_count: usize,
    pub multi_process: bool,
    pub run_id: String,
}

impl RunConfig {
    pub fn new(process_count: usize, multi_process: bool) -> Self {
        Self {
            process_count: process_count.max(1),
            multi_process,
            run_id: new_run_id(),
        }
    }
}

fn new_run_id() -> String {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let digest = Sha256::digest(format!("{}:{nanos}", std::process::id()).as_bytes());
    format!("{digest:x}")[..16].to_string()
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(optional_env)
    }

    /// Builds the configuration from any key lookup; `from_env` passes the
    /// process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let base_dir_raw = lookup("BASE_DIR").ok_or_else(|| anyhow!("Missing required env var: BASE_DIR"))?;
        let base_dir = canonicalize_dir(Path::new(&base_dir_raw))
            .with_context(|| format!("Invalid BASE_DIR: {base_dir_raw}"))?;

        let db_path = default_path(&base_dir, lookup("DB_PATH"), "./.cgidx/codegraph.db");
        let temp_db_path = match lookup("TEMP_DB_PATH") {
            Some(raw) => default_path(&base_dir, Some(raw), ""),
            None => {
                let mut os = db_path.as_os_str().to_owned();
                os.push(".tmp");
                PathBuf::from(os)
            }
        };
        if temp_db_path == db_path {
            return Err(anyhow!("TEMP_DB_PATH must differ from DB_PATH"));
        }
        let shared_data_dir = default_path(&base_dir, lookup("SHARED_DATA_DIR"), "./.cgidx/shared");
        let user_data_dir = default_path(&base_dir, lookup("USER_DATA_DIR"), "./.cgidx/user");

        let index_patterns =
            parse_csv_or_default(lookup("INDEX_PATTERNS").as_deref(), DEFAULT_INDEX_PATTERNS);
        let exclude_patterns =
            parse_csv_or_default(lookup("EXCLUDE_PATTERNS").as_deref(), DEFAULT_EXCLUDE_PATTERNS);

        let parallel_workers = lookup("PARALLEL_WORKERS")
            .as_deref()
            .map(parse_usize)
            .transpose()?
            .filter(|n| *n > 0)
            .unwrap_or_else(default_worker_count);

        let multi_process = lookup("MULTI_PROCESS")
            .as_deref()
            .map(parse_bool)
            .transpose()?
            .unwrap_or(true);

        let worker_binary = lookup("WORKER_BINARY").map(PathBuf::from);

        let max_worker_restarts = lookup("MAX_WORKER_RESTARTS")
            .as_deref()
            .map(parse_u64)
            .transpose()?
            .map(|n| n.min(u32::MAX as u64) as u32)
            .unwrap_or(3);

        let storage_provider_threshold = lookup("STORAGE_PROVIDER_THRESHOLD")
            .as_deref()
            .map(parse_usize)
            .transpose()?
            .unwrap_or(10);

        let poll_interval_ms = lookup("POLL_INTERVAL_MS")
            .as_deref()
            .map(parse_u64)
            .transpose()?
            .unwrap_or(25)
            .max(1);

        let queue_batch_size = lookup("QUEUE_BATCH_SIZE")
            .as_deref()
            .map(parse_usize)
            .transpose()?
            .unwrap_or(20)
            .max(1);

        let refresh_mode = lookup("REFRESH_MODE")
            .as_deref()
            .map(parse_refresh_mode)
            .transpose()?
            .unwrap_or(RefreshMode::UpdatedAndIncompleteFiles);

        let shallow_index = lookup("SHALLOW_INDEX")
            .as_deref()
            .map(parse_bool)
            .transpose()?
            .unwrap_or(false);

        let on_interrupt = lookup("ON_INTERRUPT")
            .as_deref()
            .map(parse_on_interrupt)
            .transpose()?
            .unwrap_or(OnInterrupt::Discard);

        let compiler_flags = lookup("COMPILER_FLAGS")
            .as_deref()
            .map(parse_csv)
            .unwrap_or_default();

        let project_settings_path = default_path(
            &base_dir,
            lookup("PROJECT_SETTINGS_PATH"),
            "./.cgidx/project.toml",
        );
        let metrics_path = lookup("METRICS_PATH").map(|raw| default_path(&base_dir, Some(raw), ""));

        Ok(Self {
            base_dir,
            db_path,
            temp_db_path,
            shared_data_dir,
            user_data_dir,
            index_patterns,
            exclude_patterns,
            parallel_workers,
            multi_process,
            worker_binary,
            max_worker_restarts,
            storage_provider_threshold,
            poll_interval_ms,
            queue_batch_size,
            refresh_mode,
            shallow_index,
            on_interrupt,
            compiler_flags,
            project_settings_path,
            metrics_path,
        })
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn run_config(&self) -> RunConfig {
        RunConfig::new(self.parallel_workers, self.multi_process)
    }

    /// Executable launched for process workers.
    pub fn worker_binary(&self) -> Result<PathBuf> {
        match &self.worker_binary {
            Some(path) => Ok(path.clone()),
            None => env::current_exe().context("Failed to locate current executable"),
        }
    }
}

fn default_worker_count() -> usize {
    match num_cpus::get() {
        0 => FALLBACK_WORKERS,
        n => n,
    }
}

fn optional_env(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|v| {
        let v = v.trim().to_string();
        if v.is_empty() {
            None
        } else {
            Some(v)
        }
    })
}

fn canonicalize_dir(path: &Path) -> Result<PathBuf> {
    let path = if path.is_absolute() {
        path.to_path_buf()
    } else {
        env::current_dir()
            .context("Failed to get current_dir")?
            .join(path)
    };
    let meta = std::fs::metadata(&path)
        .with_context(|| format!("Path does not exist: {}", path.display()))?;
    if !meta.is_dir() {
        return Err(anyhow!("Expected directory, got file: {}", path.display()));
    }
    dunce::canonicalize(&path).with_context(|| format!("Failed to canonicalize: {}", path.display()))
}

fn default_path(base_dir: &Path, raw: Option<String>, default_rel: &str) -> PathBuf {
    let raw = raw.unwrap_or_else(|| default_rel.to_string());
    let path = Path::new(&raw);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}

fn parse_csv_or_default(value: Option<&str>, default: &[&str]) -> Vec<String> {
    match value {
        Some(v) => parse_csv(v),
        None => default.iter().map(|s| (*s).to_string()).collect(),
    }
}

fn parse_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

fn parse_refresh_mode(value: &str) -> Result<RefreshMode> {
    RefreshMode::parse(value).ok_or_else(|| anyhow!("Invalid REFRESH_MODE: {value}"))
}

fn parse_on_interrupt(value: &str) -> Result<OnInterrupt> {
    match value.trim().to_lowercase().as_str() {
        "keep" => Ok(OnInterrupt::Keep),
        "discard" => Ok(OnInterrupt::Discard),
        other => Err(anyhow!("Invalid ON_INTERRUPT: {other}")),
    }
}

fn parse_usize(value: &str) -> Result<usize> {
    value
        .trim()
        .parse::<usize>()
        .map_err(|err| anyhow!("Invalid integer '{value}': {err}"))
}

fn parse_u64(value: &str) -> Result<u64> {
    value
        .trim()
        .parse::<u64>()
        .map_err(|err| anyhow!("Invalid integer '{value}': {err}"))
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "y" => Ok(true),
        "false" | "0" | "no" | "n" => Ok(false),
        other => Err(anyhow!("Invalid boolean '{other}'")),
    }
}
