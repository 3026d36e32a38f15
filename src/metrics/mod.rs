use anyhow::{Context, Result};
use prometheus::{Counter, Encoder, Gauge, Histogram, Registry, TextEncoder};
use std::path::Path;

pub struct MetricsRegistry {
    pub registry: Registry,

    // Worker pool
    pub files_indexed: Counter,
    pub files_failed: Counter,
    pub worker_crashes: Counter,
    pub worker_restarts: Counter,

    // Merge pipeline
    pub storages_merged: Counter,
    pub storages_injected: Counter,
    pub provider_depth: Gauge,

    pub run_duration: Histogram,
}

impl MetricsRegistry {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let files_indexed = Counter::new(
            "index_files_total",
            "Total number of files handed back by workers"
        )?;

        let files_failed = Counter::new(
            "index_files_failed_total",
            "Total number of files recorded with a fatal error"
        )?;

        let worker_crashes = Counter::new(
            "index_worker_crashes_total",
            "Total number of worker processes or threads that ended abnormally"
        )?;

        let worker_restarts = Counter::new(
            "index_worker_restarts_total",
            "Total number of worker restarts"
        )?;

        let storages_merged = Counter::new(
            "index_storages_merged_total",
            "Total number of pairwise intermediate storage merges"
        )?;

        let storages_injected = Counter::new(
            "index_storages_injected_total",
            "Total number of intermediate storages written to the working store"
        )?;

        let provider_depth = Gauge::new(
            "index_provider_depth",
            "Intermediate storages waiting to be merged"
        )?;

        // 100ms to 1 hour
        let run_duration = Histogram::with_opts(
            prometheus::HistogramOpts::new(
                "index_run_duration_seconds",
                "Indexing run duration in seconds"
            )
            .buckets(vec![0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 300.0, 900.0, 3600.0])
        )?;

        registry.register(Box::new(files_indexed.clone()))?;
        registry.register(Box::new(files_failed.clone()))?;
        registry.register(Box::new(worker_crashes.clone()))?;
        registry.register(Box::new(worker_restarts.clone()))?;
        registry.register(Box::new(storages_merged.clone()))?;
        registry.register(Box::new(storages_injected.clone()))?;
        registry.register(Box::new(provider_depth.clone()))?;
        registry.register(Box::new(run_duration.clone()))?;

        Ok(Self {
            registry,
            files_indexed,
            files_failed,
            worker_crashes,
            worker_restarts,
            storages_merged,
            storages_injected,
            provider_depth,
            run_duration,
        })
    }

    /// Prometheus text exposition of every registered metric.
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(&self.registry.gather(), &mut buffer)
            .context("Failed to encode metrics")?;
        String::from_utf8(buffer).context("Metrics output is not valid UTF-8")
    }

    pub fn write_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create metrics dir: {}", parent.display()))?;
        }
        std::fs::write(path, self.render()?)
            .with_context(|| format!("Failed to write metrics: {}", path.display()))
    }
}
