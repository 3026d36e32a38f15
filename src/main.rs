use anyhow::Result;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{debug, error, info};

use codegraph_indexer::cli::{parse_args, print_help, print_version, CliCommand};
use codegraph_indexer::config::Config;
use codegraph_indexer::indexer::pipeline::{IndexRunReport, IndexingRun};
use codegraph_indexer::indexer::status::{status_channel, StatusEvent};
use codegraph_indexer::indexer::worker::run_worker;
use codegraph_indexer::logging::init_cli_logging;
use codegraph_indexer::metrics::MetricsRegistry;

#[tokio::main]
async fn main() -> ExitCode {
    let args = std::env::args().collect::<Vec<_>>();
    let command = match parse_args(&args) {
        Ok(command) => command,
        Err(err) => {
            eprintln!("{err:#}");
            return ExitCode::FAILURE;
        }
    };

    match command {
        CliCommand::Help => {
            print_help();
            ExitCode::SUCCESS
        }
        CliCommand::Version => {
            print_version();
            ExitCode::SUCCESS
        }
        CliCommand::Worker(worker_args) => {
            let code = run_worker(&worker_args);
            ExitCode::from(u8::try_from(code).unwrap_or(1))
        }
        CliCommand::Index => {
            init_cli_logging();
            info!(version = env!("CARGO_PKG_VERSION"), "Starting codegraph-indexer");
            match run_index().await {
                Ok(report) => {
                    match serde_json::to_string_pretty(&report) {
                        Ok(json) => println!("{json}"),
                        Err(err) => error!(error = %err, "Failed to encode run report"),
                    }
                    ExitCode::SUCCESS
                }
                Err(err) => {
                    error!(error = %format!("{err:#}"), "Indexing failed");
                    ExitCode::FAILURE
                }
            }
        }
    }
}

async fn run_index() -> Result<IndexRunReport> {
    let config = Config::from_env()?;
    let metrics = Arc::new(MetricsRegistry::new()?);
    let (status, mut events) = status_channel();

    let run = IndexingRun::new(config)
        .with_status(status)
        .with_metrics(metrics);
    let interrupt = run.interrupt_handle();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupt.interrupt();
        }
    });

    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                StatusEvent::Indexing {
                    is_indexing,
                    percent,
                } => info!(is_indexing, percent, "Indexing progress"),
                StatusEvent::CurrentFiles { files } => {
                    let files: Vec<String> =
                        files.iter().map(|f| f.display().to_string()).collect();
                    debug!(files = %files.join(", "), "Currently indexing");
                }
                StatusEvent::Message { text } => info!("{text}"),
                StatusEvent::Finished {
                    interrupted,
                    files_indexed,
                    errors,
                } => info!(interrupted, files_indexed, errors, "Indexing finished"),
            }
        }
    });

    let report = run.run_async().await;
    let _ = printer.await;
    report
}
