pub mod cli;
pub mod config;
pub mod indexer;
pub mod ipc;
pub mod logging;
pub mod metrics;
pub mod storage;
pub mod task;
