pub mod build_index;
pub mod command;
pub mod fill_queue;
pub mod frontend;
pub mod merge;
pub mod parser;
pub mod pipeline;
pub mod refresh;
pub mod scan;
pub mod status;
pub mod worker;

/// Blackboard keys shared by the indexing tasks.
pub mod keys {
    /// Number of worker slots still attached to the run; zero once the
    /// orchestrator has handed over every result.
    pub const INDEXER_COUNT: &str = "indexer_count";
    /// Storages currently taken out of the provider by the merge loop.
    pub const MERGING_STORAGES: &str = "merging_storages";
    pub const SOURCE_FILE_COUNT: &str = "source_file_count";
    pub const INDEXED_SOURCE_FILE_COUNT: &str = "indexed_source_file_count";
    pub const CRASHED_FILE_COUNT: &str = "crashed_file_count";
    pub const INTERRUPT_REQUESTED: &str = "interrupt_requested";
    pub const INTERRUPTED_INDEXING: &str = "interrupted_indexing";
    pub const STORE_ERROR: &str = "store_error";
    pub const KEEP_STORE: &str = "keep_store";
    pub const DISCARD_STORE: &str = "discard_store";
    pub const STORE_KEPT: &str = "store_kept";
    pub const STORE_DISCARDED: &str = "store_discarded";
    pub const SWAP_MESSAGE: &str = "swap_message";
    pub const ERROR_COUNT: &str = "error_count";
    /// Seconds spent in the run, as float.
    pub const INDEX_TIME: &str = "index_time";
}
