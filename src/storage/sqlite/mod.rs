pub mod operations;
pub mod queries;
pub mod schema;

use anyhow::Result;

pub use operations::{PersistentStore, StoreMode};
pub use schema::*;

impl PersistentStore {
    pub fn set_project_settings_text(&self, text: &str) -> Result<()> {
        queries::meta::set_meta(&self.conn(), queries::meta::PROJECT_SETTINGS_KEY, text)
    }

    pub fn project_settings_text(&self) -> Result<Option<String>> {
        queries::meta::get_meta(&self.conn(), queries::meta::PROJECT_SETTINGS_KEY)
    }

    pub fn file_records(&self) -> Result<Vec<FileRow>> {
        queries::files::list_files(&self.conn())
    }

    pub fn file_record(&self, path: &str) -> Result<Option<FileRow>> {
        queries::files::get_file_by_path(&self.conn(), path)
    }

    pub fn node_rows(&self) -> Result<Vec<NodeRow>> {
        queries::nodes::list_nodes(&self.conn())
    }

    pub fn edge_rows(&self) -> Result<Vec<EdgeRow>> {
        queries::edges::list_edges(&self.conn())
    }

    pub fn error_rows(&self) -> Result<Vec<ErrorRow>> {
        queries::errors::list_errors(&self.conn())
    }

    pub fn counts(&self) -> Result<StoreCounts> {
        let conn = self.conn();
        Ok(StoreCounts {
            nodes: queries::nodes::count_nodes(&conn)?,
            edges: queries::edges::count_edges(&conn)?,
            files: queries::files::count_files(&conn)?,
            source_locations: queries::locations::count_locations(&conn)?,
            errors: queries::errors::count_errors(&conn)?,
        })
    }

    pub fn insert_index_run(&self, run: &IndexRunRow) -> Result<()> {
        queries::stats::insert_index_run(&self.conn(), run)
    }

    pub fn latest_index_run(&self) -> Result<Option<IndexRunRow>> {
        queries::stats::latest_index_run(&self.conn())
    }
}
