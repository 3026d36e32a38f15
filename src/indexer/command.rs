use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;

/// One unit of parse work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexerCommand {
    pub source_file_path: PathBuf,
    pub working_directory: PathBuf,
    pub indexed_paths: Vec<PathBuf>,
    pub exclude_filters: Vec<String>,
    pub compiler_flags: Vec<String>,
    #[serde(default)]
    pub shallow: bool,
}

impl IndexerCommand {
    pub fn new(source_file_path: impl Into<PathBuf>, working_directory: impl Into<PathBuf>) -> Self {
        Self {
            source_file_path: source_file_path.into(),
            working_directory: working_directory.into(),
            indexed_paths: Vec::new(),
            exclude_filters: Vec::new(),
            compiler_flags: Vec::new(),
            shallow: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshMode {
    None,
    UpdatedFiles,
    UpdatedAndIncompleteFiles,
    AllFiles,
}

impl RefreshMode {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "none" => Some(RefreshMode::None),
            "updated" | "updated_files" => Some(RefreshMode::UpdatedFiles),
            "updated_incomplete" | "updated_and_incomplete_files" | "incomplete" => {
                Some(RefreshMode::UpdatedAndIncompleteFiles)
            }
            "all" | "all_files" | "full" => Some(RefreshMode::AllFiles),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RefreshMode::None => "none",
            RefreshMode::UpdatedFiles => "updated",
            RefreshMode::UpdatedAndIncompleteFiles => "updated_incomplete",
            RefreshMode::AllFiles => "all",
        }
    }
}

/// Files to index and files to clear for one run. Immutable once computed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshInfo {
    pub files_to_index: BTreeSet<PathBuf>,
    pub files_to_clear: BTreeSet<PathBuf>,
    pub mode: RefreshMode,
    pub shallow: bool,
}

impl RefreshInfo {
    pub fn empty(mode: RefreshMode) -> Self {
        Self {
            files_to_index: BTreeSet::new(),
            files_to_clear: BTreeSet::new(),
            mode,
            shallow: false,
        }
    }

    pub fn is_noop(&self) -> bool {
        self.files_to_index.is_empty() && self.files_to_clear.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("none", Some(RefreshMode::None))]
    #[case("updated", Some(RefreshMode::UpdatedFiles))]
    #[case("UPDATED_INCOMPLETE", Some(RefreshMode::UpdatedAndIncompleteFiles))]
    #[case(" all ", Some(RefreshMode::AllFiles))]
    #[case("sometimes", None)]
    fn parses_refresh_modes(#[case] raw: &str, #[case] expected: Option<RefreshMode>) {
        assert_eq!(RefreshMode::parse(raw), expected);
    }

    #[test]
    fn mode_names_parse_back() {
        for mode in [
            RefreshMode::None,
            RefreshMode::UpdatedFiles,
            RefreshMode::UpdatedAndIncompleteFiles,
            RefreshMode::AllFiles,
        ] {
            assert_eq!(RefreshMode::parse(mode.as_str()), Some(mode));
        }
    }
}
