//! Deciding which files a run has to (re)index.

use anyhow::{Context, Result};
use rayon::prelude::*;
use sha2::{Digest, Sha256};
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use super::command::{RefreshInfo, RefreshMode};
use crate::storage::sqlite::FileRow;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileFingerprint {
    pub mtime_ns: i64,
    pub size_bytes: u64,
    pub content_hash: String,
}

pub fn content_hash(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

pub fn file_fingerprint(path: &Path) -> Result<FileFingerprint> {
    let meta =
        fs::metadata(path).with_context(|| format!("Failed to stat file: {}", path.display()))?;
    let mtime_ns = meta
        .modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_nanos().min(i64::MAX as u128) as i64)
        .unwrap_or(0);
    let bytes = fs::read(path).with_context(|| format!("Failed to read file: {}", path.display()))?;
    Ok(FileFingerprint {
        mtime_ns,
        size_bytes: meta.len(),
        content_hash: content_hash(&bytes),
    })
}

/// Compares the scanned files with what the stable store recorded.
pub fn compute_refresh_info(
    scanned: &[PathBuf],
    stored: &[FileRow],
    mode: RefreshMode,
    shallow: bool,
) -> RefreshInfo {
    let mut info = RefreshInfo::empty(mode);
    info.shallow = shallow;

    match mode {
        RefreshMode::None => return info,
        RefreshMode::AllFiles => {
            info.files_to_index = scanned.iter().cloned().collect();
            info.files_to_clear = stored.iter().map(|r| PathBuf::from(&r.path)).collect();
            return info;
        }
        RefreshMode::UpdatedFiles | RefreshMode::UpdatedAndIncompleteFiles => {}
    }

    let stored_by_path: HashMap<&str, &FileRow> =
        stored.iter().map(|r| (r.path.as_str(), r)).collect();

    let fingerprints: Vec<(PathBuf, Option<FileFingerprint>)> = scanned
        .par_iter()
        .map(|path| match file_fingerprint(path) {
            Ok(fp) => (path.clone(), Some(fp)),
            Err(err) => {
                tracing::warn!(file = %path.display(), error = %err, "Failed to fingerprint file");
                (path.clone(), None)
            }
        })
        .collect();

    let mut present: BTreeSet<String> = BTreeSet::new();
    for (path, fp) in fingerprints {
        let Some(fp) = fp else { continue };
        let key = path.to_string_lossy().to_string();
        present.insert(key.clone());
        match stored_by_path.get(key.as_str()) {
            None => {
                info.files_to_index.insert(path);
            }
            Some(row) => {
                let changed = row.content_hash != fp.content_hash;
                let incomplete = mode == RefreshMode::UpdatedAndIncompleteFiles && !row.complete;
                if changed || incomplete {
                    info.files_to_clear.insert(path.clone());
                    info.files_to_index.insert(path);
                }
            }
        }
    }

    for row in stored {
        if !present.contains(&row.path) {
            info.files_to_clear.insert(PathBuf::from(&row.path));
        }
    }

    tracing::info!(
        mode = mode.as_str(),
        to_index = info.files_to_index.len(),
        to_clear = info.files_to_clear.len(),
        "Computed refresh info"
    );
    info
}
