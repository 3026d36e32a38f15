//! Replacing the stable store with the freshly indexed working store.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

const SIDECAR_SUFFIXES: [&str; 2] = ["-wal", "-shm"];

#[derive(Debug)]
pub enum SwapError {
    /// The stable store could not be replaced; the working store is kept.
    Conflict { stable: PathBuf, source: io::Error },
    Io(io::Error),
}

impl fmt::Display for SwapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SwapError::Conflict { stable, source } => write!(
                f,
                "could not replace {}: {source}",
                stable.display()
            ),
            SwapError::Io(err) => write!(f, "store file operation failed: {err}"),
        }
    }
}

impl std::error::Error for SwapError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SwapError::Conflict { source, .. } => Some(source),
            SwapError::Io(err) => Some(err),
        }
    }
}

impl From<io::Error> for SwapError {
    fn from(err: io::Error) -> Self {
        SwapError::Io(err)
    }
}

impl SwapError {
    /// Text suitable for showing to the user.
    pub fn user_message(&self, working: &Path) -> String {
        match self {
            SwapError::Conflict { stable, .. } => format!(
                "The index at {} is in use and could not be replaced. The new index was kept at {}.",
                stable.display(),
                working.display()
            ),
            SwapError::Io(err) => format!("Finishing the index failed: {err}"),
        }
    }
}

fn sidecar(path: &Path, suffix: &str) -> PathBuf {
    let mut os = path.as_os_str().to_owned();
    os.push(suffix);
    PathBuf::from(os)
}

fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err),
    }
}

/// Removes the stable store's journal files ahead of the rename.
fn clear_stable_journals(stable: &Path) -> io::Result<()> {
    if stable.is_dir() {
        return Ok(());
    }
    for suffix in SIDECAR_SUFFIXES {
        remove_if_exists(&sidecar(stable, suffix))?;
    }
    Ok(())
}

/// Moves the working store over the stable store.
pub fn keep(working: &Path, stable: &Path) -> Result<(), SwapError> {
    if !working.exists() {
        return Err(SwapError::Io(io::Error::new(
            io::ErrorKind::NotFound,
            format!("working store {} does not exist", working.display()),
        )));
    }
    if let Some(parent) = stable.parent() {
        fs::create_dir_all(parent)?;
    }
    clear_stable_journals(stable)?;

    if let Err(first) = fs::rename(working, stable) {
        // Some platforms refuse to rename over an existing file.
        if !stable.is_file() {
            return Err(SwapError::Conflict {
                stable: stable.to_path_buf(),
                source: first,
            });
        }
        fs::remove_file(stable)
            .and_then(|_| fs::rename(working, stable))
            .map_err(|source| SwapError::Conflict {
                stable: stable.to_path_buf(),
                source,
            })?;
    }

    for suffix in SIDECAR_SUFFIXES {
        let working_sidecar = sidecar(working, suffix);
        if working_sidecar.exists() {
            tracing::warn!(path = %working_sidecar.display(), "Dropping leftover journal file");
            remove_if_exists(&working_sidecar)?;
        }
    }
    tracing::info!(stable = %stable.display(), "Replaced index store");
    Ok(())
}

/// Deletes the working store and its journal files.
pub fn discard(working: &Path) -> Result<(), SwapError> {
    remove_if_exists(working)?;
    for suffix in SIDECAR_SUFFIXES {
        remove_if_exists(&sidecar(working, suffix))?;
    }
    tracing::info!(working = %working.display(), "Discarded working store");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keep_replaces_stable_store() {
        let dir = tempfile::tempdir().unwrap();
        let working = dir.path().join("index.db.tmp");
        let stable = dir.path().join("index.db");
        fs::write(&working, b"new").unwrap();
        fs::write(&stable, b"old").unwrap();
        fs::write(sidecar(&stable, "-wal"), b"stale").unwrap();

        keep(&working, &stable).unwrap();
        assert_eq!(fs::read(&stable).unwrap(), b"new");
        assert!(!working.exists());
        assert!(!sidecar(&stable, "-wal").exists());
    }

    #[test]
    fn stable_journals_are_cleared_before_the_store_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let stable = dir.path().join("index.db");
        fs::write(&stable, b"old").unwrap();
        fs::write(sidecar(&stable, "-wal"), b"stale").unwrap();
        fs::write(sidecar(&stable, "-shm"), b"stale").unwrap();

        clear_stable_journals(&stable).unwrap();
        assert_eq!(fs::read(&stable).unwrap(), b"old");
        assert!(!sidecar(&stable, "-wal").exists());
        assert!(!sidecar(&stable, "-shm").exists());
    }

    #[test]
    fn conflict_leaves_journals_of_occupied_path_alone() {
        let dir = tempfile::tempdir().unwrap();
        let working = dir.path().join("index.db.tmp");
        let stable = dir.path().join("index.db");
        fs::write(&working, b"new").unwrap();
        fs::create_dir_all(stable.join("occupied")).unwrap();
        fs::write(sidecar(&stable, "-wal"), b"wal").unwrap();

        assert!(keep(&working, &stable).is_err());
        assert!(sidecar(&stable, "-wal").exists());
    }

    #[test]
    fn keep_reports_conflict_and_preserves_working_store() {
        let dir = tempfile::tempdir().unwrap();
        let working = dir.path().join("index.db.tmp");
        let stable = dir.path().join("index.db");
        fs::write(&working, b"new").unwrap();
        fs::create_dir_all(stable.join("occupied")).unwrap();

        let err = keep(&working, &stable).unwrap_err();
        assert!(matches!(err, SwapError::Conflict { .. }));
        assert!(working.exists());
        assert!(err.user_message(&working).contains("index.db.tmp"));
    }

    #[test]
    fn discard_removes_working_files() {
        let dir = tempfile::tempdir().unwrap();
        let working = dir.path().join("index.db.tmp");
        fs::write(&working, b"x").unwrap();
        fs::write(sidecar(&working, "-shm"), b"x").unwrap();
        discard(&working).unwrap();
        assert!(!working.exists());
        assert!(!sidecar(&working, "-shm").exists());
        discard(&working).unwrap();
    }
}
