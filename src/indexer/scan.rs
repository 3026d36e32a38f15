use anyhow::{anyhow, Result};
use regex::Regex;
use std::{
    fs,
    path::{Path, PathBuf},
};

use super::parser::language_id_for_path;
use crate::config::Config;

/// Include/exclude globs compiled against paths relative to the base dir.
#[derive(Debug, Clone)]
pub struct FileFilter {
    include: Vec<Regex>,
    exclude: Vec<Regex>,
}

impl FileFilter {
    pub fn new(include: &[String], exclude: &[String]) -> Result<Self> {
        let compile = |patterns: &[String]| -> Result<Vec<Regex>> {
            patterns
                .iter()
                .map(|p| {
                    Regex::new(&glob_to_regex(p))
                        .map_err(|err| anyhow!("Invalid glob pattern '{p}': {err}"))
                })
                .collect()
        };
        Ok(Self {
            include: compile(include)?,
            exclude: compile(exclude)?,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(&config.index_patterns, &config.exclude_patterns)
    }

    pub fn is_excluded(&self, rel: &str) -> bool {
        self.exclude.iter().any(|re| re.is_match(rel))
    }

    pub fn should_skip_dir(&self, rel_dir: &str) -> bool {
        self.is_excluded(&format!("{rel_dir}/"))
    }

    pub fn should_index_file(&self, rel: &str) -> bool {
        !self.is_excluded(rel) && self.include.iter().any(|re| re.is_match(rel))
    }
}

/// Translates a glob into an anchored regex. `**/` matches any number of
/// directories, `*` and `?` stay within one path segment.
pub fn glob_to_regex(glob: &str) -> String {
    let glob = glob.replace('\\', "/");
    let chars: Vec<char> = glob.chars().collect();
    let mut out = String::from("^");
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '*' if chars.get(i + 1) == Some(&'*') => {
                if chars.get(i + 2) == Some(&'/') {
                    out.push_str("(?:.*/)?");
                    i += 3;
                } else {
                    out.push_str(".*");
                    i += 2;
                }
                continue;
            }
            '*' => out.push_str("[^/]*"),
            '?' => out.push_str("[^/]"),
            c => out.push_str(&regex::escape(&c.to_string())),
        }
        i += 1;
    }
    out.push('$');
    out
}

fn relative(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

/// Walks `root` and returns the supported source files the filter accepts,
/// sorted.
pub fn scan_files(filter: &FileFilter, root: &Path) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let entries = match fs::read_dir(&dir) {
            Ok(e) => e,
            Err(err) => {
                tracing::warn!(dir = %dir.display(), error = %err, "Failed to read dir");
                continue;
            }
        };

        for entry in entries {
            let entry = match entry {
                Ok(e) => e,
                Err(err) => {
                    tracing::warn!(
                        dir = %dir.display(),
                        error = %err,
                        "Failed to read dir entry"
                    );
                    continue;
                }
            };
            let path = entry.path();
            let file_type = match entry.file_type() {
                Ok(ft) => ft,
                Err(_) => continue,
            };
            let rel = relative(root, &path);

            if file_type.is_dir() {
                if !filter.should_skip_dir(&rel) {
                    stack.push(path);
                }
                continue;
            }

            if file_type.is_file()
                && language_id_for_path(&path).is_some()
                && filter.should_index_file(&rel)
            {
                out.push(path);
            }
        }
    }
    out.sort();
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn filter() -> FileFilter {
        FileFilter::new(
            &["**/*.rs".to_string(), "src/*.py".to_string()],
            &["**/target/**".to_string(), "**/generated_*.rs".to_string()],
        )
        .unwrap()
    }

    #[rstest]
    #[case("main.rs", true)]
    #[case("src/deep/mod.rs", true)]
    #[case("src/app.py", true)]
    #[case("src/pkg/app.py", false)]
    #[case("target/debug/build.rs", false)]
    #[case("src/generated_api.rs", false)]
    #[case("README.md", false)]
    fn filter_matches_globs(#[case] rel: &str, #[case] expected: bool) {
        assert_eq!(filter().should_index_file(rel), expected);
    }

    #[test]
    fn scan_prunes_excluded_dirs_and_unsupported_files() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("src/nested")).unwrap();
        fs::create_dir_all(root.join("target/debug")).unwrap();
        fs::write(root.join("src/lib.rs"), "").unwrap();
        fs::write(root.join("src/nested/a.rs"), "").unwrap();
        fs::write(root.join("src/notes.txt"), "").unwrap();
        fs::write(root.join("target/debug/out.rs"), "").unwrap();

        let files = scan_files(&filter(), root).unwrap();
        assert_eq!(
            files,
            vec![root.join("src/lib.rs"), root.join("src/nested/a.rs")]
        );
    }
}
