//! rstest fixtures for integration tests

use rstest::*;
use tempfile::TempDir;

use super::helpers::write_file;

/// Project directory with three small sources in different languages.
#[fixture]
pub fn project() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    write_file(
        dir.path(),
        "src/lib.rs",
        "pub struct Greeter;\n\nimpl Greeter {\n    pub fn greet(&self) -> String {\n        helper()\n    }\n}\n\nfn helper() -> String {\n    String::from(\"hi\")\n}\n",
    );
    write_file(
        dir.path(),
        "tools/report.py",
        "class Report:\n    def render(self):\n        return format_rows()\n\n\ndef format_rows():\n    return []\n",
    );
    write_file(
        dir.path(),
        "cmd/main.go",
        "package main\n\nfunc main() {\n\trun()\n}\n\nfunc run() {}\n",
    );
    dir
}
