//! Architectural Enforcement Integration Tests
//!
//! Source scans that keep the deck crates honest:
//! - No blocking sleeps, and timer sleeps only where timers live
//! - No `unwrap()`/`expect()` in production code
//!
//! The helpers here walk the production sources and hand the tests only the
//! lines above each file's `#[cfg(test)]` module.

use std::fs;
use std::path::{Path, PathBuf};

/// Production source roots, relative to the workspace root
pub const PRODUCTION_DIRS: &[&str] = &["deck/core/src", "deck/daemon/src"];

/// One offending line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// File the line came from
    pub path: PathBuf,
    /// 1-based line number
    pub line: usize,
    /// The trimmed line
    pub text: String,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{} - {}", self.path.display(), self.line, self.text)
    }
}

/// Workspace root, derived from this package's manifest dir
#[must_use]
pub fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../..")
}

/// Every `.rs` file under the production roots
#[must_use]
pub fn production_files() -> Vec<PathBuf> {
    let root = workspace_root();
    let mut files = Vec::new();
    for dir in PRODUCTION_DIRS {
        let path = root.join(dir);
        if !path.exists() {
            continue;
        }
        for entry in walkdir::WalkDir::new(path)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if entry.path().extension().and_then(|s| s.to_str()) == Some("rs") {
                files.push(entry.into_path());
            }
        }
    }
    files.sort();
    files
}

/// Code part of each production line: `(line_number, code)` pairs, stopping
/// at the first `#[cfg(test)]` and with `//` comments stripped.
#[must_use]
pub fn production_lines(content: &str) -> Vec<(usize, &str)> {
    let mut lines = Vec::new();
    for (idx, line) in content.lines().enumerate() {
        if line.trim_start().starts_with("#[cfg(test)]") {
            break;
        }
        let code = line.split("//").next().unwrap_or(line);
        if !code.trim().is_empty() {
            lines.push((idx + 1, code));
        }
    }
    lines
}

/// Scan every production file with `check`, collecting offending lines
pub fn scan<F>(mut check: F) -> Vec<Violation>
where
    F: FnMut(&Path, &str) -> bool,
{
    let mut violations = Vec::new();
    for path in production_files() {
        let Ok(content) = fs::read_to_string(&path) else {
            continue;
        };
        let source: Vec<&str> = content.lines().collect();
        for (line, code) in production_lines(&content) {
            if check(&path, code) {
                violations.push(Violation {
                    path: path.clone(),
                    line,
                    text: source[line - 1].trim().to_string(),
                });
            }
        }
    }
    violations
}

/// Print violations and panic if there are any
pub fn report(title: &str, violations: &[Violation], hints: &[&str]) {
    if violations.is_empty() {
        return;
    }
    eprintln!("\n❌ {title}\n");
    for violation in violations {
        eprintln!("  ❌ {violation}");
    }
    for hint in hints {
        eprintln!("  {hint}");
    }
    panic!(
        "\nFound {} violation(s) in production code.\nFix these before merging!",
        violations.len()
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_production_lines_stop_at_test_module() {
        let content = "fn a() {}\n// x.unwrap()\nlet y = 1; // z.unwrap()\n#[cfg(test)]\nmod tests {}\n";
        let lines = production_lines(content);
        assert_eq!(lines, vec![(1, "fn a() {}"), (3, "let y = 1; ")]);
    }

    #[test]
    fn test_production_files_found() {
        let files = production_files();
        assert!(files.iter().any(|p| p.ends_with("deck/core/src/lib.rs")));
        assert!(files.iter().any(|p| p.ends_with("deck/daemon/src/main.rs")));
    }
}
