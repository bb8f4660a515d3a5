//! Architectural Enforcement Integration Tests
//!
//! Source scanners shared by the integration tests in `tests/`:
//! - No sleep() calls in production code outside reconnect backoff
//! - No blocking I/O inside async functions
//!
//! Only `src/` trees of the workspace crates are scanned; integration test
//! directories are free to sleep and block.

use std::fs;
use std::path::{Path, PathBuf};

/// Production source trees checked by every rule, relative to the workspace root
pub const PRODUCTION_DIRS: &[&str] = &["netstreams/core/src", "netstreams/daemon/src"];

/// One offending line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub path: PathBuf,
    pub line: usize,
    pub text: String,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{} - {}", self.path.display(), self.line, self.text)
    }
}

/// Workspace root, two levels above this crate's manifest
pub fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../..")
}

/// Run `check` over every line of every `.rs` file in the production trees
///
/// `check` receives the file's lines and the index of the current line and
/// returns true when the line is a violation.
pub fn scan_production<F>(check: F) -> Vec<Violation>
where
    F: Fn(&Path, &[&str], usize) -> bool,
{
    let root = workspace_root();
    let mut violations = Vec::new();

    for dir in PRODUCTION_DIRS {
        let path = root.join(dir);
        if !path.exists() {
            continue;
        }

        for entry in walkdir::WalkDir::new(&path)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if entry.path().extension().and_then(|s| s.to_str()) != Some("rs") {
                continue;
            }
            let content = match fs::read_to_string(entry.path()) {
                Ok(c) => c,
                Err(_) => continue,
            };
            let lines: Vec<&str> = content.lines().collect();
            for idx in 0..lines.len() {
                if check(entry.path(), &lines, idx) {
                    violations.push(Violation {
                        path: entry.path().to_path_buf(),
                        line: idx + 1,
                        text: lines[idx].trim().to_string(),
                    });
                }
            }
        }
    }

    violations
}

/// The part of a line before any `//` comment
pub fn code_part(line: &str) -> &str {
    line.split("//").next().unwrap_or(line)
}

/// Whether the line sits inside a `#[cfg(test)]` module or a test function
pub fn is_test_code(lines: &[&str], current_idx: usize) -> bool {
    // Test modules sit at the bottom of a file, so anything after the
    // attribute counts
    if lines[..current_idx]
        .iter()
        .any(|line| line.trim().starts_with("#[cfg(test)]") || line.trim().starts_with("#[cfg(all(test"))
    {
        return true;
    }

    for i in (0..current_idx).rev() {
        let line = lines[i].trim();

        if line.starts_with("#[test]") || line.starts_with("#[tokio::test") {
            return true;
        }

        if line.contains("fn ") && !line.contains("test") {
            return false;
        }

        if line.starts_with("mod ") || line.starts_with("impl ") {
            return false;
        }
    }
    false
}

/// Whether the function enclosing this line is declared `async`
pub fn is_in_async_function(lines: &[&str], current_idx: usize) -> bool {
    for i in (0..=current_idx).rev() {
        let line = code_part(lines[i]);
        if line.contains("fn ") {
            return line.contains("async fn ");
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_part_strips_comments() {
        assert_eq!(code_part("let x = 1; // sleep(1)"), "let x = 1; ");
        assert_eq!(code_part("// only a comment"), "");
    }

    #[test]
    fn test_detects_cfg_test_module() {
        let lines = vec![
            "fn production() {}",
            "#[cfg(test)]",
            "mod tests {",
            "    fn helper() { std::thread::sleep(d); }",
            "}",
        ];
        assert!(!is_test_code(&lines, 0));
        assert!(is_test_code(&lines, 3));
    }

    #[test]
    fn test_async_function_detection() {
        let lines = vec![
            "pub async fn load() {",
            "    let data = read();",
            "}",
            "pub fn load_sync() {",
            "    let data = read();",
            "}",
        ];
        assert!(is_in_async_function(&lines, 1));
        assert!(!is_in_async_function(&lines, 4));
    }

    #[test]
    fn test_workspace_root_holds_production_dirs() {
        let root = workspace_root();
        assert!(root.join("Cargo.toml").exists());
        for dir in PRODUCTION_DIRS {
            assert!(root.join(dir).exists(), "missing {dir}");
        }
    }
}
