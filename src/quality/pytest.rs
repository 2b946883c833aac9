//! Pytest-backed test runner.

use super::process::ToolCommand;
use super::{TestReport, TestRunner};
use crate::config::ToolsConfig;
use crate::error::{Result, SwarmError};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

const FAILURES_MARKER: &str = "= FAILURES =";
const SHORT_SUMMARY_MARKER: &str = "short test summary info";
const TAIL_LINES: usize = 10;

/// Runs `python -m pytest -v` with the project root on `PYTHONPATH`.
#[derive(Debug, Clone)]
pub struct PytestRunner {
    python: String,
    timeout: Duration,
}

impl PytestRunner {
    #[must_use]
    pub fn new(python: impl Into<String>, timeout: Duration) -> Self {
        Self {
            python: python.into(),
            timeout,
        }
    }

    #[must_use]
    pub fn from_config(tools: &ToolsConfig) -> Self {
        Self::new(&tools.python, Duration::from_millis(tools.tool_timeout_ms))
    }
}

/// Build a `PYTHONPATH` value with `root` first.
fn python_path(root: &Path) -> String {
    match std::env::var_os("PYTHONPATH") {
        Some(existing) if !existing.is_empty() => {
            let mut paths = vec![root.to_path_buf()];
            paths.extend(std::env::split_paths(&existing));
            std::env::join_paths(paths)
                .map(|p| p.to_string_lossy().into_owned())
                .unwrap_or_else(|_| root.display().to_string())
        }
        _ => root.display().to_string(),
    }
}

/// Reduce a failed pytest run to the part worth showing a fixer.
///
/// Prefers the `FAILURES` section of stdout, then stderr, then the last
/// ten lines of stdout.
#[must_use]
pub fn extract_failure_summary(stdout: &str, stderr: &str) -> String {
    let mut in_failures = false;
    let mut section = Vec::new();
    for line in stdout.lines() {
        if !in_failures {
            in_failures = line.contains(FAILURES_MARKER);
            continue;
        }
        if line.contains("=====") || line.contains(SHORT_SUMMARY_MARKER) {
            break;
        }
        if !line.trim().is_empty() {
            section.push(line);
        }
    }
    if !section.is_empty() {
        return section.join("\n");
    }

    if !stderr.trim().is_empty() {
        return stderr.trim().to_string();
    }

    let lines: Vec<&str> = stdout.trim().lines().collect();
    if lines.is_empty() {
        return "Unknown test failure.".to_string();
    }
    lines[lines.len().saturating_sub(TAIL_LINES)..].join("\n")
}

#[async_trait]
impl TestRunner for PytestRunner {
    fn name(&self) -> &str {
        "pytest"
    }

    async fn run(&self, tests: &[PathBuf], project_root: &Path) -> Result<TestReport> {
        if tests.is_empty() {
            return Ok(TestReport::failed("", "No test files to run."));
        }
        if let Some(missing) = tests.iter().find(|t| !t.exists()) {
            let message = format!("Test path not found: {}", missing.display());
            warn!("{}", message);
            return Ok(TestReport::failed(message.clone(), message));
        }

        let command = ToolCommand::new(&self.python)
            .args(["-m", "pytest"])
            .args(tests.iter().map(|t| t.display().to_string()))
            .arg("-v")
            // Mirrored test directories may repeat a basename without __init__.py.
            .arg("--import-mode=importlib")
            .current_dir(project_root)
            .env("PYTHONPATH", python_path(project_root))
            .timeout(self.timeout);

        let output = match command.run().await {
            Ok(output) => output,
            Err(SwarmError::ToolTimeout { timeout_ms, .. }) => {
                let message = format!("pytest exceeded the {}ms time limit.", timeout_ms);
                warn!("{}", message);
                return Ok(TestReport::failed(message.clone(), message));
            }
            Err(e) => return Err(e),
        };

        debug!("pytest exited with {:?}", output.code);

        if output.success() {
            Ok(TestReport::passed(output.combined()))
        } else {
            let summary = extract_failure_summary(&output.stdout, &output.stderr);
            Ok(TestReport::failed(output.combined(), summary))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FAILED_RUN: &str = "============================= test session starts ==============================
collected 2 items

tests/test_order.py::test_total PASSED                                   [ 50%]
tests/test_order.py::test_discount FAILED                                [100%]

=================================== FAILURES ===================================
________________________________ test_discount _________________________________

    def test_discount():
>       assert discount(100, 0.1) == 90
E       assert 110.0 == 90

tests/test_order.py:8: AssertionError
=========================== short test summary info ============================
FAILED tests/test_order.py::test_discount - assert 110.0 == 90
========================= 1 failed, 1 passed in 0.03s ==========================
";

    #[test]
    fn test_summary_uses_failures_section() {
        let summary = extract_failure_summary(FAILED_RUN, "");
        assert!(summary.contains("assert 110.0 == 90"));
        assert!(summary.contains("test_discount"));
        assert!(!summary.contains("short test summary"));
        assert!(!summary.contains("PASSED"));
    }

    #[test]
    fn test_summary_falls_back_to_stderr() {
        let summary = extract_failure_summary("collected 0 items\n", "ImportError: no module named order\n");
        assert_eq!(summary, "ImportError: no module named order");
    }

    #[test]
    fn test_summary_falls_back_to_tail() {
        let stdout: String = (1..=15).map(|i| format!("line {}\n", i)).collect();
        let summary = extract_failure_summary(&stdout, "  ");
        assert!(summary.starts_with("line 6"));
        assert!(summary.ends_with("line 15"));
        assert_eq!(extract_failure_summary("", ""), "Unknown test failure.");
    }

    #[test]
    fn test_python_path_starts_with_root() {
        let value = python_path(Path::new("/sb/project"));
        assert!(value.starts_with("/sb/project"));
    }

    #[tokio::test]
    async fn test_missing_test_file_fails() {
        let dir = tempfile::TempDir::new().unwrap();
        let runner = PytestRunner::new("python3", Duration::from_secs(1));
        let report = runner
            .run(&[dir.path().join("tests/test_ghost.py")], dir.path())
            .await
            .unwrap();
        assert!(!report.passed);
        assert!(report.failure_summary.contains("test_ghost.py"));
    }

    #[tokio::test]
    async fn test_no_tests_fails() {
        let dir = tempfile::TempDir::new().unwrap();
        let runner = PytestRunner::new("python3", Duration::from_secs(1));
        let report = runner.run(&[], dir.path()).await.unwrap();
        assert!(!report.passed);
    }
}
