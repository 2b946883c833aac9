//! Static analysis, test execution and formatting collaborators.
//!
//! The refinement loop only sees the traits defined here:
//!
//! - [`QualityAnalyzer`] scores a set of files (`PylintAnalyzer`)
//! - [`TestRunner`] runs test files against a project root (`PytestRunner`)
//! - [`Formatter`] normalizes a file in place (`BlackFormatter`)
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐   ┌─────────────┐   ┌────────────────┐
//! │ PylintAnalyzer   │   │ PytestRunner│   │ BlackFormatter │
//! └────────┬─────────┘   └──────┬──────┘   └───────┬────────┘
//!          │                    │                  │
//!          └────────────┬───────┴──────────────────┘
//!                       ▼
//!               process::ToolCommand
//!          (tokio::process + timeout, kill on drop)
//! ```

pub mod black;
pub mod process;
pub mod pylint;
pub mod pytest;

pub use black::BlackFormatter;
pub use process::{is_tool_available, CommandOutput, ToolCommand};
pub use pylint::PylintAnalyzer;
pub use pytest::{extract_failure_summary, PytestRunner};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Highest score the analyzer reports.
pub const MAX_SCORE: f64 = 10.0;

/// Pylint message category, taken from the first letter of a message code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum IssueSeverity {
    Convention,
    Refactor,
    Warning,
    Error,
    Fatal,
}

impl IssueSeverity {
    /// Map a code such as `C0114` or `E1101` to its category.
    #[must_use]
    pub fn from_code(code: &str) -> Option<Self> {
        match code.chars().next()? {
            'C' => Some(Self::Convention),
            'R' => Some(Self::Refactor),
            'W' => Some(Self::Warning),
            'E' => Some(Self::Error),
            'F' => Some(Self::Fatal),
            _ => None,
        }
    }

    /// Errors and fatals usually mean the module cannot run.
    #[must_use]
    pub fn is_blocking(&self) -> bool {
        matches!(self, Self::Error | Self::Fatal)
    }
}

impl std::fmt::Display for IssueSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Convention => write!(f, "CONVENTION"),
            Self::Refactor => write!(f, "REFACTOR"),
            Self::Warning => write!(f, "WARNING"),
            Self::Error => write!(f, "ERROR"),
            Self::Fatal => write!(f, "FATAL"),
        }
    }
}

/// A single message reported by the style checker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LintIssue {
    pub severity: IssueSeverity,
    /// Message code, e.g. `C0114`.
    pub code: String,
    pub message: String,
    pub file: Option<PathBuf>,
    pub line: Option<u32>,
    pub column: Option<u32>,
}

impl LintIssue {
    pub fn new(severity: IssueSeverity, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity,
            code: code.into(),
            message: message.into(),
            file: None,
            line: None,
            column: None,
        }
    }

    #[must_use]
    pub fn with_location(mut self, file: impl AsRef<Path>, line: u32) -> Self {
        self.file = Some(file.as_ref().to_path_buf());
        self.line = Some(line);
        self
    }

    #[must_use]
    pub fn with_column(mut self, column: u32) -> Self {
        self.column = Some(column);
        self
    }

    /// One-line rendering used in audit records.
    #[must_use]
    pub fn format(&self) -> String {
        let location = match (&self.file, self.line) {
            (Some(file), Some(line)) => format!("{}:{}: ", file.display(), line),
            (Some(file), None) => format!("{}: ", file.display()),
            _ => String::new(),
        };
        format!("{}[{}] {}", location, self.code, self.message)
    }
}

/// Outcome of one analyzer invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    /// Score in `[0, 10]`.
    pub score: f64,
    /// Raw checker output, forwarded to remediation as-is.
    pub diagnostics: String,
    pub issues: Vec<LintIssue>,
}

impl QualityReport {
    /// Report for an empty input set.
    #[must_use]
    pub fn perfect() -> Self {
        Self {
            score: MAX_SCORE,
            diagnostics: String::new(),
            issues: Vec::new(),
        }
    }

    #[must_use]
    pub fn new(score: f64, diagnostics: impl Into<String>) -> Self {
        Self {
            score: clamp_score(score),
            diagnostics: diagnostics.into(),
            issues: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_issues(mut self, issues: Vec<LintIssue>) -> Self {
        self.issues = issues;
        self
    }

    #[must_use]
    pub fn issue_count(&self) -> usize {
        self.issues.len()
    }

    /// Issues at error or fatal severity.
    #[must_use]
    pub fn blocking_count(&self) -> usize {
        self.issues.iter().filter(|i| i.severity.is_blocking()).count()
    }

    /// Parsed issues one per line, or the raw output when none were parsed.
    #[must_use]
    pub fn issue_lines(&self) -> String {
        if self.issues.is_empty() {
            return self.diagnostics.clone();
        }
        self.issues
            .iter()
            .map(LintIssue::format)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Clamp a raw rating into `[0, 10]`; NaN becomes 0.
#[must_use]
pub fn clamp_score(raw: f64) -> f64 {
    if raw.is_nan() {
        0.0
    } else {
        raw.clamp(0.0, MAX_SCORE)
    }
}

/// Outcome of one test run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestReport {
    pub passed: bool,
    /// Combined stdout/stderr.
    pub output: String,
    /// Short failure digest; empty when passed.
    pub failure_summary: String,
}

impl TestReport {
    #[must_use]
    pub fn passed(output: impl Into<String>) -> Self {
        Self {
            passed: true,
            output: output.into(),
            failure_summary: String::new(),
        }
    }

    #[must_use]
    pub fn failed(output: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            passed: false,
            output: output.into(),
            failure_summary: summary.into(),
        }
    }

    /// The most useful diagnostic text for remediation.
    #[must_use]
    pub fn diagnostics(&self) -> &str {
        if self.failure_summary.is_empty() {
            &self.output
        } else {
            &self.failure_summary
        }
    }
}

/// Scores source files.
#[async_trait]
pub trait QualityAnalyzer: Send + Sync {
    fn name(&self) -> &str;

    /// Analyze `files` together.
    ///
    /// An empty set yields [`QualityReport::perfect`]. Missing files are
    /// reported through the report, not as errors.
    ///
    /// # Errors
    ///
    /// Returns [`crate::SwarmError::ToolTimeout`] or
    /// [`crate::SwarmError::ToolExecution`] when the checker cannot produce
    /// a rating.
    async fn analyze(&self, files: &[PathBuf]) -> crate::Result<QualityReport>;
}

/// Executes test files.
#[async_trait]
pub trait TestRunner: Send + Sync {
    fn name(&self) -> &str;

    /// Run `tests` with `project_root` importable.
    ///
    /// Timeouts and missing test files are reported as failed runs.
    ///
    /// # Errors
    ///
    /// Only when the runner itself cannot be started.
    async fn run(&self, tests: &[PathBuf], project_root: &Path) -> crate::Result<TestReport>;
}

/// Rewrites a file in a canonical style. Best effort.
#[async_trait]
pub trait Formatter: Send + Sync {
    fn name(&self) -> &str;

    async fn format(&self, file: &Path) -> anyhow::Result<()>;
}
