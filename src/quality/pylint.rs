//! Pylint-backed quality analyzer.

use super::process::ToolCommand;
use super::{IssueSeverity, LintIssue, QualityAnalyzer, QualityReport};
use crate::config::ToolsConfig;
use crate::error::{Result, SwarmError};
use async_trait::async_trait;
use regex::Regex;
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, warn};

/// Runs `python -m pylint` over a batch and parses its rating.
#[derive(Debug, Clone)]
pub struct PylintAnalyzer {
    python: String,
    timeout: Duration,
    extra_args: Vec<String>,
}

impl PylintAnalyzer {
    #[must_use]
    pub fn new(python: impl Into<String>, timeout: Duration) -> Self {
        Self {
            python: python.into(),
            timeout,
            extra_args: Vec::new(),
        }
    }

    #[must_use]
    pub fn from_config(tools: &ToolsConfig) -> Self {
        Self::new(&tools.python, Duration::from_millis(tools.tool_timeout_ms))
            .with_args(tools.pylint_args.clone())
    }

    /// Additional pylint arguments, e.g. `--disable=C0301`.
    #[must_use]
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.extra_args = args;
        self
    }
}

/// Extract the score from `Your code has been rated at 7.50/10`.
///
/// Returns the raw value; negative ratings from older pylint versions are
/// left for the caller to clamp.
#[must_use]
pub fn parse_rating(stdout: &str) -> Option<f64> {
    static RATING: OnceLock<Option<Regex>> = OnceLock::new();
    let re = RATING
        .get_or_init(|| Regex::new(r"rated at (-?\d+\.\d+)").ok())
        .as_ref()?;
    re.captures(stdout)?.get(1)?.as_str().parse().ok()
}

/// Parse message lines of the default text reporter:
/// `order.py:12:4: W0612: Unused variable 'x' (unused-variable)`.
#[must_use]
pub fn parse_issues(stdout: &str) -> Vec<LintIssue> {
    static LINE: OnceLock<Option<Regex>> = OnceLock::new();
    let Some(re) = LINE
        .get_or_init(|| Regex::new(r"^(.+?):(\d+):(\d+): ([CRWEF]\d{4}): (.+)$").ok())
        .as_ref()
    else {
        return Vec::new();
    };

    stdout
        .lines()
        .filter_map(|line| {
            let caps = re.captures(line.trim_end())?;
            let code = caps.get(4)?.as_str();
            let severity = IssueSeverity::from_code(code)?;
            let line_no = caps.get(2)?.as_str().parse().ok()?;
            let column = caps.get(3)?.as_str().parse().ok()?;
            Some(
                LintIssue::new(severity, code, caps.get(5)?.as_str())
                    .with_location(caps.get(1)?.as_str(), line_no)
                    .with_column(column),
            )
        })
        .collect()
}

#[async_trait]
impl QualityAnalyzer for PylintAnalyzer {
    fn name(&self) -> &str {
        "pylint"
    }

    async fn analyze(&self, files: &[PathBuf]) -> Result<QualityReport> {
        if files.is_empty() {
            return Ok(QualityReport::perfect());
        }

        let missing: Vec<String> = files
            .iter()
            .filter(|f| !f.is_file())
            .map(|f| f.display().to_string())
            .collect();
        if !missing.is_empty() {
            warn!("pylint: missing input file(s): {}", missing.join(", "));
            return Ok(QualityReport::new(
                0.0,
                format!("File(s) not found: {}", missing.join(", ")),
            ));
        }

        let output = ToolCommand::new(&self.python)
            .args(["-m", "pylint"])
            .args(self.extra_args.iter().cloned())
            .args(files.iter().map(|f| f.display().to_string()))
            .timeout(self.timeout)
            .run()
            .await?;

        let Some(rating) = parse_rating(&output.stdout) else {
            return Err(SwarmError::tool(
                "pylint",
                format!(
                    "no rating in output (exit {:?}): {}",
                    output.code,
                    output.stderr.trim()
                ),
            ));
        };

        let issues = parse_issues(&output.stdout);
        debug!("pylint rated {:.2}/10 with {} issue(s)", rating, issues.len());

        Ok(QualityReport::new(rating, output.stdout).with_issues(issues))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "************* Module order
order.py:1:0: C0114: Missing module docstring (missing-module-docstring)
order.py:4:0: C0116: Missing function or method docstring (missing-function-docstring)
order.py:7:8: W0612: Unused variable 'tmp' (unused-variable)
order.py:9:11: E0602: Undefined variable 'totl' (undefined-variable)

------------------------------------------------------------------
Your code has been rated at 4.29/10 (previous run: 3.00/10, +1.29)
";

    #[test]
    fn test_parse_rating() {
        assert_eq!(parse_rating(SAMPLE), Some(4.29));
        assert_eq!(parse_rating("Your code has been rated at -2.50/10"), Some(-2.5));
        assert_eq!(parse_rating("no rating here"), None);
    }

    #[test]
    fn test_parse_issues() {
        let issues = parse_issues(SAMPLE);
        assert_eq!(issues.len(), 4);
        assert_eq!(issues[0].code, "C0114");
        assert_eq!(issues[0].line, Some(1));
        assert_eq!(issues[2].severity, IssueSeverity::Warning);
        assert_eq!(issues[2].column, Some(8));
        assert_eq!(issues[3].severity, IssueSeverity::Error);
        assert_eq!(issues[3].file, Some(PathBuf::from("order.py")));
    }

    #[test]
    fn test_rating_lines_are_not_issues() {
        assert!(parse_issues("Your code has been rated at 10.00/10").is_empty());
    }

    #[test]
    fn test_from_config_carries_extra_args() {
        let tools = ToolsConfig {
            pylint_args: vec!["--disable=C0301".to_string()],
            ..ToolsConfig::default()
        };
        let analyzer = PylintAnalyzer::from_config(&tools);
        assert_eq!(analyzer.extra_args, vec!["--disable=C0301".to_string()]);
        assert_eq!(analyzer.python, "python3");
    }

    #[tokio::test]
    async fn test_empty_input_is_perfect() {
        let analyzer = PylintAnalyzer::new("python3", Duration::from_secs(1));
        let report = analyzer.analyze(&[]).await.unwrap();
        assert_eq!(report.score, 10.0);
    }

    #[tokio::test]
    async fn test_missing_file_scores_zero() {
        let dir = tempfile::TempDir::new().unwrap();
        let analyzer = PylintAnalyzer::new("python3", Duration::from_secs(1));
        let report = analyzer
            .analyze(&[dir.path().join("ghost.py")])
            .await
            .unwrap();
        assert_eq!(report.score, 0.0);
        assert!(report.diagnostics.contains("ghost.py"));
    }

    #[tokio::test]
    async fn test_unavailable_interpreter_is_tool_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let file = dir.path().join("a.py");
        std::fs::write(&file, "x = 1\n").unwrap();
        let analyzer = PylintAnalyzer::new("no-such-python-8812", Duration::from_secs(1));
        let err = analyzer.analyze(&[file]).await.unwrap_err();
        assert!(matches!(err, SwarmError::ToolExecution { .. }));
    }
}
