//! Configuration management for refactor-swarm.
//!
//! Settings are read from `refactor-swarm.toml` in the target directory (or an
//! explicit path) and fall back to defaults when the file is absent. CLI flags
//! are applied on top by the binary.

use crate::error::{Result, SwarmError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};

/// Name of the per-project settings file.
pub const CONFIG_FILE_NAME: &str = "refactor-swarm.toml";

/// Directories never scanned for source files.
pub fn default_ignore_dirs() -> HashSet<&'static str> {
    [
        ".git",
        ".hg",
        ".svn",
        ".venv",
        "venv",
        ".env",
        "__pycache__",
        ".pytest_cache",
        ".mypy_cache",
        ".ruff_cache",
        ".tox",
        "build",
        "dist",
        "node_modules",
        ".swarm",
    ]
    .into_iter()
    .collect()
}

/// External tool settings (analyzer, test runner, formatter).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Python interpreter used to launch pylint and pytest as modules.
    #[serde(default = "default_python")]
    pub python: String,

    /// Per-invocation timeout for analyzer and test runner.
    #[serde(default = "default_tool_timeout_ms")]
    pub tool_timeout_ms: u64,

    /// Run the formatter over every file before batching.
    #[serde(default = "default_true")]
    pub format_enabled: bool,

    /// Extra pylint arguments, e.g. `["--disable=C0301"]`.
    #[serde(default)]
    pub pylint_args: Vec<String>,
}

fn default_python() -> String {
    "python3".to_string()
}

fn default_tool_timeout_ms() -> u64 {
    30_000
}

fn default_true() -> bool {
    true
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            python: default_python(),
            tool_timeout_ms: default_tool_timeout_ms(),
            format_enabled: true,
            pylint_args: Vec::new(),
        }
    }
}

/// Settings for the command-line model client backing the engines.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Executable that reads a prompt on stdin and prints the reply.
    #[serde(default = "default_llm_command")]
    pub command: String,

    /// Extra arguments passed before the model flag.
    #[serde(default = "default_llm_args")]
    pub args: Vec<String>,

    /// Model name passed with `--model`; omitted when empty.
    #[serde(default)]
    pub model: String,

    /// Per-call timeout.
    #[serde(default = "default_llm_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_llm_command() -> String {
    "claude".to_string()
}

fn default_llm_args() -> Vec<String> {
    vec!["-p".to_string(), "--output-format".to_string(), "text".to_string()]
}

fn default_llm_timeout_ms() -> u64 {
    120_000
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            command: default_llm_command(),
            args: default_llm_args(),
            model: String::new(),
            timeout_ms: default_llm_timeout_ms(),
        }
    }
}

/// Top-level run configuration.
///
/// # Example
///
/// ```
/// use refactor_swarm::config::SwarmConfig;
///
/// let config = SwarmConfig::default();
/// assert_eq!(config.max_iterations, 7);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwarmConfig {
    /// Analyzer score at or above which remediation is skipped.
    #[serde(default = "default_quality_threshold")]
    pub quality_threshold: f64,

    /// Verification failures allowed per batch before abandoning it.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Pause between consecutive batches.
    #[serde(default = "default_rate_limit_delay_ms")]
    pub rate_limit_delay_ms: u64,

    /// Directory under which per-run sandboxes are created.
    #[serde(default = "default_sandbox_root")]
    pub sandbox_root: PathBuf,

    /// Directory (relative to the sandbox) holding test files.
    #[serde(default = "default_test_dir")]
    pub test_dir: PathBuf,

    #[serde(default)]
    pub tools: ToolsConfig,

    #[serde(default)]
    pub llm: LlmConfig,
}

fn default_quality_threshold() -> f64 {
    9.25
}

fn default_max_iterations() -> u32 {
    7
}

fn default_rate_limit_delay_ms() -> u64 {
    4_000
}

fn default_sandbox_root() -> PathBuf {
    PathBuf::from("./sandbox")
}

fn default_test_dir() -> PathBuf {
    PathBuf::from("tests")
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            quality_threshold: default_quality_threshold(),
            max_iterations: default_max_iterations(),
            rate_limit_delay_ms: default_rate_limit_delay_ms(),
            sandbox_root: default_sandbox_root(),
            test_dir: default_test_dir(),
            tools: ToolsConfig::default(),
            llm: LlmConfig::default(),
        }
    }
}

impl SwarmConfig {
    /// Load configuration for a target directory.
    ///
    /// Reads `refactor-swarm.toml` from the directory if present, otherwise
    /// returns defaults.
    pub fn load(target_dir: &Path) -> Result<Self> {
        let path = Self::settings_path(target_dir);
        if path.exists() {
            Self::load_file(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from an explicit file.
    pub fn load_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            SwarmError::config_with_path(format!("cannot read: {}", e), path.to_path_buf())
        })?;
        let config: SwarmConfig = toml::from_str(&content).map_err(|e| {
            SwarmError::config_with_path(format!("cannot parse: {}", e), path.to_path_buf())
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Get the settings file path for a target directory
    pub fn settings_path(target_dir: &Path) -> PathBuf {
        target_dir.join(CONFIG_FILE_NAME)
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=10.0).contains(&self.quality_threshold) {
            return Err(SwarmError::InvalidConfig {
                field: "quality_threshold".to_string(),
                reason: format!("{} is outside [0, 10]", self.quality_threshold),
            });
        }
        if self.max_iterations == 0 {
            return Err(SwarmError::InvalidConfig {
                field: "max_iterations".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.tools.tool_timeout_ms == 0 || self.llm.timeout_ms == 0 {
            return Err(SwarmError::InvalidConfig {
                field: "timeout_ms".to_string(),
                reason: "timeouts must be non-zero".to_string(),
            });
        }
        let contained = self
            .test_dir
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        if !contained || self.test_dir.file_name().is_none() {
            return Err(SwarmError::InvalidConfig {
                field: "test_dir".to_string(),
                reason: format!(
                    "{} must be a relative directory inside the project",
                    self.test_dir.display()
                ),
            });
        }
        Ok(())
    }

    #[must_use]
    pub fn with_quality_threshold(mut self, threshold: f64) -> Self {
        self.quality_threshold = threshold;
        self
    }

    #[must_use]
    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max;
        self
    }

    #[must_use]
    pub fn with_rate_limit_delay_ms(mut self, delay_ms: u64) -> Self {
        self.rate_limit_delay_ms = delay_ms;
        self
    }

    #[must_use]
    pub fn with_sandbox_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.sandbox_root = root.into();
        self
    }
}
