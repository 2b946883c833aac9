//! Custom error types for refactor-swarm.
//!
//! This module provides structured error types that separate the failures
//! which abort a whole run (sandbox setup, invalid target) from the
//! per-batch failures that are folded into a batch verdict.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for refactor-swarm operations
#[derive(Error, Debug)]
pub enum SwarmError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Failed to load configuration
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        path: Option<PathBuf>,
    },

    /// Invalid configuration value
    #[error("Invalid configuration: {field} - {reason}")]
    InvalidConfig { field: String, reason: String },

    /// Target directory missing or not a directory
    #[error("Target directory not found: {path}")]
    InvalidTarget { path: PathBuf },

    // =========================================================================
    // Sandbox Errors
    // =========================================================================
    /// Sandbox copy could not be created
    #[error("Sandbox setup failed for {target}: {message}")]
    SandboxSetup { target: PathBuf, message: String },

    /// Read or write outside the sandbox root
    #[error("Path violation: {path} is outside sandbox {root}")]
    PathViolation { path: PathBuf, root: PathBuf },

    // =========================================================================
    // Refinement Errors
    // =========================================================================
    /// Structural parse failed; heuristic extraction was used instead
    #[error("Parse failure in {file}: {message}")]
    ParseFailure { file: PathBuf, message: String },

    /// External tool exceeded its time budget
    #[error("Tool '{tool}' timed out after {timeout_ms}ms")]
    ToolTimeout { tool: String, timeout_ms: u64 },

    /// External tool could not be executed
    #[error("Tool '{tool}' failed: {message}")]
    ToolExecution { tool: String, message: String },

    /// Remediation engine returned nothing usable
    #[error("Remediation produced no usable output: {reason}")]
    RemediationNoOutput { reason: String },

    /// Batch reached its retry bound
    #[error("Maximum iterations ({max}) exceeded without passing verification")]
    MaxIterationsExceeded { max: u32 },

    // =========================================================================
    // Wrapped Errors
    // =========================================================================
    /// IO error wrapper
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON error wrapper
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// TOML error wrapper
    #[error(transparent)]
    Toml(#[from] toml::de::Error),

    /// Generic error wrapper
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SwarmError {
    // =========================================================================
    // Constructor helpers
    // =========================================================================

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            path: None,
        }
    }

    /// Create a configuration error with path
    pub fn config_with_path(message: impl Into<String>, path: PathBuf) -> Self {
        Self::Config {
            message: message.into(),
            path: Some(path),
        }
    }

    /// Create a sandbox setup error
    pub fn sandbox(target: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::SandboxSetup {
            target: target.into(),
            message: message.into(),
        }
    }

    /// Create a path violation error
    pub fn path_violation(path: impl Into<PathBuf>, root: impl Into<PathBuf>) -> Self {
        Self::PathViolation {
            path: path.into(),
            root: root.into(),
        }
    }

    /// Create a tool execution error
    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ToolExecution {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Create a tool timeout error
    pub fn timeout(tool: impl Into<String>, timeout_ms: u64) -> Self {
        Self::ToolTimeout {
            tool: tool.into(),
            timeout_ms,
        }
    }

    /// Create a remediation no-output error
    pub fn no_output(reason: impl Into<String>) -> Self {
        Self::RemediationNoOutput {
            reason: reason.into(),
        }
    }

    // =========================================================================
    // Classification helpers
    // =========================================================================

    /// Check if this error aborts the whole run
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::SandboxSetup { .. }
                | Self::InvalidTarget { .. }
                | Self::Config { .. }
                | Self::InvalidConfig { .. }
        )
    }

    /// Get error code for exit status
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::InvalidTarget { .. } => 2,
            Self::SandboxSetup { .. } => 3,
            Self::PathViolation { .. } => 4,
            Self::Config { .. } | Self::InvalidConfig { .. } | Self::Toml(_) => 7,
            _ => 1,
        }
    }
}

/// Type alias for refactor-swarm results
pub type Result<T> = std::result::Result<T, SwarmError>;

/// Extension trait for converting foreign errors to SwarmError
pub trait IntoSwarmError<T> {
    fn into_swarm_config(self) -> Result<T>;
    fn into_swarm_sandbox(self, target: &std::path::Path) -> Result<T>;
    fn into_swarm_tool(self, tool: &str) -> Result<T>;
}

impl<T, E: Into<anyhow::Error>> IntoSwarmError<T> for std::result::Result<T, E> {
    fn into_swarm_config(self) -> Result<T> {
        self.map_err(|e| SwarmError::config(e.into().to_string()))
    }

    fn into_swarm_sandbox(self, target: &std::path::Path) -> Result<T> {
        self.map_err(|e| SwarmError::sandbox(target, e.into().to_string()))
    }

    fn into_swarm_tool(self, tool: &str) -> Result<T> {
        self.map_err(|e| SwarmError::tool(tool, e.into().to_string()))
    }
}
