//! Bounded subprocess execution for external tools.
//!
//! Every collaborator that shells out (pylint, pytest, black, the LLM CLI)
//! goes through [`ToolCommand`], which applies one wall-clock timeout to
//! the whole exchange: spawn, stdin write and output collection. The child
//! is killed when the timeout fires.

use crate::error::{Result, SwarmError};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command as AsyncCommand;
use tracing::debug;

/// Captured result of a finished tool process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` when terminated by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    #[must_use]
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Stdout followed by stderr, skipping empty streams.
    #[must_use]
    pub fn combined(&self) -> String {
        match (self.stdout.trim().is_empty(), self.stderr.trim().is_empty()) {
            (false, false) => format!("{}\n{}", self.stdout, self.stderr),
            (false, true) => self.stdout.clone(),
            (true, false) => self.stderr.clone(),
            (true, true) => String::new(),
        }
    }
}

impl From<std::process::Output> for CommandOutput {
    fn from(output: std::process::Output) -> Self {
        Self {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }
    }
}

/// Builder for a single timed tool invocation.
///
/// # Example
///
/// ```rust,ignore
/// use refactor_swarm::quality::process::ToolCommand;
/// use std::time::Duration;
///
/// let output = ToolCommand::new("python3")
///     .args(["-m", "pylint", "inventory.py"])
///     .timeout(Duration::from_secs(30))
///     .run()
///     .await?;
/// ```
#[derive(Debug, Clone)]
pub struct ToolCommand {
    program: String,
    args: Vec<String>,
    cwd: Option<PathBuf>,
    envs: Vec<(String, String)>,
    stdin: Option<String>,
    timeout: Duration,
}

impl ToolCommand {
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            envs: Vec::new(),
            stdin: None,
            timeout: Duration::from_secs(30),
        }
    }

    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }

    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// Text written to the child's stdin before collecting output.
    #[must_use]
    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Name of the program, used in error reports.
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Run to completion.
    ///
    /// A non-zero exit is not an error; callers inspect [`CommandOutput`].
    ///
    /// # Errors
    ///
    /// - [`SwarmError::ToolTimeout`] when the deadline passes
    /// - [`SwarmError::ToolExecution`] when the process cannot be spawned or
    ///   its pipes fail
    pub async fn run(self) -> Result<CommandOutput> {
        let timeout_ms = u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX);
        let program = self.program.clone();

        let mut cmd = AsyncCommand::new(&self.program);
        cmd.args(&self.args)
            .kill_on_drop(true)
            .stdin(if self.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &self.cwd {
            cmd.current_dir(dir);
        }
        for (key, value) in &self.envs {
            cmd.env(key, value);
        }

        debug!("Running {} {}", self.program, self.args.join(" "));

        let mut child = cmd
            .spawn()
            .map_err(|e| SwarmError::tool(&program, format!("failed to spawn: {}", e)))?;

        let input = self.stdin;
        let exchange = async move {
            if let (Some(text), Some(mut stdin)) = (input, child.stdin.take()) {
                stdin.write_all(text.as_bytes()).await?;
                stdin.flush().await?;
                drop(stdin);
            }
            child.wait_with_output().await
        };

        match tokio::time::timeout(self.timeout, exchange).await {
            Ok(Ok(output)) => Ok(CommandOutput::from(output)),
            Ok(Err(e)) => Err(SwarmError::tool(program, e.to_string())),
            Err(_) => Err(SwarmError::timeout(program, timeout_ms)),
        }
    }
}

/// Check whether a tool binary can be found on `PATH`.
#[must_use]
pub fn is_tool_available(tool: &str) -> bool {
    which::which(tool).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_combined_output() {
        let out = CommandOutput {
            code: Some(1),
            stdout: "out".into(),
            stderr: "err".into(),
        };
        assert_eq!(out.combined(), "out\nerr");
        assert!(!out.success());

        let only_err = CommandOutput {
            code: Some(0),
            stdout: "  ".into(),
            stderr: "err".into(),
        };
        assert_eq!(only_err.combined(), "err");
        assert!(only_err.success());
    }

    #[tokio::test]
    async fn test_missing_program_is_tool_error() {
        let err = ToolCommand::new("definitely-not-a-real-binary-4821")
            .run()
            .await
            .unwrap_err();
        assert!(matches!(err, SwarmError::ToolExecution { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_captures_output_and_stdin() {
        let out = ToolCommand::new("cat").stdin("hello").run().await.unwrap();
        assert!(out.success());
        assert_eq!(out.stdout, "hello");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_kills_child() {
        let err = ToolCommand::new("sleep")
            .arg("5")
            .timeout(Duration::from_millis(100))
            .run()
            .await
            .unwrap_err();
        assert!(matches!(err, SwarmError::ToolTimeout { timeout_ms: 100, .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_env_and_cwd() {
        let dir = tempfile::TempDir::new().unwrap();
        let out = ToolCommand::new("sh")
            .args(["-c", "echo $SWARM_PROBE; pwd"])
            .env("SWARM_PROBE", "probe-value")
            .current_dir(dir.path())
            .run()
            .await
            .unwrap();
        assert!(out.stdout.contains("probe-value"));
    }

    #[test]
    fn test_tool_availability() {
        assert!(!is_tool_available("definitely-not-a-real-binary-4821"));
    }
}
