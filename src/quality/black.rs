//! Black formatter, run once per file before batching.

use super::process::{is_tool_available, ToolCommand};
use super::Formatter;
use crate::config::ToolsConfig;
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Formats files in place with `black`.
///
/// Uses the `black` binary when it is on `PATH`, otherwise
/// `python -m black`.
#[derive(Debug, Clone)]
pub struct BlackFormatter {
    python: String,
    timeout: Duration,
}

impl BlackFormatter {
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

    fn command(&self) -> ToolCommand {
        if is_tool_available("black") {
            ToolCommand::new("black")
        } else {
            ToolCommand::new(&self.python).args(["-m", "black"])
        }
    }
}

#[async_trait]
impl Formatter for BlackFormatter {
    fn name(&self) -> &str {
        "black"
    }

    async fn format(&self, file: &Path) -> anyhow::Result<()> {
        let output = self
            .command()
            .arg("-q")
            .arg(file.display().to_string())
            .timeout(self.timeout)
            .run()
            .await?;

        if !output.success() {
            anyhow::bail!(
                "black exited with {:?}: {}",
                output.code,
                output.stderr.trim()
            );
        }
        debug!("Formatted {}", file.display());
        Ok(())
    }
}
