//! Model-backed engines for remediation, test generation and feedback.
//!
//! # Architecture
//!
//! ```text
//! RemediationEngine ─┐
//! TestGenerationEngine ─┼──> prompts::* ──> LlmClient::run_prompt ──> response::parse_file_blocks
//! FeedbackEngine ────┘
//! ```
//!
//! The engines are provider-neutral: they only need something that turns a
//! prompt into text. [`CommandLlmClient`] shells out to a CLI (by default
//! `claude -p`) and passes the prompt on stdin.

pub mod engines;
pub mod prompts;
pub mod response;

pub use engines::{
    FeedbackEngine, FileContents, LlmFeedbackEngine, LlmRemediationEngine, LlmTestGenerator,
    RemediationEngine, RemediationRequest, SourceFile, TestGenerationEngine, TestGenerationRequest,
};
pub use response::{parse_file_blocks, ParsedResponse};

use crate::config::LlmConfig;
use crate::quality::ToolCommand;
use anyhow::Result;
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

/// Turns a prompt into model output.
///
/// Object-safe so engines can share one `Arc<dyn LlmClient>`.
///
/// # Example
///
/// ```rust,ignore
/// use refactor_swarm::llm::LlmClient;
///
/// async fn ask(client: &dyn LlmClient) -> anyhow::Result<String> {
///     client.run_prompt("Summarize this failure").await
/// }
/// ```
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Run a prompt and return the model's reply.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be reached, exits with a
    /// failure status or times out.
    async fn run_prompt(&self, prompt: &str) -> Result<String>;

    /// Human-readable model identifier, recorded in the audit log.
    fn model_name(&self) -> &str;
}

/// Client that pipes prompts into a command-line model tool.
#[derive(Debug, Clone)]
pub struct CommandLlmClient {
    command: String,
    args: Vec<String>,
    model: String,
    working_dir: Option<PathBuf>,
    timeout: Duration,
}

impl CommandLlmClient {
    #[must_use]
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            model: String::new(),
            working_dir: None,
            timeout: Duration::from_secs(120),
        }
    }

    #[must_use]
    pub fn from_config(config: &LlmConfig) -> Self {
        Self::new(&config.command)
            .with_args(config.args.clone())
            .with_model(&config.model)
            .with_timeout(Duration::from_millis(config.timeout_ms))
    }

    #[must_use]
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    /// Model passed as `--model <name>`; an empty name omits the flag.
    #[must_use]
    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    /// Directory the command runs in, normally the sandbox root.
    #[must_use]
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn command_args(&self) -> Vec<String> {
        let mut args = self.args.clone();
        if !self.model.is_empty() {
            args.push("--model".to_string());
            args.push(self.model.clone());
        }
        args
    }
}

#[async_trait]
impl LlmClient for CommandLlmClient {
    async fn run_prompt(&self, prompt: &str) -> Result<String> {
        debug!(
            "Running {} with model {} ({} chars prompt)",
            self.command,
            self.model_name(),
            prompt.len()
        );

        let mut command = ToolCommand::new(&self.command)
            .args(self.command_args())
            .stdin(prompt)
            .timeout(self.timeout);
        if let Some(dir) = &self.working_dir {
            command = command.current_dir(dir);
        }

        let output = command.run().await?;
        if !output.success() {
            anyhow::bail!(
                "{} exited with code {}: {}",
                self.command,
                output.code.unwrap_or(-1),
                output.stderr.trim()
            );
        }
        Ok(output.stdout)
    }

    fn model_name(&self) -> &str {
        if self.model.is_empty() {
            &self.command
        } else {
            &self.model
        }
    }
}
