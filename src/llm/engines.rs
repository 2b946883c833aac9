//! Engine capabilities used by the refinement loop, and their model-backed
//! implementations.

use super::prompts;
use super::response::parse_file_blocks;
use super::LlmClient;
use crate::context::ContextSnapshot;
use anyhow::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

/// File name → full content, as returned by an engine.
pub type FileContents = BTreeMap<String, String>;

/// One file handed to an engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// Path relative to the sandbox root, used as the `FILE:` name.
    pub name: String,
    pub path: PathBuf,
    pub content: String,
}

/// Everything a remediation step may look at.
#[derive(Debug, Clone, PartialEq)]
pub struct RemediationRequest {
    pub files: Vec<SourceFile>,
    /// Raw style checker output; may be empty.
    pub style_diagnostics: String,
    /// Test failure feedback from the last verification; may be empty.
    pub verification_diagnostics: String,
    pub context: ContextSnapshot,
}

impl RemediationRequest {
    #[must_use]
    pub fn file_names(&self) -> Vec<String> {
        self.files.iter().map(|f| f.name.clone()).collect()
    }
}

/// Input for generating a batch's test files.
#[derive(Debug, Clone, PartialEq)]
pub struct TestGenerationRequest {
    pub files: Vec<SourceFile>,
    /// Test file names to produce, relative to the sandbox root.
    pub targets: Vec<String>,
    pub context: ContextSnapshot,
}

/// Rewrites source files.
#[async_trait]
pub trait RemediationEngine: Send + Sync {
    fn name(&self) -> &str;

    /// Return new content per file. An empty map means "no usable output".
    async fn remediate(&self, request: &RemediationRequest) -> Result<FileContents>;
}

/// Writes test files for a batch.
#[async_trait]
pub trait TestGenerationEngine: Send + Sync {
    fn name(&self) -> &str;

    async fn generate_tests(&self, request: &TestGenerationRequest) -> Result<FileContents>;
}

/// Turns raw test output into per-file fix instructions.
#[async_trait]
pub trait FeedbackEngine: Send + Sync {
    fn name(&self) -> &str;

    async fn formalize(&self, failure_output: &str, files: &[String]) -> Result<String>;
}

/// [`RemediationEngine`] backed by an [`LlmClient`].
pub struct LlmRemediationEngine {
    client: Arc<dyn LlmClient>,
}

impl LlmRemediationEngine {
    #[must_use]
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RemediationEngine for LlmRemediationEngine {
    fn name(&self) -> &str {
        self.client.model_name()
    }

    async fn remediate(&self, request: &RemediationRequest) -> Result<FileContents> {
        let prompt = prompts::remediation_prompt(request);
        let reply = self.client.run_prompt(&prompt).await?;
        let files = parse_file_blocks(&reply).into_files(&request.file_names());
        if files.is_empty() {
            warn!("Remediation reply contained no code blocks");
        }
        debug!("Remediation returned {} file(s)", files.len());
        Ok(files)
    }
}

/// [`TestGenerationEngine`] backed by an [`LlmClient`].
pub struct LlmTestGenerator {
    client: Arc<dyn LlmClient>,
}

impl LlmTestGenerator {
    #[must_use]
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl TestGenerationEngine for LlmTestGenerator {
    fn name(&self) -> &str {
        self.client.model_name()
    }

    async fn generate_tests(&self, request: &TestGenerationRequest) -> Result<FileContents> {
        let prompt = prompts::test_generation_prompt(request);
        let reply = self.client.run_prompt(&prompt).await?;
        Ok(parse_file_blocks(&reply).into_files(&request.targets))
    }
}

/// [`FeedbackEngine`] backed by an [`LlmClient`].
pub struct LlmFeedbackEngine {
    client: Arc<dyn LlmClient>,
}

impl LlmFeedbackEngine {
    #[must_use]
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl FeedbackEngine for LlmFeedbackEngine {
    fn name(&self) -> &str {
        self.client.model_name()
    }

    async fn formalize(&self, failure_output: &str, files: &[String]) -> Result<String> {
        let prompt = prompts::feedback_prompt(failure_output, files);
        let reply = self.client.run_prompt(&prompt).await?;
        let reply = reply.trim();
        if reply.is_empty() {
            anyhow::bail!("feedback reply was empty");
        }
        Ok(reply.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockLlmClient;

    fn request() -> RemediationRequest {
        RemediationRequest {
            files: vec![SourceFile {
                name: "order.py".into(),
                path: PathBuf::from("/sb/order.py"),
                content: "def total(x):\n    return x\n".into(),
            }],
            style_diagnostics: "C0114: Missing module docstring".into(),
            verification_diagnostics: String::new(),
            context: ContextSnapshot::default(),
        }
    }

    #[tokio::test]
    async fn test_remediation_parses_reply() {
        let client = Arc::new(MockLlmClient::new().with_response(
            "FILE: order.py\n```python\n\"\"\"Orders.\"\"\"\n```\n",
        ));
        let engine = LlmRemediationEngine::new(client.clone());
        let files = engine.remediate(&request()).await.unwrap();
        assert_eq!(files["order.py"], "\"\"\"Orders.\"\"\"\n");
        assert_eq!(client.call_count(), 1);

        let prompt = &client.prompts()[0];
        assert!(prompt.contains("C0114"));
        assert!(prompt.contains("def total(x)"));
    }

    #[tokio::test]
    async fn test_remediation_without_code_is_empty() {
        let client = Arc::new(MockLlmClient::new().with_response("Sorry, no."));
        let engine = LlmRemediationEngine::new(client);
        assert!(engine.remediate(&request()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_remediation_propagates_client_error() {
        let client = Arc::new(MockLlmClient::new().with_error("rate limited"));
        let engine = LlmRemediationEngine::new(client);
        let err = engine.remediate(&request()).await.unwrap_err();
        assert!(err.to_string().contains("rate limited"));
    }

    #[tokio::test]
    async fn test_generator_maps_single_block_to_target() {
        let client = Arc::new(
            MockLlmClient::new().with_response("```python\ndef test_ok():\n    assert True\n```"),
        );
        let generator = LlmTestGenerator::new(client);
        let req = TestGenerationRequest {
            files: request().files,
            targets: vec!["tests/test_order.py".into()],
            context: ContextSnapshot::default(),
        };
        let files = generator.generate_tests(&req).await.unwrap();
        assert!(files["tests/test_order.py"].contains("def test_ok"));
    }

    #[tokio::test]
    async fn test_feedback_rejects_blank_reply() {
        let client = Arc::new(MockLlmClient::new().with_response("   \n"));
        let engine = LlmFeedbackEngine::new(client);
        assert!(engine.formalize("E assert 1 == 2", &["a.py".into()]).await.is_err());
    }

    #[tokio::test]
    async fn test_feedback_returns_trimmed_reply() {
        let client = Arc::new(MockLlmClient::new().with_response("\n- a.py: fix total()\n"));
        let engine = LlmFeedbackEngine::new(client);
        let text = engine.formalize("E assert 1 == 2", &["a.py".into()]).await.unwrap();
        assert_eq!(text, "- a.py: fix total()");
    }
}
