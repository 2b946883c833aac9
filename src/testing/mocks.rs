//! Controllable collaborator doubles.
//!
//! Every mock answers from a FIFO queue first and falls back to a default
//! once the queue is drained, so tests only script the calls they care
//! about. Call counts are tracked with atomics; queues sit behind a mutex so
//! the mocks can be shared through `Arc` and scripted after construction.

use crate::error::SwarmError;
use crate::llm::{
    FeedbackEngine, FileContents, LlmClient, RemediationEngine, RemediationRequest,
    TestGenerationEngine, TestGenerationRequest,
};
use crate::quality::{Formatter, QualityAnalyzer, QualityReport, TestReport, TestRunner};
use anyhow::{bail, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

fn to_files(files: &[(&str, &str)]) -> FileContents {
    files
        .iter()
        .map(|(name, content)| ((*name).to_string(), (*content).to_string()))
        .collect()
}

async fn pause(delay: &Mutex<Option<Duration>>) {
    let delay = *lock(delay);
    if let Some(d) = delay {
        tokio::time::sleep(d).await;
    }
}

// =============================================================================
// Quality analyzer
// =============================================================================

/// Analyzer returning scripted scores.
///
/// Reports carry the diagnostics text `mock diagnostics for N file(s)`.
#[derive(Debug)]
pub struct MockQualityAnalyzer {
    queue: Mutex<VecDeque<std::result::Result<f64, String>>>,
    default_score: Mutex<f64>,
    delay: Mutex<Option<Duration>>,
    call_count: AtomicU32,
}

impl Default for MockQualityAnalyzer {
    fn default() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            default_score: Mutex::new(10.0),
            delay: Mutex::new(None),
            call_count: AtomicU32::new(0),
        }
    }
}

impl MockQualityAnalyzer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_score(&self, score: f64) {
        lock(&self.queue).push_back(Ok(score));
    }

    pub fn push_error(&self, message: &str) {
        lock(&self.queue).push_back(Err(message.to_string()));
    }

    /// Score used once the queue is empty.
    pub fn set_default_score(&self, score: f64) {
        *lock(&self.default_score) = score;
    }

    pub fn set_delay(&self, delay: Duration) {
        *lock(&self.delay) = Some(delay);
    }

    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QualityAnalyzer for MockQualityAnalyzer {
    fn name(&self) -> &str {
        "mock-analyzer"
    }

    async fn analyze(&self, files: &[PathBuf]) -> crate::Result<QualityReport> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        let next = lock(&self.queue).pop_front();
        pause(&self.delay).await;
        let score = match next {
            Some(Ok(score)) => score,
            Some(Err(message)) => return Err(SwarmError::tool("mock-analyzer", message)),
            None => *lock(&self.default_score),
        };
        Ok(QualityReport::new(
            score,
            format!("mock diagnostics for {} file(s)", files.len()),
        ))
    }
}

// =============================================================================
// Test runner
// =============================================================================

/// Runner returning scripted reports. Passes by default.
#[derive(Debug)]
pub struct MockTestRunner {
    queue: Mutex<VecDeque<TestReport>>,
    default: Mutex<TestReport>,
    delay: Mutex<Option<Duration>>,
    calls: Mutex<Vec<Vec<PathBuf>>>,
    call_count: AtomicU32,
}

impl Default for MockTestRunner {
    fn default() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            default: Mutex::new(TestReport::passed("mock: all passed")),
            delay: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
            call_count: AtomicU32::new(0),
        }
    }
}

impl MockTestRunner {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, report: TestReport) {
        lock(&self.queue).push_back(report);
    }

    pub fn set_default(&self, report: TestReport) {
        *lock(&self.default) = report;
    }

    pub fn set_delay(&self, delay: Duration) {
        *lock(&self.delay) = Some(delay);
    }

    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Test paths passed to each run.
    pub fn calls(&self) -> Vec<Vec<PathBuf>> {
        lock(&self.calls).clone()
    }
}

#[async_trait]
impl TestRunner for MockTestRunner {
    fn name(&self) -> &str {
        "mock-runner"
    }

    async fn run(&self, tests: &[PathBuf], _project_root: &Path) -> crate::Result<TestReport> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        lock(&self.calls).push(tests.to_vec());
        let next = lock(&self.queue).pop_front();
        pause(&self.delay).await;
        Ok(next.unwrap_or_else(|| lock(&self.default).clone()))
    }
}

// =============================================================================
// Remediation engine
// =============================================================================

/// Remediation engine returning scripted file sets. Returns nothing by
/// default.
#[derive(Debug, Default)]
pub struct MockRemediationEngine {
    queue: Mutex<VecDeque<std::result::Result<FileContents, String>>>,
    default: Mutex<FileContents>,
    delay: Mutex<Option<Duration>>,
    requests: Mutex<Vec<RemediationRequest>>,
    call_count: AtomicU32,
}

impl MockRemediationEngine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_files(&self, files: &[(&str, &str)]) {
        lock(&self.queue).push_back(Ok(to_files(files)));
    }

    pub fn push_error(&self, message: &str) {
        lock(&self.queue).push_back(Err(message.to_string()));
    }

    pub fn set_default_files(&self, files: &[(&str, &str)]) {
        *lock(&self.default) = to_files(files);
    }

    pub fn set_delay(&self, delay: Duration) {
        *lock(&self.delay) = Some(delay);
    }

    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<RemediationRequest> {
        lock(&self.requests).last().cloned()
    }
}

#[async_trait]
impl RemediationEngine for MockRemediationEngine {
    fn name(&self) -> &str {
        "mock-remediation"
    }

    async fn remediate(&self, request: &RemediationRequest) -> Result<FileContents> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        lock(&self.requests).push(request.clone());
        let next = lock(&self.queue).pop_front();
        pause(&self.delay).await;
        match next {
            Some(Ok(files)) => Ok(files),
            Some(Err(message)) => bail!("{}", message),
            None => Ok(lock(&self.default).clone()),
        }
    }
}

// =============================================================================
// Test generator
// =============================================================================

/// Test generator returning a fixed file set. Returns nothing by default.
#[derive(Debug, Default)]
pub struct MockTestGenerator {
    default: Mutex<FileContents>,
    error: Mutex<Option<String>>,
    requests: Mutex<Vec<TestGenerationRequest>>,
    call_count: AtomicU32,
}

impl MockTestGenerator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_default_files(&self, files: &[(&str, &str)]) {
        *lock(&self.default) = to_files(files);
    }

    pub fn fail_with(&self, message: &str) {
        *lock(&self.error) = Some(message.to_string());
    }

    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<TestGenerationRequest> {
        lock(&self.requests).last().cloned()
    }
}

#[async_trait]
impl TestGenerationEngine for MockTestGenerator {
    fn name(&self) -> &str {
        "mock-test-generator"
    }

    async fn generate_tests(&self, request: &TestGenerationRequest) -> Result<FileContents> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        lock(&self.requests).push(request.clone());
        if let Some(message) = lock(&self.error).clone() {
            bail!("{}", message);
        }
        Ok(lock(&self.default).clone())
    }
}

// =============================================================================
// Feedback engine
// =============================================================================

/// Feedback engine echoing scripted replies.
#[derive(Debug, Default)]
pub struct MockFeedbackEngine {
    replies: Mutex<VecDeque<String>>,
    error: Mutex<Option<String>>,
    call_count: AtomicU32,
}

impl MockFeedbackEngine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_reply(&self, reply: &str) {
        lock(&self.replies).push_back(reply.to_string());
    }

    /// Every call fails with `message`.
    pub fn fail_with(&self, message: &str) {
        *lock(&self.error) = Some(message.to_string());
    }

    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FeedbackEngine for MockFeedbackEngine {
    fn name(&self) -> &str {
        "mock-feedback"
    }

    async fn formalize(&self, failure_output: &str, files: &[String]) -> Result<String> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = lock(&self.error).clone() {
            bail!("{}", message);
        }
        let next = lock(&self.replies).pop_front();
        Ok(next.unwrap_or_else(|| {
            format!(
                "- {}: {}",
                files.join(", "),
                failure_output.lines().next().unwrap_or("tests failed")
            )
        }))
    }
}

// =============================================================================
// Formatter
// =============================================================================

/// Formatter that only records the paths it was handed.
#[derive(Debug, Default)]
pub struct MockFormatter {
    formatted: Mutex<Vec<PathBuf>>,
}

impl MockFormatter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn formatted(&self) -> Vec<PathBuf> {
        lock(&self.formatted).clone()
    }
}

#[async_trait]
impl Formatter for MockFormatter {
    fn name(&self) -> &str {
        "mock-formatter"
    }

    async fn format(&self, file: &Path) -> Result<()> {
        lock(&self.formatted).push(file.to_path_buf());
        Ok(())
    }
}

// =============================================================================
// LLM client
// =============================================================================

/// In-memory [`LlmClient`].
///
/// ```rust,ignore
/// let client = MockLlmClient::new().with_response("FILE: a.py\n```python\nx = 1\n```");
/// assert_eq!(client.run_prompt("fix").await?.len(), 30);
/// ```
#[derive(Debug)]
pub struct MockLlmClient {
    responses: Mutex<VecDeque<String>>,
    response: String,
    error: Option<String>,
    model: String,
    prompts: Mutex<Vec<String>>,
    call_count: AtomicU32,
}

impl Default for MockLlmClient {
    fn default() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            response: String::new(),
            error: None,
            model: "mock-llm".to_string(),
            prompts: Mutex::new(Vec::new()),
            call_count: AtomicU32::new(0),
        }
    }
}

impl MockLlmClient {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reply returned once scripted responses run out.
    #[must_use]
    pub fn with_response(mut self, response: &str) -> Self {
        self.response = response.to_string();
        self
    }

    /// Replies returned in order before falling back to the default.
    #[must_use]
    pub fn with_responses(self, responses: &[&str]) -> Self {
        lock(&self.responses).extend(responses.iter().map(|r| (*r).to_string()));
        self
    }

    #[must_use]
    pub fn with_error(mut self, error: &str) -> Self {
        self.error = Some(error.to_string());
        self
    }

    #[must_use]
    pub fn with_model_name(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Every prompt received so far.
    pub fn prompts(&self) -> Vec<String> {
        lock(&self.prompts).clone()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn run_prompt(&self, prompt: &str) -> Result<String> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        lock(&self.prompts).push(prompt.to_string());
        if let Some(error) = &self.error {
            bail!("{}", error);
        }
        let next = lock(&self.responses).pop_front();
        Ok(next.unwrap_or_else(|| self.response.clone()))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
