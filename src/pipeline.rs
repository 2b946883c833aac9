//! Top-level run: sandbox, dependency scheduling, then batch refinement.

use crate::audit::{AuditAction, AuditLogger, AuditStatus};
use crate::config::SwarmConfig;
use crate::error::Result;
use crate::graph::{load_units, schedule_batches, DependencyGraph};
use crate::llm::{CommandLlmClient, LlmClient, LlmFeedbackEngine, LlmRemediationEngine, LlmTestGenerator};
use crate::quality::{BlackFormatter, Formatter, PylintAnalyzer, PytestRunner};
use crate::refine::{BatchStateMachine, Collaborators, IterationController, RefinePolicy, RunSummary};
use crate::sandbox::Sandbox;
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Agent name used for run-level audit entries.
const ORCHESTRATOR: &str = "orchestrator";

/// Whether `path` is a test module rather than code to refine.
///
/// Matches `test_*.py`, `*_test.py`, `conftest.py` and anything under the
/// configured test directory.
#[must_use]
pub fn is_test_file(path: &Path, root: &Path, test_dir: &Path) -> bool {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    if name.starts_with("test_") || name.ends_with("_test.py") || name == "conftest.py" {
        return true;
    }
    path.strip_prefix(root)
        .is_ok_and(|rel| rel.starts_with(test_dir))
}

/// Build the production collaborators.
///
/// The model command runs with the sandbox as its working directory.
#[must_use]
pub fn default_collaborators(config: &SwarmConfig, sandbox: &Sandbox) -> Collaborators {
    let client: Arc<dyn LlmClient> =
        Arc::new(CommandLlmClient::from_config(&config.llm).with_working_dir(sandbox.root()));
    Collaborators {
        analyzer: Arc::new(PylintAnalyzer::from_config(&config.tools)),
        test_runner: Arc::new(PytestRunner::from_config(&config.tools)),
        remediation: Arc::new(LlmRemediationEngine::new(client.clone())),
        test_generator: Arc::new(LlmTestGenerator::new(client.clone())),
        feedback: Arc::new(LlmFeedbackEngine::new(client)),
    }
}

/// One refactoring run over a target directory.
pub struct Pipeline {
    config: SwarmConfig,
    target_dir: PathBuf,
    formatter: Option<Arc<dyn Formatter>>,
}

impl Pipeline {
    #[must_use]
    pub fn new(config: SwarmConfig, target_dir: impl Into<PathBuf>) -> Self {
        let formatter: Option<Arc<dyn Formatter>> = config
            .tools
            .format_enabled
            .then(|| Arc::new(BlackFormatter::from_config(&config.tools)) as Arc<dyn Formatter>);
        Self {
            config,
            target_dir: target_dir.into(),
            formatter,
        }
    }

    /// Replace (or with `None`, disable) the pre-pass formatter.
    #[must_use]
    pub fn with_formatter(mut self, formatter: Option<Arc<dyn Formatter>>) -> Self {
        self.formatter = formatter;
        self
    }

    #[must_use]
    pub fn config(&self) -> &SwarmConfig {
        &self.config
    }

    /// Run with the production collaborators.
    ///
    /// # Errors
    ///
    /// Only fatal errors are returned: invalid configuration, a missing
    /// target or a sandbox that cannot be created. Batch failures are
    /// reported in the summary.
    pub async fn run(&self) -> Result<RunSummary> {
        self.config.validate()?;
        let sandbox = Sandbox::materialize(&self.target_dir, &self.config.sandbox_root)?;
        let collaborators = default_collaborators(&self.config, &sandbox);
        self.run_in(&sandbox, &collaborators).await
    }

    /// Run with caller-supplied collaborators in a fresh sandbox.
    ///
    /// # Errors
    ///
    /// See [`Pipeline::run`].
    pub async fn run_with(&self, collaborators: &Collaborators) -> Result<RunSummary> {
        self.config.validate()?;
        let sandbox = Sandbox::materialize(&self.target_dir, &self.config.sandbox_root)?;
        self.run_in(&sandbox, collaborators).await
    }

    async fn run_in(&self, sandbox: &Sandbox, collaborators: &Collaborators) -> Result<RunSummary> {
        let run_id = uuid::Uuid::new_v4().to_string();
        let audit = match AuditLogger::new(sandbox.metadata_dir(), &run_id) {
            Ok(log) => Some(log),
            Err(e) => {
                warn!("Audit log unavailable: {}", e);
                None
            }
        };
        let record = |action: AuditAction, input: &str, output: &str| {
            if let Some(log) = &audit {
                if let Err(e) = log.record(ORCHESTRATOR, action, input, output, AuditStatus::Success) {
                    warn!("Audit log write failed: {}", e);
                }
            }
        };
        record(
            AuditAction::Startup,
            &sandbox.source().display().to_string(),
            &sandbox.root().display().to_string(),
        );

        let files: Vec<PathBuf> = sandbox
            .python_files()
            .into_iter()
            .filter(|f| !is_test_file(f, sandbox.root(), &self.config.test_dir))
            .collect();
        info!("Found {} Python file(s) to refine", files.len());

        if let Some(formatter) = &self.formatter {
            for file in &files {
                let path = match sandbox.resolve(file) {
                    Ok(path) => path,
                    Err(e) => {
                        warn!("Not formatting {}: {}", file.display(), e);
                        continue;
                    }
                };
                if let Err(e) = formatter.format(&path).await {
                    debug!("{} skipped {}: {}", formatter.name(), path.display(), e);
                }
            }
        }

        let units = load_units(sandbox, &files);
        let graph = DependencyGraph::from_units(&units);
        let batches = schedule_batches(&graph);
        info!("Scheduled {} batch(es)", batches.len());

        let mut controller = IterationController::from_units(&units);
        let mut machine = BatchStateMachine::new(sandbox, collaborators, RefinePolicy::from_config(&self.config))
            .with_test_dir(&self.config.test_dir);
        if let Some(log) = &audit {
            machine = machine.with_audit(log);
        }

        let mut summary = RunSummary::new(sandbox.root(), files.len());
        let delay = Duration::from_millis(self.config.rate_limit_delay_ms);

        for (index, batch) in batches.iter().enumerate() {
            if index > 0 && !delay.is_zero() {
                debug!("Waiting {}ms before the next batch", delay.as_millis());
                tokio::time::sleep(delay).await;
            }

            println!("\n{}", "=".repeat(60).bright_blue());
            println!(
                "{} {}",
                "Processing Batch:".bright_blue().bold(),
                batch.label(sandbox.root())
            );
            println!("{}", "=".repeat(60).bright_blue());

            let verdict = machine.run(batch, &mut controller).await;
            info!(
                "Batch {} finished: {} ({:.2}/10)",
                verdict.label, verdict.status, verdict.final_score
            );
            summary.record(verdict);
        }

        record(
            AuditAction::Completion,
            &format!("{} batch(es)", summary.batch_count()),
            &format!(
                "{} passed, {} abandoned",
                summary.passed_count(),
                summary.abandoned_count()
            ),
        );
        Ok(summary)
    }
}
