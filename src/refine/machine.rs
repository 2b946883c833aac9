//! Drives one batch through ANALYZE → REMEDIATE → VERIFY.
//!
//! Each phase calls its collaborator under a timeout, converts whatever
//! happened into a [`PhaseOutcome`] and hands it to the pure
//! [`transition`](super::state::transition) function. Collaborator failures
//! never escape: they become session state and, at worst, an abandoned
//! batch.

use super::controller::IterationController;
use super::state::{transition, BatchSession, Phase, PhaseOutcome, RefinePolicy};
use super::verdict::Verdict;
use crate::audit::{AuditAction, AuditLogger, AuditStatus};
use crate::error::{Result, SwarmError};
use crate::graph::Batch;
use crate::llm::prompts::{remediation_prompt, test_generation_prompt};
use crate::llm::{
    FeedbackEngine, FileContents, RemediationEngine, RemediationRequest, SourceFile,
    TestGenerationEngine, TestGenerationRequest,
};
use crate::quality::{QualityAnalyzer, TestRunner};
use crate::sandbox::Sandbox;
use colored::Colorize;
use std::collections::BTreeMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// The external capabilities a batch needs.
#[derive(Clone)]
pub struct Collaborators {
    pub analyzer: Arc<dyn QualityAnalyzer>,
    pub test_runner: Arc<dyn TestRunner>,
    pub remediation: Arc<dyn RemediationEngine>,
    pub test_generator: Arc<dyn TestGenerationEngine>,
    pub feedback: Arc<dyn FeedbackEngine>,
}

/// Runs batches inside one sandbox.
pub struct BatchStateMachine<'a> {
    sandbox: &'a Sandbox,
    collaborators: &'a Collaborators,
    policy: RefinePolicy,
    test_dir: PathBuf,
    audit: Option<&'a AuditLogger>,
}

impl<'a> BatchStateMachine<'a> {
    #[must_use]
    pub fn new(sandbox: &'a Sandbox, collaborators: &'a Collaborators, policy: RefinePolicy) -> Self {
        Self {
            sandbox,
            collaborators,
            policy,
            test_dir: PathBuf::from("tests"),
            audit: None,
        }
    }

    /// Directory, relative to the sandbox root, under which test files mirror
    /// the source layout.
    #[must_use]
    pub fn with_test_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.test_dir = dir.into();
        self
    }

    #[must_use]
    pub fn with_audit(mut self, audit: &'a AuditLogger) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Test file that verifies `file`: `<test_dir>/<source dir>/test_<stem>.py`.
    ///
    /// # Errors
    ///
    /// Returns [`SwarmError::PathViolation`] if the location would fall
    /// outside the sandbox.
    pub fn test_path(&self, file: &Path) -> Result<PathBuf> {
        let stem = file
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let source_dir = file
            .strip_prefix(self.sandbox.root())
            .ok()
            .and_then(Path::parent)
            .unwrap_or_else(|| Path::new(""));
        self.sandbox.resolve(
            self.test_dir
                .join(source_dir)
                .join(format!("test_{}.py", stem)),
        )
    }

    fn file_list(&self, files: &[PathBuf]) -> String {
        files
            .iter()
            .map(|f| self.relative_name(f))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn relative_name(&self, path: &Path) -> String {
        path.strip_prefix(self.sandbox.root())
            .unwrap_or(path)
            .display()
            .to_string()
    }

    /// Refine one batch to a terminal phase.
    pub async fn run(&self, batch: &Batch, controller: &mut IterationController) -> Verdict {
        let label = batch.label(self.sandbox.root());

        let mut session = match self.open_session(batch) {
            Ok(session) => session,
            Err(e) => {
                warn!("{}: cannot read batch files: {}", label, e);
                println!("   {} {}", "Skipped:".red().bold(), e);
                return Verdict::abandoned(label, batch.files().to_vec());
            }
        };

        while !session.phase.is_terminal() {
            let phase = session.phase;
            let mut raw_failure = None;

            let outcome = match phase {
                Phase::Analyze => self.analyze(&session, &label).await,
                Phase::Remediate => self.remediate(&session, &label, controller).await,
                Phase::Verify => {
                    let (outcome, raw) = self.verify(&session, &label, controller).await;
                    raw_failure = raw;
                    outcome
                }
                Phase::Pass | Phase::Abandoned => break,
            };

            let mut step = transition(&session, outcome, &self.policy);

            if step.next == Phase::Analyze {
                if let Some(raw) = raw_failure {
                    if let Some(feedback) = self.formalize(&session, &label, &raw).await {
                        step.patch.verification_diagnostics = Some(feedback);
                    }
                }
            }

            if step.patch.advance_iteration {
                session = controller.advance(session);
            }
            session.apply(step.patch);
            debug!("{}: {} -> {} (iteration {})", label, phase, step.next, session.iteration());
            session.phase = step.next;
        }

        match session.phase {
            Phase::Pass => println!(
                "   {} {} - final score {:.2}/10",
                "Passed:".green().bold(),
                label,
                session.score
            ),
            _ => {
                if session.iteration() >= self.policy.max_iterations {
                    warn!(
                        "{}: {}",
                        label,
                        SwarmError::MaxIterationsExceeded {
                            max: self.policy.max_iterations
                        }
                    );
                }
                println!(
                    "   {} {} - last score {:.2}/10",
                    "Abandoned:".yellow().bold(),
                    label,
                    session.score
                );
            }
        }

        Verdict::from_session(label, &session)
    }

    fn open_session(&self, batch: &Batch) -> Result<BatchSession> {
        let contents = batch
            .files()
            .iter()
            .map(|f| self.sandbox.read_file(f).map(|c| (f.clone(), c)))
            .collect::<Result<BTreeMap<_, _>>>()?;
        Ok(BatchSession::new(contents))
    }

    fn source_files(&self, session: &BatchSession) -> Vec<SourceFile> {
        session
            .contents
            .iter()
            .map(|(path, content)| SourceFile {
                name: self.relative_name(path),
                path: path.clone(),
                content: content.clone(),
            })
            .collect()
    }

    /// Await `fut`, failing with [`SwarmError::ToolTimeout`] after the
    /// collaborator deadline.
    async fn bounded<T, F>(&self, tool: &str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let limit = self.policy.collaborator_timeout;
        match tokio::time::timeout(limit, fut).await {
            Ok(result) => result,
            Err(_) => Err(SwarmError::timeout(
                tool,
                u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
            )),
        }
    }

    fn audit(&self, agent: &str, action: AuditAction, input: &str, output: &str, ok: bool) {
        if let Some(log) = self.audit {
            if let Err(e) = log.record(agent, action, input, output, AuditStatus::from_ok(ok)) {
                warn!("Audit log write failed: {}", e);
            }
        }
    }

    // =========================================================================
    // ANALYZE
    // =========================================================================

    async fn analyze(&self, session: &BatchSession, label: &str) -> PhaseOutcome {
        let analyzer = &self.collaborators.analyzer;
        match self.bounded(analyzer.name(), analyzer.analyze(&session.files)).await {
            Ok(report) => {
                info!("{}: quality score {:.2}/10", label, report.score);
                println!(
                    "   {} {:.2}/10 ({} issue(s), {} blocking)",
                    "Score:".cyan().bold(),
                    report.score,
                    report.issue_count(),
                    report.blocking_count()
                );
                self.audit(
                    analyzer.name(),
                    AuditAction::Analysis,
                    &self.file_list(&session.files),
                    &format!("score {:.2}\n{}", report.score, report.issue_lines()),
                    true,
                );
                PhaseOutcome::Analyzed {
                    score: report.score,
                    diagnostics: report.diagnostics,
                }
            }
            Err(e) => {
                warn!("{}: analysis failed: {}", label, e);
                self.audit(
                    analyzer.name(),
                    AuditAction::Analysis,
                    &self.file_list(&session.files),
                    &e.to_string(),
                    false,
                );
                PhaseOutcome::AnalyzerFailed {
                    reason: e.to_string(),
                }
            }
        }
    }

    // =========================================================================
    // REMEDIATE
    // =========================================================================

    async fn remediate(
        &self,
        session: &BatchSession,
        label: &str,
        controller: &mut IterationController,
    ) -> PhaseOutcome {
        let engine = &self.collaborators.remediation;
        let request = RemediationRequest {
            files: self.source_files(session),
            style_diagnostics: session.style_diagnostics.clone(),
            verification_diagnostics: session.verification_diagnostics.clone(),
            context: controller.snapshot(),
        };

        let reply = self
            .bounded(engine.name(), async {
                engine.remediate(&request).await.map_err(SwarmError::from)
            })
            .await;
        let returned = reply.as_ref().map(render_files).unwrap_or_default();
        let committed = reply.and_then(|files| self.commit(session, files, controller));
        let prompt = remediation_prompt(&request);

        match committed {
            Ok(contents) => {
                let names: Vec<String> = contents.keys().map(|p| self.relative_name(p)).collect();
                println!("   {} {}", "Fixed:".green().bold(), names.join(", "));
                self.audit(engine.name(), AuditAction::Fix, &prompt, &returned, true);
                PhaseOutcome::Remediated { contents }
            }
            Err(e) => {
                warn!("{}: remediation failed: {}", label, e);
                println!("   {} {}", "Warning:".yellow().bold(), e);
                self.audit(
                    engine.name(),
                    AuditAction::Fix,
                    &prompt,
                    format!("{}\n{}", e, returned).trim_end(),
                    false,
                );
                PhaseOutcome::RemediationFailed {
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Map an engine-provided name onto a batch file.
    ///
    /// Tries the name as a path, then relative to the sandbox root, then as
    /// a base name that must be unique within the batch.
    fn match_batch_file(&self, files: &[PathBuf], name: &str) -> Option<PathBuf> {
        let candidate = Path::new(name.trim());
        if let Some(hit) = files.iter().find(|f| f.as_path() == candidate) {
            return Some(hit.clone());
        }
        let joined = self.sandbox.root().join(candidate);
        if let Some(hit) = files.iter().find(|f| **f == joined) {
            return Some(hit.clone());
        }
        let base = candidate.file_name()?;
        let mut by_name = files.iter().filter(|f| f.file_name() == Some(base));
        match (by_name.next(), by_name.next()) {
            (Some(hit), None) => Some(hit.clone()),
            _ => None,
        }
    }

    /// Validate engine output and write it as one unit.
    fn commit(
        &self,
        session: &BatchSession,
        files: FileContents,
        controller: &mut IterationController,
    ) -> Result<BTreeMap<PathBuf, String>> {
        if files.is_empty() {
            return Err(SwarmError::no_output("engine returned no files"));
        }

        let mut resolved = BTreeMap::new();
        for (name, content) in files {
            if content.trim().is_empty() {
                warn!("Ignoring empty content returned for {}", name);
                continue;
            }
            match self.match_batch_file(&session.files, &name) {
                Some(path) => {
                    resolved.insert(path, content);
                }
                None => warn!("Ignoring output for {} (not part of the batch)", name),
            }
        }

        if resolved.is_empty() {
            return Err(SwarmError::no_output("no returned file belongs to the batch"));
        }
        if session.files.len() > 1 && resolved.len() < session.files.len() {
            return Err(SwarmError::no_output(format!(
                "partial output for cycle batch ({} of {} files)",
                resolved.len(),
                session.files.len()
            )));
        }

        self.sandbox.write_batch(&resolved)?;
        for (path, content) in &resolved {
            let version = controller.merge_file(path, content);
            debug!("Context v{} after {}", version, path.display());
        }
        Ok(resolved)
    }

    // =========================================================================
    // VERIFY
    // =========================================================================

    /// Run the batch's tests. The second value is raw failing output worth
    /// formalizing.
    async fn verify(
        &self,
        session: &BatchSession,
        label: &str,
        controller: &IterationController,
    ) -> (PhaseOutcome, Option<String>) {
        let runner = &self.collaborators.test_runner;
        let targets = match session
            .files
            .iter()
            .map(|f| self.test_path(f).map(|t| (f.clone(), t)))
            .collect::<Result<Vec<(PathBuf, PathBuf)>>>()
        {
            Ok(targets) => targets,
            Err(e) => {
                warn!("{}: {}", label, e);
                self.audit(
                    runner.name(),
                    AuditAction::TestRun,
                    &self.file_list(&session.files),
                    &e.to_string(),
                    false,
                );
                return (
                    PhaseOutcome::TestsFailed {
                        diagnostics: e.to_string(),
                        tests_generated: false,
                    },
                    None,
                );
            }
        };

        let mut generated = false;
        if !session.tests_generated && targets.iter().any(|(_, t)| !t.is_file()) {
            generated = true;
            self.generate_tests(session, &targets, label, controller).await;
        }

        // Every batch file needs its own test file before the batch can pass.
        let uncovered: Vec<String> = targets
            .iter()
            .filter(|(_, t)| !t.is_file())
            .map(|(f, t)| format!("{} (expected {})", self.relative_name(f), self.relative_name(t)))
            .collect();
        let tests: Vec<PathBuf> = targets.into_iter().map(|(_, t)| t).collect();
        let test_list = self.file_list(&tests);

        if !uncovered.is_empty() {
            let message = format!("No test file for {}.", uncovered.join(", "));
            warn!("{}: {}", label, message);
            self.audit(runner.name(), AuditAction::TestRun, &test_list, &message, false);
            return (
                PhaseOutcome::TestsFailed {
                    diagnostics: message,
                    tests_generated: generated,
                },
                None,
            );
        }

        match self
            .bounded(runner.name(), runner.run(&tests, self.sandbox.root()))
            .await
        {
            Ok(report) if report.passed => {
                println!("   {} all tests passed", "Tests:".green().bold());
                self.audit(runner.name(), AuditAction::TestRun, &test_list, &report.output, true);
                let final_score = self.final_score(session, label).await;
                (
                    PhaseOutcome::TestsPassed {
                        final_score,
                        tests_generated: generated,
                    },
                    None,
                )
            }
            Ok(report) => {
                println!("   {} failed", "Tests:".red().bold());
                self.audit(runner.name(), AuditAction::TestRun, &test_list, &report.output, false);
                (
                    PhaseOutcome::TestsFailed {
                        diagnostics: report.diagnostics().to_string(),
                        tests_generated: generated,
                    },
                    Some(report.output),
                )
            }
            Err(e) => {
                warn!("{}: test run failed: {}", label, e);
                self.audit(runner.name(), AuditAction::TestRun, &test_list, &e.to_string(), false);
                (
                    PhaseOutcome::TestsFailed {
                        diagnostics: e.to_string(),
                        tests_generated: generated,
                    },
                    None,
                )
            }
        }
    }

    async fn final_score(&self, session: &BatchSession, label: &str) -> Option<f64> {
        let analyzer = &self.collaborators.analyzer;
        match self.bounded(analyzer.name(), analyzer.analyze(&session.files)).await {
            Ok(report) => {
                self.audit(
                    analyzer.name(),
                    AuditAction::Analysis,
                    &self.file_list(&session.files),
                    &format!("final score {:.2}\n{}", report.score, report.issue_lines()),
                    true,
                );
                Some(report.score)
            }
            Err(e) => {
                warn!("{}: final analysis failed, keeping last score: {}", label, e);
                self.audit(
                    analyzer.name(),
                    AuditAction::Analysis,
                    &self.file_list(&session.files),
                    &e.to_string(),
                    false,
                );
                None
            }
        }
    }

    /// Ask the generator for every missing test file. Best effort.
    async fn generate_tests(
        &self,
        session: &BatchSession,
        targets: &[(PathBuf, PathBuf)],
        label: &str,
        controller: &IterationController,
    ) {
        let missing: Vec<&(PathBuf, PathBuf)> = targets.iter().filter(|(_, t)| !t.is_file()).collect();
        let files = self
            .source_files(session)
            .into_iter()
            .filter(|s| missing.iter().any(|(src, _)| *src == s.path))
            .collect();
        let request = TestGenerationRequest {
            files,
            targets: missing.iter().map(|(_, t)| self.relative_name(t)).collect(),
            context: controller.snapshot(),
        };

        let generator = &self.collaborators.test_generator;
        println!("   {} {}", "Generating tests:".cyan().bold(), request.targets.join(", "));
        let reply = self
            .bounded(generator.name(), async {
                generator.generate_tests(&request).await.map_err(SwarmError::from)
            })
            .await;
        let returned = reply.as_ref().map(render_files).unwrap_or_default();
        let prompt = test_generation_prompt(&request);

        let written = reply.and_then(|generated| {
            let test_paths: Vec<PathBuf> = missing.iter().map(|(_, t)| t.clone()).collect();
            let mut resolved = BTreeMap::new();
            for (name, content) in generated {
                match self.match_batch_file(&test_paths, &name) {
                    Some(path) if !content.trim().is_empty() => {
                        resolved.insert(path, content);
                    }
                    _ => warn!("Ignoring generated test {}", name),
                }
            }
            if resolved.is_empty() {
                return Err(SwarmError::no_output("no usable test files generated"));
            }
            self.sandbox.write_batch(&resolved)
        });

        match written {
            Ok(paths) => {
                let names: Vec<String> = paths.iter().map(|p| self.relative_name(p)).collect();
                info!("{}: generated {}", label, names.join(", "));
                self.audit(generator.name(), AuditAction::TestGeneration, &prompt, &returned, true);
            }
            Err(e) => {
                warn!("{}: test generation failed: {}", label, e);
                self.audit(
                    generator.name(),
                    AuditAction::TestGeneration,
                    &prompt,
                    format!("{}\n{}", e, returned).trim_end(),
                    false,
                );
            }
        }
    }

    /// Formalized feedback, or `None` to keep the local failure summary.
    async fn formalize(&self, session: &BatchSession, label: &str, raw: &str) -> Option<String> {
        let engine = &self.collaborators.feedback;
        let names: Vec<String> = session.files.iter().map(|f| self.relative_name(f)).collect();
        let reply = self
            .bounded(engine.name(), async {
                engine.formalize(raw, &names).await.map_err(SwarmError::from)
            })
            .await;

        match reply {
            Ok(text) => {
                self.audit(engine.name(), AuditAction::Feedback, raw, &text, true);
                Some(text)
            }
            Err(e) => {
                warn!("{}: feedback formalization failed, using local summary: {}", label, e);
                self.audit(engine.name(), AuditAction::Feedback, raw, &e.to_string(), false);
                None
            }
        }
    }
}

/// Collaborator output as `FILE:` sections, for the audit log.
fn render_files(files: &FileContents) -> String {
    files
        .iter()
        .map(|(name, content)| format!("FILE: {}\n{}", name, content.trim_end()))
        .collect::<Vec<_>>()
        .join("\n\n")
}
