//! Per-batch session state and the pure phase-routing function.
//!
//! [`transition`] decides the next phase from the current session and the
//! outcome of the phase that just ran. It performs no I/O, so every routing
//! rule can be tested without collaborators.

use crate::config::SwarmConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Phase of a batch session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    Analyze,
    Remediate,
    Verify,
    /// Tests passed. Terminal.
    Pass,
    /// Iteration bound reached. Terminal.
    Abandoned,
}

impl Phase {
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Pass | Self::Abandoned)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Analyze => "ANALYZE",
            Self::Remediate => "REMEDIATE",
            Self::Verify => "VERIFY",
            Self::Pass => "PASS",
            Self::Abandoned => "ABANDONED",
        };
        write!(f, "{}", s)
    }
}

/// Routing parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct RefinePolicy {
    /// Scores at or above this skip remediation.
    pub quality_threshold: f64,
    /// Failed verifications allowed before abandoning.
    pub max_iterations: u32,
    /// Upper bound on any single collaborator call.
    pub collaborator_timeout: Duration,
}

/// Slack on top of the slowest configured tool, so the subprocess timeout
/// normally fires first.
const TIMEOUT_GRACE_MS: u64 = 1_000;

impl RefinePolicy {
    #[must_use]
    pub fn from_config(config: &SwarmConfig) -> Self {
        let slowest = config.llm.timeout_ms.max(config.tools.tool_timeout_ms);
        Self {
            quality_threshold: config.quality_threshold,
            max_iterations: config.max_iterations,
            collaborator_timeout: Duration::from_millis(slowest.saturating_add(TIMEOUT_GRACE_MS)),
        }
    }
}

impl Default for RefinePolicy {
    fn default() -> Self {
        Self::from_config(&SwarmConfig::default())
    }
}

/// Transient state for one batch. Discarded once the batch terminates.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchSession {
    /// Batch files in path order.
    pub files: Vec<PathBuf>,
    /// Current content per file; mirrors the sandbox between phases.
    pub contents: BTreeMap<PathBuf, String>,
    pub phase: Phase,
    /// Last known quality score.
    pub score: f64,
    pub style_diagnostics: String,
    pub verification_diagnostics: String,
    /// A verification failure has not yet been resolved by a passing run.
    pub verification_pending: bool,
    /// Test generation has already been attempted for this batch.
    pub tests_generated: bool,
    iteration: u32,
}

impl BatchSession {
    #[must_use]
    pub fn new(contents: BTreeMap<PathBuf, String>) -> Self {
        Self {
            files: contents.keys().cloned().collect(),
            contents,
            phase: Phase::Analyze,
            score: 0.0,
            style_diagnostics: String::new(),
            verification_diagnostics: String::new(),
            verification_pending: false,
            tests_generated: false,
            iteration: 0,
        }
    }

    /// Failed verifications so far.
    #[must_use]
    pub fn iteration(&self) -> u32 {
        self.iteration
    }

    /// Only the iteration controller advances the counter.
    pub(crate) fn bump_iteration(&mut self) {
        self.iteration = self.iteration.saturating_add(1);
    }

    /// Apply the data part of a transition. The iteration counter is not
    /// touched here.
    pub fn apply(&mut self, patch: SessionPatch) {
        if let Some(score) = patch.score {
            self.score = score;
        }
        if let Some(diag) = patch.style_diagnostics {
            self.style_diagnostics = diag;
        }
        if let Some(diag) = patch.verification_diagnostics {
            self.verification_diagnostics = diag;
        }
        if let Some(pending) = patch.verification_pending {
            self.verification_pending = pending;
        }
        if let Some(generated) = patch.tests_generated {
            self.tests_generated = generated;
        }
        for (path, content) in patch.contents {
            self.contents.insert(path, content);
        }
    }
}

/// What the phase that just ran observed.
#[derive(Debug, Clone, PartialEq)]
pub enum PhaseOutcome {
    Analyzed { score: f64, diagnostics: String },
    /// Analyzer timed out or errored; treated as a no-op analysis.
    AnalyzerFailed { reason: String },
    /// New content was committed to the sandbox.
    Remediated { contents: BTreeMap<PathBuf, String> },
    /// Nothing was written.
    RemediationFailed { reason: String },
    TestsPassed {
        final_score: Option<f64>,
        tests_generated: bool,
    },
    TestsFailed {
        diagnostics: String,
        tests_generated: bool,
    },
}

/// Session changes requested by a transition.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionPatch {
    pub score: Option<f64>,
    pub style_diagnostics: Option<String>,
    pub verification_diagnostics: Option<String>,
    pub verification_pending: Option<bool>,
    pub tests_generated: Option<bool>,
    pub contents: BTreeMap<PathBuf, String>,
    /// Ask the iteration controller to advance the counter.
    pub advance_iteration: bool,
}

/// Routing decision.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub next: Phase,
    pub patch: SessionPatch,
}

impl Transition {
    fn to(next: Phase) -> Self {
        Self {
            next,
            patch: SessionPatch::default(),
        }
    }

    fn with(next: Phase, patch: SessionPatch) -> Self {
        Self { next, patch }
    }
}

/// Decide the next phase.
///
/// An outcome that does not belong to the session's phase, or any outcome
/// for a terminal session, abandons the batch.
///
/// # Example
///
/// ```
/// use refactor_swarm::refine::{transition, BatchSession, Phase, PhaseOutcome, RefinePolicy};
/// use std::collections::BTreeMap;
///
/// let session = BatchSession::new(BTreeMap::new());
/// let outcome = PhaseOutcome::Analyzed { score: 9.6, diagnostics: String::new() };
/// let t = transition(&session, outcome, &RefinePolicy::default());
/// assert_eq!(t.next, Phase::Verify);
/// ```
#[must_use]
pub fn transition(session: &BatchSession, outcome: PhaseOutcome, policy: &RefinePolicy) -> Transition {
    match (session.phase, outcome) {
        (Phase::Analyze, PhaseOutcome::Analyzed { score, diagnostics }) => {
            let next = if score >= policy.quality_threshold && !session.verification_pending {
                Phase::Verify
            } else {
                Phase::Remediate
            };
            Transition::with(
                next,
                SessionPatch {
                    score: Some(score),
                    style_diagnostics: Some(diagnostics),
                    ..SessionPatch::default()
                },
            )
        }
        (Phase::Analyze, PhaseOutcome::AnalyzerFailed { .. }) => Transition::with(
            Phase::Remediate,
            SessionPatch {
                style_diagnostics: Some(String::new()),
                ..SessionPatch::default()
            },
        ),
        (Phase::Remediate, PhaseOutcome::Remediated { contents }) => Transition::with(
            Phase::Verify,
            SessionPatch {
                contents,
                ..SessionPatch::default()
            },
        ),
        (Phase::Remediate, PhaseOutcome::RemediationFailed { .. }) => Transition::to(Phase::Verify),
        (
            Phase::Verify,
            PhaseOutcome::TestsPassed {
                final_score,
                tests_generated,
            },
        ) => Transition::with(
            Phase::Pass,
            SessionPatch {
                score: final_score,
                verification_diagnostics: Some(String::new()),
                verification_pending: Some(false),
                tests_generated: Some(session.tests_generated || tests_generated),
                ..SessionPatch::default()
            },
        ),
        (
            Phase::Verify,
            PhaseOutcome::TestsFailed {
                diagnostics,
                tests_generated,
            },
        ) => {
            let failures = session.iteration().saturating_add(1);
            let next = if failures >= policy.max_iterations {
                Phase::Abandoned
            } else {
                Phase::Analyze
            };
            Transition::with(
                next,
                SessionPatch {
                    verification_diagnostics: Some(diagnostics),
                    verification_pending: Some(true),
                    tests_generated: Some(session.tests_generated || tests_generated),
                    advance_iteration: true,
                    ..SessionPatch::default()
                },
            )
        }
        _ => Transition::to(Phase::Abandoned),
    }
}
