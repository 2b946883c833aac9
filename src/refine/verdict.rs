//! Per-batch verdicts and the run summary.

use super::state::{BatchSession, Phase};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// How a batch ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Passed,
    Abandoned,
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Passed => write!(f, "passed"),
            Self::Abandoned => write!(f, "abandoned"),
        }
    }
}

/// Result of refining one batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub files: Vec<PathBuf>,
    /// Display label, e.g. `inventory.py | order.py`.
    pub label: String,
    pub final_score: f64,
    pub status: BatchStatus,
    /// Failed verifications spent.
    pub iterations: u32,
}

impl Verdict {
    /// Verdict for a session that reached a terminal phase.
    #[must_use]
    pub fn from_session(label: impl Into<String>, session: &BatchSession) -> Self {
        Self {
            files: session.files.clone(),
            label: label.into(),
            final_score: session.score,
            status: if session.phase == Phase::Pass {
                BatchStatus::Passed
            } else {
                BatchStatus::Abandoned
            },
            iterations: session.iteration(),
        }
    }

    /// Verdict for a batch that could not be started.
    #[must_use]
    pub fn abandoned(label: impl Into<String>, files: Vec<PathBuf>) -> Self {
        Self {
            files,
            label: label.into(),
            final_score: 0.0,
            status: BatchStatus::Abandoned,
            iterations: 0,
        }
    }

    #[must_use]
    pub fn passed(&self) -> bool {
        self.status == BatchStatus::Passed
    }
}

/// Everything a run produced.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub sandbox: PathBuf,
    pub files_processed: usize,
    pub verdicts: Vec<Verdict>,
}

impl RunSummary {
    #[must_use]
    pub fn new(sandbox: impl Into<PathBuf>, files_processed: usize) -> Self {
        Self {
            sandbox: sandbox.into(),
            files_processed,
            verdicts: Vec::new(),
        }
    }

    pub fn record(&mut self, verdict: Verdict) {
        self.verdicts.push(verdict);
    }

    #[must_use]
    pub fn batch_count(&self) -> usize {
        self.verdicts.len()
    }

    #[must_use]
    pub fn passed_count(&self) -> usize {
        self.verdicts.iter().filter(|v| v.passed()).count()
    }

    #[must_use]
    pub fn abandoned_count(&self) -> usize {
        self.verdicts.len() - self.passed_count()
    }

    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.verdicts.iter().all(Verdict::passed)
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Processed {} files in {} batches: {} passed, {} abandoned",
            self.files_processed,
            self.batch_count(),
            self.passed_count(),
            self.abandoned_count()
        )?;
        for verdict in &self.verdicts {
            writeln!(
                f,
                "  [{}] {} - score {:.2}/10 after {} failed verification(s)",
                verdict.status, verdict.label, verdict.final_score, verdict.iterations
            )?;
        }
        write!(f, "Output available in: {}", self.sandbox.display())
    }
}
