//! Tamper-evident log of collaborator invocations.
//!
//! Every analyzer, test runner and engine call made during a run is
//! appended to `<sandbox>/.swarm/audit.jsonl`. Each entry carries the
//! SHA-256 hash of the previous one, so [`AuditLogger::verify`] can detect
//! edited, dropped or reordered lines.
//!
//! Appends hold an exclusive `fs2` lock on the log file so two runs writing
//! into the same directory never interleave or fork the chain.
//!
//! # Example
//!
//! ```rust,ignore
//! use refactor_swarm::audit::{AuditAction, AuditLogger, AuditStatus};
//!
//! let logger = AuditLogger::new(sandbox.metadata_dir(), "run-1")?;
//! logger.record("pylint", AuditAction::Analysis, "order.py", "rated 7.5", AuditStatus::Success)?;
//! assert!(logger.verify()?.is_valid);
//! ```

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

/// Log file name inside the metadata directory.
pub const AUDIT_FILE_NAME: &str = "audit.jsonl";

/// Longest `input`/`output` text stored per entry.
const MAX_FIELD_CHARS: usize = 4_000;

const GENESIS_SEED: &str = "refactor-swarm-audit-genesis-v1";

/// Kind of work an entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Startup,
    Analysis,
    Fix,
    TestGeneration,
    TestRun,
    Feedback,
    Completion,
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Startup => "startup",
            Self::Analysis => "analysis",
            Self::Fix => "fix",
            Self::TestGeneration => "test_generation",
            Self::TestRun => "test_run",
            Self::Feedback => "feedback",
            Self::Completion => "completion",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditStatus {
    Success,
    Failure,
}

impl AuditStatus {
    #[must_use]
    pub fn from_ok(ok: bool) -> Self {
        if ok {
            Self::Success
        } else {
            Self::Failure
        }
    }
}

impl std::fmt::Display for AuditStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "SUCCESS"),
            Self::Failure => write!(f, "FAILURE"),
        }
    }
}

/// One hash-chained log line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    pub run_id: String,
    /// Collaborator that was invoked, e.g. `pylint`.
    pub agent: String,
    pub action: AuditAction,
    pub input: String,
    pub output: String,
    pub status: AuditStatus,
    /// Hash of the previous entry, or of the genesis seed.
    pub previous_hash: String,
    pub hash: String,
}

impl AuditEntry {
    /// Hash over every field except `hash`.
    #[must_use]
    pub fn compute_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.sequence.to_le_bytes());
        hasher.update(self.timestamp.to_rfc3339().as_bytes());
        hasher.update(self.run_id.as_bytes());
        hasher.update(self.agent.as_bytes());
        hasher.update(self.action.to_string().as_bytes());
        hasher.update(self.input.as_bytes());
        hasher.update(self.output.as_bytes());
        hasher.update(self.status.to_string().as_bytes());
        hasher.update(self.previous_hash.as_bytes());
        hex::encode(hasher.finalize())
    }

    #[must_use]
    pub fn verify_hash(&self) -> bool {
        self.hash == self.compute_hash()
    }
}

/// Outcome of [`AuditLogger::verify`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub is_valid: bool,
    pub entries_verified: u64,
    pub first_invalid_entry: Option<u64>,
    pub error_description: Option<String>,
}

impl VerificationResult {
    #[must_use]
    pub fn valid(entries_verified: u64) -> Self {
        Self {
            is_valid: true,
            entries_verified,
            first_invalid_entry: None,
            error_description: None,
        }
    }

    #[must_use]
    pub fn invalid(entries_verified: u64, invalid_entry: u64, error: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            entries_verified,
            first_invalid_entry: Some(invalid_entry),
            error_description: Some(error.into()),
        }
    }
}

/// Appends entries for one run.
#[derive(Debug, Clone)]
pub struct AuditLogger {
    dir: PathBuf,
    run_id: String,
}

impl AuditLogger {
    /// Open (creating if needed) the log inside `dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn new(dir: impl Into<PathBuf>, run_id: impl Into<String>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).context("Failed to create audit directory")?;
        Ok(Self {
            dir,
            run_id: run_id.into(),
        })
    }

    #[must_use]
    pub fn path(&self) -> PathBuf {
        self.dir.join(AUDIT_FILE_NAME)
    }

    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Append one entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the log cannot be locked, read or written.
    pub fn record(
        &self,
        agent: &str,
        action: AuditAction,
        input: &str,
        output: &str,
        status: AuditStatus,
    ) -> Result<AuditEntry> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path())
            .context("Failed to open audit file")?;
        FileExt::lock_exclusive(&file).context("Failed to lock audit file")?;

        let result = self.append_locked(&mut file, agent, action, input, output, status);

        // Closing the handle releases the lock as well.
        let _ = FileExt::unlock(&file);
        result
    }

    fn append_locked(
        &self,
        file: &mut File,
        agent: &str,
        action: AuditAction,
        input: &str,
        output: &str,
        status: AuditStatus,
    ) -> Result<AuditEntry> {
        let entries = read_entries_from(&self.path())?;
        let (sequence, previous_hash) = match entries.last() {
            Some(last) => (last.sequence + 1, last.hash.clone()),
            None => (0, genesis_hash()),
        };

        let mut entry = AuditEntry {
            sequence,
            timestamp: Utc::now(),
            run_id: self.run_id.clone(),
            agent: agent.to_string(),
            action,
            input: truncate(input),
            output: truncate(output),
            status,
            previous_hash,
            hash: String::new(),
        };
        entry.hash = entry.compute_hash();

        let json = serde_json::to_string(&entry).context("Failed to serialize audit entry")?;
        writeln!(file, "{}", json).context("Failed to write audit entry")?;
        file.flush().context("Failed to flush audit entry")?;
        Ok(entry)
    }

    /// All entries in order.
    ///
    /// # Errors
    ///
    /// Returns an error if the log cannot be read or a line does not parse.
    pub fn read_entries(&self) -> Result<Vec<AuditEntry>> {
        read_entries_from(&self.path())
    }

    /// Check hashes, chain links and sequence numbers.
    ///
    /// # Errors
    ///
    /// Returns an error if the log cannot be read.
    pub fn verify(&self) -> Result<VerificationResult> {
        let entries = self.read_entries()?;
        let genesis = genesis_hash();

        for (i, entry) in entries.iter().enumerate() {
            let index = i as u64;
            if entry.sequence != index {
                return Ok(VerificationResult::invalid(
                    index,
                    entry.sequence,
                    format!("Sequence mismatch: expected {}, got {}", i, entry.sequence),
                ));
            }
            if !entry.verify_hash() {
                return Ok(VerificationResult::invalid(
                    index,
                    entry.sequence,
                    "Entry hash verification failed",
                ));
            }
            let expected_previous = if i == 0 { &genesis } else { &entries[i - 1].hash };
            if entry.previous_hash != *expected_previous {
                return Ok(VerificationResult::invalid(
                    index,
                    entry.sequence,
                    "Chain hash mismatch: previous_hash doesn't match",
                ));
            }
        }

        Ok(VerificationResult::valid(entries.len() as u64))
    }
}

fn read_entries_from(path: &Path) -> Result<Vec<AuditEntry>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let file = File::open(path).context("Failed to open audit file")?;
    let mut entries = Vec::new();
    for (line_num, line) in BufReader::new(file).lines().enumerate() {
        let line = line.context("Failed to read line from audit file")?;
        if line.trim().is_empty() {
            continue;
        }
        let entry: AuditEntry = serde_json::from_str(&line)
            .with_context(|| format!("Failed to parse audit entry at line {}", line_num + 1))?;
        entries.push(entry);
    }
    Ok(entries)
}

fn truncate(text: &str) -> String {
    match text.char_indices().nth(MAX_FIELD_CHARS) {
        Some((cut, _)) => format!("{}...[truncated]", &text[..cut]),
        None => text.to_string(),
    }
}

fn genesis_hash() -> String {
    let mut hasher = Sha256::new();
    hasher.update(GENESIS_SEED.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn logger(dir: &TempDir) -> AuditLogger {
        AuditLogger::new(dir.path().join(".swarm"), "run-1").unwrap()
    }

    #[test]
    fn test_record_fields() {
        let dir = TempDir::new().unwrap();
        let log = logger(&dir);
        let entry = log
            .record("pylint", AuditAction::Analysis, "order.py", "rated at 7.50/10", AuditStatus::Success)
            .unwrap();
        assert_eq!(entry.sequence, 0);
        assert_eq!(entry.agent, "pylint");
        assert_eq!(entry.run_id, "run-1");
        assert!(entry.verify_hash());
        assert!(dir.path().join(".swarm").join(AUDIT_FILE_NAME).exists());
    }

    #[test]
    fn test_entries_form_chain() {
        let dir = TempDir::new().unwrap();
        let log = logger(&dir);
        let a = log.record("system", AuditAction::Startup, "target", "", AuditStatus::Success).unwrap();
        let b = log.record("pytest", AuditAction::TestRun, "a.py", "1 failed", AuditStatus::Failure).unwrap();
        assert_eq!(b.sequence, 1);
        assert_eq!(b.previous_hash, a.hash);
        assert_eq!(a.previous_hash, genesis_hash());

        let result = log.verify().unwrap();
        assert!(result.is_valid);
        assert_eq!(result.entries_verified, 2);
    }

    #[test]
    fn test_chain_continues_across_loggers() {
        let dir = TempDir::new().unwrap();
        logger(&dir)
            .record("system", AuditAction::Startup, "", "", AuditStatus::Success)
            .unwrap();
        let second = AuditLogger::new(dir.path().join(".swarm"), "run-2").unwrap();
        let entry = second
            .record("system", AuditAction::Startup, "", "", AuditStatus::Success)
            .unwrap();
        assert_eq!(entry.sequence, 1);
        assert!(second.verify().unwrap().is_valid);
    }

    #[test]
    fn test_tampered_output_is_detected() {
        let dir = TempDir::new().unwrap();
        let log = logger(&dir);
        log.record("pylint", AuditAction::Analysis, "a.py", "rated 5", AuditStatus::Success).unwrap();
        log.record("pylint", AuditAction::Analysis, "a.py", "rated 6", AuditStatus::Success).unwrap();

        let content = fs::read_to_string(log.path()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        let mut entry: AuditEntry = serde_json::from_str(lines[1]).unwrap();
        entry.output = "rated 10".into();
        let tampered = serde_json::to_string(&entry).unwrap();
        fs::write(log.path(), format!("{}\n{}\n", lines[0], tampered)).unwrap();

        let result = log.verify().unwrap();
        assert!(!result.is_valid);
        assert_eq!(result.first_invalid_entry, Some(1));
    }

    #[test]
    fn test_broken_chain_is_detected() {
        let dir = TempDir::new().unwrap();
        let log = logger(&dir);
        log.record("a", AuditAction::Fix, "", "", AuditStatus::Success).unwrap();
        log.record("b", AuditAction::Fix, "", "", AuditStatus::Success).unwrap();

        let content = fs::read_to_string(log.path()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        let mut entry: AuditEntry = serde_json::from_str(lines[1]).unwrap();
        entry.previous_hash = "0".repeat(64);
        entry.hash = entry.compute_hash();
        fs::write(
            log.path(),
            format!("{}\n{}\n", lines[0], serde_json::to_string(&entry).unwrap()),
        )
        .unwrap();

        let result = log.verify().unwrap();
        assert!(result.error_description.unwrap().contains("Chain hash"));
    }

    #[test]
    fn test_empty_log_is_valid() {
        let dir = TempDir::new().unwrap();
        let result = logger(&dir).verify().unwrap();
        assert!(result.is_valid);
        assert_eq!(result.entries_verified, 0);
    }

    #[test]
    fn test_long_fields_are_truncated() {
        let dir = TempDir::new().unwrap();
        let log = logger(&dir);
        let huge = "x".repeat(MAX_FIELD_CHARS + 50);
        let entry = log.record("llm", AuditAction::Fix, &huge, "", AuditStatus::Success).unwrap();
        assert!(entry.input.ends_with("...[truncated]"));
        assert!(entry.verify_hash());
    }

    #[test]
    fn test_status_serialization() {
        let dir = TempDir::new().unwrap();
        let log = logger(&dir);
        log.record("pytest", AuditAction::TestRun, "", "", AuditStatus::Failure).unwrap();
        log.record("pylint", AuditAction::Analysis, "", "", AuditStatus::Success).unwrap();
        let entries = log.read_entries().unwrap();
        assert_eq!(entries[0].agent, "pytest");
        assert_eq!(entries[0].status, AuditStatus::Failure);

        let raw = fs::read_to_string(log.path()).unwrap();
        assert!(raw.contains("\"status\":\"FAILURE\""));
        assert!(raw.contains("\"action\":\"test_run\""));
        assert_eq!(AuditStatus::from_ok(true), AuditStatus::Success);
    }
}
