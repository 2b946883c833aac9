//! refactor-swarm - dependency-ordered refactoring of Python projects
//!
//! Copies a target project into a sandbox, orders its files by their import
//! dependencies, and drives each batch through an ANALYZE → REMEDIATE →
//! VERIFY loop until it passes its tests or runs out of attempts.
//!
//! # Architecture
//!
//! - [`graph`] - Import extraction, dependency graph and batch scheduling
//! - [`sandbox`] - Isolated working copy and path containment
//! - [`context`] - Versioned project-wide signature context
//! - [`quality`] - Analyzer, test runner and formatter collaborators
//! - [`llm`] - Model client and the remediation, test and feedback engines
//! - [`refine`] - Per-batch state machine and verdicts
//! - [`pipeline`] - The end-to-end run
//! - [`audit`] - Hash-chained log of collaborator calls
//! - [`config`] - Configuration loading and validation
//! - [`error`] - Error types
//! - [`testing`] - Mocks and fixtures
//!
//! # Example
//!
//! ```rust,ignore
//! use refactor_swarm::{Pipeline, SwarmConfig};
//!
//! let config = SwarmConfig::load(Path::new("./my_project"))?;
//! let summary = Pipeline::new(config, "./my_project").run().await?;
//! println!("{}", summary);
//! ```

pub mod audit;
pub mod config;
pub mod context;
pub mod error;
pub mod graph;
pub mod llm;
pub mod pipeline;
pub mod quality;
pub mod refine;
pub mod sandbox;
pub mod testing;

pub use error::{IntoSwarmError, Result, SwarmError};

pub use config::{LlmConfig, SwarmConfig, ToolsConfig};

pub use graph::{schedule_batches, Batch, DependencyGraph, FileUnit};

pub use pipeline::{default_collaborators, Pipeline};

pub use refine::{
    BatchStateMachine, BatchStatus, Collaborators, IterationController, Phase, RunSummary, Verdict,
};

pub use sandbox::Sandbox;
