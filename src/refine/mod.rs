//! Per-batch refinement: ANALYZE → REMEDIATE → VERIFY until the batch
//! passes its tests or exhausts its iteration bound.

mod controller;
mod machine;
mod state;
mod verdict;

pub use controller::IterationController;
pub use machine::{BatchStateMachine, Collaborators};
pub use state::{
    transition, BatchSession, Phase, PhaseOutcome, RefinePolicy, SessionPatch, Transition,
};
pub use verdict::{BatchStatus, RunSummary, Verdict};
