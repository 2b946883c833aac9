//! Test doubles and fixtures.
//!
//! The mocks implement the collaborator traits ([`QualityAnalyzer`],
//! [`TestRunner`], [`RemediationEngine`], [`TestGenerationEngine`],
//! [`FeedbackEngine`] and [`LlmClient`]) so the refinement loop can be
//! driven without Python tooling or a model backend.
//!
//! [`QualityAnalyzer`]: crate::quality::QualityAnalyzer
//! [`TestRunner`]: crate::quality::TestRunner
//! [`RemediationEngine`]: crate::llm::RemediationEngine
//! [`TestGenerationEngine`]: crate::llm::TestGenerationEngine
//! [`FeedbackEngine`]: crate::llm::FeedbackEngine
//! [`LlmClient`]: crate::llm::LlmClient

#[cfg(test)]
pub mod fixtures;
pub mod mocks;

#[cfg(test)]
pub use fixtures::*;
pub use mocks::*;
