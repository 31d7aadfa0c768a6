//! # gradeit
//!
//! A batch grader for student Gradle assignments. For every student on a
//! roster it decides whether the assignment needs grading at all, builds and
//! tests the student's repository, asks an AI model for an assessment through
//! a fallback chain of providers, and records the result in one Markdown
//! feedback document per assignment that can be re-run safely.

#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

/// AI provider clients, the fallback router and grading prompts
pub mod ai;
/// Properties-file configuration and typed settings
pub mod config;
/// The per-assignment feedback document and report rendering
pub mod feedback;
/// Per-student grading decisions for a whole roster
pub mod orchestrator;
/// Build, test-report and source-file artifacts for a repository
pub mod pipeline;
/// Spawning subprocesses with deadlines
pub mod process;
/// Locating and cloning student repositories
pub mod repo;
/// Student roster parsing
pub mod student;
/// Utility functions for convenience
pub mod util;

pub use ai::{GradingAssistant, GradingResult, ProviderClient, ProviderFallbackRouter};
pub use config::{AiSettings, GradeItConfig, Properties};
pub use feedback::{FeedbackDocument, FeedbackEntry, FeedbackStore, MarkdownRenderer};
pub use orchestrator::{Action, GradingOrchestrator, RunSummary};
pub use student::{Student, StudentRoster, StudentSource};
