#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

/// Gradle invocation.
pub mod gradle;
/// JUnit XML report parsing.
pub mod junit;
/// Source file collection.
pub mod sources;

use std::{collections::BTreeMap, future::Future, path::Path};

use anyhow::Result;

pub use gradle::{BuildResult, GradleRunner};
pub use junit::{ExecutionSummary, FailureDetail, TestResultParser};
pub use sources::{SourceBundle, collect_sources};

/// Everything the grader needs to know about one repository.
#[derive(Debug, Clone, Default)]
pub struct PipelineArtifacts {
    /// Build outcome
    pub build:   BuildResult,
    /// Test totals and failures
    pub tests:   ExecutionSummary,
    /// Student source files and their header comments
    pub sources: SourceBundle,
}

impl PipelineArtifacts {
    /// Whether the build succeeded.
    pub fn build_succeeded(&self) -> bool {
        self.build.success
    }

    /// Combined build output.
    pub fn build_output(&self) -> &str {
        &self.build.output
    }

    /// Number of tests found.
    pub fn tests_total(&self) -> u32 {
        self.tests.total
    }

    /// Number of tests that passed.
    pub fn tests_passed(&self) -> u32 {
        self.tests.passed
    }

    /// Failing test cases.
    pub fn failures(&self) -> &[FailureDetail] {
        &self.tests.failures
    }

    /// Source files by relative path.
    pub fn source_files(&self) -> &BTreeMap<String, String> {
        &self.sources.files
    }

    /// Per-file header instructions.
    pub fn file_context(&self) -> &BTreeMap<String, String> {
        &self.sources.context
    }
}

/// Produces build, test and source artifacts for a repository.
pub trait ArtifactSource {
    /// Gathers artifacts for the repository at `repo`. An error here is a
    /// per-student failure.
    fn gather(&self, repo: &Path) -> impl Future<Output = Result<PipelineArtifacts>>;
}

/// Builds with Gradle, then reads JUnit reports and Java sources.
#[derive(Debug, Clone)]
pub struct GradlePipeline {
    /// Build runner
    runner: GradleRunner,
    /// Task passed to gradle
    task:   String,
}

impl GradlePipeline {
    /// Creates a pipeline running `task`.
    pub fn new(runner: GradleRunner, task: impl Into<String>) -> Self {
        Self {
            runner,
            task: task.into(),
        }
    }
}

impl ArtifactSource for GradlePipeline {
    async fn gather(&self, repo: &Path) -> Result<PipelineArtifacts> {
        let build = self.runner.run_build(repo, &self.task).await;
        if !build.success {
            tracing::info!(
                "Build failed in {}: {}",
                repo.display(),
                build.error.as_deref().unwrap_or("unknown error")
            );
        }

        let tests = TestResultParser.parse_results(repo);
        for problem in &tests.errors {
            tracing::debug!("{}: {problem}", repo.display());
        }

        let sources = collect_sources(repo)?;
        Ok(PipelineArtifacts {
            build,
            tests,
            sources,
        })
    }
}
