#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::{
    ffi::OsString,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use serde::Serialize;
use tabled::Tabled;

use crate::{process::run_command, student::Student, util::git_path};

/// Answers where a student's working copy of an assignment lives and whether
/// it has been materialized.
pub trait RepositoryLocator {
    /// Directory the student's repository is (or would be) cloned into.
    fn repository_path(&self, student: &Student, assignment: &str) -> PathBuf;

    /// Whether that directory currently exists.
    fn repository_exists(&self, student: &Student, assignment: &str) -> bool {
        self.repository_path(student, assignment).is_dir()
    }
}

/// Repositories laid out as `<root>/<username>/<assignment>`.
#[derive(Debug, Clone)]
pub struct RepoWorkspace {
    /// Directory holding one folder per student
    root: PathBuf,
}

impl RepoWorkspace {
    /// Creates a workspace rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory holding one folder per student.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl RepositoryLocator for RepoWorkspace {
    fn repository_path(&self, student: &Student, assignment: &str) -> PathBuf {
        self.root.join(student.username()).join(assignment)
    }
}

/// Outcome of cloning one student's repository.
#[derive(Debug, Clone, Serialize)]
pub struct CloneResult {
    /// Student username
    pub username:  String,
    /// Whether a usable working copy exists afterwards
    pub success:   bool,
    /// Where the working copy lives, on success
    pub repo_path: Option<PathBuf>,
    /// Error reported by git, on failure
    pub error:     Option<String>,
}

/// One row of the clone overview table.
#[derive(Tabled)]
pub struct CloneRow {
    /// Student username
    #[tabled(rename = "Student")]
    student: String,
    /// `yes` or `no`
    #[tabled(rename = "Cloned")]
    cloned:  String,
    /// Working copy path, or the first line of the error
    #[tabled(rename = "Path / Error")]
    detail:  String,
}

impl From<&CloneResult> for CloneRow {
    fn from(result: &CloneResult) -> Self {
        let detail = match (&result.repo_path, &result.error) {
            (Some(path), _) => path.display().to_string(),
            (None, Some(error)) => error
                .lines()
                .find(|line| !line.trim().is_empty())
                .unwrap_or_default()
                .to_string(),
            (None, None) => String::new(),
        };

        Self {
            student: result.username.clone(),
            cloned: if result.success { "yes" } else { "no" }.to_string(),
            detail,
        }
    }
}

/// Aggregate counts over a batch of clones.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CloneSummary {
    /// Number of students attempted
    pub total:        usize,
    /// Number of working copies available afterwards
    pub successful:   usize,
    /// Number of failed clones
    pub failed:       usize,
    /// Percentage of successes, 0 when nothing was attempted
    pub success_rate: f64,
}

impl CloneSummary {
    /// Summarizes `results`.
    pub fn from_results(results: &[CloneResult]) -> Self {
        let total = results.len();
        let successful = results.iter().filter(|r| r.success).count();
        let success_rate = if total > 0 {
            successful as f64 / total as f64 * 100.0
        } else {
            0.0
        };

        Self {
            total,
            successful,
            failed: total - successful,
            success_rate,
        }
    }
}

/// Clones student repositories from a GitLab host over SSH.
#[derive(Debug, Clone)]
pub struct RepositoryCloner {
    /// Where repositories are cloned
    workspace:   RepoWorkspace,
    /// GitLab host name
    gitlab_host: String,
    /// Deadline for one `git clone`
    timeout:     Duration,
}

impl RepositoryCloner {
    /// Creates a cloner writing into `workspace`.
    pub fn new(workspace: RepoWorkspace, gitlab_host: impl Into<String>, timeout: Duration) -> Self {
        Self {
            workspace,
            gitlab_host: gitlab_host.into(),
            timeout,
        }
    }

    /// Clones one student's repository. An existing working copy counts as
    /// success unless `force` is set, in which case it is removed first. A
    /// failed clone never leaves a partial directory behind.
    pub async fn clone_student(
        &self,
        student: &Student,
        assignment: &str,
        force: bool,
    ) -> CloneResult {
        let repo_path = self.workspace.repository_path(student, assignment);
        let failed = |error: String| CloneResult {
            username:  student.username().to_string(),
            success:   false,
            repo_path: None,
            error:     Some(error),
        };

        if repo_path.exists() {
            if !force {
                tracing::debug!("{} already present at {}", student.username(), repo_path.display());
                return CloneResult {
                    username:  student.username().to_string(),
                    success:   true,
                    repo_path: Some(repo_path),
                    error:     None,
                };
            }
            if let Err(e) = std::fs::remove_dir_all(&repo_path) {
                return failed(format!("Could not remove {}: {e}", repo_path.display()));
            }
        }

        match self.run_clone(student, assignment, &repo_path).await {
            Ok(()) => CloneResult {
                username:  student.username().to_string(),
                success:   true,
                repo_path: Some(repo_path),
                error:     None,
            },
            Err(e) => {
                if repo_path.exists() {
                    let _ = std::fs::remove_dir_all(&repo_path);
                }
                tracing::warn!("Clone failed for {}: {e:#}", student.username());
                failed(format!("{e:#}"))
            }
        }
    }

    /// Clones every student in order.
    pub async fn clone_all(
        &self,
        students: &[Student],
        assignment: &str,
        force: bool,
    ) -> Vec<CloneResult> {
        let mut results = Vec::with_capacity(students.len());
        for student in students {
            results.push(self.clone_student(student, assignment, force).await);
        }
        results
    }

    /// Runs `git clone` for one student.
    async fn run_clone(&self, student: &Student, assignment: &str, dest: &Path) -> Result<()> {
        let parent = dest
            .parent()
            .context("repository path has no parent directory")?;
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Could not create {}", parent.display()))?;

        let url = student.repo_url(&self.gitlab_host, assignment);
        let args: Vec<OsString> = vec!["clone".into(), url.clone().into(), dest.into()];
        let output = run_command(git_path()?, &args, None, Some(self.timeout)).await?;

        if output.success() {
            Ok(())
        } else {
            anyhow::bail!("git clone {url} failed: {}", output.stderr_lossy().trim())
        }
    }
}
