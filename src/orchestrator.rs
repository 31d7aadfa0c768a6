#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::{
    collections::{BTreeMap, HashMap},
    fmt::Write as _,
    path::PathBuf,
};

use anyhow::{Context, Result};
use bon::Builder;
use indicatif::ProgressBar;
use serde::Serialize;
use tabled::Tabled;

use crate::{
    ai::{AssessmentRequest, Assessor, GradingResult},
    feedback::{FeedbackStore, MarkdownRenderer, mentions_missing_repo},
    pipeline::{ArtifactSource, BuildResult, ExecutionSummary, PipelineArtifacts},
    repo::RepositoryLocator,
    student::Student,
};

/// How many failing tests are listed in the prompt.
const FAILURES_IN_PROMPT: usize = 10;

/// What happens to one student in a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Action {
    /// No entry yet and the repository exists: grade and append.
    Process,
    /// The entry records a missing repository that has since appeared:
    /// grade and replace the entry in place.
    Regrade,
    /// No entry and no repository: append a zero-score report.
    ZeroGrade,
    /// The entry is final; nothing to do.
    Skip,
}

impl Action {
    /// Picks the action from the student's existing entry (`None` when there
    /// is none, otherwise whether it records a missing repository) and
    /// whether the repository exists now.
    pub fn decide(existing: Option<bool>, repo_exists: bool) -> Self {
        match (existing, repo_exists) {
            (None, true) => Self::Process,
            (None, false) => Self::ZeroGrade,
            (Some(true), true) => Self::Regrade,
            (Some(false), _) | (Some(true), false) => Self::Skip,
        }
    }

    /// Lowercase label for logs and tables.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Process => "process",
            Self::Regrade => "regrade",
            Self::ZeroGrade => "zero-grade",
            Self::Skip => "skip",
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// What happened to one student.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentOutcome {
    /// Student username
    pub username: String,
    /// Action taken (or attempted)
    pub action:   Action,
    /// Feedback file written, if any
    pub path:     Option<PathBuf>,
    /// Score recorded, for graded students
    pub score:    Option<i64>,
    /// Why the student was left untouched, if something failed
    pub error:    Option<String>,
}

/// One row of the run overview table.
#[derive(Tabled)]
pub struct OutcomeRow {
    /// Student username
    #[tabled(rename = "Student")]
    student: String,
    /// Action label
    #[tabled(rename = "Action")]
    action:  String,
    /// Score, or `-`
    #[tabled(rename = "Score")]
    score:   String,
    /// `ok` or the first line of the error
    #[tabled(rename = "Result")]
    result:  String,
}

impl From<&StudentOutcome> for OutcomeRow {
    fn from(outcome: &StudentOutcome) -> Self {
        Self {
            student: outcome.username.clone(),
            action:  outcome.action.to_string(),
            score:   outcome
                .score
                .map(|s| s.to_string())
                .unwrap_or_else(|| "-".to_string()),
            result:  match &outcome.error {
                Some(e) => e.lines().next().unwrap_or_default().to_string(),
                None => "ok".to_string(),
            },
        }
    }
}

/// Outcomes of a whole run, in processing order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    /// One outcome per roster entry
    pub outcomes: Vec<StudentOutcome>,
}

impl RunSummary {
    /// Students whose action was `action`, failed ones included.
    pub fn count(&self, action: Action) -> usize {
        self.outcomes.iter().filter(|o| o.action == action).count()
    }

    /// Students whose processing failed.
    pub fn failed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.error.is_some()).count()
    }

    /// Students graded this run with a score of at least `passing_grade`.
    pub fn passing(&self, passing_grade: i64) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.score.is_some_and(|s| s >= passing_grade))
            .count()
    }

    /// Students graded this run.
    pub fn graded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.score.is_some()).count()
    }

    /// Table rows for every outcome.
    pub fn rows(&self) -> Vec<OutcomeRow> {
        self.outcomes.iter().map(OutcomeRow::from).collect()
    }

    /// The outcome for `username`.
    pub fn outcome(&self, username: &str) -> Option<&StudentOutcome> {
        self.outcomes.iter().find(|o| o.username == username)
    }
}

/// Drives a grading run over a roster: decides what each student needs,
/// grades where required and keeps the feedback document up to date.
#[derive(Builder)]
pub struct GradingOrchestrator<L, A, G>
where
    L: RepositoryLocator,
    A: ArtifactSource,
    G: Assessor,
{
    /// Finds student repositories
    locator:        L,
    /// Builds and inspects repositories
    artifacts:      A,
    /// Produces grading results
    assessor:       G,
    /// Feedback documents
    store:          FeedbackStore,
    /// Report rendering
    #[builder(default)]
    renderer:       MarkdownRenderer,
    /// Reference solution files shown to the model
    #[builder(default)]
    solution_files: BTreeMap<String, String>,
    /// Assignment instructions; the assessor's default is used when absent
    requirements:   Option<String>,
    /// Advanced once per student
    progress:       Option<ProgressBar>,
}

impl<L, A, G> GradingOrchestrator<L, A, G>
where
    L: RepositoryLocator,
    A: ArtifactSource,
    G: Assessor,
{
    /// Feedback documents.
    pub fn store(&mut self) -> &mut FeedbackStore {
        &mut self.store
    }

    /// Grades `students` for `assignment`.
    ///
    /// Students are handled one at a time in case-insensitive username order.
    /// A failure for one student is logged and recorded in the summary; the
    /// run continues and that student's entry is left as it was. Only a
    /// feedback document that cannot be read aborts the run.
    pub async fn run(&mut self, students: &[Student], assignment: &str) -> Result<RunSummary> {
        let mut known: HashMap<String, bool> = HashMap::new();
        for entry in self.store.read(assignment)? {
            known
                .entry(entry.username().to_string())
                .or_insert(entry.is_missing_repo());
        }

        let mut ordered: Vec<&Student> = students.iter().collect();
        ordered.sort_by_key(|s| s.username().to_lowercase());

        let mut summary = RunSummary::default();
        for student in ordered {
            let username = student.username();
            if let Some(pb) = &self.progress {
                pb.set_message(username.to_string());
            }

            let repo_exists = self.locator.repository_exists(student, assignment);
            let action = Action::decide(known.get(username).copied(), repo_exists);
            tracing::debug!("{username}: {action}");

            let mut outcome = StudentOutcome {
                username: username.to_string(),
                action,
                path: None,
                score: None,
                error: None,
            };

            let written = match action {
                Action::Skip => None,
                Action::ZeroGrade => Some(self.zero_grade(student, assignment)),
                Action::Process | Action::Regrade => {
                    Some(self.grade(student, assignment, action).await)
                }
            };

            match written {
                None => {}
                Some(Ok(report)) => {
                    known.insert(username.to_string(), report.missing_repo);
                    outcome.path = Some(report.path);
                    outcome.score = Some(report.score);
                }
                Some(Err(e)) => {
                    tracing::warn!("Skipping {username}: {e:#}");
                    outcome.error = Some(format!("{e:#}"));
                }
            }

            summary.outcomes.push(outcome);
            if let Some(pb) = &self.progress {
                pb.inc(1);
            }
        }

        Ok(summary)
    }

    /// Records a zero for a student without a repository. No provider is
    /// contacted.
    fn zero_grade(&mut self, student: &Student, assignment: &str) -> Result<WrittenReport> {
        let repo = self.locator.repository_path(student, assignment);
        tracing::info!("Repository not found for {}, recording a zero", student.username());

        let build = BuildResult {
            success: false,
            output:  "Repository not found".to_string(),
            error:   Some(format!("Repository not found at {}", repo.display())),
        };
        let result = GradingResult::missing_repository();
        let rendered = self
            .renderer
            .render(student, &build, &ExecutionSummary::default(), &result);

        let path = self.store.append(assignment, &rendered)?;
        Ok(WrittenReport {
            path,
            score: result.score,
            missing_repo: true,
        })
    }

    /// Runs the full pipeline and appends or replaces the student's entry.
    async fn grade(
        &mut self,
        student: &Student,
        assignment: &str,
        action: Action,
    ) -> Result<WrittenReport> {
        let username = student.username();
        let repo = self.locator.repository_path(student, assignment);
        tracing::info!("Grading {username} ({action})");

        let artifacts = self
            .artifacts
            .gather(&repo)
            .await
            .with_context(|| format!("Could not inspect {}", repo.display()))?;

        let request = AssessmentRequest::builder()
            .maybe_requirements(self.requirements.clone())
            .code_files(artifacts.source_files().clone())
            .solution_files(self.solution_files.clone())
            .file_context(artifacts.file_context().clone())
            .build_summary(build_summary(&artifacts))
            .build();

        let result = self
            .assessor
            .assess(&request)
            .await
            .with_context(|| format!("AI assessment failed for {username}"))?;

        let rendered = self
            .renderer
            .render(student, &artifacts.build, &artifacts.tests, &result);

        let path = match action {
            Action::Regrade => self.store.replace(assignment, username, &rendered)?,
            _ => self.store.append(assignment, &rendered)?,
        };

        Ok(WrittenReport {
            path,
            score: result.score,
            missing_repo: mentions_missing_repo(&rendered),
        })
    }
}

/// A report that made it to disk.
struct WrittenReport {
    /// Feedback file written
    path:         PathBuf,
    /// Score recorded
    score:        i64,
    /// Whether the report counts as a missing-repository entry
    missing_repo: bool,
}

/// Short build and test outcome for the prompt.
fn build_summary(artifacts: &PipelineArtifacts) -> String {
    let mut out = format!(
        "Build: {}\nTests: {}/{} passed\n",
        if artifacts.build_succeeded() { "SUCCESS" } else { "FAILED" },
        artifacts.tests_passed(),
        artifacts.tests_total()
    );

    let failures = artifacts.failures();
    if !failures.is_empty() {
        out.push_str("Failures:\n");
        for failure in failures.iter().take(FAILURES_IN_PROMPT) {
            let _ = writeln!(out, "- {failure}");
        }
        if failures.len() > FAILURES_IN_PROMPT {
            let _ = writeln!(out, "- ... and {} more", failures.len() - FAILURES_IN_PROMPT);
        }
    }
    out
}
