#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::{collections::BTreeMap, fmt::Write as _, future::Future};

use anyhow::{Context, Result};
use bon::Builder;
use serde::{Deserialize, Deserializer, Serialize, de};
use serde_json::Value;

use super::router::ProviderFallbackRouter;
use crate::{config::PROMPT_TRUNCATE, util::truncate_chars};

/// Feedback recorded for a student whose repository does not exist.
pub const MISSING_REPO_FEEDBACK: &str =
    "Homework not Completed. Repository not found, so there was nothing to build or grade.";

/// An assessment of one submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradingResult {
    /// Score, 0-100 before scaling to the assignment's maximum grade
    #[serde(default, deserialize_with = "lenient_score")]
    pub score:       i64,
    /// Free-form analysis
    #[serde(default = "default_feedback")]
    pub feedback:    String,
    /// Concrete improvement suggestions, in order
    #[serde(default)]
    pub suggestions: Vec<String>,
    /// Model confidence, 0.0-1.0
    #[serde(default)]
    pub confidence:  f64,
}

/// Feedback used when the model omits it.
fn default_feedback() -> String {
    "No feedback provided.".to_string()
}

/// Accepts integer, fractional or quoted scores; models are not consistent.
fn lenient_score<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(0),
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.round() as i64))
            .ok_or_else(|| de::Error::custom(format!("score {n} is out of range"))),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map(|f| f.round() as i64)
            .map_err(|_| de::Error::custom(format!("score `{s}` is not a number"))),
        other => Err(de::Error::custom(format!("score must be a number, got {other}"))),
    }
}

impl GradingResult {
    /// The result recorded for a student without a repository. Synthesized
    /// locally; no provider is contacted.
    pub fn missing_repository() -> Self {
        Self {
            score:       0,
            feedback:    MISSING_REPO_FEEDBACK.to_string(),
            suggestions: Vec::new(),
            confidence:  1.0,
        }
    }

    /// Rescales a 0-100 score to `max_grade`, truncating like integer
    /// division.
    pub fn scaled(mut self, max_grade: i64) -> Self {
        if max_grade != 100 {
            self.score = (self.score as f64 / 100.0 * max_grade as f64) as i64;
        }
        self
    }
}

/// Builds the prompts sent to the model.
#[derive(Debug, Clone, Copy, Default)]
pub struct PromptFactory;

impl PromptFactory {
    /// The persona and output contract.
    pub fn system_prompt(&self) -> &'static str {
        "You are an expert Computer Science T.A. grading student assignments.\n\
         Analyze the code for correctness, style, and best practices.\n\
         Provide output in strict JSON format with keys: 'score' (0-100), 'feedback' (string), \
         'suggestions' (list of strings), 'confidence' (0.0-1.0).\n\
         Do not include markdown filtering (```json) in the response."
    }

    /// The submission-specific part of the prompt.
    pub fn grading_prompt(&self, request: &AssessmentRequest) -> String {
        let mut prompt = format!("Requirements:\n{}\n", request.requirements);

        if !request.file_context.is_empty() {
            prompt.push_str("\nFile-Specific Instructions (from headers):\n");
            for (file, header) in &request.file_context {
                let _ = write!(prompt, "\n--- {file} Instructions ---\n{header}\n");
            }
            prompt.push_str(
                "\nUse the above instructions to verify the student implemented the specific \
                 requirements described in the file headers.\n",
            );
        }

        if !request.solution_files.is_empty() {
            prompt.push_str("\nReference Solution:\n");
            for (file, content) in &request.solution_files {
                let _ = write!(prompt, "\n--- {file} (Solution) ---\n{content}\n");
            }
            prompt.push_str("\nCompare the student's work against this reference solution.\n");
        }

        if let Some(build) = &request.build_summary {
            let _ = write!(prompt, "\nBuild and Test Results:\n{build}\n");
        }

        prompt.push_str("\nStudent Code:\n");
        for (file, content) in &request.code_files {
            let _ = write!(prompt, "\n--- {file} ---\n{content}\n");
        }

        prompt.push_str("\nEvaluate this submission based on the requirements and reference solution.");
        prompt
    }

    /// System and user prompt combined, capped at [`PROMPT_TRUNCATE`]
    /// characters.
    pub fn full_prompt(&self, request: &AssessmentRequest) -> String {
        let full = format!("{}\n\n{}", self.system_prompt(), self.grading_prompt(request));
        truncate_chars(&full, PROMPT_TRUNCATE).to_string()
    }
}

/// Turns raw model text into a [`GradingResult`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ResponseParser;

impl ResponseParser {
    /// Parses the model's JSON, tolerating a surrounding markdown code fence.
    pub fn parse(&self, raw: &str) -> Result<GradingResult> {
        let mut cleaned = raw.trim();
        if let Some(rest) = cleaned.strip_prefix("```json") {
            cleaned = rest;
        } else if let Some(rest) = cleaned.strip_prefix("```") {
            cleaned = rest;
        }
        if let Some(rest) = cleaned.strip_suffix("```") {
            cleaned = rest;
        }

        serde_json::from_str(cleaned.trim()).with_context(|| {
            format!(
                "Failed to parse AI response as JSON. Raw response:\n{}",
                truncate_chars(raw, 2000)
            )
        })
    }
}

/// Inputs for one assessment.
#[derive(Debug, Clone, Default, Builder)]
#[builder(on(String, into))]
pub struct AssessmentRequest {
    /// Assignment instructions
    #[builder(default = "Complete the assignment as described by the reference solution.".to_string())]
    pub requirements:   String,
    /// Student source files
    #[builder(default)]
    pub code_files:     BTreeMap<String, String>,
    /// Reference solution files
    #[builder(default)]
    pub solution_files: BTreeMap<String, String>,
    /// Per-file header instructions
    #[builder(default)]
    pub file_context:   BTreeMap<String, String>,
    /// Short summary of build and test outcome
    pub build_summary:  Option<String>,
}

/// Produces a grading result for a request.
pub trait Assessor {
    /// Assesses one submission. Errors are per-student failures.
    fn assess(&self, request: &AssessmentRequest) -> impl Future<Output = Result<GradingResult>>;
}

/// Grades submissions by prompting the provider chain.
pub struct GradingAssistant {
    /// Provider chain
    router:    ProviderFallbackRouter,
    /// Maximum grade scores are scaled to
    max_grade: i64,
}

impl GradingAssistant {
    /// Creates an assistant over `router`.
    pub fn new(router: ProviderFallbackRouter, max_grade: i64) -> Self {
        Self { router, max_grade }
    }

    /// The provider chain.
    pub fn router(&self) -> &ProviderFallbackRouter {
        &self.router
    }
}

impl Assessor for GradingAssistant {
    async fn assess(&self, request: &AssessmentRequest) -> Result<GradingResult> {
        let prompt = PromptFactory.full_prompt(request);
        let raw = self.router.route(&prompt).await;
        let result = ResponseParser.parse(&raw)?;
        Ok(result.scaled(self.max_grade))
    }
}
