#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::fmt::Write as _;

use super::HEADER_PREFIX;
use crate::{
    ai::GradingResult,
    pipeline::{BuildResult, ExecutionSummary},
    student::Student,
    util::truncate_chars,
};

/// Build output beyond this many characters is cut off in reports.
const BUILD_OUTPUT_LIMIT: usize = 1000;

/// Renders one student's grading report as Markdown.
#[derive(Debug, Clone, Copy)]
pub struct MarkdownRenderer {
    /// Denominator shown next to the AI score
    max_grade: i64,
}

impl Default for MarkdownRenderer {
    fn default() -> Self {
        Self { max_grade: 100 }
    }
}

impl MarkdownRenderer {
    /// Creates a renderer showing scores out of `max_grade`.
    pub fn new(max_grade: i64) -> Self {
        Self { max_grade }
    }

    /// Header with the student's identity.
    pub fn header(&self, student: &Student) -> String {
        format!(
            "{HEADER_PREFIX}{}\n**Group**: {}\n**Semester**: {}\n**Course**: {} Section {}\n---\n",
            student.username(),
            student.group_name(),
            student.semester(),
            student.course(),
            student.section(),
        )
    }

    /// Build status with truncated output.
    pub fn build_status(&self, build: &BuildResult) -> String {
        let icon = if build.success { "✅" } else { "❌" };
        format!(
            "## Build Status: {icon}\n```\n{}...\n```\n---\n",
            truncate_chars(&build.output, BUILD_OUTPUT_LIMIT)
        )
    }

    /// Pass counts and percentage.
    pub fn test_results(&self, tests: &ExecutionSummary) -> String {
        let percent = if tests.total > 0 {
            f64::from(tests.passed) / f64::from(tests.total) * 100.0
        } else {
            0.0
        };
        format!(
            "## Test Results\n- **Passed**: {}/{}\n- **Score**: {percent:.1}%\n- **Failures**: {}\n---\n",
            tests.passed,
            tests.total,
            tests.failures.len()
        )
    }

    /// The model's score, analysis and suggestions.
    pub fn ai_feedback(&self, result: &GradingResult) -> String {
        let mut out = format!(
            "## AI Feedback\n**AI Score**: {}/{} (Confidence: {})\n\n### Analysis\n{}\n\n### Suggestions\n",
            result.score,
            self.max_grade,
            format_confidence(result.confidence),
            result.feedback
        );
        for suggestion in &result.suggestions {
            let _ = writeln!(out, "- {suggestion}");
        }
        out
    }

    /// The complete report.
    pub fn render(
        &self,
        student: &Student,
        build: &BuildResult,
        tests: &ExecutionSummary,
        result: &GradingResult,
    ) -> String {
        [
            self.header(student),
            self.build_status(build),
            self.test_results(tests),
            self.ai_feedback(result),
        ]
        .join("\n")
    }
}

/// Whole numbers keep one decimal so `1.0` does not render as `1`.
fn format_confidence(confidence: f64) -> String {
    if confidence.fract() == 0.0 {
        format!("{confidence:.1}")
    } else {
        confidence.to_string()
    }
}
