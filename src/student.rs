#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Errors raised while loading a roster. All of them are fatal for a run.
#[derive(thiserror::Error, Debug)]
pub enum RosterError {
    /// The roster file does not exist.
    #[error("Students file not found: {}", path.display())]
    NotFound {
        /// Path that was looked up
        path: PathBuf,
    },
    /// The roster file could not be read.
    #[error("Could not read students file {}", path.display())]
    Read {
        /// Path that failed to read
        path:   PathBuf,
        /// Underlying IO error
        #[source]
        source: std::io::Error,
    },
    /// One or more lines are not valid group names.
    #[error("Errors parsing students file:\n{}", errors.join("\n"))]
    Malformed {
        /// One `Line <n>: <reason>` message per bad line
        errors: Vec<String>,
    },
}

/// A single group name that could not be parsed.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error(
    "Invalid group name format: '{group}'. Expected format: \
     <username>-<year>-<semester>-<course>-<section>"
)]
pub struct GroupNameError {
    /// The offending group name
    pub group: String,
}

/// A student, identified by the username embedded in their GitLab group name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
    /// Full group name, e.g. `mawall-2026-winter-cis-271-01`
    group_name: String,
    /// Username, e.g. `mawall`
    username:   String,
    /// Year and term, e.g. `2026-winter`
    semester:   String,
    /// Course, e.g. `cis-271`
    course:     String,
    /// Section, e.g. `01`
    section:    String,
}

impl Student {
    /// Parses a GitLab group name of the form
    /// `<username>-<year>-<term>-<course>-<number>-<section>`.
    ///
    /// The username ends right before the first standalone four-digit part,
    /// so usernames may themselves contain dashes or spaces. When no such
    /// part exists the first dash-separated part is taken as the username.
    pub fn from_group_name(group_name: &str) -> Result<Self, GroupNameError> {
        let group_name = group_name.trim();
        let invalid = || GroupNameError {
            group: group_name.to_string(),
        };

        let parts: Vec<&str> = group_name.split('-').collect();
        if parts.len() < 5 {
            return Err(invalid());
        }

        let year_at = parts
            .iter()
            .position(|part| part.len() == 4 && part.chars().all(|c| c.is_ascii_digit()))
            .filter(|idx| *idx > 0)
            .unwrap_or(1);
        let (user_parts, rest) = parts.split_at(year_at);

        let (semester, course, section) = match rest {
            [year, term, course, number, section, ..] => {
                (format!("{year}-{term}"), format!("{course}-{number}"), section.to_string())
            }
            [year, term, course, section] => {
                (format!("{year}-{term}"), course.to_string(), section.to_string())
            }
            _ => return Err(invalid()),
        };

        Ok(Self {
            group_name: group_name.to_string(),
            username: user_parts.join("-"),
            semester,
            course,
            section,
        })
    }

    /// Builds a student directly from its parts.
    pub fn new(
        group_name: impl Into<String>,
        username: impl Into<String>,
        semester: impl Into<String>,
        course: impl Into<String>,
        section: impl Into<String>,
    ) -> Self {
        Self {
            group_name: group_name.into(),
            username:   username.into(),
            semester:   semester.into(),
            course:     course.into(),
            section:    section.into(),
        }
    }

    /// SSH clone URL for this student's copy of `assignment`.
    pub fn repo_url(&self, gitlab_host: &str, assignment: &str) -> String {
        format!("git@{gitlab_host}:{}/{assignment}.git", self.group_name)
    }

    /// Full group name.
    pub fn group_name(&self) -> &str {
        &self.group_name
    }

    /// Username; the key of the student's feedback entry.
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Year and term.
    pub fn semester(&self) -> &str {
        &self.semester
    }

    /// Course.
    pub fn course(&self) -> &str {
        &self.course
    }

    /// Section.
    pub fn section(&self) -> &str {
        &self.section
    }
}

/// Anything that can produce the list of students for a run.
pub trait StudentSource {
    /// Returns all students, in source order.
    fn load_students(&self) -> Result<Vec<Student>, RosterError>;
}

impl StudentSource for Vec<Student> {
    fn load_students(&self) -> Result<Vec<Student>, RosterError> {
        Ok(self.clone())
    }
}

/// A roster file with one GitLab group name per line.
#[derive(Debug, Clone)]
pub struct StudentRoster {
    /// Path to the roster file
    path: PathBuf,
}

impl StudentRoster {
    /// Creates a roster backed by `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the roster file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parses roster text. Blank lines and `#` comments are skipped and a
    /// trailing period on a line is ignored. Every bad line is reported, not
    /// just the first.
    pub fn parse(text: &str) -> Result<Vec<Student>, RosterError> {
        let mut students = Vec::new();
        let mut errors = Vec::new();

        for (idx, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            match Student::from_group_name(line.trim_end_matches('.')) {
                Ok(student) => students.push(student),
                Err(e) => errors.push(format!("Line {}: {e}", idx + 1)),
            }
        }

        if errors.is_empty() {
            Ok(students)
        } else {
            Err(RosterError::Malformed { errors })
        }
    }
}

impl StudentSource for StudentRoster {
    fn load_students(&self) -> Result<Vec<Student>, RosterError> {
        if !self.path.exists() {
            return Err(RosterError::NotFound {
                path: self.path.clone(),
            });
        }
        let text = std::fs::read_to_string(&self.path).map_err(|source| RosterError::Read {
            path: self.path.clone(),
            source,
        })?;

        let students = Self::parse(&text)?;
        tracing::info!("Loaded {} students from {}", students.len(), self.path.display());
        Ok(students)
    }
}
