#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::{
    ffi::OsString,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::Result;
use serde::Serialize;

use crate::{process::run_command, util::gradle_path};

/// Outcome of one Gradle invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BuildResult {
    /// Whether gradle exited with status zero
    pub success: bool,
    /// Combined stdout and stderr
    pub output:  String,
    /// Why the build is considered failed, if it is
    pub error:   Option<String>,
}

impl BuildResult {
    /// A failed build that never produced output.
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output:  String::new(),
            error:   Some(error.into()),
        }
    }
}

/// Runs Gradle tasks inside student projects.
#[derive(Debug, Clone)]
pub struct GradleRunner {
    /// Prefer the project's `gradlew` over a system gradle
    use_wrapper: bool,
    /// Deadline for one invocation
    timeout:     Duration,
}

impl GradleRunner {
    /// Creates a runner.
    pub fn new(use_wrapper: bool, timeout: Duration) -> Self {
        Self {
            use_wrapper,
            timeout,
        }
    }

    /// Runs `task` in `project`. Never fails: problems launching gradle are
    /// reported as a failed [`BuildResult`].
    pub async fn run_build(&self, project: &Path, task: &str) -> BuildResult {
        if !project.exists() {
            return BuildResult::failed(format!(
                "Project path does not exist: {}",
                project.display()
            ));
        }

        let program = match self.gradle_command(project) {
            Ok(program) => program,
            Err(e) => return BuildResult::failed(format!("{e:#}")),
        };

        tracing::debug!("Running {} {task} in {}", program.to_string_lossy(), project.display());
        let args: Vec<OsString> = vec![task.into()];
        match run_command(&program, &args, Some(project), Some(self.timeout)).await {
            Ok(output) => {
                let success = output.success();
                BuildResult {
                    success,
                    output: output.combined(),
                    error: (!success).then(|| "Build failed with non-zero exit code".to_string()),
                }
            }
            Err(e) => BuildResult::failed(format!("Error executing build: {e:#}")),
        }
    }

    /// Chooses between the project's wrapper and a system gradle.
    fn gradle_command(&self, project: &Path) -> Result<OsString> {
        if self.use_wrapper {
            let wrapper = wrapper_path(project);
            if wrapper.exists() {
                ensure_executable(&wrapper);
                return Ok(std::path::absolute(&wrapper)
                    .unwrap_or(wrapper)
                    .into_os_string());
            }
        }
        gradle_path()
    }
}

/// Location of the platform's gradle wrapper script.
fn wrapper_path(project: &Path) -> PathBuf {
    if cfg!(windows) {
        project.join("gradlew.bat")
    } else {
        project.join("gradlew")
    }
}

/// Students frequently commit `gradlew` without the executable bit.
#[cfg(unix)]
fn ensure_executable(path: &Path) {
    use std::os::unix::fs::PermissionsExt;

    if let Ok(meta) = std::fs::metadata(path) {
        let mut perms = meta.permissions();
        if perms.mode() & 0o111 == 0 {
            perms.set_mode(0o755);
            if let Err(e) = std::fs::set_permissions(path, perms) {
                tracing::warn!("Could not mark {} executable: {e}", path.display());
            }
        }
    }
}

/// Nothing to do where there is no executable bit.
#[cfg(not(unix))]
fn ensure_executable(_path: &Path) {}
