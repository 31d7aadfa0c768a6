mod support;

use std::{fs, time::Duration};

use gradeit::{
    Student,
    pipeline::{ArtifactSource, GradlePipeline, GradleRunner},
    repo::{CloneRow, CloneSummary, RepoWorkspace, RepositoryCloner, RepositoryLocator},
};
use support::temp_root;

#[tokio::test]
async fn missing_project_is_a_failed_build() {
    let root = temp_root("gradle-missing");
    let runner = GradleRunner::new(true, Duration::from_secs(5));

    let result = runner.run_build(&root.join("absent"), "build").await;
    assert!(!result.success);
    assert!(result
        .error
        .as_deref()
        .unwrap_or_default()
        .starts_with("Project path does not exist"));

    let _ = fs::remove_dir_all(root);
}

#[cfg(unix)]
#[tokio::test]
async fn wrapper_script_runs_without_executable_bit() {
    let root = temp_root("gradle-wrapper");
    fs::write(root.join("gradlew"), "#!/bin/sh\necho \"task $1\"\necho BUILD SUCCESSFUL\n")
        .expect("write wrapper");

    let runner = GradleRunner::new(true, Duration::from_secs(30));
    let result = runner.run_build(&root, "test").await;

    assert!(result.success, "{result:?}");
    assert!(result.output.contains("task test"));
    assert!(result.output.contains("BUILD SUCCESSFUL"));
    assert_eq!(result.error, None);

    let _ = fs::remove_dir_all(root);
}

#[cfg(unix)]
#[tokio::test]
async fn failing_wrapper_is_reported_and_artifacts_still_gathered() {
    let root = temp_root("gradle-fail");
    fs::write(root.join("gradlew"), "#!/bin/sh\necho 'error: cannot find symbol' >&2\nexit 1\n")
        .expect("write wrapper");
    fs::write(root.join("Main.java"), "/* Print hello. */\nclass Main {}").expect("source");

    let pipeline = GradlePipeline::new(GradleRunner::new(true, Duration::from_secs(30)), "build");
    let artifacts = pipeline.gather(&root).await.expect("gather");

    assert!(!artifacts.build_succeeded());
    assert!(artifacts.build_output().contains("cannot find symbol"));
    assert_eq!(artifacts.tests_total(), 0);
    assert!(artifacts.source_files().contains_key("Main.java"));
    assert_eq!(
        artifacts.file_context().get("Main.java").map(String::as_str),
        Some("Print hello.")
    );

    let _ = fs::remove_dir_all(root);
}

#[cfg(unix)]
#[tokio::test]
async fn slow_builds_hit_the_deadline() {
    let root = temp_root("gradle-slow");
    fs::write(root.join("gradlew"), "#!/bin/sh\nsleep 30\n").expect("write wrapper");

    let runner = GradleRunner::new(true, Duration::from_millis(300));
    let result = runner.run_build(&root, "build").await;

    assert!(!result.success);
    assert!(result.error.as_deref().unwrap_or_default().contains("timed out"));

    let _ = fs::remove_dir_all(root);
}

#[tokio::test]
async fn existing_working_copy_counts_as_cloned() {
    let root = temp_root("clone");
    let student = Student::from_group_name("amir-2026-winter-cis-271-01").expect("valid");
    let workspace = RepoWorkspace::new(&root);
    let path = workspace.repository_path(&student, "lab1");
    assert_eq!(path, root.join("amir").join("lab1"));
    assert!(!workspace.repository_exists(&student, "lab1"));

    fs::create_dir_all(&path).expect("repo dir");
    assert!(workspace.repository_exists(&student, "lab1"));

    let cloner = RepositoryCloner::new(workspace, "gitlab.invalid", Duration::from_secs(5));
    let results = cloner.clone_all(&[student], "lab1", false).await;

    assert!(results[0].success);
    assert_eq!(results[0].repo_path.as_deref(), Some(path.as_path()));

    let summary = CloneSummary::from_results(&results);
    assert_eq!((summary.total, summary.successful, summary.failed), (1, 1, 0));
    assert_eq!(summary.success_rate, 100.0);

    let table = tabled::Table::new(results.iter().map(CloneRow::from)).to_string();
    assert!(table.contains("amir"));
    assert!(table.contains("yes"));

    let _ = fs::remove_dir_all(root);
}

#[test]
fn empty_clone_batch_has_zero_rate() {
    let summary = CloneSummary::from_results(&[]);
    assert_eq!(summary.total, 0);
    assert_eq!(summary.success_rate, 0.0);
}
