mod support;

use std::{
    fs,
    path::{Path, PathBuf},
    sync::{Arc, atomic::AtomicUsize},
};

use gradeit::{
    FeedbackStore,
    GradingAssistant,
    GradingOrchestrator,
    ProviderFallbackRouter,
    Student,
    orchestrator::Action,
    repo::{RepoWorkspace, RepositoryLocator},
};
use support::{CannedArtifacts, ScriptedProvider, calls, temp_root};

const ASSIGNMENT: &str = "lab1";
const GOOD_REPLY: &str =
    r#"{"score": 88, "feedback": "Clean solution.", "suggestions": ["Add javadoc"], "confidence": 0.9}"#;

type Orchestrator = GradingOrchestrator<RepoWorkspace, CannedArtifacts, GradingAssistant>;

struct Fixture {
    root: PathBuf,
}

impl Fixture {
    fn new(label: &str) -> Self {
        Self {
            root: temp_root(label),
        }
    }

    fn repos(&self) -> PathBuf {
        self.root.join("repos")
    }

    fn output(&self) -> PathBuf {
        self.root.join("feedback")
    }

    fn feedback_file(&self) -> PathBuf {
        self.output().join(format!("{ASSIGNMENT}_Feedback.md"))
    }

    fn add_repo(&self, student: &Student) {
        let path = RepoWorkspace::new(self.repos()).repository_path(student, ASSIGNMENT);
        fs::create_dir_all(path).expect("create repo dir");
    }

    fn orchestrator(&self, artifacts: CannedArtifacts) -> (Orchestrator, Arc<AtomicUsize>) {
        let (provider, counter) = ScriptedProvider::ok("scripted", GOOD_REPLY);
        let router = ProviderFallbackRouter::new(vec![Box::new(provider)]);
        let orchestrator = GradingOrchestrator::builder()
            .locator(RepoWorkspace::new(self.repos()))
            .artifacts(artifacts)
            .assessor(GradingAssistant::new(router, 100))
            .store(FeedbackStore::new(self.output()))
            .build();
        (orchestrator, counter)
    }

    fn read_feedback(&self) -> String {
        fs::read_to_string(self.feedback_file()).expect("feedback file")
    }
}

impl Drop for Fixture {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.root);
    }
}

fn student(group: &str) -> Student {
    Student::from_group_name(group).expect("valid group name")
}

fn amir() -> Student {
    student("amir-2026-winter-cis-271-01")
}

fn headers(text: &str) -> Vec<&str> {
    text.lines()
        .filter_map(|line| line.strip_prefix("# Grading Report: "))
        .collect()
}

#[tokio::test]
async fn present_repository_is_processed_and_appended() {
    let fx = Fixture::new("orch-process");
    fx.add_repo(&amir());
    let (mut orchestrator, provider_calls) = fx.orchestrator(CannedArtifacts::default());

    let summary = orchestrator.run(&[amir()], ASSIGNMENT).await.expect("run");

    assert_eq!(summary.count(Action::Process), 1);
    assert_eq!(calls(&provider_calls), 1);
    let outcome = summary.outcome("amir").expect("outcome");
    assert_eq!(outcome.score, Some(88));
    assert_eq!(outcome.path.as_deref(), Some(fx.feedback_file().as_path()));

    let text = fx.read_feedback();
    assert!(text.contains("# Grading Report: amir"));
    assert!(text.contains("**AI Score**: 88/100"));
    assert!(!text.contains("Repository not found"));
}

#[tokio::test]
async fn missing_repository_is_zero_graded_without_provider() {
    let fx = Fixture::new("orch-zero");
    let (mut orchestrator, provider_calls) = fx.orchestrator(CannedArtifacts::default());

    let summary = orchestrator.run(&[amir()], ASSIGNMENT).await.expect("run");

    assert_eq!(summary.count(Action::ZeroGrade), 1);
    assert_eq!(calls(&provider_calls), 0);
    assert_eq!(summary.outcome("amir").and_then(|o| o.score), Some(0));

    let text = fx.read_feedback();
    assert!(text.contains("# Grading Report: amir"));
    assert!(text.contains("Homework not Completed"));
    assert!(text.contains("Repository not found"));
    assert!(text.contains("**AI Score**: 0/100 (Confidence: 1.0)"));
    assert!(text.contains("## Build Status: ❌"));
}

#[tokio::test]
async fn repository_appearing_later_is_regraded_once() {
    let fx = Fixture::new("orch-regrade");
    let (mut first, _) = fx.orchestrator(CannedArtifacts::default());
    first.run(&[amir()], ASSIGNMENT).await.expect("first run");

    fx.add_repo(&amir());
    let (mut second, provider_calls) = fx.orchestrator(CannedArtifacts::default());
    let summary = second.run(&[amir()], ASSIGNMENT).await.expect("second run");

    assert_eq!(summary.count(Action::Regrade), 1);
    assert_eq!(summary.outcomes.len(), 1);
    assert_eq!(calls(&provider_calls), 1);

    let text = fx.read_feedback();
    assert_eq!(headers(&text), ["amir"]);
    assert!(!text.contains("Repository not found"));
    assert!(!text.contains("Homework not Completed"));
    assert!(text.contains("**AI Score**: 88/100"));

    // A third run has nothing left to do.
    let (mut third, provider_calls) = fx.orchestrator(CannedArtifacts::default());
    let summary = third.run(&[amir()], ASSIGNMENT).await.expect("third run");
    assert_eq!(summary.count(Action::Skip), 1);
    assert_eq!(calls(&provider_calls), 0);
}

#[tokio::test]
async fn rerun_is_idempotent() {
    let fx = Fixture::new("orch-idem");
    let students = [
        student("alice-2026-winter-cis-271-01"),
        student("bob-2026-winter-cis-271-01"),
    ];
    fx.add_repo(&students[0]);

    let (mut first, _) = fx.orchestrator(CannedArtifacts::default());
    first.run(&students, ASSIGNMENT).await.expect("first run");
    let before = fx.read_feedback();

    let (mut second, provider_calls) = fx.orchestrator(CannedArtifacts::default());
    let summary = second.run(&students, ASSIGNMENT).await.expect("second run");

    assert_eq!(summary.count(Action::Skip), 2);
    assert_eq!(calls(&provider_calls), 0);
    assert_eq!(fx.read_feedback(), before);
}

#[tokio::test]
async fn regrade_keeps_position_and_siblings() {
    let fx = Fixture::new("orch-siblings");
    let alice = student("alice-2026-winter-cis-271-01");
    let bob = student("bob-2026-winter-cis-271-01");
    let carol = student("carol-2026-winter-cis-271-01");
    fx.add_repo(&alice);
    fx.add_repo(&carol);

    let roster = [carol.clone(), alice.clone(), bob.clone()];
    let (mut first, _) = fx.orchestrator(CannedArtifacts::default());
    first.run(&roster, ASSIGNMENT).await.expect("first run");

    let before = gradeit::FeedbackDocument::parse(&fx.read_feedback());
    let names: Vec<_> = before.entries().iter().map(|e| e.username()).collect();
    assert_eq!(names, ["alice", "bob", "carol"]);
    assert!(before.entries()[1].is_missing_repo());

    fx.add_repo(&bob);
    let (mut second, _) = fx.orchestrator(CannedArtifacts::default());
    let summary = second.run(&roster, ASSIGNMENT).await.expect("second run");
    assert_eq!(summary.count(Action::Regrade), 1);
    assert_eq!(summary.count(Action::Skip), 2);

    let after = gradeit::FeedbackDocument::parse(&fx.read_feedback());
    let names: Vec<_> = after.entries().iter().map(|e| e.username()).collect();
    assert_eq!(names, ["alice", "bob", "carol"]);
    assert_eq!(after.entries()[0], before.entries()[0]);
    assert_eq!(after.entries()[2], before.entries()[2]);
    assert!(!after.entries()[1].is_missing_repo());
}

#[tokio::test]
async fn one_failing_student_does_not_stop_the_batch() {
    let fx = Fixture::new("orch-failure");
    let roster = [
        student("alice-2026-winter-cis-271-01"),
        student("bob-2026-winter-cis-271-01"),
        student("carol-2026-winter-cis-271-01"),
    ];
    for s in &roster {
        fx.add_repo(s);
    }

    let (mut orchestrator, _) = fx.orchestrator(CannedArtifacts {
        fail_for: Some("bob"),
    });
    let summary = orchestrator.run(&roster, ASSIGNMENT).await.expect("run");

    assert_eq!(summary.failed(), 1);
    let bob = summary.outcome("bob").expect("bob outcome");
    assert!(bob.error.as_deref().unwrap_or_default().contains("gradle daemon crashed"));
    assert_eq!(bob.path, None);
    assert_eq!(headers(&fx.read_feedback()), ["alice", "carol"]);

    // The next run picks bob up as a fresh student.
    let (mut retry, _) = fx.orchestrator(CannedArtifacts::default());
    let summary = retry.run(&roster, ASSIGNMENT).await.expect("retry");
    assert_eq!(summary.count(Action::Process), 1);
    assert_eq!(headers(&fx.read_feedback()), ["alice", "carol", "bob"]);
}

#[tokio::test]
async fn students_are_processed_in_case_insensitive_order() {
    let fx = Fixture::new("orch-order");
    let roster = [
        student("Zoe-2026-winter-cis-271-01"),
        student("adam-2026-winter-cis-271-01"),
        student("Mia-2026-winter-cis-271-01"),
    ];

    let (mut orchestrator, _) = fx.orchestrator(CannedArtifacts::default());
    let summary = orchestrator.run(&roster, ASSIGNMENT).await.expect("run");

    let order: Vec<_> = summary.outcomes.iter().map(|o| o.username.as_str()).collect();
    assert_eq!(order, ["adam", "Mia", "Zoe"]);
    assert_eq!(headers(&fx.read_feedback()), ["adam", "Mia", "Zoe"]);
}

#[tokio::test]
async fn duplicate_roster_entries_are_written_once() {
    let fx = Fixture::new("orch-dupes");
    fx.add_repo(&amir());
    let (mut orchestrator, provider_calls) = fx.orchestrator(CannedArtifacts::default());

    let summary = orchestrator
        .run(&[amir(), amir()], ASSIGNMENT)
        .await
        .expect("run");

    assert_eq!(summary.count(Action::Process), 1);
    assert_eq!(summary.count(Action::Skip), 1);
    assert_eq!(calls(&provider_calls), 1);
    assert_eq!(headers(&fx.read_feedback()), ["amir"]);
}

#[tokio::test]
async fn exhausted_providers_still_produce_a_report() {
    let fx = Fixture::new("orch-exhausted");
    fx.add_repo(&amir());

    let (first, first_calls) = ScriptedProvider::failing("first", "connection refused");
    let (second, second_calls) = ScriptedProvider::ok("second", "You exceeded your current quota");
    let router = ProviderFallbackRouter::new(vec![Box::new(first), Box::new(second)]);
    let mut orchestrator: Orchestrator = GradingOrchestrator::builder()
        .locator(RepoWorkspace::new(fx.repos()))
        .artifacts(CannedArtifacts::default())
        .assessor(GradingAssistant::new(router, 100))
        .store(FeedbackStore::new(fx.output()))
        .build();

    let summary = orchestrator.run(&[amir()], ASSIGNMENT).await.expect("run");

    assert_eq!(calls(&first_calls), 1);
    assert_eq!(calls(&second_calls), 1);
    assert_eq!(summary.outcome("amir").and_then(|o| o.score), Some(0));
    let text = fx.read_feedback();
    assert!(text.contains("All AI providers failed. Last error: second: You exceeded your current quota"));
    assert!(text.contains("(Confidence: 0.0)"));
}

#[tokio::test]
async fn unrelated_feedback_file_is_left_alone() {
    let fx = Fixture::new("orch-unrelated");
    fs::create_dir_all(fx.output()).expect("output dir");
    fs::write(fx.feedback_file(), "# Old Run\nnotes from last term\n").expect("seed");

    let (mut orchestrator, _) = fx.orchestrator(CannedArtifacts::default());
    let summary = orchestrator.run(&[amir()], ASSIGNMENT).await.expect("run");

    let versioned = fx.output().join(format!("{ASSIGNMENT}_Feedback_1.md"));
    assert_eq!(
        summary.outcome("amir").and_then(|o| o.path.as_deref()),
        Some(versioned.as_path())
    );
    assert_eq!(fx.read_feedback(), "# Old Run\nnotes from last term\n");
    let written = fs::read_to_string(&versioned).expect("versioned file");
    assert!(written.starts_with("# Grading Report: amir\n"));
    assert!(Path::new(&versioned).exists());
}
