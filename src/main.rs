#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! # gradeit
//! ## Introduction
//!
//! Grades a class's worth of Gradle assignments in one go: clones each
//! student's repository, builds it, reads the JUnit reports, asks an AI model
//! for an assessment and writes everything into
//! `<output_directory>/<assignment>_Feedback.md`.
//!
//! Running `gradeit grade` again is safe. Students that already have a
//! report are skipped, and students recorded with a missing repository are
//! regraded in place once their repository shows up.
//!
//! ## Configuration
//!
//! Settings come from a Java-style properties file (`config.properties` by
//! default). API keys may also be supplied through `GEMINI_API_KEY`,
//! `ANTHROPIC_API_KEY` and `OPENAI_API_KEY`, including from a `.env` file.

use std::{
    path::{Path, PathBuf},
    process::ExitCode,
};

use anyhow::{Context, Result, ensure};
use bpaf::*;
use colored::Colorize;
use dotenvy::dotenv;
use gradeit::{
    GradeItConfig,
    GradingAssistant,
    GradingOrchestrator,
    StudentRoster,
    StudentSource,
    ai::{ResponseParser, build_router},
    config::http_client,
    feedback::{FeedbackStore, MarkdownRenderer},
    orchestrator::Action,
    pipeline::{GradlePipeline, GradleRunner, collect_sources, sources::read_requirements},
    repo::{CloneRow, CloneSummary, RepoWorkspace, RepositoryCloner},
};
use indicatif::{ProgressBar, ProgressStyle};
use tabled::{
    Table,
    settings::{Panel, Style},
};
use tracing::{Level, metadata::LevelFilter};
use tracing_subscriber::{fmt, prelude::*, util::SubscriberInitExt};

/// Arguments of `gradeit grade`.
#[derive(Debug, Clone)]
struct GradeArgs {
    /// Assignment (repository) name
    assignment:    String,
    /// Reference solution directory
    solution:      PathBuf,
    /// Properties file
    config:        PathBuf,
    /// Overrides `max_grade`
    max_grade:     Option<i64>,
    /// Overrides `passing_grade`
    passing_grade: Option<i64>,
}

/// Arguments of `gradeit clone`.
#[derive(Debug, Clone)]
struct CloneArgs {
    /// Assignment (repository) name
    assignment: String,
    /// Properties file
    config:     PathBuf,
    /// Re-clone repositories that already exist
    force:      bool,
}

/// Top-level CLI commands.
#[derive(Debug, Clone)]
enum Cmd {
    /// Grade every student on the roster
    Grade(GradeArgs),
    /// Clone every student's repository
    Clone(CloneArgs),
    /// Probe the AI provider chain
    Providers(PathBuf),
}

/// Parse the command line arguments and return a `Cmd` enum
fn options() -> Cmd {
    /// parses the assignment name
    fn assignment() -> impl Parser<String> {
        short('a')
            .long("assignment")
            .help("Assignment name, which is also the repository name")
            .argument::<String>("NAME")
    }

    /// parses the config file path
    fn config() -> impl Parser<PathBuf> {
        short('c')
            .long("config")
            .help("Path to the properties file, config.properties by default")
            .argument::<PathBuf>("FILE")
            .fallback(PathBuf::from("config.properties"))
    }

    let grade = {
        let assignment = assignment();
        let solution = short('s')
            .long("solution")
            .help("Directory holding the reference solution")
            .argument::<PathBuf>("DIR");
        let config = config();
        let max_grade = short('m')
            .long("max-grade")
            .help("Maximum grade, overriding the config file")
            .argument::<i64>("N")
            .optional();
        let passing_grade = short('p')
            .long("passing-grade")
            .help("Passing grade, overriding the config file")
            .argument::<i64>("N")
            .optional();

        construct!(GradeArgs {
            assignment,
            solution,
            config,
            max_grade,
            passing_grade
        })
        .map(Cmd::Grade)
        .to_options()
        .command("grade")
        .help("Build, test and grade every student's submission")
    };

    let clone = {
        let assignment = assignment();
        let config = config();
        let force = long("force")
            .help("Delete and re-clone repositories that already exist")
            .switch();

        construct!(CloneArgs {
            assignment,
            config,
            force
        })
        .map(Cmd::Clone)
        .to_options()
        .command("clone")
        .help("Clone every student's repository for an assignment")
    };

    let providers = construct!(Cmd::Providers(config()))
        .to_options()
        .command("providers")
        .help("Send a probe prompt through the AI provider chain");

    let cmd = construct!([grade, clone, providers]);

    cmd.to_options()
        .descr("AI-assisted batch grader for Gradle assignments")
        .run()
}

/// A bar over `len` students.
fn progress_bar(len: usize) -> ProgressBar {
    let pb = ProgressBar::new(len as u64);
    if let Ok(style) = ProgressStyle::default_bar().template("{bar:30} {pos}/{len} {msg}") {
        pb.set_style(style);
    }
    pb
}

/// Loads the config file and applies environment key fallback.
fn load_config(path: &Path) -> Result<GradeItConfig> {
    let mut config = GradeItConfig::load(path)?;
    let ai = config
        .ai()
        .clone()
        .with_env_fallback(|key| std::env::var(key).ok());
    config.set_ai(ai);
    Ok(config)
}

/// `gradeit grade`
async fn grade(args: GradeArgs) -> Result<()> {
    let mut config = load_config(&args.config)?;
    if let Some(max_grade) = args.max_grade {
        config.set_max_grade(max_grade);
    }
    if let Some(passing_grade) = args.passing_grade {
        config.set_passing_grade(passing_grade);
    }

    let students = StudentRoster::new(config.students_file()).load_students()?;
    ensure!(
        args.solution.is_dir(),
        "Solution directory not found: {}",
        args.solution.display()
    );
    let solution = collect_sources(&args.solution)
        .with_context(|| format!("Could not read solution at {}", args.solution.display()))?;
    let requirements = read_requirements(&args.solution);

    let router = build_router(config.ai(), http_client()?)?;
    let assistant = GradingAssistant::new(router, config.max_grade());
    let pipeline = GradlePipeline::new(
        GradleRunner::new(config.gradle_use_wrapper(), config.build_timeout()),
        config.gradle_task(),
    );

    let pb = progress_bar(students.len());
    let mut orchestrator = GradingOrchestrator::builder()
        .locator(RepoWorkspace::new(config.repositories_directory()))
        .artifacts(pipeline)
        .assessor(assistant)
        .store(FeedbackStore::new(config.output_directory()))
        .renderer(MarkdownRenderer::new(config.max_grade()))
        .solution_files(solution.files)
        .maybe_requirements(requirements)
        .progress(pb.clone())
        .build();

    let summary = orchestrator.run(&students, &args.assignment).await?;
    pb.finish_and_clear();

    let path = orchestrator.store().resolve_path(&args.assignment)?;
    eprintln!(
        "{}",
        Table::new(summary.rows())
            .with(Panel::header(format!("Grading Overview: {}", args.assignment)))
            .with(Panel::footer(format!(
                "processed {} | regraded {} | zero-graded {} | skipped {} | failed {} | passing {}/{}",
                summary.count(Action::Process),
                summary.count(Action::Regrade),
                summary.count(Action::ZeroGrade),
                summary.count(Action::Skip),
                summary.failed(),
                summary.passing(config.passing_grade()),
                summary.graded(),
            )))
            .with(Style::modern())
    );
    eprintln!("Feedback written to {}", path.display());
    Ok(())
}

/// `gradeit clone`
async fn clone(args: CloneArgs) -> Result<()> {
    let config = load_config(&args.config)?;
    let students = StudentRoster::new(config.students_file()).load_students()?;
    let cloner = RepositoryCloner::new(
        RepoWorkspace::new(config.repositories_directory()),
        config.gitlab_host()?,
        config.clone_timeout(),
    );

    let pb = progress_bar(students.len());
    let mut results = Vec::with_capacity(students.len());
    for student in &students {
        pb.set_message(student.username().to_string());
        results.push(cloner.clone_student(student, &args.assignment, args.force).await);
        pb.inc(1);
    }
    pb.finish_and_clear();

    let summary = CloneSummary::from_results(&results);
    eprintln!(
        "{}",
        Table::new(results.iter().map(CloneRow::from))
            .with(Panel::footer(format!(
                "{}/{} cloned ({:.1}%)",
                summary.successful, summary.total, summary.success_rate
            )))
            .with(Style::modern())
    );
    Ok(())
}

/// `gradeit providers`
async fn providers(config_path: PathBuf) -> Result<()> {
    let config = load_config(&config_path)?;
    let router = build_router(config.ai(), http_client()?)?;

    let raw = router
        .route(
            "Respond with only this JSON object: \
             {\"score\": 100, \"feedback\": \"ok\", \"suggestions\": [], \"confidence\": 1.0}",
        )
        .await;

    match router.current_provider() {
        Some(name) => {
            let parsed = ResponseParser.parse(&raw);
            eprintln!(
                "{} answered ({})",
                name.green(),
                if parsed.is_ok() { "valid JSON" } else { "unparseable reply" }
            );
            Ok(())
        }
        None => anyhow::bail!(
            "No provider answered. Tried: {}\n{raw}",
            router.provider_names().join(", ")
        ),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv().ok();

    let fmt = fmt::layer()
        .without_time()
        .with_file(false)
        .with_line_number(false);
    let filter_layer = LevelFilter::from_level(Level::INFO);
    tracing_subscriber::registry()
        .with(fmt)
        .with(filter_layer)
        .init();

    let result = match options() {
        Cmd::Grade(args) => grade(args).await,
        Cmd::Clone(args) => clone(args).await,
        Cmd::Providers(config) => providers(config).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {e:#}", "error:".red().bold());
            ExitCode::FAILURE
        }
    }
}
