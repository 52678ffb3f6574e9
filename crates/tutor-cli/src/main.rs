//! AI Tutor CLI
//!
//! Creates courses from a topic, streams lessons to the terminal, grades
//! quizzes, writes progress reports and serves the HTTP API.

mod printer;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;
use tutor_core::{
    create_router, AppState, Config, Course, LessonHandle, LessonOutcome, Module, ModuleOpening,
    QuizStatus, Session, Theme,
};
use tutor_genai::{GeminiClient, GenerationBackend};
use tutor_report::{json::JsonGenerator, MarkdownGenerator, Report};

use crate::printer::LessonPrinter;

/// AI Tutor - generated courses, streamed lessons, graded quizzes
///
/// Courses and modules can be addressed by id or by their 1-based position
/// as shown by `tutor list` and `tutor show`.
#[derive(Parser, Debug)]
#[command(name = "tutor")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file (default: tutor.json in current directory)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<String>,

    /// Directory holding courses and preferences
    #[arg(short, long, value_name = "DIR", global = true)]
    data_dir: Option<String>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a new course for a topic
    Create {
        /// What to learn, e.g. "Rust ownership"
        #[arg(required = true, num_args = 1..)]
        topic: Vec<String>,
    },

    /// List all courses with their progress
    List,

    /// Show a course and its modules
    Show {
        /// Course id or position
        course: String,
    },

    /// Open a module: print its lesson, streaming it on first open
    Learn {
        /// Course id or position
        course: String,
        /// Module id or position
        module: String,
    },

    /// Submit quiz answers for a module
    Quiz {
        /// Course id or position
        course: String,
        /// Module id or position
        module: String,
        /// Zero-based option index for each question, e.g. 1,0,2
        #[arg(short, long, value_delimiter = ',', required = true)]
        answers: Vec<i64>,
    },

    /// Delete a course
    Delete {
        /// Course id or position
        course: String,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Show or change the theme preference
    Theme {
        /// New theme; omit to print the current one
        #[arg(value_enum)]
        choice: Option<ThemeChoice>,
    },

    /// Write a progress report for a course
    Report {
        /// Course id or position
        course: String,
        /// Output format
        #[arg(short, long, value_enum, default_value_t = ReportFormat::Markdown)]
        format: ReportFormat,
        /// Write to this file instead of stdout
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Run the HTTP API and WebSocket server
    Serve {
        /// Port for the HTTP API server (overrides server.port)
        #[arg(short, long)]
        port: Option<u16>,
    },
}

impl Command {
    const fn needs_generation(&self) -> bool {
        matches!(
            self,
            Self::Create { .. } | Self::Learn { .. } | Self::Serve { .. }
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ThemeChoice {
    Dark,
    Light,
    Toggle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ReportFormat {
    Markdown,
    Json,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if args.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    // Lessons go to stdout; keep logs off it.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    tracing::debug!(config = ?args.config, data_dir = ?args.data_dir, "Starting");

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(1)
        }
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let mut config = load_config(args.config.as_deref())?;

    // Apply CLI argument overrides
    if let Some(ref data_dir) = args.data_dir {
        config.data_dir.clone_from(data_dir);
    }
    if let Command::Serve { port: Some(port) } = args.command {
        config.server.port = port;
    }

    // Re-validate after overrides
    config.validate()?;

    let backend = build_backend(&config, args.command.needs_generation())?;
    let session = Session::from_config(&config, backend).await?;

    match args.command {
        Command::Create { topic } => create_course(&session, &topic.join(" ")).await,
        Command::List => list_courses(&session).await,
        Command::Show { course } => show_course(&session, &course).await,
        Command::Learn { course, module } => learn(&session, &course, &module).await,
        Command::Quiz {
            course,
            module,
            answers,
        } => submit_quiz(&session, &course, &module, &answers).await,
        Command::Delete { course, yes } => delete_course(&session, &course, yes).await,
        Command::Theme { choice } => theme(&session, choice).await,
        Command::Report {
            course,
            format,
            output,
        } => report(&session, &course, format, output.as_deref()).await,
        Command::Serve { .. } => serve(&config, session).await,
    }
}

/// Loads configuration from the specified path or default location.
fn load_config(config_path: Option<&str>) -> anyhow::Result<Config> {
    match config_path {
        Some(path_str) => {
            let path = Path::new(path_str);
            if !path.exists() {
                anyhow::bail!(
                    "Config file not found: '{}'\n\nSuggestion: Check the path or remove the --config flag to use defaults",
                    path.display()
                );
            }
            Config::load_from_file(path).map_err(|e| anyhow::anyhow!("{e}"))
        }
        None => Config::load().map_err(|e| anyhow::anyhow!("{e}")),
    }
}

/// Builds the Gemini backend from the provider settings.
fn build_backend(
    config: &Config,
    warn_if_unconfigured: bool,
) -> anyhow::Result<Arc<dyn GenerationBackend>> {
    let client = GeminiClient::new(config.provider.gemini_config())
        .map_err(|e| anyhow::anyhow!("Failed to build the generation client: {e}"))?;

    if warn_if_unconfigured && !client.is_configured() {
        tracing::warn!(
            env = %config.provider.api_key_env,
            "No API key found; generation requests will fail. Set the variable or provider.apiKeyEnv"
        );
    }

    Ok(Arc::new(client))
}

async fn create_course(session: &Session, topic: &str) -> anyhow::Result<()> {
    println!("Generating a syllabus for \"{}\"...", topic.trim());
    let course = session.create_course(topic).await?;
    println!();
    print_course(&course);
    Ok(())
}

async fn list_courses(session: &Session) -> anyhow::Result<()> {
    let courses = session.courses().await;
    if courses.is_empty() {
        println!("No courses yet. Create one with: tutor create <TOPIC>");
        return Ok(());
    }

    for (idx, course) in courses.iter().enumerate() {
        println!(
            "{}. {} ({} of {} modules, {}%)  [{}]",
            idx + 1,
            course.title,
            course.completed_count(),
            course.modules.len(),
            course.progress_percent(),
            course.id
        );
    }
    Ok(())
}

async fn show_course(session: &Session, selector: &str) -> anyhow::Result<()> {
    let course = session.resolve_course(selector).await?;
    print_course(&course);
    Ok(())
}

async fn learn(
    session: &Session,
    course_selector: &str,
    module_selector: &str,
) -> anyhow::Result<()> {
    let course = session.resolve_course(course_selector).await?;
    let module_id = course.resolve_module(module_selector)?.id.clone();

    match session.open_module(&course.id, &module_id).await? {
        ModuleOpening::Cached(module) => {
            print_module_heading(&module);
            println!("{}", module.content.as_deref().unwrap_or_default());
            print_quiz(&course, &module);
        }
        ModuleOpening::Streaming(handle) => {
            if let Some(module) = course.module(&module_id) {
                print_module_heading(module);
            }
            stream_lesson(handle).await?;

            let course = session.course(&course.id).await?;
            if let Some(module) = course.module(&module_id) {
                print_quiz(&course, module);
            }
        }
    }
    Ok(())
}

/// Prints a lesson as it streams; Ctrl+C abandons it without saving.
async fn stream_lesson(handle: LessonHandle) -> anyhow::Result<()> {
    let mut updates = handle.updates();
    let mut printer = LessonPrinter::new(std::io::stdout());

    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let update = updates.borrow_and_update().clone();
                printer.update(&update)?;
            }
            Ok(()) = tokio::signal::ctrl_c() => {
                println!();
                handle.abandon().await;
                anyhow::bail!("Lesson interrupted; nothing was saved");
            }
        }
    }

    match handle.finish().await? {
        LessonOutcome::Done(finalized) => {
            printer.finish(&finalized.lesson)?;
            if finalized.quiz_status == QuizStatus::Malformed {
                tracing::warn!("The quiz for this lesson could not be read");
            }
            Ok(())
        }
        LessonOutcome::Failed { lesson, error } => {
            printer.finish(&lesson)?;
            Err(anyhow::anyhow!(
                "{error}\n\nSuggestion: Run the same command again to retry"
            ))
        }
    }
}

async fn submit_quiz(
    session: &Session,
    course_selector: &str,
    module_selector: &str,
    answers: &[i64],
) -> anyhow::Result<()> {
    let course = session.resolve_course(course_selector).await?;
    let module = course.resolve_module(module_selector)?;
    let submission = session.submit_quiz(&course.id, &module.id, answers).await?;

    for (idx, (question, &answer)) in module.quiz_questions().iter().zip(answers).enumerate() {
        if question.is_correct(answer) {
            println!("{}. ✓ {}", idx + 1, question.question);
        } else {
            println!("{}. ✗ {}", idx + 1, question.question);
            if let Some(correct) = question.correct_option() {
                println!("     Correct answer: {correct}");
            }
        }
        if let Some(ref explanation) = question.explanation {
            println!("     {explanation}");
        }
    }

    let result = submission.result;
    println!();
    println!(
        "Score: {} of {} ({:.0}%)",
        result.correct, result.total, result.percent
    );
    if submission.module.completed() {
        println!("Module completed!");
    } else {
        println!(
            "A score of {:.0}% or more completes the module.",
            session.passing_score()
        );
    }
    Ok(())
}

async fn delete_course(session: &Session, selector: &str, yes: bool) -> anyhow::Result<()> {
    let course = session.resolve_course(selector).await?;

    if !yes && !confirm(&format!("Delete course \"{}\"? [y/N] ", course.title)).await? {
        println!("Cancelled");
        return Ok(());
    }

    session.delete_course(&course.id).await?;
    println!("Deleted \"{}\"", course.title);
    Ok(())
}

async fn confirm(prompt: &str) -> anyhow::Result<bool> {
    use std::io::Write;

    print!("{prompt}");
    std::io::stdout().flush()?;

    let mut line = String::new();
    BufReader::new(tokio::io::stdin()).read_line(&mut line).await?;
    Ok(matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}

async fn theme(session: &Session, choice: Option<ThemeChoice>) -> anyhow::Result<()> {
    let theme = match choice {
        None => session.theme().await,
        Some(ThemeChoice::Toggle) => session.toggle_theme().await?,
        Some(ThemeChoice::Dark) => session.set_theme(Theme::Dark).await?,
        Some(ThemeChoice::Light) => session.set_theme(Theme::Light).await?,
    };
    println!("{theme}");
    Ok(())
}

async fn report(
    session: &Session,
    selector: &str,
    format: ReportFormat,
    output: Option<&Path>,
) -> anyhow::Result<()> {
    let course = session.resolve_course(selector).await?;
    let report = Report::from_course(&course)?;

    let rendered = match format {
        ReportFormat::Markdown => MarkdownGenerator::new(&report).generate(),
        ReportFormat::Json => JsonGenerator::new(&report).generate_pretty()?,
    };

    match output {
        Some(path) => {
            std::fs::write(path, rendered).map_err(|e| {
                anyhow::anyhow!("Failed to write report: {e}\n\nPath: {}", path.display())
            })?;
            println!("Report written to {}", path.display());
        }
        None => println!("{rendered}"),
    }
    Ok(())
}

async fn serve(config: &Config, session: Session) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let router = create_router(AppState::new(session));

    let listener = TcpListener::bind(&addr).await.map_err(|e| {
        anyhow::anyhow!(
            "Failed to bind to {addr}: {e}\n\nSuggestion: Try a different port with --port"
        )
    })?;

    println!("HTTP API server running on http://{addr}");
    println!("Press Ctrl+C to stop");
    tracing::info!(%addr, "Server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Received Ctrl+C, shutting down");
        })
        .await?;
    Ok(())
}

/// Prints a course header followed by its modules.
fn print_course(course: &Course) {
    println!("{}", course.title);
    println!("{}", course.description);
    println!();
    println!("  Topic: {}", course.topic);
    println!("  Id: {}", course.id);
    println!(
        "  Progress: {}% ({} of {} modules)",
        course.progress_percent(),
        course.completed_count(),
        course.modules.len()
    );
    println!();

    for (idx, module) in course.modules.iter().enumerate() {
        let marker = if module.completed() {
            "✓"
        } else if module.has_lesson() {
            "◐"
        } else {
            " "
        };
        let score = module
            .quiz_score
            .map(|s| format!("  (score {s:.0}%)"))
            .unwrap_or_default();
        println!("  {}. [{marker}] {}{score}", idx + 1, module.title);
        println!("        {}", module.description);
    }
}

fn print_module_heading(module: &Module) {
    println!("# {}", module.title);
    println!();
}

fn print_quiz(course: &Course, module: &Module) {
    let questions = module.quiz_questions();
    println!();
    if questions.is_empty() {
        println!("No quiz for this module.");
        return;
    }

    println!("## Quiz");
    for (idx, question) in questions.iter().enumerate() {
        println!();
        println!("{}. {}", idx + 1, question.question);
        for (option_idx, option) in question.options.iter().enumerate() {
            println!("   {option_idx}) {option}");
        }
    }
    println!();
    println!(
        "Answer with: tutor quiz {} {} --answers {}",
        course.id,
        module.id,
        vec!["N"; questions.len()].join(",")
    );
}
