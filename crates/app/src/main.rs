use std::fmt;
use std::sync::Arc;

use exam_core::model::{Exam, ExamId, ExamResult, UserId};
use services::{
    AnswerOutcome, Clock, ExamSession, ExamWorkflow, HttpCatalog, HttpCatalogConfig,
};
use storage::repository::Storage;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{EnvFilter, fmt as log_fmt, layer::SubscriberExt, util::SubscriberInitExt};

mod input;

use input::{TakeCommand, print_take_help};

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    MissingOption { flag: &'static str },
    UnknownArg(String),
    InvalidId { flag: &'static str, raw: String },
    InvalidDbUrl { raw: String },
    ApiNotSupported { command: &'static str },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::MissingOption { flag } => write!(f, "{flag} is required"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidId { flag, raw } => write!(f, "invalid {flag} value: {raw:?}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::ApiNotSupported { command } => {
                write!(f, "{command} writes to the local database and cannot use --api")
            }
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  app seed    --file <exams.json> [--db <sqlite_url>]");
    eprintln!("  app list    --user <id> [--db <sqlite_url> | --api <base_url>]");
    eprintln!("  app take    --user <id> --exam <id> [--db <sqlite_url> | --api <base_url>]");
    eprintln!("  app results --user <id> [--db <sqlite_url> | --api <base_url>]");
    eprintln!();
    eprintln!("Defaults:");
    eprintln!("  --db sqlite://exams.sqlite3");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  EXAM_DB_URL, EXAM_API_URL, EXAM_API_TOKEN, EXAM_USER_ID, RUST_LOG");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Seed,
    List,
    Take,
    Results,
}

impl Command {
    fn from_arg(arg: &str) -> Option<Self> {
        match arg {
            "seed" => Some(Self::Seed),
            "list" => Some(Self::List),
            "take" => Some(Self::Take),
            "results" => Some(Self::Results),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Seed => "seed",
            Self::List => "list",
            Self::Take => "take",
            Self::Results => "results",
        }
    }
}

struct Args {
    db_url: String,
    api: Option<HttpCatalogConfig>,
    user: Option<String>,
    exam: Option<String>,
    file: Option<String>,
}

impl Args {
    fn parse(args: &mut impl Iterator<Item = String>) -> Result<Self, ArgsError> {
        let mut db_url = std::env::var("EXAM_DB_URL")
            .ok()
            .map_or_else(|| "sqlite://exams.sqlite3".into(), normalize_sqlite_url);
        let mut api = HttpCatalogConfig::from_env();
        let mut user = std::env::var("EXAM_USER_ID").ok();
        let mut exam = None;
        let mut file = None;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = normalize_sqlite_url(value);
                }
                "--api" => {
                    let base_url = require_value(args, "--api")?;
                    let token = std::env::var("EXAM_API_TOKEN")
                        .ok()
                        .filter(|token| !token.trim().is_empty());
                    api = Some(HttpCatalogConfig { base_url, token });
                }
                "--user" => user = Some(require_value(args, "--user")?),
                "--exam" => exam = Some(require_value(args, "--exam")?),
                "--file" => file = Some(require_value(args, "--file")?),
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(Self {
            db_url,
            api,
            user,
            exam,
            file,
        })
    }

    fn user(&self) -> Result<UserId, ArgsError> {
        let raw = self
            .user
            .clone()
            .ok_or(ArgsError::MissingOption { flag: "--user" })?;
        UserId::new(raw.clone()).map_err(|_| ArgsError::InvalidId {
            flag: "--user",
            raw,
        })
    }

    fn exam(&self) -> Result<ExamId, ArgsError> {
        let raw = self
            .exam
            .clone()
            .ok_or(ArgsError::MissingOption { flag: "--exam" })?;
        ExamId::new(raw.clone()).map_err(|_| ArgsError::InvalidId {
            flag: "--exam",
            raw,
        })
    }
}

fn normalize_sqlite_url(raw: String) -> String {
    if raw == "sqlite::memory:" || raw.starts_with("sqlite://") {
        return raw;
    }

    let trimmed = raw.trim().to_string();
    let path_str = trimmed
        .strip_prefix("sqlite:")
        .unwrap_or(trimmed.as_str())
        .to_string();
    let path = std::path::Path::new(&path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| std::path::PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

fn prepare_sqlite_file(db_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    if db_url == "sqlite::memory:" {
        return Ok(());
    }

    let path = db_url
        .strip_prefix("sqlite://")
        .ok_or_else(|| ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        })?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        return Err(ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        }
        .into());
    }

    let path = std::path::Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;
    }

    Ok(())
}

async fn open_sqlite(db_url: &str) -> Result<Storage, Box<dyn std::error::Error>> {
    // Open + migrate SQLite in the binary glue so core/services stay pure.
    prepare_sqlite_file(db_url)?;
    Ok(Storage::sqlite(db_url).await?)
}

async fn build_workflow(args: &Args) -> Result<ExamWorkflow, Box<dyn std::error::Error>> {
    let clock = Clock::default_clock();
    if let Some(config) = &args.api {
        tracing::debug!(base_url = %config.base_url, "using remote exam api");
        let catalog = HttpCatalog::new(config.clone());
        return Ok(ExamWorkflow::new(
            clock,
            Arc::new(catalog.clone()),
            Arc::new(catalog),
        ));
    }
    let storage = open_sqlite(&args.db_url).await?;
    Ok(ExamWorkflow::from_storage(clock, &storage))
}

fn parse_seed_file(raw: &str) -> Result<Vec<Exam>, serde_json::Error> {
    serde_json::from_str(raw)
}

async fn seed(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    if args.api.is_some() {
        return Err(ArgsError::ApiNotSupported { command: "seed" }.into());
    }
    let file = args
        .file
        .as_deref()
        .ok_or(ArgsError::MissingOption { flag: "--file" })?;
    let raw = std::fs::read_to_string(file)?;
    let exams = parse_seed_file(&raw)?;

    let storage = open_sqlite(&args.db_url).await?;
    for exam in &exams {
        storage.import.upsert_exam(exam).await?;
        println!(
            "imported {} ({} questions, {} marks)",
            exam.id(),
            exam.total_questions(),
            exam.total_marks()
        );
    }
    tracing::info!(count = exams.len(), file, "seed complete");
    Ok(())
}

async fn list(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let user = args.user()?;
    let workflow = build_workflow(args).await?;
    let exams = workflow.available_exams(&user).await?;
    if exams.is_empty() {
        println!("no exams available for {user}");
    }
    for exam in exams {
        println!(
            "{:<20} {:<32} {:>4} questions {:>7.2} marks {:>5} min",
            exam.id,
            exam.title,
            exam.total_questions,
            exam.total_marks,
            exam.duration_seconds / 60
        );
    }
    Ok(())
}

async fn results(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let user = args.user()?;
    let workflow = build_workflow(args).await?;
    let results = workflow.results(&user).await?;
    if results.is_empty() {
        println!("no results for {user}");
    }
    for result in &results {
        print_result(result);
        println!();
    }
    Ok(())
}

fn print_result(result: &ExamResult) {
    println!(
        "{} [{}] submitted {}",
        result.exam_id(),
        result.status(),
        result.submitted_at().format("%Y-%m-%d %H:%M:%S UTC")
    );
    println!(
        "  score {:.2}/{:.2} ({:.2}%)  correct {}  wrong {}  unattempted {}  time {}s",
        result.obtained_marks(),
        result.total_marks(),
        result.percentage(),
        result.correct_answers(),
        result.wrong_answers(),
        result.unattempted(),
        result.time_taken_seconds()
    );
    for (subject, score) in result.subject_wise_score() {
        println!(
            "  {:<16} {}/{} correct  {:.2} marks",
            subject.as_str(),
            score.correct,
            score.total,
            score.marks
        );
    }
}

fn print_exam(session: &ExamSession) {
    let exam = session.exam();
    println!(
        "{} ({} questions, {:.2} marks, {} min)",
        exam.title(),
        exam.total_questions(),
        exam.total_marks(),
        exam.duration_seconds() / 60
    );
    for (index, question) in exam.questions().iter().enumerate() {
        println!(
            "{:>3}. [{}] {} ({}, +{}/-{})",
            index + 1,
            question.id(),
            question.prompt(),
            question.subject().as_str(),
            question.marks(),
            question.negative_marks()
        );
        if !question.options().is_empty() {
            println!("       options: {}", question.options().join(", "));
        }
    }
}

async fn take(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let user = args.user()?;
    let exam_id = args.exam()?;
    let workflow = build_workflow(args).await?;
    let session = workflow.start_exam(&user, &exam_id).await?;

    print_exam(&session);
    print_take_help();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let timed_out = workflow.complete_on_deadline(&user, &session);
    tokio::pin!(timed_out);

    loop {
        tokio::select! {
            finished = &mut timed_out => {
                let result = finished?;
                println!("time is up, attempt submitted");
                print_result(&result);
                return Ok(());
            }
            line = lines.next_line() => {
                let Some(line) = line? else {
                    session.abandon()?;
                    eprintln!("input closed, attempt abandoned");
                    return Ok(());
                };
                let command = match TakeCommand::parse(&line, session.exam()) {
                    Ok(command) => command,
                    Err(err) => {
                        eprintln!("{err}");
                        continue;
                    }
                };
                match command {
                    TakeCommand::Answer { question, value } => {
                        match workflow.answer(&user, &session, &question, value).await {
                            Ok(AnswerOutcome::Recorded) => println!("ok"),
                            Ok(AnswerOutcome::Expired(result)) => {
                                println!("deadline passed, attempt submitted");
                                print_result(&result);
                                return Ok(());
                            }
                            Err(err) => eprintln!("{err}"),
                        }
                    }
                    TakeCommand::Clear(question) => match session.clear_answer(&question) {
                        Ok(()) => println!("cleared"),
                        Err(err) => eprintln!("{err}"),
                    },
                    TakeCommand::Status => {
                        let progress = session.progress()?;
                        println!(
                            "{} answered, {} unanswered, {}s left",
                            progress.answered,
                            progress.unanswered,
                            progress.time_remaining.num_seconds()
                        );
                    }
                    TakeCommand::Submit => {
                        let result = workflow.submit(&user, &session).await?;
                        print_result(&result);
                        return Ok(());
                    }
                    TakeCommand::Help => print_take_help(),
                }
            }
        }
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // stdout carries command output
    let stderr_layer = log_fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .init();
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut argv = std::env::args().skip(1);

    let cmd = match argv.next() {
        None => {
            print_usage();
            return Err(ArgsError::MissingOption { flag: "<command>" }.into());
        }
        Some(first) if first == "--help" || first == "-h" => {
            print_usage();
            return Ok(());
        }
        Some(first) => Command::from_arg(&first).ok_or_else(|| {
            eprintln!("unknown subcommand: {first}");
            print_usage();
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "unknown subcommand")
        })?,
    };

    let parsed = Args::parse(&mut argv).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    tracing::debug!(command = cmd.name(), "starting");
    match cmd {
        Command::Seed => seed(&parsed).await,
        Command::List => list(&parsed).await,
        Command::Take => take(&parsed).await,
        Command::Results => results(&parsed).await,
    }
}

#[tokio::main]
async fn main() {
    init_tracing();
    if let Err(err) = run().await {
        // At this layer (binary glue), printing once is fine.
        eprintln!("{err}");
        std::process::exit(2);
    }
}
