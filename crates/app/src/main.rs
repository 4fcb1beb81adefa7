use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use exam_core::model::{AttemptSettings, ExerciseId, Question};
use services::{
    AttemptRun, ChannelEnvironment, Clock, ExamServices, HttpQuestionSource, ResultsAction,
    TracingSink,
};
use storage::repository::{InMemoryQuestionBank, QuestionSource};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod driver;

use driver::{Driver, Input, Step, render_results, render_review, render_status};

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidNumber { flag: &'static str, raw: String },
    InvalidDbUrl { raw: String },
    InvalidSettings(String),
    NoQuestionSource,
    QuestionFile { path: PathBuf, reason: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidNumber { flag, raw } => write!(f, "invalid {flag} value: {raw}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::InvalidSettings(reason) => write!(f, "invalid exam settings: {reason}"),
            ArgsError::NoQuestionSource => {
                write!(f, "no question source: pass --questions or set EXAM_QUESTIONS_URL")
            }
            ArgsError::QuestionFile { path, reason } => {
                write!(f, "cannot read questions from {}: {reason}", path.display())
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

fn parse_number(flag: &'static str, raw: String) -> Result<u32, ArgsError> {
    raw.trim()
        .parse()
        .map_err(|_| ArgsError::InvalidNumber { flag, raw })
}

fn env_number(key: &str) -> Option<u32> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p app -- start  [--db <sqlite_url>] [--exercise-id <id>] [--duration <minutes>]");
    eprintln!("                             [--cheat-limit <n>] [--points <n>] [--questions <file.json>]");
    eprintln!("  cargo run -p app -- resume [--db <sqlite_url>]");
    eprintln!();
    eprintln!("Defaults for start:");
    eprintln!("  --db sqlite:exam.sqlite3");
    eprintln!("  --exercise-id 1");
    eprintln!("  --duration 30   (0 = untimed)");
    eprintln!("  --cheat-limit {}", AttemptSettings::DEFAULT_CHEAT_LIMIT);
    eprintln!("  --points {}", AttemptSettings::DEFAULT_POINTS_PER_QUESTION);
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  EXAM_DB_URL, EXAM_EXERCISE_ID, EXAM_DURATION_MINUTES, EXAM_CHEAT_LIMIT,");
    eprintln!("  EXAM_POINTS_PER_QUESTION, EXAM_QUESTIONS_FILE, EXAM_QUESTIONS_URL, RUST_LOG");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Start,
    Resume,
}

impl Command {
    fn from_arg(arg: &str) -> Option<Self> {
        match arg {
            "start" => Some(Self::Start),
            "resume" => Some(Self::Resume),
            _ => None,
        }
    }
}

struct Args {
    db_url: String,
    exercise_id: ExerciseId,
    duration_minutes: u32,
    settings: AttemptSettings,
    questions_file: Option<PathBuf>,
}

impl Args {
    fn parse(args: &mut impl Iterator<Item = String>) -> Result<Self, ArgsError> {
        let mut db_url = std::env::var("EXAM_DB_URL")
            .ok()
            .map_or_else(|| normalize_sqlite_url("sqlite:exam.sqlite3".into()), normalize_sqlite_url);
        let mut exercise_id = std::env::var("EXAM_EXERCISE_ID")
            .ok()
            .and_then(|value| value.parse::<ExerciseId>().ok())
            .unwrap_or_else(|| ExerciseId::new(1));
        let mut duration_minutes = env_number("EXAM_DURATION_MINUTES").unwrap_or(30);
        let mut cheat_limit =
            env_number("EXAM_CHEAT_LIMIT").unwrap_or(AttemptSettings::DEFAULT_CHEAT_LIMIT);
        let mut points = env_number("EXAM_POINTS_PER_QUESTION")
            .unwrap_or(AttemptSettings::DEFAULT_POINTS_PER_QUESTION);
        let mut questions_file = std::env::var("EXAM_QUESTIONS_FILE")
            .ok()
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from);

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = normalize_sqlite_url(value);
                }
                "--exercise-id" => {
                    let value = require_value(args, "--exercise-id")?;
                    exercise_id = value.parse().map_err(|_| ArgsError::InvalidNumber {
                        flag: "--exercise-id",
                        raw: value.clone(),
                    })?;
                }
                "--duration" => {
                    duration_minutes = parse_number("--duration", require_value(args, "--duration")?)?;
                }
                "--cheat-limit" => {
                    cheat_limit =
                        parse_number("--cheat-limit", require_value(args, "--cheat-limit")?)?;
                }
                "--points" => {
                    points = parse_number("--points", require_value(args, "--points")?)?;
                }
                "--questions" => {
                    questions_file = Some(PathBuf::from(require_value(args, "--questions")?));
                }
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        let settings = AttemptSettings::new(cheat_limit, points)
            .map_err(|e| ArgsError::InvalidSettings(e.to_string()))?;

        Ok(Self {
            db_url,
            exercise_id,
            duration_minutes,
            settings,
            questions_file,
        })
    }

    fn question_source(&self, cmd: Command) -> Result<Arc<dyn QuestionSource>, ArgsError> {
        if let Some(path) = &self.questions_file {
            return load_question_file(path, self.exercise_id);
        }
        let http = HttpQuestionSource::from_env();
        if http.enabled() {
            return Ok(Arc::new(http));
        }
        match cmd {
            // A resumed attempt already carries its questions.
            Command::Resume => Ok(Arc::new(InMemoryQuestionBank::new())),
            Command::Start => Err(ArgsError::NoQuestionSource),
        }
    }
}

fn load_question_file(
    path: &Path,
    exercise_id: ExerciseId,
) -> Result<Arc<dyn QuestionSource>, ArgsError> {
    let file_error = |reason: String| ArgsError::QuestionFile {
        path: path.to_path_buf(),
        reason,
    };
    let raw = std::fs::read_to_string(path).map_err(|e| file_error(e.to_string()))?;
    let questions: Vec<Question> =
        serde_json::from_str(&raw).map_err(|e| file_error(e.to_string()))?;
    let bank = InMemoryQuestionBank::new();
    bank.insert(exercise_id, questions)
        .map_err(|e| file_error(e.to_string()))?;
    Ok(Arc::new(bank))
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
    let path = Path::new(&path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
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

    let path = Path::new(path);
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

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn drive(run: AttemptRun, env: Arc<ChannelEnvironment>) -> Result<(), Box<dyn std::error::Error>> {
    let driver = Driver::new(run.handle().clone(), env);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("{}", run.handle().read(render_status));
    println!("type `help` for commands");

    let finished = loop {
        tokio::select! {
            results = run.wait_for_results() => break Some(results),
            line = lines.next_line() => {
                // End of input leaves the attempt resumable, like `quit`.
                let Some(line) = line? else { break None };
                match line.parse::<Input>() {
                    Ok(input) => match driver.apply(input) {
                        Step::Print(text) => println!("{text}"),
                        Step::Silent => {}
                        Step::Quit => break None,
                    },
                    Err(err) => eprintln!("{err}"),
                }
            }
        }
    };

    let Some(results) = finished else {
        match run.suspend().await {
            Ok(()) => println!("progress saved; run `resume` to continue"),
            Err(err) => eprintln!("could not save progress: {err}"),
        }
        return Ok(());
    };

    println!("{}", render_results(&results));
    println!("type `review` to see your answers or `finish` to close the exam");
    while let Some(line) = lines.next_line().await? {
        match line.parse::<ResultsAction>() {
            Ok(ResultsAction::ReviewAnswers) => {
                if let Some(review) = run.review() {
                    print!("{}", render_review(&review));
                }
            }
            Ok(ResultsAction::Finish) => break,
            Err(err) => eprintln!("{err}"),
        }
    }
    run.finish().await?;
    Ok(())
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut argv: Vec<String> = std::env::args().skip(1).collect();

    let cmd = match argv.first().map(String::as_str) {
        None => Command::Start,
        Some("--help" | "-h") => {
            print_usage();
            return Ok(());
        }
        Some(first) if first.starts_with("--") => Command::Start,
        Some(first) => Command::from_arg(first).ok_or_else(|| {
            eprintln!("unknown subcommand: {first}");
            print_usage();
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "unknown subcommand")
        })?,
    };

    if !argv.is_empty() && !argv[0].starts_with("--") {
        argv.remove(0);
    }

    let mut iter = argv.into_iter();
    let parsed = Args::parse(&mut iter).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    let questions = parsed.question_source(cmd)?;

    // Open + migrate SQLite at startup so services stay backend-agnostic.
    prepare_sqlite_file(&parsed.db_url)?;
    let services = ExamServices::new_sqlite(
        &parsed.db_url,
        Clock::system(),
        parsed.settings,
        questions,
        Arc::new(TracingSink),
    )
    .await?;
    let attempts = services.attempts();
    let env = Arc::new(ChannelEnvironment::new());

    let run = match cmd {
        Command::Start => {
            attempts
                .start_attempt(parsed.exercise_id, parsed.duration_minutes, env.clone())
                .await?
        }
        Command::Resume => attempts.resume_attempt(env.clone()).await?,
    };
    tracing::info!(run_id = %run.id(), db = %parsed.db_url, "exam ready");

    drive(run, env).await
}

#[tokio::main]
async fn main() {
    init_tracing();
    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}
