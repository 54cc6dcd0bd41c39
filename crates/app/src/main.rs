use std::fmt;
use std::io::{BufRead, Write};

use quiz_core::model::{CourseId, EnrollmentId, StudentId, TopicId};
use quiz_core::session::SessionStatus;
use services::{ActiveSession, AssessmentServices, Clock, SessionLoopService, SubmitOutcome};
use tracing_subscriber::EnvFilter;

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    MissingFlag { flag: &'static str },
    UnknownArg(String),
    InvalidId { flag: &'static str, raw: String },
    InvalidDbUrl { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::MissingFlag { flag } => write!(f, "{flag} is required"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidId { flag, raw } => write!(f, "invalid {flag} value: {raw}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
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

fn parse_id<T: std::str::FromStr>(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<T, ArgsError> {
    let value = require_value(args, flag)?;
    value
        .parse()
        .map_err(|_| ArgsError::InvalidId { flag, raw: value })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Migrate,
    Report,
    Attempts,
    Take,
}

impl Command {
    fn from_arg(arg: &str) -> Option<Self> {
        match arg {
            "migrate" => Some(Self::Migrate),
            "report" => Some(Self::Report),
            "attempts" => Some(Self::Attempts),
            "take" => Some(Self::Take),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
struct Args {
    db_url: String,
    topic_id: Option<TopicId>,
    enrollment_id: Option<EnrollmentId>,
    student_id: Option<StudentId>,
    course_id: Option<CourseId>,
    json: bool,
}

impl Args {
    fn parse(args: &mut impl Iterator<Item = String>) -> Result<Self, ArgsError> {
        let mut parsed = Args {
            db_url: normalize_sqlite_url(
                std::env::var("QUIZ_DB_URL").unwrap_or_else(|_| "sqlite:dev.sqlite3".into()),
            ),
            ..Args::default()
        };

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    parsed.db_url = normalize_sqlite_url(value);
                }
                "--topic" => parsed.topic_id = Some(parse_id(args, "--topic")?),
                "--enrollment" => parsed.enrollment_id = Some(parse_id(args, "--enrollment")?),
                "--student" => parsed.student_id = Some(parse_id(args, "--student")?),
                "--course" => parsed.course_id = Some(parse_id(args, "--course")?),
                "--json" => parsed.json = true,
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(parsed)
    }

    fn topic(&self) -> Result<TopicId, ArgsError> {
        self.topic_id
            .ok_or(ArgsError::MissingFlag { flag: "--topic" })
    }
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p app -- migrate  [--db <sqlite_url>]");
    eprintln!("  cargo run -p app -- report   --topic <id> [--json] [--db <sqlite_url>]");
    eprintln!("  cargo run -p app -- attempts --topic <id> --enrollment <id> [--json]");
    eprintln!("  cargo run -p app -- take     --topic <id> --student <id> --course <id>");
    eprintln!();
    eprintln!("Defaults:");
    eprintln!("  --db sqlite:dev.sqlite3");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  QUIZ_DB_URL, RUST_LOG");
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

//
// ─── COMMANDS ──────────────────────────────────────────────────────────────────
//

async fn report(services: &AssessmentServices, args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let report = services.reports().topic_report(args.topic()?).await?;
    if args.json {
        let body = serde_json::json!({
            "topic_id": report.topic_id,
            "title": report.title,
            "pass_threshold": report.pass_threshold,
            "overall": report.overall,
            "students": report.students,
        });
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(());
    }

    let o = &report.overall;
    println!("{} (topic {}, pass at {}%)", report.title, report.topic_id, report.pass_threshold);
    println!(
        "students {}  attempts {}  avg {:.2}%  max {}%  min {}%  passed {}  failed {}",
        o.total_students,
        o.total_attempts,
        o.average_percentage,
        o.max_percentage,
        o.min_percentage,
        o.passed_count,
        o.failed_count
    );
    println!();
    println!(
        "{:>8} {:>8} {:>6} {:>8} {:>8} {:>6} {:>6}",
        "student", "attempts", "best", "latest", "avg", "pass", "fail"
    );
    for s in &report.students {
        println!(
            "{:>8} {:>8} {:>5}% {:>7}% {:>7.2}% {:>6} {:>6}",
            s.student_id,
            s.total_attempts,
            s.best_percentage,
            s.latest_percentage,
            s.average_percentage,
            s.passed_count,
            s.failed_count
        );
    }
    Ok(())
}

async fn attempts(
    services: &AssessmentServices,
    args: &Args,
) -> Result<(), Box<dyn std::error::Error>> {
    let topic_id = args.topic()?;
    let enrollment_id = args
        .enrollment_id
        .ok_or(ArgsError::MissingFlag {
            flag: "--enrollment",
        })?;
    let history = services
        .reports()
        .attempt_history(topic_id, enrollment_id)
        .await?;

    if args.json {
        let rows: Vec<_> = history
            .iter()
            .map(|a| {
                serde_json::json!({
                    "id": a.id,
                    "attempt_number": a.attempt_number,
                    "started_at": a.started_at,
                    "finished_at": a.finished_at,
                    "time_used_seconds": a.time_used_seconds,
                    "raw_score": a.raw_score,
                    "total_questions": a.total_questions,
                    "percentage": a.percentage,
                    "status": a.status,
                    "answers": a.answers,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    if history.is_empty() {
        println!("no attempts yet");
    }
    for a in &history {
        println!(
            "#{:<3} {}  {}/{} ({}%)  {}s  {}",
            a.attempt_number,
            a.finished_at.format("%Y-%m-%d %H:%M"),
            a.raw_score,
            a.total_questions,
            a.percentage,
            a.time_used_seconds,
            a.status
        );
    }
    Ok(())
}

fn prompt(line: &str) -> Result<Option<String>, std::io::Error> {
    print!("{line}");
    std::io::stdout().flush()?;
    let mut input = String::new();
    if std::io::stdin().lock().read_line(&mut input)? == 0 {
        return Ok(None);
    }
    Ok(Some(input.trim().to_string()))
}

fn show_question(active: &ActiveSession) {
    let Some(q) = active.current_question() else {
        return;
    };
    let progress = active.progress();
    println!();
    println!("[{}/{}] {}", q.position + 1, progress.total, q.text);
    let selected = active.displayed_selection(&q.id);
    for (i, option) in q.options.iter().enumerate() {
        let mark = if selected == Some(i) { '*' } else { ' ' };
        println!("  {mark} {}) {option}", i + 1);
    }
}

/// Terminal quiz: number selects, `n`/`p` move, `s` submits, `q` leaves the
/// session saved for later.
async fn take(services: &AssessmentServices, args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let topic_id = args.topic()?;
    let student_id = args
        .student_id
        .ok_or(ArgsError::MissingFlag { flag: "--student" })?;
    let course_id = args
        .course_id
        .ok_or(ArgsError::MissingFlag { flag: "--course" })?;

    let svc = services.session_loop();
    let mut active = svc
        .start_for_student(student_id, course_id, topic_id)
        .await?;
    if svc.expire(&mut active).await? {
        println!("time limit reached; this session was abandoned");
    }
    match active.status() {
        SessionStatus::Completed { attempt_id } => {
            let attempt = services.reports().get_attempt(attempt_id).await?;
            println!("already submitted: {}%", attempt.percentage);
            if prompt("start a new attempt? [y/N] ")?.as_deref() != Some("y") {
                return Ok(());
            }
            svc.retry(&mut active).await?;
        }
        SessionStatus::Abandoned => svc.retry(&mut active).await?,
        _ => {}
    }
    if active.is_resumed() {
        println!("resuming where you left off");
    }
    if let Some(reading) = active.reading() {
        println!();
        println!("{reading}");
    }

    run_quiz(&svc, &mut active).await
}

async fn run_quiz(
    svc: &SessionLoopService,
    active: &mut ActiveSession,
) -> Result<(), Box<dyn std::error::Error>> {
    loop {
        if svc.expire(active).await? {
            println!("time is up; the attempt was abandoned");
            return Ok(());
        }
        show_question(active);
        if let Some(left) = svc.time_left(active) {
            println!("  ({}s left)", left.num_seconds());
        }
        let Some(input) = prompt("> ")? else {
            return Ok(());
        };
        match input.as_str() {
            "q" => {
                println!("progress saved");
                return Ok(());
            }
            "n" => {
                svc.advance(active).await?;
            }
            "p" => {
                svc.retreat(active).await?;
            }
            "s" => match svc.submit(active).await {
                Ok(SubmitOutcome::Completed(attempt)) => {
                    let verdict = if active.config().passes(attempt.percentage) {
                        "passed"
                    } else {
                        "not passed"
                    };
                    println!(
                        "attempt {}: {}/{} correct ({}%), {}",
                        attempt.attempt_number,
                        attempt.raw_score,
                        attempt.total_questions,
                        attempt.percentage,
                        verdict
                    );
                    return Ok(());
                }
                Ok(SubmitOutcome::InFlight) => println!("submission already in progress"),
                Err(e) if e.is_retryable() => println!("could not submit ({e}); try again"),
                Err(e) => println!("{e}"),
            },
            other => {
                let Some(q) = active.current_question() else {
                    continue;
                };
                match other.parse::<usize>() {
                    Ok(n) if (1..=q.options.len()).contains(&n) => {
                        svc.select_answer(active, &q.id, n - 1).await?;
                        svc.advance(active).await?;
                    }
                    _ => println!("enter 1-{}, n, p, s or q", q.options.len()),
                }
            }
        }
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::from_default_env().add_directive("info".parse()?);
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let argv: Vec<String> = std::env::args().skip(1).collect();
    let cmd = match argv.first().map(String::as_str) {
        None | Some("--help" | "-h") => {
            print_usage();
            return Ok(());
        }
        Some(first) => Command::from_arg(first).ok_or_else(|| {
            eprintln!("unknown subcommand: {first}");
            print_usage();
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "unknown subcommand")
        })?,
    };

    let mut iter = argv.into_iter().skip(1);
    let parsed = Args::parse(&mut iter).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    // Open + migrate SQLite at startup; every command needs the schema.
    prepare_sqlite_file(&parsed.db_url)?;
    let services = AssessmentServices::new_sqlite(&parsed.db_url, Clock::default()).await?;
    tracing::debug!(db = %parsed.db_url, ?cmd, "storage ready");

    match cmd {
        Command::Migrate => {
            println!("database ready at {}", parsed.db_url);
            Ok(())
        }
        Command::Report => report(&services, &parsed).await,
        Command::Attempts => attempts(&services, &parsed).await,
        Command::Take => take(&services, &parsed).await,
    }
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        // At this layer (binary glue), printing once is fine.
        eprintln!("{err}");
        std::process::exit(2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Args, ArgsError> {
        let mut iter = args.iter().map(|s| (*s).to_string());
        Args::parse(&mut iter)
    }

    #[test]
    fn parses_ids_and_flags() {
        let args = parse(&["--topic", "4", "--enrollment", "9", "--json", "--db", "sqlite::memory:"])
            .unwrap();
        assert_eq!(args.topic_id, Some(TopicId::new(4)));
        assert_eq!(args.enrollment_id, Some(EnrollmentId::new(9)));
        assert!(args.json);
        assert_eq!(args.db_url, "sqlite::memory:");
    }

    #[test]
    fn rejects_bad_input() {
        assert!(matches!(
            parse(&["--topic", "x"]),
            Err(ArgsError::InvalidId { flag: "--topic", .. })
        ));
        assert!(matches!(
            parse(&["--topic"]),
            Err(ArgsError::MissingValue { flag: "--topic" })
        ));
        assert!(matches!(parse(&["--bogus"]), Err(ArgsError::UnknownArg(_))));
        assert!(matches!(
            parse(&[]).unwrap().topic(),
            Err(ArgsError::MissingFlag { flag: "--topic" })
        ));
    }

    #[test]
    fn relative_sqlite_paths_become_absolute() {
        let url = normalize_sqlite_url("sqlite:data/quiz.sqlite3".into());
        assert!(url.starts_with("sqlite:///"));
        assert!(url.ends_with("data/quiz.sqlite3"));
        assert_eq!(normalize_sqlite_url("sqlite::memory:".into()), "sqlite::memory:");
    }
}
