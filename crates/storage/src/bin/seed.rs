use std::fmt;

use chrono::{DateTime, Duration, Utc};
use quiz_core::model::{
    AnswerMap, AttemptConfig, AttemptStatus, CourseId, EnrollmentId, NewAttempt, Question,
    QuestionId, Selection, StudentId, TopicContent, TopicId,
};
use quiz_core::scoring::{score, time_used_seconds};
use storage::repository::{Enrollment, Storage, StorageError, TopicRecord};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone)]
struct Args {
    db_url: String,
    topic_id: TopicId,
    course_id: CourseId,
    title: String,
    students: u32,
    attempts: u32,
    now: Option<DateTime<Utc>>,
}

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidTopicId { raw: String },
    InvalidCourseId { raw: String },
    InvalidStudents { raw: String },
    InvalidAttempts { raw: String },
    InvalidDbUrl { raw: String },
    InvalidNow { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidTopicId { raw } => write!(f, "invalid --topic-id value: {raw}"),
            ArgsError::InvalidCourseId { raw } => write!(f, "invalid --course-id value: {raw}"),
            ArgsError::InvalidStudents { raw } => write!(f, "invalid --students value: {raw}"),
            ArgsError::InvalidAttempts { raw } => write!(f, "invalid --attempts value: {raw}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::InvalidNow { raw } => {
                write!(f, "invalid --now value (expected RFC3339): {raw}")
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

fn env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .unwrap_or(default)
}

fn env_u32(name: &str, default: u32) -> u32 {
    std::env::var(name)
        .ok()
        .and_then(|value| value.parse::<u32>().ok())
        .unwrap_or(default)
}

impl Args {
    fn parse() -> Result<Self, ArgsError> {
        let mut db_url =
            std::env::var("QUIZ_DB_URL").unwrap_or_else(|_| "sqlite:dev.sqlite3".into());
        let mut topic_id = TopicId::new(env_u64("QUIZ_TOPIC_ID", 1));
        let mut course_id = CourseId::new(env_u64("QUIZ_COURSE_ID", 1));
        let mut title = std::env::var("QUIZ_TOPIC_TITLE").unwrap_or_else(|_| "Solar system".into());
        let mut students = env_u32("QUIZ_STUDENTS", 3);
        let mut attempts = env_u32("QUIZ_ATTEMPTS", 2);
        let mut now: Option<DateTime<Utc>> = None;

        let mut args = std::env::args().skip(1);
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(&mut args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = value;
                }
                "--topic-id" => {
                    let value = require_value(&mut args, "--topic-id")?;
                    topic_id = value
                        .parse()
                        .map_err(|_| ArgsError::InvalidTopicId { raw: value.clone() })?;
                }
                "--course-id" => {
                    let value = require_value(&mut args, "--course-id")?;
                    course_id = value
                        .parse()
                        .map_err(|_| ArgsError::InvalidCourseId { raw: value.clone() })?;
                }
                "--title" => {
                    title = require_value(&mut args, "--title")?;
                }
                "--students" => {
                    let value = require_value(&mut args, "--students")?;
                    students = value
                        .parse::<u32>()
                        .map_err(|_| ArgsError::InvalidStudents { raw: value.clone() })?;
                }
                "--attempts" => {
                    let value = require_value(&mut args, "--attempts")?;
                    attempts = value
                        .parse::<u32>()
                        .map_err(|_| ArgsError::InvalidAttempts { raw: value.clone() })?;
                }
                "--now" => {
                    let value = require_value(&mut args, "--now")?;
                    let parsed = DateTime::parse_from_rfc3339(&value)
                        .map_err(|_| ArgsError::InvalidNow { raw: value.clone() })?
                        .with_timezone(&Utc);
                    now = Some(parsed);
                }
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(Self {
            db_url,
            topic_id,
            course_id,
            title,
            students,
            attempts,
            now,
        })
    }
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p storage --bin seed -- [options]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --db <sqlite_url>         SQLite URL (default: sqlite:dev.sqlite3)");
    eprintln!("  --topic-id <id>           Topic id to upsert (default: 1)");
    eprintln!("  --course-id <id>          Course owning the topic (default: 1)");
    eprintln!("  --title <text>            Topic title (default: Solar system)");
    eprintln!("  --students <n>            Students to enroll (default: 3)");
    eprintln!("  --attempts <n>            Completed attempts per student (default: 2)");
    eprintln!("  --now <rfc3339>           Fixed current time for deterministic seeding");
    eprintln!("  -h, --help                Show this help");
    eprintln!();
    eprintln!("Environment (same as flags):");
    eprintln!(
        "  QUIZ_DB_URL, QUIZ_TOPIC_ID, QUIZ_COURSE_ID, QUIZ_TOPIC_TITLE, QUIZ_STUDENTS, QUIZ_ATTEMPTS"
    );
}

fn sample_content() -> Result<TopicContent, Box<dyn std::error::Error>> {
    let samples: [(&str, &str, [&str; 4], usize); 4] = [
        ("q1", "Which planet is closest to the Sun?", ["Venus", "Mercury", "Mars", "Earth"], 1),
        ("q2", "Which planet has the most moons?", ["Saturn", "Jupiter", "Uranus", "Neptune"], 0),
        ("q3", "What is the largest planet?", ["Earth", "Saturn", "Jupiter", "Neptune"], 2),
        ("q4", "Which planet is known as the red planet?", ["Mars", "Venus", "Mercury", "Uranus"], 0),
    ];
    let questions = samples
        .iter()
        .map(|(id, text, options, correct)| {
            Question::new(
                QuestionId::new(*id),
                *text,
                options.iter().map(|s| (*s).to_string()).collect(),
                *correct,
            )
        })
        .collect::<Result<Vec<_>, _>>()?;
    let reading = "The solar system has eight planets orbiting the Sun.".to_string();
    Ok(TopicContent::new(Some(reading), questions)?)
}

/// Deterministic answers: some right, some wrong, varying by student and attempt.
fn simulated_answers(content: &TopicContent, student: u32, attempt: u32) -> AnswerMap {
    content
        .questions()
        .iter()
        .enumerate()
        .map(|(i, q)| {
            let salt = (student as usize) + (attempt as usize) + i;
            let index = if salt % 3 == 0 {
                (q.correct_answer_index() + 1) % q.option_count()
            } else {
                q.correct_answer_index()
            };
            (q.id().clone(), Selection::new(index, q.options()[index].clone()))
        })
        .collect()
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::from_default_env().add_directive("seed=info".parse()?);
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = Args::parse().map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    let storage = Storage::sqlite(&args.db_url).await?;
    let now = args.now.unwrap_or_else(Utc::now);

    let content = sample_content()?;
    let topic = TopicRecord {
        id: args.topic_id,
        course_id: args.course_id,
        title: args.title.clone(),
        content: content.to_raw_json(),
        config: AttemptConfig::default(),
    };
    storage.topics.upsert_topic(&topic).await?;
    tracing::info!(topic_id = %topic.id, questions = content.len(), "seeded topic");

    let mut inserted = 0_u32;
    for s in 1..=args.students {
        let enrollment = Enrollment {
            id: EnrollmentId::new(u64::from(s)),
            student_id: StudentId::new(u64::from(s)),
            course_id: args.course_id,
        };
        storage.enrollments.upsert_enrollment(&enrollment).await?;

        let existing = storage
            .attempts
            .count_attempts(topic.id, enrollment.id)
            .await?;
        for a in (existing + 1)..=args.attempts {
            let finished_at = now - Duration::days(i64::from(args.attempts - a))
                + Duration::minutes(i64::from(s));
            let started_at = finished_at - Duration::minutes(4);
            let answers = simulated_answers(&content, s, a);
            let result = score(&content, &answers);

            let attempt = NewAttempt {
                topic_id: topic.id,
                enrollment_id: enrollment.id,
                student_id: enrollment.student_id,
                attempt_number: a,
                session_seed: None,
                started_at,
                finished_at,
                time_used_seconds: time_used_seconds(Some(started_at), finished_at),
                answers,
                raw_score: result.raw_score,
                total_questions: result.total_questions,
                percentage: result.percentage,
                status: AttemptStatus::Completed,
            };
            match storage.attempts.insert_attempt(attempt).await {
                Ok(_) => inserted += 1,
                Err(StorageError::Conflict) => {
                    tracing::warn!(student = s, attempt = a, "attempt already seeded");
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    println!(
        "Seeded topic {} with {} students and {} new attempts into {}",
        topic.id.value(),
        args.students,
        inserted,
        args.db_url
    );

    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}
