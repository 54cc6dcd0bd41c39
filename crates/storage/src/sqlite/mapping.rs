use quiz_core::model::{
    AnswerMap, Attempt, AttemptConfig, AttemptId, AttemptStatus, CourseId, EnrollmentId,
    StudentId, TopicId,
};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use crate::repository::{Enrollment, StorageError, TopicRecord};

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn conn<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

/// Maps a write failure, turning unique-constraint violations into `Conflict`.
pub(crate) fn write_err(e: sqlx::Error) -> StorageError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => StorageError::Conflict,
        _ => conn(e),
    }
}

fn i64_to_u64(field: &'static str, v: i64) -> Result<u64, StorageError> {
    u64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} sign overflow")))
}

fn i64_to_u32(field: &'static str, v: i64) -> Result<u32, StorageError> {
    u32::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

pub(crate) fn id_i64(field: &'static str, v: u64) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

/// Seeds use the full u64 range; they are stored bit-for-bit as `INTEGER`.
pub(crate) fn seed_to_i64(seed: u64) -> i64 {
    i64::from_ne_bytes(seed.to_ne_bytes())
}

fn seed_from_i64(v: i64) -> u64 {
    u64::from_ne_bytes(v.to_ne_bytes())
}

pub(crate) fn attempt_id_from_i64(v: i64) -> Result<AttemptId, StorageError> {
    Ok(AttemptId::new(i64_to_u64("attempt_id", v)?))
}

fn get_u64(row: &SqliteRow, field: &'static str) -> Result<u64, StorageError> {
    i64_to_u64(field, row.try_get::<i64, _>(field).map_err(ser)?)
}

fn get_u32(row: &SqliteRow, field: &'static str) -> Result<u32, StorageError> {
    i64_to_u32(field, row.try_get::<i64, _>(field).map_err(ser)?)
}

pub(crate) fn map_topic_row(row: &SqliteRow) -> Result<TopicRecord, StorageError> {
    let max_attempts = row
        .try_get::<Option<i64>, _>("max_attempts")
        .map_err(ser)?
        .map(|v| i64_to_u32("max_attempts", v))
        .transpose()?;
    let time_limit = row
        .try_get::<Option<i64>, _>("time_limit_secs")
        .map_err(ser)?
        .map(|v| i64_to_u32("time_limit_secs", v))
        .transpose()?;
    let threshold: i64 = row.try_get("pass_threshold").map_err(ser)?;
    let threshold = u8::try_from(threshold)
        .map_err(|_| StorageError::Serialization(format!("invalid pass_threshold: {threshold}")))?;

    let config = AttemptConfig::new(
        row.try_get::<bool, _>("randomize_questions").map_err(ser)?,
        row.try_get::<bool, _>("randomize_options").map_err(ser)?,
        max_attempts,
        threshold,
    )
    .and_then(|c| c.with_time_limit_secs(time_limit))
    .map_err(ser)?;

    Ok(TopicRecord {
        id: TopicId::new(get_u64(row, "id")?),
        course_id: CourseId::new(get_u64(row, "course_id")?),
        title: row.try_get("title").map_err(ser)?,
        content: row.try_get("content").map_err(ser)?,
        config,
    })
}

pub(crate) fn map_enrollment_row(row: &SqliteRow) -> Result<Enrollment, StorageError> {
    Ok(Enrollment {
        id: EnrollmentId::new(get_u64(row, "id")?),
        student_id: StudentId::new(get_u64(row, "student_id")?),
        course_id: CourseId::new(get_u64(row, "course_id")?),
    })
}

pub(crate) fn map_attempt_row(row: &SqliteRow) -> Result<Attempt, StorageError> {
    let answers_json: String = row.try_get("answers").map_err(ser)?;
    let answers: AnswerMap = serde_json::from_str(&answers_json).map_err(ser)?;

    let status_str: String = row.try_get("status").map_err(ser)?;
    let status: AttemptStatus = status_str.parse().map_err(ser)?;

    let percentage: i64 = row.try_get("percentage").map_err(ser)?;
    let percentage = u8::try_from(percentage)
        .ok()
        .filter(|p| *p <= 100)
        .ok_or_else(|| StorageError::Serialization(format!("invalid percentage: {percentage}")))?;

    Ok(Attempt {
        id: attempt_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?)?,
        topic_id: TopicId::new(get_u64(row, "topic_id")?),
        enrollment_id: EnrollmentId::new(get_u64(row, "enrollment_id")?),
        student_id: StudentId::new(get_u64(row, "student_id")?),
        attempt_number: get_u32(row, "attempt_number")?,
        session_seed: row
            .try_get::<Option<i64>, _>("session_seed")
            .map_err(ser)?
            .map(seed_from_i64),
        started_at: row.try_get("started_at").map_err(ser)?,
        finished_at: row.try_get("finished_at").map_err(ser)?,
        time_used_seconds: get_u32(row, "time_used_seconds")?,
        answers,
        raw_score: get_u32(row, "raw_score")?,
        total_questions: get_u32(row, "total_questions")?,
        percentage,
        status,
    })
}
