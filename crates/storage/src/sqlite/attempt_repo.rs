use quiz_core::model::{Attempt, AttemptId, EnrollmentId, NewAttempt, TopicId};
use sqlx::Row;

use super::SqliteRepository;
use super::mapping::{
    attempt_id_from_i64, conn, id_i64, map_attempt_row, seed_to_i64, ser, write_err,
};
use crate::repository::{AttemptRepository, StorageError};

const ATTEMPT_COLUMNS: &str = "id, topic_id, enrollment_id, student_id, attempt_number, \
     session_seed, started_at, finished_at, time_used_seconds, answers, raw_score, \
     total_questions, percentage, status";

#[async_trait::async_trait]
impl AttemptRepository for SqliteRepository {
    async fn count_attempts(
        &self,
        topic_id: TopicId,
        enrollment_id: EnrollmentId,
    ) -> Result<u32, StorageError> {
        let row = sqlx::query(
            r"
            SELECT COUNT(*) AS n
            FROM attempts
            WHERE topic_id = ?1 AND enrollment_id = ?2
            ",
        )
        .bind(id_i64("topic_id", topic_id.value())?)
        .bind(id_i64("enrollment_id", enrollment_id.value())?)
        .fetch_one(&self.pool)
        .await
        .map_err(conn)?;

        let n: i64 = row.try_get("n").map_err(ser)?;
        u32::try_from(n).map_err(|_| StorageError::Serialization(format!("invalid count: {n}")))
    }

    async fn insert_attempt(&self, attempt: NewAttempt) -> Result<Attempt, StorageError> {
        let answers = serde_json::to_string(&attempt.answers).map_err(ser)?;

        // The unique (topic, enrollment, attempt_number) and
        // (topic, enrollment, session_seed) indexes arbitrate concurrent and
        // repeated submits; the loser sees `Conflict`.
        let res = sqlx::query(
            r"
            INSERT INTO attempts (topic_id, enrollment_id, student_id, attempt_number,
                                  session_seed, started_at, finished_at, time_used_seconds,
                                  answers, raw_score, total_questions, percentage, status)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            ",
        )
        .bind(id_i64("topic_id", attempt.topic_id.value())?)
        .bind(id_i64("enrollment_id", attempt.enrollment_id.value())?)
        .bind(id_i64("student_id", attempt.student_id.value())?)
        .bind(i64::from(attempt.attempt_number))
        .bind(attempt.session_seed.map(seed_to_i64))
        .bind(attempt.started_at)
        .bind(attempt.finished_at)
        .bind(i64::from(attempt.time_used_seconds))
        .bind(answers)
        .bind(i64::from(attempt.raw_score))
        .bind(i64::from(attempt.total_questions))
        .bind(i64::from(attempt.percentage))
        .bind(attempt.status.as_str())
        .execute(&self.pool)
        .await
        .map_err(write_err)?;

        let id = attempt_id_from_i64(res.last_insert_rowid())?;
        Ok(attempt.assign_id(id))
    }

    async fn get_attempt(&self, id: AttemptId) -> Result<Option<Attempt>, StorageError> {
        let sql = format!("SELECT {ATTEMPT_COLUMNS} FROM attempts WHERE id = ?1");
        let row = sqlx::query(&sql)
            .bind(id_i64("attempt_id", id.value())?)
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?;

        row.as_ref().map(map_attempt_row).transpose()
    }

    async fn find_attempt(
        &self,
        topic_id: TopicId,
        enrollment_id: EnrollmentId,
        attempt_number: u32,
    ) -> Result<Option<Attempt>, StorageError> {
        let sql = format!(
            "SELECT {ATTEMPT_COLUMNS} FROM attempts \
             WHERE topic_id = ?1 AND enrollment_id = ?2 AND attempt_number = ?3"
        );
        let row = sqlx::query(&sql)
            .bind(id_i64("topic_id", topic_id.value())?)
            .bind(id_i64("enrollment_id", enrollment_id.value())?)
            .bind(i64::from(attempt_number))
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?;

        row.as_ref().map(map_attempt_row).transpose()
    }

    async fn find_attempt_for_session(
        &self,
        topic_id: TopicId,
        enrollment_id: EnrollmentId,
        session_seed: u64,
    ) -> Result<Option<Attempt>, StorageError> {
        let sql = format!(
            "SELECT {ATTEMPT_COLUMNS} FROM attempts \
             WHERE topic_id = ?1 AND enrollment_id = ?2 AND session_seed = ?3"
        );
        let row = sqlx::query(&sql)
            .bind(id_i64("topic_id", topic_id.value())?)
            .bind(id_i64("enrollment_id", enrollment_id.value())?)
            .bind(seed_to_i64(session_seed))
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?;

        row.as_ref().map(map_attempt_row).transpose()
    }

    async fn list_attempts(&self, topic_id: TopicId) -> Result<Vec<Attempt>, StorageError> {
        let sql = format!(
            "SELECT {ATTEMPT_COLUMNS} FROM attempts WHERE topic_id = ?1 \
             ORDER BY finished_at ASC, id ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(id_i64("topic_id", topic_id.value())?)
            .fetch_all(&self.pool)
            .await
            .map_err(conn)?;

        rows.iter().map(map_attempt_row).collect()
    }

    async fn list_attempts_for_enrollment(
        &self,
        topic_id: TopicId,
        enrollment_id: EnrollmentId,
    ) -> Result<Vec<Attempt>, StorageError> {
        let sql = format!(
            "SELECT {ATTEMPT_COLUMNS} FROM attempts WHERE topic_id = ?1 AND enrollment_id = ?2 \
             ORDER BY attempt_number ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(id_i64("topic_id", topic_id.value())?)
            .bind(id_i64("enrollment_id", enrollment_id.value())?)
            .fetch_all(&self.pool)
            .await
            .map_err(conn)?;

        rows.iter().map(map_attempt_row).collect()
    }
}
