use chrono::Utc;
use quiz_core::session::{QuizSession, SessionKey};
use sqlx::Row;

use super::SqliteRepository;
use super::mapping::{conn, id_i64, ser};
use crate::repository::{SessionStore, StorageError};

#[async_trait::async_trait]
impl SessionStore for SqliteRepository {
    async fn load_session(&self, key: SessionKey) -> Result<Option<QuizSession>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT state
            FROM quiz_sessions
            WHERE enrollment_id = ?1 AND topic_id = ?2
            ",
        )
        .bind(id_i64("enrollment_id", key.enrollment_id.value())?)
        .bind(id_i64("topic_id", key.topic_id.value())?)
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let state: String = row.try_get("state").map_err(ser)?;
        serde_json::from_str(&state).map(Some).map_err(ser)
    }

    async fn save_session(&self, session: &QuizSession) -> Result<(), StorageError> {
        let key = session.key();
        let state = serde_json::to_string(session).map_err(ser)?;

        sqlx::query(
            r"
            INSERT INTO quiz_sessions (enrollment_id, topic_id, state, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(enrollment_id, topic_id) DO UPDATE SET
                state = excluded.state,
                updated_at = excluded.updated_at
            ",
        )
        .bind(id_i64("enrollment_id", key.enrollment_id.value())?)
        .bind(id_i64("topic_id", key.topic_id.value())?)
        .bind(state)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        Ok(())
    }

    async fn clear_session(&self, key: SessionKey) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM quiz_sessions WHERE enrollment_id = ?1 AND topic_id = ?2")
            .bind(id_i64("enrollment_id", key.enrollment_id.value())?)
            .bind(id_i64("topic_id", key.topic_id.value())?)
            .execute(&self.pool)
            .await
            .map_err(conn)?;

        Ok(())
    }
}
