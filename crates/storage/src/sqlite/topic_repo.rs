use quiz_core::model::TopicId;

use super::SqliteRepository;
use super::mapping::{conn, id_i64, map_topic_row};
use crate::repository::{StorageError, TopicRecord, TopicRepository};

#[async_trait::async_trait]
impl TopicRepository for SqliteRepository {
    async fn upsert_topic(&self, topic: &TopicRecord) -> Result<(), StorageError> {
        let config = topic.config;
        sqlx::query(
            r"
            INSERT INTO topics (id, course_id, title, content, randomize_questions, randomize_options, max_attempts, pass_threshold, time_limit_secs)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(id) DO UPDATE SET
                course_id = excluded.course_id,
                title = excluded.title,
                content = excluded.content,
                randomize_questions = excluded.randomize_questions,
                randomize_options = excluded.randomize_options,
                max_attempts = excluded.max_attempts,
                pass_threshold = excluded.pass_threshold,
                time_limit_secs = excluded.time_limit_secs
            ",
        )
        .bind(id_i64("topic_id", topic.id.value())?)
        .bind(id_i64("course_id", topic.course_id.value())?)
        .bind(topic.title.as_str())
        .bind(topic.content.as_str())
        .bind(config.randomize_questions())
        .bind(config.randomize_options())
        .bind(config.max_attempts().map(i64::from))
        .bind(i64::from(config.pass_threshold()))
        .bind(config.time_limit_secs().map(i64::from))
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        Ok(())
    }

    async fn get_topic(&self, id: TopicId) -> Result<Option<TopicRecord>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT id, course_id, title, content, randomize_questions, randomize_options,
                   max_attempts, pass_threshold, time_limit_secs
            FROM topics
            WHERE id = ?1
            ",
        )
        .bind(id_i64("topic_id", id.value())?)
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;

        row.as_ref().map(map_topic_row).transpose()
    }
}
