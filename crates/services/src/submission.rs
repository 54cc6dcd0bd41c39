use std::sync::Arc;

use quiz_core::model::{Attempt, AttemptConfig, AttemptStatus, NewAttempt, TopicContent};
use quiz_core::scoring::{score, time_used_seconds};
use quiz_core::session::SubmissionSnapshot;
use storage::repository::{
    AttemptRepository, EnrollmentRepository, StorageError, TopicRepository,
};

use crate::Clock;
use crate::error::SubmissionError;

/// Scores submitted sessions and records them as attempts.
#[derive(Clone)]
pub struct SubmissionService {
    clock: Clock,
    topics: Arc<dyn TopicRepository>,
    enrollments: Arc<dyn EnrollmentRepository>,
    attempts: Arc<dyn AttemptRepository>,
}

impl SubmissionService {
    #[must_use]
    pub fn new(
        clock: Clock,
        topics: Arc<dyn TopicRepository>,
        enrollments: Arc<dyn EnrollmentRepository>,
        attempts: Arc<dyn AttemptRepository>,
    ) -> Self {
        Self {
            clock,
            topics,
            enrollments,
            attempts,
        }
    }

    /// Score `snapshot` against already loaded content and persist the attempt.
    ///
    /// A session records at most one attempt: if the session behind `snapshot`
    /// already produced one, that attempt is returned unchanged.
    ///
    /// # Errors
    ///
    /// Returns `SubmissionError::AttemptLimitExceeded` when the configured
    /// limit is used up, `DuplicateAttempt` when a concurrent submit stored the
    /// same attempt number first, and `Storage` for backend failures.
    pub async fn submit(
        &self,
        snapshot: &SubmissionSnapshot,
        content: &TopicContent,
        config: &AttemptConfig,
    ) -> Result<Attempt, SubmissionError> {
        if let Some(existing) = self.recorded_for_session(snapshot).await? {
            tracing::info!(
                attempt_id = %existing.id,
                topic_id = %snapshot.topic_id,
                enrollment_id = %snapshot.enrollment_id,
                "session already recorded an attempt"
            );
            return Ok(existing);
        }

        let finished_at = self.clock.now();
        let time_used = time_used_seconds(snapshot.started_at, finished_at);

        let prior = self
            .attempts
            .count_attempts(snapshot.topic_id, snapshot.enrollment_id)
            .await?;
        let attempt_number = prior + 1;
        if let Some(max_attempts) = config.max_attempts() {
            if attempt_number > max_attempts {
                tracing::info!(
                    topic_id = %snapshot.topic_id,
                    enrollment_id = %snapshot.enrollment_id,
                    max_attempts,
                    "attempt limit reached"
                );
                return Err(SubmissionError::AttemptLimitExceeded { max_attempts });
            }
        }

        let result = score(content, &snapshot.answers);
        let attempt = NewAttempt {
            topic_id: snapshot.topic_id,
            enrollment_id: snapshot.enrollment_id,
            student_id: snapshot.student_id,
            attempt_number,
            session_seed: Some(snapshot.session_seed),
            started_at: snapshot.started_at.unwrap_or(finished_at),
            finished_at,
            time_used_seconds: time_used,
            answers: snapshot.answers.clone(),
            raw_score: result.raw_score,
            total_questions: result.total_questions,
            percentage: result.percentage,
            status: AttemptStatus::Completed,
        };

        match self.attempts.insert_attempt(attempt).await {
            Ok(stored) => {
                tracing::info!(
                    attempt_id = %stored.id,
                    topic_id = %stored.topic_id,
                    enrollment_id = %stored.enrollment_id,
                    attempt_number,
                    percentage = stored.percentage,
                    "attempt recorded"
                );
                Ok(stored)
            }
            Err(StorageError::Conflict) => {
                if let Some(existing) = self.recorded_for_session(snapshot).await? {
                    tracing::info!(
                        attempt_id = %existing.id,
                        "concurrent submit of the same session already recorded"
                    );
                    return Ok(existing);
                }
                tracing::warn!(
                    topic_id = %snapshot.topic_id,
                    enrollment_id = %snapshot.enrollment_id,
                    attempt_number,
                    "duplicate attempt rejected"
                );
                Err(SubmissionError::DuplicateAttempt { attempt_number })
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn recorded_for_session(
        &self,
        snapshot: &SubmissionSnapshot,
    ) -> Result<Option<Attempt>, StorageError> {
        self.attempts
            .find_attempt_for_session(
                snapshot.topic_id,
                snapshot.enrollment_id,
                snapshot.session_seed,
            )
            .await
    }

    /// Submit a snapshot on its own: the topic is loaded and parsed, and the
    /// enrollment is checked against the snapshot's student.
    ///
    /// # Errors
    ///
    /// Returns `SubmissionError::MalformedContent` if the stored content does
    /// not parse, `NotEnrolled` if the enrollment is missing or belongs to
    /// someone else, plus everything `submit` returns.
    pub async fn submit_snapshot(
        &self,
        snapshot: &SubmissionSnapshot,
    ) -> Result<Attempt, SubmissionError> {
        let topic = self
            .topics
            .get_topic(snapshot.topic_id)
            .await?
            .ok_or(StorageError::NotFound)?;

        let enrollment = self
            .enrollments
            .get_enrollment(snapshot.enrollment_id)
            .await?
            .ok_or(SubmissionError::NotEnrolled)?;
        if enrollment.student_id != snapshot.student_id || enrollment.course_id != topic.course_id
        {
            return Err(SubmissionError::NotEnrolled);
        }

        let content = TopicContent::parse(&topic.content).inspect_err(|e| {
            tracing::error!(topic_id = %topic.id, error = %e, "topic content is malformed");
        })?;
        self.submit(snapshot, &content, &topic.config).await
    }
}
