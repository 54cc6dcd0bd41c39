//! Shared error types for the services crate.

use thiserror::Error;

use quiz_core::model::{AttemptId, ContentError, CourseId, EnrollmentId, StudentId, TopicId};
use quiz_core::session::SessionStateError;
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

/// Errors emitted by `SubmissionService` and the submit path of the session loop.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SubmissionError {
    /// The topic content cannot be scored; an instructor has to fix it.
    #[error("topic content is malformed: {0}")]
    MalformedContent(#[from] ContentError),

    #[error("attempt limit of {max_attempts} reached")]
    AttemptLimitExceeded { max_attempts: u32 },

    /// Another submission already stored this attempt number.
    #[error("attempt {attempt_number} was already submitted")]
    DuplicateAttempt { attempt_number: u32 },

    #[error("student is not enrolled for this topic")]
    NotEnrolled,

    #[error("session already completed")]
    AlreadyCompleted,

    #[error(transparent)]
    Session(SessionStateError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl SubmissionError {
    /// True for transient storage failures; the learner can submit again.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, SubmissionError::Storage(e) if e.is_transient())
    }
}

impl From<SessionStateError> for SubmissionError {
    fn from(err: SessionStateError) -> Self {
        match err {
            SessionStateError::Completed => SubmissionError::AlreadyCompleted,
            other => SubmissionError::Session(other),
        }
    }
}

/// Errors emitted by session services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SessionError {
    #[error("topic {0} not found")]
    TopicNotFound(TopicId),

    #[error("enrollment {0} not found")]
    EnrollmentNotFound(EnrollmentId),

    #[error("student {student_id} is not enrolled in course {course_id}")]
    NotEnrolled {
        student_id: StudentId,
        course_id: CourseId,
    },

    #[error("topic {topic_id} does not belong to course {course_id}")]
    TopicNotInCourse {
        topic_id: TopicId,
        course_id: CourseId,
    },

    #[error("no attempts left (limit {max_attempts})")]
    NoAttemptsLeft { max_attempts: u32 },

    #[error(transparent)]
    Content(#[from] ContentError),

    #[error(transparent)]
    State(#[from] SessionStateError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by `ReportService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ReportError {
    #[error("topic {0} not found")]
    TopicNotFound(TopicId),

    #[error("attempt {0} not found")]
    AttemptNotFound(AttemptId),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted while bootstrapping assessment services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}
