use async_trait::async_trait;
use quiz_core::model::{
    Attempt, AttemptConfig, AttemptId, CourseId, EnrollmentId, NewAttempt, StudentId, TopicId,
};
use quiz_core::session::{QuizSession, SessionKey};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl StorageError {
    /// Whether retrying the same operation may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, StorageError::Connection(_))
    }
}

//
// ─── RECORDS ───────────────────────────────────────────────────────────────────
//

/// Persisted topic: raw content blob plus its attempt settings.
///
/// The blob is parsed by the services layer so a misconfigured topic surfaces
/// as a content error rather than a storage error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicRecord {
    pub id: TopicId,
    pub course_id: CourseId,
    pub title: String,
    pub content: String,
    pub config: AttemptConfig,
}

/// A student's enrollment in a course; scopes attempts and sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Enrollment {
    pub id: EnrollmentId,
    pub student_id: StudentId,
    pub course_id: CourseId,
}

//
// ─── CONTRACTS ─────────────────────────────────────────────────────────────────
//

#[async_trait]
pub trait TopicRepository: Send + Sync {
    /// Persist or replace a topic.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the topic cannot be stored.
    async fn upsert_topic(&self, topic: &TopicRecord) -> Result<(), StorageError>;

    /// Fetch a topic by id. Returns `Ok(None)` when it does not exist.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn get_topic(&self, id: TopicId) -> Result<Option<TopicRecord>, StorageError>;
}

#[async_trait]
pub trait EnrollmentRepository: Send + Sync {
    /// Persist or replace an enrollment.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the student already has another
    /// enrollment in the course.
    async fn upsert_enrollment(&self, enrollment: &Enrollment) -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn get_enrollment(&self, id: EnrollmentId) -> Result<Option<Enrollment>, StorageError>;

    /// Find the enrollment of `student_id` in `course_id`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn resolve_enrollment(
        &self,
        student_id: StudentId,
        course_id: CourseId,
    ) -> Result<Option<Enrollment>, StorageError>;
}

#[async_trait]
pub trait AttemptRepository: Send + Sync {
    /// Number of attempts already recorded for this topic and enrollment.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn count_attempts(
        &self,
        topic_id: TopicId,
        enrollment_id: EnrollmentId,
    ) -> Result<u32, StorageError>;

    /// Insert an attempt atomically.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if `(topic, enrollment, attempt_number)`
    /// or `(topic, enrollment, session_seed)` already exists. The existing row
    /// is never overwritten.
    async fn insert_attempt(&self, attempt: NewAttempt) -> Result<Attempt, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn get_attempt(&self, id: AttemptId) -> Result<Option<Attempt>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn find_attempt(
        &self,
        topic_id: TopicId,
        enrollment_id: EnrollmentId,
        attempt_number: u32,
    ) -> Result<Option<Attempt>, StorageError>;

    /// The attempt recorded by the session with `session_seed`, if any.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn find_attempt_for_session(
        &self,
        topic_id: TopicId,
        enrollment_id: EnrollmentId,
        session_seed: u64,
    ) -> Result<Option<Attempt>, StorageError>;

    /// Every attempt on a topic ordered by `finished_at`, then id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn list_attempts(&self, topic_id: TopicId) -> Result<Vec<Attempt>, StorageError>;

    /// Attempts of one enrollment on a topic ordered by attempt number.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn list_attempts_for_enrollment(
        &self,
        topic_id: TopicId,
        enrollment_id: EnrollmentId,
    ) -> Result<Vec<Attempt>, StorageError>;
}

/// Durable store for in-flight quiz sessions, keyed by enrollment and topic.
///
/// Writes are last-write-wins; each key has a single owner.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError::Serialization` if a stored payload is unreadable.
    async fn load_session(&self, key: SessionKey) -> Result<Option<QuizSession>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if the session cannot be written.
    async fn save_session(&self, session: &QuizSession) -> Result<(), StorageError>;

    /// Remove the session for `key`. Missing sessions are not an error.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn clear_session(&self, key: SessionKey) -> Result<(), StorageError>;
}

//
// ─── IN-MEMORY ─────────────────────────────────────────────────────────────────
//

#[derive(Default)]
struct AttemptTable {
    next_id: u64,
    rows: Vec<Attempt>,
}

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    topics: Arc<Mutex<HashMap<TopicId, TopicRecord>>>,
    enrollments: Arc<Mutex<HashMap<EnrollmentId, Enrollment>>>,
    attempts: Arc<Mutex<AttemptTable>>,
    sessions: Arc<Mutex<HashMap<SessionKey, QuizSession>>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<E: std::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

#[async_trait]
impl TopicRepository for InMemoryRepository {
    async fn upsert_topic(&self, topic: &TopicRecord) -> Result<(), StorageError> {
        let mut guard = self.topics.lock().map_err(poisoned)?;
        guard.insert(topic.id, topic.clone());
        Ok(())
    }

    async fn get_topic(&self, id: TopicId) -> Result<Option<TopicRecord>, StorageError> {
        let guard = self.topics.lock().map_err(poisoned)?;
        Ok(guard.get(&id).cloned())
    }
}

#[async_trait]
impl EnrollmentRepository for InMemoryRepository {
    async fn upsert_enrollment(&self, enrollment: &Enrollment) -> Result<(), StorageError> {
        let mut guard = self.enrollments.lock().map_err(poisoned)?;
        let clash = guard.values().any(|e| {
            e.id != enrollment.id
                && e.student_id == enrollment.student_id
                && e.course_id == enrollment.course_id
        });
        if clash {
            return Err(StorageError::Conflict);
        }
        guard.insert(enrollment.id, *enrollment);
        Ok(())
    }

    async fn get_enrollment(&self, id: EnrollmentId) -> Result<Option<Enrollment>, StorageError> {
        let guard = self.enrollments.lock().map_err(poisoned)?;
        Ok(guard.get(&id).copied())
    }

    async fn resolve_enrollment(
        &self,
        student_id: StudentId,
        course_id: CourseId,
    ) -> Result<Option<Enrollment>, StorageError> {
        let guard = self.enrollments.lock().map_err(poisoned)?;
        Ok(guard
            .values()
            .find(|e| e.student_id == student_id && e.course_id == course_id)
            .copied())
    }
}

#[async_trait]
impl AttemptRepository for InMemoryRepository {
    async fn count_attempts(
        &self,
        topic_id: TopicId,
        enrollment_id: EnrollmentId,
    ) -> Result<u32, StorageError> {
        let guard = self.attempts.lock().map_err(poisoned)?;
        let count = guard
            .rows
            .iter()
            .filter(|a| a.topic_id == topic_id && a.enrollment_id == enrollment_id)
            .count();
        u32::try_from(count).map_err(|_| StorageError::Serialization("attempt count overflow".into()))
    }

    async fn insert_attempt(&self, attempt: NewAttempt) -> Result<Attempt, StorageError> {
        // Check and insert under one guard so concurrent submits cannot both win.
        let mut guard = self.attempts.lock().map_err(poisoned)?;
        let exists = guard.rows.iter().any(|a| {
            a.topic_id == attempt.topic_id
                && a.enrollment_id == attempt.enrollment_id
                && (a.attempt_number == attempt.attempt_number
                    || (attempt.session_seed.is_some() && a.session_seed == attempt.session_seed))
        });
        if exists {
            return Err(StorageError::Conflict);
        }
        guard.next_id += 1;
        let stored = attempt.assign_id(AttemptId::new(guard.next_id));
        guard.rows.push(stored.clone());
        Ok(stored)
    }

    async fn get_attempt(&self, id: AttemptId) -> Result<Option<Attempt>, StorageError> {
        let guard = self.attempts.lock().map_err(poisoned)?;
        Ok(guard.rows.iter().find(|a| a.id == id).cloned())
    }

    async fn find_attempt(
        &self,
        topic_id: TopicId,
        enrollment_id: EnrollmentId,
        attempt_number: u32,
    ) -> Result<Option<Attempt>, StorageError> {
        let guard = self.attempts.lock().map_err(poisoned)?;
        Ok(guard
            .rows
            .iter()
            .find(|a| {
                a.topic_id == topic_id
                    && a.enrollment_id == enrollment_id
                    && a.attempt_number == attempt_number
            })
            .cloned())
    }

    async fn find_attempt_for_session(
        &self,
        topic_id: TopicId,
        enrollment_id: EnrollmentId,
        session_seed: u64,
    ) -> Result<Option<Attempt>, StorageError> {
        let guard = self.attempts.lock().map_err(poisoned)?;
        Ok(guard
            .rows
            .iter()
            .find(|a| {
                a.topic_id == topic_id
                    && a.enrollment_id == enrollment_id
                    && a.session_seed == Some(session_seed)
            })
            .cloned())
    }

    async fn list_attempts(&self, topic_id: TopicId) -> Result<Vec<Attempt>, StorageError> {
        let guard = self.attempts.lock().map_err(poisoned)?;
        let mut out: Vec<_> = guard
            .rows
            .iter()
            .filter(|a| a.topic_id == topic_id)
            .cloned()
            .collect();
        out.sort_by_key(|a| (a.finished_at, a.id));
        Ok(out)
    }

    async fn list_attempts_for_enrollment(
        &self,
        topic_id: TopicId,
        enrollment_id: EnrollmentId,
    ) -> Result<Vec<Attempt>, StorageError> {
        let guard = self.attempts.lock().map_err(poisoned)?;
        let mut out: Vec<_> = guard
            .rows
            .iter()
            .filter(|a| a.topic_id == topic_id && a.enrollment_id == enrollment_id)
            .cloned()
            .collect();
        out.sort_by_key(|a| a.attempt_number);
        Ok(out)
    }
}

#[async_trait]
impl SessionStore for InMemoryRepository {
    async fn load_session(&self, key: SessionKey) -> Result<Option<QuizSession>, StorageError> {
        let guard = self.sessions.lock().map_err(poisoned)?;
        Ok(guard.get(&key).cloned())
    }

    async fn save_session(&self, session: &QuizSession) -> Result<(), StorageError> {
        let mut guard = self.sessions.lock().map_err(poisoned)?;
        guard.insert(session.key(), session.clone());
        Ok(())
    }

    async fn clear_session(&self, key: SessionKey) -> Result<(), StorageError> {
        let mut guard = self.sessions.lock().map_err(poisoned)?;
        guard.remove(&key);
        Ok(())
    }
}

/// Aggregates repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub topics: Arc<dyn TopicRepository>,
    pub enrollments: Arc<dyn EnrollmentRepository>,
    pub attempts: Arc<dyn AttemptRepository>,
    pub sessions: Arc<dyn SessionStore>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let repo = InMemoryRepository::new();
        Self {
            topics: Arc::new(repo.clone()),
            enrollments: Arc::new(repo.clone()),
            attempts: Arc::new(repo.clone()),
            sessions: Arc::new(repo),
        }
    }
}
