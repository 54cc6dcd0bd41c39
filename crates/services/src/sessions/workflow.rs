use std::sync::Arc;

use quiz_core::model::{
    Attempt, CourseId, EnrollmentId, QuestionId, StudentId, TopicContent, TopicId,
};
use quiz_core::session::{QuizSession, SessionKey, SessionStateError};
use storage::repository::{
    AttemptRepository, Enrollment, EnrollmentRepository, SessionStore, StorageError,
    TopicRepository,
};

use super::active::ActiveSession;
use crate::Clock;
use crate::error::{SessionError, SubmissionError};
use crate::submission::SubmissionService;

/// Result of asking to submit a session.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// The session is completed and points at this attempt.
    Completed(Attempt),
    /// A submission for this session is already in flight; nothing was done.
    InFlight,
}

/// Orchestrates session start/resume, persisted mutations and submission.
#[derive(Clone)]
pub struct SessionLoopService {
    clock: Clock,
    topics: Arc<dyn TopicRepository>,
    enrollments: Arc<dyn EnrollmentRepository>,
    attempts: Arc<dyn AttemptRepository>,
    sessions: Arc<dyn SessionStore>,
    submissions: SubmissionService,
}

impl SessionLoopService {
    #[must_use]
    pub fn new(
        clock: Clock,
        topics: Arc<dyn TopicRepository>,
        enrollments: Arc<dyn EnrollmentRepository>,
        attempts: Arc<dyn AttemptRepository>,
        sessions: Arc<dyn SessionStore>,
    ) -> Self {
        let submissions = SubmissionService::new(
            clock,
            Arc::clone(&topics),
            Arc::clone(&enrollments),
            Arc::clone(&attempts),
        );
        Self {
            clock,
            topics,
            enrollments,
            attempts,
            sessions,
            submissions,
        }
    }

    /// Open the learner's session for a topic, resuming the persisted one if any.
    ///
    /// Calling this again for the same enrollment and topic returns the same
    /// session. A session persisted mid-submit comes back `InProgress`.
    ///
    /// # Errors
    ///
    /// Returns `SessionError` if the topic or enrollment is missing, the
    /// enrollment is for another course, the content is malformed, or storage
    /// fails.
    pub async fn start_or_resume(
        &self,
        topic_id: TopicId,
        enrollment_id: EnrollmentId,
    ) -> Result<ActiveSession, SessionError> {
        let enrollment = self
            .enrollments
            .get_enrollment(enrollment_id)
            .await?
            .ok_or(SessionError::EnrollmentNotFound(enrollment_id))?;
        self.open(topic_id, enrollment).await
    }

    /// Resolve the student's enrollment in `course_id`, then start or resume.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NotEnrolled` when the student has no enrollment
    /// in the course, plus everything `start_or_resume` returns.
    pub async fn start_for_student(
        &self,
        student_id: StudentId,
        course_id: CourseId,
        topic_id: TopicId,
    ) -> Result<ActiveSession, SessionError> {
        let enrollment = self
            .enrollments
            .resolve_enrollment(student_id, course_id)
            .await?
            .ok_or(SessionError::NotEnrolled {
                student_id,
                course_id,
            })?;
        self.open(topic_id, enrollment).await
    }

    async fn open(
        &self,
        topic_id: TopicId,
        enrollment: Enrollment,
    ) -> Result<ActiveSession, SessionError> {
        let topic = self
            .topics
            .get_topic(topic_id)
            .await?
            .ok_or(SessionError::TopicNotFound(topic_id))?;
        if topic.course_id != enrollment.course_id {
            return Err(SessionError::TopicNotInCourse {
                topic_id,
                course_id: enrollment.course_id,
            });
        }
        let content = TopicContent::parse(&topic.content).inspect_err(|e| {
            tracing::error!(topic_id = %topic_id, error = %e, "topic content is malformed");
        })?;
        let config = topic.config;
        let key = SessionKey::new(enrollment.id, topic_id);

        if let Some(mut session) = self.sessions.load_session(key).await? {
            if session.presentation().fits(&content) {
                if session.recover_interrupted_submit() {
                    tracing::warn!(
                        topic_id = %topic_id,
                        enrollment_id = %enrollment.id,
                        "recovered session interrupted mid-submit"
                    );
                    self.sessions.save_session(&session).await?;
                }
                tracing::debug!(
                    topic_id = %topic_id,
                    enrollment_id = %enrollment.id,
                    "session resumed"
                );
                return Ok(ActiveSession {
                    session,
                    content,
                    config,
                    resumed: true,
                });
            }
            tracing::warn!(
                topic_id = %topic_id,
                enrollment_id = %enrollment.id,
                "persisted session no longer matches topic content; starting over"
            );
        }

        let session = QuizSession::new(
            topic_id,
            enrollment.id,
            enrollment.student_id,
            &content,
            &config,
            rand::random(),
        );
        self.sessions.save_session(&session).await?;
        tracing::info!(
            topic_id = %topic_id,
            enrollment_id = %enrollment.id,
            questions = content.len(),
            "session started"
        );

        Ok(ActiveSession {
            session,
            content,
            config,
            resumed: false,
        })
    }

    /// Record the option at `displayed_index` for `question_id` and persist.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::State` for rejected transitions, unknown questions
    /// or out-of-range positions; `Storage` if the session cannot be saved.
    pub async fn select_answer(
        &self,
        active: &mut ActiveSession,
        question_id: &QuestionId,
        displayed_index: usize,
    ) -> Result<(), SessionError> {
        let raw_value = displayed_text(active, question_id, displayed_index).unwrap_or_default();
        active.session.select_answer(
            &active.content,
            question_id,
            displayed_index,
            raw_value,
            self.clock.now(),
        )?;
        self.sessions.save_session(&active.session).await?;
        Ok(())
    }

    /// Move to the next question. Returns false at the end.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Storage` if the moved cursor cannot be saved.
    pub async fn advance(&self, active: &mut ActiveSession) -> Result<bool, SessionError> {
        let moved = active.session.advance();
        if moved {
            self.sessions.save_session(&active.session).await?;
        }
        Ok(moved)
    }

    /// Move to the previous question. Returns false at the start.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Storage` if the moved cursor cannot be saved.
    pub async fn retreat(&self, active: &mut ActiveSession) -> Result<bool, SessionError> {
        let moved = active.session.retreat();
        if moved {
            self.sessions.save_session(&active.session).await?;
        }
        Ok(moved)
    }

    /// Submit the session for scoring.
    ///
    /// If the stored session is already completed, this session already
    /// recorded an attempt (for example when saving the completed state
    /// failed), or a concurrent submit wins the attempt number, the existing
    /// attempt is returned and this session completes with it. Any other
    /// failure puts the session back `InProgress` with its answers intact.
    ///
    /// # Errors
    ///
    /// Returns `SubmissionError` for rejected transitions, exhausted attempts,
    /// malformed state and storage failures.
    pub async fn submit(
        &self,
        active: &mut ActiveSession,
    ) -> Result<SubmitOutcome, SubmissionError> {
        if let Some(attempt) = self.adopt_completed(active).await? {
            return Ok(SubmitOutcome::Completed(attempt));
        }
        let Some(snapshot) = active.session.begin_submit()? else {
            tracing::debug!("submit ignored; submission already in flight");
            return Ok(SubmitOutcome::InFlight);
        };
        if let Err(e) = self.sessions.save_session(&active.session).await {
            active.session.fail_submit()?;
            return Err(e.into());
        }

        let result = match self
            .submissions
            .submit(&snapshot, &active.content, &active.config)
            .await
        {
            Err(SubmissionError::DuplicateAttempt { attempt_number }) => self
                .attempts
                .find_attempt(snapshot.topic_id, snapshot.enrollment_id, attempt_number)
                .await
                .map_err(SubmissionError::from)
                .and_then(|found| {
                    found.ok_or(SubmissionError::DuplicateAttempt { attempt_number })
                }),
            other => other,
        };

        match result {
            Ok(attempt) => {
                active.session.complete(attempt.id)?;
                if let Err(e) = self.sessions.save_session(&active.session).await {
                    tracing::warn!(
                        attempt_id = %attempt.id,
                        error = %e,
                        "attempt recorded but completed session was not saved"
                    );
                }
                Ok(SubmitOutcome::Completed(attempt))
            }
            Err(err) => {
                active.session.fail_submit()?;
                if let Err(e) = self.sessions.save_session(&active.session).await {
                    tracing::warn!(error = %e, "could not save session after failed submit");
                }
                tracing::warn!(
                    topic_id = %snapshot.topic_id,
                    enrollment_id = %snapshot.enrollment_id,
                    error = %err,
                    retryable = err.is_retryable(),
                    "submission failed; session back in progress"
                );
                Err(err)
            }
        }
    }

    /// A stale copy of a session that another caller already completed takes
    /// over the stored completion instead of recording a second attempt.
    async fn adopt_completed(
        &self,
        active: &mut ActiveSession,
    ) -> Result<Option<Attempt>, SubmissionError> {
        if active.session.is_completed() {
            return Ok(None);
        }
        let Some(stored) = self.sessions.load_session(active.session.key()).await? else {
            return Ok(None);
        };
        let Some(attempt_id) = stored.completed_attempt() else {
            return Ok(None);
        };
        let attempt = self
            .attempts
            .get_attempt(attempt_id)
            .await?
            .ok_or(StorageError::NotFound)?;
        tracing::info!(attempt_id = %attempt_id, "submit resolved to already completed attempt");
        active.session = stored;
        Ok(Some(attempt))
    }

    /// Discard the session and start a fresh one with a new presentation order.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NoAttemptsLeft` when the attempt limit is used
    /// up and `State` while a submission is in flight.
    pub async fn retry(&self, active: &mut ActiveSession) -> Result<(), SessionError> {
        if active.session.is_submitting() {
            return Err(SessionStateError::Submitting.into());
        }
        let key = active.session.key();
        if let Some(max_attempts) = active.config.max_attempts() {
            let used = self
                .attempts
                .count_attempts(key.topic_id, key.enrollment_id)
                .await?;
            if used >= max_attempts {
                return Err(SessionError::NoAttemptsLeft { max_attempts });
            }
        }

        self.sessions.clear_session(key).await?;
        active
            .session
            .restart(&active.content, &active.config, rand::random());
        active.resumed = false;
        self.sessions.save_session(&active.session).await?;
        tracing::info!(
            topic_id = %key.topic_id,
            enrollment_id = %key.enrollment_id,
            "session restarted"
        );
        Ok(())
    }

    /// Abandon the session if its time limit has run out. Returns true if it did.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Storage` if the abandoned session cannot be saved.
    pub async fn expire(&self, active: &mut ActiveSession) -> Result<bool, SessionError> {
        if !active.session.is_expired(&active.config, self.clock.now()) {
            return Ok(false);
        }
        active.session.abandon()?;
        self.sessions.save_session(&active.session).await?;
        let key = active.session.key();
        tracing::info!(
            topic_id = %key.topic_id,
            enrollment_id = %key.enrollment_id,
            "session expired"
        );
        Ok(true)
    }

    /// Time left on the session's limit, measured on the service clock.
    #[must_use]
    pub fn time_left(&self, active: &ActiveSession) -> Option<chrono::Duration> {
        active.session.time_left(&active.config, self.clock.now())
    }

    #[must_use]
    pub fn submissions(&self) -> &SubmissionService {
        &self.submissions
    }
}

/// Option text shown at `displayed_index`, recorded alongside the index.
fn displayed_text(
    active: &ActiveSession,
    question_id: &QuestionId,
    displayed_index: usize,
) -> Option<String> {
    let canonical = active.content.position_of(question_id)?;
    let original = active
        .session
        .presentation()
        .original_option(canonical, displayed_index)?;
    active
        .content
        .question(question_id)?
        .options()
        .get(original)
        .cloned()
}

