//! Resumable quiz-taking session.
//!
//! `QuizSession` is a plain state machine. It never performs I/O; callers
//! persist it after each mutation through a session store.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{
    AnswerMap, AttemptConfig, AttemptId, EnrollmentId, QuestionId, Selection, StudentId,
    TopicContent, TopicId,
};
use crate::presentation::{PresentationOrder, PresentedQuestion, derive_presentation};
use crate::time::time_left;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

/// Rejected state transitions.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SessionStateError {
    #[error("session has no answers to submit")]
    NothingAnswered,

    #[error("a submission is already in flight")]
    Submitting,

    #[error("session already completed")]
    Completed,

    #[error("session was abandoned")]
    Abandoned,

    #[error("session is not submitting")]
    NotSubmitting,

    #[error("unknown question: {0}")]
    UnknownQuestion(QuestionId),

    #[error("option {index} is out of range for question {question}")]
    OptionOutOfRange { question: QuestionId, index: usize },
}

//
// ─── STATUS ────────────────────────────────────────────────────────────────────
//

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionStatus {
    /// Opened but nothing answered yet; no time is charged.
    NotStarted,
    InProgress,
    /// A submission is in flight; further submits are no-ops.
    Submitting,
    /// Submitted; only the pointer to the resulting attempt is kept.
    Completed { attempt_id: AttemptId },
    /// Expired by an external scheduler.
    Abandoned,
}

impl SessionStatus {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionStatus::Completed { .. } | SessionStatus::Abandoned)
    }
}

//
// ─── KEY / SNAPSHOT / PROGRESS ─────────────────────────────────────────────────
//

/// Scope of a persisted session: one per learner enrollment and topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey {
    pub enrollment_id: EnrollmentId,
    pub topic_id: TopicId,
}

impl SessionKey {
    #[must_use]
    pub fn new(enrollment_id: EnrollmentId, topic_id: TopicId) -> Self {
        Self {
            enrollment_id,
            topic_id,
        }
    }
}

/// What the scoring service receives when a session is submitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionSnapshot {
    pub topic_id: TopicId,
    pub enrollment_id: EnrollmentId,
    pub student_id: StudentId,
    /// Identifies the session; recorded on the attempt so a resubmit of the
    /// same session finds the attempt it already produced.
    pub session_seed: u64,
    pub started_at: Option<DateTime<Utc>>,
    pub answers: AnswerMap,
}

/// Aggregated view of session progress, useful for UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionProgress {
    pub total: usize,
    pub answered: usize,
    pub cursor: usize,
    pub status: SessionStatus,
}

//
// ─── SESSION ───────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizSession {
    topic_id: TopicId,
    enrollment_id: EnrollmentId,
    student_id: StudentId,
    seed: u64,
    presentation: PresentationOrder,
    started_at: Option<DateTime<Utc>>,
    cursor: usize,
    answers: AnswerMap,
    status: SessionStatus,
}

impl QuizSession {
    /// Open a fresh session. The presentation order is derived here, once.
    #[must_use]
    pub fn new(
        topic_id: TopicId,
        enrollment_id: EnrollmentId,
        student_id: StudentId,
        content: &TopicContent,
        config: &AttemptConfig,
        seed: u64,
    ) -> Self {
        Self {
            topic_id,
            enrollment_id,
            student_id,
            seed,
            presentation: derive_presentation(content, config, seed),
            started_at: None,
            cursor: 0,
            answers: AnswerMap::new(),
            status: SessionStatus::NotStarted,
        }
    }

    /// Discard everything and start over with a new seed (explicit retry).
    pub fn restart(&mut self, content: &TopicContent, config: &AttemptConfig, seed: u64) {
        *self = Self::new(
            self.topic_id,
            self.enrollment_id,
            self.student_id,
            content,
            config,
            seed,
        );
    }

    #[must_use]
    pub fn key(&self) -> SessionKey {
        SessionKey::new(self.enrollment_id, self.topic_id)
    }

    #[must_use]
    pub fn topic_id(&self) -> TopicId {
        self.topic_id
    }

    #[must_use]
    pub fn enrollment_id(&self) -> EnrollmentId {
        self.enrollment_id
    }

    #[must_use]
    pub fn student_id(&self) -> StudentId {
        self.student_id
    }

    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    #[must_use]
    pub fn presentation(&self) -> &PresentationOrder {
        &self.presentation
    }

    #[must_use]
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    #[must_use]
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    #[must_use]
    pub fn answers(&self) -> &AnswerMap {
        &self.answers
    }

    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.status
    }

    #[must_use]
    pub fn is_submitting(&self) -> bool {
        self.status == SessionStatus::Submitting
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        matches!(self.status, SessionStatus::Completed { .. })
    }

    /// Attempt produced by this session, once completed.
    #[must_use]
    pub fn completed_attempt(&self) -> Option<AttemptId> {
        match self.status {
            SessionStatus::Completed { attempt_id } => Some(attempt_id),
            _ => None,
        }
    }

    #[must_use]
    pub fn progress(&self) -> SessionProgress {
        SessionProgress {
            total: self.presentation.question_count(),
            answered: self.answers.len(),
            cursor: self.cursor,
            status: self.status,
        }
    }

    /// Question under the cursor, rendered in presentation order.
    #[must_use]
    pub fn current_question(&self, content: &TopicContent) -> Option<PresentedQuestion> {
        if self.status.is_terminal() {
            return None;
        }
        self.presentation.present(content, self.cursor)
    }

    /// Displayed option position of the stored answer for `question_id`.
    #[must_use]
    pub fn displayed_selection(
        &self,
        content: &TopicContent,
        question_id: &QuestionId,
    ) -> Option<usize> {
        let selection = self.answers.get(question_id)?;
        let canonical = content.position_of(question_id)?;
        self.presentation
            .displayed_option(canonical, selection.selected_index)
    }

    /// Record an answer. `displayed_index` is the position the learner clicked;
    /// it is stored as the canonical option index.
    ///
    /// The first answer moves the session to `InProgress` and stamps `started_at`.
    ///
    /// # Errors
    ///
    /// Returns `SessionStateError` while submitting or after completion, and for
    /// unknown questions or out-of-range option positions.
    pub fn select_answer(
        &mut self,
        content: &TopicContent,
        question_id: &QuestionId,
        displayed_index: usize,
        raw_value: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<(), SessionStateError> {
        self.ensure_editable()?;

        let canonical = content
            .position_of(question_id)
            .ok_or_else(|| SessionStateError::UnknownQuestion(question_id.clone()))?;
        let original = self
            .presentation
            .original_option(canonical, displayed_index)
            .ok_or_else(|| SessionStateError::OptionOutOfRange {
                question: question_id.clone(),
                index: displayed_index,
            })?;

        if self.status == SessionStatus::NotStarted {
            self.status = SessionStatus::InProgress;
            self.started_at = Some(now);
        }
        self.answers
            .insert(question_id.clone(), Selection::new(original, raw_value));
        Ok(())
    }

    /// Move the cursor forward. Returns false when nothing moved.
    pub fn advance(&mut self) -> bool {
        if self.status.is_terminal() || self.status == SessionStatus::Submitting {
            return false;
        }
        let last = self.presentation.question_count().saturating_sub(1);
        if self.cursor >= last {
            return false;
        }
        self.cursor += 1;
        true
    }

    /// Move the cursor back. Returns false when nothing moved.
    pub fn retreat(&mut self) -> bool {
        if self.status.is_terminal() || self.status == SessionStatus::Submitting {
            return false;
        }
        if self.cursor == 0 {
            return false;
        }
        self.cursor -= 1;
        true
    }

    /// Enter `Submitting` and hand out the data to score.
    ///
    /// Returns `Ok(None)` if a submission is already in flight, so double
    /// submits never produce a second snapshot.
    ///
    /// # Errors
    ///
    /// Returns `SessionStateError::NothingAnswered` before the first answer and
    /// `Completed` / `Abandoned` for terminal sessions.
    pub fn begin_submit(&mut self) -> Result<Option<SubmissionSnapshot>, SessionStateError> {
        match self.status {
            SessionStatus::Submitting => Ok(None),
            SessionStatus::NotStarted => Err(SessionStateError::NothingAnswered),
            SessionStatus::Completed { .. } => Err(SessionStateError::Completed),
            SessionStatus::Abandoned => Err(SessionStateError::Abandoned),
            SessionStatus::InProgress => {
                self.status = SessionStatus::Submitting;
                Ok(Some(SubmissionSnapshot {
                    topic_id: self.topic_id,
                    enrollment_id: self.enrollment_id,
                    student_id: self.student_id,
                    session_seed: self.seed,
                    started_at: self.started_at,
                    answers: self.answers.clone(),
                }))
            }
        }
    }

    /// Submission persisted: keep only the pointer to the attempt.
    ///
    /// # Errors
    ///
    /// Returns `SessionStateError::NotSubmitting` unless a submission is in flight.
    pub fn complete(&mut self, attempt_id: AttemptId) -> Result<(), SessionStateError> {
        if self.status != SessionStatus::Submitting {
            return Err(SessionStateError::NotSubmitting);
        }
        self.answers.clear();
        self.cursor = 0;
        self.started_at = None;
        self.status = SessionStatus::Completed { attempt_id };
        Ok(())
    }

    /// Submission failed: back to `InProgress` with cursor and answers intact.
    ///
    /// # Errors
    ///
    /// Returns `SessionStateError::NotSubmitting` unless a submission is in flight.
    pub fn fail_submit(&mut self) -> Result<(), SessionStateError> {
        if self.status != SessionStatus::Submitting {
            return Err(SessionStateError::NotSubmitting);
        }
        self.status = SessionStatus::InProgress;
        Ok(())
    }

    /// Mark the session abandoned. Only an in-progress session can expire.
    ///
    /// # Errors
    ///
    /// Returns the matching `SessionStateError` for any other state.
    pub fn abandon(&mut self) -> Result<(), SessionStateError> {
        match self.status {
            SessionStatus::InProgress => {
                self.status = SessionStatus::Abandoned;
                Ok(())
            }
            SessionStatus::NotStarted => Err(SessionStateError::NothingAnswered),
            SessionStatus::Submitting => Err(SessionStateError::Submitting),
            SessionStatus::Completed { .. } => Err(SessionStateError::Completed),
            SessionStatus::Abandoned => Err(SessionStateError::Abandoned),
        }
    }

    /// True when `config` has a time limit and it has elapsed since the first answer.
    #[must_use]
    pub fn is_expired(&self, config: &AttemptConfig, now: DateTime<Utc>) -> bool {
        self.status == SessionStatus::InProgress
            && self
                .time_left(config, now)
                .is_some_and(|left| left.is_zero())
    }

    /// Remaining time under `config`'s limit. `None` without a limit or before
    /// the first answer starts the clock.
    #[must_use]
    pub fn time_left(&self, config: &AttemptConfig, now: DateTime<Utc>) -> Option<Duration> {
        let limit = config.time_limit_secs()?;
        Some(time_left(self.started_at?, limit, now))
    }

    /// A session persisted mid-submit belongs to a process that is gone; put it
    /// back in progress so the learner can submit again. Returns true if changed.
    pub fn recover_interrupted_submit(&mut self) -> bool {
        if self.status == SessionStatus::Submitting {
            self.status = SessionStatus::InProgress;
            return true;
        }
        false
    }

    fn ensure_editable(&self) -> Result<(), SessionStateError> {
        match self.status {
            SessionStatus::NotStarted | SessionStatus::InProgress => Ok(()),
            SessionStatus::Submitting => Err(SessionStateError::Submitting),
            SessionStatus::Completed { .. } => Err(SessionStateError::Completed),
            SessionStatus::Abandoned => Err(SessionStateError::Abandoned),
        }
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
