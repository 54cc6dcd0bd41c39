use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::model::ids::{AttemptId, EnrollmentId, QuestionId, StudentId, TopicId};

//
// ─── SELECTION ─────────────────────────────────────────────────────────────────
//

/// A learner's answer to one question.
///
/// `selected_index` always refers to the canonical (unshuffled) option order.
/// `raw_value` is the option text the learner saw when selecting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub selected_index: usize,
    pub raw_value: String,
}

impl Selection {
    pub fn new(selected_index: usize, raw_value: impl Into<String>) -> Self {
        Self {
            selected_index,
            raw_value: raw_value.into(),
        }
    }
}

/// Answers keyed by question id; ordered so serialized payloads are stable.
pub type AnswerMap = BTreeMap<QuestionId, Selection>;

//
// ─── STATUS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid attempt status: {0}")]
pub struct AttemptStatusError(pub String);

/// Lifecycle status of a persisted attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    InProgress,
    Completed,
    Abandoned,
    Expired,
}

impl AttemptStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            AttemptStatus::InProgress => "in_progress",
            AttemptStatus::Completed => "completed",
            AttemptStatus::Abandoned => "abandoned",
            AttemptStatus::Expired => "expired",
        }
    }
}

impl fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttemptStatus {
    type Err = AttemptStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in_progress" => Ok(AttemptStatus::InProgress),
            "completed" => Ok(AttemptStatus::Completed),
            "abandoned" => Ok(AttemptStatus::Abandoned),
            "expired" => Ok(AttemptStatus::Expired),
            other => Err(AttemptStatusError(other.to_string())),
        }
    }
}

//
// ─── ATTEMPT ───────────────────────────────────────────────────────────────────
//

/// A scored attempt that has not been assigned a storage id yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAttempt {
    pub topic_id: TopicId,
    pub enrollment_id: EnrollmentId,
    pub student_id: StudentId,
    pub attempt_number: u32,
    /// Seed of the session that produced this attempt. At most one attempt
    /// exists per session; `None` for attempts recorded outside a session.
    pub session_seed: Option<u64>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub time_used_seconds: u32,
    pub answers: AnswerMap,
    pub raw_score: u32,
    pub total_questions: u32,
    pub percentage: u8,
    pub status: AttemptStatus,
}

impl NewAttempt {
    #[must_use]
    pub fn assign_id(self, id: AttemptId) -> Attempt {
        Attempt {
            id,
            topic_id: self.topic_id,
            enrollment_id: self.enrollment_id,
            student_id: self.student_id,
            attempt_number: self.attempt_number,
            session_seed: self.session_seed,
            started_at: self.started_at,
            finished_at: self.finished_at,
            time_used_seconds: self.time_used_seconds,
            answers: self.answers,
            raw_score: self.raw_score,
            total_questions: self.total_questions,
            percentage: self.percentage,
            status: self.status,
        }
    }
}

/// One finished submission of a topic by one enrolled student.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempt {
    pub id: AttemptId,
    pub topic_id: TopicId,
    pub enrollment_id: EnrollmentId,
    pub student_id: StudentId,
    pub attempt_number: u32,
    pub session_seed: Option<u64>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub time_used_seconds: u32,
    pub answers: AnswerMap,
    pub raw_score: u32,
    pub total_questions: u32,
    pub percentage: u8,
    pub status: AttemptStatus,
}

impl Attempt {
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.status == AttemptStatus::Completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_string_mapping_round_trips() {
        for status in [
            AttemptStatus::InProgress,
            AttemptStatus::Completed,
            AttemptStatus::Abandoned,
            AttemptStatus::Expired,
        ] {
            assert_eq!(status.as_str().parse::<AttemptStatus>().unwrap(), status);
        }
        assert!("done".parse::<AttemptStatus>().is_err());
    }

    #[test]
    fn answers_serialize_as_object_keyed_by_question() {
        let mut answers = AnswerMap::new();
        answers.insert(QuestionId::new("q1"), Selection::new(2, "Paris"));
        let json = serde_json::to_string(&answers).unwrap();
        assert_eq!(json, r#"{"q1":{"selected_index":2,"raw_value":"Paris"}}"#);
    }
}
