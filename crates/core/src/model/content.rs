use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

use crate::model::ids::QuestionId;

/// Minimum number of options a single-choice question must offer.
pub const MIN_OPTIONS: usize = 2;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

/// Raised when a topic's stored content cannot be turned into a quiz.
///
/// This is a configuration problem of the topic and is reported to instructors,
/// never to learners.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ContentError {
    #[error("content is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("content has no questions")]
    NoQuestions,

    #[error("question at position {position} has an empty id")]
    EmptyQuestionId { position: usize },

    #[error("duplicate question id: {0}")]
    DuplicateQuestionId(QuestionId),

    #[error("question {question} has {count} options; at least 2 are required")]
    TooFewOptions { question: QuestionId, count: usize },

    #[error("question {question} marks option {index} as correct but has {options} options")]
    CorrectAnswerOutOfRange {
        question: QuestionId,
        index: i64,
        options: usize,
    },
}

//
// ─── QUESTION ──────────────────────────────────────────────────────────────────
//

/// A single-choice question in canonical (stored) option order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    id: QuestionId,
    text: String,
    options: Vec<String>,
    correct_answer_index: usize,
}

impl Question {
    /// Build a validated question.
    ///
    /// # Errors
    ///
    /// Returns `ContentError::TooFewOptions` with fewer than two options and
    /// `ContentError::CorrectAnswerOutOfRange` if the correct index does not
    /// point into `options`.
    pub fn new(
        id: QuestionId,
        text: impl Into<String>,
        options: Vec<String>,
        correct_answer_index: usize,
    ) -> Result<Self, ContentError> {
        if options.len() < MIN_OPTIONS {
            return Err(ContentError::TooFewOptions {
                question: id,
                count: options.len(),
            });
        }
        if correct_answer_index >= options.len() {
            return Err(ContentError::CorrectAnswerOutOfRange {
                question: id,
                index: i64::try_from(correct_answer_index).unwrap_or(i64::MAX),
                options: options.len(),
            });
        }
        Ok(Self {
            id,
            text: text.into(),
            options,
            correct_answer_index,
        })
    }

    #[must_use]
    pub fn id(&self) -> &QuestionId {
        &self.id
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn options(&self) -> &[String] {
        &self.options
    }

    #[must_use]
    pub fn option_count(&self) -> usize {
        self.options.len()
    }

    #[must_use]
    pub fn correct_answer_index(&self) -> usize {
        self.correct_answer_index
    }

    /// Returns true if `original_index` (canonical option order) is the correct option.
    #[must_use]
    pub fn is_correct(&self, original_index: usize) -> bool {
        original_index == self.correct_answer_index
    }
}

//
// ─── TOPIC CONTENT ─────────────────────────────────────────────────────────────
//

/// Normalized, immutable content of a topic: optional reading passage plus
/// questions in canonical order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicContent {
    reading: Option<String>,
    questions: Vec<Question>,
}

impl TopicContent {
    /// Build content from already validated questions, kept in the given order.
    ///
    /// # Errors
    ///
    /// Returns `ContentError::NoQuestions` for an empty list and
    /// `ContentError::DuplicateQuestionId` if two questions share an id.
    pub fn new(reading: Option<String>, questions: Vec<Question>) -> Result<Self, ContentError> {
        if questions.is_empty() {
            return Err(ContentError::NoQuestions);
        }
        let mut seen = HashSet::with_capacity(questions.len());
        for (position, question) in questions.iter().enumerate() {
            if question.id.as_str().trim().is_empty() {
                return Err(ContentError::EmptyQuestionId { position });
            }
            if !seen.insert(question.id.clone()) {
                return Err(ContentError::DuplicateQuestionId(question.id.clone()));
            }
        }
        Ok(Self {
            reading: reading.filter(|r| !r.trim().is_empty()),
            questions,
        })
    }

    /// Parse a topic's stored content blob.
    ///
    /// Questions are stably sorted by their optional `order` field; questions
    /// sharing an order, or without one, keep their stored position.
    ///
    /// # Errors
    ///
    /// Returns `ContentError` if the blob is not JSON, has no questions, or any
    /// question violates the option invariants.
    pub fn parse(raw: &str) -> Result<Self, ContentError> {
        let raw: RawContent =
            serde_json::from_str(raw).map_err(|e| ContentError::InvalidJson(e.to_string()))?;

        let mut raw_questions = raw.questions.unwrap_or_default();
        if raw_questions.is_empty() {
            return Err(ContentError::NoQuestions);
        }
        // `sort_by_key` is stable, so equal keys keep creation order.
        raw_questions.sort_by_key(|q| q.order.unwrap_or(i64::MAX));

        let mut questions = Vec::with_capacity(raw_questions.len());
        for (position, rq) in raw_questions.into_iter().enumerate() {
            let id = rq.id.into_question_id();
            if id.as_str().trim().is_empty() {
                return Err(ContentError::EmptyQuestionId { position });
            }
            let correct = usize::try_from(rq.correct_answer_index).map_err(|_| {
                ContentError::CorrectAnswerOutOfRange {
                    question: id.clone(),
                    index: rq.correct_answer_index,
                    options: rq.options.len(),
                }
            })?;
            questions.push(Question::new(id, rq.text, rq.options, correct)?);
        }

        Self::new(raw.reading, questions)
    }

    /// Serialize back into the stored blob format, with `order` set to the
    /// canonical position.
    #[must_use]
    pub fn to_raw_json(&self) -> String {
        let stored = StoredContent {
            reading: self.reading.as_deref(),
            questions: self
                .questions
                .iter()
                .enumerate()
                .map(|(i, q)| StoredQuestion {
                    id: q.id.as_str(),
                    text: &q.text,
                    options: &q.options,
                    correct_answer_index: q.correct_answer_index,
                    order: i,
                })
                .collect(),
        };
        // Serializing plain strings and integers cannot fail.
        serde_json::to_string(&stored).unwrap_or_default()
    }

    #[must_use]
    pub fn reading(&self) -> Option<&str> {
        self.reading.as_deref()
    }

    #[must_use]
    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    /// Number of questions in this topic.
    #[must_use]
    pub fn len(&self) -> usize {
        self.questions.len()
    }

    /// Always false for parsed content; present for API symmetry with `len`.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    #[must_use]
    pub fn question(&self, id: &QuestionId) -> Option<&Question> {
        self.questions.iter().find(|q| &q.id == id)
    }

    /// Canonical position of the question with the given id.
    #[must_use]
    pub fn position_of(&self, id: &QuestionId) -> Option<usize> {
        self.questions.iter().position(|q| &q.id == id)
    }
}

//
// ─── STORED FORMAT ─────────────────────────────────────────────────────────────
//

#[derive(Deserialize)]
struct RawContent {
    #[serde(default)]
    reading: Option<String>,
    #[serde(default)]
    questions: Option<Vec<RawQuestion>>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawQuestionId {
    Text(String),
    Number(i64),
}

impl RawQuestionId {
    fn into_question_id(self) -> QuestionId {
        match self {
            RawQuestionId::Text(s) => QuestionId::new(s.trim()),
            RawQuestionId::Number(n) => QuestionId::new(n.to_string()),
        }
    }
}

#[derive(Deserialize)]
struct RawQuestion {
    id: RawQuestionId,
    text: String,
    options: Vec<String>,
    correct_answer_index: i64,
    #[serde(default)]
    order: Option<i64>,
}

#[derive(Serialize)]
struct StoredContent<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    reading: Option<&'a str>,
    questions: Vec<StoredQuestion<'a>>,
}

#[derive(Serialize)]
struct StoredQuestion<'a> {
    id: &'a str,
    text: &'a str,
    options: &'a [String],
    correct_answer_index: usize,
    order: usize,
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "reading": "A short passage.",
        "questions": [
            {"id": "b", "text": "Second", "options": ["x", "y"], "correct_answer_index": 1, "order": 2},
            {"id": "a", "text": "First", "options": ["x", "y", "z"], "correct_answer_index": 0, "order": 1},
            {"id": 7, "text": "Last", "options": ["p", "q"], "correct_answer_index": 0}
        ]
    }"#;

    #[test]
    fn parse_sorts_by_order_and_keeps_reading() {
        let content = TopicContent::parse(SAMPLE).unwrap();
        let ids: Vec<_> = content.questions().iter().map(|q| q.id().as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "7"]);
        assert_eq!(content.reading(), Some("A short passage."));
        assert_eq!(content.len(), 3);
    }

    #[test]
    fn equal_order_keeps_creation_order() {
        let raw = r#"{"questions": [
            {"id": "q2", "text": "t", "options": ["a", "b"], "correct_answer_index": 0, "order": 1},
            {"id": "q1", "text": "t", "options": ["a", "b"], "correct_answer_index": 0, "order": 1}
        ]}"#;
        let content = TopicContent::parse(raw).unwrap();
        assert_eq!(content.questions()[0].id().as_str(), "q2");
        assert_eq!(content.questions()[1].id().as_str(), "q1");
    }

    #[test]
    fn missing_or_empty_questions_fail() {
        assert_eq!(
            TopicContent::parse(r#"{"reading": "x"}"#).unwrap_err(),
            ContentError::NoQuestions
        );
        assert_eq!(
            TopicContent::parse(r#"{"questions": []}"#).unwrap_err(),
            ContentError::NoQuestions
        );
    }

    #[test]
    fn invalid_json_fails() {
        let err = TopicContent::parse("not json").unwrap_err();
        assert!(matches!(err, ContentError::InvalidJson(_)));
    }

    #[test]
    fn single_option_question_fails() {
        let raw = r#"{"questions": [{"id": "q", "text": "t", "options": ["only"], "correct_answer_index": 0}]}"#;
        let err = TopicContent::parse(raw).unwrap_err();
        assert!(matches!(err, ContentError::TooFewOptions { count: 1, .. }));
    }

    #[test]
    fn out_of_range_correct_index_fails() {
        let raw = r#"{"questions": [{"id": "q", "text": "t", "options": ["a", "b"], "correct_answer_index": 2}]}"#;
        let err = TopicContent::parse(raw).unwrap_err();
        assert!(matches!(
            err,
            ContentError::CorrectAnswerOutOfRange { index: 2, options: 2, .. }
        ));

        let raw = r#"{"questions": [{"id": "q", "text": "t", "options": ["a", "b"], "correct_answer_index": -1}]}"#;
        let err = TopicContent::parse(raw).unwrap_err();
        assert!(matches!(
            err,
            ContentError::CorrectAnswerOutOfRange { index: -1, .. }
        ));
    }

    #[test]
    fn duplicate_ids_fail() {
        let raw = r#"{"questions": [
            {"id": "q", "text": "t", "options": ["a", "b"], "correct_answer_index": 0},
            {"id": "q", "text": "t", "options": ["a", "b"], "correct_answer_index": 1}
        ]}"#;
        let err = TopicContent::parse(raw).unwrap_err();
        assert_eq!(err, ContentError::DuplicateQuestionId(QuestionId::new("q")));
    }

    #[test]
    fn blank_id_fails() {
        let raw = r#"{"questions": [{"id": "  ", "text": "t", "options": ["a", "b"], "correct_answer_index": 0}]}"#;
        let err = TopicContent::parse(raw).unwrap_err();
        assert_eq!(err, ContentError::EmptyQuestionId { position: 0 });
    }

    #[test]
    fn raw_json_reparses_to_same_content() {
        let content = TopicContent::parse(SAMPLE).unwrap();
        let reparsed = TopicContent::parse(&content.to_raw_json()).unwrap();
        assert_eq!(content, reparsed);
    }
}
