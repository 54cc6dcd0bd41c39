//! Deterministic scoring of single-choice attempts.
//!
//! Correctness is always evaluated against the canonical `TopicContent`, never
//! against presentation order.

use chrono::{DateTime, Utc};

use crate::model::{AnswerMap, Question, Selection, TopicContent};

/// Result of scoring an answer map against topic content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Score {
    pub raw_score: u32,
    pub total_questions: u32,
    pub percentage: u8,
}

/// Resolve a recorded selection to a canonical option index.
///
/// The recorded index is authoritative unless `raw_value` names a different
/// option that exists, which happens when options were reordered after the
/// answer was recorded. Text that matches no option is ignored.
///
/// Out-of-range indices with no matching text resolve to `None` and score as
/// unanswered.
#[must_use]
pub fn resolve_selection(question: &Question, selection: &Selection) -> Option<usize> {
    let options = question.options();
    let by_index = (selection.selected_index < options.len()).then_some(selection.selected_index);

    if selection.raw_value.is_empty() || by_index.is_some_and(|i| options[i] == selection.raw_value)
    {
        return by_index;
    }
    options
        .iter()
        .position(|text| *text == selection.raw_value)
        .or(by_index)
}

/// Score `answers` against `content`.
///
/// `percentage = floor(raw_score * 100 / total_questions)`.
#[must_use]
pub fn score(content: &TopicContent, answers: &AnswerMap) -> Score {
    let raw_score = content
        .questions()
        .iter()
        .filter(|q| {
            answers
                .get(q.id())
                .and_then(|selection| resolve_selection(q, selection))
                .is_some_and(|index| q.is_correct(index))
        })
        .count();

    let total = content.len();
    let percentage = if total == 0 { 0 } else { raw_score * 100 / total };

    Score {
        raw_score: u32::try_from(raw_score).unwrap_or(u32::MAX),
        total_questions: u32::try_from(total).unwrap_or(u32::MAX),
        percentage: u8::try_from(percentage.min(100)).unwrap_or(100),
    }
}

/// Whole seconds between start and finish, never less than 1.
///
/// A missing start (nothing was ever answered) counts as 1 second.
#[must_use]
pub fn time_used_seconds(started_at: Option<DateTime<Utc>>, finished_at: DateTime<Utc>) -> u32 {
    let Some(started_at) = started_at else {
        return 1;
    };
    let millis = finished_at.signed_duration_since(started_at).num_milliseconds();
    let secs = millis.div_euclid(1000).max(1);
    u32::try_from(secs).unwrap_or(u32::MAX)
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::QuestionId;
    use crate::time::fixed_now;
    use chrono::Duration;

    fn question(id: &str, options: &[&str], correct: usize) -> Question {
        Question::new(
            QuestionId::new(id),
            "text",
            options.iter().map(|s| (*s).to_string()).collect(),
            correct,
        )
        .unwrap()
    }

    fn answers(items: &[(&str, usize, &str)]) -> AnswerMap {
        items
            .iter()
            .map(|(id, idx, raw)| (QuestionId::new(*id), Selection::new(*idx, *raw)))
            .collect()
    }

    #[test]
    fn single_question_correct_is_hundred() {
        let content = TopicContent::new(None, vec![question("q", &["yes", "no"], 0)]).unwrap();
        let s = score(&content, &answers(&[("q", 0, "yes")]));
        assert_eq!(s.raw_score, 1);
        assert_eq!(s.percentage, 100);
    }

    #[test]
    fn single_question_wrong_is_zero() {
        let content = TopicContent::new(None, vec![question("q", &["yes", "no"], 0)]).unwrap();
        let s = score(&content, &answers(&[("q", 1, "no")]));
        assert_eq!(s.raw_score, 0);
        assert_eq!(s.percentage, 0);
    }

    #[test]
    fn percentage_is_floored() {
        let content = TopicContent::new(
            None,
            vec![
                question("a", &["1", "2"], 0),
                question("b", &["1", "2"], 0),
                question("c", &["1", "2"], 0),
            ],
        )
        .unwrap();
        let s = score(&content, &answers(&[("a", 0, "1"), ("b", 0, "1")]));
        assert_eq!(s.raw_score, 2);
        assert_eq!(s.total_questions, 3);
        assert_eq!(s.percentage, 66);
    }

    #[test]
    fn unanswered_and_unknown_questions_do_not_count() {
        let content = TopicContent::new(
            None,
            vec![question("a", &["1", "2"], 1), question("b", &["1", "2"], 1)],
        )
        .unwrap();
        let s = score(&content, &answers(&[("zzz", 1, "2")]));
        assert_eq!(s.raw_score, 0);
        assert_eq!(s.percentage, 0);
    }

    #[test]
    fn raw_value_wins_over_mismatched_index() {
        let q = question("q", &["red", "green", "blue"], 2);
        assert_eq!(resolve_selection(&q, &Selection::new(0, "blue")), Some(2));
        assert_eq!(resolve_selection(&q, &Selection::new(2, "blue")), Some(2));
        assert_eq!(resolve_selection(&q, &Selection::new(1, "")), Some(1));
        assert_eq!(resolve_selection(&q, &Selection::new(9, "")), None);
        assert_eq!(resolve_selection(&q, &Selection::new(9, "purple")), None);
    }

    #[test]
    fn unmatched_text_falls_back_to_the_index() {
        let q = question("q", &["red", "green", "blue"], 2);
        assert_eq!(resolve_selection(&q, &Selection::new(2, "Blue ")), Some(2));
        assert_eq!(resolve_selection(&q, &Selection::new(0, "purple")), Some(0));

        let content = TopicContent::new(None, vec![q]).unwrap();
        let s = score(&content, &answers(&[("q", 2, "renamed")]));
        assert_eq!(s.raw_score, 1);
        assert_eq!(s.percentage, 100);
    }

    #[test]
    fn time_floor_is_one_second() {
        let start = fixed_now();
        assert_eq!(time_used_seconds(Some(start), start), 1);
        assert_eq!(
            time_used_seconds(Some(start), start + Duration::milliseconds(999)),
            1
        );
        assert_eq!(
            time_used_seconds(Some(start), start + Duration::milliseconds(2500)),
            2
        );
        assert_eq!(time_used_seconds(Some(start), start - Duration::seconds(5)), 1);
        assert_eq!(time_used_seconds(None, start), 1);
    }
}
