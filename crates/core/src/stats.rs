//! Per-student and per-topic statistics derived from attempt history.
//!
//! Everything here is recomputed from the attempt list on every call; nothing
//! is cached or stored.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::model::{Attempt, AttemptId, StudentId};

/// Aggregated results of one student on one topic.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentTopicStats {
    pub student_id: StudentId,
    pub total_attempts: u32,
    pub best_attempt_id: AttemptId,
    pub best_percentage: u8,
    pub best_attempt_date: DateTime<Utc>,
    pub latest_attempt_id: AttemptId,
    pub latest_percentage: u8,
    pub latest_attempt_date: DateTime<Utc>,
    /// Mean percentage rounded half-up to 2 decimals.
    pub average_percentage: f64,
    pub passed_count: u32,
    pub failed_count: u32,
}

/// Aggregated results across every student of a topic.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct OverallStats {
    pub total_students: u32,
    pub total_attempts: u32,
    pub average_percentage: f64,
    pub max_percentage: u8,
    pub min_percentage: u8,
    pub passed_count: u32,
    pub failed_count: u32,
}

/// Group completed attempts by student, ordered by student id.
///
/// Best attempt: highest percentage, then earliest `finished_at`, then lowest
/// attempt number. Latest attempt: latest `finished_at`, then highest attempt
/// number.
#[must_use]
pub fn aggregate_by_student(attempts: &[Attempt], pass_threshold: u8) -> Vec<StudentTopicStats> {
    let mut groups: BTreeMap<StudentId, Vec<&Attempt>> = BTreeMap::new();
    for attempt in attempts.iter().filter(|a| a.is_completed()) {
        groups.entry(attempt.student_id).or_default().push(attempt);
    }

    groups
        .into_iter()
        .filter_map(|(student_id, group)| student_stats(student_id, &group, pass_threshold))
        .collect()
}

fn student_stats(
    student_id: StudentId,
    group: &[&Attempt],
    pass_threshold: u8,
) -> Option<StudentTopicStats> {
    let best = group.iter().copied().min_by(|a, b| {
        b.percentage
            .cmp(&a.percentage)
            .then(a.finished_at.cmp(&b.finished_at))
            .then(a.attempt_number.cmp(&b.attempt_number))
    })?;
    let latest = group
        .iter()
        .copied()
        .max_by_key(|a| (a.finished_at, a.attempt_number))?;

    let sum: u64 = group.iter().map(|a| u64::from(a.percentage)).sum();
    let passed = group.iter().filter(|a| a.percentage >= pass_threshold).count();

    Some(StudentTopicStats {
        student_id,
        total_attempts: count_u32(group.len()),
        best_attempt_id: best.id,
        best_percentage: best.percentage,
        best_attempt_date: best.finished_at,
        latest_attempt_id: latest.id,
        latest_percentage: latest.percentage,
        latest_attempt_date: latest.finished_at,
        average_percentage: average_2dp(sum, group.len() as u64),
        passed_count: count_u32(passed),
        failed_count: count_u32(group.len() - passed),
    })
}

/// Topic-wide statistics over completed attempts. Empty input yields zeroes.
#[must_use]
pub fn aggregate_overall(attempts: &[Attempt], pass_threshold: u8) -> OverallStats {
    let completed: Vec<&Attempt> = attempts.iter().filter(|a| a.is_completed()).collect();
    if completed.is_empty() {
        return OverallStats::default();
    }

    let mut students: Vec<StudentId> = completed.iter().map(|a| a.student_id).collect();
    students.sort_unstable();
    students.dedup();

    let sum: u64 = completed.iter().map(|a| u64::from(a.percentage)).sum();
    let passed = completed
        .iter()
        .filter(|a| a.percentage >= pass_threshold)
        .count();

    OverallStats {
        total_students: count_u32(students.len()),
        total_attempts: count_u32(completed.len()),
        average_percentage: average_2dp(sum, completed.len() as u64),
        max_percentage: completed.iter().map(|a| a.percentage).max().unwrap_or(0),
        min_percentage: completed.iter().map(|a| a.percentage).min().unwrap_or(0),
        passed_count: count_u32(passed),
        failed_count: count_u32(completed.len() - passed),
    }
}

/// `sum / count` rounded half-up to 2 decimals, computed in integer hundredths.
#[allow(clippy::cast_precision_loss)]
fn average_2dp(sum: u64, count: u64) -> f64 {
    if count == 0 {
        return 0.0;
    }
    let hundredths = (sum * 200 + count) / (2 * count);
    hundredths as f64 / 100.0
}

fn count_u32(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AnswerMap, AttemptStatus, EnrollmentId, TopicId};
    use crate::time::fixed_now;
    use chrono::Duration;

    fn attempt(id: u64, student: u64, number: u32, percentage: u8, minutes: i64) -> Attempt {
        let finished = fixed_now() + Duration::minutes(minutes);
        Attempt {
            id: AttemptId::new(id),
            topic_id: TopicId::new(1),
            enrollment_id: EnrollmentId::new(student * 10),
            student_id: StudentId::new(student),
            attempt_number: number,
            session_seed: None,
            started_at: finished - Duration::minutes(5),
            finished_at: finished,
            time_used_seconds: 300,
            answers: AnswerMap::new(),
            raw_score: u32::from(percentage) / 10,
            total_questions: 10,
            percentage,
            status: AttemptStatus::Completed,
        }
    }

    #[test]
    fn best_average_and_pass_counts() {
        let attempts = vec![
            attempt(1, 1, 1, 60, 0),
            attempt(2, 1, 2, 90, 10),
            attempt(3, 1, 3, 90, 20),
        ];
        let stats = aggregate_by_student(&attempts, 70);
        assert_eq!(stats.len(), 1);
        let s = &stats[0];
        assert_eq!(s.total_attempts, 3);
        assert_eq!(s.best_percentage, 90);
        assert_eq!(s.best_attempt_id, AttemptId::new(2));
        assert_eq!(s.best_attempt_date, fixed_now() + Duration::minutes(10));
        assert_eq!(s.latest_attempt_id, AttemptId::new(3));
        assert_eq!(s.latest_percentage, 90);
        assert!((s.average_percentage - 80.0).abs() < f64::EPSILON);
        assert_eq!(s.passed_count, 2);
        assert_eq!(s.failed_count, 1);
    }

    #[test]
    fn best_tie_prefers_earliest_finish_even_if_listed_later() {
        let attempts = vec![attempt(5, 1, 2, 80, 30), attempt(4, 1, 1, 80, 5)];
        let stats = aggregate_by_student(&attempts, 70);
        assert_eq!(stats[0].best_attempt_id, AttemptId::new(4));
        assert_eq!(stats[0].latest_attempt_id, AttemptId::new(5));
    }

    #[test]
    fn groups_are_sorted_by_student() {
        let attempts = vec![attempt(1, 3, 1, 50, 0), attempt(2, 1, 1, 70, 0)];
        let stats = aggregate_by_student(&attempts, 70);
        let ids: Vec<_> = stats.iter().map(|s| s.student_id.value()).collect();
        assert_eq!(ids, vec![1, 3]);
        assert_eq!(stats[0].passed_count, 1);
        assert_eq!(stats[1].failed_count, 1);
    }

    #[test]
    fn average_rounds_half_up() {
        assert!((average_2dp(1, 8) - 0.13).abs() < 1e-9);
        assert!((average_2dp(1, 3) - 0.33).abs() < 1e-9);
        assert!((average_2dp(2, 3) - 0.67).abs() < 1e-9);
        assert!((average_2dp(0, 0)).abs() < f64::EPSILON);
    }

    #[test]
    fn non_completed_attempts_are_ignored() {
        let mut abandoned = attempt(9, 2, 1, 100, 0);
        abandoned.status = AttemptStatus::Abandoned;
        let attempts = vec![attempt(1, 1, 1, 40, 0), abandoned];
        assert_eq!(aggregate_by_student(&attempts, 70).len(), 1);
        let overall = aggregate_overall(&attempts, 70);
        assert_eq!(overall.total_students, 1);
        assert_eq!(overall.max_percentage, 40);
    }

    #[test]
    fn overall_stats() {
        let attempts = vec![
            attempt(1, 1, 1, 60, 0),
            attempt(2, 1, 2, 90, 10),
            attempt(3, 2, 1, 75, 5),
            attempt(4, 3, 1, 33, 5),
        ];
        let overall = aggregate_overall(&attempts, 70);
        assert_eq!(overall.total_students, 3);
        assert_eq!(overall.total_attempts, 4);
        assert!((overall.average_percentage - 64.5).abs() < 1e-9);
        assert_eq!(overall.max_percentage, 90);
        assert_eq!(overall.min_percentage, 33);
        assert_eq!(overall.passed_count, 2);
        assert_eq!(overall.failed_count, 2);
    }

    #[test]
    fn empty_input_degrades_to_zero() {
        assert!(aggregate_by_student(&[], 70).is_empty());
        assert_eq!(aggregate_overall(&[], 70), OverallStats::default());
    }
}
