use std::sync::Arc;

use quiz_core::model::{Attempt, AttemptId, EnrollmentId, TopicId};
use quiz_core::stats::{OverallStats, StudentTopicStats, aggregate_by_student, aggregate_overall};
use storage::repository::{AttemptRepository, TopicRecord, TopicRepository};

use crate::error::ReportError;

/// Everything an instructor report shows for one topic.
#[derive(Debug, Clone, PartialEq)]
pub struct TopicReport {
    pub topic_id: TopicId,
    pub title: String,
    pub pass_threshold: u8,
    pub overall: OverallStats,
    pub students: Vec<StudentTopicStats>,
}

/// Read-only reporting over recorded attempts.
///
/// Statistics are recomputed from the attempt list on each call.
#[derive(Clone)]
pub struct ReportService {
    topics: Arc<dyn TopicRepository>,
    attempts: Arc<dyn AttemptRepository>,
}

impl ReportService {
    #[must_use]
    pub fn new(topics: Arc<dyn TopicRepository>, attempts: Arc<dyn AttemptRepository>) -> Self {
        Self { topics, attempts }
    }

    /// Per-student statistics for a topic, ordered by student id.
    ///
    /// # Errors
    ///
    /// Returns `ReportError::TopicNotFound` for unknown topics and `Storage`
    /// for backend failures.
    pub async fn student_stats(
        &self,
        topic_id: TopicId,
    ) -> Result<Vec<StudentTopicStats>, ReportError> {
        let (topic, attempts) = self.load(topic_id).await?;
        Ok(aggregate_by_student(&attempts, topic.config.pass_threshold()))
    }

    /// Topic-wide statistics. A topic with no attempts yields zeroes.
    ///
    /// # Errors
    ///
    /// Returns `ReportError::TopicNotFound` for unknown topics and `Storage`
    /// for backend failures.
    pub async fn overall_stats(&self, topic_id: TopicId) -> Result<OverallStats, ReportError> {
        let (topic, attempts) = self.load(topic_id).await?;
        Ok(aggregate_overall(&attempts, topic.config.pass_threshold()))
    }

    /// Overall and per-student statistics from a single attempt listing.
    ///
    /// # Errors
    ///
    /// Returns `ReportError::TopicNotFound` for unknown topics and `Storage`
    /// for backend failures.
    pub async fn topic_report(&self, topic_id: TopicId) -> Result<TopicReport, ReportError> {
        let (topic, attempts) = self.load(topic_id).await?;
        let threshold = topic.config.pass_threshold();
        tracing::debug!(topic_id = %topic_id, attempts = attempts.len(), "building topic report");
        Ok(TopicReport {
            topic_id,
            title: topic.title,
            pass_threshold: threshold,
            overall: aggregate_overall(&attempts, threshold),
            students: aggregate_by_student(&attempts, threshold),
        })
    }

    /// Attempts of one enrollment on a topic, by attempt number.
    ///
    /// # Errors
    ///
    /// Returns `ReportError::Storage` for backend failures.
    pub async fn attempt_history(
        &self,
        topic_id: TopicId,
        enrollment_id: EnrollmentId,
    ) -> Result<Vec<Attempt>, ReportError> {
        Ok(self
            .attempts
            .list_attempts_for_enrollment(topic_id, enrollment_id)
            .await?)
    }

    /// # Errors
    ///
    /// Returns `ReportError::AttemptNotFound` if no attempt has this id.
    pub async fn get_attempt(&self, id: AttemptId) -> Result<Attempt, ReportError> {
        self.attempts
            .get_attempt(id)
            .await?
            .ok_or(ReportError::AttemptNotFound(id))
    }

    async fn load(&self, topic_id: TopicId) -> Result<(TopicRecord, Vec<Attempt>), ReportError> {
        let topic = self
            .topics
            .get_topic(topic_id)
            .await?
            .ok_or(ReportError::TopicNotFound(topic_id))?;
        let attempts = self.attempts.list_attempts(topic_id).await?;
        Ok((topic, attempts))
    }
}
