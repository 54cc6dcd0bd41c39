use std::sync::Arc;

use storage::repository::Storage;

use crate::Clock;
use crate::error::AppServicesError;
use crate::reports::ReportService;
use crate::sessions::SessionLoopService;
use crate::submission::SubmissionService;

/// Assembles the assessment services over one storage backend.
#[derive(Clone)]
pub struct AssessmentServices {
    storage: Storage,
    session_loop: Arc<SessionLoopService>,
    submissions: Arc<SubmissionService>,
    reports: Arc<ReportService>,
}

impl AssessmentServices {
    /// Build services backed by `SQLite` storage.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if storage initialization fails.
    pub async fn new_sqlite(db_url: &str, clock: Clock) -> Result<Self, AppServicesError> {
        let storage = Storage::sqlite(db_url).await?;
        Ok(Self::from_storage(storage, clock))
    }

    /// Build services over in-memory repositories.
    #[must_use]
    pub fn in_memory(clock: Clock) -> Self {
        Self::from_storage(Storage::in_memory(), clock)
    }

    #[must_use]
    pub fn from_storage(storage: Storage, clock: Clock) -> Self {
        let session_loop = Arc::new(SessionLoopService::new(
            clock,
            Arc::clone(&storage.topics),
            Arc::clone(&storage.enrollments),
            Arc::clone(&storage.attempts),
            Arc::clone(&storage.sessions),
        ));
        let submissions = Arc::new(SubmissionService::new(
            clock,
            Arc::clone(&storage.topics),
            Arc::clone(&storage.enrollments),
            Arc::clone(&storage.attempts),
        ));
        let reports = Arc::new(ReportService::new(
            Arc::clone(&storage.topics),
            Arc::clone(&storage.attempts),
        ));

        Self {
            storage,
            session_loop,
            submissions,
            reports,
        }
    }

    #[must_use]
    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    #[must_use]
    pub fn session_loop(&self) -> Arc<SessionLoopService> {
        Arc::clone(&self.session_loop)
    }

    #[must_use]
    pub fn submissions(&self) -> Arc<SubmissionService> {
        Arc::clone(&self.submissions)
    }

    #[must_use]
    pub fn reports(&self) -> Arc<ReportService> {
        Arc::clone(&self.reports)
    }
}
