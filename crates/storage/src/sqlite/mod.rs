//! `SQLite` backend for topics, enrollments, attempts and quiz sessions.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use thiserror::Error;

use crate::repository::{
    AttemptRepository, EnrollmentRepository, SessionStore, Storage, TopicRepository,
};

mod attempt_repo;
mod enrollment_repo;
mod mapping;
mod migrate;
mod session_store;
mod topic_repo;

/// One pool serving every repository trait. Attempt uniqueness is enforced by
/// the schema, so concurrent submits through clones of this handle stay safe.
#[derive(Clone)]
pub struct SqliteRepository {
    pool: SqlitePool,
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SqliteInitError {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

impl SqliteRepository {
    /// Open the quiz database at `database_url`.
    ///
    /// Foreign keys are enforced (deleting a topic or enrollment drops its
    /// attempts) and writers wait up to five seconds for a busy database.
    ///
    /// # Errors
    ///
    /// Returns `SqliteInitError` if the URL is invalid or no connection can be
    /// opened.
    pub async fn connect(database_url: &str) -> Result<Self, SqliteInitError> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(5))
            .connect_with(options)
            .await?;
        tracing::debug!(url = database_url, "quiz database opened");
        Ok(Self { pool })
    }

    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Bring the schema up to date.
    ///
    /// # Errors
    ///
    /// Returns `SqliteInitError` if a migration fails.
    pub async fn migrate(&self) -> Result<(), SqliteInitError> {
        migrate::run_migrations(&self.pool).await
    }
}

impl Storage {
    /// Open and migrate the quiz database, then hand the same pool to every
    /// repository.
    ///
    /// # Errors
    ///
    /// Returns `SqliteInitError` if the database cannot be opened or migrated.
    pub async fn sqlite(database_url: &str) -> Result<Self, SqliteInitError> {
        let repo = SqliteRepository::connect(database_url).await?;
        repo.migrate().await?;
        let repo = Arc::new(repo);
        Ok(Self {
            topics: Arc::clone(&repo) as Arc<dyn TopicRepository>,
            enrollments: Arc::clone(&repo) as Arc<dyn EnrollmentRepository>,
            attempts: Arc::clone(&repo) as Arc<dyn AttemptRepository>,
            sessions: repo as Arc<dyn SessionStore>,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repository_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SqliteRepository>();
    }

    #[tokio::test]
    async fn foreign_keys_are_enforced() {
        let repo = SqliteRepository::connect("sqlite:file:memdb_fk_pragma?mode=memory&cache=shared")
            .await
            .unwrap();
        let row: (i64,) = sqlx::query_as("PRAGMA foreign_keys")
            .fetch_one(repo.pool())
            .await
            .unwrap();
        assert_eq!(row.0, 1);
    }
}
