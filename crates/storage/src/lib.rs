#![forbid(unsafe_code)]

pub mod repository;
pub mod sqlite;

pub use repository::{
    AttemptRepository, Enrollment, EnrollmentRepository, InMemoryRepository, SessionStore,
    Storage, StorageError, TopicRecord, TopicRepository,
};
pub use sqlite::{SqliteInitError, SqliteRepository};
