#![forbid(unsafe_code)]

pub mod app_services;
pub mod error;
pub mod reports;
pub mod sessions;
pub mod submission;

pub use quiz_core::Clock;

pub use app_services::AssessmentServices;
pub use error::{AppServicesError, ReportError, SessionError, SubmissionError};
pub use reports::{ReportService, TopicReport};
pub use sessions::{ActiveSession, SessionLoopService, SubmitOutcome};
pub use submission::SubmissionService;
