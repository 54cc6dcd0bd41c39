mod attempt;
mod config;
mod content;
mod ids;

pub use attempt::{
    AnswerMap, Attempt, AttemptStatus, AttemptStatusError, NewAttempt, Selection,
};
pub use config::{AttemptConfig, AttemptConfigError, DEFAULT_PASS_THRESHOLD};
pub use content::{ContentError, MIN_OPTIONS, Question, TopicContent};
pub use ids::{AttemptId, CourseId, EnrollmentId, ParseIdError, QuestionId, StudentId, TopicId};
