use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

//
// ─── NUMERIC IDS ───────────────────────────────────────────────────────────────
//

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(u64);

        impl $name {
            #[must_use]
            pub const fn new(id: u64) -> Self {
                Self(id)
            }

            /// Returns the underlying u64 value
            #[must_use]
            pub fn value(&self) -> u64 {
                self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = ParseIdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim().parse::<u64>().map(Self::new).map_err(|_| ParseIdError {
                    kind: stringify!($name).to_string(),
                })
            }
        }
    };
}

numeric_id!(
    /// Unique identifier for a topic (one quiz unit).
    TopicId
);
numeric_id!(
    /// Unique identifier for an enrollment of a student in a course.
    EnrollmentId
);
numeric_id!(
    /// Unique identifier for a student.
    StudentId
);
numeric_id!(
    /// Unique identifier for a course.
    CourseId
);
numeric_id!(
    /// Storage identifier for a persisted attempt.
    AttemptId
);

//
// ─── QUESTION ID ───────────────────────────────────────────────────────────────
//

/// Identifier of a question, unique within one topic's content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QuestionId(String);

impl QuestionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QuestionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for QuestionId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

//
// ─── PARSE ERROR ───────────────────────────────────────────────────────────────
//

/// Error type for parsing ID from string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIdError {
    kind: String,
}

impl fmt::Display for ParseIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to parse {} from string", self.kind)
    }
}

impl std::error::Error for ParseIdError {}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_id_display_and_parse() {
        let id = TopicId::new(42);
        assert_eq!(id.to_string(), "42");
        let parsed: TopicId = "42".parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn invalid_id_reports_kind() {
        let err = "abc".parse::<EnrollmentId>().unwrap_err();
        assert_eq!(err.to_string(), "failed to parse EnrollmentId from string");
    }

    #[test]
    fn debug_includes_type_name() {
        assert_eq!(format!("{:?}", AttemptId::new(7)), "AttemptId(7)");
    }

    #[test]
    fn ids_serialize_transparently() {
        let json = serde_json::to_string(&StudentId::new(9)).unwrap();
        assert_eq!(json, "9");
        let q: QuestionId = serde_json::from_str("\"q-1\"").unwrap();
        assert_eq!(q.as_str(), "q-1");
    }
}
