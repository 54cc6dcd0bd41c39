use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Pass threshold applied when a topic does not configure one.
pub const DEFAULT_PASS_THRESHOLD: u8 = 70;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AttemptConfigError {
    #[error("pass threshold must be between 0 and 100, got {0}")]
    InvalidPassThreshold(u8),

    #[error("max attempts must be > 0 when set")]
    InvalidMaxAttempts,

    #[error("time limit must be > 0 seconds when set")]
    InvalidTimeLimit,
}

//
// ─── CONFIG ────────────────────────────────────────────────────────────────────
//

/// Per-topic attempt settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptConfig {
    randomize_questions: bool,
    randomize_options: bool,
    max_attempts: Option<u32>,
    pass_threshold: u8,
    #[serde(default)]
    time_limit_secs: Option<u32>,
}

impl Default for AttemptConfig {
    fn default() -> Self {
        Self {
            randomize_questions: false,
            randomize_options: false,
            max_attempts: None,
            pass_threshold: DEFAULT_PASS_THRESHOLD,
            time_limit_secs: None,
        }
    }
}

impl AttemptConfig {
    /// Create validated settings.
    ///
    /// # Errors
    ///
    /// Returns `AttemptConfigError` if the threshold exceeds 100 or
    /// `max_attempts` is zero.
    pub fn new(
        randomize_questions: bool,
        randomize_options: bool,
        max_attempts: Option<u32>,
        pass_threshold: u8,
    ) -> Result<Self, AttemptConfigError> {
        if pass_threshold > 100 {
            return Err(AttemptConfigError::InvalidPassThreshold(pass_threshold));
        }
        if max_attempts == Some(0) {
            return Err(AttemptConfigError::InvalidMaxAttempts);
        }
        Ok(Self {
            randomize_questions,
            randomize_options,
            max_attempts,
            pass_threshold,
            time_limit_secs: None,
        })
    }

    /// Attach a time limit, consumed by whatever scheduler expires sessions.
    ///
    /// # Errors
    ///
    /// Returns `AttemptConfigError::InvalidTimeLimit` for a zero limit.
    pub fn with_time_limit_secs(mut self, secs: Option<u32>) -> Result<Self, AttemptConfigError> {
        if secs == Some(0) {
            return Err(AttemptConfigError::InvalidTimeLimit);
        }
        self.time_limit_secs = secs;
        Ok(self)
    }

    #[must_use]
    pub fn randomize_questions(&self) -> bool {
        self.randomize_questions
    }

    #[must_use]
    pub fn randomize_options(&self) -> bool {
        self.randomize_options
    }

    #[must_use]
    pub fn max_attempts(&self) -> Option<u32> {
        self.max_attempts
    }

    #[must_use]
    pub fn pass_threshold(&self) -> u8 {
        self.pass_threshold
    }

    #[must_use]
    pub fn time_limit_secs(&self) -> Option<u32> {
        self.time_limit_secs
    }

    /// Whether a percentage counts as passed under this config.
    #[must_use]
    pub fn passes(&self, percentage: u8) -> bool {
        percentage >= self.pass_threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_threshold_is_seventy() {
        let config = AttemptConfig::default();
        assert_eq!(config.pass_threshold(), 70);
        assert!(config.passes(70));
        assert!(!config.passes(69));
    }

    #[test]
    fn rejects_invalid_values() {
        assert_eq!(
            AttemptConfig::new(false, false, None, 101).unwrap_err(),
            AttemptConfigError::InvalidPassThreshold(101)
        );
        assert_eq!(
            AttemptConfig::new(false, false, Some(0), 70).unwrap_err(),
            AttemptConfigError::InvalidMaxAttempts
        );
        assert_eq!(
            AttemptConfig::default()
                .with_time_limit_secs(Some(0))
                .unwrap_err(),
            AttemptConfigError::InvalidTimeLimit
        );
    }
}
