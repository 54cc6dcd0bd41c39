use quiz_core::model::{AttemptConfig, QuestionId, TopicContent};
use quiz_core::presentation::PresentedQuestion;
use quiz_core::session::{QuizSession, SessionProgress, SessionStatus};

/// A learner's session together with the topic it was opened against.
///
/// Mutations go through `SessionLoopService` so every change is persisted.
#[derive(Debug, Clone)]
pub struct ActiveSession {
    pub(crate) session: QuizSession,
    pub(crate) content: TopicContent,
    pub(crate) config: AttemptConfig,
    pub(crate) resumed: bool,
}

impl ActiveSession {
    #[must_use]
    pub fn session(&self) -> &QuizSession {
        &self.session
    }

    #[must_use]
    pub fn content(&self) -> &TopicContent {
        &self.content
    }

    #[must_use]
    pub fn config(&self) -> &AttemptConfig {
        &self.config
    }

    /// True when the session was loaded from the store rather than created.
    #[must_use]
    pub fn is_resumed(&self) -> bool {
        self.resumed
    }

    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.session.status()
    }

    #[must_use]
    pub fn progress(&self) -> SessionProgress {
        self.session.progress()
    }

    #[must_use]
    pub fn reading(&self) -> Option<&str> {
        self.content.reading()
    }

    #[must_use]
    pub fn current_question(&self) -> Option<PresentedQuestion> {
        self.session.current_question(&self.content)
    }

    /// Every question in presentation order, for one-page renderers.
    #[must_use]
    pub fn questions(&self) -> Vec<PresentedQuestion> {
        self.session.presentation().present_all(&self.content)
    }

    /// Displayed position of the stored answer, to re-highlight it on resume.
    #[must_use]
    pub fn displayed_selection(&self, question_id: &QuestionId) -> Option<usize> {
        self.session.displayed_selection(&self.content, question_id)
    }
}
