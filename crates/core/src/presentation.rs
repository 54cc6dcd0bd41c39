//! Per-session presentation order for questions and options.
//!
//! The order is derived once from a seed stored with the session. Selections are
//! always mapped back to canonical option indices, so scoring never depends on
//! what the learner saw.

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::model::{AttemptConfig, QuestionId, TopicContent};

/// Display order for one session.
///
/// `questions[position]` is the canonical index of the question shown at
/// `position`. `options[canonical][displayed]` is the canonical option index
/// shown at `displayed` for that question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresentationOrder {
    questions: Vec<usize>,
    options: Vec<Vec<usize>>,
}

/// Question as rendered to the learner. Carries no correctness information.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PresentedQuestion {
    pub position: usize,
    pub id: QuestionId,
    pub text: String,
    pub options: Vec<String>,
}

/// Derive the presentation order for a session.
///
/// Identical `(content, config, seed)` inputs always produce the same order.
#[must_use]
pub fn derive_presentation(
    content: &TopicContent,
    config: &AttemptConfig,
    seed: u64,
) -> PresentationOrder {
    let mut rng = StdRng::seed_from_u64(seed);

    let mut questions: Vec<usize> = (0..content.len()).collect();
    if config.randomize_questions() {
        questions.shuffle(&mut rng);
    }

    let options = content
        .questions()
        .iter()
        .map(|q| {
            let mut order: Vec<usize> = (0..q.option_count()).collect();
            if config.randomize_options() {
                order.shuffle(&mut rng);
            }
            order
        })
        .collect();

    PresentationOrder { questions, options }
}

impl PresentationOrder {
    /// Stored order with no shuffling at all.
    #[must_use]
    pub fn canonical(content: &TopicContent) -> Self {
        Self {
            questions: (0..content.len()).collect(),
            options: content
                .questions()
                .iter()
                .map(|q| (0..q.option_count()).collect())
                .collect(),
        }
    }

    #[must_use]
    pub fn question_count(&self) -> usize {
        self.questions.len()
    }

    /// Canonical index of the question shown at `position`.
    #[must_use]
    pub fn question_at(&self, position: usize) -> Option<usize> {
        self.questions.get(position).copied()
    }

    /// Display position of the question with canonical index `canonical`.
    #[must_use]
    pub fn position_of(&self, canonical: usize) -> Option<usize> {
        self.questions.iter().position(|&q| q == canonical)
    }

    /// Map a displayed option position back to its canonical index.
    #[must_use]
    pub fn original_option(&self, question: usize, displayed: usize) -> Option<usize> {
        self.options.get(question)?.get(displayed).copied()
    }

    /// Map a canonical option index to where it is displayed.
    #[must_use]
    pub fn displayed_option(&self, question: usize, original: usize) -> Option<usize> {
        self.options.get(question)?.iter().position(|&o| o == original)
    }

    /// Whether this order still describes `content` (same question and option
    /// counts, every entry a permutation).
    #[must_use]
    pub fn fits(&self, content: &TopicContent) -> bool {
        if !is_permutation(&self.questions, content.len()) {
            return false;
        }
        if self.options.len() != content.len() {
            return false;
        }
        self.options
            .iter()
            .zip(content.questions())
            .all(|(order, q)| is_permutation(order, q.option_count()))
    }

    /// Render the question displayed at `position`.
    #[must_use]
    pub fn present(&self, content: &TopicContent, position: usize) -> Option<PresentedQuestion> {
        let canonical = self.question_at(position)?;
        let question = content.questions().get(canonical)?;
        let options = self
            .options
            .get(canonical)?
            .iter()
            .map(|&o| question.options().get(o).cloned())
            .collect::<Option<Vec<_>>>()?;
        Some(PresentedQuestion {
            position,
            id: question.id().clone(),
            text: question.text().to_owned(),
            options,
        })
    }

    /// Render every question in display order.
    #[must_use]
    pub fn present_all(&self, content: &TopicContent) -> Vec<PresentedQuestion> {
        (0..self.questions.len())
            .filter_map(|position| self.present(content, position))
            .collect()
    }
}

fn is_permutation(order: &[usize], len: usize) -> bool {
    if order.len() != len {
        return false;
    }
    let mut seen = vec![false; len];
    for &i in order {
        match seen.get_mut(i) {
            Some(slot) if !*slot => *slot = true,
            _ => return false,
        }
    }
    true
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Question, QuestionId};

    fn content(n: usize) -> TopicContent {
        let questions = (0..n)
            .map(|i| {
                Question::new(
                    QuestionId::new(format!("q{i}")),
                    format!("Question {i}"),
                    vec!["a".into(), "b".into(), "c".into(), "d".into()],
                    i % 4,
                )
                .unwrap()
            })
            .collect();
        TopicContent::new(None, questions).unwrap()
    }

    fn config(questions: bool, options: bool) -> AttemptConfig {
        AttemptConfig::new(questions, options, None, 70).unwrap()
    }

    #[test]
    fn no_randomization_keeps_canonical_order() {
        let content = content(5);
        let order = derive_presentation(&content, &config(false, false), 99);
        assert_eq!(order, PresentationOrder::canonical(&content));
    }

    #[test]
    fn same_seed_gives_same_order() {
        let content = content(8);
        let a = derive_presentation(&content, &config(true, true), 1234);
        let b = derive_presentation(&content, &config(true, true), 1234);
        assert_eq!(a, b);
        assert!(a.fits(&content));
    }

    #[test]
    fn some_seed_shuffles_questions() {
        let content = content(8);
        let canonical = PresentationOrder::canonical(&content);
        let shuffled = (0..20_u64)
            .map(|seed| derive_presentation(&content, &config(true, false), seed))
            .any(|order| order.questions != canonical.questions);
        assert!(shuffled);
    }

    #[test]
    fn options_only_randomization_keeps_question_order() {
        let content = content(6);
        let order = derive_presentation(&content, &config(false, true), 7);
        assert_eq!(order.questions, (0..6).collect::<Vec<_>>());
        assert!(order.fits(&content));
    }

    #[test]
    fn option_mapping_round_trips() {
        let content = content(4);
        let order = derive_presentation(&content, &config(true, true), 42);
        for q in 0..content.len() {
            for displayed in 0..4 {
                let original = order.original_option(q, displayed).unwrap();
                assert_eq!(order.displayed_option(q, original), Some(displayed));
            }
        }
    }

    #[test]
    fn presented_options_follow_permutation() {
        let content = content(3);
        let order = derive_presentation(&content, &config(true, true), 5);
        let rendered = order.present_all(&content);
        assert_eq!(rendered.len(), 3);
        for item in rendered {
            let canonical = order.question_at(item.position).unwrap();
            let question = &content.questions()[canonical];
            assert_eq!(&item.id, question.id());
            for (displayed, text) in item.options.iter().enumerate() {
                let original = order.original_option(canonical, displayed).unwrap();
                assert_eq!(text, &question.options()[original]);
            }
        }
    }

    #[test]
    fn fits_rejects_changed_content() {
        let order = derive_presentation(&content(3), &config(true, true), 5);
        assert!(!order.fits(&content(4)));
    }
}
