//! Utterance classification.
//!
//! Language understanding is an outside capability: anything implementing
//! [`Classifier`] maps free text to one of the canonical phrase states plus a
//! confidence. [`LexicalClassifier`] is a dependency-free baseline that scores
//! accent-folded token overlap against the phrase catalog.

use std::collections::BTreeSet;

use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

/// A recognized state and how sure the classifier is about it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classification {
    pub state: usize,
    /// In `[0, 1]`.
    pub confidence: f32,
}

/// Maps an utterance to a canonical phrase state.
pub trait Classifier {
    fn classify(&self, utterance: &str) -> Classification;
}

impl<C: Classifier + ?Sized> Classifier for Box<C> {
    fn classify(&self, utterance: &str) -> Classification {
        (**self).classify(utterance)
    }
}

/// Lowercase, strip accents and punctuation, split into words.
pub fn fold_tokens(text: &str) -> BTreeSet<String> {
    let folded: String = text
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    folded.split_whitespace().map(str::to_string).collect()
}

/// Jaccard similarity over folded tokens.
#[derive(Debug, Clone)]
pub struct LexicalClassifier {
    phrases: Vec<BTreeSet<String>>,
}

impl LexicalClassifier {
    pub fn new<S: AsRef<str>>(phrases: &[S]) -> Self {
        Self {
            phrases: phrases.iter().map(|p| fold_tokens(p.as_ref())).collect(),
        }
    }

    fn similarity(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f32 {
        let union = a.union(b).count();
        if union == 0 {
            return 0.0;
        }
        a.intersection(b).count() as f32 / union as f32
    }
}

impl Classifier for LexicalClassifier {
    /// Best-matching phrase; ties go to the lowest index.
    fn classify(&self, utterance: &str) -> Classification {
        let tokens = fold_tokens(utterance);
        let mut best = Classification {
            state: 0,
            confidence: 0.0,
        };
        for (state, phrase) in self.phrases.iter().enumerate() {
            let score = Self::similarity(&tokens, phrase);
            if score > best.confidence {
                best = Classification {
                    state,
                    confidence: score,
                };
            }
        }
        tracing::debug!(utterance, state = best.state, confidence = best.confidence, "classified");
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::learn::response::DEFAULT_PHRASES;

    fn classifier() -> LexicalClassifier {
        LexicalClassifier::new(&DEFAULT_PHRASES)
    }

    #[test]
    fn folding_strips_accents_and_punctuation() {
        let tokens = fold_tokens("Como você está?");
        assert_eq!(
            tokens.into_iter().collect::<Vec<_>>(),
            vec!["como", "esta", "voce"]
        );
    }

    #[test]
    fn exact_phrase_is_fully_confident() {
        let c = classifier().classify("Boa noite!");
        assert_eq!(c.state, 4);
        assert_eq!(c.confidence, 1.0);
    }

    #[test]
    fn accent_free_input_still_matches() {
        let c = classifier().classify("ola");
        assert_eq!(c.state, 1);
        assert!(c.confidence > 0.5);
    }

    #[test]
    fn unrelated_text_has_low_confidence() {
        let c = classifier().classify("qual a capital da mongólia");
        assert!(c.confidence <= 0.5);
    }

    #[test]
    fn partial_overlap_is_weak() {
        // "bom" overlaps "bom dia" only halfway.
        let c = classifier().classify("bom");
        assert_eq!(c.state, 2);
        assert_eq!(c.confidence, 0.5);
    }
}
