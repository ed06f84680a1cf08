//! Response selection: which canned reply fits a recognized phrase.
//!
//! States are the canonical phrases a user might say, actions the canned
//! responses. The table is bootstrapped offline with a hand-built reward and
//! then only exploited (no live updates).

use rand::Rng;

use super::{LearningParams, QTable, UpdateRule};
use crate::config::ResponseConfig;
use crate::error::{TableError, TableResult};

/// Canonical user phrases (states).
pub const DEFAULT_PHRASES: [&str; 10] = [
    "oi",
    "olá",
    "bom dia",
    "boa tarde",
    "boa noite",
    "como você está?",
    "tudo bem?",
    "adeus",
    "tchau",
    "até mais",
];

/// Canned responses (actions). Response `i` is the expected answer to phrase `i`.
pub const DEFAULT_RESPONSES: [&str; 10] = [
    "Olá! Como posso ajudar?",
    "Oi, tudo bem?",
    "Bom dia!",
    "Boa tarde!",
    "Boa noite!",
    "Estou bem, e você?",
    "Tudo ótimo!",
    "Até logo!",
    "Tchau!",
    "Nos vemos em breve!",
];

const MATCH_REWARD: f64 = 5.0;
const MISS_REWARD: f64 = -3.0;

/// Paired phrase and response lists.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseCatalog {
    phrases: Vec<String>,
    responses: Vec<String>,
}

impl ResponseCatalog {
    pub fn new(phrases: Vec<String>, responses: Vec<String>) -> TableResult<Self> {
        if phrases.len() != responses.len() {
            return Err(TableError::CatalogMismatch {
                phrases: phrases.len(),
                responses: responses.len(),
            });
        }
        if phrases.is_empty() {
            return Err(TableError::EmptyDimension {
                states: 0,
                actions: 0,
            });
        }
        Ok(Self { phrases, responses })
    }

    pub fn phrases(&self) -> &[String] {
        &self.phrases
    }

    pub fn responses(&self) -> &[String] {
        &self.responses
    }

    /// Expected response text for `state`.
    pub fn expected(&self, state: usize) -> &str {
        &self.responses[state]
    }

    /// Expected response for the preceding state, wrapping 0 to the last.
    fn expected_previous(&self, state: usize) -> &str {
        let prev = (state + self.responses.len() - 1) % self.responses.len();
        &self.responses[prev]
    }

    /// Offline bootstrap reward.
    ///
    /// +5 when the chosen response text equals the expected response of
    /// `state` or of `state - 1` (adjacency heuristic, wrapping), else -3.
    pub fn bootstrap_reward(&self, state: usize, action: usize) -> f64 {
        let chosen = self.responses[action].as_str();
        if chosen == self.expected(state) || chosen == self.expected_previous(state) {
            MATCH_REWARD
        } else {
            MISS_REWARD
        }
    }
}

impl Default for ResponseCatalog {
    fn default() -> Self {
        Self {
            phrases: DEFAULT_PHRASES.iter().map(|s| s.to_string()).collect(),
            responses: DEFAULT_RESPONSES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Outcome of [`ResponseSelector::pick_response`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponsePick<'a> {
    Respond(&'a str),
    /// Confidence at or below the threshold, or an unknown state.
    NotUnderstood,
}

/// Summary of one offline bootstrap run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainingReport {
    pub episodes: usize,
    pub total_reward: f64,
}

impl TrainingReport {
    pub fn mean_reward(&self) -> f64 {
        if self.episodes == 0 {
            0.0
        } else {
            self.total_reward / self.episodes as f64
        }
    }
}

/// Phrase → response learner. Uses [`UpdateRule::Blended`].
#[derive(Debug, Clone)]
pub struct ResponseSelector {
    catalog: ResponseCatalog,
    table: QTable,
    params: LearningParams,
    episodes: usize,
    confidence_threshold: f32,
}

impl ResponseSelector {
    pub fn new(catalog: ResponseCatalog, config: &ResponseConfig) -> TableResult<Self> {
        let table = QTable::new(catalog.phrases.len(), catalog.responses.len())?;
        Ok(Self {
            catalog,
            table,
            params: config.params(),
            episodes: config.episodes,
            confidence_threshold: config.confidence_threshold,
        })
    }

    /// Run the configured number of offline trials.
    pub fn train(&mut self, rng: &mut impl Rng) -> TrainingReport {
        let catalog = &self.catalog;
        let total_reward = self.table.train_offline(
            self.episodes,
            self.params,
            UpdateRule::Blended,
            rng,
            |state, action| catalog.bootstrap_reward(state, action),
        );
        let report = TrainingReport {
            episodes: self.episodes,
            total_reward,
        };
        tracing::info!(
            episodes = report.episodes,
            mean_reward = report.mean_reward(),
            "response selector bootstrapped"
        );
        report
    }

    /// Best learned response for `state`, without exploration.
    pub fn respond_with(&self, state: usize) -> &str {
        &self.catalog.responses[self.table.best_action(state)]
    }

    /// Answer a classified utterance, or report that it was not understood.
    pub fn pick_response(&self, state: usize, confidence: f32) -> ResponsePick<'_> {
        if confidence <= self.confidence_threshold || state >= self.table.states() {
            return ResponsePick::NotUnderstood;
        }
        ResponsePick::Respond(self.respond_with(state))
    }

    pub fn catalog(&self) -> &ResponseCatalog {
        &self.catalog
    }

    pub fn table(&self) -> &QTable {
        &self.table
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn small_config() -> ResponseConfig {
        ResponseConfig {
            episodes: 20_000,
            ..Default::default()
        }
    }

    #[test]
    fn catalog_lengths_must_match() {
        let err = ResponseCatalog::new(vec!["oi".into()], vec![]).unwrap_err();
        assert!(matches!(
            err,
            TableError::CatalogMismatch {
                phrases: 1,
                responses: 0
            }
        ));
    }

    #[test]
    fn bootstrap_reward_accepts_same_and_previous_state() {
        let catalog = ResponseCatalog::default();
        assert_eq!(catalog.bootstrap_reward(3, 3), MATCH_REWARD);
        assert_eq!(catalog.bootstrap_reward(3, 2), MATCH_REWARD);
        assert_eq!(catalog.bootstrap_reward(3, 4), MISS_REWARD);
        // State 0 wraps to the last response.
        assert_eq!(catalog.bootstrap_reward(0, 9), MATCH_REWARD);
        assert_eq!(catalog.bootstrap_reward(0, 1), MISS_REWARD);
    }

    #[test]
    fn trained_selector_prefers_rewarded_responses() {
        let mut selector =
            ResponseSelector::new(ResponseCatalog::default(), &small_config()).unwrap();
        let mut rng = StdRng::seed_from_u64(42);
        let report = selector.train(&mut rng);
        assert_eq!(report.episodes, 20_000);
        assert!(report.mean_reward() > 0.0);

        let catalog = selector.catalog().clone();
        for state in 0..catalog.phrases().len() {
            let best = selector.table().best_action(state);
            assert_eq!(
                catalog.bootstrap_reward(state, best),
                MATCH_REWARD,
                "state {state} picked {:?}",
                catalog.responses()[best]
            );
        }
    }

    #[test]
    fn low_confidence_is_not_understood() {
        let selector = ResponseSelector::new(ResponseCatalog::default(), &small_config()).unwrap();
        assert_eq!(selector.pick_response(0, 0.5), ResponsePick::NotUnderstood);
        assert_eq!(selector.pick_response(0, 0.2), ResponsePick::NotUnderstood);
        assert_eq!(selector.pick_response(99, 0.9), ResponsePick::NotUnderstood);
        assert!(matches!(selector.pick_response(0, 0.51), ResponsePick::Respond(_)));
    }
}
