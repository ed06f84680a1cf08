//! Tabular reinforcement learning.
//!
//! [`QTable`] is a dense state × action table of value estimates with
//! epsilon-greedy selection and two temporal-difference update conventions.
//! The two learners built on it use different conventions:
//!
//! - [`response::ResponseSelector`] uses [`UpdateRule::Blended`] and is trained
//!   offline once, before the session starts.
//! - [`engagement::EngagementScheduler`] uses [`UpdateRule::Additive`] and is
//!   updated online from the user's reaction to proactive prompts.

pub mod engagement;
pub mod response;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{TableError, TableResult};

/// How a TD update folds the target into the current estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpdateRule {
    /// `Q(s,a) ← (1-α)·Q(s,a) + α·(r + γ·max Q(s',·))`
    Blended,
    /// `Q(s,a) ← Q(s,a) + α·(r + γ·max Q(s',·) − Q(s,a))`
    Additive,
}

/// Step size, discount and exploration rate for one learner.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LearningParams {
    /// Learning rate α.
    pub alpha: f64,
    /// Discount factor γ.
    pub gamma: f64,
    /// Exploration probability ε.
    pub epsilon: f64,
}

/// One transition fed to [`QTable::update`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transition {
    pub state: usize,
    pub action: usize,
    pub reward: f64,
    pub next_state: usize,
}

/// Dense action-value table, zero-initialized.
///
/// Dimensions are fixed at construction. Values change only through
/// [`QTable::update`] and are unbounded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QTable {
    states: usize,
    actions: usize,
    values: Vec<f64>,
}

impl QTable {
    /// Create a `states × actions` table filled with zeros.
    pub fn new(states: usize, actions: usize) -> TableResult<Self> {
        if states == 0 || actions == 0 {
            return Err(TableError::EmptyDimension { states, actions });
        }
        Ok(Self {
            states,
            actions,
            values: vec![0.0; states * actions],
        })
    }

    pub fn states(&self) -> usize {
        self.states
    }

    pub fn actions(&self) -> usize {
        self.actions
    }

    /// Current estimate for `(state, action)`.
    ///
    /// # Panics
    ///
    /// Panics if either index is out of range.
    pub fn value(&self, state: usize, action: usize) -> f64 {
        self.values[self.offset(state, action)]
    }

    /// The value row for `state`.
    pub fn row(&self, state: usize) -> &[f64] {
        assert!(state < self.states, "state {state} out of range");
        let start = state * self.actions;
        &self.values[start..start + self.actions]
    }

    /// Highest value in the row for `state`.
    pub fn max_value(&self, state: usize) -> f64 {
        self.row(state)
            .iter()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max)
    }

    /// Pure argmax for `state`; ties go to the lowest action index.
    pub fn best_action(&self, state: usize) -> usize {
        let mut best = 0;
        let row = self.row(state);
        for (action, &value) in row.iter().enumerate().skip(1) {
            if value > row[best] {
                best = action;
            }
        }
        best
    }

    /// Epsilon-greedy selection.
    ///
    /// With probability `epsilon` a uniformly random action is returned,
    /// otherwise [`QTable::best_action`]. `epsilon <= 0` never consults the RNG.
    pub fn select_action(&self, state: usize, epsilon: f64, rng: &mut impl Rng) -> usize {
        if epsilon > 0.0 && rng.gen_bool(epsilon.min(1.0)) {
            rng.gen_range(0..self.actions)
        } else {
            self.best_action(state)
        }
    }

    /// Apply one TD update and return the new value.
    pub fn update(&mut self, t: Transition, alpha: f64, gamma: f64, rule: UpdateRule) -> f64 {
        let lookahead = self.max_value(t.next_state);
        let target = t.reward + gamma * lookahead;
        let idx = self.offset(t.state, t.action);
        let old = self.values[idx];
        let new = match rule {
            UpdateRule::Blended => (1.0 - alpha) * old + alpha * target,
            UpdateRule::Additive => old + alpha * (target - old),
        };
        self.values[idx] = new;
        tracing::debug!(
            state = t.state,
            action = t.action,
            reward = t.reward,
            old,
            new,
            "td update"
        );
        new
    }

    /// Bootstrap the table with independent one-step trials.
    ///
    /// Each trial samples a state uniformly, picks an action epsilon-greedily
    /// against the current table, scores it with `reward_fn` and applies a
    /// `rule` update whose lookahead is the same state. Returns the summed
    /// reward across all trials.
    pub fn train_offline<R, F>(
        &mut self,
        episodes: usize,
        params: LearningParams,
        rule: UpdateRule,
        rng: &mut R,
        mut reward_fn: F,
    ) -> f64
    where
        R: Rng,
        F: FnMut(usize, usize) -> f64,
    {
        let mut total = 0.0;
        for _ in 0..episodes {
            let state = rng.gen_range(0..self.states);
            let action = self.select_action(state, params.epsilon, rng);
            let reward = reward_fn(state, action);
            total += reward;
            let trial = Transition {
                state,
                action,
                reward,
                next_state: state,
            };
            self.update(trial, params.alpha, params.gamma, rule);
        }
        total
    }

    fn offset(&self, state: usize, action: usize) -> usize {
        assert!(
            state < self.states && action < self.actions,
            "({state}, {action}) out of range for {}x{} table",
            self.states,
            self.actions
        );
        state * self.actions + action
    }

    /// Overwrite one cell. Only meant for seeding fixtures in tests.
    #[cfg(test)]
    pub(crate) fn set(&mut self, state: usize, action: usize, value: f64) {
        let idx = self.offset(state, action);
        self.values[idx] = value;
    }
}
