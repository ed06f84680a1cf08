//! Engagement scheduling: should the agent speak up after a silence?
//!
//! The state is a coarse silence bucket, the action is stay-silent or speak.
//! Learning is online only: each proactive prompt is scored by the user's
//! reply and folded in with [`UpdateRule::Additive`].

use std::time::Duration;

use rand::Rng;

use super::{LearningParams, QTable, Transition, UpdateRule};
use crate::config::EngagementConfig;

/// Discretized time since the user last said something.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SilenceBucket {
    /// More than the long-silence bound (120s by default).
    Long,
    /// Between the moderate and long bounds.
    Moderate,
    /// At most the moderate bound (60s by default).
    Recent,
}

impl SilenceBucket {
    pub const ALL: [SilenceBucket; 3] = [Self::Long, Self::Moderate, Self::Recent];

    pub fn index(self) -> usize {
        match self {
            Self::Long => 0,
            Self::Moderate => 1,
            Self::Recent => 2,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Long => "long-silence",
            Self::Moderate => "moderate-silence",
            Self::Recent => "recent",
        }
    }
}

impl std::fmt::Display for SilenceBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngagementAction {
    StaySilent,
    Speak,
}

impl EngagementAction {
    pub fn index(self) -> usize {
        match self {
            Self::StaySilent => 0,
            Self::Speak => 1,
        }
    }

    fn from_index(index: usize) -> Self {
        if index == 1 { Self::Speak } else { Self::StaySilent }
    }
}

const AFFIRMATIVE: &[&str] = &["sim", "claro", "vamos conversar", "quero falar", "yes", "sure"];
const NEGATIVE: &[&str] = &["não", "nao", "agora não", "sai", "mais tarde", "no", "later"];

/// How the user reacted to a proactive prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplySentiment {
    Affirmative,
    Negative,
    Neutral,
}

impl ReplySentiment {
    /// Exact match against fixed phrase lists; anything else is neutral.
    pub fn classify(reply: &str) -> Self {
        let reply = reply.trim().to_lowercase();
        if AFFIRMATIVE.contains(&reply.as_str()) {
            Self::Affirmative
        } else if NEGATIVE.contains(&reply.as_str()) {
            Self::Negative
        } else {
            Self::Neutral
        }
    }

    pub fn reward(self) -> f64 {
        match self {
            Self::Affirmative => 1.0,
            Self::Negative => -1.0,
            Self::Neutral => 0.0,
        }
    }
}

/// Silence bucket × {stay silent, speak} learner.
#[derive(Debug, Clone)]
pub struct EngagementScheduler {
    table: QTable,
    params: LearningParams,
    moderate_after: Duration,
    long_after: Duration,
}

impl EngagementScheduler {
    pub fn new(config: &EngagementConfig) -> Self {
        Self {
            table: QTable {
                states: SilenceBucket::ALL.len(),
                actions: 2,
                values: vec![0.0; SilenceBucket::ALL.len() * 2],
            },
            params: config.params(),
            moderate_after: Duration::from_secs(config.moderate_silence_secs),
            long_after: Duration::from_secs(config.long_silence_secs),
        }
    }

    pub fn bucket_for(&self, elapsed: Duration) -> SilenceBucket {
        if elapsed > self.long_after {
            SilenceBucket::Long
        } else if elapsed > self.moderate_after {
            SilenceBucket::Moderate
        } else {
            SilenceBucket::Recent
        }
    }

    /// Epsilon-greedy choice for `bucket` with the configured exploration rate.
    pub fn decide(&self, bucket: SilenceBucket, rng: &mut impl Rng) -> EngagementAction {
        self.decide_with(bucket, self.params.epsilon, rng)
    }

    pub fn decide_with(
        &self,
        bucket: SilenceBucket,
        epsilon: f64,
        rng: &mut impl Rng,
    ) -> EngagementAction {
        let action = self.table.select_action(bucket.index(), epsilon, rng);
        EngagementAction::from_index(action)
    }

    /// Fold the user's reaction into the table. Returns the new value.
    ///
    /// `next` is whatever bucket the clock reports at update time. In a live
    /// session almost no time passes between prompt and update, so it is
    /// usually the same row being updated.
    pub fn learn(
        &mut self,
        bucket: SilenceBucket,
        action: EngagementAction,
        sentiment: ReplySentiment,
        next: SilenceBucket,
    ) -> f64 {
        let value = self.table.update(
            Transition {
                state: bucket.index(),
                action: action.index(),
                reward: sentiment.reward(),
                next_state: next.index(),
            },
            self.params.alpha,
            self.params.gamma,
            UpdateRule::Additive,
        );
        tracing::debug!(%bucket, ?action, ?sentiment, value, "engagement updated");
        value
    }

    pub fn value(&self, bucket: SilenceBucket, action: EngagementAction) -> f64 {
        self.table.value(bucket.index(), action.index())
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

    fn scheduler() -> EngagementScheduler {
        EngagementScheduler::new(&EngagementConfig::default())
    }

    #[test]
    fn buckets_follow_silence_bounds() {
        let s = scheduler();
        assert_eq!(s.bucket_for(Duration::from_secs(5)), SilenceBucket::Recent);
        assert_eq!(s.bucket_for(Duration::from_secs(60)), SilenceBucket::Recent);
        assert_eq!(s.bucket_for(Duration::from_secs(61)), SilenceBucket::Moderate);
        assert_eq!(s.bucket_for(Duration::from_secs(120)), SilenceBucket::Moderate);
        assert_eq!(s.bucket_for(Duration::from_secs(130)), SilenceBucket::Long);
    }

    #[test]
    fn reply_sentiment_uses_fixed_lists() {
        assert_eq!(ReplySentiment::classify("  Sim "), ReplySentiment::Affirmative);
        assert_eq!(ReplySentiment::classify("agora não"), ReplySentiment::Negative);
        assert_eq!(ReplySentiment::classify("talvez"), ReplySentiment::Neutral);
        assert_eq!(ReplySentiment::classify(""), ReplySentiment::Neutral);
        assert_eq!(ReplySentiment::Neutral.reward(), 0.0);
    }

    #[test]
    fn affirmative_reply_raises_speak_value() {
        let mut s = scheduler();
        let bucket = SilenceBucket::Moderate;
        let before = s.value(bucket, EngagementAction::Speak);
        s.learn(bucket, EngagementAction::Speak, ReplySentiment::Affirmative, bucket);
        assert!(s.value(bucket, EngagementAction::Speak) > before);
    }

    #[test]
    fn negative_reply_lowers_speak_value() {
        let mut s = scheduler();
        let bucket = SilenceBucket::Recent;
        let before = s.value(bucket, EngagementAction::Speak);
        s.learn(bucket, EngagementAction::Speak, ReplySentiment::Negative, bucket);
        assert!(s.value(bucket, EngagementAction::Speak) < before);
    }

    #[test]
    fn greedy_decision_follows_learned_values() {
        let mut s = scheduler();
        let mut rng = StdRng::seed_from_u64(1);
        // Untrained: ties go to stay-silent.
        assert_eq!(
            s.decide_with(SilenceBucket::Long, 0.0, &mut rng),
            EngagementAction::StaySilent
        );
        for _ in 0..3 {
            s.learn(
                SilenceBucket::Long,
                EngagementAction::Speak,
                ReplySentiment::Affirmative,
                SilenceBucket::Long,
            );
        }
        assert_eq!(
            s.decide_with(SilenceBucket::Long, 0.0, &mut rng),
            EngagementAction::Speak
        );
    }
}
