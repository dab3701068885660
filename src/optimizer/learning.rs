use std::collections::VecDeque;
use chrono::Utc;
use rand::Rng;

use crate::optimizer::agents::HierarchicalAgent;
use crate::optimizer::types::ReinforcementLearningFeedback;

/// Success ratio above which the shared exploration constant is reduced
pub const SUCCESS_RATIO_THRESHOLD: f64 = 0.8;
const EXPLOITATION_FACTOR: f64 = 0.99;
const EXPLORATION_FACTOR: f64 = 1.01;
const SMOOTHING: f64 = 0.9;

pub const DEFAULT_HISTORY_CAPACITY: usize = 10_000;

/// Bounded feedback log, oldest records are evicted first
#[derive(Debug, Clone)]
pub struct FeedbackHistory {
    records: VecDeque<ReinforcementLearningFeedback>,
    capacity: usize,
    /// Records currently held with a positive reward
    positive: usize,
}

impl Default for FeedbackHistory {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_HISTORY_CAPACITY)
    }
}

impl FeedbackHistory {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            records: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
            positive: 0,
        }
    }

    pub fn push(&mut self, feedback: ReinforcementLearningFeedback) {
        if self.records.len() == self.capacity {
            if let Some(evicted) = self.records.pop_front() {
                if evicted.reward > 0.0 {
                    self.positive -= 1;
                }
            }
        }
        if feedback.reward > 0.0 {
            self.positive += 1;
        }
        self.records.push_back(feedback);
    }

    /// Share of held records with a positive reward, 0.0 when empty
    pub fn positive_ratio(&self) -> f64 {
        if self.records.is_empty() {
            0.0
        } else {
            self.positive as f64 / self.records.len() as f64
        }
    }

    /// Up to `n` most recent records, oldest first
    pub fn recent(&self, n: usize) -> Vec<ReinforcementLearningFeedback> {
        let skip = self.records.len().saturating_sub(n);
        self.records.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeedbackUpdate {
    pub prediction_error: f64,
    pub success_ratio: f64,
}

/// Observed reward minus the reward implied by the expected outcome
pub fn prediction_error(feedback: &ReinforcementLearningFeedback) -> f64 {
    let expected = &feedback.expected_outcome;
    let expected_reward = expected.yield_change + expected.ecological_impact - expected.risk_change.abs();
    feedback.reward - expected_reward
}

/// Apply one feedback record to `agent`.
///
/// Weight positions not covered by the learning signal are nudged along a
/// fresh uniform sample in [-1, 1) drawn from `rng`.
pub fn apply_feedback<R: Rng + ?Sized>(
    agent: &mut HierarchicalAgent,
    feedback: &ReinforcementLearningFeedback,
    exploration_decay: f64,
    rng: &mut R,
) -> FeedbackUpdate {
    let error = prediction_error(feedback);
    let learning_rate = agent.performance.learning_rate;

    for (i, weight) in agent.neural_weights.iter_mut().enumerate() {
        let signal = feedback
            .learning_signal
            .get(i)
            .copied()
            .unwrap_or_else(|| rng.gen_range(-1.0..1.0));
        *weight += learning_rate * error * signal;
    }

    let performance = &mut agent.performance;
    performance.total_decisions += 1;
    if feedback.reward > 0.0 {
        performance.successful_decisions += 1;
    }
    performance.average_yield_improvement = performance.average_yield_improvement * SMOOTHING
        + feedback.actual_outcome.yield_change * (1.0 - SMOOTHING);
    performance.average_ecological_impact = performance.average_ecological_impact * SMOOTHING
        + feedback.actual_outcome.ecological_impact * (1.0 - SMOOTHING);
    performance.risk_adjusted_return = performance.average_yield_improvement - feedback.actual_outcome.risk_change.abs();
    performance.exploration_rate *= exploration_decay;

    agent.last_update = Utc::now();

    FeedbackUpdate {
        prediction_error: error,
        success_ratio: performance.success_ratio(),
    }
}

/// New shared exploration constant after an agent reports `success_ratio`
pub fn adjust_exploration_constant(current: f64, success_ratio: f64) -> f64 {
    if success_ratio > SUCCESS_RATIO_THRESHOLD {
        current * EXPLOITATION_FACTOR
    } else {
        current * EXPLORATION_FACTOR
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use crate::optimizer::agents::{AgentSeed, AgentTier};
    use crate::optimizer::types::ExpectedImpact;

    fn vault_agent(weights: Vec<f64>) -> HierarchicalAgent {
        let mut rng = StdRng::seed_from_u64(0);
        let mut agent = AgentSeed {
            id: "vault_agent_001",
            name: "Vault",
            expertise: &["x"],
            decision_scope: "vault",
            confidence: 0.6,
            tier: AgentTier::Vault {
                vault_id: "v".to_string(),
                specialized_strategies: vec![],
                local_knowledge: BTreeMap::new(),
            },
        }
        .build(&mut rng, 0.01, 0.1);
        agent.neural_weights = weights;
        agent
    }

    fn feedback(reward: f64, signal: Vec<f64>) -> ReinforcementLearningFeedback {
        ReinforcementLearningFeedback {
            id: "fb".to_string(),
            agent_id: "vault_agent_001".to_string(),
            action_id: "lock_30d".to_string(),
            expected_outcome: ExpectedImpact {
                yield_change: 0.2,
                risk_change: -0.05,
                ecological_impact: 0.1,
                time_horizon_days: 30,
            },
            actual_outcome: ExpectedImpact {
                yield_change: 0.3,
                risk_change: 0.02,
                ecological_impact: 0.05,
                time_horizon_days: 30,
            },
            reward,
            learning_signal: signal,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_weight_update_scenario() {
        let mut agent = vault_agent(vec![0.0]);
        let mut rng = StdRng::seed_from_u64(1);

        let update = apply_feedback(&mut agent, &feedback(1.0, vec![1.0]), 0.995, &mut rng);

        assert!((update.prediction_error - 0.75).abs() < 1e-12);
        assert!((agent.neural_weights[0] - 0.0075).abs() < 1e-12);
    }

    #[test]
    fn test_counters_and_smoothing() {
        let mut agent = vault_agent(vec![0.0]);
        let mut rng = StdRng::seed_from_u64(1);

        apply_feedback(&mut agent, &feedback(1.0, vec![1.0]), 0.995, &mut rng);
        apply_feedback(&mut agent, &feedback(-0.5, vec![1.0]), 0.995, &mut rng);

        let perf = &agent.performance;
        assert_eq!(perf.total_decisions, 2);
        assert_eq!(perf.successful_decisions, 1);
        // 0.0 -> 0.03 -> 0.057
        assert!((perf.average_yield_improvement - 0.057).abs() < 1e-12);
        assert!((perf.exploration_rate - 0.1 * 0.995 * 0.995).abs() < 1e-12);
    }

    #[test]
    fn test_short_signal_padded_with_random_values() {
        let mut agent = vault_agent(vec![0.0; 4]);
        let mut rng = StdRng::seed_from_u64(99);

        apply_feedback(&mut agent, &feedback(1.0, vec![1.0]), 0.995, &mut rng);

        assert!((agent.neural_weights[0] - 0.0075).abs() < 1e-12);
        for weight in &agent.neural_weights[1..] {
            // |lr * error * u| with u in [-1, 1)
            assert!(weight.abs() <= 0.0075 + 1e-12);
        }
    }

    #[test]
    fn test_exploration_constant_direction() {
        assert!((adjust_exploration_constant(1.0, 0.9) - 0.99).abs() < 1e-12);
        assert!((adjust_exploration_constant(1.0, 0.8) - 1.01).abs() < 1e-12);
        assert!((adjust_exploration_constant(1.0, 0.0) - 1.01).abs() < 1e-12);
    }

    #[test]
    fn test_history_evicts_oldest() {
        let mut history = FeedbackHistory::with_capacity(3);
        for i in 0..5 {
            let mut record = feedback(1.0, vec![]);
            record.id = format!("fb-{i}");
            history.push(record);
        }

        assert_eq!(history.len(), 3);
        let ids: Vec<String> = history.recent(10).into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["fb-2", "fb-3", "fb-4"]);

        let last_two: Vec<String> = history.recent(2).into_iter().map(|r| r.id).collect();
        assert_eq!(last_two, vec!["fb-3", "fb-4"]);
    }

    #[test]
    fn test_positive_ratio_follows_eviction() {
        let mut history = FeedbackHistory::with_capacity(4);
        assert_eq!(history.positive_ratio(), 0.0);

        for reward in [1.0, 0.5, -1.0, 0.0] {
            history.push(feedback(reward, vec![]));
        }
        assert!((history.positive_ratio() - 0.5).abs() < 1e-12);

        // Evicts both positive records
        history.push(feedback(-0.2, vec![]));
        history.push(feedback(-0.3, vec![]));
        assert_eq!(history.len(), 4);
        assert_eq!(history.positive_ratio(), 0.0);

        for _ in 0..4 {
            history.push(feedback(2.0, vec![]));
        }
        assert_eq!(history.positive_ratio(), 1.0);
    }
}
