use std::collections::HashSet;
use std::f64::consts::PI;
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use serde_json::json;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::optimizer::agents::{AgentPerformance, AgentRegistry, CoordinationSummary, HierarchicalAgent};
use crate::optimizer::indexes::trie::PatternData;
use crate::optimizer::indexes::{AdjacencyMatrix, DisjointSet, EcosystemGraph, EcosystemNode, PrefixTrie, SegmentTree};
use crate::optimizer::learning::{
    DEFAULT_HISTORY_CAPACITY, FeedbackHistory, adjust_exploration_constant, apply_feedback,
};
use crate::optimizer::mcts::{MctsSearch, SearchBudget, SearchParams};
use crate::optimizer::priority::{PriorityQueue, build_priority_action};
use crate::optimizer::types::{
    AlgorithmConfig, AlgorithmConfigPatch, OptimizationResult, OptimizerError, PriorityAction,
    ReinforcementLearningFeedback, Urgency, VaultState,
};

/// Initial per-agent exploration rate
const INITIAL_EXPLORATION_RATE: f64 = 0.1;
/// Number of history records replayed by one batch pass
pub const FEEDBACK_BATCH_SIZE: usize = 10;
const YIELD_SERIES_DAYS: usize = 365;
const PRIORITY_AGENT_ID: &str = "system";
/// Vaults whose last state and recommendation are kept
pub const LATEST_STATE_CAPACITY: usize = 1024;

#[derive(Debug, Clone)]
pub struct OptimizerSettings {
    pub algorithm: AlgorithmConfig,
    pub feedback_history_capacity: usize,
    /// Bound on the per-vault state and recommendation caches
    pub latest_state_capacity: usize,
    /// Fixed seed for reproducible runs; `None` seeds from entropy
    pub seed: Option<u64>,
}

impl Default for OptimizerSettings {
    fn default() -> Self {
        Self {
            algorithm: AlgorithmConfig::default(),
            feedback_history_capacity: DEFAULT_HISTORY_CAPACITY,
            latest_state_capacity: LATEST_STATE_CAPACITY,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentPerformanceSummary {
    pub agent_id: String,
    pub name: String,
    pub tier: String,
    pub confidence: f64,
    pub performance: AgentPerformance,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlgorithmMetrics {
    pub total_optimizations: u64,
    /// Mean yield gain of the recommended action's successor state
    pub average_improvement: f64,
    pub agent_performance: Vec<AgentPerformanceSummary>,
    /// Mean share of iterations spent on the recommended action
    pub mcts_efficiency: f64,
    /// Share of recorded feedback with a positive reward
    pub rl_accuracy: f64,
}

#[derive(Debug, Default)]
struct OptimizationTotals {
    count: u64,
    improvement_sum: f64,
    efficiency_sum: f64,
}

/// Yield optimization service.
///
/// Owns the agent population, the learning state and every index. Construct
/// one per process and share it behind an `Arc`.
pub struct YieldOptimizer {
    config: RwLock<AlgorithmConfig>,
    agents: RwLock<AgentRegistry>,
    feedback_history: RwLock<FeedbackHistory>,
    priority_queue: Mutex<PriorityQueue>,
    patterns: RwLock<PrefixTrie>,
    vault_clusters: Mutex<DisjointSet>,
    yield_history: SegmentTree,
    ecosystem: RwLock<EcosystemGraph>,
    rng: Mutex<StdRng>,
    latest_states: DashMap<String, VaultState>,
    latest_recommendations: DashMap<String, OptimizationResult>,
    latest_state_capacity: usize,
    totals: Mutex<OptimizationTotals>,
}

impl YieldOptimizer {
    pub fn new(settings: OptimizerSettings) -> Self {
        let mut rng = match settings.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let algorithm = settings.algorithm;
        let agents = AgentRegistry::seeded(&mut rng, algorithm.learning_rate, INITIAL_EXPLORATION_RATE);
        let yield_series = seed_yield_series(&mut rng);

        info!(
            "Yield optimizer initialized with {} agents, {} days of yield history",
            agents.len(),
            yield_series.len()
        );

        Self {
            config: RwLock::new(algorithm),
            agents: RwLock::new(agents),
            feedback_history: RwLock::new(FeedbackHistory::with_capacity(settings.feedback_history_capacity)),
            priority_queue: Mutex::new(PriorityQueue::new()),
            patterns: RwLock::new(seed_patterns()),
            vault_clusters: Mutex::new(seed_vault_clusters()),
            yield_history: SegmentTree::build(&yield_series),
            ecosystem: RwLock::new(seed_ecosystem(&mut rng)),
            rng: Mutex::new(rng),
            latest_states: DashMap::new(),
            latest_recommendations: DashMap::new(),
            latest_state_capacity: settings.latest_state_capacity.max(1),
            totals: Mutex::new(OptimizationTotals::default()),
        }
    }

    pub fn shared(settings: OptimizerSettings) -> Arc<Self> {
        Arc::new(Self::new(settings))
    }

    /// Run a full search for `vault_id` with the current configuration
    pub async fn optimize_vault_yield(
        &self,
        vault_id: &str,
        state: VaultState,
    ) -> Result<OptimizationResult, OptimizerError> {
        self.optimize_vault_yield_with_budget(vault_id, state, SearchBudget::default())
            .await
    }

    /// Search limited by a deadline and/or cancellation flag.
    ///
    /// The tree is built on the blocking pool with its own RNG drawn from the
    /// service RNG, so a seeded service stays reproducible.
    pub async fn optimize_vault_yield_with_budget(
        &self,
        vault_id: &str,
        state: VaultState,
        budget: SearchBudget,
    ) -> Result<OptimizationResult, OptimizerError> {
        let params = SearchParams::from(&*self.config.read().await);
        let search_seed: u64 = self.rng.lock().r#gen();
        let starting_yield = state.current_yield;

        self.latest_states.insert(vault_id.to_string(), state.clone());
        self.evict_stale_vaults(&self.latest_states, vault_id);
        info!(
            "Optimizing vault {} with {} iterations (c = {:.4})",
            vault_id, params.iterations, params.exploration_constant
        );

        let target = vault_id.to_string();
        let result = tokio::task::spawn_blocking(move || {
            let mut rng = StdRng::seed_from_u64(search_seed);
            let mut search = MctsSearch::new(state, params);
            search.run(&mut rng, &budget)?;
            search.recommendation(&target)
        })
        .await
        .map_err(|e| OptimizerError::SearchTask(e.to_string()))??;

        {
            let mut totals = self.totals.lock();
            totals.count += 1;
            totals.improvement_sum += result.expected_outcome.current_yield - starting_yield;
            if result.stats.iterations_completed > 0 {
                totals.efficiency_sum +=
                    result.stats.best_action_visits as f64 / result.stats.iterations_completed as f64;
            }
        }

        info!(
            "Recommended {} for vault {} (confidence {:.3}, {} alternatives)",
            result.recommended_action.id,
            vault_id,
            result.confidence,
            result.alternative_actions.len()
        );
        self.latest_recommendations.insert(vault_id.to_string(), result.clone());
        self.evict_stale_vaults(&self.latest_recommendations, vault_id);
        Ok(result)
    }

    /// Trim `cache` back to capacity.
    ///
    /// Vaults with a queued priority request are dropped last and `current`
    /// is never dropped.
    fn evict_stale_vaults<V>(&self, cache: &DashMap<String, V>, current: &str) {
        if cache.len() <= self.latest_state_capacity {
            return;
        }

        let pending: HashSet<String> = self
            .priority_queue
            .lock()
            .iter()
            .map(|action| action.target_vault.clone())
            .collect();

        let mut candidates: Vec<(bool, String)> = cache
            .iter()
            .filter(|entry| entry.key().as_str() != current)
            .map(|entry| (pending.contains(entry.key()), entry.key().clone()))
            .collect();
        // Unqueued vaults first
        candidates.sort_by_key(|(queued, _)| *queued);

        let excess = cache.len().saturating_sub(self.latest_state_capacity);
        for (_, vault_id) in candidates.into_iter().take(excess) {
            cache.remove(&vault_id);
        }
        debug!("Evicted {} cached vault entries", excess);
    }

    /// Record feedback and update the reporting agent
    pub async fn process_reinforcement_learning_feedback(&self, feedback: ReinforcementLearningFeedback) {
        self.feedback_history.write().await.push(feedback.clone());
        self.learn_from(&feedback).await;
    }

    async fn learn_from(&self, feedback: &ReinforcementLearningFeedback) -> bool {
        let decay = self.config.read().await.exploration_decay;

        let update = {
            let mut agents = self.agents.write().await;
            let Some(agent) = agents.get_mut(&feedback.agent_id) else {
                debug!("Ignoring feedback {} for unknown agent {}", feedback.id, feedback.agent_id);
                return false;
            };
            let mut rng = self.rng.lock();
            apply_feedback(agent, feedback, decay, &mut *rng)
        };

        let mut config = self.config.write().await;
        let previous = config.exploration_constant;
        config.exploration_constant = adjust_exploration_constant(previous, update.success_ratio);
        debug!(
            "Feedback {} for {}: prediction error {:.4}, success ratio {:.2}, exploration {:.4} -> {:.4}",
            feedback.id,
            feedback.agent_id,
            update.prediction_error,
            update.success_ratio,
            previous,
            config.exploration_constant
        );
        true
    }

    /// Replay the most recent feedback records; returns how many reached an agent
    pub async fn process_feedback_batch(&self) -> usize {
        let batch = self.feedback_history.read().await.recent(FEEDBACK_BATCH_SIZE);
        if batch.is_empty() {
            debug!("No feedback to replay");
            return 0;
        }

        let mut applied = 0;
        for feedback in &batch {
            if self.learn_from(feedback).await {
                applied += 1;
            }
        }
        info!("Replayed {} of {} feedback records", applied, batch.len());
        applied
    }

    pub async fn coordinate_hierarchical_agents(&self) -> CoordinationSummary {
        let summary = self.agents.write().await.coordinate();
        info!(
            "Agent coordination complete: {} sector and {} vault updates",
            summary.sector_updates, summary.vault_updates
        );
        summary
    }

    /// All agents, highest confidence first
    pub async fn get_hierarchical_agents(&self) -> Vec<HierarchicalAgent> {
        self.agents.read().await.sorted_by_confidence()
    }

    pub async fn get_agent_performance(&self, agent_id: &str) -> Option<AgentPerformance> {
        self.agents
            .read()
            .await
            .get(agent_id)
            .map(|agent| agent.performance.clone())
    }

    pub async fn algorithm_config(&self) -> AlgorithmConfig {
        self.config.read().await.clone()
    }

    /// Merge `patch` into the configuration; nothing changes if the result is invalid
    pub async fn update_algorithm_configuration(
        &self,
        patch: AlgorithmConfigPatch,
    ) -> Result<AlgorithmConfig, OptimizerError> {
        let mut config = self.config.write().await;
        let mut candidate = config.clone();
        candidate.apply(&patch);

        if let Err(e) = candidate.validate() {
            warn!("Rejected configuration update: {}", e);
            return Err(e);
        }

        *config = candidate.clone();
        info!("Algorithm configuration updated");
        Ok(candidate)
    }

    pub async fn get_historical_pattern<S: AsRef<str>>(&self, sequence: &[S]) -> Option<PatternData> {
        self.patterns.read().await.search(sequence).cloned()
    }

    pub async fn record_historical_pattern<S: AsRef<str>>(&self, sequence: &[S], data: PatternData) {
        self.patterns.write().await.insert(sequence, data);
    }

    /// Highest daily yield between `start_day` and `end_day` inclusive.
    ///
    /// The window is clamped to the recorded series; an empty window yields 0.0.
    pub fn get_yield_in_time_window(&self, start_day: usize, end_day: usize) -> f64 {
        let len = self.yield_history.len();
        if len == 0 || start_day > end_day || start_day >= len {
            return 0.0;
        }
        self.yield_history.query(start_day, end_day.min(len - 1))
    }

    pub fn yield_history_days(&self) -> usize {
        self.yield_history.len()
    }

    pub async fn get_ecosystem_connections(&self, node_id: &str) -> Vec<String> {
        self.ecosystem.read().await.connections(node_id)
    }

    pub async fn add_ecosystem_node(&self, node: EcosystemNode) {
        self.ecosystem.write().await.add_node(node);
    }

    pub async fn ecosystem_matrix(&self) -> AdjacencyMatrix {
        self.ecosystem.read().await.adjacency_matrix()
    }

    pub fn get_vault_cluster(&self, vault_id: &str) -> Vec<String> {
        self.vault_clusters.lock().cluster(vault_id)
    }

    pub fn link_vaults(&self, a: &str, b: &str) -> bool {
        self.vault_clusters.lock().union(a, b)
    }

    /// Queue a rebalance for `vault_id`; returns the queued entry
    pub fn add_priority_optimization(&self, vault_id: &str, urgency: Urgency) -> PriorityAction {
        let action = build_priority_action(vault_id, PRIORITY_AGENT_ID, urgency, Utc::now());
        let mut queue = self.priority_queue.lock();
        queue.push(action.clone());
        info!(
            "Queued {:?} optimization for vault {} ({} pending)",
            urgency,
            vault_id,
            queue.len()
        );
        action
    }

    pub fn next_priority_optimization(&self) -> Option<PriorityAction> {
        self.priority_queue.lock().pop_front()
    }

    pub fn pending_priority_optimizations(&self) -> usize {
        self.priority_queue.lock().len()
    }

    /// Last state submitted for `vault_id`
    pub fn latest_vault_state(&self, vault_id: &str) -> Option<VaultState> {
        self.latest_states.get(vault_id).map(|entry| entry.value().clone())
    }

    pub fn latest_recommendation(&self, vault_id: &str) -> Option<OptimizationResult> {
        self.latest_recommendations
            .get(vault_id)
            .map(|entry| entry.value().clone())
    }

    pub async fn get_algorithm_metrics(&self) -> AlgorithmMetrics {
        let (total_optimizations, average_improvement, mcts_efficiency) = {
            let totals = self.totals.lock();
            if totals.count == 0 {
                (0, 0.0, 0.0)
            } else {
                let n = totals.count as f64;
                (totals.count, totals.improvement_sum / n, totals.efficiency_sum / n)
            }
        };

        let agent_performance = self
            .agents
            .read()
            .await
            .iter()
            .map(|agent| AgentPerformanceSummary {
                agent_id: agent.id.clone(),
                name: agent.name.clone(),
                tier: agent.tier.label().to_string(),
                confidence: agent.confidence,
                performance: agent.performance.clone(),
            })
            .collect();

        let rl_accuracy = self.feedback_history.read().await.positive_ratio();

        AlgorithmMetrics {
            total_optimizations,
            average_improvement,
            agent_performance,
            mcts_efficiency,
            rl_accuracy,
        }
    }

    pub async fn feedback_history_len(&self) -> usize {
        self.feedback_history.read().await.len()
    }
}

fn seed_patterns() -> PrefixTrie {
    let patterns = [
        (
            vec!["stake", "lock", "ritual"],
            json!({ "successRate": 0.85, "averageYield": 0.15, "ecologicalImpact": 0.7 }),
        ),
        (
            vec!["lock", "ritual"],
            json!({ "successRate": 0.78, "averageYield": 0.11, "ecologicalImpact": 0.82 }),
        ),
        (
            vec!["blend", "stake"],
            json!({ "successRate": 0.72, "averageYield": 0.13, "ecologicalImpact": 0.55 }),
        ),
        (
            vec!["ritual", "blend", "lock"],
            json!({ "successRate": 0.81, "averageYield": 0.12, "ecologicalImpact": 0.9 }),
        ),
    ];

    let mut trie = PrefixTrie::new();
    for (sequence, data) in patterns {
        if let serde_json::Value::Object(map) = data {
            trie.insert(sequence.as_slice(), map);
        }
    }
    trie
}

fn seed_vault_clusters() -> DisjointSet {
    let mut clusters = DisjointSet::new();
    for vault in ["vault_regen_001", "vault_liquidity_002", "vault_eco_003", "vault_stable_004"] {
        clusters.make_set(vault);
    }
    clusters.union("vault_regen_001", "vault_eco_003");
    clusters.union("vault_liquidity_002", "vault_stable_004");
    clusters
}

/// Daily yields with a yearly cycle around 8% plus noise
fn seed_yield_series<R: Rng + ?Sized>(rng: &mut R) -> Vec<f64> {
    (0..YIELD_SERIES_DAYS)
        .map(|day| {
            let season = (2.0 * PI * day as f64 / YIELD_SERIES_DAYS as f64).sin();
            0.08 + 0.04 * season + rng.gen_range(-0.01..0.01)
        })
        .collect()
}

fn seed_ecosystem<R: Rng + ?Sized>(rng: &mut R) -> EcosystemGraph {
    let nodes = [
        ("protocol_aave", "protocol", vec!["protocol_uniswap", "dao_regen"]),
        ("protocol_uniswap", "protocol", vec!["protocol_aave"]),
        ("dao_regen", "dao", vec!["validator_eco", "protocol_aave"]),
        ("validator_eco", "validator", vec!["dao_regen"]),
        ("community_stewards", "community", vec!["dao_regen"]),
    ];

    let mut graph = EcosystemGraph::new();
    for (id, kind, connections) in nodes {
        graph.add_node(EcosystemNode {
            id: id.to_string(),
            kind: kind.to_string(),
            influence: rng.gen_range(0.3..1.0),
            trust: rng.gen_range(0.5..1.0),
            connections: connections.into_iter().map(str::to_string).collect(),
        });
    }
    graph
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimizer::mcts::CancelFlag;
    use crate::optimizer::model::tests::sample_state;
    use crate::optimizer::types::ExpectedImpact;

    fn seeded(seed: u64, iterations: usize) -> YieldOptimizer {
        YieldOptimizer::new(OptimizerSettings {
            algorithm: AlgorithmConfig {
                mcts_iterations: iterations,
                ..AlgorithmConfig::default()
            },
            feedback_history_capacity: 100,
            latest_state_capacity: LATEST_STATE_CAPACITY,
            seed: Some(seed),
        })
    }

    fn feedback(agent_id: &str, reward: f64) -> ReinforcementLearningFeedback {
        ReinforcementLearningFeedback {
            id: format!("fb-{agent_id}-{reward}"),
            agent_id: agent_id.to_string(),
            action_id: "lock_90d".to_string(),
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
            learning_signal: vec![1.0; 10],
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_seeded_services_recommend_identically() {
        let a = seeded(42, 200)
            .optimize_vault_yield("vault_regen_001", sample_state())
            .await
            .unwrap();
        let b = seeded(42, 200)
            .optimize_vault_yield("vault_regen_001", sample_state())
            .await
            .unwrap();

        assert_eq!(a.recommended_action.id, b.recommended_action.id);
        assert_eq!(a.stats.tree_size, b.stats.tree_size);
        assert_eq!(a.stats.best_action_visits, b.stats.best_action_visits);
        assert_eq!(a.stats.iterations_completed, 200);
    }

    #[tokio::test]
    async fn test_optimization_updates_metrics_and_latest_state() {
        let optimizer = seeded(1, 100);
        optimizer
            .optimize_vault_yield("vault_regen_001", sample_state())
            .await
            .unwrap();

        let metrics = optimizer.get_algorithm_metrics().await;
        assert_eq!(metrics.total_optimizations, 1);
        assert!(metrics.mcts_efficiency > 0.0 && metrics.mcts_efficiency <= 1.0);
        assert_eq!(metrics.agent_performance.len(), 5);
        assert!(optimizer.latest_vault_state("vault_regen_001").is_some());
        assert!(optimizer.latest_recommendation("vault_regen_001").is_some());
    }

    #[tokio::test]
    async fn test_vault_caches_stay_bounded() {
        let optimizer = YieldOptimizer::new(OptimizerSettings {
            algorithm: AlgorithmConfig {
                mcts_iterations: 2,
                ..AlgorithmConfig::default()
            },
            latest_state_capacity: 8,
            seed: Some(11),
            ..OptimizerSettings::default()
        });
        optimizer.add_priority_optimization("v0", Urgency::High);

        for i in 0..40 {
            optimizer
                .optimize_vault_yield(&format!("v{i}"), sample_state())
                .await
                .unwrap();
        }

        assert_eq!(optimizer.latest_states.len(), 8);
        assert_eq!(optimizer.latest_recommendations.len(), 8);
        // Queued vault survives, newest is always present
        assert!(optimizer.latest_vault_state("v0").is_some());
        assert!(optimizer.latest_recommendation("v0").is_some());
        assert!(optimizer.latest_vault_state("v39").is_some());
        assert!(optimizer.latest_recommendation("v39").is_some());
        assert_eq!(optimizer.get_algorithm_metrics().await.total_optimizations, 40);
    }

    #[tokio::test]
    async fn test_cancelled_budget_surfaces_error() {
        let optimizer = seeded(1, 100);
        let flag = CancelFlag::new();
        flag.cancel();

        let result = optimizer
            .optimize_vault_yield_with_budget(
                "vault_regen_001",
                sample_state(),
                SearchBudget::default().with_cancel(flag),
            )
            .await;

        assert!(matches!(result, Err(OptimizerError::Cancelled { completed: 0 })));
        assert_eq!(optimizer.get_algorithm_metrics().await.total_optimizations, 0);
    }

    #[tokio::test]
    async fn test_expired_deadline_returns_partial_result() {
        let optimizer = seeded(1, 100);

        let result = optimizer
            .optimize_vault_yield_with_budget(
                "vault_regen_001",
                sample_state(),
                SearchBudget::default().with_deadline(std::time::Instant::now()),
            )
            .await
            .unwrap();

        assert_eq!(result.stats.iterations_completed, 1);
        assert_eq!(result.vault_id, "vault_regen_001");
        assert_eq!(optimizer.get_algorithm_metrics().await.total_optimizations, 1);
    }

    #[tokio::test]
    async fn test_terminal_state_has_no_action() {
        let optimizer = seeded(1, 50);
        let mut state = sample_state();
        state.community_trust = 0.05;

        let result = optimizer.optimize_vault_yield("vault_regen_001", state).await;
        assert!(matches!(result, Err(OptimizerError::NoActionFound(_))));
    }

    #[tokio::test]
    async fn test_feedback_adjusts_exploration_constant() {
        let optimizer = seeded(3, 10);
        let initial = optimizer.algorithm_config().await.exploration_constant;

        // First success: ratio 1.0 > 0.8
        optimizer
            .process_reinforcement_learning_feedback(feedback("vault_agent_001", 1.0))
            .await;
        let after_success = optimizer.algorithm_config().await.exploration_constant;
        assert!((after_success - initial * 0.99).abs() < 1e-12);

        // Failure drops the ratio to 0.5
        optimizer
            .process_reinforcement_learning_feedback(feedback("vault_agent_001", -1.0))
            .await;
        let after_failure = optimizer.algorithm_config().await.exploration_constant;
        assert!((after_failure - after_success * 1.01).abs() < 1e-12);

        let perf = optimizer.get_agent_performance("vault_agent_001").await.unwrap();
        assert_eq!(perf.total_decisions, 2);
        assert_eq!(perf.successful_decisions, 1);
    }

    #[tokio::test]
    async fn test_unknown_agent_feedback_is_recorded_but_ignored() {
        let optimizer = seeded(3, 10);
        let before = optimizer.algorithm_config().await.exploration_constant;

        optimizer
            .process_reinforcement_learning_feedback(feedback("ghost_agent", 1.0))
            .await;

        assert_eq!(optimizer.algorithm_config().await.exploration_constant, before);
        assert_eq!(optimizer.feedback_history_len().await, 1);
        assert!(optimizer.get_agent_performance("ghost_agent").await.is_none());
    }

    #[tokio::test]
    async fn test_batch_replays_without_reappending() {
        let optimizer = seeded(3, 10);
        for _ in 0..3 {
            optimizer
                .process_reinforcement_learning_feedback(feedback("vault_agent_002", 0.5))
                .await;
        }

        let applied = optimizer.process_feedback_batch().await;

        assert_eq!(applied, 3);
        assert_eq!(optimizer.feedback_history_len().await, 3);
        let perf = optimizer.get_agent_performance("vault_agent_002").await.unwrap();
        assert_eq!(perf.total_decisions, 6);
    }

    #[tokio::test]
    async fn test_agents_sorted_and_coordination_runs() {
        let optimizer = seeded(5, 10);
        let agents = optimizer.get_hierarchical_agents().await;
        assert_eq!(agents[0].id, "macro_global_001");
        assert!(agents.windows(2).all(|w| w[0].confidence >= w[1].confidence));

        let summary = optimizer.coordinate_hierarchical_agents().await;
        assert_eq!(summary.sector_updates, 2);
        // vault_agent_001 matches both sectors, vault_agent_002 only DeFi
        assert_eq!(summary.vault_updates, 3);
    }

    #[tokio::test]
    async fn test_invalid_configuration_is_rejected() {
        let optimizer = seeded(5, 10);

        let rejected = optimizer
            .update_algorithm_configuration(AlgorithmConfigPatch {
                mcts_iterations: Some(0),
                max_depth: Some(4),
                ..Default::default()
            })
            .await;
        assert!(matches!(rejected, Err(OptimizerError::Configuration(_))));
        assert_eq!(optimizer.algorithm_config().await.max_depth, 10);

        let updated = optimizer
            .update_algorithm_configuration(AlgorithmConfigPatch {
                max_depth: Some(4),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(updated.max_depth, 4);
        assert_eq!(updated.mcts_iterations, 10);
    }

    #[tokio::test]
    async fn test_priority_queue_drains_by_urgency() {
        let optimizer = seeded(5, 10);
        optimizer.add_priority_optimization("vault_a", Urgency::Low);
        optimizer.add_priority_optimization("vault_b", Urgency::Critical);
        optimizer.add_priority_optimization("vault_c", Urgency::High);

        assert_eq!(optimizer.pending_priority_optimizations(), 3);
        let order: Vec<String> = std::iter::from_fn(|| optimizer.next_priority_optimization())
            .map(|p| p.target_vault)
            .collect();
        assert_eq!(order, vec!["vault_b", "vault_c", "vault_a"]);
    }

    #[tokio::test]
    async fn test_seeded_indexes() {
        let optimizer = seeded(5, 10);

        let pattern = optimizer
            .get_historical_pattern(&["stake", "lock", "ritual"])
            .await
            .unwrap();
        assert_eq!(pattern["successRate"], 0.85);
        assert!(optimizer.get_historical_pattern(&["stake"]).await.is_none());

        assert_eq!(
            optimizer.get_vault_cluster("vault_eco_003"),
            vec!["vault_eco_003", "vault_regen_001"]
        );
        assert!(optimizer.link_vaults("vault_eco_003", "vault_stable_004"));
        assert_eq!(optimizer.get_vault_cluster("vault_regen_001").len(), 4);

        assert_eq!(
            optimizer.get_ecosystem_connections("dao_regen").await,
            vec!["validator_eco", "protocol_aave"]
        );
        let matrix = optimizer.ecosystem_matrix().await;
        assert!(matrix.is_connected("community_stewards", "dao_regen"));
    }

    #[tokio::test]
    async fn test_yield_window_clamps() {
        let optimizer = seeded(5, 10);
        assert_eq!(optimizer.yield_history_days(), 365);

        let full = optimizer.get_yield_in_time_window(0, 364);
        assert_eq!(optimizer.get_yield_in_time_window(0, 10_000), full);
        assert!(full > 0.0);
        assert_eq!(optimizer.get_yield_in_time_window(400, 500), 0.0);
        assert_eq!(optimizer.get_yield_in_time_window(20, 10), 0.0);
    }
}
