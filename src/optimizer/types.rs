use std::collections::BTreeMap;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Point-in-time snapshot of a single vault
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultState {
    pub vault_id: String,
    pub current_yield: f64,
    pub ecological_impact: f64,
    /// Stake duration in days
    pub stake_duration: u32,
    pub moat_score: f64,
    pub ritual_validation: f64,
    pub agent_confidence: f64,
    pub eco_risk_adjusted_return: f64,
    pub token_liquidity: f64,
    pub community_trust: f64,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolId {
    HighYield,
    Balanced,
    Conservative,
}

impl PoolId {
    pub const ALL: [PoolId; 3] = [PoolId::HighYield, PoolId::Balanced, PoolId::Conservative];

    pub fn as_str(&self) -> &'static str {
        match self {
            PoolId::HighYield => "high_yield",
            PoolId::Balanced => "balanced",
            PoolId::Conservative => "conservative",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RitualKind {
    CommunityValidation,
    ExpertReview,
    EcologicalAudit,
}

impl RitualKind {
    pub const ALL: [RitualKind; 3] = [
        RitualKind::CommunityValidation,
        RitualKind::ExpertReview,
        RitualKind::EcologicalAudit,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RitualKind::CommunityValidation => "community_validation",
            RitualKind::ExpertReview => "expert_review",
            RitualKind::EcologicalAudit => "ecological_audit",
        }
    }
}

/// Action type together with its type-specific parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ActionKind {
    Lock { duration_days: u32 },
    Stake { amount: f64, pool: PoolId },
    Blend { ratios: BTreeMap<String, f64> },
    Ritual { ritual: RitualKind },
    Liquidate { amount: f64 },
    Rebalance { target_allocation: BTreeMap<String, f64> },
}

impl ActionKind {
    pub fn label(&self) -> &'static str {
        match self {
            ActionKind::Lock { .. } => "lock",
            ActionKind::Stake { .. } => "stake",
            ActionKind::Blend { .. } => "blend",
            ActionKind::Ritual { .. } => "ritual",
            ActionKind::Liquidate { .. } => "liquidate",
            ActionKind::Rebalance { .. } => "rebalance",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpectedImpact {
    pub yield_change: f64,
    pub risk_change: f64,
    pub ecological_impact: f64,
    #[serde(default)]
    pub time_horizon_days: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultAction {
    pub id: String,
    #[serde(flatten)]
    pub kind: ActionKind,
    pub expected_impact: ExpectedImpact,
    pub cost: f64,
    /// Confidence in [0, 1]
    pub confidence: f64,
}

/// Reward weights applied by the state evaluator
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardWeights {
    pub yield_weight: f64,
    pub ecology_weight: f64,
    pub risk_weight: f64,
    pub trust_weight: f64,
    pub moat_weight: f64,
}

impl Default for RewardWeights {
    fn default() -> Self {
        Self {
            yield_weight: 0.30,
            ecology_weight: 0.25,
            risk_weight: 0.20,
            trust_weight: 0.15,
            moat_weight: 0.10,
        }
    }
}

/// Shared tuning knobs for search and learning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlgorithmConfig {
    pub mcts_iterations: usize,
    pub exploration_constant: f64,
    pub max_depth: usize,
    pub simulation_depth: usize,
    pub discount_factor: f64,
    /// Learning rate given to agents at seeding time
    pub learning_rate: f64,
    pub exploration_decay: f64,
    pub reward_weights: RewardWeights,
}

impl Default for AlgorithmConfig {
    fn default() -> Self {
        Self {
            mcts_iterations: 1000,
            exploration_constant: std::f64::consts::SQRT_2,
            max_depth: 10,
            simulation_depth: 50,
            discount_factor: 0.95,
            learning_rate: 0.01,
            exploration_decay: 0.995,
            reward_weights: RewardWeights::default(),
        }
    }
}

impl AlgorithmConfig {
    pub fn validate(&self) -> Result<(), OptimizerError> {
        if self.mcts_iterations == 0 {
            return Err(OptimizerError::Configuration("mctsIterations must be at least 1".to_string()));
        }
        if self.max_depth == 0 || self.simulation_depth == 0 {
            return Err(OptimizerError::Configuration(
                "maxDepth and simulationDepth must be at least 1".to_string(),
            ));
        }
        if !(self.exploration_constant.is_finite() && self.exploration_constant >= 0.0) {
            return Err(OptimizerError::Configuration(
                "explorationConstant must be a finite non-negative number".to_string(),
            ));
        }
        if !(self.discount_factor > 0.0 && self.discount_factor <= 1.0) {
            return Err(OptimizerError::Configuration("discountFactor must be in (0, 1]".to_string()));
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(OptimizerError::Configuration("learningRate must be positive".to_string()));
        }
        if !(self.exploration_decay > 0.0 && self.exploration_decay <= 1.0) {
            return Err(OptimizerError::Configuration("explorationDecay must be in (0, 1]".to_string()));
        }
        let w = &self.reward_weights;
        let weights = [w.yield_weight, w.ecology_weight, w.risk_weight, w.trust_weight, w.moat_weight];
        if weights.iter().any(|v| !v.is_finite()) {
            return Err(OptimizerError::Configuration("reward weights must be finite".to_string()));
        }
        Ok(())
    }

    /// Merge a partial update onto this configuration
    pub fn apply(&mut self, patch: &AlgorithmConfigPatch) {
        if let Some(v) = patch.mcts_iterations {
            self.mcts_iterations = v;
        }
        if let Some(v) = patch.exploration_constant {
            self.exploration_constant = v;
        }
        if let Some(v) = patch.max_depth {
            self.max_depth = v;
        }
        if let Some(v) = patch.simulation_depth {
            self.simulation_depth = v;
        }
        if let Some(v) = patch.discount_factor {
            self.discount_factor = v;
        }
        if let Some(v) = patch.learning_rate {
            self.learning_rate = v;
        }
        if let Some(v) = patch.exploration_decay {
            self.exploration_decay = v;
        }
        if let Some(w) = &patch.reward_weights {
            let target = &mut self.reward_weights;
            if let Some(v) = w.yield_weight {
                target.yield_weight = v;
            }
            if let Some(v) = w.ecology_weight {
                target.ecology_weight = v;
            }
            if let Some(v) = w.risk_weight {
                target.risk_weight = v;
            }
            if let Some(v) = w.trust_weight {
                target.trust_weight = v;
            }
            if let Some(v) = w.moat_weight {
                target.moat_weight = v;
            }
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardWeightsPatch {
    pub yield_weight: Option<f64>,
    pub ecology_weight: Option<f64>,
    pub risk_weight: Option<f64>,
    pub trust_weight: Option<f64>,
    pub moat_weight: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlgorithmConfigPatch {
    pub mcts_iterations: Option<usize>,
    pub exploration_constant: Option<f64>,
    pub max_depth: Option<usize>,
    pub simulation_depth: Option<usize>,
    pub discount_factor: Option<f64>,
    pub learning_rate: Option<f64>,
    pub exploration_decay: Option<f64>,
    pub reward_weights: Option<RewardWeightsPatch>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchStats {
    pub iterations_completed: usize,
    pub tree_size: usize,
    pub root_visits: u64,
    pub best_action_visits: u64,
    pub elapsed_ms: u64,
}

/// Recommendation produced by a single search run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizationResult {
    pub vault_id: String,
    pub recommended_action: VaultAction,
    pub confidence: f64,
    pub expected_outcome: VaultState,
    pub alternative_actions: Vec<VaultAction>,
    pub stats: SearchStats,
}

fn new_record_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Observed vs. expected outcome for one agent decision
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReinforcementLearningFeedback {
    #[serde(default = "new_record_id")]
    pub id: String,
    pub agent_id: String,
    pub action_id: String,
    pub expected_outcome: ExpectedImpact,
    pub actual_outcome: ExpectedImpact,
    pub reward: f64,
    #[serde(default)]
    pub learning_signal: Vec<f64>,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Critical,
    High,
    Medium,
    Low,
}

impl Urgency {
    pub fn priority(&self) -> u32 {
        match self {
            Urgency::Critical => 100,
            Urgency::High => 80,
            Urgency::Medium => 60,
            Urgency::Low => 40,
        }
    }

    pub fn deadline_hours(&self) -> i64 {
        match self {
            Urgency::Critical => 1,
            Urgency::High => 6,
            Urgency::Medium | Urgency::Low => 24,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriorityAction {
    pub id: String,
    pub agent_id: String,
    pub action: VaultAction,
    pub priority: u32,
    pub urgency: Urgency,
    pub deadline: DateTime<Utc>,
    pub target_vault: String,
}

#[derive(Debug, Error)]
pub enum OptimizerError {
    #[error("MCTS failed to find a valid action for vault {0}")]
    NoActionFound(String),

    #[error("search cancelled after {completed} iterations")]
    Cancelled { completed: usize },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Search task failed: {0}")]
    SearchTask(String),
}
