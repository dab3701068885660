use std::collections::BTreeMap;
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Share of a macro agent's confidence blended into each sector agent
const MACRO_INFLUENCE: f64 = 0.1;
/// Share of a sector agent's confidence blended into each matching vault agent
const SECTOR_INFLUENCE: f64 = 0.2;

/// Tier-specific payload of a hierarchical agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "tier", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum AgentTier {
    Macro {
        macro_trends: Vec<f64>,
        global_sentiment: f64,
    },
    Sector {
        sector: String,
        sector_metrics: BTreeMap<String, f64>,
    },
    Vault {
        vault_id: String,
        specialized_strategies: Vec<String>,
        local_knowledge: BTreeMap<String, f64>,
    },
}

impl AgentTier {
    pub fn label(&self) -> &'static str {
        match self {
            AgentTier::Macro { .. } => "macro",
            AgentTier::Sector { .. } => "sector",
            AgentTier::Vault { .. } => "vault",
        }
    }

    /// Length of the weight vector an agent of this tier carries
    pub fn weight_len(&self) -> usize {
        match self {
            AgentTier::Macro { .. } => 20,
            AgentTier::Sector { .. } => 15,
            AgentTier::Vault { .. } => 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentPerformance {
    pub total_decisions: u64,
    pub successful_decisions: u64,
    pub average_yield_improvement: f64,
    pub average_ecological_impact: f64,
    pub risk_adjusted_return: f64,
    pub learning_rate: f64,
    pub exploration_rate: f64,
}

impl AgentPerformance {
    pub fn new(learning_rate: f64, exploration_rate: f64) -> Self {
        Self {
            total_decisions: 0,
            successful_decisions: 0,
            average_yield_improvement: 0.0,
            average_ecological_impact: 0.0,
            risk_adjusted_return: 0.0,
            learning_rate,
            exploration_rate,
        }
    }

    pub fn success_ratio(&self) -> f64 {
        if self.total_decisions == 0 {
            0.0
        } else {
            self.successful_decisions as f64 / self.total_decisions as f64
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HierarchicalAgent {
    pub id: String,
    pub name: String,
    pub expertise: Vec<String>,
    pub decision_scope: String,
    /// Confidence in [0, 1]
    pub confidence: f64,
    pub performance: AgentPerformance,
    pub neural_weights: Vec<f64>,
    pub last_update: DateTime<Utc>,
    pub is_active: bool,
    #[serde(flatten)]
    pub tier: AgentTier,
}

impl HierarchicalAgent {
    pub fn is_macro(&self) -> bool {
        matches!(self.tier, AgentTier::Macro { .. })
    }

    pub fn is_sector(&self) -> bool {
        matches!(self.tier, AgentTier::Sector { .. })
    }

    pub fn is_vault(&self) -> bool {
        matches!(self.tier, AgentTier::Vault { .. })
    }

    pub fn shares_expertise(&self, expertise: &[String]) -> bool {
        self.expertise.iter().any(|tag| expertise.contains(tag))
    }

    pub fn vault_id(&self) -> Option<&str> {
        match &self.tier {
            AgentTier::Vault { vault_id, .. } => Some(vault_id),
            _ => None,
        }
    }
}

/// Blueprint used to seed an agent with randomly initialized weights
pub struct AgentSeed<'a> {
    pub id: &'a str,
    pub name: &'a str,
    pub expertise: &'a [&'a str],
    pub decision_scope: &'a str,
    pub confidence: f64,
    pub tier: AgentTier,
}

impl AgentSeed<'_> {
    pub fn build<R: Rng + ?Sized>(self, rng: &mut R, learning_rate: f64, exploration_rate: f64) -> HierarchicalAgent {
        let neural_weights = (0..self.tier.weight_len())
            .map(|_| rng.gen_range(-0.1..0.1))
            .collect();

        HierarchicalAgent {
            id: self.id.to_string(),
            name: self.name.to_string(),
            expertise: self.expertise.iter().map(|s| s.to_string()).collect(),
            decision_scope: self.decision_scope.to_string(),
            confidence: self.confidence,
            performance: AgentPerformance::new(learning_rate, exploration_rate),
            neural_weights,
            last_update: Utc::now(),
            is_active: true,
            tier: self.tier,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CoordinationSummary {
    pub sector_updates: usize,
    pub vault_updates: usize,
}

/// Agent population kept in insertion order
#[derive(Debug, Clone, Default)]
pub struct AgentRegistry {
    agents: Vec<HierarchicalAgent>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an agent, replacing any existing agent with the same id
    pub fn insert(&mut self, agent: HierarchicalAgent) {
        match self.agents.iter_mut().find(|a| a.id == agent.id) {
            Some(existing) => *existing = agent,
            None => self.agents.push(agent),
        }
    }

    pub fn get(&self, id: &str) -> Option<&HierarchicalAgent> {
        self.agents.iter().find(|a| a.id == id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut HierarchicalAgent> {
        self.agents.iter_mut().find(|a| a.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &HierarchicalAgent> {
        self.agents.iter()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// All agents ordered by confidence, highest first
    pub fn sorted_by_confidence(&self) -> Vec<HierarchicalAgent> {
        let mut agents = self.agents.clone();
        agents.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        agents
    }

    /// Propagate confidence top-down: macro → sector → vault.
    ///
    /// Blending is applied once per influencing agent, so several macro agents
    /// (or several matching sector agents) compound on the same target.
    pub fn coordinate(&mut self) -> CoordinationSummary {
        let now = Utc::now();
        let mut summary = CoordinationSummary::default();

        let macro_confidences: Vec<f64> = self
            .agents
            .iter()
            .filter(|a| a.is_macro())
            .map(|a| a.confidence)
            .collect();

        for sector in self.agents.iter_mut().filter(|a| a.is_sector()) {
            for macro_confidence in &macro_confidences {
                sector.confidence = sector.confidence * (1.0 - MACRO_INFLUENCE) + macro_confidence * MACRO_INFLUENCE;
                summary.sector_updates += 1;
            }
            if !macro_confidences.is_empty() {
                sector.last_update = now;
            }
        }

        let sectors: Vec<(Vec<String>, f64)> = self
            .agents
            .iter()
            .filter(|a| a.is_sector())
            .map(|a| (a.expertise.clone(), a.confidence))
            .collect();

        for vault in self.agents.iter_mut().filter(|a| a.is_vault()) {
            let mut touched = false;
            for (expertise, sector_confidence) in &sectors {
                if vault.shares_expertise(expertise) {
                    vault.confidence = vault.confidence * (1.0 - SECTOR_INFLUENCE) + sector_confidence * SECTOR_INFLUENCE;
                    summary.vault_updates += 1;
                    touched = true;
                }
            }
            if touched {
                vault.last_update = now;
            }
        }

        debug!(
            "Coordination pass: {} sector blends, {} vault blends",
            summary.sector_updates, summary.vault_updates
        );
        summary
    }

    /// Initial agent population: one macro, two sector and two vault agents
    pub fn seeded<R: Rng + ?Sized>(rng: &mut R, learning_rate: f64, exploration_rate: f64) -> Self {
        let seeds = [
            AgentSeed {
                id: "macro_global_001",
                name: "Global Macro Strategist",
                expertise: &["macro_trends", "interest_rates", "global_liquidity"],
                decision_scope: "global",
                confidence: 0.85,
                tier: AgentTier::Macro {
                    macro_trends: vec![0.02, 0.015, -0.01, 0.03],
                    global_sentiment: 0.65,
                },
            },
            AgentSeed {
                id: "sector_defi_001",
                name: "DeFi Yield Specialist",
                expertise: &["defi", "yield_farming", "liquidity_pools"],
                decision_scope: "sector",
                confidence: 0.78,
                tier: AgentTier::Sector {
                    sector: "defi".to_string(),
                    sector_metrics: BTreeMap::from([
                        ("tvl_growth".to_string(), 0.12),
                        ("average_apy".to_string(), 0.085),
                        ("protocol_risk".to_string(), 0.3),
                    ]),
                },
            },
            AgentSeed {
                id: "sector_eco_001",
                name: "Sustainability Analyst",
                expertise: &["sustainability", "ecological_impact", "carbon_credits"],
                decision_scope: "sector",
                confidence: 0.72,
                tier: AgentTier::Sector {
                    sector: "sustainability".to_string(),
                    sector_metrics: BTreeMap::from([
                        ("carbon_offset_rate".to_string(), 0.45),
                        ("biodiversity_index".to_string(), 0.62),
                        ("regulatory_pressure".to_string(), 0.55),
                    ]),
                },
            },
            AgentSeed {
                id: "vault_agent_001",
                name: "Regenerative Vault Agent",
                expertise: &["yield_farming", "ecological_impact"],
                decision_scope: "vault",
                confidence: 0.70,
                tier: AgentTier::Vault {
                    vault_id: "vault_regen_001".to_string(),
                    specialized_strategies: vec!["lock".to_string(), "ritual".to_string()],
                    local_knowledge: BTreeMap::from([
                        ("historical_apy".to_string(), 0.11),
                        ("community_engagement".to_string(), 0.8),
                    ]),
                },
            },
            AgentSeed {
                id: "vault_agent_002",
                name: "Liquidity Vault Agent",
                expertise: &["liquidity_pools", "defi"],
                decision_scope: "vault",
                confidence: 0.68,
                tier: AgentTier::Vault {
                    vault_id: "vault_liquidity_002".to_string(),
                    specialized_strategies: vec!["stake".to_string(), "blend".to_string()],
                    local_knowledge: BTreeMap::from([
                        ("historical_apy".to_string(), 0.07),
                        ("liquidity_depth".to_string(), 0.92),
                    ]),
                },
            },
        ];

        let mut registry = Self::new();
        for seed in seeds {
            registry.insert(seed.build(rng, learning_rate, exploration_rate));
        }
        registry
    }
}
