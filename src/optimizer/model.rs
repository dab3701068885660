//! Vault state transition model.
//!
//! Defines the search problem the planner works on: the fixed action grid,
//! the deterministic effect of each action on a [`VaultState`], the terminal
//! test and the weighted reward.

use std::collections::BTreeMap;

use crate::optimizer::types::{
    ActionKind, ExpectedImpact, PoolId, RewardWeights, RitualKind, VaultAction, VaultState,
};

/// Lock durations offered by the action grid, in days
pub const LOCK_DURATIONS: [u32; 5] = [30, 90, 180, 365, 730];

/// 5 lock + 3 stake + 3 ritual + 1 blend
pub const ACTION_GRID_SIZE: usize = LOCK_DURATIONS.len() + PoolId::ALL.len() + RitualKind::ALL.len() + 1;

const STAKE_AMOUNT: f64 = 1000.0;

// Per-step entropy applied after every action
const YIELD_DECAY: f64 = 0.998;
const ECOLOGY_DECAY: f64 = 0.999;
const CONFIDENCE_DECAY: f64 = 0.995;

const TRUST_FLOOR: f64 = 0.1;

/// Enumerate every action available from `state`.
///
/// The grid is fixed, so the returned list always holds
/// [`ACTION_GRID_SIZE`] actions in the order lock, stake, ritual, blend.
pub fn generate_possible_actions(_state: &VaultState) -> Vec<VaultAction> {
    (0..ACTION_GRID_SIZE).map(grid_action).collect()
}

/// Build the action at position `index` of the grid.
///
/// Rollouts use this to draw a uniformly random action without
/// materializing the whole grid on every step.
pub fn grid_action(index: usize) -> VaultAction {
    let stake_start = LOCK_DURATIONS.len();
    let ritual_start = stake_start + PoolId::ALL.len();
    let blend_start = ritual_start + RitualKind::ALL.len();

    if index < stake_start {
        lock_action(LOCK_DURATIONS[index])
    } else if index < ritual_start {
        stake_action(PoolId::ALL[index - stake_start])
    } else if index < blend_start {
        ritual_action(RitualKind::ALL[index - ritual_start])
    } else {
        blend_action()
    }
}

pub fn lock_action(duration_days: u32) -> VaultAction {
    let years = duration_days as f64 / 365.0;
    VaultAction {
        id: format!("lock_{}d", duration_days),
        kind: ActionKind::Lock { duration_days },
        expected_impact: ExpectedImpact {
            yield_change: 0.005 + 0.02 * years,
            risk_change: 0.01 * years,
            ecological_impact: 0.0,
            time_horizon_days: duration_days,
        },
        cost: 0.0005 * (duration_days as f64 / 30.0),
        confidence: 0.9 - 0.1 * (duration_days as f64 / 730.0),
    }
}

pub fn stake_action(pool: PoolId) -> VaultAction {
    let (yield_change, risk_change, cost, confidence) = match pool {
        PoolId::HighYield => (0.05, 0.08, 0.01, 0.7),
        PoolId::Balanced => (0.03, 0.04, 0.005, 0.8),
        PoolId::Conservative => (0.015, 0.01, 0.002, 0.9),
    };
    VaultAction {
        id: format!("stake_{}", pool.as_str()),
        kind: ActionKind::Stake { amount: STAKE_AMOUNT, pool },
        expected_impact: ExpectedImpact {
            yield_change,
            risk_change,
            ecological_impact: 0.0,
            time_horizon_days: 90,
        },
        cost,
        confidence,
    }
}

pub fn ritual_action(ritual: RitualKind) -> VaultAction {
    let (ecological_impact, cost) = match ritual {
        RitualKind::CommunityValidation => (0.02, 0.003),
        RitualKind::ExpertReview => (0.01, 0.005),
        RitualKind::EcologicalAudit => (0.05, 0.008),
    };
    VaultAction {
        id: format!("ritual_{}", ritual.as_str()),
        kind: ActionKind::Ritual { ritual },
        expected_impact: ExpectedImpact {
            yield_change: 0.0,
            risk_change: -0.02,
            ecological_impact,
            time_horizon_days: 30,
        },
        cost,
        confidence: 0.85,
    }
}

pub fn blend_action() -> VaultAction {
    let ratios = BTreeMap::from([
        (PoolId::HighYield.as_str().to_string(), 0.4),
        (PoolId::Balanced.as_str().to_string(), 0.4),
        (PoolId::Conservative.as_str().to_string(), 0.2),
    ]);
    VaultAction {
        id: "blend_40_40_20".to_string(),
        kind: ActionKind::Blend { ratios },
        expected_impact: ExpectedImpact {
            yield_change: 0.025,
            risk_change: 0.03,
            ecological_impact: 0.01,
            time_horizon_days: 180,
        },
        cost: 0.004,
        confidence: 0.75,
    }
}

/// Rebalance towards a balanced allocation, used for priority requests
pub fn rebalance_action(id: String) -> VaultAction {
    let target_allocation = BTreeMap::from([
        (PoolId::HighYield.as_str().to_string(), 0.3),
        (PoolId::Balanced.as_str().to_string(), 0.5),
        (PoolId::Conservative.as_str().to_string(), 0.2),
    ]);
    VaultAction {
        id,
        kind: ActionKind::Rebalance { target_allocation },
        expected_impact: ExpectedImpact {
            yield_change: 0.01,
            risk_change: -0.05,
            ecological_impact: 0.0,
            time_horizon_days: 30,
        },
        cost: 0.002,
        confidence: 0.8,
    }
}

/// Apply `action` to `state`, returning the successor state.
pub fn apply_action(state: &VaultState, action: &VaultAction) -> VaultState {
    let mut next = state.clone();
    let impact = &action.expected_impact;

    match &action.kind {
        ActionKind::Lock { duration_days } => {
            next.current_yield += impact.yield_change;
            next.stake_duration = *duration_days;
        }
        ActionKind::Stake { .. } => {
            next.current_yield += impact.yield_change;
            next.token_liquidity *= 0.95;
        }
        ActionKind::Ritual { .. } => {
            next.current_yield += impact.yield_change;
            next.ritual_validation += 0.1;
            next.ecological_impact += impact.ecological_impact;
            next.community_trust += 0.05;
        }
        ActionKind::Blend { .. } => {
            next.current_yield += impact.yield_change;
            next.eco_risk_adjusted_return += impact.ecological_impact + impact.risk_change.abs() * 0.5;
        }
        ActionKind::Liquidate { .. } => {
            next.current_yield += impact.yield_change;
            next.token_liquidity += 0.1;
            next.stake_duration = 0;
        }
        ActionKind::Rebalance { .. } => {
            next.current_yield += impact.yield_change;
            next.eco_risk_adjusted_return += impact.risk_change.abs();
        }
    }

    next.current_yield *= YIELD_DECAY;
    next.ecological_impact *= ECOLOGY_DECAY;
    next.agent_confidence *= CONFIDENCE_DECAY;

    next
}

pub fn is_terminal_state(state: &VaultState) -> bool {
    state.current_yield <= 0.0 || state.ecological_impact <= 0.0 || state.community_trust <= TRUST_FLOOR
}

pub fn calculate_reward(state: &VaultState, action: &VaultAction, weights: &RewardWeights) -> f64 {
    weights.yield_weight * state.current_yield
        + weights.ecology_weight * state.ecological_impact
        + weights.risk_weight * (1.0 - state.eco_risk_adjusted_return)
        + weights.trust_weight * state.community_trust
        + weights.moat_weight * state.moat_score
        - action.cost
}
