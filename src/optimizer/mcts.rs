//! Monte Carlo Tree Search over vault states.
//!
//! Each iteration runs the four classic phases:
//!
//! 1. **Selection**: descend from the root through fully expanded nodes using
//!    UCB1, returning any unvisited child immediately
//! 2. **Expansion**: take one untried action from the selected node and append
//!    the resulting child
//! 3. **Simulation**: random rollout from the new node, discounting each step
//! 4. **Backpropagation**: add the rollout reward to every node on the path
//!    back to the root
//!
//! Nodes live in an arena (`Vec<MctsNode>`); parents are referenced by index so
//! the tree never holds owning back-pointers. The tree is built per call and
//! dropped afterwards.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use rand::Rng;
use tracing::debug;

use crate::optimizer::model::{
    ACTION_GRID_SIZE, apply_action, calculate_reward, generate_possible_actions, grid_action,
    is_terminal_state,
};
use crate::optimizer::types::{
    AlgorithmConfig, OptimizationResult, OptimizerError, RewardWeights, SearchStats, VaultAction,
    VaultState,
};

pub type NodeId = usize;

const ROOT: NodeId = 0;
const MIN_CONFIDENT_VISITS: u64 = 10;
const LOW_VISIT_CONFIDENCE: f64 = 0.5;
const MAX_CONFIDENCE: f64 = 0.95;
const ALTERNATIVE_COUNT: usize = 3;

#[derive(Debug, Clone)]
pub struct MctsNode {
    pub id: NodeId,
    pub state: VaultState,
    pub action: Option<VaultAction>,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub visits: u64,
    pub total_reward: f64,
    pub untried_actions: Vec<VaultAction>,
    pub is_terminal: bool,
    pub depth: usize,
}

impl MctsNode {
    pub fn average_reward(&self) -> f64 {
        if self.visits == 0 {
            0.0
        } else {
            self.total_reward / self.visits as f64
        }
    }
}

/// Ordering decisions that are artifacts of the search rather than part of it.
///
/// The default [`FirstMaxLifo`] takes untried actions from the end of the list
/// and keeps the first candidate among equal scores.
pub trait SearchPolicy: Send + Sync {
    /// Remove and return the next action to expand
    fn take_untried(&self, untried: &mut Vec<VaultAction>) -> Option<VaultAction>;

    /// Whether `candidate` should replace the current best `incumbent`
    fn prefers(&self, candidate: f64, incumbent: f64) -> bool;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FirstMaxLifo;

impl SearchPolicy for FirstMaxLifo {
    fn take_untried(&self, untried: &mut Vec<VaultAction>) -> Option<VaultAction> {
        untried.pop()
    }

    fn prefers(&self, candidate: f64, incumbent: f64) -> bool {
        candidate > incumbent
    }
}

#[derive(Debug, Clone)]
pub struct SearchParams {
    pub iterations: usize,
    pub exploration_constant: f64,
    pub max_depth: usize,
    pub simulation_depth: usize,
    pub discount_factor: f64,
    pub reward_weights: RewardWeights,
}

impl From<&AlgorithmConfig> for SearchParams {
    fn from(config: &AlgorithmConfig) -> Self {
        Self {
            iterations: config.mcts_iterations,
            exploration_constant: config.exploration_constant,
            max_depth: config.max_depth,
            simulation_depth: config.simulation_depth,
            discount_factor: config.discount_factor,
            reward_weights: config.reward_weights,
        }
    }
}

impl Default for SearchParams {
    fn default() -> Self {
        Self::from(&AlgorithmConfig::default())
    }
}

/// Shared flag used to abort a running search from another task
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Limits on a single search run.
///
/// Reaching the deadline ends the loop early and keeps the tree built so far;
/// cancelling aborts the run with [`OptimizerError::Cancelled`].
#[derive(Debug, Clone, Default)]
pub struct SearchBudget {
    pub deadline: Option<Instant>,
    pub cancel: Option<CancelFlag>,
}

impl SearchBudget {
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_cancel(mut self, flag: CancelFlag) -> Self {
        self.cancel = Some(flag);
        self
    }
}

pub struct MctsSearch<P = FirstMaxLifo> {
    nodes: Vec<MctsNode>,
    params: SearchParams,
    policy: P,
    iterations_completed: usize,
    elapsed_ms: u64,
}

impl MctsSearch<FirstMaxLifo> {
    pub fn new(root_state: VaultState, params: SearchParams) -> Self {
        Self::with_policy(root_state, params, FirstMaxLifo)
    }
}

impl<P: SearchPolicy> MctsSearch<P> {
    pub fn with_policy(root_state: VaultState, params: SearchParams, policy: P) -> Self {
        let is_terminal = is_terminal_state(&root_state) || params.max_depth == 0;
        let untried_actions = if is_terminal {
            Vec::new()
        } else {
            generate_possible_actions(&root_state)
        };

        let root = MctsNode {
            id: ROOT,
            state: root_state,
            action: None,
            parent: None,
            children: Vec::new(),
            visits: 0,
            total_reward: 0.0,
            untried_actions,
            is_terminal,
            depth: 0,
        };

        Self {
            nodes: vec![root],
            params,
            policy,
            iterations_completed: 0,
            elapsed_ms: 0,
        }
    }

    pub fn root(&self) -> &MctsNode {
        &self.nodes[ROOT]
    }

    pub fn node(&self, id: NodeId) -> &MctsNode {
        &self.nodes[id]
    }

    pub fn children(&self, id: NodeId) -> impl Iterator<Item = &MctsNode> {
        self.nodes[id].children.iter().map(|&child| &self.nodes[child])
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn iterations_completed(&self) -> usize {
        self.iterations_completed
    }

    /// Run up to `params.iterations` iterations within `budget`.
    ///
    /// At least one iteration completes before the deadline is consulted, so
    /// an expired deadline still yields a recommendation for a live root.
    pub fn run<R: Rng + ?Sized>(&mut self, rng: &mut R, budget: &SearchBudget) -> Result<(), OptimizerError> {
        let started = Instant::now();

        for _ in 0..self.params.iterations {
            if budget.cancel.as_ref().is_some_and(CancelFlag::is_cancelled) {
                self.elapsed_ms = started.elapsed().as_millis() as u64;
                return Err(OptimizerError::Cancelled {
                    completed: self.iterations_completed,
                });
            }
            if self.iterations_completed > 0
                && budget.deadline.is_some_and(|deadline| Instant::now() >= deadline)
            {
                debug!("Search deadline reached after {} iterations", self.iterations_completed);
                break;
            }
            self.iterate(rng);
        }

        self.elapsed_ms = started.elapsed().as_millis() as u64;
        debug!(
            "Search finished: {} iterations, {} nodes, {}ms",
            self.iterations_completed,
            self.nodes.len(),
            self.elapsed_ms
        );
        Ok(())
    }

    /// One select / expand / simulate / backpropagate cycle
    pub fn iterate<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        let selected = self.select();
        let leaf = self.expand(selected).unwrap_or(selected);
        let reward = self.simulate(leaf, rng);
        self.backpropagate(leaf, reward);
        self.iterations_completed += 1;
    }

    fn select(&self) -> NodeId {
        let mut current = ROOT;
        loop {
            let node = &self.nodes[current];
            if node.children.is_empty() || !node.untried_actions.is_empty() {
                return current;
            }
            match self.select_child(current) {
                Some(child) => current = child,
                None => return current,
            }
        }
    }

    /// Child of `id` with the highest UCB1 score; unvisited children win outright
    pub fn select_child(&self, id: NodeId) -> Option<NodeId> {
        let parent = &self.nodes[id];
        let ln_parent_visits = (parent.visits as f64).ln();
        let mut best: Option<(NodeId, f64)> = None;

        for &child_id in &parent.children {
            let child = &self.nodes[child_id];
            if child.visits == 0 {
                return Some(child_id);
            }

            let exploration = (ln_parent_visits / child.visits as f64).sqrt();
            let score = child.average_reward() + self.params.exploration_constant * exploration;

            match best {
                Some((_, incumbent)) if !self.policy.prefers(score, incumbent) => {}
                _ => best = Some((child_id, score)),
            }
        }

        best.map(|(child_id, _)| child_id)
    }

    fn expand(&mut self, id: NodeId) -> Option<NodeId> {
        if self.nodes[id].is_terminal {
            return None;
        }
        let action = self.policy.take_untried(&mut self.nodes[id].untried_actions)?;

        let parent = &self.nodes[id];
        let state = apply_action(&parent.state, &action);
        let depth = parent.depth + 1;
        let is_terminal = is_terminal_state(&state) || depth >= self.params.max_depth;
        let untried_actions = if is_terminal {
            Vec::new()
        } else {
            generate_possible_actions(&state)
        };

        let child_id = self.nodes.len();
        self.nodes.push(MctsNode {
            id: child_id,
            state,
            action: Some(action),
            parent: Some(id),
            children: Vec::new(),
            visits: 0,
            total_reward: 0.0,
            untried_actions,
            is_terminal,
            depth,
        });
        self.nodes[id].children.push(child_id);

        Some(child_id)
    }

    fn simulate<R: Rng + ?Sized>(&self, id: NodeId, rng: &mut R) -> f64 {
        self.rollout(self.nodes[id].state.clone(), || grid_action(rng.gen_range(0..ACTION_GRID_SIZE)))
    }

    /// Discounted reward of playing `next_action` from `state` until the
    /// depth limit or a terminal state
    fn rollout<F>(&self, mut state: VaultState, mut next_action: F) -> f64
    where
        F: FnMut() -> VaultAction,
    {
        let mut total_reward = 0.0;
        let mut discount = 1.0;

        for _ in 0..self.params.simulation_depth {
            if is_terminal_state(&state) {
                break;
            }
            let action = next_action();
            state = apply_action(&state, &action);
            total_reward += calculate_reward(&state, &action, &self.params.reward_weights) * discount;
            discount *= self.params.discount_factor;
        }

        total_reward
    }

    fn backpropagate(&mut self, id: NodeId, reward: f64) {
        let mut current = Some(id);
        while let Some(node_id) = current {
            let node = &mut self.nodes[node_id];
            node.visits += 1;
            node.total_reward += reward;
            current = node.parent;
        }
    }

    /// Root child with the highest average reward
    pub fn best_child(&self) -> Option<NodeId> {
        let mut best: Option<(NodeId, f64)> = None;
        for child in self.children(ROOT).filter(|c| c.visits > 0) {
            let average = child.average_reward();
            match best {
                Some((_, incumbent)) if !self.policy.prefers(average, incumbent) => {}
                _ => best = Some((child.id, average)),
            }
        }
        best.map(|(id, _)| id)
    }

    pub fn recommendation(&self, vault_id: &str) -> Result<OptimizationResult, OptimizerError> {
        let best_id = self
            .best_child()
            .ok_or_else(|| OptimizerError::NoActionFound(vault_id.to_string()))?;
        let best = &self.nodes[best_id];
        let recommended_action = best
            .action
            .clone()
            .ok_or_else(|| OptimizerError::NoActionFound(vault_id.to_string()))?;

        let confidence = if best.visits <= MIN_CONFIDENT_VISITS {
            LOW_VISIT_CONFIDENCE
        } else {
            best.average_reward().min(MAX_CONFIDENCE)
        };

        let mut others: Vec<&MctsNode> = self
            .children(ROOT)
            .filter(|c| c.id != best_id && c.visits > 0)
            .collect();
        others.sort_by(|a, b| {
            b.average_reward()
                .partial_cmp(&a.average_reward())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let alternative_actions = others
            .into_iter()
            .take(ALTERNATIVE_COUNT)
            .filter_map(|node| node.action.clone())
            .collect();

        Ok(OptimizationResult {
            vault_id: vault_id.to_string(),
            recommended_action,
            confidence,
            expected_outcome: best.state.clone(),
            alternative_actions,
            stats: SearchStats {
                iterations_completed: self.iterations_completed,
                tree_size: self.nodes.len(),
                root_visits: self.root().visits,
                best_action_visits: best.visits,
                elapsed_ms: self.elapsed_ms,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimizer::model::tests::sample_state;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn params(iterations: usize) -> SearchParams {
        SearchParams {
            iterations,
            ..SearchParams::default()
        }
    }

    #[test]
    fn test_seeded_runs_build_identical_trees() {
        let run = || {
            let mut search = MctsSearch::new(sample_state(), params(300));
            let mut rng = StdRng::seed_from_u64(7);
            search.run(&mut rng, &SearchBudget::default()).unwrap();
            let visits: Vec<u64> = search.children(ROOT).map(|c| c.visits).collect();
            let result = search.recommendation("vault_regen_001").unwrap();
            (visits, result.recommended_action.id, search.len())
        };

        assert_eq!(run(), run());
    }

    #[test]
    fn test_every_child_visited_once_before_any_twice() {
        let mut search = MctsSearch::new(sample_state(), params(0));
        let mut rng = StdRng::seed_from_u64(11);

        for _ in 0..ACTION_GRID_SIZE {
            search.iterate(&mut rng);
            assert!(search.children(ROOT).all(|c| c.visits <= 1));
        }

        assert_eq!(search.root().children.len(), ACTION_GRID_SIZE);
        assert!(search.children(ROOT).all(|c| c.visits == 1));
        assert!(search.root().untried_actions.is_empty());
    }

    #[test]
    fn test_expansion_pops_from_end_of_untried_list() {
        let mut search = MctsSearch::new(sample_state(), params(0));
        let mut rng = StdRng::seed_from_u64(3);
        search.iterate(&mut rng);

        let first_child = search.children(ROOT).next().unwrap();
        assert_eq!(first_child.action.as_ref().unwrap().kind.label(), "blend");
        assert_eq!(first_child.depth, 1);
        assert_eq!(first_child.parent, Some(ROOT));
    }

    #[test]
    fn test_zero_visit_child_selected_first() {
        let mut search = MctsSearch::new(sample_state(), params(0));
        let mut rng = StdRng::seed_from_u64(5);
        search.iterate(&mut rng);
        search.iterate(&mut rng);

        // Force an unvisited child into the root
        let unvisited = search.nodes.len();
        let template = search.nodes[1].clone();
        search.nodes.push(MctsNode {
            id: unvisited,
            visits: 0,
            total_reward: 0.0,
            ..template
        });
        search.nodes[ROOT].children.push(unvisited);

        assert_eq!(search.select_child(ROOT), Some(unvisited));
    }

    #[test]
    fn test_ties_resolve_to_first_child() {
        let mut search = MctsSearch::new(sample_state(), params(0));
        let mut rng = StdRng::seed_from_u64(5);
        search.iterate(&mut rng);
        search.iterate(&mut rng);

        for id in [1, 2] {
            search.nodes[id].visits = 4;
            search.nodes[id].total_reward = 2.0;
        }
        search.nodes[ROOT].visits = 8;

        assert_eq!(search.select_child(ROOT), Some(1));
        assert_eq!(search.best_child(), Some(1));
    }

    #[test]
    fn test_backpropagation_adds_same_reward_to_ancestors() {
        let mut search = MctsSearch::new(sample_state(), params(0));
        let mut rng = StdRng::seed_from_u64(9);
        search.iterate(&mut rng);

        let child = search.nodes[1].clone();
        assert_eq!(child.visits, 1);
        assert_eq!(search.root().visits, 1);
        assert!((search.root().total_reward - child.total_reward).abs() < 1e-12);
    }

    #[test]
    fn test_simulation_stops_on_terminal_state() {
        let mut state = sample_state();
        state.community_trust = 0.05;
        let search = MctsSearch::new(state, params(0));
        let mut rng = StdRng::seed_from_u64(1);

        assert_eq!(search.simulate(ROOT, &mut rng), 0.0);
    }

    #[test]
    fn test_rollout_stops_when_state_turns_terminal() {
        use crate::optimizer::model::rebalance_action;
        use crate::optimizer::types::{ActionKind, ExpectedImpact};

        let search = MctsSearch::new(sample_state(), params(0));
        let drain = VaultAction {
            id: "drain".to_string(),
            kind: ActionKind::Liquidate { amount: 1.0 },
            expected_impact: ExpectedImpact {
                yield_change: -10.0,
                risk_change: 0.0,
                ecological_impact: 0.0,
                time_horizon_days: 0,
            },
            cost: 0.0,
            confidence: 1.0,
        };
        let rebalance = rebalance_action("rebalance".to_string());
        let mut forced = vec![rebalance.clone(), drain.clone()].into_iter();
        let mut drawn = 0;

        let reward = search.rollout(sample_state(), || {
            drawn += 1;
            forced.next().unwrap_or_else(|| panic!("rollout continued past a terminal state"))
        });

        let first = apply_action(&sample_state(), &rebalance);
        let second = apply_action(&first, &drain);
        assert!(!is_terminal_state(&first));
        assert!(is_terminal_state(&second));

        let weights = &search.params.reward_weights;
        let expected = calculate_reward(&first, &rebalance, weights)
            + calculate_reward(&second, &drain, weights) * search.params.discount_factor;
        assert_eq!(drawn, 2);
        assert!((reward - expected).abs() < 1e-12);
    }

    #[test]
    fn test_terminal_root_has_no_recommendation() {
        let mut state = sample_state();
        state.current_yield = 0.0;
        let mut search = MctsSearch::new(state, params(20));
        let mut rng = StdRng::seed_from_u64(2);
        search.run(&mut rng, &SearchBudget::default()).unwrap();

        assert!(search.root().children.is_empty());
        assert!(matches!(
            search.recommendation("v"),
            Err(OptimizerError::NoActionFound(id)) if id == "v"
        ));
    }

    #[test]
    fn test_low_visit_confidence_is_fixed() {
        let mut search = MctsSearch::new(sample_state(), params(12));
        let mut rng = StdRng::seed_from_u64(4);
        search.run(&mut rng, &SearchBudget::default()).unwrap();

        let result = search.recommendation("v").unwrap();
        assert_eq!(result.stats.best_action_visits, 1);
        assert_eq!(result.confidence, 0.5);
        assert_eq!(result.alternative_actions.len(), 3);
        assert!(result
            .alternative_actions
            .iter()
            .all(|a| a.id != result.recommended_action.id));
    }

    #[test]
    fn test_confidence_capped_for_well_visited_best() {
        let mut search = MctsSearch::new(sample_state(), params(400));
        let mut rng = StdRng::seed_from_u64(8);
        search.run(&mut rng, &SearchBudget::default()).unwrap();

        let result = search.recommendation("v").unwrap();
        assert!(result.stats.best_action_visits > 10);
        assert!(result.confidence <= 0.95);
        assert_eq!(result.stats.iterations_completed, 400);
        assert_eq!(result.stats.root_visits, 400);
    }

    #[test]
    fn test_depth_never_exceeds_max_depth() {
        let mut search = MctsSearch::new(
            sample_state(),
            SearchParams {
                iterations: 500,
                max_depth: 3,
                ..SearchParams::default()
            },
        );
        let mut rng = StdRng::seed_from_u64(21);
        search.run(&mut rng, &SearchBudget::default()).unwrap();

        assert!(search.nodes.iter().all(|n| n.depth <= 3));
        assert!(search.nodes.iter().filter(|n| n.depth == 3).all(|n| n.is_terminal));
    }

    #[test]
    fn test_cancelled_search_reports_progress() {
        let flag = CancelFlag::new();
        flag.cancel();
        let mut search = MctsSearch::new(sample_state(), params(100));
        let mut rng = StdRng::seed_from_u64(1);

        let err = search
            .run(&mut rng, &SearchBudget::default().with_cancel(flag))
            .unwrap_err();
        assert!(matches!(err, OptimizerError::Cancelled { completed: 0 }));
    }

    #[test]
    fn test_expired_deadline_stops_early() {
        let mut search = MctsSearch::new(sample_state(), params(100));
        let mut rng = StdRng::seed_from_u64(1);
        let budget = SearchBudget::default().with_deadline(Instant::now());

        search.run(&mut rng, &budget).unwrap();
        assert_eq!(search.iterations_completed(), 1);

        let result = search.recommendation("v").unwrap();
        assert_eq!(result.stats.iterations_completed, 1);
        assert_eq!(result.stats.best_action_visits, 1);
    }
}
