//! Yield optimization engine: search, agents, learning and the indexes
//! behind the public service.

pub mod agents;
pub mod indexes;
pub mod learning;
pub mod mcts;
pub mod model;
pub mod priority;
pub mod scheduler;
pub mod service;
pub mod types;

pub use agents::{AgentPerformance, AgentRegistry, AgentTier, CoordinationSummary, HierarchicalAgent};
pub use mcts::{CancelFlag, FirstMaxLifo, MctsSearch, SearchBudget, SearchParams, SearchPolicy};
pub use scheduler::{Scheduler, SchedulerConfig, ScheduledTask};
pub use service::{AgentPerformanceSummary, AlgorithmMetrics, OptimizerSettings, YieldOptimizer};
pub use types::*;
