//! Configuration module for environment variables and application settings

use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::optimizer::learning::DEFAULT_HISTORY_CAPACITY;
use crate::optimizer::service::LATEST_STATE_CAPACITY;
use crate::optimizer::{AlgorithmConfig, OptimizerSettings, SchedulerConfig};

#[derive(Debug, Clone)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,

    /// Search and learning configuration
    pub optimizer: OptimizerSettings,

    /// Periods of the background loops
    pub scheduler: SchedulerConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    ///
    /// Missing or unparseable values fall back to their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = AlgorithmConfig::default();

        let algorithm = AlgorithmConfig {
            mcts_iterations: parse_or(&lookup, "MCTS_ITERATIONS", defaults.mcts_iterations),
            exploration_constant: parse_or(&lookup, "MCTS_EXPLORATION_CONSTANT", defaults.exploration_constant),
            max_depth: parse_or(&lookup, "MCTS_MAX_DEPTH", defaults.max_depth),
            simulation_depth: parse_or(&lookup, "MCTS_SIMULATION_DEPTH", defaults.simulation_depth),
            learning_rate: parse_or(&lookup, "RL_LEARNING_RATE", defaults.learning_rate),
            exploration_decay: parse_or(&lookup, "RL_EXPLORATION_DECAY", defaults.exploration_decay),
            ..defaults
        };
        algorithm
            .validate()
            .context("Invalid optimizer settings in environment")?;

        let port = lookup("SERVER_PORT")
            .or_else(|| lookup("PORT"))
            .and_then(|p| p.parse().ok())
            .unwrap_or(3000);

        let cors_origins = lookup("CORS_ALLOWED_ORIGINS")
            .unwrap_or_else(|| "http://localhost:3001".to_string())
            .split(',')
            .map(|origin| origin.trim().to_string())
            .filter(|origin| !origin.is_empty())
            .collect();

        let secs = |key: &str, default: u64| Duration::from_secs(parse_or(&lookup, key, default).max(1));

        Ok(Self {
            server: ServerConfig {
                host: lookup("SERVER_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
                port,
                cors_origins,
            },
            optimizer: OptimizerSettings {
                algorithm,
                feedback_history_capacity: parse_or(&lookup, "FEEDBACK_HISTORY_CAPACITY", DEFAULT_HISTORY_CAPACITY),
                latest_state_capacity: parse_or(&lookup, "LATEST_STATE_CAPACITY", LATEST_STATE_CAPACITY),
                seed: lookup("OPTIMIZER_SEED").and_then(|s| s.parse().ok()),
            },
            scheduler: SchedulerConfig {
                background_optimization_interval: secs("BACKGROUND_OPTIMIZATION_INTERVAL_SECS", 300),
                feedback_batch_interval: secs("RL_BATCH_INTERVAL_SECS", 600),
                coordination_interval: secs("COORDINATION_INTERVAL_SECS", 900),
            },
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    lookup(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}
