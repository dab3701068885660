//! # Yield Optimizer
//!
//! Adaptive yield optimization for regenerative vaults: Monte Carlo Tree
//! Search over vault actions, a three-tier agent hierarchy tuned by
//! reinforcement feedback, and a small HTTP API on top.
//!
//! ## Modules
//! - `optimizer`: search engine, agents, learning loop, indexes and schedulers
//! - `config`: environment variable configuration
//! - `server`: router assembly and server lifecycle
//! - `routes`: HTTP route handlers

pub mod config;
pub mod optimizer;
pub mod routes;
pub mod server;
