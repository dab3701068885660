// # Routes Module
//
// - HTTP route handlers, grouped by functionality.
//
//  ## Available Route Modules
// - `health`: Health check endpoint
// - `optimizer`: Vault optimization, learning feedback, agents and indexes

/// Health check and monitoring endpoints
pub mod health;

/// Yield optimizer endpoints
pub mod optimizer;
