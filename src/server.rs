//! # Server Module
//!
//! HTTP server setup and route configuration for the yield optimizer.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{Router, http::HeaderValue, routing::get};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tracing::warn;

use crate::config::Config;
use crate::optimizer::{Scheduler, YieldOptimizer};
use crate::routes::{health::ping, optimizer};

/// Application state shared across all route handlers
#[derive(Clone)]
pub struct AppState {
    pub optimizer: Arc<YieldOptimizer>,
}

/// Assemble the application router with CORS restricted to `cors_origins`
pub fn build_router(state: AppState, cors_origins: &[String]) -> Router {
    let origins: Vec<HeaderValue> = cors_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    Router::new()
        .route("/ping", get(ping)) // Health check endpoint
        .merge(optimizer::create_routes())
        .layer(
            ServiceBuilder::new().layer(
                CorsLayer::new()
                    .allow_origin(origins)
                    .allow_methods([
                        axum::http::Method::GET,
                        axum::http::Method::POST,
                        axum::http::Method::PATCH,
                        axum::http::Method::OPTIONS,
                    ])
                    .allow_headers([
                        axum::http::header::ORIGIN,
                        axum::http::header::CONTENT_TYPE,
                        axum::http::header::ACCEPT,
                    ]),
            ),
        )
        .with_state(state)
}

/// Starts the yield optimizer HTTP server.
///
/// Builds the optimizer from `config`, starts the background scheduler and
/// serves until Ctrl+C, then stops the scheduler before returning.
pub async fn start(config: Config) -> Result<()> {
    let optimizer = YieldOptimizer::shared(config.optimizer.clone());

    let scheduler = Scheduler::with_default_tasks(Arc::clone(&optimizer), &config.scheduler);
    scheduler.start().await;

    let app = build_router(AppState { optimizer }, &config.server.cors_origins);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {} - port may already be in use", addr))?;

    tracing::info!("🚀 Yield optimizer server starting...");
    tracing::info!("📡 Listening on http://{}", addr);
    tracing::info!("🏥 Health check available at http://{}/ping", addr);
    tracing::info!("📊 Optimizer endpoints available at http://{}/api/v1/optimizer/*", addr);

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error");

    scheduler.stop().await;
    tracing::info!("Server shut down");
    served
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
