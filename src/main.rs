//! # Yield Optimizer Server
//!
//! HTTP front end for the yield optimizer, built with Axum and Tokio.
//!
//! ## Environment Setup
//! Copy `.env.example` to `.env` and adjust as needed:
//! ```bash
//! cp .env.example .env
//! ```
//!
//! ## Running the Server
//! ```bash
//! cargo run
//! ```
//!
//! The server listens on `http://0.0.0.0:3000` by default.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use yield_optimizer::{config::Config, server};

/// Application entry point.
///
/// Loads `.env`, initializes the tracing subscriber (level from `RUST_LOG`,
/// defaulting to `info`) and runs the server until Ctrl+C.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false) // Don't show module targets for cleaner output
                .compact(),
        )
        .init();

    tracing::info!("🏁 Starting yield optimizer server...");
    tracing::info!("📦 Package: {} v{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
    tracing::info!("🏗️  Build profile: {}", if cfg!(debug_assertions) { "debug" } else { "release" });

    let config = Config::from_env()?;
    server::start(config).await
}
