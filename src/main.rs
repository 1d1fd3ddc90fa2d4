// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Form Gateway Service
//!
//! Receives lead-capture form submissions, rejects abuse and forwards the
//! rest to the configured form API.
//!
//! ## Configuration
//!
//! Loaded from `.env`, an optional file named by `FORM_GATEWAY_CONFIG`,
//! `FORM_GATEWAY__*` variables and these flat variables:
//!
//! - `BIND_ADDR`: Server bind address (default: 0.0.0.0:8080)
//! - `FORM_ENDPOINT`: Upstream form API URL (required)
//! - `API_KEY`: Bearer token for the form API
//! - `CSRF_SECRET`: HMAC key for CSRF tokens, at least 32 bytes (required)
//! - `RECAPTCHA_SECRET`: Enables reCAPTCHA verification when set
//! - `ALLOWED_ORIGINS`: Comma-separated CORS origins
//! - `TRUST_PROXY_HEADERS`: Take the client IP from proxy headers (default: false)

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use form_gateway::{config::Config, handlers::{router, AppState}};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer().json())
        .with(
            EnvFilter::builder()
                .with_default_directive(Level::INFO.into())
                .from_env_lossy(),
        )
        .init();

    // Load configuration
    let config = Config::load()?;
    config.validate()?;
    info!(
        bind_addr = %config.bind_addr,
        max_submissions = config.rate_limit.max_submissions,
        window_secs = config.rate_limit.window_secs,
        recaptcha = config.recaptcha.enabled(),
        trust_proxy_headers = config.trust_proxy_headers,
        "Starting form gateway"
    );

    // Create application state
    let state = Arc::new(AppState::new(config.clone())?);

    // Spawn cleanup task
    let cleanup_state = state.clone();
    let cleanup_every = config.rate_limit.cleanup_interval();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(cleanup_every);
        loop {
            interval.tick().await;
            cleanup_state.limiter.cleanup().await;
        }
    });

    let app = router(state);

    // Start server
    let addr: SocketAddr = config.bind_addr.parse()?;
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %addr, "Server listening");

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}
