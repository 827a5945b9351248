mod engine;
mod evaluator;
mod handlers;
mod queue;
mod rate_limit;
mod routes;


use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, warn};

use gavel_common::config::Config;

use crate::engine::ExecutionEngine;
use crate::queue::AdmissionQueue;
use crate::rate_limit::RateLimiter;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub queue: Arc<AdmissionQueue>,
    pub engine: Arc<ExecutionEngine>,
    pub rate_limiter: Arc<RateLimiter>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    dotenvy::dotenv().ok();

    let config = Arc::new(Config::from_env());
    info!(
        port = config.port,
        mode = ?config.execution_mode,
        max_concurrent = config.max_concurrent,
        "Gavel judge booting"
    );

    tokio::fs::create_dir_all(&config.temp_dir)
        .await
        .with_context(|| format!("failed to create temp root {}", config.temp_dir.display()))?;

    let engine = Arc::new(ExecutionEngine::from_config(config.clone())?);
    let queue = Arc::new(AdmissionQueue::new(
        config.max_concurrent,
        config.max_queue_depth,
    ));
    let rate_limiter = Arc::new(RateLimiter::new(
        config.rate_limit_window_ms,
        config.rate_limit_max,
    ));

    let state = AppState {
        config: config.clone(),
        queue: queue.clone(),
        engine,
        rate_limiter,
    };

    let app = routes::router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("HTTP server listening on {addr}");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server error")?;

    // In-flight submissions finish; anything still waiting fails fast.
    queue.shutdown();
    info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    signal::ctrl_c()
        .await
        .expect("failed to install CTRL+C signal handler");
    warn!("received ctrl-c, draining queue and shutting down");
}
