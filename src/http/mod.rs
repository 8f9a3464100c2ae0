//! HTTP boundary: routes, JSON shapes and error mapping.

pub mod error;
pub mod handlers;
pub mod mappers;
pub mod models;
pub mod state;

use std::future::Future;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::config::{ConfigError, ServerConfig};
pub use state::AppState;

/// Both the trailing-slash and the bare form of each execute path are routed.
pub fn create_router(state: AppState, config: &ServerConfig) -> Result<Router, ConfigError> {
    let cors = config.cors.layer()?;

    let router = Router::new()
        .route("/", get(handlers::root))
        .route("/run-opensees/", post(handlers::run_file))
        .route("/run-opensees", post(handlers::run_file))
        .route("/run-opensees-script/", post(handlers::run_script))
        .route("/run-opensees-script", post(handlers::run_script))
        .route("/health", get(handlers::health))
        .layer(DefaultBodyLimit::max(config.max_body_bytes))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    Ok(router)
}

pub async fn serve<F>(config: ServerConfig, state: AppState, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = create_router(state, &config)?;

    let listener = TcpListener::bind(config.listen_addr).await?;
    tracing::info!(
        addr = %config.listen_addr,
        program = %config.command.program.display(),
        scratch_dir = %config.scratch_dir.display(),
        "HTTP server listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    tracing::info!("HTTP server stopped");
    Ok(())
}
