use axum::extract::DefaultBodyLimit;
use axum::Router;
use http::HeaderName;
use tokio::sync::watch;
use tower_http::sensitive_headers::SetSensitiveRequestHeadersLayer;
use tower_http::trace::TraceLayer;
use tower_http::trace::{DefaultOnFailure, DefaultOnResponse};
use tower_http::LatencyUnit;

pub mod api;
mod config;
mod handlers;
mod health;

pub use config::Config;

use crate::ServiceState;

const STATUS_PREFIX: &str = "/_status";

/// Room for multipart boundaries and the key field on top of the payload
/// itself; the payload limit proper is enforced by the relay.
pub const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

pub const UPLOAD_TOKEN_HEADER: &str = "x-upload-token";
pub const DOWNLOAD_TOKEN_HEADER: &str = "x-download-token";
pub const DECRYPTION_KEY_HEADER: &str = "x-decryption-key";

/// Build the full application router: relay routes, status checks and the
/// fallback. Kept separate from [`run_api`] so it can be driven in-process.
pub fn router(config: &Config, state: ServiceState) -> Router {
    let body_limit = usize::try_from(config.max_upload_bytes)
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_OVERHEAD_BYTES);

    Router::new()
        .nest(STATUS_PREFIX, health::router(state.clone()))
        .merge(api::router(state.clone()))
        .fallback(handlers::not_found_handler)
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

/// Run the relay HTTP server.
pub async fn run_api(
    config: Config,
    state: ServiceState,
    mut shutdown_rx: watch::Receiver<()>,
) -> Result<(), HttpServerError> {
    let listen_addr = config.listen_addr;
    let log_level = config.log_level;
    let trace_layer = TraceLayer::new_for_http()
        .on_response(
            DefaultOnResponse::new()
                .include_headers(false)
                .level(log_level)
                .latency_unit(LatencyUnit::Micros),
        )
        .on_failure(DefaultOnFailure::new().latency_unit(LatencyUnit::Micros));

    // credentials must never show up in request logs
    let sensitive = SetSensitiveRequestHeadersLayer::new([
        HeaderName::from_static(UPLOAD_TOKEN_HEADER),
        HeaderName::from_static(DOWNLOAD_TOKEN_HEADER),
    ]);

    let router = router(&config, state).layer(trace_layer).layer(sensitive);

    tracing::info!(addr = ?listen_addr, "API server listening");
    let listener = tokio::net::TcpListener::bind(listen_addr).await?;

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.changed().await;
        })
        .await?;

    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum HttpServerError {
    #[error("an error occurred running the HTTP server: {0}")]
    ServingFailed(#[from] std::io::Error),
}
