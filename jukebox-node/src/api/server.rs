//! HTTP server setup and routing

use crate::coordinator::CoordinatorHandle;
use crate::error::{Error, Result};
use crate::status::StatusBoard;
use crate::store::TracklistClient;
use axum::{
    routing::{get, post},
    Router,
};
use jukebox_common::events::EventBus;
use std::future::Future;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Shared application context passed to all handlers
///
/// `Clone` gives `FromRef<AppContext>` for free via Axum's blanket implementation.
#[derive(Clone)]
pub struct AppContext {
    pub handle: CoordinatorHandle,
    pub bus: Arc<EventBus>,
    pub status: StatusBoard,
    pub client: TracklistClient,
}

pub fn build_router(ctx: AppContext) -> Router {
    Router::new()
        .route("/health", get(super::handlers::health))
        .route("/status", get(super::handlers::status))
        .route("/tracklist", get(super::handlers::tracklist))
        .route("/enqueue", post(super::handlers::enqueue))
        .route("/pause", post(super::handlers::pause))
        .route("/skip", post(super::handlers::skip))
        .route("/previous", post(super::handlers::previous))
        .route("/clear", post(super::handlers::clear))
        .route("/events", get(super::sse::event_stream))
        .with_state(ctx)
        .layer(TraceLayer::new_for_http())
        // Enable CORS for local access
        .layer(CorsLayer::permissive())
}

/// Serve the API on `bind` until `shutdown` resolves
pub async fn run(
    bind: &str,
    ctx: AppContext,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .map_err(|e| Error::Http(format!("Failed to bind to {}: {}", bind, e)))?;
    info!("HTTP API listening on {}", bind);

    axum::serve(listener, build_router(ctx))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| Error::Http(format!("Server error: {}", e)))?;

    Ok(())
}
