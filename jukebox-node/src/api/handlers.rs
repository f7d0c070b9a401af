//! HTTP request handlers

use crate::api::server::AppContext;
use crate::coordinator::{EnqueueReceipt, EnqueueTarget, NodeSnapshot, RequestError, TransportAction};
use crate::status::StatusLine;
use axum::{extract::State, http::StatusCode, Json};
use jukebox_common::TracklistEntry;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: String,
    module: String,
    version: String,
    git_hash: String,
    build_timestamp: String,
    build_profile: String,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    #[serde(flatten)]
    node: NodeSnapshot,
    status_line: String,
    status: Vec<StatusLine>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    error: String,
}

/// `{"code": "03-07"}` or `{"title": "...", "album": "..."}`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnqueueRequest {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    album: Option<String>,
    #[serde(default)]
    requested_by: Option<String>,
}

impl EnqueueRequest {
    fn target(self) -> Option<(EnqueueTarget, Option<String>)> {
        let target = match (self.code, self.title) {
            (Some(code), _) => EnqueueTarget::Code(code.trim().to_string()),
            (None, Some(title)) if !title.trim().is_empty() => EnqueueTarget::Title {
                title: title.trim().to_string(),
                album: self.album.filter(|album| !album.trim().is_empty()),
            },
            _ => return None,
        };
        Some((target, self.requested_by))
    }
}

#[derive(Debug, Serialize)]
pub struct TransportResponse {
    applied: bool,
}

#[derive(Debug, Serialize)]
pub struct ClearResponse {
    cleared: u64,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

impl From<RequestError> for (StatusCode, Json<ErrorResponse>) {
    fn from(e: RequestError) -> Self {
        let status = match &e {
            RequestError::InvalidCode(_) => StatusCode::BAD_REQUEST,
            RequestError::UnknownTitle(_) => StatusCode::NOT_FOUND,
            RequestError::Duplicate(_) => StatusCode::CONFLICT,
            RequestError::MasterOnly(_) => StatusCode::FORBIDDEN,
            RequestError::StoreUnavailable | RequestError::Stopped => {
                StatusCode::SERVICE_UNAVAILABLE
            }
        };
        api_error(status, e.to_string())
    }
}

// ============================================================================
// Read endpoints
// ============================================================================

/// GET /health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        module: "jukebox-node".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        git_hash: env!("GIT_HASH").to_string(),
        build_timestamp: env!("BUILD_TIMESTAMP").to_string(),
        build_profile: env!("BUILD_PROFILE").to_string(),
    })
}

/// GET /status - role, playback snapshot, link states and the status line
pub async fn status(State(ctx): State<AppContext>) -> Json<StatusResponse> {
    Json(StatusResponse {
        node: ctx.handle.snapshot(),
        status_line: ctx.status.render(),
        status: ctx.status.lines(),
    })
}

/// GET /tracklist - every store entry
pub async fn tracklist(
    State(ctx): State<AppContext>,
) -> Result<Json<Vec<TracklistEntry>>, ApiError> {
    let mut entries = ctx
        .client
        .list_all()
        .await
        .ok_or_else(|| api_error(StatusCode::SERVICE_UNAVAILABLE, "tracklist store unavailable"))?;
    entries.sort_by(|a, b| (a.priority, a.created_at).cmp(&(b.priority, b.created_at)));
    Ok(Json(entries))
}

// ============================================================================
// Mutations
// ============================================================================

/// POST /enqueue
pub async fn enqueue(
    State(ctx): State<AppContext>,
    Json(req): Json<EnqueueRequest>,
) -> Result<(StatusCode, Json<EnqueueReceipt>), ApiError> {
    let Some((target, requested_by)) = req.target() else {
        return Err(api_error(StatusCode::BAD_REQUEST, "either code or title is required"));
    };
    info!("Enqueue request: {:?}", target);

    match ctx
        .handle
        .enqueue(target, requested_by.unwrap_or_else(|| "api".to_string()))
        .await
    {
        Ok(receipt @ EnqueueReceipt::Stored { .. }) => Ok((StatusCode::CREATED, Json(receipt))),
        Ok(receipt @ EnqueueReceipt::Forwarded { .. }) => Ok((StatusCode::ACCEPTED, Json(receipt))),
        Err(e) => {
            warn!("Enqueue rejected: {}", e);
            Err(e.into())
        }
    }
}

async fn transport(ctx: AppContext, action: TransportAction) -> Result<Json<TransportResponse>, ApiError> {
    let applied = ctx.handle.transport(action).await?;
    Ok(Json(TransportResponse { applied }))
}

/// POST /pause - toggles pause/resume
pub async fn pause(State(ctx): State<AppContext>) -> Result<Json<TransportResponse>, ApiError> {
    transport(ctx, TransportAction::PauseResume).await
}

/// POST /skip
pub async fn skip(State(ctx): State<AppContext>) -> Result<Json<TransportResponse>, ApiError> {
    transport(ctx, TransportAction::Skip).await
}

/// POST /previous - restarts the current track
pub async fn previous(State(ctx): State<AppContext>) -> Result<Json<TransportResponse>, ApiError> {
    transport(ctx, TransportAction::Previous).await
}

/// POST /clear - master only
pub async fn clear(State(ctx): State<AppContext>) -> Result<Json<ClearResponse>, ApiError> {
    let cleared = ctx.handle.clear().await?;
    info!("Tracklist cleared via API ({} entries)", cleared);
    Ok(Json(ClearResponse { cleared }))
}
