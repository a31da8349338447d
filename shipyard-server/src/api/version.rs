//! Version API Handlers
//!
//! Read-only views over the state manager's history.

use axum::{
    Json,
    extract::{Path, State},
    http::header,
    response::IntoResponse,
};
use shipyard_core::dto::version::{LogKind, VersionDetails, VersionList};

use super::ApiState;
use crate::api::error::{ApiError, ApiResult};

/// GET /v0/version
/// Version of the orchestrator itself
pub async fn server_version() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        env!("CARGO_PKG_VERSION"),
    )
}

/// GET /v0/versions
pub async fn list_versions(State(state): State<ApiState>) -> Json<VersionList> {
    tracing::debug!("Listing versions");
    Json(state.state.list_versions())
}

/// GET /v0/versions/{id}
/// Runners recorded for one version, in pipeline order
pub async fn get_version(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> ApiResult<Json<VersionDetails>> {
    tracing::debug!("Getting version: {}", id);

    let details = state.state.list_version_details(&id)?;
    Ok(Json(details))
}

/// GET /v0/versions/{id}/log and /v0/versions/{id}/err
/// Raw output captured from the version's release
pub async fn get_version_log(
    State(state): State<ApiState>,
    Path((id, kind)): Path<(String, String)>,
) -> ApiResult<impl IntoResponse> {
    let kind: LogKind = kind.parse().map_err(|_| ApiError::NotFound)?;
    tracing::debug!("Getting {} of version {}", kind, id);

    let bytes = state.state.log_version(&id, kind).await?;
    Ok(([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], bytes))
}
