//! Action API Handlers

use axum::{Json, body::Bytes, extract::State};
use shipyard_core::domain::env::EnvVars;
use shipyard_core::domain::event::Event;
use shipyard_core::dto::Message;
use shipyard_core::dto::action::ActionRequest;

use super::ApiState;
use crate::api::error::{ApiError, ApiResult};

/// POST /v0/actions
/// `{"command": "start"}` requests a build of the current head, like a push
pub async fn run_action(State(state): State<ApiState>, body: Bytes) -> ApiResult<Json<Message>> {
    let request: ActionRequest = serde_json::from_slice(&body).map_err(|_| ApiError::BadRequest)?;
    if !request.is_start() {
        tracing::debug!("Unknown action: {}", request.command);
        return Err(ApiError::BadRequest);
    }

    tracing::info!("Manual deployment requested");
    state
        .trigger
        .send(Event::triggered(EnvVars::new()))
        .await
        .map_err(|_| ApiError::InternalError("trigger workflow stopped".to_string()))?;

    Ok(Json(Message::new("started")))
}
