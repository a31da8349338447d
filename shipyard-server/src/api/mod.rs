//! API Module
//!
//! Status API served under `/v0` on the admin listener, next to the git
//! endpoints.

pub mod action;
pub mod error;
pub mod version;

use axum::{
    Router,
    routing::{get, post},
};
use shipyard_core::domain::event::Event;
use std::sync::Arc;
use tokio::sync::mpsc;
use tower_http::trace::TraceLayer;

use crate::auth::{Credentials, require_basic_auth};
use crate::state::StateStore;
use crate::webhook::{self, GitServer};

#[derive(Clone)]
pub struct ApiState {
    pub state: StateStore,
    /// Input of the trigger workflow
    pub trigger: mpsc::Sender<Event>,
}

/// Create the status API router
pub fn create_router(state: ApiState) -> Router {
    let v0 = Router::new()
        .route("/version", get(version::server_version))
        .route("/versions", get(version::list_versions))
        .route("/versions/{id}", get(version::get_version))
        .route("/versions/{id}/{kind}", get(version::get_version_log))
        .route("/actions", post(action::run_action))
        .with_state(state);

    Router::new().nest("/v0", v0)
}

/// Create the admin listener router: status API first, git endpoints for
/// everything else
///
/// # Arguments
/// * `api` - Status API state
/// * `git` - Git endpoints of the repository
/// * `credentials` - Required on every request when set
pub fn create_admin_router(api: ApiState, git: GitServer, credentials: Option<Credentials>) -> Router {
    let router = create_router(api)
        .merge(webhook::router(git))
        .layer(TraceLayer::new_for_http());

    match credentials {
        Some(credentials) => router.layer(axum::middleware::from_fn_with_state(
            Arc::new(credentials),
            require_basic_auth,
        )),
        None => router,
    }
}
