//! Git webhook
//!
//! Serves the repository under `/<repository>/...` through a
//! [`GitProtocol`] handler and turns every successful push into a
//! `triggered` event for the pipeline.

use axum::{
    Router,
    extract::{Request, State},
    http::{Method, StatusCode, Uri},
    response::{IntoResponse, Response},
};
use shipyard_core::domain::env::EnvVars;
use shipyard_core::domain::event::Event;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::git::backend::{GitProtocol, RECEIVE_PACK};

#[derive(Clone)]
pub struct GitServer {
    repository: String,
    protocol: Arc<dyn GitProtocol>,
    trigger: mpsc::Sender<Event>,
}

impl GitServer {
    /// # Arguments
    /// * `repository` - Name clients push to
    /// * `protocol` - Handler serving the bare repository
    /// * `trigger` - Input of the trigger workflow
    pub fn new(repository: String, protocol: Arc<dyn GitProtocol>, trigger: mpsc::Sender<Event>) -> Self {
        Self {
            repository,
            protocol,
            trigger,
        }
    }

    /// Path relative to the repository, `None` when `path` is outside it
    ///
    /// Both `/<name>/...` and `/<name>.git/...` are accepted.
    fn strip_repository<'a>(&self, path: &'a str) -> Option<&'a str> {
        let rest = path.strip_prefix('/')?.strip_prefix(self.repository.as_str())?;
        let rest = rest.strip_prefix(".git").unwrap_or(rest);
        match rest {
            "" => Some("/"),
            rest if rest.starts_with('/') => Some(rest),
            _ => None,
        }
    }
}

/// Router serving the git endpoints
pub fn router(server: GitServer) -> Router {
    Router::new()
        .fallback(capture_and_trigger)
        .with_state(server)
}

/// Delegates to the git handler and raises a trigger after a push
///
/// The response is held until the trigger workflow has accepted the event.
pub async fn capture_and_trigger(State(server): State<GitServer>, mut request: Request) -> Response {
    let Some(path) = server.strip_repository(request.uri().path()) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let relative = match request.uri().query() {
        Some(query) => format!("{path}?{query}"),
        None => path.to_string(),
    };
    let is_push = request.method() == Method::POST && path == format!("/{RECEIVE_PACK}");

    let Ok(uri) = relative.parse::<Uri>() else {
        return StatusCode::BAD_REQUEST.into_response();
    };
    *request.uri_mut() = uri;

    let response = server.protocol.serve(request).await;

    if is_push && response.status().is_success() {
        info!("Push received on {}, triggering pipeline", server.repository);
        if server
            .trigger
            .send(Event::triggered(EnvVars::new()))
            .await
            .is_err()
        {
            warn!("Trigger workflow stopped, push ignored");
        }
    }

    response
}
