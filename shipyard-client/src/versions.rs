//! Version and action endpoints

use crate::ShipyardClient;
use crate::error::Result;
use reqwest::Method;
use shipyard_core::dto::Message;
use shipyard_core::dto::action::ActionRequest;
use shipyard_core::dto::version::{LogKind, VersionDetails, VersionList};

impl ShipyardClient {
    // =============================================================================
    // Versions
    // =============================================================================

    /// Version of the running orchestrator
    pub async fn server_version(&self) -> Result<String> {
        let response = self.request(Method::GET, "/version").send().await?;

        self.handle_text_response(response).await
    }

    /// List every known version, oldest first
    pub async fn list_versions(&self) -> Result<VersionList> {
        let response = self.request(Method::GET, "/versions").send().await?;

        self.handle_response(response).await
    }

    /// Get the workflows recorded for a version
    ///
    /// # Arguments
    /// * `id` - The version identifier
    ///
    /// # Returns
    /// The version with its trigger, deploy and release runners
    pub async fn get_version(&self, id: &str) -> Result<VersionDetails> {
        let path = format!("/versions/{}", id);
        let response = self.request(Method::GET, &path).send().await?;

        self.handle_response(response).await
    }

    /// Read the captured output of a released version
    ///
    /// # Arguments
    /// * `id` - The version identifier
    /// * `kind` - Standard output (`log`) or standard error (`err`)
    pub async fn version_log(&self, id: &str, kind: LogKind) -> Result<String> {
        let path = format!("/versions/{}/{}", id, kind);
        let response = self.request(Method::GET, &path).send().await?;

        self.handle_text_response(response).await
    }

    // =============================================================================
    // Actions
    // =============================================================================

    /// Ask the orchestrator to deploy the current head again
    pub async fn start_deployment(&self) -> Result<Message> {
        let response = self
            .request(Method::POST, "/actions")
            .json(&ActionRequest::start())
            .send()
            .await?;

        self.handle_response(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ClientError;
    use axum::extract::Path;
    use axum::http::StatusCode;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use std::sync::{Arc, Mutex};

    async fn serve(router: Router) -> ShipyardClient {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, router).await });
        ShipyardClient::new(format!("http://{addr}/"))
    }

    fn fake_api() -> Router {
        Router::new()
            .route("/v0/version", get(|| async { "0.1.0" }))
            .route(
                "/v0/versions",
                get(|| async {
                    Json(VersionList {
                        versions: vec!["v1".to_string(), "v2".to_string()],
                    })
                }),
            )
            .route(
                "/v0/versions/{id}",
                get(|Path(id): Path<String>| async move {
                    if id == "v1" {
                        Ok(Json(VersionDetails {
                            version: id,
                            workflows: vec![],
                        }))
                    } else {
                        Err((StatusCode::NOT_FOUND, Json(Message::new("not found"))))
                    }
                }),
            )
            .route(
                "/v0/versions/{id}/{kind}",
                get(|Path((id, kind)): Path<(String, String)>| async move { format!("{id} {kind}\n") }),
            )
    }

    #[tokio::test]
    async fn test_read_versions() {
        let client = serve(fake_api()).await;

        assert_eq!(client.server_version().await.unwrap(), "0.1.0");
        assert_eq!(client.list_versions().await.unwrap().versions, vec!["v1", "v2"]);
        assert_eq!(client.get_version("v1").await.unwrap().version, "v1");
        assert_eq!(client.version_log("v1", LogKind::Err).await.unwrap(), "v1 err\n");
    }

    #[tokio::test]
    async fn test_unknown_version() {
        let client = serve(fake_api()).await;

        let err = client.get_version("nope").await.unwrap_err();

        assert!(err.is_not_found());
        assert!(matches!(err, ClientError::ApiError { ref message, .. } if message == "not found"));
    }

    #[tokio::test]
    async fn test_start_deployment_posts_start() {
        let received = Arc::new(Mutex::new(Vec::new()));
        let seen = received.clone();
        let router = Router::new().route(
            "/v0/actions",
            post(move |Json(request): Json<ActionRequest>| async move {
                seen.lock().unwrap().push(request);
                Json(Message::new("started"))
            }),
        );
        let client = serve(router).await;

        let reply = client.start_deployment().await.unwrap();

        assert_eq!(reply, Message::new("started"));
        assert_eq!(*received.lock().unwrap(), vec![ActionRequest::start()]);
    }
}
