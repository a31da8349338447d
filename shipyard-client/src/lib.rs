//! Shipyard HTTP Client
//!
//! A small, typed client for the status API served on the orchestrator's
//! admin listener.
//!
//! # Example
//!
//! ```no_run
//! use shipyard_client::ShipyardClient;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = ShipyardClient::new("http://localhost:8080");
//!
//!     for version in client.list_versions().await?.versions {
//!         println!("{}", version);
//!     }
//!     Ok(())
//! }
//! ```

pub mod error;
mod versions;

// Re-export commonly used types
pub use error::{ClientError, Result};
pub use shipyard_core::dto::version::{LogKind, VersionDetails, VersionList};

use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use tracing::debug;

/// HTTP client for the Shipyard status API
#[derive(Debug, Clone)]
pub struct ShipyardClient {
    /// Base URL of the admin listener (e.g., "http://localhost:8080")
    base_url: String,
    /// HTTP client instance
    client: Client,
    /// Basic auth credentials sent with every request
    credentials: Option<(String, String)>,
}

impl ShipyardClient {
    /// Create a new client
    ///
    /// # Arguments
    /// * `base_url` - The base URL of the admin listener (e.g., "http://localhost:8080")
    ///
    /// # Example
    /// ```
    /// use shipyard_client::ShipyardClient;
    ///
    /// let client = ShipyardClient::new("http://localhost:8080");
    /// ```
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, Client::new())
    }

    /// Create a new client with a custom HTTP client
    ///
    /// This allows you to configure timeouts, proxies, TLS settings, etc.
    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            credentials: None,
        }
    }

    /// Send basic auth credentials with every request
    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some((username.into(), password.into()));
        self
    }

    /// Get the base URL of the admin listener
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Start a request to `path` under the API root
    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}/v0{}", self.base_url, path);
        debug!("{} {}", method, url);
        let builder = self.client.request(method, url);
        match &self.credentials {
            Some((username, password)) => builder.basic_auth(username, Some(password)),
            None => builder,
        }
    }

    // =============================================================================
    // Response Handlers
    // =============================================================================

    /// Fail on a non-success status, keeping the server's message
    async fn check_status(&self, response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ClientError::api_error(status.as_u16(), error_text));
        }

        Ok(response)
    }

    /// Handle an API response and deserialize JSON
    async fn handle_response<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        self.check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| ClientError::ParseError(format!("Failed to parse JSON response: {}", e)))
    }

    /// Handle an API response with a plain text body
    async fn handle_text_response(&self, response: reqwest::Response) -> Result<String> {
        self.check_status(response)
            .await?
            .text()
            .await
            .map_err(|e| ClientError::ParseError(format!("Failed to read response body: {}", e)))
    }
}
