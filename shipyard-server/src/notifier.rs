//! Release notifications
//!
//! The release workflow reports every cutover (or failed start) through a
//! [`Notifier`]. Slack is the only real backend; without a token or a
//! resolvable channel a no-op notifier is used.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use shipyard_core::domain::env::EnvVars;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::SlackConfig;

const SLACK_API: &str = "https://slack.com/api";

#[derive(Debug, Error)]
pub enum NotifierError {
    #[error("slack request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("slack error: {0}")]
    Slack(String),

    #[error("slack channel {0} not found")]
    ChannelNotFound(String),
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_message(&self, message: &str) -> Result<(), NotifierError>;
}

/// Drops every message
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn send_message(&self, _message: &str) -> Result<(), NotifierError> {
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct ConversationsList {
    ok: bool,
    #[serde(default)]
    channels: Vec<Channel>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Channel {
    id: String,
    name: String,
}

#[derive(Debug, Serialize)]
struct PostMessage<'a> {
    channel: &'a str,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct PostMessageResponse {
    ok: bool,
    ts: Option<String>,
    error: Option<String>,
}

/// Posts to a Slack channel through the Web API
pub struct SlackNotifier {
    client: reqwest::Client,
    base_url: String,
    token: String,
    channel_id: String,
}

impl SlackNotifier {
    /// Builds the notifier for `config`, or a no-op one when Slack is not usable
    ///
    /// Token and channel may reference OS environment variables
    /// (`${SLACK_TOKEN}`).
    pub async fn connect(config: &SlackConfig) -> Arc<dyn Notifier> {
        let envs = EnvVars::from_process_env();
        let token = envs.replace(&config.token).unwrap_or_default();
        let channel = envs.replace(&config.channel).unwrap_or_default();

        if token.is_empty() || channel.is_empty() {
            info!("Slack notifications disabled");
            return Arc::new(NoopNotifier);
        }

        match Self::connect_to(SLACK_API, token, &channel).await {
            Ok(notifier) => Arc::new(notifier),
            Err(e) => {
                warn!("Slack notifications disabled: {}", e);
                Arc::new(NoopNotifier)
            }
        }
    }

    /// Looks the channel up on the API at `base_url`
    pub async fn connect_to(base_url: &str, token: String, channel: &str) -> Result<Self, NotifierError> {
        let client = reqwest::Client::new();
        let base_url = base_url.trim_end_matches('/').to_string();

        let list: ConversationsList = client
            .get(format!("{base_url}/conversations.list"))
            .bearer_auth(&token)
            .query(&[("types", "public_channel")])
            .send()
            .await?
            .json()
            .await?;

        if !list.ok {
            return Err(NotifierError::Slack(list.error.unwrap_or_default()));
        }

        let channel_id = list
            .channels
            .into_iter()
            .find(|c| c.name == channel)
            .map(|c| c.id)
            .ok_or_else(|| NotifierError::ChannelNotFound(channel.to_string()))?;

        info!("Slack notifications enabled on #{}", channel);
        Ok(Self {
            client,
            base_url,
            token,
            channel_id,
        })
    }
}

#[async_trait]
impl Notifier for SlackNotifier {
    async fn send_message(&self, message: &str) -> Result<(), NotifierError> {
        let response: PostMessageResponse = self
            .client
            .post(format!("{}/chat.postMessage", self.base_url))
            .bearer_auth(&self.token)
            .json(&PostMessage {
                channel: &self.channel_id,
                text: message,
            })
            .send()
            .await?
            .json()
            .await?;

        if !response.ok {
            return Err(NotifierError::Slack(response.error.unwrap_or_default()));
        }
        info!(
            "Message sent to channel {} at {}",
            self.channel_id,
            response.ts.unwrap_or_default()
        );
        Ok(())
    }
}
