//! Outbound replies. The runtime hands every reply to a [`ResponseSink`];
//! [`SlackDelivery`] renders it as Block Kit and posts it through a
//! [`SlackPoster`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, info};

use proptalk_core::domain::session::SessionKey;
use proptalk_core::errors::DeliveryError;
use proptalk_core::pagination::PropertyBatch;
use proptalk_core::ports::ResponseSink;

use crate::blocks::{reply_message, MessageTemplate};

pub const SLACK_API_BASE: &str = "https://slack.com/api";

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PostError {
    #[error("slack api unreachable: {0}")]
    Transport(String),
    #[error("slack api rejected message: {0}")]
    Rejected(String),
}

impl From<PostError> for DeliveryError {
    fn from(error: PostError) -> Self {
        match error {
            PostError::Transport(message) => DeliveryError::Transport(message),
            PostError::Rejected(message) => DeliveryError::Rejected(message),
        }
    }
}

#[async_trait]
pub trait SlackPoster: Send + Sync {
    async fn post_message(&self, channel_id: &str, message: &MessageTemplate)
        -> Result<(), PostError>;
}

/// Drops messages after logging them. Used when no bot token is configured.
#[derive(Clone, Debug, Default)]
pub struct NoopSlackPoster;

#[async_trait]
impl SlackPoster for NoopSlackPoster {
    async fn post_message(
        &self,
        channel_id: &str,
        message: &MessageTemplate,
    ) -> Result<(), PostError> {
        debug!(channel_id, blocks = message.blocks.len(), "noop slack poster dropped message");
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

/// Posts through the `chat.postMessage` Web API method.
pub struct WebApiPoster {
    base_url: String,
    bot_token: SecretString,
    client: reqwest::Client,
}

impl WebApiPoster {
    pub fn new(bot_token: SecretString, timeout: Duration) -> Result<Self, PostError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| PostError::Transport(error.to_string()))?;
        Ok(Self { base_url: SLACK_API_BASE.to_owned(), bot_token, client })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_owned();
        self
    }
}

#[async_trait]
impl SlackPoster for WebApiPoster {
    async fn post_message(
        &self,
        channel_id: &str,
        message: &MessageTemplate,
    ) -> Result<(), PostError> {
        let body = json!({
            "channel": channel_id,
            "text": message.fallback_text,
            "blocks": message.blocks,
        });
        let response = self
            .client
            .post(format!("{}/chat.postMessage", self.base_url))
            .bearer_auth(self.bot_token.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|error| PostError::Transport(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PostError::Transport(format!("http status {status}")));
        }
        let parsed: ApiResponse =
            response.json().await.map_err(|error| PostError::Transport(error.to_string()))?;
        if parsed.ok {
            Ok(())
        } else {
            Err(PostError::Rejected(parsed.error.unwrap_or_else(|| "unknown_error".to_owned())))
        }
    }
}

/// Replies land in the channel the session belongs to.
pub struct SlackDelivery {
    poster: Arc<dyn SlackPoster>,
}

impl Default for SlackDelivery {
    fn default() -> Self {
        Self { poster: Arc::new(NoopSlackPoster) }
    }
}

impl SlackDelivery {
    pub fn new(poster: Arc<dyn SlackPoster>) -> Self {
        Self { poster }
    }
}

#[async_trait]
impl ResponseSink for SlackDelivery {
    async fn deliver(
        &self,
        session: &SessionKey,
        text: &str,
        batch: Option<&PropertyBatch>,
    ) -> Result<(), DeliveryError> {
        let message = reply_message(text, batch);
        self.poster.post_message(&session.channel, &message).await?;
        info!(
            event_name = "delivery.slack.posted",
            session_key = %session,
            batch_size = batch.map_or(0, |batch| batch.properties.len()),
            "reply posted to slack"
        );
        Ok(())
    }
}
