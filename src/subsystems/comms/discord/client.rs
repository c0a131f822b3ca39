//! Discord REST calls: command registration and interaction follow-ups.

use std::time::Duration;

use reqwest::Client;
use serde_json::{Value, json};
use tracing::{debug, info};

use super::DiscordError;

/// Discord rejects message content longer than this.
pub const MAX_MESSAGE_CHARS: usize = 2000;

#[derive(Debug, Clone)]
pub struct DiscordClient {
    http: Client,
    api_base_url: String,
    application_id: String,
    bot_token: Option<String>,
}

impl DiscordClient {
    pub fn new(
        api_base_url: &str,
        application_id: impl Into<String>,
        bot_token: Option<String>,
    ) -> Result<Self, DiscordError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| DiscordError::Request(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
            application_id: application_id.into(),
            bot_token,
        })
    }

    /// Bulk-overwrite the global slash commands.
    pub async fn register_commands(&self, commands: &Value) -> Result<(), DiscordError> {
        let token = self.bot_token.as_deref().ok_or(DiscordError::MissingBotToken)?;
        let url = format!("{}/applications/{}/commands", self.api_base_url, self.application_id);
        let resp = self
            .http
            .put(&url)
            .header(reqwest::header::AUTHORIZATION, format!("Bot {token}"))
            .json(commands)
            .send()
            .await
            .map_err(|e| DiscordError::Request(e.to_string()))?;
        check(resp).await?;
        info!(count = commands.as_array().map_or(0, Vec::len), "discord commands registered");
        Ok(())
    }

    /// Replace the deferred "thinking…" response.
    pub async fn edit_original(&self, interaction_token: &str, content: &str) -> Result<(), DiscordError> {
        let url = format!(
            "{}/webhooks/{}/{}/messages/@original",
            self.api_base_url, self.application_id, interaction_token
        );
        let resp = self
            .http
            .patch(&url)
            .json(&json!({ "content": content }))
            .send()
            .await
            .map_err(|e| DiscordError::Request(e.to_string()))?;
        check(resp).await
    }

    pub async fn followup(&self, interaction_token: &str, content: &str) -> Result<(), DiscordError> {
        let url = format!("{}/webhooks/{}/{}", self.api_base_url, self.application_id, interaction_token);
        let resp = self
            .http
            .post(&url)
            .json(&json!({ "content": content }))
            .send()
            .await
            .map_err(|e| DiscordError::Request(e.to_string()))?;
        check(resp).await
    }

    /// Deliver a deferred reply of any length: the first chunk edits the
    /// original response, the rest go out as follow-ups.
    pub async fn deliver(&self, interaction_token: &str, content: &str) -> Result<(), DiscordError> {
        let chunks = split_message(content, MAX_MESSAGE_CHARS);
        debug!(chunks = chunks.len(), "delivering discord reply");
        let mut chunks = chunks.iter();
        if let Some(first) = chunks.next() {
            self.edit_original(interaction_token, first).await?;
        }
        for chunk in chunks {
            self.followup(interaction_token, chunk).await?;
        }
        Ok(())
    }
}

async fn check(resp: reqwest::Response) -> Result<(), DiscordError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(());
    }
    let body = resp.text().await.unwrap_or_default();
    Err(DiscordError::Status { status: status.as_u16(), body })
}

/// Split `text` into chunks of at most `max` characters, breaking after a
/// newline when one falls inside the window.
pub fn split_message(text: &str, max: usize) -> Vec<String> {
    let max = max.max(1);
    let mut chunks = Vec::new();
    let mut rest: Vec<char> = text.chars().collect();
    while rest.len() > max {
        let cut = rest[..max]
            .iter()
            .rposition(|&c| c == '\n')
            .filter(|&i| i > 0)
            .map_or(max, |i| i + 1);
        let tail = rest.split_off(cut);
        chunks.push(rest.into_iter().collect());
        rest = tail;
    }
    if !rest.is_empty() || chunks.is_empty() {
        chunks.push(rest.into_iter().collect());
    }
    chunks
}
