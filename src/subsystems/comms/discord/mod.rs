//! Discord channel: slash commands delivered as HTTP interactions.
//!
//! Discord POSTs every interaction to `/discord/interactions`. The handler
//! verifies the request signature, answers PING with PONG, and dispatches
//! application commands:
//!
//! ```text
//! /ask question        deferred; the answer edits the original response
//! /history [limit]     deferred, ephemeral
//! /specify description deferred
//! /plan feature        deferred
//! /tasks feature       deferred
//! /features            deferred
//! ```
//!
//! Deferred commands must be acknowledged within three seconds, so the work
//! runs in a spawned task that delivers the reply through the webhook API.
//! Every command with a reply of unbounded length is deferred, because only
//! webhook delivery can split a reply past [`MAX_MESSAGE_CHARS`].
//!
//! [`DiscordRegistrar`] is the startup component: it bulk-registers the
//! commands and flips the ready flag reported by `/health`.

mod client;
pub mod interaction;
mod verify;

pub use client::{DiscordClient, MAX_MESSAGE_CHARS, split_message};
pub use verify::{SIGNATURE_HEADER, TIMESTAMP_HEADER, parse_public_key};

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use ed25519_dalek::VerifyingKey;
use serde_json::Value;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::AppError;
use crate::models::validate_question_text;
use crate::subsystems::assistant::AskOutcome;
use crate::subsystems::runtime::{Component, ComponentFuture};
use crate::subsystems::spec_kit::SpecKitError;

use super::state::CommsState;
use interaction::{APPLICATION_COMMAND, Interaction, PING};

const DEFAULT_HISTORY_LIMIT: i64 = 5;
const MAX_HISTORY_LIMIT: i64 = 20;

#[derive(Debug, Error)]
pub enum DiscordError {
    #[error("invalid public key: {0}")]
    PublicKey(String),
    #[error("DISCORD_TOKEN is not set")]
    MissingBotToken,
    #[error("request failed: {0}")]
    Request(String),
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },
}

impl From<DiscordError> for AppError {
    fn from(e: DiscordError) -> Self {
        AppError::Comms(format!("discord: {e}"))
    }
}

// ── Reply formatting ──────────────────────────────────────────────────────────

pub fn format_outcome(outcome: &AskOutcome) -> String {
    match outcome {
        AskOutcome::Answered(a) => {
            format!("📊 **Analyzed {} commits**\n\n{}", a.commits_analyzed, a.answer)
        }
        AskOutcome::NoCommits { hours } => format!("❌ No commits in last {hours} hours!"),
        AskOutcome::Failed(e) => format!("❌ Error: {e}"),
        AskOutcome::TimedOut => "❌ Request timed out. Please try again.".to_string(),
    }
}

fn format_spec_error(e: &SpecKitError) -> String {
    format!("❌ Error: {e}")
}

// ── DiscordBot ────────────────────────────────────────────────────────────────

/// Everything the interactions route needs. Shared as `Arc<DiscordBot>`.
pub struct DiscordBot {
    comms: Arc<CommsState>,
    client: DiscordClient,
    public_key: VerifyingKey,
}

impl DiscordBot {
    pub fn new(comms: Arc<CommsState>, client: DiscordClient, public_key: VerifyingKey) -> Self {
        Self { comms, client, public_key }
    }

    /// Entry point for `POST /discord/interactions`.
    pub async fn handle(self: Arc<Self>, headers: &HeaderMap, body: &[u8]) -> Response {
        let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
        let (Some(signature), Some(timestamp)) = (header(SIGNATURE_HEADER), header(TIMESTAMP_HEADER))
        else {
            warn!("discord interaction without signature headers");
            return (StatusCode::UNAUTHORIZED, "missing request signature").into_response();
        };
        if !verify::verify(&self.public_key, signature, timestamp, body) {
            warn!("discord interaction with invalid signature");
            return (StatusCode::UNAUTHORIZED, "invalid request signature").into_response();
        }
        if !verify::is_fresh(timestamp, Utc::now()) {
            warn!(%timestamp, "discord interaction with stale timestamp");
            return (StatusCode::UNAUTHORIZED, "stale request timestamp").into_response();
        }

        let interaction: Interaction = match serde_json::from_slice(body) {
            Ok(i) => i,
            Err(e) => {
                warn!("malformed discord interaction: {e}");
                return (StatusCode::BAD_REQUEST, "malformed interaction").into_response();
            }
        };

        match interaction.kind {
            PING => {
                debug!("discord ping");
                Json(interaction::pong()).into_response()
            }
            APPLICATION_COMMAND => Json(self.dispatch(interaction).await).into_response(),
            other => {
                warn!(kind = other, "unsupported interaction type");
                (StatusCode::BAD_REQUEST, "unsupported interaction type").into_response()
            }
        }
    }

    async fn dispatch(self: Arc<Self>, interaction: Interaction) -> Value {
        let Some(user_id) = interaction.user_id().map(str::to_string) else {
            return interaction::ephemeral("❌ Error: could not identify the invoking user");
        };
        let command = interaction.command_name().unwrap_or_default().to_string();
        info!(%command, %user_id, "discord command invoked");

        match command.as_str() {
            "ask" => {
                let question = interaction.option_str("question").unwrap_or_default().to_string();
                if let Err(reason) = validate_question_text(&question) {
                    return interaction::ephemeral(&format!("❌ Error: {reason}"));
                }
                self.defer(interaction.token, interaction::deferred(), move |bot| async move {
                    format_outcome(&bot.comms.ask(&user_id, &question).await)
                })
            }
            "history" => {
                let limit = interaction
                    .option_i64("limit")
                    .unwrap_or(DEFAULT_HISTORY_LIMIT)
                    .clamp(1, MAX_HISTORY_LIMIT) as usize;
                self.defer(interaction.token, interaction::deferred_ephemeral(), move |bot| async move {
                    bot.history_reply(&user_id, limit).await
                })
            }
            "specify" => {
                let description = interaction.option_str("description").unwrap_or_default().to_string();
                if description.trim().is_empty() {
                    return interaction::ephemeral("❌ Error: description must not be empty");
                }
                self.defer(interaction.token, interaction::deferred(), move |bot| async move {
                    match bot.comms.spec_kit().specify(&description).await {
                        Ok(r) => format!(
                            "📝 **Specification created:** `{}`\n\n{}",
                            r.feature_name, r.content
                        ),
                        Err(e) => format_spec_error(&e),
                    }
                })
            }
            "plan" => {
                let feature = interaction.option_str("feature").unwrap_or_default().to_string();
                self.defer(interaction.token, interaction::deferred(), move |bot| async move {
                    match bot.comms.spec_kit().plan(&feature).await {
                        Ok(r) => format!(
                            "🗺️ **Plan created for** `{}`\n• {}\n• {}",
                            r.feature_name,
                            r.contracts_file.display(),
                            r.plan_file.display()
                        ),
                        Err(e) => format_spec_error(&e),
                    }
                })
            }
            "tasks" => {
                let feature = interaction.option_str("feature").unwrap_or_default().to_string();
                self.defer(interaction.token, interaction::deferred(), move |bot| async move {
                    match bot.comms.spec_kit().task(&feature).await {
                        Ok(r) => format!("✅ **Tasks for** `{}`\n\n{}", r.feature_name, r.content),
                        Err(e) => format_spec_error(&e),
                    }
                })
            }
            "features" => self.defer(interaction.token, interaction::deferred(), |bot| async move {
                bot.features_reply().await
            }),
            other => {
                warn!(command = other, "unknown discord command");
                interaction::ephemeral(&format!("❌ Unknown command: /{other}"))
            }
        }
    }

    /// Acknowledge with `ack` now, run `work` in the background, and deliver
    /// its reply.
    fn defer<F, Fut>(self: Arc<Self>, token: String, ack: Value, work: F) -> Value
    where
        F: FnOnce(Arc<Self>) -> Fut + Send + 'static,
        Fut: Future<Output = String> + Send + 'static,
    {
        tokio::spawn(async move {
            let client = self.client.clone();
            let reply = work(self).await;
            if let Err(e) = client.deliver(&token, &reply).await {
                error!("failed to deliver discord reply: {e}");
            }
        });
        ack
    }

    async fn history_reply(&self, user_id: &str, limit: usize) -> String {
        match self.comms.history(user_id, limit).await {
            Ok(entries) if entries.is_empty() => "No questions yet. Try `/ask`!".to_string(),
            Ok(entries) => {
                let mut out = format!("🕘 **Your last {} questions**\n", entries.len());
                for e in &entries {
                    out.push_str(&format!(
                        "\n**Q:** {}\n**A:** {}\n",
                        e.question,
                        crate::subsystems::pipeline::preview(&e.answer)
                    ));
                }
                out
            }
            Err(e) => {
                warn!(%user_id, "history lookup failed: {e}");
                format!("❌ Error: {e}")
            }
        }
    }

    async fn features_reply(&self) -> String {
        match self.comms.spec_kit().list_features().await {
            Ok(features) if features.is_empty() => "No features yet. Try `/specify`!".to_string(),
            Ok(features) => {
                let mark = |b: bool| if b { "✅" } else { "⬜" };
                let mut out = String::from("📂 **Features**\n");
                for f in &features {
                    out.push_str(&format!(
                        "\n`{}` spec {} · plan {} · tasks {}",
                        f.name,
                        mark(f.has_spec),
                        mark(f.has_plan),
                        mark(f.has_tasks)
                    ));
                }
                out
            }
            Err(e) => format_spec_error(&e),
        }
    }
}

// ── DiscordRegistrar ──────────────────────────────────────────────────────────

/// Registers slash commands once at startup, then idles until shutdown.
pub struct DiscordRegistrar {
    channel_id: String,
    client: DiscordClient,
    ready: Arc<AtomicBool>,
}

impl DiscordRegistrar {
    pub fn new(channel_id: impl Into<String>, client: DiscordClient, ready: Arc<AtomicBool>) -> Self {
        Self { channel_id: channel_id.into(), client, ready }
    }
}

impl Component for DiscordRegistrar {
    fn id(&self) -> &str {
        &self.channel_id
    }

    fn run(self: Box<Self>, shutdown: CancellationToken) -> ComponentFuture {
        Box::pin(async move {
            let commands = interaction::command_definitions();
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => return Ok(()),
                result = self.client.register_commands(&commands) => match result {
                    Ok(()) => {
                        self.ready.store(true, Ordering::Relaxed);
                        info!(channel_id = %self.channel_id, "discord bot ready");
                    }
                    // Commands from an earlier registration stay live.
                    Err(e) => warn!(channel_id = %self.channel_id, "discord command registration failed: {e}"),
                },
            }
            shutdown.cancelled().await;
            self.ready.store(false, Ordering::Relaxed);
            info!(channel_id = %self.channel_id, "discord channel shut down");
            Ok(())
        })
    }
}
