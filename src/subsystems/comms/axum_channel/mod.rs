//! Axum HTTP channel serving the JSON web API, plus the Discord interactions
//! endpoint when that channel is enabled.
//!
//! It implements [`Component`] so it slots into the comms subsystem
//! lifecycle: `run()` drives the axum event loop and the shared
//! [`CancellationToken`] is wired to axum's graceful shutdown.
//!
//! ## URL layout
//!
//! ```text
//! GET  /
//! GET  /health
//! POST /ask
//! GET  /history/{user_id}?limit=N
//! GET  /specs
//! POST /specs
//! POST /specs/{feature}/plan
//! POST /specs/{feature}/tasks
//! POST /discord/interactions      (channel-discord)
//! ```

mod api;

use std::sync::Arc;

use axum::{Router, routing::{get, post}};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::AppError;
use crate::subsystems::runtime::{Component, ComponentFuture};
#[cfg(feature = "channel-discord")]
use super::discord::DiscordBot;

use super::state::CommsState;

#[cfg(feature = "channel-discord")]
pub(crate) type OptionalDiscord = Option<Arc<DiscordBot>>;
#[cfg(not(feature = "channel-discord"))]
pub(crate) type OptionalDiscord = Option<()>;

/// Axum router state injected into every handler via [`axum::extract::State`].
///
/// Cheap to clone; all fields are reference-counted.
#[derive(Clone)]
pub(crate) struct AxumState {
    pub channel_id: Arc<str>,
    pub comms: Arc<CommsState>,
    #[cfg_attr(not(feature = "channel-discord"), allow(dead_code))]
    pub discord: OptionalDiscord,
}

pub struct AxumChannel {
    channel_id: String,
    bind_addr: String,
    state: Arc<CommsState>,
    discord: OptionalDiscord,
}

impl AxumChannel {
    pub(crate) fn new(
        channel_id: impl Into<String>,
        bind_addr: impl Into<String>,
        state: Arc<CommsState>,
        discord: OptionalDiscord,
    ) -> Self {
        Self {
            channel_id: channel_id.into(),
            bind_addr: bind_addr.into(),
            state,
            discord,
        }
    }
}

impl Component for AxumChannel {
    fn id(&self) -> &str {
        &self.channel_id
    }

    fn run(self: Box<Self>, shutdown: CancellationToken) -> ComponentFuture {
        Box::pin(run_axum(
            self.channel_id,
            self.bind_addr,
            self.state,
            self.discord,
            shutdown,
        ))
    }
}

async fn run_axum(
    channel_id: String,
    bind_addr: String,
    comms: Arc<CommsState>,
    discord: OptionalDiscord,
    shutdown: CancellationToken,
) -> Result<(), AppError> {
    let router = build_router(AxumState {
        channel_id: Arc::from(channel_id.as_str()),
        comms,
        discord,
    });

    let listener = TcpListener::bind(&bind_addr)
        .await
        .map_err(|e| AppError::Comms(format!("axum bind failed on {bind_addr}: {e}")))?;

    info!(%channel_id, %bind_addr, "api listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| AppError::Comms(format!("axum server error: {e}")))?;

    info!(%channel_id, "api shut down");
    Ok(())
}

pub(crate) fn build_router(state: AxumState) -> Router {
    #[allow(unused_mut)]
    let mut router = Router::new()
        .route("/",                        get(api::root))
        .route("/health",                  get(api::health))
        .route("/ask",                     post(api::ask))
        .route("/history/{user_id}",       get(api::history))
        .route("/specs",                   get(api::list_specs).post(api::create_spec))
        .route("/specs/{feature}/plan",    post(api::plan_spec))
        .route("/specs/{feature}/tasks",   post(api::task_spec));

    #[cfg(feature = "channel-discord")]
    {
        if state.discord.is_some() {
            router = router.route("/discord/interactions", post(api::discord_interactions));
        }
    }

    router.with_state(state)
}
