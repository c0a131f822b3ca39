//! Comms subsystem: manages all external I/O channels.
//!
//! # Architecture
//!
//! Each channel implements [`runtime::Component`] and is spawned as an
//! independent concurrent task by [`start`] via
//! [`runtime::spawn_components`]. Channels capture their shared
//! [`Arc<CommsState>`] at construction time; no state is passed through the
//! generic `Component::run` signature.
//!
//! The Discord channel has no socket of its own: its interactions route is
//! mounted on the axum router, and a registrar component publishes the slash
//! commands at startup.
//!
//! [`runtime::Component`]: crate::subsystems::runtime::Component
//! [`runtime::spawn_components`]: crate::subsystems::runtime::spawn_components

pub mod axum_channel;
#[cfg(feature = "channel-discord")]
pub mod discord;
mod state;

pub use state::CommsState;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;
#[cfg(feature = "channel-discord")]
use tracing::warn;

use crate::config::Config;
use crate::error::AppError;
use crate::subsystems::runtime::{Component, SubsystemHandle, spawn_components};

use axum_channel::{AxumChannel, OptionalDiscord};

/// Spawn all configured comms channels and return a [`SubsystemHandle`].
///
/// Fails only on configuration errors (e.g. a malformed Discord public key).
/// Once spawned, any channel exiting with an error cancels `shutdown` so its
/// siblings stop cooperatively.
pub fn start(
    config: &Config,
    state: Arc<CommsState>,
    shutdown: CancellationToken,
) -> Result<SubsystemHandle, AppError> {
    let mut components: Vec<Box<dyn Component>> = Vec::new();

    #[allow(unused_mut)]
    let mut discord: OptionalDiscord = None;

    #[cfg(feature = "channel-discord")]
    {
        if config.discord_should_load() {
            info!("loading discord channel");
            let secrets = &config.secrets;
            let public_key = discord::parse_public_key(secrets.discord_public_key.as_deref().unwrap_or_default())?;
            let client = discord::DiscordClient::new(
                &config.discord.api_base_url,
                secrets.discord_application_id.clone().unwrap_or_default(),
                secrets.discord_token.clone(),
            )?;

            if secrets.discord_token.is_some() {
                components.push(Box::new(discord::DiscordRegistrar::new(
                    "discord0",
                    client.clone(),
                    state.discord_ready_flag(),
                )));
            } else {
                warn!("DISCORD_TOKEN not set, slash commands will not be registered");
            }
            discord = Some(Arc::new(discord::DiscordBot::new(state.clone(), client, public_key)));
        } else if config.discord.enabled {
            warn!("discord enabled but DISCORD_PUBLIC_KEY or DISCORD_APPLICATION_ID is missing, channel disabled");
        }
    }

    info!("loading api channel");
    components.push(Box::new(AxumChannel::new("api0", config.api.bind_addr(), state, discord)));

    Ok(spawn_components(components, shutdown))
}
