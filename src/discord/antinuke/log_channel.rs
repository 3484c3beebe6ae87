// Log channel resolution: the configured channel if it still exists, else a
// text channel with the fallback name (created if missing). Sending is best
// effort.

use crate::discord::Data;
use anyhow::Result;
use poise::serenity_prelude::{self as serenity, Context};

/// The parts of a guild channel the lookup looks at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelCandidate {
    pub id: u64,
    pub is_text: bool,
    pub name: String,
}

impl From<&serenity::GuildChannel> for ChannelCandidate {
    fn from(channel: &serenity::GuildChannel) -> Self {
        Self {
            id: channel.id.get(),
            is_text: channel.kind == serenity::ChannelType::Text,
            name: channel.name.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogChannelChoice {
    /// The stored channel still exists.
    Stored(u64),
    /// A text channel with the fallback name exists; store it.
    Adopt(u64),
    Create,
}

/// Decide where reports go given the stored id and the guild's channels.
///
/// A stored id whose channel is gone (deleted during a nuke) falls through to
/// the name lookup.
pub fn choose_log_channel(
    stored: Option<u64>,
    channels: &[ChannelCandidate],
    fallback_name: &str,
) -> LogChannelChoice {
    if let Some(id) = stored {
        if channels.iter().any(|c| c.id == id && c.is_text) {
            return LogChannelChoice::Stored(id);
        }
    }

    channels
        .iter()
        .find(|c| c.is_text && c.name == fallback_name)
        .map(|c| LogChannelChoice::Adopt(c.id))
        .unwrap_or(LogChannelChoice::Create)
}

async fn guild_channels(ctx: &Context, guild: serenity::GuildId) -> Result<Vec<ChannelCandidate>> {
    let cached = ctx
        .cache
        .guild(guild)
        .map(|g| g.channels.values().map(ChannelCandidate::from).collect::<Vec<_>>());
    if let Some(channels) = cached {
        return Ok(channels);
    }

    Ok(guild
        .channels(&ctx.http)
        .await?
        .values()
        .map(ChannelCandidate::from)
        .collect())
}

/// Channel antinuke reports go to, storing the fallback once it is found.
pub async fn resolve_log_channel(
    ctx: &Context,
    data: &Data,
    guild_id: u64,
) -> Result<serenity::ChannelId> {
    let guild = serenity::GuildId::new(guild_id);
    let name = data.config.log_channel_name.as_str();

    let stored = data.antinuke.log_channel(guild_id).await?;
    let channels = guild_channels(ctx, guild).await?;

    let channel_id = match choose_log_channel(stored, &channels, name) {
        LogChannelChoice::Stored(id) => return Ok(serenity::ChannelId::new(id)),
        LogChannelChoice::Adopt(id) => serenity::ChannelId::new(id),
        LogChannelChoice::Create => {
            tracing::info!(guild_id, channel_name = name, "Creating antinuke log channel");
            guild
                .create_channel(
                    &ctx.http,
                    serenity::CreateChannel::new(name)
                        .kind(serenity::ChannelType::Text)
                        .audit_log_reason("Auto-created log channel for antinuke"),
                )
                .await?
                .id
        }
    };

    if let Some(missing) = stored {
        tracing::warn!(guild_id, missing, replacement = channel_id.get(), "Log channel is gone");
    }
    data.antinuke
        .set_log_channel(guild_id, channel_id.get())
        .await?;
    Ok(channel_id)
}

pub async fn send_embed(ctx: &Context, data: &Data, guild_id: u64, embed: serenity::CreateEmbed) {
    let channel = match resolve_log_channel(ctx, data, guild_id).await {
        Ok(channel) => channel,
        Err(e) => {
            tracing::warn!(guild_id, error = %e, "No antinuke log channel available");
            return;
        }
    };

    if let Err(e) = channel
        .send_message(&ctx.http, serenity::CreateMessage::new().embed(embed))
        .await
    {
        tracing::warn!("Failed to send log to channel {}: {}", channel, e);
    }
}
