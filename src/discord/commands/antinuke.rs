// Antinuke slash commands for configuration.
//
// Same shape as every command in this layer:
// 1. Extract primitive data from Discord types
// 2. Call the core service
// 3. Format the response

use crate::app_config::AppConfig;
use crate::core::antinuke::{
    ActionKind, AntiNukeService, AuditCursor, Decision, ThresholdConfig, WINDOW_KEY,
};
use crate::infra::antinuke::SqliteGuardStore;
use poise::serenity_prelude as serenity;
use std::sync::Arc;

pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Context<'a> = poise::Context<'a, Data, Error>;

/// Shared state handed to every command and event handler.
pub struct Data {
    pub antinuke: Arc<AntiNukeService<SqliteGuardStore>>,
    pub audit_cursor: Arc<AuditCursor>,
    pub config: Arc<AppConfig>,
}

#[derive(Debug, Clone, Copy, poise::ChoiceParameter)]
pub enum ThresholdKey {
    #[name = "ban"]
    Ban,
    #[name = "kick"]
    Kick,
    #[name = "role_delete"]
    RoleDelete,
    #[name = "channel_delete"]
    ChannelDelete,
    #[name = "emoji_delete"]
    EmojiDelete,
    #[name = "action_window_seconds"]
    Window,
}

impl ThresholdKey {
    fn kind(self) -> Option<ActionKind> {
        match self {
            ThresholdKey::Ban => Some(ActionKind::Ban),
            ThresholdKey::Kick => Some(ActionKind::Kick),
            ThresholdKey::RoleDelete => Some(ActionKind::RoleDelete),
            ThresholdKey::ChannelDelete => Some(ActionKind::ChannelDelete),
            ThresholdKey::EmojiDelete => Some(ActionKind::EmojiDelete),
            ThresholdKey::Window => None,
        }
    }

    fn key(self) -> &'static str {
        self.kind().map(|kind| kind.key()).unwrap_or(WINDOW_KEY)
    }
}

/// Antinuke configuration commands.
#[poise::command(
    slash_command,
    subcommands(
        "thresholds",
        "set_threshold",
        "disable_threshold",
        "reset_thresholds",
        "set_log_channel",
        "pressure",
        "forgive"
    ),
    required_permissions = "ADMINISTRATOR",
    guild_only
)]
pub async fn antinuke(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

fn thresholds_embed(config: &ThresholdConfig, log_channel: Option<u64>) -> serenity::CreateEmbed {
    let limits = config
        .thresholds
        .iter()
        .enumerate()
        .map(|(i, t)| format!("{}. **{}** (`{}`): {}", i + 1, t.kind, t.kind.key(), t.limit))
        .collect::<Vec<_>>()
        .join("\n");

    serenity::CreateEmbed::new()
        .title("🛡️ Antinuke Thresholds")
        .color(serenity::Color::BLURPLE)
        .field(
            "Limits (checked in this order)",
            if limits.is_empty() {
                "None".to_string()
            } else {
                limits
            },
            false,
        )
        .field("Window", format!("{} seconds", config.window_seconds), true)
        .field(
            "Log Channel",
            log_channel
                .map(|id| format!("<#{}>", id))
                .unwrap_or_else(|| "Not set".to_string()),
            true,
        )
}

/// Show the current thresholds and window.
#[poise::command(slash_command, guild_only, required_permissions = "ADMINISTRATOR")]
pub async fn thresholds(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be used in a server")?.get();

    let config = ctx.data().antinuke.thresholds(guild_id).await?;
    let log_channel = ctx.data().antinuke.log_channel(guild_id).await?;

    ctx.send(
        poise::CreateReply::default()
            .embed(thresholds_embed(&config, log_channel))
            .ephemeral(true),
    )
    .await?;
    Ok(())
}

/// Set one threshold, or the window in seconds.
#[poise::command(slash_command, guild_only, required_permissions = "ADMINISTRATOR")]
pub async fn set_threshold(
    ctx: Context<'_>,
    #[description = "Threshold to change"] key: ThresholdKey,
    #[description = "Actions within the window, or window seconds"] value: u64,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be used in a server")?.get();

    let config = ctx
        .data()
        .antinuke
        .set_threshold(guild_id, key.key(), value)
        .await?;

    tracing::info!(
        guild_id,
        key = key.key(),
        value,
        admin_id = ctx.author().id.get(),
        "Antinuke threshold updated"
    );

    ctx.send(
        poise::CreateReply::default()
            .content(format!("✅ Threshold `{}` set to **{}**.", key.key(), value))
            .embed(thresholds_embed(&config, None))
            .ephemeral(true),
    )
    .await?;
    Ok(())
}

/// Stop acting on one kind of action until its threshold is set again.
#[poise::command(slash_command, guild_only, required_permissions = "ADMINISTRATOR")]
pub async fn disable_threshold(
    ctx: Context<'_>,
    #[description = "Threshold to disable"] key: ThresholdKey,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be used in a server")?.get();
    let kind = key.kind().ok_or("The window cannot be disabled")?;

    let config = ctx
        .data()
        .antinuke
        .disable_threshold(guild_id, kind)
        .await?;

    tracing::info!(
        guild_id,
        key = kind.key(),
        admin_id = ctx.author().id.get(),
        "Antinuke threshold disabled"
    );

    ctx.send(
        poise::CreateReply::default()
            .content(format!("🛑 `{}` is no longer evaluated.", kind.key()))
            .embed(thresholds_embed(&config, None))
            .ephemeral(true),
    )
    .await?;
    Ok(())
}

/// Restore the default thresholds.
#[poise::command(slash_command, guild_only, required_permissions = "ADMINISTRATOR")]
pub async fn reset_thresholds(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be used in a server")?.get();

    ctx.data().antinuke.reset_thresholds(guild_id).await?;

    ctx.send(
        poise::CreateReply::default()
            .content("♻️ Thresholds reset to defaults.")
            .ephemeral(true),
    )
    .await?;
    Ok(())
}

/// Select the text channel antinuke reports are sent to.
#[poise::command(slash_command, guild_only, required_permissions = "ADMINISTRATOR")]
pub async fn set_log_channel(
    ctx: Context<'_>,
    #[description = "Channel to send logs to"]
    #[channel_types("Text")]
    channel: serenity::GuildChannel,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be used in a server")?.get();
    let channel_id = channel.id.get();

    ctx.data()
        .antinuke
        .set_log_channel(guild_id, channel_id)
        .await?;

    ctx.send(
        poise::CreateReply::default()
            .content(format!("✅ Log channel set to <#{}>.", channel_id))
            .ephemeral(true),
    )
    .await?;
    Ok(())
}

/// Show how many destructive actions currently count against a user.
#[poise::command(slash_command, guild_only, required_permissions = "ADMINISTRATOR")]
pub async fn pressure(
    ctx: Context<'_>,
    #[description = "User to inspect"] user: serenity::User,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be used in a server")?.get();

    let (counts, decision, config) = ctx
        .data()
        .antinuke
        .pressure(guild_id, user.id.get(), chrono::Utc::now())
        .await;

    let verdict = match decision {
        Decision::NoAction => "Below every threshold".to_string(),
        Decision::Mitigate(kind) => format!("**{}** threshold reached", kind),
    };

    let lines = config
        .thresholds
        .iter()
        .map(|t| format!("• {}: {}/{}", t.kind, counts.get(t.kind), t.limit))
        .collect::<Vec<_>>()
        .join("\n");

    let embed = serenity::CreateEmbed::new()
        .title(format!("Antinuke pressure for {}", user.name))
        .description(format!("Last {} seconds", config.window_seconds))
        .color(match decision {
            Decision::Mitigate(_) => serenity::Color::RED,
            Decision::NoAction if counts.is_empty() => serenity::Color::DARK_GREEN,
            Decision::NoAction => serenity::Color::ORANGE,
        })
        .field("Actions", if lines.is_empty() { "None".to_string() } else { lines }, false)
        .field("Status", verdict, false)
        .thumbnail(user.face());

    ctx.send(poise::CreateReply::default().embed(embed).ephemeral(true))
        .await?;
    Ok(())
}

/// Clear everything recorded against a user.
#[poise::command(slash_command, guild_only, required_permissions = "ADMINISTRATOR")]
pub async fn forgive(
    ctx: Context<'_>,
    #[description = "User to forgive"] user: serenity::User,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be used in a server")?.get();

    let message = if ctx.data().antinuke.forgive(guild_id, user.id.get()) {
        format!("✅ Cleared recorded actions for <@{}>.", user.id)
    } else {
        format!("<@{}> has no recorded actions.", user.id)
    };

    ctx.send(
        poise::CreateReply::default()
            .content(message)
            .ephemeral(true),
    )
    .await?;
    Ok(())
}
