// This is the entry point of the antinuke bot.
//
// **Architecture Overview:**
// - `core/` = Business logic (platform-agnostic)
// - `infra/` = Implementations of core traits (databases)
// - `discord/` = Discord-specific adapters (commands, events)
//
// This file's job is to:
// 1. Load configuration
// 2. Initialize services (dependency injection)
// 3. Set up the Discord framework
// 4. Register commands and event handlers

// These attrs point each module declaration at a more descriptive root file
// so we don't end up with half a dozen mod.rs files that all look the same.
#[path = "core/core_layer.rs"]
mod core;
#[path = "discord/discord_layer.rs"]
mod discord;
#[path = "infra/infra_layer.rs"]
mod infra;

mod app_config;

use crate::app_config::AppConfig;
use crate::core::antinuke::{ActionLedger, ActionRateGuard, AntiNukeService, AuditCursor};
use crate::discord::antinuke::events as antinuke_events;
use crate::discord::{Data, Error};
use crate::infra::antinuke::SqliteGuardStore;
use anyhow::Context as _;
use poise::serenity_prelude as serenity;
use std::sync::Arc;

/// Records are kept at least this long after their last action.
const MIN_IDLE_RETENTION_SECS: i64 = 60 * 60;

/// Event handler for non-command Discord events.
/// Every destructive guild event is routed to the antinuke.
async fn event_handler(
    ctx: &serenity::Context,
    event: &serenity::FullEvent,
    _framework: poise::FrameworkContext<'_, Data, Error>,
    data: &Data,
) -> Result<(), Error> {
    match event {
        serenity::FullEvent::GuildBanAddition {
            guild_id,
            banned_user,
        } => {
            if let Err(e) = antinuke_events::handle_ban(ctx, data, *guild_id, banned_user).await {
                tracing::error!("Error handling ban: {}", e);
            }
        }
        serenity::FullEvent::GuildMemberRemoval { guild_id, user, .. } => {
            if let Err(e) =
                antinuke_events::handle_member_remove(ctx, data, *guild_id, user).await
            {
                tracing::error!("Error handling member removal: {}", e);
            }
        }
        serenity::FullEvent::GuildRoleDelete {
            guild_id,
            removed_role_id,
            removed_role_data_if_available,
        } => {
            if let Err(e) = antinuke_events::handle_role_delete(
                ctx,
                data,
                *guild_id,
                *removed_role_id,
                removed_role_data_if_available.as_ref(),
            )
            .await
            {
                tracing::error!("Error handling role delete: {}", e);
            }
        }
        serenity::FullEvent::ChannelDelete { channel, .. } => {
            if let Err(e) = antinuke_events::handle_channel_delete(ctx, data, channel).await {
                tracing::error!("Error handling channel delete: {}", e);
            }
        }
        serenity::FullEvent::GuildEmojisUpdate {
            guild_id,
            current_state,
        } => {
            if let Err(e) =
                antinuke_events::handle_emojis_update(ctx, data, *guild_id, current_state).await
            {
                tracing::error!("Error handling emojis update: {}", e);
            }
        }

        _ => {}
    }

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging so we can see what's happening
    tracing_subscriber::fmt::init();

    // Load environment variables from .env file (if it exists)
    dotenv::dotenv().ok();

    let config = Arc::new(AppConfig::from_env()?);

    // Keep runtime databases in a dedicated folder so the repo root stays tidy.
    std::fs::create_dir_all(&config.data_dir)
        .context("Failed to create data directory for SQLite files")?;

    // ========================================================================
    // DEPENDENCY INJECTION
    // ========================================================================
    // This is the "composition root" where we wire everything together.

    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .connect(&config.database_url())
        .await
        .context("Failed to connect to antinuke DB")?;
    let store = SqliteGuardStore::new(pool);
    store
        .migrate()
        .await
        .context("Failed to migrate antinuke DB")?;

    let antinuke = Arc::new(AntiNukeService::new(
        store,
        ActionRateGuard::new(ActionLedger::new()),
        config.whitelist_policy,
    ));

    tracing::info!(
        data_dir = %config.data_dir.display(),
        whitelist_policy = ?config.whitelist_policy,
        "Antinuke service ready"
    );

    let data = Data {
        antinuke,
        audit_cursor: Arc::new(AuditCursor::new()),
        config: Arc::clone(&config),
    };

    // ========================================================================
    // DISCORD FRAMEWORK SETUP
    // ========================================================================

    let intents = serenity::GatewayIntents::GUILDS
        | serenity::GatewayIntents::GUILD_MEMBERS // Member removals (kicks)
        | serenity::GatewayIntents::GUILD_MODERATION // Bans and audit log access
        | serenity::GatewayIntents::GUILD_EMOJIS_AND_STICKERS;

    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: vec![
                discord::commands::antinuke::antinuke(),
                discord::commands::whitelist::whitelist(),
            ],
            event_handler: |ctx, event, framework, data| {
                Box::pin(event_handler(ctx, event, framework, data))
            },
            ..Default::default()
        })
        .setup(|ctx, _ready, framework| {
            Box::pin(async move {
                tracing::info!("Bot is starting up...");

                // Register slash commands globally (can take up to an hour to propagate)
                poise::builtins::register_globally(ctx, &framework.options().commands).await?;
                tracing::info!("Commands registered");

                // Background sweep that forgets actors who went quiet.
                let antinuke = Arc::clone(&data.antinuke);
                let interval_secs = data.config.prune_interval_secs.max(1);
                tokio::spawn(async move {
                    use std::time::Duration as StdDuration;
                    use tokio::time::sleep;

                    loop {
                        sleep(StdDuration::from_secs(interval_secs)).await;

                        let removed = antinuke.prune_idle(
                            chrono::Utc::now(),
                            chrono::Duration::seconds(MIN_IDLE_RETENTION_SECS),
                        );
                        if removed > 0 {
                            tracing::debug!(removed, "Pruned idle antinuke records");
                        }
                    }
                });

                Ok(data)
            })
        })
        .build();

    let mut client = serenity::ClientBuilder::new(&config.discord_token, intents)
        .framework(framework)
        .await
        .context("Error creating client")?;

    client.start().await.context("Error running bot")?;
    Ok(())
}
