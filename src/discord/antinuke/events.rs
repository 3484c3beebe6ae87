// Gateway events -> attributed antinuke actions.
//
// Every handler follows the same steps:
// 1. Find the responsible actor in the audit log
// 2. Hand the action to the core service
// 3. Log the report to the guild's log channel

use crate::core::antinuke::{find_responsible_actor, ActionKind, AuditEntry, ObservedAction};
use crate::discord::antinuke::executor::SerenityMitigator;
use crate::discord::antinuke::formatter::{format_report, format_unattributed};
use crate::discord::antinuke::log_channel::send_embed;
use crate::discord::Data;
use ::serenity::model::guild::audit_log::{
    Action, AuditLogEntry, ChannelAction, EmojiAction, MemberAction, RoleAction,
};
use anyhow::Result;
use chrono::{DateTime, Utc};
use poise::serenity_prelude::{self as serenity, Context, Mentionable};
use std::collections::HashMap;
use std::sync::Arc;

const AUDIT_FETCH_LIMIT: u8 = 10;

fn audit_action(kind: ActionKind) -> Action {
    match kind {
        ActionKind::Ban => Action::Member(MemberAction::BanAdd),
        ActionKind::Kick => Action::Member(MemberAction::Kick),
        ActionKind::RoleDelete => Action::Role(RoleAction::Delete),
        ActionKind::ChannelDelete => Action::Channel(ChannelAction::Delete),
        ActionKind::EmojiDelete => Action::Emoji(EmojiAction::Delete),
    }
}

fn action_kind(action: &Action) -> Option<ActionKind> {
    match action {
        Action::Member(MemberAction::BanAdd) => Some(ActionKind::Ban),
        Action::Member(MemberAction::Kick) => Some(ActionKind::Kick),
        Action::Role(RoleAction::Delete) => Some(ActionKind::RoleDelete),
        Action::Channel(ChannelAction::Delete) => Some(ActionKind::ChannelDelete),
        Action::Emoji(EmojiAction::Delete) => Some(ActionKind::EmojiDelete),
        _ => None,
    }
}

fn to_audit_entry(entry: &AuditLogEntry) -> Option<AuditEntry> {
    let kind = action_kind(&entry.action)?;
    let created_at = DateTime::from_timestamp(entry.id.created_at().unix_timestamp(), 0)?;

    Some(AuditEntry {
        entry_id: entry.id.get(),
        kind,
        actor_id: entry.user_id.get(),
        target_id: entry.target_id.map(|id| id.get()),
        created_at,
    })
}

async fn fetch_audit_entries(
    ctx: &Context,
    guild_id: serenity::GuildId,
    kind: ActionKind,
) -> Result<Vec<AuditEntry>> {
    let logs = guild_id
        .audit_logs(
            &ctx.http,
            Some(audit_action(kind)),
            None,
            None,
            Some(AUDIT_FETCH_LIMIT),
        )
        .await?;

    Ok(logs.entries.iter().filter_map(to_audit_entry).collect())
}

/// Audit entry responsible for `kind` on `target_id`, if a fresh one exists.
async fn attribute(
    ctx: &Context,
    data: &Data,
    guild_id: serenity::GuildId,
    kind: ActionKind,
    target_id: u64,
    now: DateTime<Utc>,
) -> Result<Option<AuditEntry>> {
    let entries = fetch_audit_entries(ctx, guild_id, kind).await?;
    Ok(find_responsible_actor(
        &entries,
        kind,
        Some(target_id),
        now,
        data.config.attribution_max_age(),
    )
    .cloned())
}

async fn actor_role_ids(ctx: &Context, guild_id: serenity::GuildId, actor_id: u64) -> Vec<u64> {
    let user_id = serenity::UserId::new(actor_id);

    let cached = ctx.cache.guild(guild_id).and_then(|g| {
        g.members
            .get(&user_id)
            .map(|m| m.roles.iter().map(|r| r.get()).collect::<Vec<_>>())
    });
    if let Some(roles) = cached {
        return roles;
    }

    match guild_id.member(&ctx.http, user_id).await {
        Ok(member) => member.roles.iter().map(|r| r.get()).collect(),
        Err(e) => {
            // Role whitelisting cannot apply; the member whitelist still does.
            tracing::warn!(guild_id = guild_id.get(), actor_id, error = %e, "Could not fetch actor roles");
            Vec::new()
        }
    }
}

/// Feed an attributed action to the service and log the outcome.
async fn observe(
    ctx: &Context,
    data: &Data,
    guild_id: serenity::GuildId,
    entry: &AuditEntry,
    at: DateTime<Utc>,
    subject: &str,
) -> Result<()> {
    if entry.actor_id == ctx.cache.current_user().id.get() {
        return Ok(());
    }

    let action = ObservedAction {
        guild_id: guild_id.get(),
        actor_id: entry.actor_id,
        actor_role_ids: actor_role_ids(ctx, guild_id, entry.actor_id).await,
        kind: entry.kind,
        at,
    };

    let mitigator = SerenityMitigator::new(Arc::clone(&ctx.http), Arc::clone(&ctx.cache));
    let report = data.antinuke.handle_action(action, &mitigator).await?;

    tracing::debug!(
        guild_id = guild_id.get(),
        actor_id = entry.actor_id,
        kind = entry.kind.key(),
        report = ?report,
        "Antinuke action handled"
    );

    let embed = format_report(guild_id.get(), entry.actor_id, subject, &report);
    send_embed(ctx, data, guild_id.get(), embed).await;
    Ok(())
}

async fn observe_targeted(
    ctx: &Context,
    data: &Data,
    guild_id: serenity::GuildId,
    kind: ActionKind,
    target_id: u64,
    subject: &str,
) -> Result<()> {
    let now = Utc::now();

    match attribute(ctx, data, guild_id, kind, target_id, now).await? {
        Some(entry) => observe(ctx, data, guild_id, &entry, now, subject).await,
        None => {
            tracing::info!(guild_id = guild_id.get(), kind = kind.key(), target_id, "Actor unknown");
            send_embed(
                ctx,
                data,
                guild_id.get(),
                format_unattributed(guild_id.get(), kind, subject),
            )
            .await;
            Ok(())
        }
    }
}

// ============================================================================
// HANDLERS
// ============================================================================

pub async fn handle_ban(
    ctx: &Context,
    data: &Data,
    guild_id: serenity::GuildId,
    banned_user: &serenity::User,
) -> Result<()> {
    let subject = format!("{} ({})", banned_user.mention(), banned_user.name);
    observe_targeted(
        ctx,
        data,
        guild_id,
        ActionKind::Ban,
        banned_user.id.get(),
        &subject,
    )
    .await
}

/// A member removal only counts when the audit log shows a kick.
pub async fn handle_member_remove(
    ctx: &Context,
    data: &Data,
    guild_id: serenity::GuildId,
    user: &serenity::User,
) -> Result<()> {
    let now = Utc::now();

    match attribute(ctx, data, guild_id, ActionKind::Kick, user.id.get(), now).await? {
        Some(entry) => {
            let subject = format!("{} ({})", user.mention(), user.name);
            observe(ctx, data, guild_id, &entry, now, &subject).await
        }
        None => Ok(()),
    }
}

pub async fn handle_role_delete(
    ctx: &Context,
    data: &Data,
    guild_id: serenity::GuildId,
    role_id: serenity::RoleId,
    role: Option<&serenity::Role>,
) -> Result<()> {
    let subject = role
        .map(|r| format!("`{}`", r.name))
        .unwrap_or_else(|| format!("`{}`", role_id));
    observe_targeted(
        ctx,
        data,
        guild_id,
        ActionKind::RoleDelete,
        role_id.get(),
        &subject,
    )
    .await
}

pub async fn handle_channel_delete(
    ctx: &Context,
    data: &Data,
    channel: &serenity::GuildChannel,
) -> Result<()> {
    let subject = format!("`#{}`", channel.name);
    observe_targeted(
        ctx,
        data,
        channel.guild_id,
        ActionKind::ChannelDelete,
        channel.id.get(),
        &subject,
    )
    .await
}

/// Emoji updates carry only the new state, so deletions are found through
/// fresh audit entries whose emoji is no longer present.
pub async fn handle_emojis_update(
    ctx: &Context,
    data: &Data,
    guild_id: serenity::GuildId,
    current_state: &HashMap<serenity::EmojiId, serenity::Emoji>,
) -> Result<()> {
    let now = Utc::now();
    let max_age = data.config.attribution_max_age();
    let entries = fetch_audit_entries(ctx, guild_id, ActionKind::EmojiDelete).await?;

    let mut deleted: Vec<&AuditEntry> = entries
        .iter()
        .filter(|e| {
            e.target_id
                .map(|id| !current_state.contains_key(&serenity::EmojiId::new(id)))
                .unwrap_or(false)
        })
        .filter_map(|e| find_responsible_actor(&entries, e.kind, e.target_id, now, max_age))
        .collect();
    deleted.sort_by_key(|e| e.entry_id);
    deleted.dedup_by_key(|e| e.entry_id);

    for entry in deleted {
        // One deletion may show up in several update events.
        if !data
            .audit_cursor
            .advance(guild_id.get(), ActionKind::EmojiDelete, entry.entry_id)
        {
            continue;
        }
        let subject = format!("Emoji `{}`", entry.target_id.unwrap_or_default());
        observe(ctx, data, guild_id, entry, now, &subject).await?;
    }

    Ok(())
}
