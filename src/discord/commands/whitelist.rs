// Whitelist slash commands - members and roles exempt from mitigation.

use crate::discord::{Context, Error};
use poise::serenity_prelude as serenity;

/// Manage the antinuke whitelist.
#[poise::command(
    slash_command,
    subcommands("add_member", "remove_member", "add_role", "remove_role", "list"),
    required_permissions = "ADMINISTRATOR",
    guild_only
)]
pub async fn whitelist(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

async fn reply(ctx: Context<'_>, content: String) -> Result<(), Error> {
    ctx.send(
        poise::CreateReply::default()
            .content(content)
            .ephemeral(true),
    )
    .await?;
    Ok(())
}

/// Exempt a member from antinuke mitigation.
#[poise::command(slash_command, guild_only, required_permissions = "ADMINISTRATOR")]
pub async fn add_member(
    ctx: Context<'_>,
    #[description = "Member to whitelist"] member: serenity::User,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be used in a server")?.get();

    let added = ctx
        .data()
        .antinuke
        .whitelist_member(guild_id, member.id.get())
        .await?;

    reply(
        ctx,
        if added {
            format!("✅ <@{}> added to whitelist.", member.id)
        } else {
            format!("<@{}> is already whitelisted.", member.id)
        },
    )
    .await
}

/// Remove a member from the whitelist.
#[poise::command(slash_command, guild_only, required_permissions = "ADMINISTRATOR")]
pub async fn remove_member(
    ctx: Context<'_>,
    #[description = "Member to remove"] member: serenity::User,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be used in a server")?.get();

    let removed = ctx
        .data()
        .antinuke
        .unwhitelist_member(guild_id, member.id.get())
        .await?;

    reply(
        ctx,
        if removed {
            format!("🗑️ <@{}> removed from whitelist.", member.id)
        } else {
            format!("<@{}> was not whitelisted.", member.id)
        },
    )
    .await
}

/// Exempt every holder of a role from antinuke mitigation.
#[poise::command(slash_command, guild_only, required_permissions = "ADMINISTRATOR")]
pub async fn add_role(
    ctx: Context<'_>,
    #[description = "Role to whitelist"] role: serenity::Role,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be used in a server")?.get();

    let added = ctx
        .data()
        .antinuke
        .whitelist_role(guild_id, role.id.get())
        .await?;

    reply(
        ctx,
        if added {
            format!("✅ Role <@&{}> added to whitelist.", role.id)
        } else {
            format!("Role <@&{}> is already whitelisted.", role.id)
        },
    )
    .await
}

/// Remove a role from the whitelist.
#[poise::command(slash_command, guild_only, required_permissions = "ADMINISTRATOR")]
pub async fn remove_role(
    ctx: Context<'_>,
    #[description = "Role to remove"] role: serenity::Role,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be used in a server")?.get();

    let removed = ctx
        .data()
        .antinuke
        .unwhitelist_role(guild_id, role.id.get())
        .await?;

    reply(
        ctx,
        if removed {
            format!("🗑️ Role <@&{}> removed from whitelist.", role.id)
        } else {
            format!("Role <@&{}> was not whitelisted.", role.id)
        },
    )
    .await
}

/// List whitelisted roles and members.
#[poise::command(slash_command, guild_only, required_permissions = "ADMINISTRATOR")]
pub async fn list(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be used in a server")?.get();

    let (members, roles) = ctx.data().antinuke.whitelist(guild_id).await?;

    let roles_text = if roles.is_empty() {
        "None".to_string()
    } else {
        roles
            .iter()
            .map(|id| format!("<@&{}>", id))
            .collect::<Vec<_>>()
            .join(", ")
    };
    let members_text = if members.is_empty() {
        "None".to_string()
    } else {
        members
            .iter()
            .map(|id| format!("<@{}>", id))
            .collect::<Vec<_>>()
            .join(", ")
    };

    let embed = serenity::CreateEmbed::new()
        .title("Antinuke Whitelist")
        .color(serenity::Color::BLURPLE)
        .field("Whitelisted Roles", roles_text, false)
        .field("Whitelisted Members", members_text, false)
        .footer(serenity::CreateEmbedFooter::new(format!(
            "Guild ID: {}",
            guild_id
        )));

    ctx.send(poise::CreateReply::default().embed(embed).ephemeral(true))
        .await?;
    Ok(())
}
