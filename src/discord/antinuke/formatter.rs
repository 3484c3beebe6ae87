// Report embeds for the guild log channel.

use crate::core::antinuke::{ActionKind, GuardReport, MitigationOutcome};
use poise::serenity_prelude::{self as serenity, CreateEmbed, CreateEmbedFooter};

fn report_title(report: &GuardReport) -> &'static str {
    match report {
        GuardReport::Recorded { .. } | GuardReport::Skipped { .. } => "Destructive action",
        GuardReport::WhitelistBypass { .. } => "Whitelist bypass",
        GuardReport::Mitigated { outcome, .. } => match outcome {
            MitigationOutcome::Applied { .. } => "🛡️ Antinuke triggered",
            MitigationOutcome::NothingToDo { .. } => "⚠️ Antinuke triggered, manual action needed",
            MitigationOutcome::Failed { .. } => "❌ Mitigation failed",
        },
    }
}

fn report_color(report: &GuardReport) -> serenity::Color {
    match report {
        GuardReport::Recorded { .. } | GuardReport::Skipped { .. } => serenity::Color::ORANGE,
        GuardReport::WhitelistBypass { .. } => serenity::Color::GOLD,
        GuardReport::Mitigated { .. } => serenity::Color::RED,
    }
}

/// Embed describing how one attributed action was handled.
///
/// `subject` is a short rendering of what was affected ("Role `mods`").
pub fn format_report(
    guild_id: u64,
    actor_id: u64,
    subject: &str,
    report: &GuardReport,
) -> CreateEmbed {
    let embed = CreateEmbed::default()
        .title(report_title(report))
        .color(report_color(report))
        .footer(CreateEmbedFooter::new(format!("Guild ID: {}", guild_id)))
        .timestamp(serenity::Timestamp::now());

    match report {
        GuardReport::Recorded { kind, count, limit } => {
            let progress = match limit {
                Some(limit) => format!("{}/{}", count, limit),
                _ => format!("{} (no limit)", count),
            };
            embed
                .description(format!("{} by <@{}>.", describe(*kind, subject), actor_id))
                .field("In current window", progress, true)
        }
        GuardReport::Skipped { kind } => embed
            .description(format!("{} by <@{}>.", describe(*kind, subject), actor_id))
            .field("Whitelisted", "Not counted", true),
        GuardReport::WhitelistBypass { kind } => embed.description(format!(
            "<@{}> reached the **{}** threshold but is whitelisted.",
            actor_id, kind
        )),
        GuardReport::Mitigated {
            kind,
            plan,
            outcome,
        } => {
            let result = match outcome {
                MitigationOutcome::Applied { detail } => detail.clone(),
                MitigationOutcome::NothingToDo { reason } => reason.clone(),
                MitigationOutcome::Failed { reason } => reason.clone(),
            };
            embed
                .description(format!(
                    "<@{}> reached the **{}** threshold ({}).",
                    actor_id,
                    kind,
                    describe(*kind, subject)
                ))
                .field("Mitigation", plan.to_string(), true)
                .field("Result", result, false)
        }
    }
}

/// Embed for an action whose actor could not be found in the audit log.
pub fn format_unattributed(guild_id: u64, kind: ActionKind, subject: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title("Destructive action")
        .description(format!("{} (actor unknown).", describe(kind, subject)))
        .color(serenity::Color::LIGHT_GREY)
        .footer(CreateEmbedFooter::new(format!("Guild ID: {}", guild_id)))
        .timestamp(serenity::Timestamp::now())
}

fn describe(kind: ActionKind, subject: &str) -> String {
    match kind {
        ActionKind::Ban => format!("{} was banned", subject),
        ActionKind::Kick => format!("{} was kicked", subject),
        ActionKind::RoleDelete => format!("Role {} was deleted", subject),
        ActionKind::ChannelDelete => format!("Channel {} was deleted", subject),
        ActionKind::EmojiDelete => format!("{} deleted", subject),
    }
}
