// Serenity implementation of the mitigation port.

use crate::core::antinuke::{
    pick_strippable_role, MitigationExecutor, MitigationOutcome, MitigationPlan,
};
use async_trait::async_trait;
use poise::serenity_prelude as serenity;
use std::sync::Arc;

const MITIGATION_REASON: &str = "Antinuke: excessive destructive actions";

pub struct SerenityMitigator {
    http: Arc<serenity::Http>,
    cache: Arc<serenity::Cache>,
}

impl SerenityMitigator {
    pub fn new(http: Arc<serenity::Http>, cache: Arc<serenity::Cache>) -> Self {
        Self { http, cache }
    }

    async fn strip_top_role(
        &self,
        guild_id: serenity::GuildId,
        actor_id: serenity::UserId,
    ) -> Result<MitigationOutcome, serenity::Error> {
        let bot_id = self.cache.current_user().id;
        let roles = guild_id.roles(&self.http).await?;
        let bot_member = guild_id.member(&self.http, bot_id).await?;
        let actor = guild_id.member(&self.http, actor_id).await?;

        let bot_top_position = bot_member
            .roles
            .iter()
            .filter_map(|r| roles.get(r).map(|role| role.position))
            .max()
            .unwrap_or(0);

        // Managed roles belong to integrations and cannot be edited.
        let actor_roles: Vec<(u64, u16)> = actor
            .roles
            .iter()
            .filter_map(|r| roles.get(r))
            .filter(|role| !role.managed)
            .map(|role| (role.id.get(), role.position))
            .collect();

        let role_id = match pick_strippable_role(&actor_roles, bot_top_position) {
            Some(id) => serenity::RoleId::new(id),
            None => {
                return Ok(MitigationOutcome::NothingToDo {
                    reason: format!(
                        "<@{}> has no role below the bot's top role. Consider manual action.",
                        actor_id
                    ),
                })
            }
        };

        let role_name = roles
            .get(&role_id)
            .map(|r| r.name.clone())
            .unwrap_or_else(|| role_id.to_string());

        guild_id
            .edit_role(
                &self.http,
                role_id,
                serenity::EditRole::new()
                    .permissions(serenity::Permissions::empty())
                    .audit_log_reason(MITIGATION_REASON),
            )
            .await?;

        Ok(MitigationOutcome::Applied {
            detail: format!("Top role `{}` had its permissions stripped.", role_name),
        })
    }
}

#[async_trait]
impl MitigationExecutor for SerenityMitigator {
    async fn execute(
        &self,
        guild_id: u64,
        actor_id: u64,
        plan: MitigationPlan,
    ) -> MitigationOutcome {
        let guild = serenity::GuildId::new(guild_id);
        let actor = serenity::UserId::new(actor_id);

        let result = match plan {
            MitigationPlan::BanActor => guild
                .ban_with_reason(&self.http, actor, 0, MITIGATION_REASON)
                .await
                .map(|_| MitigationOutcome::Applied {
                    detail: format!("<@{}> was banned.", actor_id),
                }),
            MitigationPlan::KickActor => guild
                .kick_with_reason(&self.http, actor, MITIGATION_REASON)
                .await
                .map(|_| MitigationOutcome::Applied {
                    detail: format!("<@{}> was kicked.", actor_id),
                }),
            MitigationPlan::StripTopRole => self.strip_top_role(guild, actor).await,
        };

        result.unwrap_or_else(|e| {
            tracing::error!(guild_id, actor_id, plan = %plan, error = %e, "Mitigation failed");
            MitigationOutcome::Failed {
                reason: format!("{} failed: {}. Check the bot's permissions.", plan, e),
            }
        })
    }
}
