// Mitigation port - what the antinuke does once a threshold is met.
//
// The core only picks a plan; the Discord layer implements
// `MitigationExecutor` and reports an explicit outcome instead of erroring.

use super::antinuke_models::{ActionKind, MitigationOutcome, MitigationPlan};
use async_trait::async_trait;

/// Executes a mitigation against an actor on the chat platform.
#[async_trait]
pub trait MitigationExecutor: Send + Sync {
    async fn execute(&self, guild_id: u64, actor_id: u64, plan: MitigationPlan)
        -> MitigationOutcome;
}

/// Ban and kick bursts are answered in kind; anything else loses its
/// permissions instead.
pub fn plan_for(kind: ActionKind) -> MitigationPlan {
    match kind {
        ActionKind::Ban => MitigationPlan::BanActor,
        ActionKind::Kick => MitigationPlan::KickActor,
        ActionKind::RoleDelete | ActionKind::ChannelDelete | ActionKind::EmojiDelete => {
            MitigationPlan::StripTopRole
        }
    }
}

/// Pick the actor's highest role that sits strictly below the bot's top role.
///
/// `actor_roles` holds `(role_id, position)` pairs.
pub fn pick_strippable_role(actor_roles: &[(u64, u16)], bot_top_position: u16) -> Option<u64> {
    actor_roles
        .iter()
        .filter(|(_, position)| *position < bot_top_position)
        .max_by_key(|(_, position)| *position)
        .map(|(role_id, _)| *role_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_for_kinds() {
        assert_eq!(plan_for(ActionKind::Ban), MitigationPlan::BanActor);
        assert_eq!(plan_for(ActionKind::Kick), MitigationPlan::KickActor);
        assert_eq!(plan_for(ActionKind::ChannelDelete), MitigationPlan::StripTopRole);
        assert_eq!(plan_for(ActionKind::EmojiDelete), MitigationPlan::StripTopRole);
    }

    #[test]
    fn test_pick_strippable_role() {
        let roles = [(1, 3), (2, 8), (3, 12), (4, 5)];

        assert_eq!(pick_strippable_role(&roles, 10), Some(2));
        assert_eq!(pick_strippable_role(&roles, 20), Some(3));
        assert_eq!(pick_strippable_role(&roles, 3), None);
        assert_eq!(pick_strippable_role(&[], 10), None);
    }
}
