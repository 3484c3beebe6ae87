// Antinuke service - core business logic around the action rate guard.
//
// This service handles:
// - Resolving per-guild thresholds (cache -> store -> defaults)
// - Whitelist checks (members and roles)
// - Feeding attributed actions into the rate guard
// - Running the mitigation executor when a threshold fires
//
// NO Discord dependencies here - just pure domain logic.

use super::antinuke_models::{
    ActionCounts, ActionKind, Decision, GuardReport, ObservedAction, ThresholdConfig,
    WhitelistPolicy, WINDOW_KEY,
};
use super::mitigation::{plan_for, MitigationExecutor};
use super::rate_guard::{ActionRateGuard, MAX_ENTRIES_PER_RECORD};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use thiserror::Error;

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum GuardError {
    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Unknown threshold key `{key}`. Keys: {valid}")]
    UnknownKey { key: String, valid: String },
}

// ============================================================================
// STORAGE TRAIT (PORT)
// ============================================================================

/// Guild-scoped settings the antinuke needs: thresholds, log channel and
/// whitelists.
#[async_trait]
pub trait GuardSettingsStore: Send + Sync {
    /// Stored thresholds, or `None` when the guild never customised them.
    async fn get_thresholds(&self, guild_id: u64) -> Result<Option<ThresholdConfig>, GuardError>;

    async fn save_thresholds(
        &self,
        guild_id: u64,
        config: ThresholdConfig,
    ) -> Result<(), GuardError>;

    /// Forget customised thresholds so the defaults apply again.
    async fn clear_thresholds(&self, guild_id: u64) -> Result<(), GuardError>;

    async fn get_log_channel(&self, guild_id: u64) -> Result<Option<u64>, GuardError>;

    async fn set_log_channel(&self, guild_id: u64, channel_id: u64) -> Result<(), GuardError>;

    /// Returns `true` if the member was not whitelisted before.
    async fn add_whitelisted_member(&self, guild_id: u64, member_id: u64)
        -> Result<bool, GuardError>;

    /// Returns `true` if the member was whitelisted.
    async fn remove_whitelisted_member(
        &self,
        guild_id: u64,
        member_id: u64,
    ) -> Result<bool, GuardError>;

    async fn list_whitelisted_members(&self, guild_id: u64) -> Result<Vec<u64>, GuardError>;

    async fn add_whitelisted_role(&self, guild_id: u64, role_id: u64) -> Result<bool, GuardError>;

    async fn remove_whitelisted_role(&self, guild_id: u64, role_id: u64)
        -> Result<bool, GuardError>;

    async fn list_whitelisted_roles(&self, guild_id: u64) -> Result<Vec<u64>, GuardError>;

    /// Whether the member, or any of the given roles, is whitelisted.
    async fn is_whitelisted(
        &self,
        guild_id: u64,
        member_id: u64,
        role_ids: &[u64],
    ) -> Result<bool, GuardError>;
}

// ============================================================================
// CORE SERVICE
// ============================================================================

/// Antinuke service: attributes, counts and mitigates destructive actions.
pub struct AntiNukeService<S: GuardSettingsStore> {
    store: S,
    guard: ActionRateGuard,
    /// Guild ID -> current thresholds. Entries are swapped whole on update.
    config_cache: DashMap<u64, Arc<ThresholdConfig>>,
    whitelist_policy: WhitelistPolicy,
}

impl<S: GuardSettingsStore> AntiNukeService<S> {
    /// Create a new antinuke service with the given store and guard.
    pub fn new(store: S, guard: ActionRateGuard, whitelist_policy: WhitelistPolicy) -> Self {
        Self {
            store,
            guard,
            config_cache: DashMap::new(),
            whitelist_policy,
        }
    }

    /// Thresholds used for evaluation. Store failures fall back to defaults.
    ///
    /// A config read from the store only fills an empty slot; admin updates
    /// always overwrite, so a read racing an update cannot resurrect the old
    /// config.
    async fn effective_config(&self, guild_id: u64) -> Arc<ThresholdConfig> {
        if let Some(cached) = self.config_cache.get(&guild_id) {
            return Arc::clone(&cached);
        }

        match self.store.get_thresholds(guild_id).await {
            Ok(stored) => {
                let config = Arc::new(stored.unwrap_or_default());
                let cached = self.config_cache.entry(guild_id).or_insert(config);
                Arc::clone(&cached)
            }
            Err(e) => {
                tracing::warn!(guild_id, error = %e, "Failed to read thresholds, using defaults");
                Arc::new(ThresholdConfig::default())
            }
        }
    }

    /// Record an attributed action and mitigate if a threshold is met.
    ///
    /// The executor runs after the guard has released its per-key lock.
    pub async fn handle_action<E: MitigationExecutor + ?Sized>(
        &self,
        action: ObservedAction,
        executor: &E,
    ) -> Result<GuardReport, GuardError> {
        let config = self.effective_config(action.guild_id).await;
        let whitelisted = self
            .store
            .is_whitelisted(action.guild_id, action.actor_id, &action.actor_role_ids)
            .await?;

        if whitelisted && self.whitelist_policy == WhitelistPolicy::Skip {
            tracing::debug!(
                guild_id = action.guild_id,
                actor_id = action.actor_id,
                kind = action.kind.key(),
                "Whitelisted actor, action not recorded"
            );
            return Ok(GuardReport::Skipped { kind: action.kind });
        }

        let (decision, counts) = self.guard.record_and_count(
            action.guild_id,
            action.actor_id,
            action.kind,
            action.at,
            &config,
        );

        let kind = match decision {
            Decision::NoAction => {
                return Ok(GuardReport::Recorded {
                    kind: action.kind,
                    count: counts.get(action.kind),
                    limit: config.limit_for(action.kind),
                });
            }
            Decision::Mitigate(kind) => kind,
        };

        if whitelisted {
            tracing::info!(
                guild_id = action.guild_id,
                actor_id = action.actor_id,
                kind = kind.key(),
                "Threshold reached by whitelisted actor"
            );
            return Ok(GuardReport::WhitelistBypass { kind });
        }

        let plan = plan_for(kind);
        tracing::warn!(
            guild_id = action.guild_id,
            actor_id = action.actor_id,
            kind = kind.key(),
            plan = %plan,
            "Threshold reached, mitigating"
        );
        let outcome = executor.execute(action.guild_id, action.actor_id, plan).await;

        Ok(GuardReport::Mitigated {
            kind,
            plan,
            outcome,
        })
    }

    /// Current thresholds for a guild (defaults if never customised).
    pub async fn thresholds(&self, guild_id: u64) -> Result<ThresholdConfig, GuardError> {
        Ok(self.store.get_thresholds(guild_id).await?.unwrap_or_default())
    }

    /// Update one threshold (an action kind key or `action_window_seconds`).
    pub async fn set_threshold(
        &self,
        guild_id: u64,
        key: &str,
        value: u64,
    ) -> Result<ThresholdConfig, GuardError> {
        let mut config = self.thresholds(guild_id).await?;

        if key.trim().eq_ignore_ascii_case(WINDOW_KEY) {
            config.window_seconds = value;
        } else {
            let kind: ActionKind = key.parse().map_err(|_| GuardError::UnknownKey {
                key: key.to_string(),
                valid: ThresholdConfig::keys().join(", "),
            })?;
            if value > MAX_ENTRIES_PER_RECORD as u64 {
                return Err(GuardError::ConfigError(format!(
                    "threshold {} is above the maximum of {}",
                    value, MAX_ENTRIES_PER_RECORD
                )));
            }
            config.set_limit(kind, value as u32);
        }

        self.save_config(guild_id, config).await
    }

    /// Stop evaluating one action kind until a threshold is set again.
    pub async fn disable_threshold(
        &self,
        guild_id: u64,
        kind: ActionKind,
    ) -> Result<ThresholdConfig, GuardError> {
        let mut config = self.thresholds(guild_id).await?;
        config.remove_limit(kind);
        self.save_config(guild_id, config).await
    }

    async fn save_config(
        &self,
        guild_id: u64,
        config: ThresholdConfig,
    ) -> Result<ThresholdConfig, GuardError> {
        self.store.save_thresholds(guild_id, config.clone()).await?;
        self.config_cache.insert(guild_id, Arc::new(config.clone()));
        Ok(config)
    }

    /// Restore default thresholds for a guild.
    pub async fn reset_thresholds(&self, guild_id: u64) -> Result<(), GuardError> {
        self.store.clear_thresholds(guild_id).await?;
        self.config_cache.insert(guild_id, Arc::new(ThresholdConfig::default()));
        Ok(())
    }

    pub async fn log_channel(&self, guild_id: u64) -> Result<Option<u64>, GuardError> {
        self.store.get_log_channel(guild_id).await
    }

    pub async fn set_log_channel(&self, guild_id: u64, channel_id: u64) -> Result<(), GuardError> {
        self.store.set_log_channel(guild_id, channel_id).await
    }

    pub async fn whitelist_member(&self, guild_id: u64, member_id: u64) -> Result<bool, GuardError> {
        self.store.add_whitelisted_member(guild_id, member_id).await
    }

    pub async fn unwhitelist_member(
        &self,
        guild_id: u64,
        member_id: u64,
    ) -> Result<bool, GuardError> {
        self.store.remove_whitelisted_member(guild_id, member_id).await
    }

    pub async fn whitelist_role(&self, guild_id: u64, role_id: u64) -> Result<bool, GuardError> {
        self.store.add_whitelisted_role(guild_id, role_id).await
    }

    pub async fn unwhitelist_role(&self, guild_id: u64, role_id: u64) -> Result<bool, GuardError> {
        self.store.remove_whitelisted_role(guild_id, role_id).await
    }

    /// Whitelisted (member ids, role ids) for a guild.
    pub async fn whitelist(&self, guild_id: u64) -> Result<(Vec<u64>, Vec<u64>), GuardError> {
        let members = self.store.list_whitelisted_members(guild_id).await?;
        let roles = self.store.list_whitelisted_roles(guild_id).await?;
        Ok((members, roles))
    }

    /// Actions currently counted against an actor, the decision they would
    /// produce right now, and the config used.
    pub async fn pressure(
        &self,
        guild_id: u64,
        actor_id: u64,
        now: DateTime<Utc>,
    ) -> (ActionCounts, Decision, Arc<ThresholdConfig>) {
        let config = self.effective_config(guild_id).await;
        let counts = self.guard.counts(guild_id, actor_id, now, &config);
        let decision = self.guard.evaluate(guild_id, actor_id, now, &config);
        (counts, decision, config)
    }

    /// Clear an actor's recorded actions (admin action).
    pub fn forgive(&self, guild_id: u64, actor_id: u64) -> bool {
        self.guard.reset(guild_id, actor_id)
    }

    /// Drop idle ledger records (called periodically).
    ///
    /// Retention never drops below the longest window currently configured,
    /// so a record is only pruned once nothing in it can count anymore.
    pub fn prune_idle(&self, now: DateTime<Utc>, min_retention: Duration) -> usize {
        let longest_window = self
            .config_cache
            .iter()
            .map(|entry| entry.value().window())
            .max()
            .unwrap_or_else(|| ThresholdConfig::default().window());
        self.guard.prune_idle(now, longest_window.max(min_retention))
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::antinuke::{MitigationOutcome, MitigationPlan};
    use dashmap::DashSet;
    use std::sync::Mutex;
    use tokio::sync::Notify;

    /// Parks the next `get_thresholds` call after it has read its value.
    struct HeldRead {
        entered: Arc<Notify>,
        release: Arc<Notify>,
    }

    /// In-memory store for testing
    struct MockGuardStore {
        thresholds: DashMap<u64, ThresholdConfig>,
        log_channels: DashMap<u64, u64>,
        members: DashSet<(u64, u64)>,
        roles: DashSet<(u64, u64)>,
        fail_reads: bool,
        held_read: Mutex<Option<HeldRead>>,
    }

    impl MockGuardStore {
        fn new() -> Self {
            Self {
                thresholds: DashMap::new(),
                log_channels: DashMap::new(),
                members: DashSet::new(),
                roles: DashSet::new(),
                fail_reads: false,
                held_read: Mutex::new(None),
            }
        }

        fn failing() -> Self {
            Self {
                fail_reads: true,
                ..Self::new()
            }
        }
    }

    #[async_trait]
    impl GuardSettingsStore for MockGuardStore {
        async fn get_thresholds(
            &self,
            guild_id: u64,
        ) -> Result<Option<ThresholdConfig>, GuardError> {
            if self.fail_reads {
                return Err(GuardError::StorageError("disk on fire".to_string()));
            }
            let value = self.thresholds.get(&guild_id).map(|c| c.clone());

            let held = self.held_read.lock().unwrap().take();
            if let Some(held) = held {
                held.entered.notify_one();
                held.release.notified().await;
            }
            Ok(value)
        }

        async fn save_thresholds(
            &self,
            guild_id: u64,
            config: ThresholdConfig,
        ) -> Result<(), GuardError> {
            self.thresholds.insert(guild_id, config);
            Ok(())
        }

        async fn clear_thresholds(&self, guild_id: u64) -> Result<(), GuardError> {
            self.thresholds.remove(&guild_id);
            Ok(())
        }

        async fn get_log_channel(&self, guild_id: u64) -> Result<Option<u64>, GuardError> {
            Ok(self.log_channels.get(&guild_id).map(|c| *c))
        }

        async fn set_log_channel(&self, guild_id: u64, channel_id: u64) -> Result<(), GuardError> {
            self.log_channels.insert(guild_id, channel_id);
            Ok(())
        }

        async fn add_whitelisted_member(
            &self,
            guild_id: u64,
            member_id: u64,
        ) -> Result<bool, GuardError> {
            Ok(self.members.insert((guild_id, member_id)))
        }

        async fn remove_whitelisted_member(
            &self,
            guild_id: u64,
            member_id: u64,
        ) -> Result<bool, GuardError> {
            Ok(self.members.remove(&(guild_id, member_id)).is_some())
        }

        async fn list_whitelisted_members(&self, guild_id: u64) -> Result<Vec<u64>, GuardError> {
            Ok(self
                .members
                .iter()
                .filter(|k| k.0 == guild_id)
                .map(|k| k.1)
                .collect())
        }

        async fn add_whitelisted_role(
            &self,
            guild_id: u64,
            role_id: u64,
        ) -> Result<bool, GuardError> {
            Ok(self.roles.insert((guild_id, role_id)))
        }

        async fn remove_whitelisted_role(
            &self,
            guild_id: u64,
            role_id: u64,
        ) -> Result<bool, GuardError> {
            Ok(self.roles.remove(&(guild_id, role_id)).is_some())
        }

        async fn list_whitelisted_roles(&self, guild_id: u64) -> Result<Vec<u64>, GuardError> {
            Ok(self
                .roles
                .iter()
                .filter(|k| k.0 == guild_id)
                .map(|k| k.1)
                .collect())
        }

        async fn is_whitelisted(
            &self,
            guild_id: u64,
            member_id: u64,
            role_ids: &[u64],
        ) -> Result<bool, GuardError> {
            Ok(self.members.contains(&(guild_id, member_id))
                || role_ids.iter().any(|r| self.roles.contains(&(guild_id, *r))))
        }
    }

    /// Executor that records every plan it is asked to run.
    struct MockExecutor {
        calls: Mutex<Vec<(u64, u64, MitigationPlan)>>,
        outcome: MitigationOutcome,
    }

    impl MockExecutor {
        fn succeeding() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                outcome: MitigationOutcome::Applied {
                    detail: "done".to_string(),
                },
            }
        }

        fn calls(&self) -> Vec<(u64, u64, MitigationPlan)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl MitigationExecutor for MockExecutor {
        async fn execute(
            &self,
            guild_id: u64,
            actor_id: u64,
            plan: MitigationPlan,
        ) -> MitigationOutcome {
            self.calls.lock().unwrap().push((guild_id, actor_id, plan));
            self.outcome.clone()
        }
    }

    const GUILD: u64 = 456;
    const ACTOR: u64 = 123;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    fn action(kind: ActionKind, secs: i64) -> ObservedAction {
        ObservedAction {
            guild_id: GUILD,
            actor_id: ACTOR,
            actor_role_ids: vec![900],
            kind,
            at: at(secs),
        }
    }

    fn service(store: MockGuardStore, policy: WhitelistPolicy) -> AntiNukeService<MockGuardStore> {
        AntiNukeService::new(store, ActionRateGuard::default(), policy)
    }

    #[tokio::test]
    async fn test_below_threshold_is_recorded() {
        let service = service(MockGuardStore::new(), WhitelistPolicy::Record);
        let executor = MockExecutor::succeeding();

        let report = service
            .handle_action(action(ActionKind::ChannelDelete, 0), &executor)
            .await
            .unwrap();

        assert_eq!(
            report,
            GuardReport::Recorded {
                kind: ActionKind::ChannelDelete,
                count: 1,
                limit: Some(2),
            }
        );
        assert!(executor.calls().is_empty());
    }

    #[tokio::test]
    async fn test_threshold_triggers_mitigation() {
        let service = service(MockGuardStore::new(), WhitelistPolicy::Record);
        let executor = MockExecutor::succeeding();

        service
            .handle_action(action(ActionKind::ChannelDelete, 0), &executor)
            .await
            .unwrap();
        let report = service
            .handle_action(action(ActionKind::ChannelDelete, 5), &executor)
            .await
            .unwrap();

        assert!(matches!(
            report,
            GuardReport::Mitigated {
                kind: ActionKind::ChannelDelete,
                plan: MitigationPlan::StripTopRole,
                ..
            }
        ));
        assert_eq!(
            executor.calls(),
            vec![(GUILD, ACTOR, MitigationPlan::StripTopRole)]
        );
    }

    #[tokio::test]
    async fn test_whitelisted_member_accumulates_but_is_not_mitigated() {
        let store = MockGuardStore::new();
        store.add_whitelisted_member(GUILD, ACTOR).await.unwrap();
        let service = service(store, WhitelistPolicy::Record);
        let executor = MockExecutor::succeeding();

        for secs in 0..2 {
            service
                .handle_action(action(ActionKind::RoleDelete, secs), &executor)
                .await
                .unwrap();
        }
        let (counts, _, _) = service.pressure(GUILD, ACTOR, at(2)).await;
        assert_eq!(counts.get(ActionKind::RoleDelete), 2);
        assert!(executor.calls().is_empty());

        // Revoked mid-window: the accumulated pressure now counts.
        service.unwhitelist_member(GUILD, ACTOR).await.unwrap();
        let report = service
            .handle_action(action(ActionKind::RoleDelete, 3), &executor)
            .await
            .unwrap();
        assert!(matches!(report, GuardReport::Mitigated { .. }));
    }

    #[tokio::test]
    async fn test_whitelisted_role_reports_bypass() {
        let store = MockGuardStore::new();
        store.add_whitelisted_role(GUILD, 900).await.unwrap();
        let service = service(store, WhitelistPolicy::Record);
        let executor = MockExecutor::succeeding();

        let mut last = None;
        for secs in 0..3 {
            last = Some(
                service
                    .handle_action(action(ActionKind::Ban, secs), &executor)
                    .await
                    .unwrap(),
            );
        }

        assert_eq!(
            last,
            Some(GuardReport::WhitelistBypass {
                kind: ActionKind::Ban
            })
        );
        assert!(executor.calls().is_empty());
    }

    #[tokio::test]
    async fn test_skip_policy_leaves_ledger_untouched() {
        let store = MockGuardStore::new();
        store.add_whitelisted_member(GUILD, ACTOR).await.unwrap();
        let service = service(store, WhitelistPolicy::Skip);
        let executor = MockExecutor::succeeding();

        let report = service
            .handle_action(action(ActionKind::Kick, 0), &executor)
            .await
            .unwrap();

        assert_eq!(
            report,
            GuardReport::Skipped {
                kind: ActionKind::Kick
            }
        );
        let (counts, _, _) = service.pressure(GUILD, ACTOR, at(0)).await;
        assert!(counts.is_empty());
    }

    #[tokio::test]
    async fn test_store_failure_falls_back_to_defaults() {
        let service = service(MockGuardStore::failing(), WhitelistPolicy::Record);
        let executor = MockExecutor::succeeding();

        // Default role_delete threshold is 2.
        service
            .handle_action(action(ActionKind::RoleDelete, 0), &executor)
            .await
            .unwrap();
        let report = service
            .handle_action(action(ActionKind::RoleDelete, 1), &executor)
            .await
            .unwrap();

        assert!(matches!(
            report,
            GuardReport::Mitigated {
                kind: ActionKind::RoleDelete,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_set_threshold_applies_immediately() {
        let service = service(MockGuardStore::new(), WhitelistPolicy::Record);
        let executor = MockExecutor::succeeding();

        // Warm the cache with defaults (kick: 4).
        service
            .handle_action(action(ActionKind::Kick, 0), &executor)
            .await
            .unwrap();

        let config = service.set_threshold(GUILD, "kick", 2).await.unwrap();
        assert_eq!(config.limit_for(ActionKind::Kick), Some(2));

        let report = service
            .handle_action(action(ActionKind::Kick, 1), &executor)
            .await
            .unwrap();
        assert!(matches!(
            report,
            GuardReport::Mitigated {
                plan: MitigationPlan::KickActor,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_set_window_and_unknown_key() {
        let service = service(MockGuardStore::new(), WhitelistPolicy::Record);

        let config = service
            .set_threshold(GUILD, "action_window_seconds", 30)
            .await
            .unwrap();
        assert_eq!(config.window_seconds, 30);
        assert_eq!(service.thresholds(GUILD).await.unwrap().window_seconds, 30);

        let err = service.set_threshold(GUILD, "prune", 1).await.unwrap_err();
        assert!(matches!(err, GuardError::UnknownKey { .. }));
        assert!(err.to_string().contains("channel_delete"));

        service.reset_thresholds(GUILD).await.unwrap();
        assert_eq!(
            service.thresholds(GUILD).await.unwrap(),
            ThresholdConfig::default()
        );
    }

    #[tokio::test]
    async fn test_failed_mitigation_is_reported() {
        let service = service(MockGuardStore::new(), WhitelistPolicy::Record);
        let executor = MockExecutor {
            calls: Mutex::new(Vec::new()),
            outcome: MitigationOutcome::Failed {
                reason: "Missing Permissions".to_string(),
            },
        };
        service.set_threshold(GUILD, "ban", 1).await.unwrap();

        let report = service
            .handle_action(action(ActionKind::Ban, 0), &executor)
            .await
            .unwrap();

        assert_eq!(
            report,
            GuardReport::Mitigated {
                kind: ActionKind::Ban,
                plan: MitigationPlan::BanActor,
                outcome: MitigationOutcome::Failed {
                    reason: "Missing Permissions".to_string()
                },
            }
        );
        // The failure does not roll back the ledger.
        let (counts, _, _) = service.pressure(GUILD, ACTOR, at(0)).await;
        assert_eq!(counts.get(ActionKind::Ban), 1);
    }

    #[tokio::test]
    async fn test_forgive_clears_pressure() {
        let service = service(MockGuardStore::new(), WhitelistPolicy::Record);
        let executor = MockExecutor::succeeding();

        service
            .handle_action(action(ActionKind::EmojiDelete, 0), &executor)
            .await
            .unwrap();

        assert!(service.forgive(GUILD, ACTOR));
        let (counts, _, _) = service.pressure(GUILD, ACTOR, at(1)).await;
        assert!(counts.is_empty());
    }

    #[tokio::test]
    async fn test_prune_respects_longest_window() {
        let service = service(MockGuardStore::new(), WhitelistPolicy::Record);
        let executor = MockExecutor::succeeding();
        service
            .set_threshold(GUILD, "action_window_seconds", 600)
            .await
            .unwrap();

        service
            .handle_action(action(ActionKind::Kick, 0), &executor)
            .await
            .unwrap();

        // Five minutes idle is still inside the 10 minute window.
        assert_eq!(service.prune_idle(at(300), Duration::seconds(60)), 0);
        assert_eq!(service.prune_idle(at(601), Duration::seconds(60)), 1);
    }

    #[tokio::test]
    async fn test_update_during_cache_fill_is_not_lost() {
        let store = MockGuardStore::new();
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        *store.held_read.lock().unwrap() = Some(HeldRead {
            entered: Arc::clone(&entered),
            release: Arc::clone(&release),
        });
        let service = service(store, WhitelistPolicy::Record);
        let executor = MockExecutor::succeeding();

        // The handler reads the default config (kick: 4) and is parked before
        // filling the cache; the admin update lands in between.
        let handler = service.handle_action(action(ActionKind::Kick, 0), &executor);
        let admin = async {
            entered.notified().await;
            service.set_threshold(GUILD, "kick", 1).await.unwrap();
            release.notify_one();
        };
        let (report, ()) = tokio::join!(handler, admin);

        assert!(matches!(
            report.unwrap(),
            GuardReport::Mitigated {
                kind: ActionKind::Kick,
                ..
            }
        ));
        let (_, _, config) = service.pressure(GUILD, ACTOR, at(0)).await;
        assert_eq!(config.limit_for(ActionKind::Kick), Some(1));
    }

    #[tokio::test]
    async fn test_reset_replaces_cached_config() {
        let service = service(MockGuardStore::new(), WhitelistPolicy::Record);
        service.set_threshold(GUILD, "ban", 1).await.unwrap();

        service.reset_thresholds(GUILD).await.unwrap();

        let (_, _, config) = service.pressure(GUILD, ACTOR, at(0)).await;
        assert_eq!(*config, ThresholdConfig::default());
    }

    #[tokio::test]
    async fn test_limit_above_record_cap_is_rejected() {
        let service = service(MockGuardStore::new(), WhitelistPolicy::Record);

        let err = service
            .set_threshold(GUILD, "kick", MAX_ENTRIES_PER_RECORD as u64 + 1)
            .await
            .unwrap_err();
        assert!(matches!(err, GuardError::ConfigError(_)));
        assert_eq!(
            service.thresholds(GUILD).await.unwrap().limit_for(ActionKind::Kick),
            Some(4)
        );

        let config = service
            .set_threshold(GUILD, "kick", MAX_ENTRIES_PER_RECORD as u64)
            .await
            .unwrap();
        assert_eq!(
            config.limit_for(ActionKind::Kick),
            Some(MAX_ENTRIES_PER_RECORD as u32)
        );
    }

    #[tokio::test]
    async fn test_disabled_kind_is_recorded_but_never_mitigated() {
        let service = service(MockGuardStore::new(), WhitelistPolicy::Record);
        let executor = MockExecutor::succeeding();
        service
            .disable_threshold(GUILD, ActionKind::RoleDelete)
            .await
            .unwrap();

        for secs in 0..5 {
            let report = service
                .handle_action(action(ActionKind::RoleDelete, secs), &executor)
                .await
                .unwrap();
            assert!(matches!(report, GuardReport::Recorded { limit: None, .. }));
        }
        assert!(executor.calls().is_empty());

        let (counts, decision, _) = service.pressure(GUILD, ACTOR, at(5)).await;
        assert_eq!(counts.get(ActionKind::RoleDelete), 5);
        assert_eq!(decision, Decision::NoAction);
    }

    #[tokio::test]
    async fn test_pressure_reports_pending_decision() {
        let service = service(MockGuardStore::new(), WhitelistPolicy::Record);
        let executor = MockExecutor::succeeding();
        service
            .handle_action(action(ActionKind::Ban, 0), &executor)
            .await
            .unwrap();

        let (_, decision, _) = service.pressure(GUILD, ACTOR, at(1)).await;
        assert_eq!(decision, Decision::NoAction);

        service.set_threshold(GUILD, "ban", 1).await.unwrap();
        let (_, decision, _) = service.pressure(GUILD, ACTOR, at(1)).await;
        assert_eq!(decision, Decision::Mitigate(ActionKind::Ban));
    }
}
