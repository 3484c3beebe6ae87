// Action rate guard - the sliding time-window counter behind the antinuke.
//
// For every (guild, actor) pair we keep an ordered record of recent
// privileged actions. Each new action is appended, stale entries are purged,
// per-kind counts are recomputed and the guild's thresholds are walked in
// their declared order.
//
// NO Discord dependencies and NO I/O here. Mitigation is the caller's job.

use super::antinuke_models::{ActionCounts, ActionKind, Decision, ThresholdConfig};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::collections::VecDeque;

/// Hard cap on entries kept per actor; the oldest are dropped first.
/// Thresholds above this could never be reached, so they are rejected.
pub const MAX_ENTRIES_PER_RECORD: usize = 1024;

// ============================================================================
// ACTION RECORD
// ============================================================================

/// Time-ordered actions of one actor in one guild.
#[derive(Debug, Clone, Default)]
pub struct ActionRecord {
    entries: VecDeque<(DateTime<Utc>, ActionKind)>,
}

impl ActionRecord {
    pub fn push(&mut self, at: DateTime<Utc>, kind: ActionKind) {
        self.entries.push_back((at, kind));
        while self.entries.len() > MAX_ENTRIES_PER_RECORD {
            self.entries.pop_front();
        }
    }

    /// Drop every entry with `now - ts > window`.
    ///
    /// Eviction is strict: an entry exactly `window` old is kept. Entries
    /// stamped slightly after `now` (handlers racing on the clock) are kept
    /// and counted; they are real actions and age out like any other.
    pub fn purge(&mut self, now: DateTime<Utc>, window: Duration) {
        self.entries.retain(|(ts, _)| now.signed_duration_since(*ts) <= window);
    }

    pub fn counts(&self) -> ActionCounts {
        let mut counts = ActionCounts::default();
        for (_, kind) in &self.entries {
            counts.increment(*kind);
        }
        counts
    }

    pub fn newest(&self) -> Option<DateTime<Utc>> {
        self.entries.iter().map(|(ts, _)| *ts).max()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    pub fn entries(&self) -> impl Iterator<Item = &(DateTime<Utc>, ActionKind)> {
        self.entries.iter()
    }
}

// ============================================================================
// LEDGER (STORE)
// ============================================================================

/// Composite key: records never aggregate across guilds or actors.
#[derive(Hash, Eq, PartialEq, Clone, Copy, Debug)]
struct GuildActorKey {
    guild_id: u64,
    actor_id: u64,
}

/// Owns every action record, keyed by (guild, actor).
///
/// Mutations for one key run while holding that key's DashMap entry, so an
/// append/purge/count sequence is atomic per key. Unrelated keys only
/// contend when they share a shard.
#[derive(Debug, Default)]
pub struct ActionLedger {
    records: DashMap<GuildActorKey, ActionRecord>,
}

impl ActionLedger {
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
        }
    }

    /// Run `f` against the (lazily created) record for this key.
    fn with_record<R>(
        &self,
        guild_id: u64,
        actor_id: u64,
        f: impl FnOnce(&mut ActionRecord) -> R,
    ) -> R {
        let key = GuildActorKey { guild_id, actor_id };
        let mut record = self.records.entry(key).or_default();
        f(&mut record)
    }

    /// Run `f` against an existing record only; missing records read as empty.
    fn with_existing<R>(
        &self,
        guild_id: u64,
        actor_id: u64,
        f: impl FnOnce(&mut ActionRecord) -> R,
    ) -> R {
        let key = GuildActorKey { guild_id, actor_id };
        match self.records.get_mut(&key) {
            Some(mut record) => f(&mut record),
            None => f(&mut ActionRecord::default()),
        }
    }

    /// Copy of the entries currently held for a key (no purge).
    #[cfg(test)]
    pub fn snapshot(&self, guild_id: u64, actor_id: u64) -> Vec<(DateTime<Utc>, ActionKind)> {
        let key = GuildActorKey { guild_id, actor_id };
        self.records
            .get(&key)
            .map(|record| record.entries().copied().collect())
            .unwrap_or_default()
    }

    pub fn remove(&self, guild_id: u64, actor_id: u64) -> bool {
        self.records
            .remove(&GuildActorKey { guild_id, actor_id })
            .is_some()
    }

    /// Drop records that are empty or whose newest entry is older than
    /// `retention`. Returns how many records were removed.
    pub fn prune_idle(&self, now: DateTime<Utc>, retention: Duration) -> usize {
        let before = self.records.len();
        self.records.retain(|_, record| match record.newest() {
            Some(newest) => now.signed_duration_since(newest) <= retention,
            None => false,
        });
        before.saturating_sub(self.records.len())
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

// ============================================================================
// GUARD
// ============================================================================

/// Decides whether an actor's recent actions warrant mitigation.
#[derive(Debug, Default)]
pub struct ActionRateGuard {
    ledger: ActionLedger,
}

impl ActionRateGuard {
    /// Create a guard over an injected ledger.
    pub fn new(ledger: ActionLedger) -> Self {
        Self { ledger }
    }

    #[cfg(test)]
    pub fn ledger(&self) -> &ActionLedger {
        &self.ledger
    }

    /// Append the action, purge stale entries, and evaluate thresholds.
    pub fn record_and_evaluate(
        &self,
        guild_id: u64,
        actor_id: u64,
        kind: ActionKind,
        now: DateTime<Utc>,
        config: &ThresholdConfig,
    ) -> Decision {
        self.record_and_count(guild_id, actor_id, kind, now, config).0
    }

    /// Same as `record_and_evaluate`, also returning the counts the decision
    /// was made on (taken under the same lock).
    pub fn record_and_count(
        &self,
        guild_id: u64,
        actor_id: u64,
        kind: ActionKind,
        now: DateTime<Utc>,
        config: &ThresholdConfig,
    ) -> (Decision, ActionCounts) {
        self.ledger.with_record(guild_id, actor_id, |record| {
            record.push(now, kind);
            record.purge(now, config.window());
            let counts = record.counts();
            (decide(&counts, config), counts)
        })
    }

    /// Purge and evaluate without appending anything.
    pub fn evaluate(
        &self,
        guild_id: u64,
        actor_id: u64,
        now: DateTime<Utc>,
        config: &ThresholdConfig,
    ) -> Decision {
        self.ledger.with_existing(guild_id, actor_id, |record| {
            record.purge(now, config.window());
            decide(&record.counts(), config)
        })
    }

    /// Purged per-kind counts for an actor.
    pub fn counts(
        &self,
        guild_id: u64,
        actor_id: u64,
        now: DateTime<Utc>,
        config: &ThresholdConfig,
    ) -> ActionCounts {
        self.ledger.with_existing(guild_id, actor_id, |record| {
            record.purge(now, config.window());
            record.counts()
        })
    }

    /// Forget everything recorded for an actor.
    pub fn reset(&self, guild_id: u64, actor_id: u64) -> bool {
        self.ledger.remove(guild_id, actor_id)
    }

    pub fn prune_idle(&self, now: DateTime<Utc>, retention: Duration) -> usize {
        self.ledger.prune_idle(now, retention)
    }
}

/// Walk thresholds in declared order; first satisfied kind wins.
/// Kinds missing from the list are never evaluated.
fn decide(counts: &ActionCounts, config: &ThresholdConfig) -> Decision {
    config
        .thresholds
        .iter()
        .find(|t| counts.get(t.kind) >= t.limit)
        .map(|t| Decision::Mitigate(t.kind))
        .unwrap_or(Decision::NoAction)
}

// ============================================================================
// TESTS
// ============================================================================
