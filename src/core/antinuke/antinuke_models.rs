// Antinuke domain models - data structures shared by the rate guard,
// the antinuke service and the Discord adapters.
//
// These are pure domain types with no Discord dependencies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Default trailing window applied to every action kind.
pub const DEFAULT_WINDOW_SECS: u64 = 10;

/// Config key used for the window in `set_threshold`.
pub const WINDOW_KEY: &str = "action_window_seconds";

/// A privileged, destructive action that is rate limited per actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Ban,
    Kick,
    RoleDelete,
    ChannelDelete,
    EmojiDelete,
}

impl ActionKind {
    /// Every kind, in the default evaluation order.
    pub const ALL: [ActionKind; 5] = [
        ActionKind::Ban,
        ActionKind::Kick,
        ActionKind::RoleDelete,
        ActionKind::ChannelDelete,
        ActionKind::EmojiDelete,
    ];

    /// Stable key used in stored config and slash commands.
    pub fn key(&self) -> &'static str {
        match self {
            ActionKind::Ban => "ban",
            ActionKind::Kick => "kick",
            ActionKind::RoleDelete => "role_delete",
            ActionKind::ChannelDelete => "channel_delete",
            ActionKind::EmojiDelete => "emoji_delete",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionKind::Ban => write!(f, "Ban"),
            ActionKind::Kick => write!(f, "Kick"),
            ActionKind::RoleDelete => write!(f, "Role Delete"),
            ActionKind::ChannelDelete => write!(f, "Channel Delete"),
            ActionKind::EmojiDelete => write!(f, "Emoji Delete"),
        }
    }
}

impl FromStr for ActionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ActionKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.key() == s.trim().to_lowercase())
            .ok_or_else(|| format!("unknown action kind `{}`", s))
    }
}

/// One `(action_kind, threshold)` pair of a guild's threshold list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Threshold {
    pub kind: ActionKind,
    /// Count within the window that triggers mitigation (`count >= limit`).
    pub limit: u32,
}

/// Per-guild thresholds plus the shared window.
///
/// The order of `thresholds` is the evaluation order: the first kind whose
/// count reaches its limit wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThresholdConfig {
    pub window_seconds: u64,
    pub thresholds: Vec<Threshold>,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            window_seconds: DEFAULT_WINDOW_SECS,
            thresholds: vec![
                Threshold { kind: ActionKind::Ban, limit: 3 },
                Threshold { kind: ActionKind::Kick, limit: 4 },
                Threshold { kind: ActionKind::RoleDelete, limit: 2 },
                Threshold { kind: ActionKind::ChannelDelete, limit: 2 },
                Threshold { kind: ActionKind::EmojiDelete, limit: 3 },
            ],
        }
    }
}

impl ThresholdConfig {
    /// Build a config from an ordered list of pairs.
    pub fn new(window_seconds: u64, pairs: &[(ActionKind, u32)]) -> Self {
        Self {
            window_seconds,
            thresholds: pairs
                .iter()
                .map(|(kind, limit)| Threshold {
                    kind: *kind,
                    limit: *limit,
                })
                .collect(),
        }
    }

    pub fn window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.window_seconds.min(u32::MAX as u64) as i64)
    }

    pub fn limit_for(&self, kind: ActionKind) -> Option<u32> {
        self.thresholds
            .iter()
            .find(|t| t.kind == kind)
            .map(|t| t.limit)
    }

    /// Update a single limit, keeping its position in the order.
    /// Kinds not yet present are appended at the end.
    pub fn set_limit(&mut self, kind: ActionKind, limit: u32) {
        match self.thresholds.iter_mut().find(|t| t.kind == kind) {
            Some(existing) => existing.limit = limit,
            None => self.thresholds.push(Threshold { kind, limit }),
        }
    }

    /// Take a kind out of evaluation entirely. Returns `false` if it was
    /// not configured.
    pub fn remove_limit(&mut self, kind: ActionKind) -> bool {
        let before = self.thresholds.len();
        self.thresholds.retain(|t| t.kind != kind);
        self.thresholds.len() != before
    }

    /// All keys accepted by `set_threshold`.
    pub fn keys() -> Vec<&'static str> {
        ActionKind::ALL
            .iter()
            .map(|k| k.key())
            .chain(std::iter::once(WINDOW_KEY))
            .collect()
    }
}

/// Outcome of evaluating an actor's record against a config.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    NoAction,
    Mitigate(ActionKind),
}

/// Per-kind counts of a purged record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionCounts {
    counts: Vec<(ActionKind, u32)>,
}

impl ActionCounts {
    pub fn increment(&mut self, kind: ActionKind) {
        match self.counts.iter_mut().find(|(k, _)| *k == kind) {
            Some((_, count)) => *count += 1,
            None => self.counts.push((kind, 1)),
        }
    }

    pub fn get(&self, kind: ActionKind) -> u32 {
        self.counts
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, c)| *c)
            .unwrap_or(0)
    }

    pub fn total(&self) -> u32 {
        self.counts.iter().map(|(_, c)| c).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

/// Whether whitelisted actors still accumulate pressure in the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WhitelistPolicy {
    /// Record the action but never mitigate; a triggered threshold is reported.
    #[default]
    Record,
    /// Do not touch the ledger at all for whitelisted actors.
    Skip,
}

impl FromStr for WhitelistPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "record" => Ok(WhitelistPolicy::Record),
            "skip" => Ok(WhitelistPolicy::Skip),
            other => Err(format!("unknown whitelist policy `{}`", other)),
        }
    }
}

/// A privileged action already attributed to an actor by the caller.
#[derive(Debug, Clone)]
pub struct ObservedAction {
    pub guild_id: u64,
    pub actor_id: u64,
    /// Role ids the actor holds, used for role whitelisting.
    pub actor_role_ids: Vec<u64>,
    pub kind: ActionKind,
    pub at: DateTime<Utc>,
}

/// What the mitigation executor is asked to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MitigationPlan {
    BanActor,
    KickActor,
    /// Remove every permission from the actor's highest manageable role.
    StripTopRole,
}

impl fmt::Display for MitigationPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MitigationPlan::BanActor => write!(f, "Ban"),
            MitigationPlan::KickActor => write!(f, "Kick"),
            MitigationPlan::StripTopRole => write!(f, "Strip top role permissions"),
        }
    }
}

/// Result reported back by a mitigation executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MitigationOutcome {
    Applied { detail: String },
    /// Nothing could be done (e.g. no role below the bot's top role).
    NothingToDo { reason: String },
    Failed { reason: String },
}

/// Summary of how the service handled one observed action.
#[derive(Debug, Clone, PartialEq)]
pub enum GuardReport {
    /// Recorded; below every threshold.
    Recorded {
        kind: ActionKind,
        count: u32,
        limit: Option<u32>,
    },
    /// Whitelisted actor under `WhitelistPolicy::Skip`.
    Skipped { kind: ActionKind },
    /// A threshold fired but the actor is whitelisted.
    WhitelistBypass { kind: ActionKind },
    Mitigated {
        kind: ActionKind,
        plan: MitigationPlan,
        outcome: MitigationOutcome,
    },
}
