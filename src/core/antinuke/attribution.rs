// Audit-log attribution - maps an anonymous guild event ("a role was
// deleted") to the account responsible for it.
//
// The Discord layer fetches the most recent audit entries and converts them
// into `AuditEntry` values; everything here is plain data so it can be tested
// without a gateway connection.

use super::antinuke_models::ActionKind;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

/// Platform-neutral view of one audit-log entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEntry {
    /// Snowflake id of the entry; increases with time.
    pub entry_id: u64,
    pub kind: ActionKind,
    pub actor_id: u64,
    pub target_id: Option<u64>,
    pub created_at: DateTime<Utc>,
}

/// Find the actor behind `kind` on `target_id`.
///
/// Picks the newest matching entry that is at most `max_age` old at `now`.
/// With `target_id == None` any target matches (emoji deletions do not carry
/// a usable target in the gateway event).
pub fn find_responsible_actor<'a>(
    entries: &'a [AuditEntry],
    kind: ActionKind,
    target_id: Option<u64>,
    now: DateTime<Utc>,
    max_age: Duration,
) -> Option<&'a AuditEntry> {
    entries
        .iter()
        .filter(|e| e.kind == kind)
        .filter(|e| target_id.is_none() || e.target_id == target_id)
        .filter(|e| now.signed_duration_since(e.created_at) <= max_age)
        .max_by_key(|e| e.entry_id)
}

/// Remembers the newest audit entry already handled per (guild, kind), so an
/// entry seen by two gateway events is only counted once.
#[derive(Debug, Default)]
pub struct AuditCursor {
    last_seen: DashMap<(u64, ActionKind), u64>,
}

impl AuditCursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` (and advances) if `entry_id` was not handled yet.
    pub fn advance(&self, guild_id: u64, kind: ActionKind, entry_id: u64) -> bool {
        let mut last = self.last_seen.entry((guild_id, kind)).or_insert(0);
        if entry_id > *last {
            *last = entry_id;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(entry_id: u64, kind: ActionKind, actor_id: u64, target: u64, secs: i64) -> AuditEntry {
        AuditEntry {
            entry_id,
            kind,
            actor_id,
            target_id: Some(target),
            created_at: DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap(),
        }
    }

    fn now(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn test_matches_kind_and_target() {
        let entries = vec![
            entry(1, ActionKind::RoleDelete, 10, 500, 0),
            entry(2, ActionKind::ChannelDelete, 11, 600, 1),
            entry(3, ActionKind::RoleDelete, 12, 501, 2),
        ];

        let found = find_responsible_actor(
            &entries,
            ActionKind::RoleDelete,
            Some(500),
            now(5),
            Duration::seconds(30),
        );
        assert_eq!(found.map(|e| e.actor_id), Some(10));
    }

    #[test]
    fn test_prefers_newest_entry() {
        let entries = vec![
            entry(7, ActionKind::Ban, 1, 99, 0),
            entry(9, ActionKind::Ban, 2, 99, 3),
            entry(8, ActionKind::Ban, 3, 99, 2),
        ];

        let found =
            find_responsible_actor(&entries, ActionKind::Ban, Some(99), now(4), Duration::seconds(30));
        assert_eq!(found.map(|e| e.actor_id), Some(2));
    }

    #[test]
    fn test_stale_entries_are_not_attributed() {
        let entries = vec![entry(1, ActionKind::Kick, 5, 77, 0)];

        let found =
            find_responsible_actor(&entries, ActionKind::Kick, Some(77), now(31), Duration::seconds(30));
        assert!(found.is_none());
    }

    #[test]
    fn test_any_target_when_unknown() {
        let entries = vec![entry(4, ActionKind::EmojiDelete, 8, 1234, 0)];

        let found =
            find_responsible_actor(&entries, ActionKind::EmojiDelete, None, now(1), Duration::seconds(30));
        assert_eq!(found.map(|e| e.entry_id), Some(4));
    }

    #[test]
    fn test_cursor_counts_each_entry_once() {
        let cursor = AuditCursor::new();

        assert!(cursor.advance(1, ActionKind::EmojiDelete, 10));
        assert!(!cursor.advance(1, ActionKind::EmojiDelete, 10));
        assert!(!cursor.advance(1, ActionKind::EmojiDelete, 9));
        assert!(cursor.advance(1, ActionKind::EmojiDelete, 11));

        // Separate guilds and kinds have separate cursors.
        assert!(cursor.advance(2, ActionKind::EmojiDelete, 10));
        assert!(cursor.advance(1, ActionKind::Ban, 10));
    }
}
