// Core antinuke module - rate guard, attribution and mitigation logic.
// Following the same layout as the other core features.

pub mod antinuke_models;
pub mod antinuke_service;
pub mod attribution;
pub mod mitigation;
pub mod rate_guard;

pub use antinuke_models::*;
pub use antinuke_service::*;
pub use attribution::{find_responsible_actor, AuditCursor, AuditEntry};
pub use mitigation::{pick_strippable_role, MitigationExecutor};
pub use rate_guard::{ActionLedger, ActionRateGuard};
