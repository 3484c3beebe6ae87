// Discord-specific antinuke plumbing: audit-log attribution, mitigation
// through the HTTP API, and the guild log channel.

pub mod events;
pub mod executor;
pub mod formatter;
pub mod log_channel;
