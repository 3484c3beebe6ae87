// Discord layer - commands and event handlers.

#[path = "commands/command_catalog.rs"]
pub mod commands;

#[path = "antinuke/mod.rs"]
pub mod antinuke;

// Re-export command types for convenience
pub use commands::antinuke::{Context, Data, Error};
