// The core module contains all business logic.
// Each feature gets its own submodule.

#[path = "antinuke/mod.rs"]
pub mod antinuke;
