pub mod sqlite_guard_store;

pub use sqlite_guard_store::SqliteGuardStore;
