//! claimindex-storage — pluggable state-store backends for ClaimIndex.
//!
//! Backends:
//! - `MemoryStateStore` (re-exported from core) — in-memory, no persistence
//! - [`sqlite`] — SQLite via `sqlx` (embedded, single-file persistence)

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use claimindex_core::store::MemoryStateStore;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStateStore;
