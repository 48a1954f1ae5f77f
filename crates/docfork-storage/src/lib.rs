//! docfork Storage Engines
//!
//! Implementations of [`docfork_core::RevisionStore`]:
//! - Memory (default): per-document revision trees held in process
//! - SQLite: embedded persistence of the same trees

pub mod memory;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use memory::MemoryStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;
