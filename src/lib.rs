//! docfork - a multi-master document store with pluggable conflict resolution
//!
//! Convenience facade over the workspace crates. Embedders usually depend
//! on `docfork-core` and one storage engine directly.

pub use docfork_core::*;
pub use docfork_storage as storage;
