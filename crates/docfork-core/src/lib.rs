//! docfork Core - revisions, conflicts, and the save pipeline
//!
//! This crate provides the core functionality for docfork:
//! - Revision identity (generation + digest) and per-document revision trees
//! - Read-only snapshots and mutable edits of documents
//! - Conflict detection and pluggable conflict resolvers
//! - The save/delete pipeline over an abstract revision store

pub mod codec;
pub mod conflict;
pub mod database;
pub mod document;
pub mod error;
pub mod resolver;
pub mod revision;
pub mod store;
pub mod tree;
pub mod value;

pub use conflict::{detect, Conflict, Detection};
pub use database::{Database, DatabaseConfig};
pub use document::{DocumentId, MutableDocument, ReadOnlyDocument};
pub use error::{ConflictReason, Error, Result};
pub use resolver::{
    default_winner, ConflictResolver, DefaultResolver, GiveUp, MergeResolver, ResolverKind, Side,
    SourceWins, TargetWins,
};
pub use revision::{Digest, RevisionId, RevisionRef};
pub use store::{MergedBranch, PutRequest, RevisionStore, StorageError, StoreTransaction, TreeTransaction};
pub use tree::RevisionTree;
pub use value::{parse_path, Body, Number, PathSegment, Value};
