//! Conflicts and their detection

use crate::document::{DocumentId, ReadOnlyDocument};
use crate::revision::RevisionRef;

/// Two revisions of one document that diverged from a common ancestor.
///
/// `source` is the revision being written, `target` the one currently
/// stored that the writer never saw. Built for a single resolution and
/// dropped once the resolver returns.
#[derive(Debug, Clone)]
pub struct Conflict {
    source: ReadOnlyDocument,
    target: ReadOnlyDocument,
    common_ancestor: Option<ReadOnlyDocument>,
}

impl Conflict {
    pub fn new(
        source: ReadOnlyDocument,
        target: ReadOnlyDocument,
        common_ancestor: Option<ReadOnlyDocument>,
    ) -> Self {
        debug_assert_eq!(source.id(), target.id());
        Self {
            source,
            target,
            common_ancestor,
        }
    }

    pub fn doc_id(&self) -> &DocumentId {
        self.source.id()
    }

    pub fn source(&self) -> &ReadOnlyDocument {
        &self.source
    }

    pub fn target(&self) -> &ReadOnlyDocument {
        &self.target
    }

    /// Absent when the two branches share no recorded ancestor
    pub fn common_ancestor(&self) -> Option<&ReadOnlyDocument> {
        self.common_ancestor.as_ref()
    }

    /// Exactly one side is a deletion, the other live content
    pub fn is_deletion_against_live(&self) -> bool {
        self.source.is_deleted() != self.target.is_deleted()
    }
}

/// Outcome of comparing a writer's base revision with the stored one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Detection {
    /// The write extends the current revision directly
    NoConflict,
    /// The current revision is on a branch the writer has not seen
    Conflict,
}

/// Decide whether a write based on `base` can extend `current`.
///
/// A document with no stored revision never conflicts. A write with no base
/// may recreate a document whose current revision is a tombstone.
pub fn detect(base: Option<&RevisionRef>, current: Option<&RevisionRef>) -> Detection {
    match (base, current) {
        (_, None) => Detection::NoConflict,
        (Some(base), Some(current)) if base.same_revision(current) => Detection::NoConflict,
        (None, Some(current)) if current.deleted => Detection::NoConflict,
        _ => Detection::Conflict,
    }
}
