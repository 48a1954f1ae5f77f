//! Storage engine contract
//!
//! The pipeline never touches persistence directly. It asks a
//! [`RevisionStore`] for a transaction scoped to one document and performs
//! its read-resolve-write sequence through [`StoreTransaction`]. Whatever the
//! closure writes is discarded unless it returns `Ok`.

use crate::document::{DocumentId, ReadOnlyDocument};
use crate::error::Result;
use crate::revision::{RevisionId, RevisionRef};
use crate::tree::RevisionTree;
use crate::value::Body;

/// Storage error types
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("Stale write on {doc_id}: expected parent {expected:?}, current is {current:?}")]
    StaleWrite {
        doc_id: String,
        expected: Option<RevisionRef>,
        current: Option<RevisionRef>,
    },

    #[error("Invalid history: {0}")]
    InvalidHistory(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Database error: {0}")]
    Database(String),
}

/// The side branch folded into a merge revision
#[derive(Debug, Clone)]
pub struct MergedBranch {
    /// Revision the branch was based on, if known to this store
    pub parent: Option<RevisionRef>,
    pub revision: RevisionRef,
    pub body: Body,
}

/// A request to append one revision
#[derive(Debug, Clone)]
pub struct PutRequest {
    pub body: Body,
    pub deleted: bool,
    /// Explicit history; the first entry must be the current revision
    pub history: Vec<RevisionRef>,
    /// Present for merge commits
    pub merged: Option<MergedBranch>,
}

impl PutRequest {
    /// Revision this request will create
    pub fn target_revision(&self) -> Result<RevisionRef> {
        let mut parents: Vec<RevisionRef> = self.history.first().copied().into_iter().collect();
        if let Some(branch) = &self.merged {
            parents.push(branch.revision);
        }
        RevisionRef::derive(&parents, self.deleted, &self.body)
    }
}

/// Read/write access to one document's revisions inside a transaction
pub trait StoreTransaction {
    fn doc_id(&self) -> &DocumentId;

    /// Current revision; `StorageError::NotFound` when the document has none
    fn current_revision(&self) -> Result<ReadOnlyDocument>;

    /// Look up a specific revision
    fn revision(&self, id: &RevisionId) -> Result<Option<ReadOnlyDocument>>;

    /// Nearest revision both `a` and `b` descend from
    fn common_ancestor(&self, a: &RevisionRef, b: &RevisionRef) -> Result<Option<ReadOnlyDocument>>;

    /// Primary-parent history of the current revision, newest first
    fn history(&self) -> Result<Vec<RevisionRef>>;

    /// Append a revision and make it current
    fn put_revision(&mut self, request: PutRequest) -> Result<RevisionRef>;
}

/// A storage engine that serializes writers per document
pub trait RevisionStore: Send + Sync {
    /// Run `f` with exclusive access to `doc_id`. Writes made by `f` are
    /// committed atomically when it returns `Ok` and discarded otherwise.
    fn in_transaction<T, F>(&self, doc_id: &DocumentId, f: F) -> Result<T>
    where
        F: FnOnce(&mut dyn StoreTransaction) -> Result<T>;
}

impl<S: RevisionStore> RevisionStore for std::sync::Arc<S> {
    fn in_transaction<T, F>(&self, doc_id: &DocumentId, f: F) -> Result<T>
    where
        F: FnOnce(&mut dyn StoreTransaction) -> Result<T>,
    {
        (**self).in_transaction(doc_id, f)
    }
}

/// [`StoreTransaction`] over an in-memory [`RevisionTree`].
///
/// Storage engines load or lock the document's tree, wrap it in this type,
/// and persist what was appended once the closure succeeds.
pub struct TreeTransaction<'a> {
    doc_id: &'a DocumentId,
    tree: &'a mut RevisionTree,
}

impl<'a> TreeTransaction<'a> {
    pub fn new(doc_id: &'a DocumentId, tree: &'a mut RevisionTree) -> Self {
        Self { doc_id, tree }
    }

    fn require(&self, revision: &RevisionRef) -> Result<usize> {
        self.tree.find(revision).ok_or_else(|| {
            StorageError::InvalidHistory(format!("unknown revision {} of {}", revision, self.doc_id))
                .into()
        })
    }
}

impl StoreTransaction for TreeTransaction<'_> {
    fn doc_id(&self) -> &DocumentId {
        self.doc_id
    }

    fn current_revision(&self) -> Result<ReadOnlyDocument> {
        self.tree
            .head_index()
            .and_then(|idx| self.tree.document(self.doc_id, idx))
            .ok_or_else(|| StorageError::NotFound(self.doc_id.to_string()).into())
    }

    fn revision(&self, id: &RevisionId) -> Result<Option<ReadOnlyDocument>> {
        Ok(self
            .tree
            .find_id(id)
            .and_then(|idx| self.tree.document(self.doc_id, idx)))
    }

    fn common_ancestor(&self, a: &RevisionRef, b: &RevisionRef) -> Result<Option<ReadOnlyDocument>> {
        let (Some(a), Some(b)) = (self.tree.find(a), self.tree.find(b)) else {
            return Ok(None);
        };
        Ok(self
            .tree
            .common_ancestor(a, b)
            .and_then(|idx| self.tree.document(self.doc_id, idx)))
    }

    fn history(&self) -> Result<Vec<RevisionRef>> {
        Ok(self
            .tree
            .head_index()
            .map(|idx| self.tree.history(idx))
            .unwrap_or_default())
    }

    fn put_revision(&mut self, request: PutRequest) -> Result<RevisionRef> {
        let current = self.tree.head().map(|node| node.revision);
        let expected = request.history.first().copied();

        let matches = match (expected, current) {
            (Some(expected), Some(current)) => expected.same_revision(&current),
            (None, None) => true,
            _ => false,
        };
        if !matches {
            return Err(StorageError::StaleWrite {
                doc_id: self.doc_id.to_string(),
                expected,
                current,
            }
            .into());
        }

        let revision = request.target_revision()?;
        let parent = match expected {
            Some(rev) => Some(self.require(&rev)?),
            None => None,
        };

        let merged = match request.merged {
            Some(branch) => {
                // A base this store never saw (pruned, or foreign) roots the branch
                let branch_parent = branch.parent.and_then(|rev| self.tree.find(&rev));
                if let Some(p) = branch_parent {
                    let parent_gen = self.tree.nodes()[p].revision.generation;
                    if branch.revision.generation <= parent_gen {
                        return Err(StorageError::InvalidHistory(format!(
                            "branch revision {} does not descend from {}",
                            branch.revision, self.tree.nodes()[p].revision
                        ))
                        .into());
                    }
                }
                Some(self.tree.insert(branch.revision, branch.body, branch_parent, None))
            }
            None => None,
        };

        let idx = self.tree.insert(revision, request.body, parent, merged);
        self.tree.set_head(idx);
        Ok(revision)
    }
}
