//! In-memory storage engine

use dashmap::DashMap;
use docfork_core::{
    Body, DocumentId, Result, RevisionRef, RevisionStore, RevisionTree, StorageError,
    StoreTransaction, TreeTransaction,
};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;

/// In-memory storage engine
///
/// Each document owns a revision tree behind its own lock, so writers to
/// different documents never contend. Data is lost when the process exits.
#[derive(Default)]
pub struct MemoryStore {
    trees: DashMap<DocumentId, Arc<Mutex<RevisionTree>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents with at least one revision
    pub fn document_count(&self) -> usize {
        self.trees.len()
    }

    /// Number of revisions stored for a document, across all branches
    pub fn revision_count(&self, doc_id: &DocumentId) -> usize {
        self.trees
            .get(doc_id)
            .map(|tree| tree.value().lock().len())
            .unwrap_or(0)
    }

    /// Insert a revision received from another replica and make it current.
    ///
    /// `parent` must already be stored; `None` starts a new root. The
    /// previously current revision stays in the tree as a sibling branch,
    /// so the next local write based on it is detected as a conflict.
    pub fn graft(
        &self,
        doc_id: &DocumentId,
        parent: Option<&RevisionRef>,
        body: Body,
        deleted: bool,
    ) -> Result<RevisionRef> {
        let slot = self.slot(doc_id);
        let mut tree = slot.lock();

        let parent_idx = match parent {
            Some(rev) => Some(tree.find(rev).ok_or_else(|| {
                StorageError::InvalidHistory(format!("unknown parent {} of {}", rev, doc_id))
            })?),
            None => None,
        };

        let revision = RevisionRef::derive(&parent.copied().into_iter().collect::<Vec<_>>(), deleted, &body)?;
        let idx = tree.insert(revision, body, parent_idx, None);
        tree.set_head(idx);
        debug!(doc = %doc_id, rev = %revision, "Grafted replicated revision");
        Ok(revision)
    }

    fn slot(&self, doc_id: &DocumentId) -> Arc<Mutex<RevisionTree>> {
        self.trees.entry(doc_id.clone()).or_default().value().clone()
    }

    /// Forget a tree nobody wrote to, unless another transaction holds it
    fn release_if_empty(&self, doc_id: &DocumentId) {
        self.trees
            .remove_if(doc_id, |_, tree| Arc::strong_count(tree) == 1 && tree.lock().is_empty());
    }
}

impl RevisionStore for MemoryStore {
    fn in_transaction<T, F>(&self, doc_id: &DocumentId, f: F) -> Result<T>
    where
        F: FnOnce(&mut dyn StoreTransaction) -> Result<T>,
    {
        let slot = self.slot(doc_id);
        let result = {
            let mut tree = slot.lock();
            let checkpoint = tree.checkpoint();
            let result = f(&mut TreeTransaction::new(doc_id, &mut tree));
            if result.is_err() {
                tree.rollback(checkpoint);
            }
            result
        };
        drop(slot);
        self.release_if_empty(doc_id);
        result
    }
}
