//! Per-document revision tree stored as an append-only arena.
//!
//! Nodes are addressed by index; parent links are indices into the same
//! arena, so ancestry walks never chase owned pointers. A node has at most
//! two parents: its primary parent (the branch it extends) and, for merge
//! revisions, the branch folded into it.

use crate::document::{DocumentId, ReadOnlyDocument};
use crate::revision::{RevisionId, RevisionRef};
use crate::value::Body;
use std::collections::{HashMap, HashSet, VecDeque};

/// One revision in the arena
#[derive(Debug, Clone)]
pub struct RevisionNode {
    pub revision: RevisionRef,
    pub body: Body,
    pub parent: Option<usize>,
    pub merged: Option<usize>,
}

impl RevisionNode {
    fn parents(&self) -> impl Iterator<Item = usize> {
        self.parent.into_iter().chain(self.merged)
    }
}

/// Saved arena state for all-or-nothing rollback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoint {
    len: usize,
    head: Option<usize>,
}

/// Revision tree of a single document
#[derive(Debug, Clone, Default)]
pub struct RevisionTree {
    nodes: Vec<RevisionNode>,
    index: HashMap<RevisionId, usize>,
    head: Option<usize>,
}

impl RevisionTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, idx: usize) -> Option<&RevisionNode> {
        self.nodes.get(idx)
    }

    pub fn nodes(&self) -> &[RevisionNode] {
        &self.nodes
    }

    pub fn find(&self, revision: &RevisionRef) -> Option<usize> {
        self.find_id(&RevisionId::from(*revision))
    }

    pub fn find_id(&self, id: &RevisionId) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn head_index(&self) -> Option<usize> {
        self.head
    }

    /// Current revision of the document
    pub fn head(&self) -> Option<&RevisionNode> {
        self.head.and_then(|idx| self.nodes.get(idx))
    }

    /// Append a node. Returns the existing index if the revision is already
    /// present, since identical revisions are the same node.
    pub fn insert(
        &mut self,
        revision: RevisionRef,
        body: Body,
        parent: Option<usize>,
        merged: Option<usize>,
    ) -> usize {
        let key = RevisionId::from(revision);
        if let Some(&idx) = self.index.get(&key) {
            return idx;
        }

        debug_assert!(parent
            .into_iter()
            .chain(merged)
            .all(|p| self.nodes[p].revision.generation < revision.generation));

        let idx = self.nodes.len();
        self.nodes.push(RevisionNode {
            revision,
            body,
            parent,
            merged,
        });
        self.index.insert(key, idx);
        idx
    }

    pub fn set_head(&mut self, idx: usize) {
        debug_assert!(idx < self.nodes.len());
        self.head = Some(idx);
    }

    /// Breadth-first walk over `idx` and every revision it descends from
    pub fn ancestors(&self, idx: usize) -> Ancestors<'_> {
        let mut queue = VecDeque::new();
        queue.push_back(idx);
        Ancestors {
            tree: self,
            queue,
            seen: HashSet::new(),
        }
    }

    /// True when `ancestor` is reachable from `descendant` (or equal to it)
    pub fn is_ancestor(&self, ancestor: usize, descendant: usize) -> bool {
        self.ancestors(descendant).any(|idx| idx == ancestor)
    }

    /// Nearest revision reachable from both `a` and `b`: the shared ancestor
    /// with the highest generation, digest breaking ties.
    pub fn common_ancestor(&self, a: usize, b: usize) -> Option<usize> {
        let from_a: HashSet<usize> = self.ancestors(a).collect();
        self.ancestors(b)
            .filter(|idx| from_a.contains(idx))
            .max_by_key(|&idx| {
                let rev = &self.nodes[idx].revision;
                (rev.generation, rev.digest)
            })
    }

    /// Primary-parent chain from `idx` back to the root, newest first
    pub fn history(&self, idx: usize) -> Vec<RevisionRef> {
        let mut out = Vec::new();
        let mut cursor = Some(idx);
        while let Some(i) = cursor {
            let node = &self.nodes[i];
            out.push(node.revision);
            cursor = node.parent;
        }
        out
    }

    /// Materialize a node as a document snapshot
    pub fn document(&self, id: &DocumentId, idx: usize) -> Option<ReadOnlyDocument> {
        self.nodes
            .get(idx)
            .map(|node| ReadOnlyDocument::stored(id.clone(), node.revision, node.body.clone()))
    }

    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            len: self.nodes.len(),
            head: self.head,
        }
    }

    /// Drop everything appended since `checkpoint` and restore its head
    pub fn rollback(&mut self, checkpoint: Checkpoint) {
        for node in self.nodes.drain(checkpoint.len..) {
            self.index.remove(&RevisionId::from(node.revision));
        }
        self.head = checkpoint.head;
    }
}

/// Iterator returned by [`RevisionTree::ancestors`]
pub struct Ancestors<'a> {
    tree: &'a RevisionTree,
    queue: VecDeque<usize>,
    seen: HashSet<usize>,
}

impl Iterator for Ancestors<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        while let Some(idx) = self.queue.pop_front() {
            if !self.seen.insert(idx) {
                continue;
            }
            if let Some(node) = self.tree.nodes.get(idx) {
                self.queue.extend(node.parents());
                return Some(idx);
            }
        }
        None
    }
}
