//! Document types: identifiers, stored snapshots, and local edits

use crate::error::{Error, Result};
use crate::revision::RevisionRef;
use crate::value::{parse_path, Body, PathSegment, Value};
use serde::{Deserialize, Serialize};

/// Document identifier - UTF-8 string, max 512 bytes
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocumentId(String);

impl DocumentId {
    /// Create a new document ID, validating the format
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();

        if id.is_empty() {
            return Err(Error::InvalidDocumentId("Document ID cannot be empty".into()));
        }

        if id.len() > 512 {
            return Err(Error::InvalidDocumentId("Document ID exceeds 512 bytes".into()));
        }

        // Validate pattern: [a-zA-Z0-9:_-]+
        if !id.chars().all(|c| c.is_ascii_alphanumeric() || c == ':' || c == '_' || c == '-') {
            return Err(Error::InvalidDocumentId(
                "Document ID must match pattern [a-zA-Z0-9:_-]+".into(),
            ));
        }

        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for DocumentId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

/// Immutable snapshot of a document body at one revision.
///
/// Produced by a storage engine (with a revision) or by a conflict resolver
/// (without one, until it is committed).
#[derive(Debug, Clone, PartialEq)]
pub struct ReadOnlyDocument {
    id: DocumentId,
    revision: Option<RevisionRef>,
    body: Body,
}

impl ReadOnlyDocument {
    /// A document body not yet committed anywhere
    pub fn new(id: DocumentId, body: Body) -> Self {
        Self {
            id,
            revision: None,
            body,
        }
    }

    /// A document as stored at `revision`
    pub fn stored(id: DocumentId, revision: RevisionRef, body: Body) -> Self {
        Self {
            id,
            revision: Some(revision),
            body,
        }
    }

    pub fn id(&self) -> &DocumentId {
        &self.id
    }

    pub fn revision(&self) -> Option<&RevisionRef> {
        self.revision.as_ref()
    }

    pub fn generation(&self) -> u64 {
        self.revision.map_or(0, |r| r.generation)
    }

    /// True when this snapshot is backed by a committed revision
    pub fn exists(&self) -> bool {
        self.revision.is_some()
    }

    pub fn is_deleted(&self) -> bool {
        self.revision.map_or(false, |r| r.deleted)
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    pub fn into_body(self) -> Body {
        self.body
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.body.get(key)
    }

    /// Get a nested value (e.g. "address.city", "tags[0]")
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let segments = parse_path(path).ok()?;
        match segments.split_first()? {
            (PathSegment::Key(key), rest) => self.body.get(*key)?.walk(rest),
            _ => None,
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.body.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.body.iter()
    }

    /// Start a local edit based on this revision
    pub fn edit(&self) -> MutableDocument {
        MutableDocument {
            id: self.id.clone(),
            base: self.revision,
            body: self.body.clone(),
        }
    }
}

impl<'a> IntoIterator for &'a ReadOnlyDocument {
    type Item = (&'a String, &'a Value);
    type IntoIter = std::collections::btree_map::Iter<'a, String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.body.iter()
    }
}

/// Local, in-progress edit of a document.
///
/// Owned by the caller until saved; every mutation touches only the pending
/// body, never the base revision.
#[derive(Debug, Clone, PartialEq)]
pub struct MutableDocument {
    id: DocumentId,
    base: Option<RevisionRef>,
    body: Body,
}

impl MutableDocument {
    /// A brand-new document with no base revision
    pub fn new(id: DocumentId) -> Self {
        Self {
            id,
            base: None,
            body: Body::new(),
        }
    }

    /// A new document with an initial body
    pub fn with_body(id: DocumentId, body: Body) -> Self {
        Self {
            id,
            base: None,
            body,
        }
    }

    pub fn id(&self) -> &DocumentId {
        &self.id
    }

    /// Revision this edit started from
    pub fn base_revision(&self) -> Option<&RevisionRef> {
        self.base.as_ref()
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.body.get(key)
    }

    /// Set a top-level key
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.body.insert(key.into(), value.into());
        self
    }

    /// Set a nested value, creating intermediate objects and arrays.
    /// A failed write leaves the body as it was.
    pub fn set_path(&mut self, path: &str, value: impl Into<Value>) -> Result<&mut Self> {
        let segments = parse_path(path)?;
        let Some((PathSegment::Key(key), rest)) = segments.split_first() else {
            return Err(Error::InvalidPath(format!("{}: must start with a key", path)));
        };

        let mut slot = self.body.get(*key).cloned().unwrap_or_default();
        slot.assign(rest, value.into(), path)?;
        self.body.insert(key.to_string(), slot);
        Ok(self)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.body.remove(key)
    }

    pub fn replace_body(&mut self, body: Body) -> &mut Self {
        self.body = body;
        self
    }
}
