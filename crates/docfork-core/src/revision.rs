//! Revision identity: generation + content digest

use crate::codec;
use crate::error::{Error, Result};
use crate::value::Body;
use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};
use std::fmt;
use std::str::FromStr;

/// SHA-256 content digest of a revision
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Digest([u8; 32]);

impl Digest {
    pub const LEN: usize = 32;

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", &self.to_hex()[..12])
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for Digest {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let bytes = hex::decode(s).map_err(|e| Error::InvalidRevision(e.to_string()))?;
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| Error::InvalidRevision(format!("digest must be {} bytes", Digest::LEN)))?;
        Ok(Self(bytes))
    }
}

/// Identity of one committed revision.
///
/// Generation strictly increases along any ancestry chain. Two references
/// with the same generation and digest name the same revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RevisionRef {
    pub generation: u64,
    pub digest: Digest,
    pub deleted: bool,
}

impl RevisionRef {
    /// Derive the revision produced by writing `body` on top of `parents`.
    ///
    /// Generation is one past the deepest parent. Parent digests are hashed in
    /// sorted order, so a merge of the same pair yields the same revision on
    /// every replica whichever side was local.
    pub fn derive(parents: &[RevisionRef], deleted: bool, body: &Body) -> Result<Self> {
        let generation = parents.iter().map(|p| p.generation).max().unwrap_or(0) + 1;

        let mut parent_digests: Vec<Digest> = parents.iter().map(|p| p.digest).collect();
        parent_digests.sort_unstable();

        let mut hasher = Sha256::new();
        for digest in &parent_digests {
            hasher.update(digest.as_bytes());
        }
        hasher.update([deleted as u8]);
        hasher.update(codec::encode_body(body)?);

        Ok(Self {
            generation,
            digest: Digest(hasher.finalize().into()),
            deleted,
        })
    }

    /// Same revision identity, ignoring the deletion flag carried alongside
    pub fn same_revision(&self, other: &RevisionRef) -> bool {
        self.generation == other.generation && self.digest == other.digest
    }
}

impl fmt::Display for RevisionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.generation, self.digest)
    }
}

/// Parsed `<generation>-<hex digest>` revision string.
///
/// The deletion flag is not part of the textual form, so the storage
/// engine resolves it (see `StoreTransaction::revision`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RevisionId {
    pub generation: u64,
    pub digest: Digest,
}

impl RevisionId {
    pub fn matches(&self, revision: &RevisionRef) -> bool {
        self.generation == revision.generation && self.digest == revision.digest
    }
}

impl From<RevisionRef> for RevisionId {
    fn from(rev: RevisionRef) -> Self {
        Self {
            generation: rev.generation,
            digest: rev.digest,
        }
    }
}

impl fmt::Display for RevisionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.generation, self.digest)
    }
}

impl FromStr for RevisionId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (generation, digest) = s
            .split_once('-')
            .ok_or_else(|| Error::InvalidRevision(format!("expected <generation>-<digest>: {}", s)))?;
        let generation: u64 = generation
            .parse()
            .map_err(|_| Error::InvalidRevision(format!("bad generation: {}", generation)))?;
        if generation == 0 {
            return Err(Error::InvalidRevision("generation starts at 1".into()));
        }
        Ok(Self {
            generation,
            digest: digest.parse()?,
        })
    }
}
