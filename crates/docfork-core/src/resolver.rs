//! Conflict resolvers and the default resolution policy

use crate::conflict::Conflict;
use crate::document::ReadOnlyDocument;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;

/// Pluggable conflict resolution policy.
///
/// Returning `None` gives up: the write fails with a conflict error and
/// storage is left as it was. A resolver runs while the document's write
/// transaction is held, so it must not block on unrelated I/O.
pub trait ConflictResolver: Send + Sync {
    fn resolve(&self, conflict: &Conflict) -> Option<ReadOnlyDocument>;
}

impl<F> ConflictResolver for F
where
    F: Fn(&Conflict) -> Option<ReadOnlyDocument> + Send + Sync,
{
    fn resolve(&self, conflict: &Conflict) -> Option<ReadOnlyDocument> {
        self(conflict)
    }
}

/// Which side of a conflict won
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Source,
    Target,
}

/// Deterministic winner between two conflicting revisions.
///
/// Live content beats a tombstone. Otherwise the deeper generation wins and
/// equal generations fall back to the larger digest, so every replica picks
/// the same side for the same pair.
pub fn default_winner(source: &ReadOnlyDocument, target: &ReadOnlyDocument) -> Side {
    match (source.is_deleted(), target.is_deleted()) {
        (true, false) => return Side::Target,
        (false, true) => return Side::Source,
        _ => {}
    }

    let key = |doc: &ReadOnlyDocument| doc.revision().map(|r| (r.generation, r.digest));
    match key(source).cmp(&key(target)) {
        Ordering::Less => Side::Target,
        Ordering::Greater | Ordering::Equal => Side::Source,
    }
}

/// Resolver applying [`default_winner`]
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultResolver;

impl ConflictResolver for DefaultResolver {
    fn resolve(&self, conflict: &Conflict) -> Option<ReadOnlyDocument> {
        Some(match default_winner(conflict.source(), conflict.target()) {
            Side::Source => conflict.source().clone(),
            Side::Target => conflict.target().clone(),
        })
    }
}

/// The revision being written always wins
#[derive(Debug, Clone, Copy, Default)]
pub struct SourceWins;

impl ConflictResolver for SourceWins {
    fn resolve(&self, conflict: &Conflict) -> Option<ReadOnlyDocument> {
        Some(conflict.source().clone())
    }
}

/// The stored revision always wins
#[derive(Debug, Clone, Copy, Default)]
pub struct TargetWins;

impl ConflictResolver for TargetWins {
    fn resolve(&self, conflict: &Conflict) -> Option<ReadOnlyDocument> {
        Some(conflict.target().clone())
    }
}

/// Never resolves; every conflict is reported to the writer
#[derive(Debug, Clone, Copy, Default)]
pub struct GiveUp;

impl ConflictResolver for GiveUp {
    fn resolve(&self, _conflict: &Conflict) -> Option<ReadOnlyDocument> {
        None
    }
}

/// Key-level three-way merge.
///
/// Starts from the common ancestor, applies every key of the target, then
/// the source keys the target does not carry. Keys present on both sides
/// take the target's value.
#[derive(Debug, Clone, Copy, Default)]
pub struct MergeResolver;

impl ConflictResolver for MergeResolver {
    fn resolve(&self, conflict: &Conflict) -> Option<ReadOnlyDocument> {
        let mut body = conflict
            .common_ancestor()
            .map(|doc| doc.body().clone())
            .unwrap_or_default();

        let mut changed = HashSet::new();
        for (key, value) in conflict.target() {
            body.insert(key.clone(), value.clone());
            changed.insert(key.as_str());
        }
        for (key, value) in conflict.source() {
            if !changed.contains(key.as_str()) {
                body.insert(key.clone(), value.clone());
            }
        }

        Some(ReadOnlyDocument::new(conflict.doc_id().clone(), body))
    }
}

/// Built-in resolver selection by name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResolverKind {
    /// No resolver installed: generation/tombstone policy
    Default,
    SourceWins,
    TargetWins,
    GiveUp,
    Merge,
}

impl ResolverKind {
    /// Resolver to install; `None` for the default policy
    pub fn into_resolver(self) -> Option<Arc<dyn ConflictResolver>> {
        match self {
            ResolverKind::Default => None,
            ResolverKind::SourceWins => Some(Arc::new(SourceWins)),
            ResolverKind::TargetWins => Some(Arc::new(TargetWins)),
            ResolverKind::GiveUp => Some(Arc::new(GiveUp)),
            ResolverKind::Merge => Some(Arc::new(MergeResolver)),
        }
    }
}

impl Default for ResolverKind {
    fn default() -> Self {
        Self::Default
    }
}

impl std::fmt::Display for ResolverKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResolverKind::Default => write!(f, "default"),
            ResolverKind::SourceWins => write!(f, "source-wins"),
            ResolverKind::TargetWins => write!(f, "target-wins"),
            ResolverKind::GiveUp => write!(f, "give-up"),
            ResolverKind::Merge => write!(f, "merge"),
        }
    }
}

impl std::str::FromStr for ResolverKind {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "default" => Ok(ResolverKind::Default),
            "source-wins" | "source" | "mine" => Ok(ResolverKind::SourceWins),
            "target-wins" | "target" | "theirs" => Ok(ResolverKind::TargetWins),
            "give-up" | "none" => Ok(ResolverKind::GiveUp),
            "merge" => Ok(ResolverKind::Merge),
            _ => Err(crate::Error::InvalidStrategy(format!("Unknown resolver: {}", s))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::DocumentId;
    use crate::revision::RevisionRef;
    use crate::value::{Body, Value};

    fn doc(parents: &[RevisionRef], deleted: bool, pairs: &[(&str, Value)]) -> ReadOnlyDocument {
        let body: Body = pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect();
        let rev = RevisionRef::derive(parents, deleted, &body).unwrap();
        ReadOnlyDocument::stored(DocumentId::new("doc1").unwrap(), rev, body)
    }

    fn rev_of(doc: &ReadOnlyDocument) -> RevisionRef {
        *doc.revision().unwrap()
    }

    #[test]
    fn test_live_content_beats_tombstone() {
        let root = doc(&[], false, &[("name", "Scott".into())]);
        let deep_tombstone = {
            let mid = doc(&[rev_of(&root)], false, &[("name", "x".into())]);
            doc(&[rev_of(&mid)], true, &[])
        };
        let live = doc(&[rev_of(&root)], false, &[("name", "Scotty".into())]);

        assert_eq!(default_winner(&deep_tombstone, &live), Side::Target);
        assert_eq!(default_winner(&live, &deep_tombstone), Side::Source);
    }

    #[test]
    fn test_deeper_generation_wins() {
        let root = doc(&[], false, &[("name", "Scott".into())]);
        let shallow = doc(&[rev_of(&root)], false, &[("name", "Scotty".into())]);
        let mid = doc(&[rev_of(&root)], false, &[("name", "Scott P".into())]);
        let deep = doc(&[rev_of(&mid)], false, &[("name", "Scott Pilgrim".into())]);

        assert_eq!(default_winner(&deep, &shallow), Side::Source);
        assert_eq!(default_winner(&shallow, &deep), Side::Target);
    }

    #[test]
    fn test_equal_generation_picks_same_body_from_either_side() {
        let root = doc(&[], false, &[("name", "Scott".into())]);
        let a = doc(&[rev_of(&root)], false, &[("name", "Scotty".into())]);
        let b = doc(&[rev_of(&root)], false, &[("name", "Scott Pilgrim".into())]);

        let pick = |winner: Side, source: &ReadOnlyDocument, target: &ReadOnlyDocument| match winner {
            Side::Source => source.body().clone(),
            Side::Target => target.body().clone(),
        };
        let one = pick(default_winner(&a, &b), &a, &b);
        let two = pick(default_winner(&b, &a), &b, &a);
        assert_eq!(one, two);
    }

    #[test]
    fn test_deeper_tombstone_wins_between_deletions() {
        let root = doc(&[], false, &[("name", "Scott".into())]);
        let shallow = doc(&[rev_of(&root)], true, &[]);
        let mid = doc(&[rev_of(&root)], false, &[("name", "Scotty".into())]);
        let deep = doc(&[rev_of(&mid)], true, &[]);

        assert_eq!(default_winner(&shallow, &deep), Side::Target);
        assert_eq!(default_winner(&deep, &shallow), Side::Source);
    }

    #[test]
    fn test_equal_generation_tombstones_pick_larger_digest() {
        let root = doc(&[], false, &[("name", "Scott".into())]);
        let left = doc(&[rev_of(&root)], false, &[("name", "Scotty".into())]);
        let right = doc(&[rev_of(&root)], false, &[("name", "Scott Pilgrim".into())]);
        let a = doc(&[rev_of(&left)], true, &[]);
        let b = doc(&[rev_of(&right)], true, &[]);
        assert_eq!(a.generation(), b.generation());

        let larger = if rev_of(&a).digest > rev_of(&b).digest { &a } else { &b };
        let pick = |winner: Side, source: &ReadOnlyDocument, target: &ReadOnlyDocument| match winner {
            Side::Source => rev_of(source),
            Side::Target => rev_of(target),
        };
        assert_eq!(pick(default_winner(&a, &b), &a, &b), rev_of(larger));
        assert_eq!(pick(default_winner(&b, &a), &b, &a), rev_of(larger));
        assert_eq!(default_winner(&a, &a), Side::Source);
    }

    #[test]
    fn test_merge_resolver_prefers_target_keys() {
        let ancestor = doc(&[], false, &[("type", "profile".into()), ("name", "Scott".into())]);
        let base = rev_of(&ancestor);
        let source = doc(
            &[base],
            false,
            &[("type", "bio".into()), ("name", "Scott".into()), ("age", 31.into())],
        );
        let target = doc(
            &[base],
            false,
            &[("type", "bio".into()), ("name", "Scott".into()), ("gender", "male".into())],
        );

        let conflict = Conflict::new(source, target, Some(ancestor));
        let merged = MergeResolver.resolve(&conflict).unwrap();

        assert_eq!(merged.get("type"), Some(&Value::from("bio")));
        assert_eq!(merged.get("gender"), Some(&Value::from("male")));
        assert_eq!(merged.get("age"), Some(&Value::from(31)));
        assert_eq!(merged.get("name"), Some(&Value::from("Scott")));
        assert!(!merged.exists());
    }

    #[test]
    fn test_resolver_kind_parsing() {
        assert_eq!("merge".parse::<ResolverKind>().unwrap(), ResolverKind::Merge);
        assert_eq!("theirs".parse::<ResolverKind>().unwrap(), ResolverKind::TargetWins);
        assert_eq!(ResolverKind::GiveUp.to_string(), "give-up");
        assert!("coin-flip".parse::<ResolverKind>().is_err());
        assert!(ResolverKind::Default.into_resolver().is_none());
    }

    #[test]
    fn test_closures_are_resolvers() {
        let root = doc(&[], false, &[("name", "Scott".into())]);
        let a = doc(&[rev_of(&root)], false, &[("name", "a".into())]);
        let b = doc(&[rev_of(&root)], false, &[("name", "b".into())]);
        let conflict = Conflict::new(a, b, Some(root));

        let resolver = |c: &Conflict| Some(c.source().clone());
        let resolved = resolver.resolve(&conflict).unwrap();
        assert_eq!(resolved.get("name"), Some(&Value::from("a")));
        assert!(GiveUp.resolve(&conflict).is_none());
    }
}
