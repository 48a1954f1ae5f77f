//! Save/delete pipeline: detect, resolve, commit
//!
//! Every write runs inside one storage transaction for its document:
//!
//! ```text
//! ReadCurrent -> NoConflict -> CommitDirect
//!             -> Conflict   -> Resolve -> Resolved -> CommitMerge
//!                                      -> GaveUp   -> Fail
//! ```
//!
//! The resolver is invoked while that transaction is held, so a slow
//! resolver stalls every other writer of the same document. Resolution
//! always finishes before anything is written; a failed or abandoned
//! resolution leaves storage untouched.

use crate::conflict::{detect, Conflict, Detection};
use crate::document::{DocumentId, MutableDocument, ReadOnlyDocument};
use crate::error::{ConflictReason, Error, Result};
use crate::resolver::{default_winner, ConflictResolver, Side};
use crate::revision::{RevisionId, RevisionRef};
use crate::store::{MergedBranch, PutRequest, RevisionStore, StorageError, StoreTransaction};
use crate::value::Body;
use parking_lot::RwLock;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Database configuration
#[derive(Debug, Clone, Default)]
pub struct DatabaseConfig {
    /// Upper bound on resolver run time. Resolvers cannot be interrupted;
    /// a resolution that overruns is discarded and the write fails.
    pub resolver_timeout: Option<Duration>,
}

impl DatabaseConfig {
    pub fn with_resolver_timeout(mut self, timeout: Duration) -> Self {
        self.resolver_timeout = Some(timeout);
        self
    }
}

/// A document database over a revision store
pub struct Database<S> {
    store: S,
    resolver: RwLock<Option<Arc<dyn ConflictResolver>>>,
    config: DatabaseConfig,
}

/// What the pipeline decided to write
enum Plan {
    Direct(PutRequest),
    Merge(PutRequest),
    /// An identical revision is already current
    Existing(ReadOnlyDocument),
}

impl<S: RevisionStore> Database<S> {
    /// Create a database with no resolver installed
    pub fn new(store: S) -> Self {
        Self::with_config(store, DatabaseConfig::default())
    }

    pub fn with_config(store: S, config: DatabaseConfig) -> Self {
        Self {
            store,
            resolver: RwLock::new(None),
            config,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    /// Install or replace the database's resolver
    pub fn set_resolver(&self, resolver: Arc<dyn ConflictResolver>) {
        *self.resolver.write() = Some(resolver);
    }

    /// Remove the resolver; conflicts fall back to the default policy
    pub fn clear_resolver(&self) {
        *self.resolver.write() = None;
    }

    pub fn resolver(&self) -> Option<Arc<dyn ConflictResolver>> {
        self.resolver.read().clone()
    }

    /// Current revision of a document
    pub fn get(&self, id: &DocumentId) -> Result<ReadOnlyDocument> {
        self.store
            .in_transaction(id, |txn| txn.current_revision())
            .map_err(|e| match e {
                Error::Storage(StorageError::NotFound(id)) => Error::DocumentNotFound(id),
                other => other,
            })
    }

    /// A specific revision of a document
    pub fn get_revision(&self, id: &DocumentId, revision: &RevisionId) -> Result<ReadOnlyDocument> {
        self.store.in_transaction(id, |txn| {
            txn.revision(revision)?.ok_or_else(|| Error::RevisionNotFound {
                doc_id: id.to_string(),
                revision: *revision,
            })
        })
    }

    /// History of the current revision, newest first
    pub fn history(&self, id: &DocumentId) -> Result<Vec<RevisionRef>> {
        let history = self.store.in_transaction(id, |txn| txn.history())?;
        if history.is_empty() {
            return Err(Error::DocumentNotFound(id.to_string()));
        }
        Ok(history)
    }

    /// Save a document using the installed resolver
    pub fn save(&self, doc: &MutableDocument) -> Result<ReadOnlyDocument> {
        let resolver = self.resolver();
        self.save_with_resolver(doc, resolver.as_deref())
    }

    /// Save a document, resolving conflicts with `resolver` (or the default
    /// policy when `None`)
    pub fn save_with_resolver(
        &self,
        doc: &MutableDocument,
        resolver: Option<&dyn ConflictResolver>,
    ) -> Result<ReadOnlyDocument> {
        self.write(doc.id(), doc.base_revision(), doc.body().clone(), false, resolver)
    }

    /// Delete a document using the installed resolver
    pub fn delete(&self, id: &DocumentId, base: Option<&RevisionRef>) -> Result<ReadOnlyDocument> {
        let resolver = self.resolver();
        self.delete_with_resolver(id, base, resolver.as_deref())
    }

    /// Delete a document; a conflict is resolved like a save of a tombstone
    pub fn delete_with_resolver(
        &self,
        id: &DocumentId,
        base: Option<&RevisionRef>,
        resolver: Option<&dyn ConflictResolver>,
    ) -> Result<ReadOnlyDocument> {
        self.write(id, base, Body::new(), true, resolver)
    }

    fn write(
        &self,
        id: &DocumentId,
        base: Option<&RevisionRef>,
        body: Body,
        deleted: bool,
        resolver: Option<&dyn ConflictResolver>,
    ) -> Result<ReadOnlyDocument> {
        self.store.in_transaction(id, |txn| {
            let mut retried = false;
            loop {
                let plan = self.plan(txn, base, &body, deleted, resolver)?;
                let (request, merge) = match plan {
                    Plan::Direct(request) => (request, false),
                    Plan::Merge(request) => (request, true),
                    Plan::Existing(doc) => return Ok(doc),
                };
                let committed_body = request.body.clone();

                match txn.put_revision(request) {
                    Ok(revision) => {
                        if merge {
                            info!(doc = %id, rev = %revision, deleted = revision.deleted, "Committed merge revision");
                        } else {
                            debug!(doc = %id, rev = %revision, "Committed revision");
                        }
                        return Ok(ReadOnlyDocument::stored(id.clone(), revision, committed_body));
                    }
                    Err(Error::Storage(StorageError::StaleWrite { .. })) if !retried => {
                        warn!(doc = %id, "Stale write, re-reading current revision");
                        retried = true;
                    }
                    Err(Error::Storage(StorageError::StaleWrite { .. })) => {
                        return Err(Error::Conflict {
                            doc_id: id.to_string(),
                            reason: ConflictReason::StaleHistory,
                        });
                    }
                    Err(e) => return Err(e),
                }
            }
        })
    }

    /// Read the current revision and decide what to write
    fn plan(
        &self,
        txn: &dyn StoreTransaction,
        base: Option<&RevisionRef>,
        body: &Body,
        deleted: bool,
        resolver: Option<&dyn ConflictResolver>,
    ) -> Result<Plan> {
        let id = txn.doc_id().clone();
        let current = match txn.current_revision() {
            Ok(doc) => Some(doc),
            Err(e) if e.is_not_found() => None,
            Err(e) => return Err(e),
        };
        let current_rev = current.as_ref().and_then(|doc| doc.revision().copied());

        match detect(base, current_rev.as_ref()) {
            Detection::NoConflict => {
                if deleted && current.as_ref().map_or(true, ReadOnlyDocument::is_deleted) {
                    return Err(Error::DocumentNotFound(id.to_string()));
                }
                debug!(doc = %id, base = ?base.map(ToString::to_string), "No conflict");
                Ok(Plan::Direct(PutRequest {
                    body: body.clone(),
                    deleted,
                    history: current_rev.into_iter().collect(),
                    merged: None,
                }))
            }
            Detection::Conflict => {
                let target = current.ok_or_else(|| Error::DocumentNotFound(id.to_string()))?;
                let target_rev = *target
                    .revision()
                    .ok_or_else(|| Error::DocumentNotFound(id.to_string()))?;

                let parents: Vec<RevisionRef> = base.copied().into_iter().collect();
                let source_rev = RevisionRef::derive(&parents, deleted, body)?;
                if source_rev.same_revision(&target_rev) {
                    debug!(doc = %id, rev = %target_rev, "Identical revision already current");
                    return Ok(Plan::Existing(target));
                }
                let source = ReadOnlyDocument::stored(id.clone(), source_rev, body.clone());
                let ancestor = match base {
                    Some(base) => txn.common_ancestor(base, &target_rev)?,
                    None => None,
                };

                debug!(
                    doc = %id,
                    source = %source_rev,
                    target = %target_rev,
                    ancestor = ?ancestor.as_ref().and_then(|a| a.revision()).map(ToString::to_string),
                    "Conflict detected"
                );

                let conflict = Conflict::new(source, target, ancestor);
                let resolved = self.resolve(&conflict, resolver)?;

                Ok(Plan::Merge(PutRequest {
                    deleted: resolved.is_deleted(),
                    body: resolved.into_body(),
                    history: vec![target_rev],
                    merged: Some(MergedBranch {
                        parent: base.copied(),
                        revision: source_rev,
                        body: body.clone(),
                    }),
                }))
            }
        }
    }

    /// Obtain the winning document for a conflict
    fn resolve(
        &self,
        conflict: &Conflict,
        resolver: Option<&dyn ConflictResolver>,
    ) -> Result<ReadOnlyDocument> {
        let doc_id = conflict.doc_id().to_string();

        let resolver = match resolver {
            Some(resolver) if !conflict.is_deletion_against_live() => resolver,
            _ => {
                let winner = match default_winner(conflict.source(), conflict.target()) {
                    Side::Source => conflict.source(),
                    Side::Target => conflict.target(),
                };
                debug!(doc = %doc_id, deleted = winner.is_deleted(), "Resolved by default policy");
                return Ok(winner.clone());
            }
        };

        let started = Instant::now();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| resolver.resolve(conflict)));
        let elapsed = started.elapsed();

        let resolved = match outcome {
            Ok(resolved) => resolved,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                warn!(doc = %doc_id, error = %message, "Conflict resolver failed");
                return Err(Error::ResolverFault { doc_id, message });
            }
        };

        if let Some(limit) = self.config.resolver_timeout {
            if elapsed > limit {
                warn!(doc = %doc_id, ?elapsed, ?limit, "Conflict resolver exceeded its time limit");
                return Err(Error::ResolverTimeout {
                    doc_id,
                    elapsed,
                    limit,
                });
            }
        }

        match resolved {
            Some(doc) if doc.id() == conflict.doc_id() => Ok(doc),
            Some(doc) => Err(Error::ResolverFault {
                message: format!("resolver returned document {}", doc.id()),
                doc_id,
            }),
            None => {
                debug!(doc = %doc_id, "Conflict resolver gave up");
                Err(Error::Conflict {
                    doc_id,
                    reason: ConflictReason::ResolverGaveUp,
                })
            }
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "resolver panicked".to_string()
    }
}
