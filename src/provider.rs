//! The ACL mutation engine: create, load, update, delete
//!
//! Each public operation runs in exactly one store transaction and either
//! fully applies or fully rolls back. Cache synchronization happens only
//! after a successful commit, so the cache never reflects aborted work.

use log::{debug, warn};

use crate::acl::{Ace, MutableAcl};
use crate::cache::AclCache;
use crate::db::AclStore;
use crate::error::{AclError, Result};
use crate::identity::ObjectIdentityRef;
use crate::read;

/// Mutation engine over one [`AclStore`], with an optional cache gateway.
pub struct AclProvider {
    store: AclStore,
    cache: Option<Box<dyn AclCache>>,
}

impl AclProvider {
    pub fn new(store: AclStore) -> Self {
        AclProvider { store, cache: None }
    }

    pub fn with_cache(store: AclStore, cache: Box<dyn AclCache>) -> Self {
        AclProvider {
            store,
            cache: Some(cache),
        }
    }

    /// Create a fresh, empty ACL for an object identity that has none yet.
    ///
    /// Fails with [`AclError::AlreadyExists`] if any entry is already scoped
    /// to the identity (including class-scope entries created through a
    /// sibling object of the same type).
    pub fn create_acl(&self, oid: &ObjectIdentityRef) -> Result<MutableAcl> {
        let id = self.store.write(|tx| {
            if !tx.entries_for(oid)?.is_empty() {
                return Err(AclError::AlreadyExists(oid.clone()));
            }
            // Safe even though no ACL exists yet: an identity row with zero
            // entries and no parent is invisible to every other operation.
            Ok(tx.object_identity_or_create(oid)?.id)
        })?;
        debug!("created ACL {} for {}", id, oid);
        Ok(MutableAcl::new(id, oid.clone()))
    }

    /// Load an ACL for mutation.
    ///
    /// Entry ids are filled in so a later [`update_acl`](Self::update_acl)
    /// can reconcile against the persisted rows. Fails with
    /// [`AclError::NotFound`] when no object identity row exists.
    pub fn find_acl(&self, oid: &ObjectIdentityRef) -> Result<MutableAcl> {
        self.store.read(|dbs, rtx| {
            let row = read::object_identity(dbs, rtx, oid)?
                .ok_or_else(|| AclError::NotFound(oid.clone()))?;
            let mut acl = MutableAcl::new(row.id, oid.clone());
            acl.parent_id = row.parent_id;
            acl.entries_inheriting = row.parent_id.is_some();
            for e in read::entries_for(dbs, rtx, oid)? {
                let ace = Ace {
                    id: Some(e.id),
                    sid: read::principal_of(dbs, rtx, e.sid_id)?,
                    mask: e.mask,
                    granting: e.granting,
                    audit_success: e.audit_success,
                    audit_failure: e.audit_failure,
                };
                match (e.object_identity_id, e.field) {
                    (None, None) => acl.class_aces.push(ace),
                    (None, Some(f)) => acl.class_field_aces.entry(f).or_default().push(ace),
                    (Some(_), None) => acl.object_aces.push(ace),
                    (Some(_), Some(f)) => acl.object_field_aces.entry(f).or_default().push(ace),
                }
            }
            Ok(acl)
        })
    }

    /// Persist the in-memory state of a tracked ACL.
    ///
    /// Reconciles every scope against the persisted rows, deletes rows no
    /// longer named by the ACL, rewrites the parent link, commits, then
    /// refreshes the cache. An ACL not produced by this engine (or whose
    /// identity row has been deleted or replaced since) is rejected with
    /// [`AclError::InvalidArgument`].
    pub fn update_acl(&self, acl: &MutableAcl) -> Result<()> {
        let oid_id = self.store.write(|tx| {
            let mut row = tx
                .object_identity(acl.object_identity())?
                .filter(|r| r.id == acl.id())
                .ok_or_else(|| {
                    AclError::InvalidArgument(
                        "the given ACL is not tracked by this provider".into(),
                    )
                })?;

            let persisted = tx.entries_for(acl.object_identity())?;

            let mut keep = Vec::new();
            tx.persist_scope(&acl.class_aces, &row, None, false, &mut keep)?;
            tx.persist_scope(&acl.object_aces, &row, None, true, &mut keep)?;
            for (field, aces) in &acl.class_field_aces {
                tx.persist_scope(aces, &row, Some(field), false, &mut keep)?;
            }
            for (field, aces) in &acl.object_field_aces {
                tx.persist_scope(aces, &row, Some(field), true, &mut keep)?;
            }

            for e in &persisted {
                if !keep.contains(&e.id) {
                    // Reconciliation may have rewritten the row; delete what
                    // is stored now, not the pre-update snapshot.
                    if let Some(current) = tx.entry(e.id)? {
                        tx.delete_entry(&current)?;
                    }
                }
            }

            tx.set_parent(&mut row, acl.parent_id)?;
            Ok(row.id)
        })?;
        debug!("updated ACL {} for {}", oid_id, acl.object_identity());

        if let Some(cache) = &self.cache {
            if let Err(e) = cache.evict_from_cache_by_id(oid_id) {
                warn!("cache eviction failed after update of ACL {}: {}", oid_id, e);
            }
            if let Err(e) = cache.put_in_cache(acl) {
                warn!("cache population failed after update of ACL {}: {}", oid_id, e);
            }
        }
        Ok(())
    }

    /// Delete the ACL for an object identity.
    ///
    /// Idempotent: deleting a missing ACL succeeds. Deleting the last object
    /// of a class also cleans up the class-scope entries that would otherwise
    /// be orphaned. Descendant identities keep their rows but are evicted
    /// from the cache, since their inherited permission sets are now stale.
    pub fn delete_acl(&self, oid: &ObjectIdentityRef) -> Result<()> {
        let caching = self.cache.is_some();
        let outcome = self.store.write(|tx| {
            let Some(row) = tx.object_identity(oid)? else {
                // No identity row, no ACL: already deleted.
                return Ok(None);
            };
            let entries = tx.entries_for(oid)?;
            if !entries.is_empty() && tx.count_oids_of_class(row.class_id)? == 1 {
                // Last object of its class: clean up the class-scope entries
                // too. This is a policy, not an invariant; see DESIGN.md for
                // the race window.
                for e in entries.iter().filter(|e| e.object_identity_id.is_none()) {
                    tx.delete_entry(e)?;
                }
            }
            // The tree below this node is unreachable once the row is gone;
            // capture the stale set first.
            let descendants = if caching {
                tx.descendants_of(row.id)?
            } else {
                Vec::new()
            };
            tx.delete_object_identity(&row)?;
            Ok(Some((row.id, descendants)))
        })?;

        let Some((id, descendants)) = outcome else {
            return Ok(());
        };
        debug!("deleted ACL {} for {}", id, oid);
        if let Some(cache) = &self.cache {
            for stale in std::iter::once(id).chain(descendants) {
                if let Err(e) = cache.evict_from_cache_by_id(stale) {
                    warn!("cache eviction failed after delete of ACL {}: {}", id, e);
                }
            }
        }
        Ok(())
    }
}
