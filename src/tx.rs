//! Transaction wrapper carrying the identity resolver, entry store, and
//! ancestor index operations
//!
//! One `Tx` per public mutation. Dropping it without `commit` aborts the
//! LMDB transaction, so error propagation via `?` doubles as rollback.

use heed::{Env, RwTxn};

use crate::acl::Ace;
use crate::constants::MAX_TREE_DEPTH;
use crate::db::{entry_key, key, oid_key, Dbs, EntryRow, OidRow, SidRow};
use crate::error::{AclError, Result};
use crate::identity::{ObjectIdentityRef, Principal};
use crate::read;

pub(crate) struct Tx<'a> {
    txn: RwTxn<'a>,
    dbs: &'a Dbs,
}

impl<'a> Tx<'a> {
    #[inline]
    pub fn new(env: &'a Env, dbs: &'a Dbs) -> Result<Self> {
        Ok(Tx {
            txn: env.write_txn()?,
            dbs,
        })
    }

    #[inline]
    pub fn commit(self) -> Result<()> {
        self.txn.commit().map_err(Into::into)
    }

    fn next_id(&mut self) -> Result<u64> {
        let id = self
            .dbs
            .meta
            .get(&self.txn, "next_id")?
            .and_then(|s| s.parse().ok())
            .unwrap_or(1u64);
        self.dbs.meta.put(&mut self.txn, "next_id", &(id + 1).to_string())?;
        Ok(id)
    }

    // ---- identity resolver ----

    /// Find-or-create the class row for a type name. Idempotent; concurrent
    /// first-time callers serialize on the store's single write transaction.
    pub fn class_for(&mut self, kind: &str) -> Result<u64> {
        if let Some(id) = self.dbs.class_ids.get(&self.txn, kind)? {
            return Ok(id);
        }
        let id = self.next_id()?;
        self.dbs.class_ids.put(&mut self.txn, kind, &id)?;
        Ok(id)
    }

    pub fn object_identity(&self, oid: &ObjectIdentityRef) -> Result<Option<OidRow>> {
        read::object_identity(self.dbs, &self.txn, oid)
    }

    /// Find-or-create the object identity row (no parent, no entries)
    pub fn object_identity_or_create(&mut self, oid: &ObjectIdentityRef) -> Result<OidRow> {
        if let Some(row) = self.object_identity(oid)? {
            return Ok(row);
        }
        let class_id = self.class_for(oid.kind())?;
        let id = self.next_id()?;
        let row = OidRow {
            id,
            class_id,
            object_identifier: oid.identifier().to_string(),
            parent_id: None,
        };
        self.dbs.oids.put(&mut self.txn, &id, &row)?;
        self.dbs
            .oid_keys
            .put(&mut self.txn, &oid_key(class_id, oid.identifier()), &id)?;
        self.dbs
            .oid_by_class
            .put(&mut self.txn, &key(class_id, id), &id)?;
        Ok(row)
    }

    /// Find-or-create the security identity row for a principal
    pub fn security_identity_for(&mut self, sid: &Principal) -> Result<u64> {
        let identifier = sid.identifier();
        if let Some(id) = self.dbs.sid_ids.get(&self.txn, &identifier)? {
            return Ok(id);
        }
        let id = self.next_id()?;
        let row = SidRow {
            id,
            identifier: identifier.clone(),
            is_user: sid.is_user(),
        };
        self.dbs.sids.put(&mut self.txn, &id, &row)?;
        self.dbs.sid_ids.put(&mut self.txn, &identifier, &id)?;
        Ok(id)
    }

    // ---- entry store ----

    pub fn entries_for(&self, oid: &ObjectIdentityRef) -> Result<Vec<EntryRow>> {
        read::entries_for(self.dbs, &self.txn, oid)
    }

    pub fn entry(&self, id: u64) -> Result<Option<EntryRow>> {
        read::entry(self.dbs, &self.txn, id)
    }

    /// Insert or rewrite an entry row, keeping the unique-key and class
    /// indexes in sync.
    pub fn save_entry(&mut self, row: &EntryRow) -> Result<()> {
        let new_key = entry_key(row.class_id, row.object_identity_id, row.sid_id, row.field.as_deref());
        if let Some(old) = self.entry(row.id)? {
            let old_key =
                entry_key(old.class_id, old.object_identity_id, old.sid_id, old.field.as_deref());
            if old_key != new_key {
                self.dbs.entry_keys.delete(&mut self.txn, &old_key)?;
            }
            if old.class_id != row.class_id {
                self.dbs
                    .entry_by_class
                    .delete(&mut self.txn, &key(old.class_id, old.id))?;
            }
        }
        self.dbs.entries.put(&mut self.txn, &row.id, row)?;
        self.dbs.entry_keys.put(&mut self.txn, &new_key, &row.id)?;
        self.dbs
            .entry_by_class
            .put(&mut self.txn, &key(row.class_id, row.id), &row.id)?;
        Ok(())
    }

    pub fn delete_entry(&mut self, row: &EntryRow) -> Result<()> {
        self.dbs.entries.delete(&mut self.txn, &row.id)?;
        // Only clear the unique-key slot if it still points at this row; a
        // reconciled replacement may own it by now.
        let k = entry_key(row.class_id, row.object_identity_id, row.sid_id, row.field.as_deref());
        if self.dbs.entry_keys.get(&self.txn, &k)? == Some(row.id) {
            self.dbs.entry_keys.delete(&mut self.txn, &k)?;
        }
        self.dbs
            .entry_by_class
            .delete(&mut self.txn, &key(row.class_id, row.id))?;
        Ok(())
    }

    // ---- ancestor index ----

    pub fn descendants_of(&self, oid_id: u64) -> Result<Vec<u64>> {
        read::descendants_of(self.dbs, &self.txn, oid_id)
    }

    pub fn count_oids_of_class(&self, class_id: u64) -> Result<usize> {
        read::count_oids_of_class(self.dbs, &self.txn, class_id)
    }

    /// Rewrite the parent link, keeping the children index in sync.
    /// The new parent must exist and must not create a cycle.
    pub fn set_parent(&mut self, row: &mut OidRow, parent_id: Option<u64>) -> Result<()> {
        if row.parent_id == parent_id {
            return Ok(());
        }
        if let Some(p) = parent_id {
            self.check_parent(row.id, p)?;
        }
        if let Some(old) = row.parent_id {
            self.dbs.children.delete(&mut self.txn, &key(old, row.id))?;
        }
        if let Some(p) = parent_id {
            self.dbs.children.put(&mut self.txn, &key(p, row.id), &row.id)?;
        }
        row.parent_id = parent_id;
        self.dbs.oids.put(&mut self.txn, &row.id, row)?;
        Ok(())
    }

    /// Reject missing parents, self-links, and cycles (bounded walk up)
    fn check_parent(&self, child: u64, parent: u64) -> Result<()> {
        if child == parent {
            return Err(AclError::InvalidArgument(
                "an ACL cannot be its own parent".into(),
            ));
        }
        let mut cur = parent;
        for _ in 0..MAX_TREE_DEPTH {
            let Some(row) = self.dbs.oids.get(&self.txn, &cur)? else {
                return Err(AclError::InvalidArgument(format!(
                    "parent object identity {} does not exist",
                    cur
                )));
            };
            match row.parent_id {
                Some(p) if p == child => {
                    return Err(AclError::InvalidArgument(
                        "circular ACL inheritance".into(),
                    ))
                }
                Some(p) => cur = p,
                None => return Ok(()),
            }
        }
        Err(AclError::InvalidArgument(
            "object identity tree too deep".into(),
        ))
    }

    /// Delete an object identity row: cascades to its object-scoped entries,
    /// detaches direct children, and clears its index slots. Descendant rows
    /// themselves survive; only their inherited (cached) state goes stale.
    pub fn delete_object_identity(&mut self, row: &OidRow) -> Result<()> {
        let cascade = {
            let mut rows = Vec::new();
            for item in self
                .dbs
                .entry_by_class
                .prefix_iter(&self.txn, &row.class_id.to_be_bytes())?
            {
                let (_, id) = item?;
                if let Some(e) = read::entry(self.dbs, &self.txn, id)? {
                    if e.object_identity_id == Some(row.id) {
                        rows.push(e);
                    }
                }
            }
            rows
        };
        for e in &cascade {
            self.delete_entry(e)?;
        }

        let child_ids = {
            let mut ids = Vec::new();
            for item in self.dbs.children.prefix_iter(&self.txn, &row.id.to_be_bytes())? {
                let (_, child) = item?;
                ids.push(child);
            }
            ids
        };
        for child in child_ids {
            if let Some(mut c) = self.dbs.oids.get(&self.txn, &child)? {
                c.parent_id = None;
                self.dbs.oids.put(&mut self.txn, &child, &c)?;
            }
            self.dbs.children.delete(&mut self.txn, &key(row.id, child))?;
        }
        if let Some(p) = row.parent_id {
            self.dbs.children.delete(&mut self.txn, &key(p, row.id))?;
        }

        self.dbs
            .oid_keys
            .delete(&mut self.txn, &oid_key(row.class_id, &row.object_identifier))?;
        self.dbs
            .oid_by_class
            .delete(&mut self.txn, &key(row.class_id, row.id))?;
        self.dbs.oids.delete(&mut self.txn, &row.id)?;
        Ok(())
    }

    // ---- reconciliation ----

    /// Reconcile one scope's in-memory entry list against the persisted rows.
    /// List position becomes the entry order, so order stays contiguous per
    /// scope. Surviving row ids are appended to `keep`.
    pub fn persist_scope(
        &mut self,
        aces: &[Ace],
        oid_row: &OidRow,
        field: Option<&str>,
        object_level: bool,
        keep: &mut Vec<u64>,
    ) -> Result<()> {
        for (order, ace) in aces.iter().enumerate() {
            let resolved = self.resolve_entry(ace, oid_row, field, object_level)?;
            let mut row = match resolved {
                // Two in-memory entries collapsing onto one persisted row: the
                // first claim wins, the later one becomes a fresh row so no
                // distinct entry is lost to a stale key match.
                Some(row) if !keep.contains(&row.id) => row,
                _ => self.fresh_entry(ace, oid_row, field, object_level)?,
            };
            row.order = order as u32;
            row.class_id = oid_row.class_id;
            row.mask = ace.mask;
            if let Some(b) = ace.audit_success {
                row.audit_success = Some(b);
            }
            if let Some(b) = ace.audit_failure {
                row.audit_failure = Some(b);
            }
            if object_level {
                row.object_identity_id = Some(oid_row.id);
            }
            self.save_entry(&row)?;
            keep.push(row.id);
        }
        Ok(())
    }

    /// Resolve the persisted row for an in-memory entry: by remembered id
    /// first, then by the unique key. The key lookup recovers rows written by
    /// an earlier update of an ACL that was never reloaded.
    fn resolve_entry(
        &self,
        ace: &Ace,
        oid_row: &OidRow,
        field: Option<&str>,
        object_level: bool,
    ) -> Result<Option<EntryRow>> {
        if let Some(id) = ace.id {
            if let Some(row) = self.entry(id)? {
                return Ok(Some(row));
            }
        }
        let Some(sid_id) = read::security_identity(self.dbs, &self.txn, &ace.sid)? else {
            // Principal never persisted, so no row to recover.
            return Ok(None);
        };
        let oid_id = object_level.then_some(oid_row.id);
        read::entry_by_unique_key(self.dbs, &self.txn, oid_row.class_id, oid_id, field, sid_id)
    }

    fn fresh_entry(
        &mut self,
        ace: &Ace,
        oid_row: &OidRow,
        field: Option<&str>,
        object_level: bool,
    ) -> Result<EntryRow> {
        let sid_id = self.security_identity_for(&ace.sid)?;
        Ok(EntryRow {
            id: self.next_id()?,
            class_id: oid_row.class_id,
            object_identity_id: object_level.then_some(oid_row.id),
            field: field.map(str::to_string),
            sid_id,
            mask: ace.mask,
            order: 0,
            granting: ace.granting,
            audit_success: None,
            audit_failure: None,
        })
    }
}
