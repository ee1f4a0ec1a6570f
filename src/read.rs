//! Read-side lookups, shared by snapshot reads and open write transactions

use heed::RoTxn;

use crate::db::{entry_key, oid_key, Dbs, EntryRow, OidRow};
use crate::error::{AclError, Result};
use crate::identity::{ObjectIdentityRef, Principal};

pub(crate) fn class_id(d: &Dbs, tx: &RoTxn, kind: &str) -> Result<Option<u64>> {
    Ok(d.class_ids.get(tx, kind)?)
}

/// Resolve a persisted object identity row by (class, object identifier)
pub(crate) fn object_identity(
    d: &Dbs,
    tx: &RoTxn,
    oid: &ObjectIdentityRef,
) -> Result<Option<OidRow>> {
    let Some(class) = class_id(d, tx, oid.kind())? else {
        return Ok(None);
    };
    let Some(id) = d.oid_keys.get(tx, &oid_key(class, oid.identifier()))? else {
        return Ok(None);
    };
    Ok(d.oids.get(tx, &id)?)
}

/// Resolve an already-persisted security identity, without creating one
pub(crate) fn security_identity(d: &Dbs, tx: &RoTxn, sid: &Principal) -> Result<Option<u64>> {
    Ok(d.sid_ids.get(tx, &sid.identifier())?)
}

/// Rehydrate the principal stored under a security identity id
pub(crate) fn principal_of(d: &Dbs, tx: &RoTxn, sid_id: u64) -> Result<Principal> {
    let row = d.sids.get(tx, &sid_id)?.ok_or_else(|| {
        AclError::InvalidArgument(format!("unknown security identity id {}", sid_id))
    })?;
    Principal::parse(&row.identifier, row.is_user)
}

pub(crate) fn entry(d: &Dbs, tx: &RoTxn, id: u64) -> Result<Option<EntryRow>> {
    Ok(d.entries.get(tx, &id)?)
}

/// Point lookup by the uniqueness tuple (class, oid-or-null, field-or-null, sid)
pub(crate) fn entry_by_unique_key(
    d: &Dbs,
    tx: &RoTxn,
    class_id: u64,
    oid_id: Option<u64>,
    field: Option<&str>,
    sid_id: u64,
) -> Result<Option<EntryRow>> {
    match d.entry_keys.get(tx, &entry_key(class_id, oid_id, sid_id, field))? {
        Some(id) => entry(d, tx, id),
        None => Ok(None),
    }
}

/// All entries scoped to the identity: the class-scope rows of its type plus
/// the rows bound to the identity itself, ordered by entry order.
///
/// Class-scope rows are returned even when no identity row exists yet; a
/// sibling object's ACL may have created them.
pub(crate) fn entries_for(d: &Dbs, tx: &RoTxn, oid: &ObjectIdentityRef) -> Result<Vec<EntryRow>> {
    let Some(class) = class_id(d, tx, oid.kind())? else {
        return Ok(Vec::new());
    };
    let oid_id = d.oid_keys.get(tx, &oid_key(class, oid.identifier()))?;
    let mut out = Vec::new();
    for item in d.entry_by_class.prefix_iter(tx, &class.to_be_bytes())? {
        let (_, id) = item?;
        if let Some(e) = entry(d, tx, id)? {
            if e.object_identity_id.is_none() || e.object_identity_id == oid_id {
                out.push(e);
            }
        }
    }
    out.sort_by_key(|e| e.order);
    Ok(out)
}

/// Transitive closure of children, excluding the node itself
pub(crate) fn descendants_of(d: &Dbs, tx: &RoTxn, oid_id: u64) -> Result<Vec<u64>> {
    let mut out = Vec::new();
    let mut stack = vec![oid_id];
    while let Some(id) = stack.pop() {
        for item in d.children.prefix_iter(tx, &id.to_be_bytes())? {
            let (_, child) = item?;
            out.push(child);
            stack.push(child);
        }
    }
    Ok(out)
}

/// How many object identities still reference the class
pub(crate) fn count_oids_of_class(d: &Dbs, tx: &RoTxn, class_id: u64) -> Result<usize> {
    Ok(d.oid_by_class.prefix_iter(tx, &class_id.to_be_bytes())?.count())
}
