//! In-memory mutable ACL aggregate
//!
//! A `MutableAcl` is a plain value: four ordered entry lists plus inheritance
//! metadata. It owns its entries for the duration of a mutation; the persisted
//! rows are the source of truth between mutations. Parent linkage is by
//! persisted id, never by live object reference, so no in-memory parent/child
//! graph is built; the store's children index is the authority on tree shape.

use std::collections::BTreeMap;

use crate::identity::{ObjectIdentityRef, Principal};

/// One access control entry: a permission mask granted or denied to a
/// principal. Audit flags default to "absent", which is distinct from
/// "explicitly false": an entry with no opinion on auditing never blanks
/// out a previously stored flag.
#[derive(Debug, Clone)]
pub struct Ace {
    pub(crate) id: Option<u64>,
    pub sid: Principal,
    pub mask: u64,
    pub granting: bool,
    pub audit_success: Option<bool>,
    pub audit_failure: Option<bool>,
}

impl Ace {
    /// A granting entry for the given principal and mask
    pub fn granting(sid: Principal, mask: u64) -> Self {
        Ace {
            id: None,
            sid,
            mask,
            granting: true,
            audit_success: None,
            audit_failure: None,
        }
    }

    /// A denying entry for the given principal and mask
    pub fn denying(sid: Principal, mask: u64) -> Self {
        Ace {
            granting: false,
            ..Ace::granting(sid, mask)
        }
    }

    pub fn with_audit(mut self, success: Option<bool>, failure: Option<bool>) -> Self {
        self.audit_success = success;
        self.audit_failure = failure;
        self
    }

    /// Persisted row id, if this entry has been stored and loaded
    pub fn id(&self) -> Option<u64> {
        self.id
    }
}

/// The ordered collection of ACEs plus inheritance metadata for one
/// protected object.
///
/// Only the engine constructs tracked instances (via `create_acl` or
/// `find_acl`); `update_acl` verifies the tracking id against the persisted
/// row and rejects anything else.
#[derive(Debug, Clone)]
pub struct MutableAcl {
    pub(crate) id: u64,
    object_identity: ObjectIdentityRef,
    /// Persisted id of the parent ACL's object identity, if inheriting
    pub parent_id: Option<u64>,
    /// Whether permission checks fall through to the parent ACL
    pub entries_inheriting: bool,
    pub class_aces: Vec<Ace>,
    pub object_aces: Vec<Ace>,
    pub class_field_aces: BTreeMap<String, Vec<Ace>>,
    pub object_field_aces: BTreeMap<String, Vec<Ace>>,
}

impl MutableAcl {
    pub(crate) fn new(id: u64, object_identity: ObjectIdentityRef) -> Self {
        MutableAcl {
            id,
            object_identity,
            parent_id: None,
            entries_inheriting: false,
            class_aces: Vec::new(),
            object_aces: Vec::new(),
            class_field_aces: BTreeMap::new(),
            object_field_aces: BTreeMap::new(),
        }
    }

    /// Persisted id of this ACL's object identity row
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn object_identity(&self) -> &ObjectIdentityRef {
        &self.object_identity
    }

    /// Insert a class-scope entry at `index` (clamped to the list end)
    pub fn insert_class_ace(&mut self, index: usize, ace: Ace) {
        insert_clamped(&mut self.class_aces, index, ace);
    }

    /// Insert an object-scope entry at `index` (clamped to the list end)
    pub fn insert_object_ace(&mut self, index: usize, ace: Ace) {
        insert_clamped(&mut self.object_aces, index, ace);
    }

    /// Insert a class-field entry at `index` within the field's list
    pub fn insert_class_field_ace(&mut self, field: impl Into<String>, index: usize, ace: Ace) {
        insert_clamped(self.class_field_aces.entry(field.into()).or_default(), index, ace);
    }

    /// Insert an object-field entry at `index` within the field's list
    pub fn insert_object_field_ace(&mut self, field: impl Into<String>, index: usize, ace: Ace) {
        insert_clamped(self.object_field_aces.entry(field.into()).or_default(), index, ace);
    }
}

fn insert_clamped(list: &mut Vec<Ace>, index: usize, ace: Ace) {
    let i = index.min(list.len());
    list.insert(i, ace);
}
