//! Entry reconciliation tests: diffing in-memory entry lists against
//! persisted rows on update

use aclstore::{Ace, AclProvider, AclStore, ObjectIdentityRef, Principal};
use tempfile::TempDir;

fn provider() -> (TempDir, AclProvider) {
    let dir = TempDir::new().unwrap();
    let provider = AclProvider::new(AclStore::open(dir.path()).unwrap());
    (dir, provider)
}

fn oid(kind: &str, id: &str) -> ObjectIdentityRef {
    ObjectIdentityRef::new(kind, id)
}

#[test]
fn update_keeps_only_named_entries() {
    // Persisted [A(order 0), B(order 1)], updated with [B, C]:
    // B is reused and reordered to 0, C is new, A is deleted.
    let (_dir, p) = provider();
    let target = oid("report", "r1");
    let mut acl = p.create_acl(&target).unwrap();
    acl.insert_object_ace(0, Ace::granting(Principal::role("ROLE_A"), 1));
    acl.insert_object_ace(1, Ace::granting(Principal::role("ROLE_B"), 2));
    p.update_acl(&acl).unwrap();

    let mut acl = p.find_acl(&target).unwrap();
    let b = acl.object_aces.remove(1);
    let b_id = b.id();
    assert!(b_id.is_some());
    acl.object_aces = vec![b];
    acl.insert_object_ace(1, Ace::granting(Principal::role("ROLE_C"), 4));
    p.update_acl(&acl).unwrap();

    let loaded = p.find_acl(&target).unwrap();
    assert_eq!(loaded.object_aces.len(), 2);
    assert_eq!(loaded.object_aces[0].sid, Principal::role("ROLE_B"));
    assert_eq!(loaded.object_aces[0].id(), b_id);
    assert_eq!(loaded.object_aces[1].sid, Principal::role("ROLE_C"));
}

#[test]
fn empty_scope_clears_entries() {
    let (_dir, p) = provider();
    let target = oid("report", "r1");
    let mut acl = p.create_acl(&target).unwrap();
    acl.insert_class_ace(0, Ace::granting(Principal::role("ROLE_EDITOR"), 3));
    acl.insert_object_ace(0, Ace::granting(Principal::role("ROLE_A"), 1));
    acl.insert_object_ace(1, Ace::granting(Principal::role("ROLE_B"), 2));
    p.update_acl(&acl).unwrap();

    let mut acl = p.find_acl(&target).unwrap();
    acl.object_aces.clear();
    p.update_acl(&acl).unwrap();

    let loaded = p.find_acl(&target).unwrap();
    assert!(loaded.object_aces.is_empty());
    assert_eq!(loaded.class_aces.len(), 1);
}

#[test]
fn unique_key_recovery_avoids_duplicates() {
    let (_dir, p) = provider();
    let target = oid("report", "r1");
    let mut acl = p.create_acl(&target).unwrap();
    acl.insert_object_ace(0, Ace::granting(Principal::role("ROLE_A"), 1));
    p.update_acl(&acl).unwrap();

    // The same in-memory ACL saved again without a reload: its entry still
    // has no persisted id, but the unique key recovers the stored row
    // instead of creating a duplicate.
    acl.object_aces[0].mask = 3;
    p.update_acl(&acl).unwrap();

    let loaded = p.find_acl(&target).unwrap();
    assert_eq!(loaded.object_aces.len(), 1);
    assert_eq!(loaded.object_aces[0].mask, 3);
}

#[test]
fn duplicate_key_entries_both_survive() {
    // Two in-memory entries for the same principal in one scope: the second
    // cannot claim the row the first already did, so it becomes a fresh one
    // rather than silently collapsing.
    let (_dir, p) = provider();
    let target = oid("report", "r1");
    let mut acl = p.create_acl(&target).unwrap();
    acl.insert_object_ace(0, Ace::granting(Principal::role("ROLE_A"), 1));
    p.update_acl(&acl).unwrap();

    let mut acl = p.find_acl(&target).unwrap();
    acl.insert_object_ace(1, Ace::denying(Principal::role("ROLE_A"), 2));
    p.update_acl(&acl).unwrap();

    let loaded = p.find_acl(&target).unwrap();
    assert_eq!(loaded.object_aces.len(), 2);
    assert_eq!(loaded.object_aces[0].mask, 1);
    assert!(loaded.object_aces[0].granting);
    assert_eq!(loaded.object_aces[1].mask, 2);
    assert!(!loaded.object_aces[1].granting);
}

#[test]
fn audit_flags_preserved_when_unset() {
    let (_dir, p) = provider();
    let target = oid("report", "r1");
    let mut acl = p.create_acl(&target).unwrap();
    acl.insert_object_ace(
        0,
        Ace::granting(Principal::role("ROLE_A"), 1).with_audit(Some(true), None),
    );
    p.update_acl(&acl).unwrap();

    // A fresh in-memory entry with no opinion on auditing reuses the row
    // without blanking the stored flag.
    let mut acl = p.find_acl(&target).unwrap();
    acl.object_aces = vec![Ace::granting(Principal::role("ROLE_A"), 5)];
    p.update_acl(&acl).unwrap();

    let loaded = p.find_acl(&target).unwrap();
    assert_eq!(loaded.object_aces.len(), 1);
    assert_eq!(loaded.object_aces[0].mask, 5);
    assert_eq!(loaded.object_aces[0].audit_success, Some(true));
    assert_eq!(loaded.object_aces[0].audit_failure, None);
}

#[test]
fn audit_flags_can_be_set_explicitly_false() {
    let (_dir, p) = provider();
    let target = oid("report", "r1");
    let mut acl = p.create_acl(&target).unwrap();
    acl.insert_object_ace(
        0,
        Ace::granting(Principal::role("ROLE_A"), 1).with_audit(Some(true), Some(true)),
    );
    p.update_acl(&acl).unwrap();

    let mut acl = p.find_acl(&target).unwrap();
    acl.object_aces[0].audit_success = Some(false);
    p.update_acl(&acl).unwrap();

    let loaded = p.find_acl(&target).unwrap();
    assert_eq!(loaded.object_aces[0].audit_success, Some(false));
    assert_eq!(loaded.object_aces[0].audit_failure, Some(true));
}

#[test]
fn removing_middle_entry_keeps_relative_order() {
    let (_dir, p) = provider();
    let target = oid("report", "r1");
    let mut acl = p.create_acl(&target).unwrap();
    for (i, role) in ["ROLE_A", "ROLE_B", "ROLE_C"].iter().enumerate() {
        acl.insert_object_ace(i, Ace::granting(Principal::role(*role), 1 << i));
    }
    p.update_acl(&acl).unwrap();

    let mut acl = p.find_acl(&target).unwrap();
    acl.object_aces.remove(1);
    p.update_acl(&acl).unwrap();

    let loaded = p.find_acl(&target).unwrap();
    let sids: Vec<_> = loaded.object_aces.iter().map(|a| a.sid.clone()).collect();
    assert_eq!(
        sids,
        vec![Principal::role("ROLE_A"), Principal::role("ROLE_C")]
    );
}

#[test]
fn field_scopes_reconcile_independently() {
    let (_dir, p) = provider();
    let target = oid("report", "r1");
    let mut acl = p.create_acl(&target).unwrap();
    acl.insert_object_field_ace("title", 0, Ace::granting(Principal::role("ROLE_A"), 1));
    acl.insert_object_field_ace("body", 0, Ace::granting(Principal::role("ROLE_A"), 2));
    acl.insert_class_field_ace("title", 0, Ace::granting(Principal::role("ROLE_B"), 4));
    p.update_acl(&acl).unwrap();

    // A field group dropped from the in-memory ACL loses its persisted rows;
    // the other groups are untouched.
    let mut acl = p.find_acl(&target).unwrap();
    acl.object_field_aces.remove("body");
    p.update_acl(&acl).unwrap();

    let loaded = p.find_acl(&target).unwrap();
    assert!(!loaded.object_field_aces.contains_key("body"));
    assert_eq!(loaded.object_field_aces["title"].len(), 1);
    assert_eq!(loaded.object_field_aces["title"][0].mask, 1);
    assert_eq!(loaded.class_field_aces["title"].len(), 1);
    assert_eq!(loaded.class_field_aces["title"][0].mask, 4);
}

#[test]
fn empty_field_name_scope_stays_distinct_from_object_scope() {
    // An entry for the field "" must not share its uniqueness slot with the
    // whole-object entry of the same principal; recovery by key would
    // otherwise cross-match the two.
    let (_dir, p) = provider();
    let target = oid("report", "r1");
    let sid = Principal::role("ROLE_A");
    let mut acl = p.create_acl(&target).unwrap();
    acl.insert_object_ace(0, Ace::granting(sid.clone(), 1));
    acl.insert_object_field_ace("", 0, Ace::granting(sid.clone(), 2));
    p.update_acl(&acl).unwrap();

    // Save again without a reload: both entries recover their own rows.
    p.update_acl(&acl).unwrap();

    let loaded = p.find_acl(&target).unwrap();
    assert_eq!(loaded.object_aces.len(), 1);
    assert_eq!(loaded.object_aces[0].mask, 1);
    assert_eq!(loaded.object_field_aces[""].len(), 1);
    assert_eq!(loaded.object_field_aces[""][0].mask, 2);
}

#[test]
fn same_principal_across_scopes_stays_distinct() {
    // One principal may hold a class-scope, object-scope, and field-scope
    // entry at once; the uniqueness tuple keeps them apart.
    let (_dir, p) = provider();
    let target = oid("report", "r1");
    let sid = Principal::user("app::User", "alice");
    let mut acl = p.create_acl(&target).unwrap();
    acl.insert_class_ace(0, Ace::granting(sid.clone(), 1));
    acl.insert_object_ace(0, Ace::granting(sid.clone(), 2));
    acl.insert_object_field_ace("title", 0, Ace::granting(sid.clone(), 4));
    p.update_acl(&acl).unwrap();

    let loaded = p.find_acl(&target).unwrap();
    assert_eq!(loaded.class_aces.len(), 1);
    assert_eq!(loaded.class_aces[0].mask, 1);
    assert_eq!(loaded.object_aces.len(), 1);
    assert_eq!(loaded.object_aces[0].mask, 2);
    assert_eq!(loaded.object_field_aces["title"][0].mask, 4);
}
