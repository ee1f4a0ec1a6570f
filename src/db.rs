//! Persisted row types, database handles, and store plumbing

use std::path::Path;

use heed::types::{Bytes, SerdeBincode, Str, U64};
use heed::{Database, Env, EnvOpenOptions, RoTxn};
use serde::{Deserialize, Serialize};

use crate::constants::{MAP_SIZE, MAX_DBS};
use crate::error::Result;
use crate::tx::Tx;

pub(crate) type U64Be = U64<byteorder::BigEndian>;
pub(crate) type IdDb = Database<Bytes, U64Be>;

/// Compose a 16-byte key from two ids
#[inline]
pub(crate) fn key(a: u64, b: u64) -> [u8; 16] {
    let a = a.to_be_bytes();
    let b = b.to_be_bytes();
    [a[0], a[1], a[2], a[3], a[4], a[5], a[6], a[7],
     b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]
}

/// Unique object-identity lookup key: class id + object identifier
pub(crate) fn oid_key(class_id: u64, identifier: &str) -> Vec<u8> {
    let mut k = Vec::with_capacity(8 + identifier.len());
    k.extend_from_slice(&class_id.to_be_bytes());
    k.extend_from_slice(identifier.as_bytes());
    k
}

/// Unique entry key: (class, object identity or null, security identity,
/// field). Class-scope entries store 0 in the object-identity slot; row ids
/// start at 1. The tail is a field presence byte followed by the field name,
/// so a whole-object entry and an empty-named-field entry never share a key.
pub(crate) fn entry_key(
    class_id: u64,
    oid_id: Option<u64>,
    sid_id: u64,
    field: Option<&str>,
) -> Vec<u8> {
    let mut k = Vec::with_capacity(25 + field.map_or(0, str::len));
    k.extend_from_slice(&class_id.to_be_bytes());
    k.extend_from_slice(&oid_id.unwrap_or(0).to_be_bytes());
    k.extend_from_slice(&sid_id.to_be_bytes());
    match field {
        None => k.push(0),
        Some(f) => {
            k.push(1);
            k.extend_from_slice(f.as_bytes());
        }
    }
    k
}

/// Persisted object identity row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct OidRow {
    pub id: u64,
    pub class_id: u64,
    pub object_identifier: String,
    pub parent_id: Option<u64>,
}

/// Persisted security identity row. Never deleted by this engine: entries
/// reference it, but it outlives them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct SidRow {
    pub id: u64,
    pub identifier: String,
    pub is_user: bool,
}

/// Persisted access control entry row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct EntryRow {
    pub id: u64,
    pub class_id: u64,
    /// None = class-scope entry
    pub object_identity_id: Option<u64>,
    /// None = whole-object entry
    pub field: Option<String>,
    pub sid_id: u64,
    pub mask: u64,
    pub order: u32,
    pub granting: bool,
    pub audit_success: Option<bool>,
    pub audit_failure: Option<bool>,
}

/// All database handles
#[derive(Clone)]
pub(crate) struct Dbs {
    /// type name -> class id (unique)
    pub class_ids: Database<Str, U64Be>,
    /// object identity rows by id
    pub oids: Database<U64Be, SerdeBincode<OidRow>>,
    /// (class id, object identifier) -> object identity id (unique)
    pub oid_keys: IdDb,
    /// (class id, oid id) -> oid id; class reference counting
    pub oid_by_class: IdDb,
    /// (parent id, child id) -> child id; the ancestor index edge set
    pub children: IdDb,
    /// serialized identifier -> security identity id (unique)
    pub sid_ids: Database<Str, U64Be>,
    /// security identity rows by id
    pub sids: Database<U64Be, SerdeBincode<SidRow>>,
    /// entry rows by id
    pub entries: Database<U64Be, SerdeBincode<EntryRow>>,
    /// uniqueness tuple -> entry id
    pub entry_keys: IdDb,
    /// (class id, entry id) -> entry id; scoped scans
    pub entry_by_class: IdDb,
    /// id sequence
    pub meta: Database<Str, Str>,
}

/// Handle to one ACL store environment.
///
/// Cheap to clone; clones share the underlying LMDB environment.
#[derive(Clone)]
pub struct AclStore {
    env: Env,
    dbs: Dbs,
}

impl AclStore {
    /// Open the store at the given directory, creating it if needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        std::fs::create_dir_all(path)?;
        // SAFETY: LMDB requires that no other process opens this path
        // concurrently during open.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(MAP_SIZE)
                .max_dbs(MAX_DBS)
                .open(path)?
        };
        let mut tx = env.write_txn()?;
        let dbs = Dbs {
            class_ids: env.create_database(&mut tx, Some("class_ids"))?,
            oids: env.create_database(&mut tx, Some("oids"))?,
            oid_keys: env.create_database(&mut tx, Some("oid_keys"))?,
            oid_by_class: env.create_database(&mut tx, Some("oid_by_class"))?,
            children: env.create_database(&mut tx, Some("children"))?,
            sid_ids: env.create_database(&mut tx, Some("sid_ids"))?,
            sids: env.create_database(&mut tx, Some("sids"))?,
            entries: env.create_database(&mut tx, Some("entries"))?,
            entry_keys: env.create_database(&mut tx, Some("entry_keys"))?,
            entry_by_class: env.create_database(&mut tx, Some("entry_by_class"))?,
            meta: env.create_database(&mut tx, Some("meta"))?,
        };
        tx.commit()?;
        Ok(AclStore { env, dbs })
    }

    /// Execute a read-only operation against a consistent snapshot
    #[inline]
    pub(crate) fn read<T, F: FnOnce(&Dbs, &RoTxn) -> Result<T>>(&self, f: F) -> Result<T> {
        f(&self.dbs, &self.env.read_txn()?)
    }

    /// Execute a write operation in one transaction. Any error aborts the
    /// transaction; nothing is visible until commit.
    #[inline]
    pub(crate) fn write<T, F: FnOnce(&mut Tx) -> Result<T>>(&self, f: F) -> Result<T> {
        let mut tx = Tx::new(&self.env, &self.dbs)?;
        let r = f(&mut tx)?;
        tx.commit()?;
        Ok(r)
    }
}
