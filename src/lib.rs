//! Aclstore - transactional ACL storage and mutation engine
//!
//! Persists per-object and per-class access control entries in LMDB, tracks
//! the parent/child tree of protected objects, and keeps an external read
//! cache coherent with mutations.
//!
//! The write path is the heart of the crate: [`AclProvider::create_acl`],
//! [`AclProvider::find_acl`], [`AclProvider::update_acl`], and
//! [`AclProvider::delete_acl`] each run in a single store transaction, and
//! cache synchronization happens strictly after commit. Updates reconcile the
//! in-memory entry lists against the persisted rows instead of rewriting the
//! tables wholesale, so partial edits (add, reorder, remove) stay cheap and
//! the per-scope uniqueness of `(class, object, field, principal)` holds.
//!
//! Permission-bit semantics and the read/evaluation path live elsewhere;
//! this crate stores masks, it does not interpret them.

pub mod acl;
pub mod cache;
pub mod constants;
pub mod error;
pub mod identity;

mod db;
mod provider;
mod read;
mod tx;

pub use acl::{Ace, MutableAcl};
pub use cache::{AclCache, CacheError};
pub use db::AclStore;
pub use error::{AclError, Result};
pub use identity::{ObjectIdentityRef, Principal};
pub use provider::AclProvider;
