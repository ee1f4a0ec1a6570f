//! Cache gateway contract
//!
//! The engine calls the gateway strictly after a successful commit, so the
//! cache only ever observes durable state. Gateway failures are surfaced as
//! warnings, never as operation errors: the committed write stands, the
//! cache is merely stale until the next eviction.

use crate::acl::MutableAcl;
use crate::identity::ObjectIdentityRef;

/// Error raised by a cache gateway
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct CacheError(pub String);

/// The invalidation/population interface called after commit.
///
/// Absence of a configured cache is a valid mode; the engine then skips
/// these calls entirely.
pub trait AclCache: Send + Sync {
    /// Store the post-update logical state of an ACL
    fn put_in_cache(&self, acl: &MutableAcl) -> Result<(), CacheError>;

    /// Drop a cached ACL by its object identity row id
    fn evict_from_cache_by_id(&self, id: u64) -> Result<(), CacheError>;

    /// Drop a cached ACL by its object identity reference
    fn evict_from_cache_by_identity(&self, oid: &ObjectIdentityRef) -> Result<(), CacheError>;
}
