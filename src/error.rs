//! Error taxonomy for ACL storage operations

use crate::identity::ObjectIdentityRef;

/// The main error type for ACL storage operations.
#[derive(Debug, thiserror::Error)]
pub enum AclError {
    /// `create_acl` was called for an object identity that already has
    /// entries. Find and update the existing ACL instead.
    #[error("an ACL for {0} already exists")]
    AlreadyExists(ObjectIdentityRef),

    /// A lookup missed where the caller requires existence.
    #[error("no ACL found for {0}")]
    NotFound(ObjectIdentityRef),

    /// Malformed input: an untracked ACL, a bad security identifier, or an
    /// invalid parent link.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A store-level failure. The open transaction was rolled back; no
    /// partial state is observable.
    #[error("persistence failure: {0}")]
    Persistence(#[from] heed::Error),

    /// Filesystem failure while opening the store.
    #[error("store i/o failure: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for ACL storage operations
pub type Result<T> = std::result::Result<T, AclError>;
