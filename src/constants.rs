//! Store tuning constants

/// LMDB map size (1 GiB)
pub const MAP_SIZE: usize = 1 << 30;

/// Number of named databases in the environment
pub(crate) const MAX_DBS: u32 = 11;

/// Maximum object-identity tree depth (bounds parent walks, prevents loops)
pub const MAX_TREE_DEPTH: usize = 64;
