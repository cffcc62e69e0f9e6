//! Recoverable failures shared by `HashIndex` and `SlotArena`.
//!
//! Lookup misses are not errors: they surface as `Option`/`bool`. Broken
//! internal invariants are not errors either: they panic.

use crate::hashing::Digest;
use std::collections::TryReserveError;

/// The error type for growth-capable and checked operations.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A caller-supplied digest does not match the digest the index's
    /// hasher computes for the key.
    #[error("supplied digest {supplied:?} does not match computed digest {computed:?}")]
    DigestMismatch { supplied: Digest, computed: Digest },

    /// The store is full and is not allowed to grow.
    #[error("store is full at capacity {capacity} and cannot grow")]
    CapacityExhausted { capacity: usize },

    /// The requested capacity cannot be represented.
    #[error("requested capacity overflows the addressable range")]
    CapacityOverflow,

    /// A dense position past the end of the store.
    #[error("position {position} is out of bounds for length {len}")]
    PositionOutOfBounds { position: usize, len: usize },

    /// The allocator refused to grow the backing storage.
    #[error("allocation failed while growing storage")]
    AllocationFailed(#[from] TryReserveError),
}
