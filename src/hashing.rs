//! Digests and key equivalence for `HashIndex`.

use core::hash::{BuildHasher, Hash};
use core::num::NonZeroU64;

/// Default hasher used by `HashIndex`.
pub type DefaultHashBuilder = hashbrown::hash_map::DefaultHashBuilder;

/// Stand-in for a raw hash of 0, which is reserved for "empty".
const ZERO_REMAP: NonZeroU64 = match NonZeroU64::new(0x9e37_79b9_7f4a_7c15) {
    Some(nz) => nz,
    None => unreachable!(),
};

/// Non-zero 64-bit hash of a key.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct Digest(NonZeroU64);

impl Digest {
    /// Wraps a raw hash value, remapping 0 to a fixed non-zero value.
    #[inline]
    pub fn from_hash(raw: u64) -> Self {
        Digest(NonZeroU64::new(raw).unwrap_or(ZERO_REMAP))
    }

    /// Hashes `key` with `hasher` and wraps the result.
    #[inline]
    pub fn of<Q, S>(hasher: &S, key: &Q) -> Self
    where
        Q: ?Sized + Hash,
        S: BuildHasher,
    {
        Self::from_hash(hasher.hash_one(key))
    }

    #[inline]
    pub const fn get(self) -> u64 {
        self.0.get()
    }

    /// Index of the home cell for a table whose capacity is `mask + 1`.
    #[inline]
    pub(crate) const fn home(self, mask: usize) -> usize {
        (self.0.get() as usize) & mask
    }
}

/// Key comparator used to resolve digest collisions.
///
/// Implemented for [`DefaultEq`] (the key's own `Eq`) and for any closure
/// `Fn(&K, &K) -> bool`.
pub trait KeyEq<K> {
    fn key_eq(&self, stored: &K, probe: &K) -> bool;
}

/// Compares keys with `K: Eq`.
#[derive(Copy, Clone, Debug, Default)]
pub struct DefaultEq;

impl<K: Eq> KeyEq<K> for DefaultEq {
    #[inline]
    fn key_eq(&self, stored: &K, probe: &K) -> bool {
        stored == probe
    }
}

impl<K, F> KeyEq<K> for F
where
    F: Fn(&K, &K) -> bool,
{
    #[inline]
    fn key_eq(&self, stored: &K, probe: &K) -> bool {
        self(stored, probe)
    }
}
