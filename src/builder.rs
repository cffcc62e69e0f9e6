use crate::hash_index::{Growth, HashIndex, Sizing};
use crate::hashing::{DefaultEq, DefaultHashBuilder, KeyEq};
use crate::hooks::{RemovalHook, RemovalHooks};

use core::fmt;
use core::hash::{BuildHasher, Hash};

/// Builds a [`HashIndex`] with various configuration knobs.
///
/// # Examples
///
/// ```rust
/// use packed_index::{HashIndexBuilder, StoreError};
///
/// let mut index = HashIndexBuilder::new()
///     // First allocation: 16 cells.
///     .initial_capacity(16)
///     // Never grow past them.
///     .lock_capacity()
///     // Observe every key that leaves the index.
///     .key_hook(|key: u32| println!("dropped {key}"))
///     .build();
///
/// for k in 0..16u32 {
///     index.insert(k, k * 2)?;
/// }
/// assert!(matches!(
///     index.insert(16, 32),
///     Err(StoreError::CapacityExhausted { capacity: 16 })
/// ));
/// assert!(index.remove(&3)); // prints "dropped 3"
/// # Ok::<(), StoreError>(())
/// ```
pub struct HashIndexBuilder<K, V> {
    initial_capacity: Option<usize>,
    growth: Growth,
    key_hook: Option<RemovalHook<K>>,
    value_hook: Option<RemovalHook<V>>,
}

impl<K, V> Default for HashIndexBuilder<K, V> {
    fn default() -> Self {
        Self {
            initial_capacity: None,
            growth: Growth::default(),
            key_hook: None,
            value_hook: None,
        }
    }
}

impl<K, V> HashIndexBuilder<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cells of the first allocation, rounded up to a power of two and to
    /// at least 8. Nothing is allocated until the first insertion.
    pub fn initial_capacity(self, capacity: usize) -> Self {
        Self {
            initial_capacity: Some(capacity),
            ..self
        }
    }

    pub fn growth(self, growth: Growth) -> Self {
        Self { growth, ..self }
    }

    /// Shorthand for `growth(Growth::Locked)`.
    pub fn lock_capacity(self) -> Self {
        self.growth(Growth::Locked)
    }

    /// Sets a hook that receives each key as its entry is destroyed.
    pub fn key_hook(self, hook: impl FnMut(K) + 'static) -> Self {
        Self {
            key_hook: Some(Box::new(hook)),
            ..self
        }
    }

    /// Sets a hook that receives each value as its entry is destroyed.
    pub fn value_hook(self, hook: impl FnMut(V) + 'static) -> Self {
        Self {
            value_hook: Some(Box::new(hook)),
            ..self
        }
    }

    /// Builds a `HashIndex` with the default hasher and `Eq` comparison.
    pub fn build(self) -> HashIndex<K, V>
    where
        K: Eq + Hash,
    {
        self.build_with(DefaultHashBuilder::default(), DefaultEq)
    }

    /// Builds a `HashIndex` with the given hasher and `Eq` comparison.
    pub fn build_with_hasher<S>(self, hasher: S) -> HashIndex<K, V, S>
    where
        K: Eq + Hash,
        S: BuildHasher,
    {
        self.build_with(hasher, DefaultEq)
    }

    /// Builds a `HashIndex` with the given hasher and key comparator.
    ///
    /// The comparator must agree with the hasher: keys it considers equal
    /// must hash identically.
    pub fn build_with<S, E>(self, hasher: S, key_eq: E) -> HashIndex<K, V, S, E>
    where
        K: Hash,
        S: BuildHasher,
        E: KeyEq<K>,
    {
        let defaults = Sizing::default();
        let sizing = Sizing {
            growth: self.growth,
            initial_capacity: self.initial_capacity.unwrap_or(defaults.initial_capacity),
        };
        HashIndex::from_parts(
            hasher,
            key_eq,
            sizing,
            RemovalHooks::new(self.key_hook, self.value_hook),
        )
    }
}

impl<K, V> fmt::Debug for HashIndexBuilder<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HashIndexBuilder")
            .field("initial_capacity", &self.initial_capacity)
            .field("growth", &self.growth)
            .field("key_hook", &self.key_hook.is_some())
            .field("value_hook", &self.value_hook.is_some())
            .finish()
    }
}
