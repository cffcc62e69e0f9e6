//! HashIndex: hash-keyed map on open addressing with in-place bucket
//! chaining.
//!
//! Structure lives in [`CellTable`]; this layer adds digests, the growth
//! policy, removal hooks and the debug reentrancy guard. Every entry point
//! that runs user code (hasher, comparator, hooks) holds the guard.

use crate::cell_table::{CellTable, Entries, EntriesMut, Entry, MIN_CAPACITY};
use crate::error::StoreError;
use crate::hashing::{DefaultEq, DefaultHashBuilder, Digest, KeyEq};
use crate::hooks::RemovalHooks;
use crate::reentrancy::DebugReentrancy;
use crate::HashIndexBuilder;
use core::fmt;
use core::hash::{BuildHasher, Hash};
use core::mem;

/// What happens when an insertion finds the table at its load limit.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum Growth {
    /// Double the capacity once an insertion would push the load above 75%.
    #[default]
    Doubling,
    /// Never grow on insertion. The table fills to 100% and then reports
    /// [`StoreError::CapacityExhausted`]. Explicit `reserve` still works.
    Locked,
}

pub(crate) struct Sizing {
    pub(crate) growth: Growth,
    pub(crate) initial_capacity: usize,
}

impl Sizing {
    fn first_allocation(&self) -> Result<usize, StoreError> {
        self.initial_capacity
            .max(MIN_CAPACITY)
            .checked_next_power_of_two()
            .ok_or(StoreError::CapacityOverflow)
    }

    /// Capacity the table must move to before one more entry can land, or
    /// `None` when the current array suffices.
    fn target_for_insert(&self, len: usize, capacity: usize) -> Result<Option<usize>, StoreError> {
        if capacity == 0 {
            return self.first_allocation().map(Some);
        }
        match self.growth {
            Growth::Locked if len == capacity => Err(StoreError::CapacityExhausted { capacity }),
            Growth::Locked => Ok(None),
            Growth::Doubling if (len + 1).saturating_mul(4) > capacity.saturating_mul(3) => capacity
                .checked_mul(2)
                .map(Some)
                .ok_or(StoreError::CapacityOverflow),
            Growth::Doubling => Ok(None),
        }
    }
}

struct State<K, V, S, E> {
    table: CellTable<K, V>,
    hasher: S,
    key_eq: E,
    sizing: Sizing,
    hooks: RemovalHooks<K, V>,
}

impl<K, V, S, E> State<K, V, S, E>
where
    K: Hash,
    S: BuildHasher,
    E: KeyEq<K>,
{
    fn digest(&self, key: &K) -> Digest {
        Digest::of(&self.hasher, key)
    }

    fn find(&self, digest: Digest, key: &K) -> Option<usize> {
        self.table.find(digest, key, &self.key_eq)
    }

    fn rehash(&mut self, capacity: usize) -> Result<(), StoreError> {
        #[cfg(feature = "logging")]
        log::debug!(
            "rehashing hash index of {} entries from {} to {} cells",
            self.table.len(),
            self.table.capacity(),
            capacity
        );
        self.table.rehash(capacity)?;
        Ok(())
    }

    /// Grows if needed, then places a key known to be absent.
    fn insert_new(&mut self, digest: Digest, key: K, value: V) -> Result<usize, StoreError> {
        if let Some(target) = self
            .sizing
            .target_for_insert(self.table.len(), self.table.capacity())?
        {
            self.rehash(target)?;
        }
        Ok(self.table.insert_new(digest, key, value))
    }

    fn ensure<F>(&mut self, digest: Digest, key: K, make: F) -> Result<(&mut V, bool), StoreError>
    where
        F: FnOnce() -> V,
    {
        if let Some(pos) = self.find(digest, &key) {
            return Ok((&mut self.table.entry_mut(pos).value, false));
        }
        let pos = self.insert_new(digest, key, make())?;
        Ok((&mut self.table.entry_mut(pos).value, true))
    }

    fn take(&mut self, key: &K) -> Option<Entry<K, V>> {
        let pos = self.find(self.digest(key), key)?;
        Some(self.table.remove_at(pos))
    }
}

/// Hash-keyed map whose collision chains live inside its own cell array.
///
/// Lookups start at the key's home cell; a home cell always belongs to the
/// keys that hash to it, so the common case needs no ring traversal.
/// Capacity is 0 until the first insertion or [`reserve`](Self::reserve),
/// then a power of two of at least 8.
///
/// References returned by the index borrow it, so they cannot be held
/// across anything that may grow, shrink or reorder the cells.
pub struct HashIndex<K, V, S = DefaultHashBuilder, E = DefaultEq> {
    state: State<K, V, S, E>,
    reentrancy: DebugReentrancy,
}

impl<K, V> HashIndex<K, V>
where
    K: Eq + Hash,
{
    pub fn new() -> Self {
        Self::with_hasher(DefaultHashBuilder::default())
    }

    /// Creates an index whose first allocation holds at least `capacity`
    /// cells.
    pub fn with_capacity(capacity: usize) -> Self {
        HashIndexBuilder::new().initial_capacity(capacity).build()
    }

    pub fn builder() -> HashIndexBuilder<K, V> {
        HashIndexBuilder::new()
    }
}

impl<K, V> Default for HashIndex<K, V>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, S> HashIndex<K, V, S>
where
    K: Eq + Hash,
    S: BuildHasher,
{
    pub fn with_hasher(hasher: S) -> Self {
        Self::from_parts(hasher, DefaultEq, Sizing::default(), RemovalHooks::none())
    }
}

impl Default for Sizing {
    fn default() -> Self {
        Self {
            growth: Growth::Doubling,
            initial_capacity: MIN_CAPACITY,
        }
    }
}

impl<K, V, S, E> HashIndex<K, V, S, E>
where
    K: Hash,
    S: BuildHasher,
    E: KeyEq<K>,
{
    pub(crate) fn from_parts(hasher: S, key_eq: E, sizing: Sizing, hooks: RemovalHooks<K, V>) -> Self {
        Self {
            state: State {
                table: CellTable::new(),
                hasher,
                key_eq,
                sizing,
                hooks,
            },
            reentrancy: DebugReentrancy::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.state.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.table.len() == 0
    }

    /// Number of cells in the backing array.
    pub fn capacity(&self) -> usize {
        self.state.table.capacity()
    }

    pub fn growth(&self) -> Growth {
        self.state.sizing.growth
    }

    pub fn hasher(&self) -> &S {
        &self.state.hasher
    }

    /// Digest of `key` under this index's hasher.
    pub fn digest(&self, key: &K) -> Digest {
        let _g = self.reentrancy.enter("digest");
        self.state.digest(key)
    }

    /// Home cell index `key` maps to at the current capacity.
    pub fn home_index(&self, key: &K) -> Option<usize> {
        let _g = self.reentrancy.enter("home_index");
        self.state.table.home_of(self.state.digest(key))
    }

    /// Physical cell currently holding `key`.
    pub fn position(&self, key: &K) -> Option<usize> {
        let _g = self.reentrancy.enter("position");
        self.state.find(self.state.digest(key), key)
    }

    /// Returns the value slot for `key`, creating it with `make` when the
    /// key is absent. The flag is `true` when a new entry was created.
    pub fn ensure<F>(&mut self, key: K, make: F) -> Result<(&mut V, bool), StoreError>
    where
        F: FnOnce() -> V,
    {
        let _g = self.reentrancy.enter("ensure");
        let digest = self.state.digest(&key);
        self.state.ensure(digest, key, make)
    }

    /// Like [`ensure`](Self::ensure) with a digest the caller already
    /// computed. The digest is checked against the index's hasher.
    pub fn ensure_hashed<F>(
        &mut self,
        digest: Digest,
        key: K,
        make: F,
    ) -> Result<(&mut V, bool), StoreError>
    where
        F: FnOnce() -> V,
    {
        let _g = self.reentrancy.enter("ensure_hashed");
        let computed = self.state.digest(&key);
        if computed != digest {
            return Err(StoreError::DigestMismatch {
                supplied: digest,
                computed,
            });
        }
        self.state.ensure(digest, key, make)
    }

    /// Inserts `key` unless it is already present; an existing value is
    /// left untouched. Returns whether the key was new.
    pub fn insert(&mut self, key: K, value: V) -> Result<bool, StoreError> {
        self.ensure(key, || value).map(|(_, is_new)| is_new)
    }

    /// Inserts or overwrites. The replaced value is returned to the caller
    /// and removal hooks do not see it.
    pub fn write(&mut self, key: K, value: V) -> Result<Option<V>, StoreError> {
        let _g = self.reentrancy.enter("write");
        let digest = self.state.digest(&key);
        if let Some(pos) = self.state.find(digest, &key) {
            let slot = &mut self.state.table.entry_mut(pos).value;
            return Ok(Some(mem::replace(slot, value)));
        }
        self.state.insert_new(digest, key, value)?;
        Ok(None)
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        let _g = self.reentrancy.enter("get");
        let pos = self.state.find(self.state.digest(key), key)?;
        Some(&self.state.table.entry(pos).value)
    }

    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        let _g = self.reentrancy.enter("get_mut");
        let pos = self.state.find(self.state.digest(key), key)?;
        Some(&mut self.state.table.entry_mut(pos).value)
    }

    pub fn get_key_value(&self, key: &K) -> Option<(&K, &V)> {
        let _g = self.reentrancy.enter("get_key_value");
        let pos = self.state.find(self.state.digest(key), key)?;
        let e = self.state.table.entry(pos);
        Some((&e.key, &e.value))
    }

    pub fn contains_key(&self, key: &K) -> bool {
        let _g = self.reentrancy.enter("contains_key");
        self.state.find(self.state.digest(key), key).is_some()
    }

    /// Removes `key`, handing the stored key and value to the removal
    /// hooks once the table is consistent again.
    pub fn remove(&mut self, key: &K) -> bool {
        let _g = self.reentrancy.enter("remove");
        match self.state.take(key) {
            Some(entry) => {
                self.state.hooks.notify(entry.key, entry.value);
                true
            }
            None => false,
        }
    }

    /// Removes `key` and returns the stored pair. Ownership moves to the
    /// caller, so removal hooks do not run.
    pub fn take(&mut self, key: &K) -> Option<(K, V)> {
        let _g = self.reentrancy.enter("take");
        self.state.take(key).map(|e| (e.key, e.value))
    }

    /// Cursor step over entries in physical cell order.
    ///
    /// `None` yields the first entry; otherwise the entry after `prev`'s
    /// cell. Returns `None` at the end or when `prev` is not present.
    pub fn next_entry(&self, prev: Option<&K>) -> Option<(&K, &V)> {
        let _g = self.reentrancy.enter("next_entry");
        let from = match prev {
            None => 0,
            Some(key) => self.state.find(self.state.digest(key), key)? + 1,
        };
        let pos = self.state.table.next_occupied(from)?;
        let e = self.state.table.entry(pos);
        Some((&e.key, &e.value))
    }

    /// Makes the backing array at least `capacity` cells (rounded up to a
    /// power of two) and places every entry again. `capacity` is a total,
    /// not an increment, as in [`SlotArena::reserve`](crate::SlotArena::reserve).
    /// Never shrinks.
    pub fn reserve(&mut self, capacity: usize) -> Result<(), StoreError> {
        let _g = self.reentrancy.enter("reserve");
        let current = self.state.table.capacity();
        let target = capacity
            .max(MIN_CAPACITY)
            .checked_next_power_of_two()
            .ok_or(StoreError::CapacityOverflow)?
            .max(current);
        if target != current {
            self.state.rehash(target)?;
        }
        Ok(())
    }

    /// Removes every entry, running removal hooks, and keeps the storage.
    pub fn clear(&mut self) {
        let _g = self.reentrancy.enter("clear");
        let State { table, hooks, .. } = &mut self.state;
        table.drain_with(|k, v| hooks.notify(k, v));
    }

    /// Removes every entry and frees the cell array. The next insertion
    /// allocates again.
    pub fn release(&mut self) {
        let _g = self.reentrancy.enter("release");
        let State { table, hooks, .. } = &mut self.state;
        table.drain_with(|k, v| hooks.notify(k, v));
        table.deallocate();
    }
}

impl<K, V, S, E> HashIndex<K, V, S, E> {
    /// Entries in physical cell order.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            it: self.state.table.entries(),
        }
    }

    pub fn iter_mut(&mut self) -> IterMut<'_, K, V> {
        IterMut {
            it: self.state.table.entries_mut(),
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.iter().map(|(k, _)| k)
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.iter().map(|(_, v)| v)
    }

    #[cfg(test)]
    pub(crate) fn table(&self) -> &CellTable<K, V> {
        &self.state.table
    }
}

impl<K, V, S, E> Drop for HashIndex<K, V, S, E> {
    fn drop(&mut self) {
        let State { table, hooks, .. } = &mut self.state;
        if hooks.is_active() {
            table.drain_with(|k, v| hooks.notify(k, v));
        }
    }
}

impl<K, V, S, E> fmt::Debug for HashIndex<K, V, S, E>
where
    K: fmt::Debug,
    V: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

/// Iterator over entries of a [`HashIndex`] in physical cell order.
pub struct Iter<'a, K, V> {
    it: Entries<'a, K, V>,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.it.next().map(|e| (&e.key, &e.value))
    }
}

/// Mutable iterator over entries of a [`HashIndex`].
pub struct IterMut<'a, K, V> {
    it: EntriesMut<'a, K, V>,
}

impl<'a, K, V> Iterator for IterMut<'a, K, V> {
    type Item = (&'a K, &'a mut V);

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.it.next().map(|e| (&e.key, &mut e.value))
    }
}

impl<'a, K, V, S, E> IntoIterator for &'a HashIndex<K, V, S, E> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
