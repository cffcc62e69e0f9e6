//! SlotArena: packed storage addressed by generation-checked handles.
//!
//! Values live in one dense `Vec<T>` with no gaps. A separate indirection
//! table maps each handle index to the value's current position, and a
//! reverse table, kept in lockstep with the values, records which handle
//! index owns each position. Removal swaps the last value into the hole and
//! repairs the one forward link that pointed at it.
//!
//! Each indirection entry keeps its own generation across vacancies: odd
//! while the entry is live, even while it is vacant. Vacant entries are
//! threaded into a free list through their link field. Removal bumps the
//! generation, so a handle to a removed value never matches the entry
//! again, even once the index is reused. An entry whose generation wraps
//! is retired: it stays vacant at generation 0 and is never reused.

use crate::error::StoreError;
use core::fmt;
use core::slice;

const INDEX_BITS: u32 = 32;
const INDEX_MASK: u64 = (1 << INDEX_BITS) - 1;

/// End-of-list marker, also the first index that is never issued.
const NIL: u32 = u32::MAX;

/// Opaque key for a [`SlotArena`] value.
///
/// The low 32 bits hold the indirection index and the high 32 bits the
/// generation. The all-zero handle is [`Handle::NULL`] and never resolves.
#[derive(Copy, Clone, Default, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct Handle(u64);

impl Handle {
    pub const NULL: Handle = Handle(0);

    #[inline]
    fn new(index: u32, generation: u32) -> Self {
        Handle((u64::from(generation) << INDEX_BITS) | u64::from(index))
    }

    #[inline]
    pub const fn index(self) -> u32 {
        (self.0 & INDEX_MASK) as u32
    }

    #[inline]
    pub const fn generation(self) -> u32 {
        (self.0 >> INDEX_BITS) as u32
    }

    #[inline]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    pub const fn from_raw(raw: u64) -> Self {
        Handle(raw)
    }

    pub const fn into_raw(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({}v{})", self.index(), self.generation())
    }
}

#[derive(Copy, Clone, Debug)]
struct Slot {
    // Odd = live. Even = vacant; 0 on a vacant entry means retired.
    generation: u32,
    // Value position when live, next vacant index otherwise.
    link: u32,
}

impl Slot {
    #[inline]
    fn is_live(self) -> bool {
        self.generation & 1 == 1
    }

    #[inline]
    fn is_retired(self) -> bool {
        self.generation == 0
    }
}

/// Contiguous storage with stable, generation-checked handles.
///
/// Insertion, lookup and removal are O(1). Removal moves at most one value
/// (the last one), so dense order is not insertion order and changes on
/// every `remove`; walks that remove should use [`retain`](Self::retain).
pub struct SlotArena<T> {
    values: Vec<T>,
    owners: Vec<u32>,
    slots: Vec<Slot>,
    free_head: u32,
}

impl<T> Default for SlotArena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SlotArena<T> {
    pub const fn new() -> Self {
        Self {
            values: Vec::new(),
            owners: Vec::new(),
            slots: Vec::new(),
            free_head: NIL,
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            values: Vec::with_capacity(capacity),
            owners: Vec::with_capacity(capacity),
            slots: Vec::with_capacity(capacity),
            ..Self::new()
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Values the arena can hold without reallocating its payload.
    pub fn capacity(&self) -> usize {
        self.values.capacity()
    }

    /// Makes every table able to hold at least `capacity` values without
    /// reallocating. Like [`HashIndex::reserve`](crate::HashIndex::reserve)
    /// the argument is a total, not an increment. Never shrinks.
    pub fn reserve(&mut self, capacity: usize) -> Result<(), StoreError> {
        let len = self.len();
        self.values.try_reserve(capacity.saturating_sub(len))?;
        self.owners.try_reserve(capacity.saturating_sub(len))?;
        self.slots
            .try_reserve(capacity.saturating_sub(self.slots.len()))?;
        Ok(())
    }

    /// Performs every fallible step of an insertion and returns the handle
    /// the value will get. Nothing observable changes.
    fn prepare(&mut self) -> Result<Handle, StoreError> {
        let (index, generation) = if self.free_head != NIL {
            let index = self.free_head;
            // Vacant generations are even and below u32::MAX.
            (index, self.slots[index as usize].generation + 1)
        } else {
            if self.slots.len() >= NIL as usize {
                return Err(StoreError::CapacityExhausted {
                    capacity: self.slots.len(),
                });
            }
            self.slots.try_reserve(1)?;
            (self.slots.len() as u32, 1)
        };
        self.values.try_reserve(1)?;
        self.owners.try_reserve(1)?;
        Ok(Handle::new(index, generation))
    }

    /// Links and stores `value` under a handle from `prepare`.
    fn commit(&mut self, handle: Handle, value: T) -> usize {
        let index = handle.index();
        if index as usize == self.slots.len() {
            self.slots.push(Slot {
                generation: 0,
                link: NIL,
            });
        } else {
            debug_assert_eq!(index, self.free_head);
            self.free_head = self.slots[index as usize].link;
        }
        let pos = self.values.len();
        self.slots[index as usize] = Slot {
            generation: handle.generation(),
            link: pos as u32,
        };
        self.owners.push(index);
        self.values.push(value);
        pos
    }

    /// Appends `value` and returns its handle with a reference to the
    /// stored value.
    pub fn emplace(&mut self, value: T) -> Result<(Handle, &mut T), StoreError> {
        let handle = self.prepare()?;
        let pos = self.commit(handle, value);
        Ok((handle, &mut self.values[pos]))
    }

    pub fn insert(&mut self, value: T) -> Result<Handle, StoreError> {
        self.emplace(value).map(|(handle, _)| handle)
    }

    /// Inserts a value built from its own handle.
    pub fn insert_with_handle<F>(&mut self, f: F) -> Result<Handle, StoreError>
    where
        F: FnOnce(Handle) -> T,
    {
        let handle = self.prepare()?;
        let value = f(handle);
        self.commit(handle, value);
        Ok(handle)
    }

    /// Dense position of the value `handle` refers to, if it is live.
    pub fn position(&self, handle: Handle) -> Option<usize> {
        let slot = *self.slots.get(handle.index() as usize)?;
        if slot.is_live() && slot.generation == handle.generation() {
            Some(slot.link as usize)
        } else {
            None
        }
    }

    pub fn contains(&self, handle: Handle) -> bool {
        self.position(handle).is_some()
    }

    pub fn get(&self, handle: Handle) -> Option<&T> {
        self.position(handle).map(|pos| &self.values[pos])
    }

    pub fn get_mut(&mut self, handle: Handle) -> Option<&mut T> {
        self.position(handle).map(|pos| &mut self.values[pos])
    }

    /// Copy of the value `handle` refers to.
    pub fn read(&self, handle: Handle) -> Option<T>
    where
        T: Clone,
    {
        self.get(handle).cloned()
    }

    /// Handle of the value at dense position `pos`.
    pub fn handle_at(&self, pos: usize) -> Result<Handle, StoreError> {
        match self.owners.get(pos) {
            Some(&index) => Ok(Handle::new(index, self.slots[index as usize].generation)),
            None => Err(StoreError::PositionOutOfBounds {
                position: pos,
                len: self.len(),
            }),
        }
    }

    /// Removes the value `handle` refers to. The last value moves into its
    /// position.
    pub fn remove(&mut self, handle: Handle) -> Option<T> {
        let pos = self.position(handle)?;
        let index = handle.index();

        let value = self.values.swap_remove(pos);
        self.owners.swap_remove(pos);
        if let Some(&moved) = self.owners.get(pos) {
            self.slots[moved as usize].link = pos as u32;
        }

        self.vacate(index);
        Some(value)
    }

    /// Bumps a live entry's generation to vacant and pushes it on the free
    /// list, or retires it when the generation wraps.
    fn vacate(&mut self, index: u32) {
        let slot = &mut self.slots[index as usize];
        debug_assert!(slot.is_live());
        slot.generation = slot.generation.wrapping_add(1);
        if slot.is_retired() {
            slot.link = NIL;
            #[cfg(feature = "logging")]
            log::debug!("retired slot arena index {index} after its generations wrapped");
        } else {
            slot.link = self.free_head;
            self.free_head = index;
        }
    }

    /// Keeps only the values for which `f` returns `true`. Each value is
    /// visited exactly once.
    pub fn retain<F>(&mut self, mut f: F)
    where
        F: FnMut(Handle, &mut T) -> bool,
    {
        let mut pos = 0;
        while pos < self.values.len() {
            let index = self.owners[pos];
            let handle = Handle::new(index, self.slots[index as usize].generation);
            if f(handle, &mut self.values[pos]) {
                pos += 1;
            } else {
                // The former last value now sits at `pos` and is still unvisited.
                self.remove(handle);
            }
        }
    }

    /// Removes every value. Issued handles stay invalid; their indices are
    /// recycled with newer generations.
    pub fn clear(&mut self) {
        self.values.clear();
        self.owners.clear();
        // Rebuilt back to front so the lowest index is handed out first.
        self.free_head = NIL;
        for index in (0..self.slots.len() as u32).rev() {
            let slot = &mut self.slots[index as usize];
            if slot.is_live() {
                slot.generation = slot.generation.wrapping_add(1);
            }
            if slot.is_retired() {
                slot.link = NIL;
            } else {
                slot.link = self.free_head;
                self.free_head = index;
            }
        }
    }

    /// Removes every value and frees the payload storage. The indirection
    /// table survives (as vacant entries) so that every handle issued
    /// before stays stale.
    pub fn release(&mut self) {
        self.clear();
        self.values = Vec::new();
        self.owners = Vec::new();
        self.slots.shrink_to_fit();
    }

    /// Values in dense order.
    pub fn as_slice(&self) -> &[T] {
        &self.values
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.values
    }

    pub fn handles(&self) -> impl Iterator<Item = Handle> + '_ {
        self.owners
            .iter()
            .map(move |&index| Handle::new(index, self.slots[index as usize].generation))
    }

    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            values: self.values.iter(),
            owners: self.owners.iter(),
            slots: &self.slots,
        }
    }

    pub fn iter_mut(&mut self) -> IterMut<'_, T> {
        IterMut {
            values: self.values.iter_mut(),
            owners: self.owners.iter(),
            slots: &self.slots,
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for SlotArena<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

/// Iterator over `(Handle, &T)` in dense order.
pub struct Iter<'a, T> {
    values: slice::Iter<'a, T>,
    owners: slice::Iter<'a, u32>,
    slots: &'a [Slot],
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = (Handle, &'a T);

    fn next(&mut self) -> Option<Self::Item> {
        let value = self.values.next()?;
        let &index = self.owners.next()?;
        Some((Handle::new(index, self.slots[index as usize].generation), value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.values.size_hint()
    }
}

impl<T> ExactSizeIterator for Iter<'_, T> {}

/// Iterator over `(Handle, &mut T)` in dense order.
pub struct IterMut<'a, T> {
    values: slice::IterMut<'a, T>,
    owners: slice::Iter<'a, u32>,
    slots: &'a [Slot],
}

impl<'a, T> Iterator for IterMut<'a, T> {
    type Item = (Handle, &'a mut T);

    fn next(&mut self) -> Option<Self::Item> {
        let value = self.values.next()?;
        let &index = self.owners.next()?;
        Some((Handle::new(index, self.slots[index as usize].generation), value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.values.size_hint()
    }
}

impl<T> ExactSizeIterator for IterMut<'_, T> {}

impl<'a, T> IntoIterator for &'a SlotArena<T> {
    type Item = (Handle, &'a T);
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
impl<T> SlotArena<T> {
    /// Checks density, link inversion, the vacant-entry free list and that
    /// retired entries stay off it.
    pub(crate) fn assert_consistent(&self) {
        assert_eq!(self.values.len(), self.owners.len(), "reverse links out of step");
        for (pos, &index) in self.owners.iter().enumerate() {
            let slot = self.slots[index as usize];
            assert!(slot.is_live(), "position {pos} owned by a vacant entry");
            assert_eq!(slot.link as usize, pos, "forward link of {index} is not inverse");
        }
        let live = self.slots.iter().filter(|s| s.is_live()).count();
        assert_eq!(live, self.owners.len(), "live entries without a value");

        let mut free = 0;
        let mut index = self.free_head;
        while index != NIL {
            let slot = self.slots[index as usize];
            assert!(!slot.is_live(), "live entry {index} on the free list");
            assert!(!slot.is_retired(), "retired entry {index} on the free list");
            free += 1;
            assert!(free <= self.slots.len(), "free list cycles");
            index = slot.link;
        }
        let retired = self
            .slots
            .iter()
            .filter(|s| !s.is_live() && s.is_retired())
            .count();
        assert_eq!(
            live + free + retired,
            self.slots.len(),
            "vacant entries missing from the free list"
        );
    }
}
