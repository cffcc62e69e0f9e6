//! CellTable: structural layer of `HashIndex`.
//!
//! A flat, power-of-two sized array of cells. Occupied cells are chained
//! into one circular *bucket ring* per home index, using other cells of
//! the same array as overflow storage. Vacant cells are threaded on a
//! doubly linked free list so that any cell can be claimed or returned in
//! O(1).
//!
//! Invariants upheld between calls:
//! - every cell is either on the free list or in exactly one ring;
//! - a ring's home cell is the cell at `digest & mask` of its members, and
//!   is always occupied by a member of that ring (home priority), so a
//!   lookup that finds a foreign resident at home can stop immediately;
//! - `len` equals the number of occupied cells.
//!
//! The only user code this layer runs is the key comparator handed to
//! [`CellTable::find`]. Hashing and growth policy live one layer up.

use crate::hashing::{Digest, KeyEq};
use core::mem;
use core::slice;
use std::collections::TryReserveError;

/// Smallest allocated capacity.
pub(crate) const MIN_CAPACITY: usize = 8;

/// End-of-list marker for free-list links.
const NIL: usize = usize::MAX;

#[derive(Debug)]
pub(crate) struct Entry<K, V> {
    /// Next member of this entry's bucket ring (itself when alone).
    pub(crate) next: usize,
    pub(crate) digest: Digest,
    pub(crate) key: K,
    pub(crate) value: V,
}

#[derive(Debug)]
enum Cell<K, V> {
    Free { prev: usize, next: usize },
    Occupied(Entry<K, V>),
}

impl<K, V> Cell<K, V> {
    /// Link for cell `i` of a freshly threaded free list over `cap` cells.
    fn threaded(i: usize, cap: usize) -> Self {
        Cell::Free {
            prev: if i == 0 { NIL } else { i - 1 },
            next: if i + 1 == cap { NIL } else { i + 1 },
        }
    }

    fn into_entry(self, pos: usize) -> Entry<K, V> {
        match self {
            Cell::Occupied(e) => e,
            Cell::Free { .. } => panic!("cell {pos} is on the free list but was reached from a bucket ring"),
        }
    }
}

pub(crate) struct CellTable<K, V> {
    cells: Vec<Cell<K, V>>,
    free_head: usize,
    len: usize,
}

impl<K, V> CellTable<K, V> {
    /// An unallocated table with capacity 0.
    pub(crate) const fn new() -> Self {
        Self {
            cells: Vec::new(),
            free_head: NIL,
            len: 0,
        }
    }

    fn fresh_cells(capacity: usize) -> Result<Vec<Cell<K, V>>, TryReserveError> {
        let mut cells = Vec::new();
        cells.try_reserve_exact(capacity)?;
        cells.extend((0..capacity).map(|i| Cell::threaded(i, capacity)));
        Ok(cells)
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub(crate) fn capacity(&self) -> usize {
        self.cells.len()
    }

    #[inline]
    fn mask(&self) -> usize {
        debug_assert!(self.cells.len().is_power_of_two());
        self.cells.len() - 1
    }

    /// Home index of `digest`, or `None` while unallocated.
    pub(crate) fn home_of(&self, digest: Digest) -> Option<usize> {
        if self.cells.is_empty() {
            None
        } else {
            Some(digest.home(self.mask()))
        }
    }

    pub(crate) fn entry(&self, pos: usize) -> &Entry<K, V> {
        match &self.cells[pos] {
            Cell::Occupied(e) => e,
            Cell::Free { .. } => panic!("cell {pos} is free but was addressed as an entry"),
        }
    }

    pub(crate) fn entry_mut(&mut self, pos: usize) -> &mut Entry<K, V> {
        match &mut self.cells[pos] {
            Cell::Occupied(e) => e,
            Cell::Free { .. } => panic!("cell {pos} is free but was addressed as an entry"),
        }
    }

    /// Finds the cell holding `key`.
    pub(crate) fn find<E>(&self, digest: Digest, key: &K, key_eq: &E) -> Option<usize>
    where
        E: KeyEq<K>,
    {
        let home = self.home_of(digest)?;
        let mask = self.mask();
        match &self.cells[home] {
            Cell::Occupied(e) if e.digest.home(mask) == home => {}
            // Vacant, or lent to another ring: this bucket is empty.
            _ => return None,
        }
        let mut pos = home;
        loop {
            let e = self.entry(pos);
            if e.digest == digest && key_eq.key_eq(&e.key, key) {
                return Some(pos);
            }
            pos = e.next;
            if pos == home {
                return None;
            }
        }
    }

    /// Adds a new entry. The caller guarantees the key is absent and that
    /// at least one cell is free.
    pub(crate) fn insert_new(&mut self, digest: Digest, key: K, value: V) -> usize {
        let pos = self.place(digest, key, value);
        self.len += 1;
        pos
    }

    /// Resolves the landing cell for `digest` by home priority and writes
    /// the entry there. Does not touch `len`.
    fn place(&mut self, digest: Digest, key: K, value: V) -> usize {
        let mask = self.mask();
        let home = digest.home(mask);
        let resident = match &self.cells[home] {
            Cell::Free { .. } => None,
            Cell::Occupied(e) => Some((e.digest.home(mask), e.next)),
        };

        match resident {
            None => {
                self.unlink_free(home);
                self.cells[home] = Cell::Occupied(Entry {
                    next: home,
                    digest,
                    key,
                    value,
                });
                home
            }
            Some((owner, _)) if owner != home => {
                // The resident is overflow from the ring homed at `owner`.
                // Move it out, keeping its ring link, and claim home.
                let spare = self.take_free();
                let pred = self.predecessor(owner, home);
                let evicted = mem::replace(
                    &mut self.cells[home],
                    Cell::Occupied(Entry {
                        next: home,
                        digest,
                        key,
                        value,
                    }),
                );
                self.cells[spare] = evicted;
                self.entry_mut(pred).next = spare;
                home
            }
            Some((_, after_home)) => {
                let spare = self.take_free();
                self.cells[spare] = Cell::Occupied(Entry {
                    next: after_home,
                    digest,
                    key,
                    value,
                });
                self.entry_mut(home).next = spare;
                spare
            }
        }
    }

    /// Removes the entry at `pos` and returns it. Its `next` link is stale.
    pub(crate) fn remove_at(&mut self, pos: usize) -> Entry<K, V> {
        let mask = self.mask();
        let (home, next) = {
            let e = self.entry(pos);
            (e.digest.home(mask), e.next)
        };

        let removed = if pos != home {
            let pred = self.predecessor(home, pos);
            self.entry_mut(pred).next = next;
            self.release(pos)
        } else if next == home {
            self.release(home)
        } else {
            // Pull the successor into the home cell so home stays owned by
            // this ring; its own link already points past it.
            let successor = self.release(next).into_entry(next);
            mem::replace(&mut self.cells[home], Cell::Occupied(successor))
        };

        self.len -= 1;
        removed.into_entry(pos)
    }

    /// Ring member whose `next` is `target`, walking from `start`.
    fn predecessor(&self, start: usize, target: usize) -> usize {
        let mut pos = start;
        loop {
            let next = self.entry(pos).next;
            if next == target {
                return pos;
            }
            pos = next;
            assert!(
                pos != start,
                "cell {target} is missing from the bucket ring at {start}"
            );
        }
    }

    /// Pops the head of the free list.
    fn take_free(&mut self) -> usize {
        let head = self.free_head;
        assert!(
            head != NIL,
            "free list is empty with {} of {} cells occupied",
            self.len,
            self.cells.len()
        );
        self.unlink_free(head);
        head
    }

    fn unlink_free(&mut self, pos: usize) {
        let (prev, next) = match self.cells[pos] {
            Cell::Free { prev, next } => (prev, next),
            Cell::Occupied(_) => panic!("cell {pos} is occupied but was unlinked from the free list"),
        };
        if prev == NIL {
            self.free_head = next;
        } else {
            self.set_free_next(prev, next);
        }
        if next != NIL {
            self.set_free_prev(next, prev);
        }
    }

    /// Pushes cell `pos` onto the free list, returning what it held.
    fn release(&mut self, pos: usize) -> Cell<K, V> {
        let head = self.free_head;
        let old = mem::replace(
            &mut self.cells[pos],
            Cell::Free {
                prev: NIL,
                next: head,
            },
        );
        if head != NIL {
            self.set_free_prev(head, pos);
        }
        self.free_head = pos;
        old
    }

    fn set_free_next(&mut self, pos: usize, to: usize) {
        match &mut self.cells[pos] {
            Cell::Free { next, .. } => *next = to,
            Cell::Occupied(_) => panic!("free-list neighbour {pos} is occupied"),
        }
    }

    fn set_free_prev(&mut self, pos: usize, to: usize) {
        match &mut self.cells[pos] {
            Cell::Free { prev, .. } => *prev = to,
            Cell::Occupied(_) => panic!("free-list neighbour {pos} is occupied"),
        }
    }

    /// Moves every entry into a fresh array of `capacity` cells, placing
    /// each one again by home priority.
    pub(crate) fn rehash(&mut self, capacity: usize) -> Result<(), TryReserveError> {
        debug_assert!(capacity.is_power_of_two());
        debug_assert!(capacity >= MIN_CAPACITY && capacity >= self.len);
        let fresh = Self::fresh_cells(capacity)?;
        let old = mem::replace(&mut self.cells, fresh);
        self.free_head = 0;
        for cell in old {
            if let Cell::Occupied(e) = cell {
                self.place(e.digest, e.key, e.value);
            }
        }
        Ok(())
    }

    /// Empties the table, passing every entry to `f`. Storage is kept.
    pub(crate) fn drain_with<F>(&mut self, mut f: F)
    where
        F: FnMut(K, V),
    {
        let cap = self.cells.len();
        self.len = 0;
        self.free_head = if cap == 0 { NIL } else { 0 };
        for i in 0..cap {
            if let Cell::Occupied(e) = mem::replace(&mut self.cells[i], Cell::threaded(i, cap)) {
                f(e.key, e.value);
            }
        }
    }

    /// Drops the cell array. The table must be empty.
    pub(crate) fn deallocate(&mut self) {
        debug_assert_eq!(self.len, 0);
        self.cells = Vec::new();
        self.free_head = NIL;
    }

    /// First occupied cell at or after `from`.
    pub(crate) fn next_occupied(&self, from: usize) -> Option<usize> {
        self.cells
            .get(from..)?
            .iter()
            .position(|c| matches!(c, Cell::Occupied(_)))
            .map(|offset| from + offset)
    }

    pub(crate) fn entries(&self) -> Entries<'_, K, V> {
        Entries {
            it: self.cells.iter(),
        }
    }

    pub(crate) fn entries_mut(&mut self) -> EntriesMut<'_, K, V> {
        EntriesMut {
            it: self.cells.iter_mut(),
        }
    }
}

/// Occupied entries in physical cell order.
pub(crate) struct Entries<'a, K, V> {
    it: slice::Iter<'a, Cell<K, V>>,
}

impl<'a, K, V> Iterator for Entries<'a, K, V> {
    type Item = &'a Entry<K, V>;

    fn next(&mut self) -> Option<Self::Item> {
        self.it.by_ref().find_map(|c| match c {
            Cell::Occupied(e) => Some(e),
            Cell::Free { .. } => None,
        })
    }
}

pub(crate) struct EntriesMut<'a, K, V> {
    it: slice::IterMut<'a, Cell<K, V>>,
}

impl<'a, K, V> Iterator for EntriesMut<'a, K, V> {
    type Item = &'a mut Entry<K, V>;

    fn next(&mut self) -> Option<Self::Item> {
        self.it.by_ref().find_map(|c| match c {
            Cell::Occupied(e) => Some(e),
            Cell::Free { .. } => None,
        })
    }
}

#[cfg(test)]
impl<K, V> CellTable<K, V> {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        let mut t = Self::new();
        t.rehash(capacity).expect("test allocation");
        t
    }

    /// Cells of the ring homed at `home`, starting at `home`.
    pub(crate) fn ring(&self, home: usize) -> Vec<usize> {
        let mut members = Vec::new();
        if let Cell::Free { .. } = self.cells[home] {
            return members;
        }
        let mut pos = home;
        loop {
            members.push(pos);
            pos = self.entry(pos).next;
            if pos == home {
                return members;
            }
        }
    }

    /// Checks home priority, ring closure and the ring/free-list partition.
    pub(crate) fn assert_consistent(&self) {
        let cap = self.cells.len();
        if cap == 0 {
            assert_eq!(self.len, 0);
            assert_eq!(self.free_head, NIL);
            return;
        }
        assert!(cap.is_power_of_two() && cap >= MIN_CAPACITY, "capacity {cap}");
        let mask = self.mask();
        let mut seen = vec![false; cap];

        let mut occupied = 0;
        for (i, cell) in self.cells.iter().enumerate() {
            let Cell::Occupied(e) = cell else { continue };
            occupied += 1;
            if e.digest.home(mask) != i {
                continue;
            }
            let mut steps = 0;
            let mut pos = i;
            loop {
                assert!(!seen[pos], "cell {pos} belongs to two rings");
                seen[pos] = true;
                let member = self.entry(pos);
                assert_eq!(member.digest.home(mask), i, "cell {pos} sits in a foreign ring");
                steps += 1;
                assert!(steps <= cap, "ring at {i} does not close");
                pos = member.next;
                if pos == i {
                    break;
                }
            }
        }
        assert_eq!(occupied, self.len, "len disagrees with occupied cells");

        let mut free = 0;
        let mut prev = NIL;
        let mut pos = self.free_head;
        while pos != NIL {
            assert!(!seen[pos], "cell {pos} is both free and in a ring");
            seen[pos] = true;
            match self.cells[pos] {
                Cell::Free { prev: p, next } => {
                    assert_eq!(p, prev, "free-list back link at {pos}");
                    prev = pos;
                    pos = next;
                }
                Cell::Occupied(_) => panic!("occupied cell {pos} on the free list"),
            }
            free += 1;
        }
        assert_eq!(free + self.len, cap, "cells lost from both structures");
        assert!(seen.iter().all(|&s| s), "some cell is in no structure");
    }
}
