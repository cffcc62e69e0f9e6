//! packed-index: two single-threaded associative stores with amortized
//! O(1) insert, lookup and removal.
//!
//! Internal Design:
//!
//! Summary
//! - `HashIndex<K, V, S, E>`: hash-keyed map on open addressing with
//!   in-place bucket chaining. Colliding keys borrow other cells of the
//!   same array; no chain nodes are allocated.
//! - `SlotArena<T>`: handle-keyed packed store. Values stay contiguous;
//!   handles stay valid (or detectably stale) across any removals.
//! - The two stores share nothing but the error type.
//!
//! HashIndex layers
//! - `CellTable<K, V>`: cells, bucket rings, free list, placement, rehash.
//!   Never calls user code except the comparator it is handed.
//! - `HashIndex`: digests via any `BuildHasher`, growth policy, capacity
//!   lock, removal hooks, and a debug-only reentrancy guard held while user
//!   code (hasher, comparator, `make` closures, hooks) runs.
//!
//! Home priority
//! - The cell at `digest & (capacity - 1)` is the home of that digest's
//!   ring. An insertion that finds a foreign overflow entry at its home
//!   moves that entry to a free cell and takes the home back. Removing a
//!   ring's home member pulls its successor into the home cell. Lookups can
//!   therefore stop as soon as the home cell holds a foreign entry.
//!
//! Growth
//! - Capacity is 0 until first use, then a power of two of at least 8.
//!   With `Growth::Doubling` an insertion that would push the load above
//!   75% doubles the array first and replays every entry through
//!   placement. With `Growth::Locked` the table fills completely and then
//!   returns `StoreError::CapacityExhausted`.
//! - All allocations go through `try_reserve`, so growth reports
//!   `StoreError::AllocationFailed` instead of aborting.
//!
//! SlotArena tables
//! - `values: Vec<T>` dense payload; `owners: Vec<u32>` reverse links in
//!   lockstep with it; `slots: Vec<{generation, link}>` indirection, whose
//!   vacant entries (even generation) form a free list through `link`.
//! - Removal swaps the last value into the hole, then repairs the moved
//!   value's forward link using its reverse link.
//! - Each entry keeps its own generation: odd while live, even while
//!   vacant, bumped on every removal. The all-zero handle is never issued
//!   and a stale handle never matches a recycled index. An entry whose
//!   generation wraps is retired and never handed out again; `release`
//!   keeps the indirection table so stale handles stay stale.
//!
//! Failure boundaries
//! - Lookup misses and stale handles are `None`/`false`.
//! - Capacity, allocation and digest problems are `StoreError`s.
//! - A broken internal invariant (free cell inside a ring, empty free list
//!   with room reported) panics.
//!
//! Notes and non-goals
//! - Single-threaded: `HashIndex` is `!Send`/`!Sync` through its guard
//!   marker. No persistence, no ordered iteration.
//! - Removal hooks run once per entry that is destroyed: `remove`,
//!   `clear`, `release` and dropping the index. Overwrites and `take` hand
//!   the old data back to the caller instead.

mod builder;
mod cell_table;
pub mod error;
pub mod hash_index;
#[cfg(test)]
mod hash_index_proptest;
pub mod hashing;
mod hooks;
mod reentrancy;
pub mod slot_arena;
#[cfg(test)]
mod slot_arena_proptest;

// Public surface
pub use builder::HashIndexBuilder;
pub use error::StoreError;
pub use hash_index::{Growth, HashIndex};
pub use hashing::{DefaultEq, DefaultHashBuilder, Digest, KeyEq};
pub use hooks::RemovalHook;
pub use slot_arena::{Handle, SlotArena};
