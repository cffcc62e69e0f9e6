#![cfg(test)]

// Property tests for HashIndex kept inside the crate so they can check the
// cell table's structural invariants after every step.

use crate::hash_index::HashIndex;
use crate::HashIndexBuilder;
use core::hash::{BuildHasher, Hasher};
use hashbrown::HashMap;
use proptest::prelude::*;
use proptest::test_runner::TestCaseError;
use std::cell::RefCell;
use std::collections::BTreeSet;
use std::rc::Rc;

#[derive(Clone, Debug)]
enum Op {
    Insert(u16, i32),
    Write(u16, i32),
    Ensure(u16, i32),
    Remove(u16),
    Take(u16),
    Get(u16),
    Mutate(u16, i32),
    Reserve(u16),
    Clear,
    Iterate,
    Walk,
}

fn arb_ops(key_space: u16) -> impl Strategy<Value = Vec<Op>> {
    let key = 0..key_space;
    let op = prop_oneof![
        4 => (key.clone(), any::<i32>()).prop_map(|(k, v)| Op::Insert(k, v)),
        2 => (key.clone(), any::<i32>()).prop_map(|(k, v)| Op::Write(k, v)),
        2 => (key.clone(), any::<i32>()).prop_map(|(k, v)| Op::Ensure(k, v)),
        3 => key.clone().prop_map(Op::Remove),
        1 => key.clone().prop_map(Op::Take),
        2 => key.clone().prop_map(Op::Get),
        1 => (key.clone(), any::<i32>()).prop_map(|(k, d)| Op::Mutate(k, d)),
        1 => (0u16..300).prop_map(Op::Reserve),
        1 => Just(Op::Clear),
        1 => Just(Op::Iterate),
        1 => Just(Op::Walk),
    ];
    proptest::collection::vec(op, 1..200)
}

/// Small-integer keys hash to themselves, so homes collide densely and
/// overflow entries get evicted from foreign homes.
#[derive(Clone, Default)]
struct IdentityBuildHasher;
struct IdentityHasher(u64);
impl BuildHasher for IdentityBuildHasher {
    type Hasher = IdentityHasher;
    fn build_hasher(&self) -> Self::Hasher {
        IdentityHasher(0)
    }
}
impl Hasher for IdentityHasher {
    fn write(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.0 = (self.0 << 8) | u64::from(b);
        }
    }
    fn write_u16(&mut self, n: u16) {
        self.0 = u64::from(n);
    }
    fn finish(&self) -> u64 {
        self.0
    }
}

/// Every key shares one digest: a single ring holds the whole table.
#[derive(Clone, Default)]
struct ConstBuildHasher;
struct ConstHasher;
impl BuildHasher for ConstBuildHasher {
    type Hasher = ConstHasher;
    fn build_hasher(&self) -> Self::Hasher {
        ConstHasher
    }
}
impl Hasher for ConstHasher {
    fn write(&mut self, _bytes: &[u8]) {}
    fn finish(&self) -> u64 {
        5
    }
}

// State-machine equivalence against hashbrown::HashMap. After each step:
// - the cell table partitions into rings and free list with home priority;
// - `len` matches the model and every model key resolves to its value;
// - removal hooks have seen exactly the keys removed through `remove`/`clear`.
fn run<S: BuildHasher>(
    mut sut: HashIndex<u16, i32, S>,
    destroyed: Rc<RefCell<Vec<u16>>>,
    ops: Vec<Op>,
) -> Result<(), TestCaseError> {
    let mut model: HashMap<u16, i32> = HashMap::new();
    let mut expected_destroyed: Vec<u16> = Vec::new();

    for op in ops {
        match op {
            Op::Insert(k, v) => {
                let is_new = sut.insert(k, v).expect("growable index");
                prop_assert_eq!(is_new, !model.contains_key(&k));
                model.entry(k).or_insert(v);
            }
            Op::Write(k, v) => {
                let old = sut.write(k, v).expect("growable index");
                prop_assert_eq!(old, model.insert(k, v));
            }
            Op::Ensure(k, v) => {
                let (slot, is_new) = sut.ensure(k, || v).expect("growable index");
                prop_assert_eq!(is_new, !model.contains_key(&k));
                let m = model.entry(k).or_insert(v);
                prop_assert_eq!(*slot, *m);
            }
            Op::Remove(k) => {
                let removed = sut.remove(&k);
                prop_assert_eq!(removed, model.remove(&k).is_some());
                if removed {
                    expected_destroyed.push(k);
                }
            }
            Op::Take(k) => {
                prop_assert_eq!(sut.take(&k), model.remove_entry(&k));
            }
            Op::Get(k) => {
                prop_assert_eq!(sut.get(&k), model.get(&k));
                prop_assert_eq!(sut.contains_key(&k), model.contains_key(&k));
            }
            Op::Mutate(k, d) => {
                if let Some(v) = sut.get_mut(&k) {
                    *v = v.wrapping_add(d);
                }
                if let Some(v) = model.get_mut(&k) {
                    *v = v.wrapping_add(d);
                }
            }
            Op::Reserve(n) => {
                let before = sut.capacity();
                sut.reserve(usize::from(n)).expect("reserve");
                prop_assert!(sut.capacity() >= before);
                prop_assert!(sut.capacity() >= usize::from(n));
            }
            Op::Clear => {
                let capacity = sut.capacity();
                expected_destroyed.extend(model.keys().copied());
                model.clear();
                sut.clear();
                prop_assert_eq!(sut.capacity(), capacity);
            }
            Op::Iterate => {
                let s: BTreeSet<(u16, i32)> = sut.iter().map(|(k, v)| (*k, *v)).collect();
                let m: BTreeSet<(u16, i32)> = model.iter().map(|(k, v)| (*k, *v)).collect();
                prop_assert_eq!(s, m);
            }
            Op::Walk => {
                let mut walked = Vec::new();
                let mut cur = sut.next_entry(None);
                while let Some((k, _)) = cur {
                    walked.push(*k);
                    cur = sut.next_entry(Some(k));
                }
                let physical: Vec<u16> = sut.keys().copied().collect();
                prop_assert_eq!(walked, physical);
            }
        }

        sut.table().assert_consistent();
        prop_assert_eq!(sut.len(), model.len());
        prop_assert_eq!(sut.is_empty(), model.is_empty());
        for (k, v) in &model {
            prop_assert_eq!(sut.get(k), Some(v));
        }
        // Load never exceeds 75% after a doubling insert.
        prop_assert!(sut.len() * 4 <= sut.capacity() * 3 || sut.capacity() == 0);

        let mut seen = destroyed.borrow().clone();
        let mut want = expected_destroyed.clone();
        seen.sort_unstable();
        want.sort_unstable();
        prop_assert_eq!(seen, want);
    }
    Ok(())
}

fn with_hook<S: BuildHasher>(hasher: S) -> (HashIndex<u16, i32, S>, Rc<RefCell<Vec<u16>>>) {
    let destroyed = Rc::new(RefCell::new(Vec::new()));
    let sink = destroyed.clone();
    let sut = HashIndexBuilder::new()
        .key_hook(move |k: u16| sink.borrow_mut().push(k))
        .build_with_hasher(hasher);
    (sut, destroyed)
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]

    #[test]
    fn prop_state_machine_default_hasher(ops in arb_ops(512)) {
        let (sut, destroyed) = with_hook(crate::DefaultHashBuilder::default());
        run(sut, destroyed, ops)?;
    }

    // Dense identity digests: keys below 64 compete for the same homes at
    // every capacity, exercising eviction and home promotion.
    #[test]
    fn prop_state_machine_identity_collisions(ops in arb_ops(64)) {
        let (sut, destroyed) = with_hook(IdentityBuildHasher);
        run(sut, destroyed, ops)?;
    }

    // Worst case: one ring for the whole table.
    #[test]
    fn prop_state_machine_single_ring(ops in arb_ops(40)) {
        let (sut, destroyed) = with_hook(ConstBuildHasher);
        run(sut, destroyed, ops)?;
    }
}
