#![cfg(test)]

// Property tests for SlotArena against slotmap's DenseSlotMap. Both stores
// swap-remove, so besides membership the dense order must agree exactly.

use crate::slot_arena::{Handle, SlotArena};
use proptest::prelude::*;
use proptest::test_runner::TestCaseError;
use slotmap::{DefaultKey, DenseSlotMap};

#[derive(Clone, Debug)]
enum Op {
    Insert(i32),
    InsertWithHandle,
    Remove(usize),
    Get(usize),
    Mutate(usize, i32),
    HandleAt(usize),
    Retain(u8),
    Clear,
}

fn arb_ops() -> impl Strategy<Value = Vec<Op>> {
    let op = prop_oneof![
        5 => any::<i32>().prop_map(Op::Insert),
        1 => Just(Op::InsertWithHandle),
        4 => any::<usize>().prop_map(Op::Remove),
        2 => any::<usize>().prop_map(Op::Get),
        1 => (any::<usize>(), any::<i32>()).prop_map(|(i, d)| Op::Mutate(i, d)),
        1 => (0usize..80).prop_map(Op::HandleAt),
        1 => (2u8..6).prop_map(Op::Retain),
        1 => Just(Op::Clear),
    ];
    proptest::collection::vec(op, 1..250)
}

// Every handle ever issued is kept, paired with the model key issued at the
// same step, so stale handles keep getting probed after removals and clears.
fn run(ops: Vec<Op>) -> Result<(), TestCaseError> {
    let mut sut: SlotArena<i32> = SlotArena::new();
    let mut model: DenseSlotMap<DefaultKey, i32> = DenseSlotMap::new();
    let mut issued: Vec<(Handle, DefaultKey)> = Vec::new();

    let pick = |issued: &[(Handle, DefaultKey)], i: usize| -> Option<(Handle, DefaultKey)> {
        if issued.is_empty() {
            None
        } else {
            Some(issued[i % issued.len()])
        }
    };

    for op in ops {
        match op {
            Op::Insert(v) => {
                let h = sut.insert(v).expect("insert");
                prop_assert!(!h.is_null());
                prop_assert!(issued.iter().all(|&(old, _)| old != h), "handle reissued");
                issued.push((h, model.insert(v)));
            }
            Op::InsertWithHandle => {
                // The value records the generation it was stored under.
                let h = sut
                    .insert_with_handle(|h| h.generation() as i32)
                    .expect("insert");
                prop_assert_eq!(sut.read(h), Some(h.generation() as i32));
                issued.push((h, model.insert(h.generation() as i32)));
            }
            Op::Remove(i) => {
                if let Some((h, k)) = pick(&issued, i) {
                    prop_assert_eq!(sut.remove(h), model.remove(k));
                    prop_assert!(!sut.contains(h));
                }
            }
            Op::Get(i) => {
                if let Some((h, k)) = pick(&issued, i) {
                    prop_assert_eq!(sut.get(h), model.get(k));
                    prop_assert_eq!(sut.contains(h), model.contains_key(k));
                }
            }
            Op::Mutate(i, d) => {
                if let Some((h, k)) = pick(&issued, i) {
                    if let Some(v) = sut.get_mut(h) {
                        *v = v.wrapping_add(d);
                    }
                    if let Some(v) = model.get_mut(k) {
                        *v = v.wrapping_add(d);
                    }
                }
            }
            Op::HandleAt(pos) => match sut.handle_at(pos) {
                Ok(h) => {
                    prop_assert!(pos < sut.len());
                    prop_assert_eq!(sut.position(h), Some(pos));
                    let (_, k) = *issued
                        .iter()
                        .find(|&&(old, _)| old == h)
                        .expect("handle_at returned an unissued handle");
                    prop_assert_eq!(sut.get(h), model.get(k));
                }
                Err(_) => prop_assert!(pos >= sut.len()),
            },
            Op::Retain(m) => {
                let m = i32::from(m);
                sut.retain(|_, v| v.rem_euclid(m) != 0);
                model.retain(|_, v| v.rem_euclid(m) != 0);
            }
            Op::Clear => {
                sut.clear();
                model.clear();
            }
        }

        sut.assert_consistent();
        prop_assert_eq!(sut.len(), model.len());
        prop_assert_eq!(sut.is_empty(), model.is_empty());
        let dense: Vec<i32> = model.values().copied().collect();
        prop_assert_eq!(sut.as_slice(), dense.as_slice());
        for &(h, k) in &issued {
            prop_assert_eq!(sut.get(h), model.get(k));
        }
        for (pos, h) in sut.handles().enumerate() {
            prop_assert_eq!(sut.position(h), Some(pos));
        }
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 128, .. ProptestConfig::default() })]

    #[test]
    fn prop_slot_arena_matches_dense_slot_map(ops in arb_ops()) {
        run(ops)?;
    }
}
