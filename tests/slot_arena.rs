use packed_index::{Handle, SlotArena, StoreError};

#[test]
fn removing_first_of_three_packs_storage() {
    let mut arena = SlotArena::new();
    let ha = arena.insert("A").unwrap();
    let hb = arena.insert("B").unwrap();
    let hc = arena.insert("C").unwrap();

    assert_eq!(arena.remove(ha), Some("A"));
    assert_eq!(arena.get(ha), None);
    assert_eq!(arena.get(hb), Some(&"B"));
    assert_eq!(arena.get(hc), Some(&"C"));
    assert_eq!(arena.as_slice(), &["C", "B"]);
    assert_eq!(arena.len(), 2);
}

#[test]
fn reinsert_reuses_index_with_new_generation() {
    let mut arena = SlotArena::new();
    let ha = arena.insert('A').unwrap();
    arena.insert('B').unwrap();
    arena.insert('C').unwrap();
    arena.remove(ha);

    let hd = arena.insert('D').unwrap();
    assert_eq!(hd.index(), ha.index());
    assert_ne!(hd.generation(), ha.generation());
    assert_ne!(hd, ha);
    assert_eq!(arena.get(ha), None);
    assert_eq!(arena.get(hd), Some(&'D'));
}

#[test]
fn stale_handles_stay_dead_through_churn() {
    let mut arena = SlotArena::new();
    let mut dead = Vec::new();
    let mut live = Vec::new();
    for round in 0..50u32 {
        for v in 0..8 {
            live.push(arena.insert(round * 8 + v).unwrap());
        }
        // Drop every other live handle each round.
        let mut keep = Vec::new();
        for (i, h) in live.drain(..).enumerate() {
            if i % 2 == 0 {
                assert!(arena.remove(h).is_some());
                dead.push(h);
            } else {
                keep.push(h);
            }
        }
        live = keep;
    }
    assert_eq!(arena.len(), live.len());
    for h in &dead {
        assert!(!arena.contains(*h));
        assert_eq!(arena.remove(*h), None);
    }
    for h in &live {
        let pos = arena.position(*h).unwrap();
        assert_eq!(arena.handle_at(pos), Ok(*h));
    }
}

#[test]
fn null_and_forged_handles_miss() {
    let mut arena = SlotArena::new();
    let h = arena.insert(5u8).unwrap();
    assert_eq!(arena.get(Handle::NULL), None);
    let forged = Handle::from_raw(h.into_raw() + (1 << 32));
    assert_eq!(arena.get(forged), None);
    assert_eq!(arena.get(Handle::from_raw(h.into_raw())), Some(&5));
}

#[test]
fn positional_access_is_bounds_checked() {
    let mut arena = SlotArena::with_capacity(2);
    arena.insert(1).unwrap();
    assert_eq!(
        arena.handle_at(3),
        Err(StoreError::PositionOutOfBounds { position: 3, len: 1 })
    );
}

#[test]
fn emplace_hands_back_the_stored_value() {
    let mut arena = SlotArena::new();
    let (h, v) = arena.emplace(vec![1, 2]).unwrap();
    v.push(3);
    assert_eq!(arena.read(h), Some(vec![1, 2, 3]));
    arena.as_mut_slice()[0].clear();
    assert_eq!(arena.get(h).map(Vec::len), Some(0));
}

#[test]
fn handles_stay_stale_across_clear_and_release() {
    let mut arena = SlotArena::new();
    let mut issued = Vec::new();
    for round in 0..3 {
        for v in 0..4 {
            issued.push(arena.insert(round * 10 + v).unwrap());
        }
        if round % 2 == 0 {
            arena.clear();
        } else {
            arena.release();
        }
        assert!(arena.is_empty());
        assert!(issued.iter().all(|&h| !arena.contains(h)));
    }
    // Indices are reused with fresh generations, never the old handles.
    let h = arena.insert(99).unwrap();
    assert!(h.index() < 4);
    assert!(!issued.contains(&h));
    assert_eq!(arena.get(h), Some(&99));
}
