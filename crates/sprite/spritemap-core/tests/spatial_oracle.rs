use std::collections::BTreeSet;

use proptest::prelude::*;
use spritemap_core::config::SpatialConfig;
use spritemap_core::{LooseQuadTree, Rect};

const ROOT: Rect = Rect {
    x0: 0.0,
    y0: 0.0,
    x1: 1000.0,
    y1: 1000.0,
};

fn arb_rect() -> impl Strategy<Value = Rect> {
    (0.0..990.0f64, 0.0..990.0f64, 0.0..120.0f64, 0.0..120.0f64).prop_map(|(x, y, w, h)| {
        Rect::new(x, y, (x + w).min(1000.0), (y + h).min(1000.0))
    })
}

#[derive(Clone, Debug)]
enum Op {
    Add(Rect),
    Remove(usize),
    Move(usize, Rect),
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => arb_rect().prop_map(Op::Add),
        1 => any::<usize>().prop_map(Op::Remove),
        2 => (any::<usize>(), arb_rect()).prop_map(|(i, r)| Op::Move(i, r)),
    ]
}

fn small_nodes() -> SpatialConfig {
    SpatialConfig {
        looseness: 1.5,
        max_items_per_node: 4,
        max_depth: 6,
    }
}

proptest! {
    /// Lookups return exactly the items a brute-force overlap scan finds,
    /// after any interleaving of adds, removes and moves.
    #[test]
    fn lookup_matches_brute_force(
        ops in prop::collection::vec(arb_op(), 1..120),
        queries in prop::collection::vec(arb_rect(), 1..12),
    ) {
        let mut tree = LooseQuadTree::new(ROOT, &small_nodes());
        // (key, rect, payload) mirror of what the tree should hold
        let mut live = Vec::new();
        let mut next_payload = 0u32;

        for op in ops {
            match op {
                Op::Add(rect) => {
                    let key = tree.add(rect, next_payload).expect("rect inside root");
                    live.push((key, rect, next_payload));
                    next_payload += 1;
                }
                Op::Remove(i) if !live.is_empty() => {
                    let (key, rect, _) = live.swap_remove(i % live.len());
                    prop_assert!(tree.remove(key, &rect));
                    prop_assert!(tree.get(key).is_none());
                }
                Op::Move(i, new_rect) if !live.is_empty() => {
                    let idx = i % live.len();
                    let (key, old, _) = live[idx];
                    prop_assert!(tree.update(key, &old, new_rect));
                    live[idx].1 = new_rect;
                }
                _ => {}
            }
        }

        prop_assert_eq!(tree.len(), live.len());
        for query in &queries {
            let found: BTreeSet<u32> = tree.lookup(query).iter().map(|(_, item)| item.payload).collect();
            let expected: BTreeSet<u32> = live
                .iter()
                .filter(|(_, rect, _)| rect.overlaps(query))
                .map(|(_, _, payload)| *payload)
                .collect();
            prop_assert_eq!(found, expected);
        }
    }
}

#[test]
fn mismatched_old_rect_leaves_tree_untouched() {
    let mut tree = LooseQuadTree::new(ROOT, &small_nodes());
    let rect = Rect::new(10.0, 10.0, 20.0, 20.0);
    let key = tree.add(rect, "a").expect("add");

    let wrong = Rect::new(11.0, 10.0, 20.0, 20.0);
    assert!(!tree.remove(key, &wrong));
    assert!(!tree.update(key, &wrong, Rect::new(500.0, 500.0, 510.0, 510.0)));

    let item = tree.get(key).expect("still present");
    assert_eq!(item.rect, rect);
    assert_eq!(tree.lookup(&Rect::new(15.0, 15.0, 16.0, 16.0)).len(), 1);
}

#[test]
fn out_of_bounds_rects_are_rejected() {
    let mut tree: LooseQuadTree<()> = LooseQuadTree::new(ROOT, &small_nodes());
    assert!(tree.add(Rect::new(990.0, 990.0, 1010.0, 1000.0), ()).is_err());
    assert!(tree.add(Rect::new(f64::NAN, 0.0, 1.0, 1.0), ()).is_err());

    let key = tree.add(Rect::new(0.0, 0.0, 1.0, 1.0), ()).expect("add");
    assert!(!tree.update(
        key,
        &Rect::new(0.0, 0.0, 1.0, 1.0),
        Rect::new(-5.0, 0.0, 1.0, 1.0)
    ));
    assert!(tree.get(key).is_some());
}

#[test]
fn stale_keys_do_not_reach_new_items() {
    let mut tree = LooseQuadTree::new(ROOT, &small_nodes());
    let rect = Rect::new(1.0, 1.0, 2.0, 2.0);
    let old = tree.add(rect, 1).expect("add");
    assert!(tree.remove(old, &rect));
    let new = tree.add(rect, 2).expect("add");
    assert_ne!(old, new);
    assert!(tree.get(old).is_none());
    assert!(!tree.remove(old, &rect));
    assert_eq!(tree.get(new).map(|item| item.payload), Some(2));
}
