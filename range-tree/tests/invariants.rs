//! Property-based sweeps, adapted from the retrieval pack's own
//! `range-tree` crate (`tests/proptest.rs`): generate a batch of disjoint
//! ranges, insert them in a random order, and check both structural
//! invariants (`RangeTree::assert_valid`) and the round-trip property
//! (testable property 7) against a `Vec` oracle after every insert.

use proptest::prelude::*;
use range_tree::{RangeTree, TreeFlags};

fn disjoint_ranges() -> impl Strategy<Value = Vec<(u32, u32)>> {
    proptest::collection::vec((0u32..200, 0u32..30), 1..60).prop_map(|gaps_and_sizes| {
        let mut ranges = Vec::with_capacity(gaps_and_sizes.len());
        let mut cursor: u32 = 0;
        for (gap, size) in gaps_and_sizes {
            let start = cursor.saturating_add(gap);
            let end = start.saturating_add(size);
            if end >= u32::MAX - 1 {
                break;
            }
            ranges.push((start, end));
            cursor = end + 1;
        }
        ranges
    })
}

/// A deterministic Fisher-Yates shuffle of `0..n`, keyed on `seed`.
///
/// proptest's generated `u64` seed isn't an RNG by itself, so this derives
/// a permutation from repeated linear-congruential steps.
fn shuffled_indices(n: usize, seed: u64) -> Vec<usize> {
    let mut order: Vec<usize> = (0..n).collect();
    let mut state = seed.wrapping_mul(6364136223846793005).wrapping_add(1);
    for i in (1..order.len()).rev() {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
        let j = usize::try_from(state >> 33).expect("shifted state fits in usize") % (i + 1);
        order.swap(i, j);
    }
    order
}

proptest! {
    #[test]
    fn insert_in_random_order_round_trips(ranges in disjoint_ranges(), seed in any::<u64>()) {
        let tree: RangeTree<u32, usize> = RangeTree::new();
        let order = shuffled_indices(ranges.len(), seed);

        for &idx in &order {
            let (start, end) = ranges[idx];
            tree.insert(start, end, idx).unwrap();
            tree.assert_valid();
        }

        let mut expected: Vec<_> = order.iter().map(|&idx| ranges[idx]).collect();
        expected.sort_unstable();
        let got: Vec<_> = tree.iter().map(|(lo, hi, _)| (lo, hi)).collect();
        prop_assert_eq!(got, expected);

        for &idx in &order {
            let (start, end) = ranges[idx];
            prop_assert_eq!(tree.get(start), Some(idx));
            prop_assert_eq!(tree.get(end), Some(idx));
        }
    }

    #[test]
    fn allocation_mode_gaps_stay_consistent(ranges in disjoint_ranges()) {
        let tree: RangeTree<u32, ()> = RangeTree::with_flags(TreeFlags::ALLOCATION_MODE);
        for &(start, end) in &ranges {
            tree.store(start, end, ()).unwrap();
            tree.assert_valid();
        }
    }

    #[test]
    fn erasing_every_range_empties_the_tree(ranges in disjoint_ranges()) {
        let tree: RangeTree<u32, usize> = RangeTree::new();
        for (idx, &(start, end)) in ranges.iter().enumerate() {
            tree.store(start, end, idx).unwrap();
        }
        tree.assert_valid();

        for &(start, end) in &ranges {
            tree.erase(start, end).unwrap();
            tree.assert_valid();
            prop_assert_eq!(tree.get(start), None);
        }
        prop_assert_eq!(tree.iter().count(), 0);
    }

    #[test]
    fn store_is_idempotent(ranges in disjoint_ranges()) {
        let tree: RangeTree<u32, usize> = RangeTree::new();
        for (idx, &(start, end)) in ranges.iter().enumerate() {
            tree.store(start, end, idx).unwrap();
        }
        let before: Vec<_> = tree.iter().collect();
        for (idx, &(start, end)) in ranges.iter().enumerate() {
            tree.store(start, end, idx).unwrap();
        }
        let after: Vec<_> = tree.iter().collect();
        prop_assert_eq!(before, after);
        tree.assert_valid();
    }
}
