//! Criterion comparisons against `BTreeMap`, adapted from the retrieval
//! pack's own `range-tree` crate (`benches/comparisons.rs`): that benchmark
//! additionally compares against a couple of sibling intrusive-tree crates
//! this workspace doesn't carry, so this version keeps just the `BTreeMap`
//! baseline and adds a point-lookup comparison the original left commented
//! out.

use std::collections::BTreeMap;
use std::hint::black_box;
use std::ops::Range;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use rand::Rng;
use rand::distr::Uniform;
use rand::seq::SliceRandom;
use range_tree::RangeTree;

pub const KIB: u64 = 1024;
pub const MIB: u64 = KIB * 1024;

fn btreemap_insertions(insertions: &[Range<u64>]) {
    let mut map: BTreeMap<u64, (u64, u8)> = BTreeMap::new();
    for range in insertions {
        map.insert(range.end, (range.start, 0u8));
    }
    black_box(map);
}

fn range_tree_insertions(insertions: &[Range<u64>]) {
    let tree: RangeTree<u64, u8> = RangeTree::new();
    for range in insertions {
        tree.insert(range.start, range.end, 0u8).unwrap();
    }
    black_box(tree);
}

fn bench_insertions(c: &mut Criterion) {
    let mut rng = rand::rng();

    let mut group = c.benchmark_group("Insertions");
    for num_entries in (10..10_000).step_by(1000) {
        let mut ranges = (0..num_entries * 2 * MIB)
            .step_by(usize::try_from(2 * MIB).expect("2 MiB fits in usize"))
            .map(|base| base..base + rng.sample(Uniform::new(0, 2 * MIB).unwrap()))
            .collect::<Vec<_>>();
        ranges.shuffle(&mut rng);

        group.bench_with_input(BenchmarkId::new("BTreeMap", num_entries), ranges.as_slice(), |b, ranges| {
            b.iter(|| btreemap_insertions(ranges));
        });
        group.bench_with_input(BenchmarkId::new("RangeTree", num_entries), ranges.as_slice(), |b, ranges| {
            b.iter(|| range_tree_insertions(ranges));
        });
    }
    group.finish();
}

fn btreemap_lookups(map: &BTreeMap<u64, (u64, u8)>, lookups: &[u64]) {
    for lookup in lookups {
        let (_end, (start, _flags)) = map.range(lookup..).next().unwrap();
        black_box(lookup.checked_sub(*start).unwrap());
    }
}

fn range_tree_lookups(tree: &RangeTree<u64, u8>, lookups: &[u64]) {
    for lookup in lookups {
        black_box(tree.get(*lookup).unwrap());
    }
}

fn bench_lookups(c: &mut Criterion) {
    let mut rng = rand::rng();

    let mut group = c.benchmark_group("Lookups");
    for num_entries in (10..10_000).step_by(1000) {
        let mut ranges = (0..num_entries * 2 * MIB)
            .step_by(usize::try_from(2 * MIB).expect("2 MiB fits in usize"))
            .map(|base| base..base + rng.sample(Uniform::new(0, 2 * MIB).unwrap()))
            .collect::<Vec<_>>();
        ranges.shuffle(&mut rng);

        let mut lookups = Vec::new();
        for range in &ranges {
            if range.start < range.end {
                lookups.push(rng.sample(Uniform::new(range.start, range.end).unwrap()));
            }
        }

        let btreemap: BTreeMap<u64, (u64, u8)> =
            ranges.iter().map(|range| (range.end, (range.start, 0u8))).collect();
        group.bench_with_input(BenchmarkId::new("BTreeMap", num_entries), &lookups, |b, lookups| {
            b.iter(|| btreemap_lookups(&btreemap, lookups));
        });

        let tree: RangeTree<u64, u8> = RangeTree::new();
        for range in &ranges {
            tree.insert(range.start, range.end, 0u8).unwrap();
        }
        group.bench_with_input(BenchmarkId::new("RangeTree", num_entries), &lookups, |b, lookups| {
            b.iter(|| range_tree_lookups(&tree, lookups));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_insertions, bench_lookups);
criterion_main!(benches);
