//! An adaptive range-keyed B-tree mapping non-overlapping integer ranges to
//! values, with reader-concurrent lookup and single-writer mutation.
//!
//! The tree always fully partitions `[I::ZERO, I::MAX]`: every point in the
//! index space belongs to exactly one slot, occupied (`Some(value)`) or
//! vacant (`None`). Reads never block other reads; a mutation excludes
//! every reader and every other mutation for its duration (see
//! [`RangeTree`]'s doc for the concurrency model).

mod arena;
mod error;
mod flags;
mod gap;
mod index;
mod iter;
mod node;
mod store;

pub use error::{Error, Result};
pub use flags::TreeFlags;
pub use index::{Index, RangeInclusive};
pub use iter::{Cursor, Range, RangeRev};

use std::sync::RwLock;

use arena::{Arena, NodeId};
use node::Node;

/// Tree-wide mutable state, guarded as a single unit by [`RangeTree`]'s
/// lock.
///
/// Kept as a plain struct (rather than folded directly into `RangeTree`) so
/// that `crate::gap` and `crate::store` can each carry their half of the
/// tree's algorithms as an `impl<I, V> Inner<I, V>` block without fighting
/// over which module owns the lock.
pub(crate) struct Inner<I, V> {
    arena: Arena<Node<I, V>>,
    root: Option<NodeId>,
    height: u8,
    flags: TreeFlags,
}

impl<I: Index, V> Inner<I, V> {
    fn new(flags: TreeFlags) -> Self {
        Self {
            arena: Arena::new(),
            root: None,
            height: 0,
            flags,
        }
    }

    fn get(&self, key: I) -> Option<&V> {
        let root = self.root?;
        self.get_in_subtree(root, self.height, I::ZERO, I::MAX, key)
    }

    fn get_in_subtree(&self, id: NodeId, height: u8, min: I, max: I, key: I) -> Option<&V> {
        let n = self.arena.get(id);
        let pivots = n.pivots();
        let i = node::find_slot(pivots, key);
        if height == 0 {
            return n.leaf_slots()[i].as_ref();
        }
        let (clo, chi) = node::slot_bounds(pivots, i, min, max);
        self.get_in_subtree(n.children()[i], height - 1, clo, chi, key)
    }

    /// Walk the whole tree checking invariants 1-4 of SPEC_FULL.md §8:
    /// strictly increasing pivots, correct parent back-pointers, minimum
    /// occupancy on non-root nodes, and (in allocation mode) correct
    /// cached gaps.
    fn check_invariants(&self) {
        let Some(root) = self.root else { return };
        self.check_node(root, self.height, I::ZERO, I::MAX, None);
    }

    fn check_node(&self, id: NodeId, height: u8, min: I, max: I, parent: Option<node::Parent>) {
        let n = self.arena.get(id);
        assert_eq!(
            n.parent.map(|p| (p.node, p.slot)),
            parent.map(|p| (p.node, p.slot)),
            "parent back-pointer mismatch"
        );
        let pivots = n.pivots();
        for w in pivots.windows(2) {
            assert!(w[0] < w[1], "pivots must be strictly increasing");
        }
        if let Some(&last) = pivots.last() {
            assert!(last < max, "pivot must be below the node's implied max");
        }
        let is_root = self.root == Some(id);
        if !is_root {
            assert!(
                n.slot_count() >= node::MIN_SLOTS,
                "non-root node below minimum occupancy"
            );
        }
        if height == 0 {
            return;
        }
        let children = n.children();
        assert!(children.len() >= 2 || is_root, "internal node needs >= 2 children unless root");
        for (slot, &child) in children.iter().enumerate() {
            let (clo, chi) = node::slot_bounds(pivots, slot, min, max);
            self.check_node(
                child,
                height - 1,
                clo,
                chi,
                Some(node::Parent {
                    node: id,
                    slot: u8::try_from(slot).expect("child slot fits in u8"),
                }),
            );
        }
        if self.flags.contains(TreeFlags::ALLOCATION_MODE) {
            for (slot, &cached) in n.gaps().iter().enumerate() {
                let (clo, chi) = node::slot_bounds(pivots, slot, min, max);
                let actual = self.child_gap(children[slot], height - 1, clo, chi);
                assert_eq!(cached, actual, "cached gap out of date");
            }
        }
    }
}

/// An adaptive range-keyed tree over a fixed-width unsigned index space.
///
/// # Concurrency
///
/// Guarded by a single [`std::sync::RwLock`]: any number of readers may run
/// concurrently, but a mutation (`insert`, `store`, `erase`, `alloc_range`,
/// `alloc_rrange`, `clear`) excludes every other reader and writer for its
/// whole duration. See DESIGN.md for why this crate trades the original's
/// lock-free-read design for a zero-`unsafe` one.
pub struct RangeTree<I, V> {
    inner: RwLock<Inner<I, V>>,
}

impl<I: Index, V: Clone> Default for RangeTree<I, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I: Index, V: Clone> RangeTree<I, V> {
    /// A new, empty tree with allocation-mode gap tracking disabled.
    pub fn new() -> Self {
        Self::with_flags(TreeFlags::empty())
    }

    /// A new, empty tree with the given construction-time behavior flags.
    pub fn with_flags(flags: TreeFlags) -> Self {
        Self {
            inner: RwLock::new(Inner::new(flags)),
        }
    }

    /// Store `value` over `[first, last]`, failing with [`Error::Overlap`]
    /// if any part of that range is already occupied.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRange`] if `first > last`, [`Error::Overlap`]
    /// if the range is already (partially) occupied, or
    /// [`Error::OutOfMemory`] if the tree could not allocate the nodes this
    /// write requires.
    #[tracing::instrument(level = "debug", skip(self, value))]
    pub fn insert(&self, first: I, last: I, value: V) -> Result<()> {
        let mut inner = self.inner.write().expect("range-tree lock poisoned");
        inner.store_range(first, last, Some(value), true)
    }

    /// Store `value` over `[first, last]`, overwriting (and splitting, at
    /// the boundaries) whatever was there before.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRange`] if `first > last`, or
    /// [`Error::OutOfMemory`] if the tree could not allocate the nodes this
    /// write requires.
    #[tracing::instrument(level = "debug", skip(self, value))]
    pub fn store(&self, first: I, last: I, value: V) -> Result<()> {
        let mut inner = self.inner.write().expect("range-tree lock poisoned");
        inner.store_range(first, last, Some(value), false)
    }

    /// Clear `[first, last]` back to vacant.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRange`] if `first > last`, or
    /// [`Error::OutOfMemory`] if the tree could not allocate the nodes this
    /// write requires (erasing can still need a split, e.g. punching a hole
    /// in the middle of a single larger entry).
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn erase(&self, first: I, last: I) -> Result<()> {
        let mut inner = self.inner.write().expect("range-tree lock poisoned");
        inner.store_range(first, last, None, false)
    }

    /// The value stored at `key`, or `None` if `key` falls in a vacant
    /// slot.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn get(&self, key: I) -> Option<V> {
        let inner = self.inner.read().expect("range-tree lock poisoned");
        inner.get(key).cloned()
    }

    /// `true` if no part of `[first, last]` is occupied.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn is_vacant(&self, first: I, last: I) -> bool {
        let inner = self.inner.read().expect("range-tree lock poisoned");
        inner.is_vacant(first, last)
    }

    /// Find the lowest `start` such that `[start, start + size - 1]` lies
    /// within `[lo, hi]` and is entirely vacant, store `value` there, and
    /// return `start`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRange`] if `lo > hi` or `size == 0`,
    /// [`Error::NoFit`] if no such empty sub-range exists, or
    /// [`Error::OutOfMemory`] on allocation failure.
    #[tracing::instrument(level = "debug", skip(self, value))]
    pub fn alloc_range(&self, lo: I, hi: I, size: u128, value: V) -> Result<I> {
        ensure_range(lo, hi)?;
        let mut inner = self.inner.write().expect("range-tree lock poisoned");
        let start = inner.alloc_forward(lo, hi, size).ok_or(Error::NoFit)?;
        let end = add_size(start, size)?;
        inner.store_range(start, end, Some(value), true)?;
        Ok(start)
    }

    /// Symmetric to [`Self::alloc_range`], but finds the *highest* fit.
    ///
    /// # Errors
    ///
    /// Same as [`Self::alloc_range`].
    #[tracing::instrument(level = "debug", skip(self, value))]
    pub fn alloc_rrange(&self, lo: I, hi: I, size: u128, value: V) -> Result<I> {
        ensure_range(lo, hi)?;
        let mut inner = self.inner.write().expect("range-tree lock poisoned");
        let start = inner.alloc_reverse(lo, hi, size).ok_or(Error::NoFit)?;
        let end = add_size(start, size)?;
        inner.store_range(start, end, Some(value), true)?;
        Ok(start)
    }

    /// The longest vacant run anywhere in the tree.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn max_gap(&self) -> u128 {
        let inner = self.inner.read().expect("range-tree lock poisoned");
        match inner.root {
            Some(root) => inner.child_gap(root, inner.height, I::ZERO, I::MAX),
            None => I::MAX.span_len(I::ZERO),
        }
    }

    /// Discard every stored entry, returning the tree to empty.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn clear(&self) {
        let mut inner = self.inner.write().expect("range-tree lock poisoned");
        inner.arena.clear();
        inner.root = None;
        inner.height = 0;
    }

    /// Ascending iterator over occupied entries whose range intersects
    /// `[lo, hi]`.
    pub fn range(&self, lo: I, hi: I) -> Range<'_, I, V> {
        Range::new(self, lo, hi)
    }

    /// Descending iterator over occupied entries whose range intersects
    /// `[lo, hi]`.
    pub fn range_rev(&self, lo: I, hi: I) -> RangeRev<'_, I, V> {
        RangeRev::new(self, lo, hi)
    }

    /// Ascending iterator over every occupied entry.
    pub fn iter(&self) -> Range<'_, I, V> {
        self.range(I::ZERO, I::MAX)
    }

    /// A resumable query position, seekable in either direction.
    pub fn cursor(&self) -> Cursor<'_, I, V> {
        Cursor::new(self)
    }

    /// A new tree containing the same entries as this one.
    ///
    /// Realized by replaying every stored entry into a fresh tree rather
    /// than structurally cloning the arena node-for-node: this crate's
    /// nodes never need to be shared between trees (there is no original's
    /// copy-on-write duplication to preserve, see DESIGN.md), so the
    /// simpler replay is both correct and easier to get right.
    #[must_use]
    pub fn duplicate(&self) -> Self {
        let flags = self.inner.read().expect("range-tree lock poisoned").flags;
        let out = Self::with_flags(flags);
        for (lo, hi, v) in self.iter() {
            out.store(lo, hi, v).expect("replaying an existing tree's own entries cannot fail");
        }
        out
    }

    /// Walk the whole tree asserting testable properties 1-4 of
    /// SPEC_FULL.md §8 (pivot ordering, parent back-pointers, minimum
    /// occupancy, cached gaps). Exposed for tests and fuzz targets, not for
    /// production call sites.
    ///
    /// # Panics
    ///
    /// Panics if any invariant is violated.
    pub fn assert_valid(&self) {
        self.inner.read().expect("range-tree lock poisoned").check_invariants();
    }
}

impl<I: Index, V: Clone> Clone for RangeTree<I, V> {
    fn clone(&self) -> Self {
        self.duplicate()
    }
}

fn ensure_range<I: Index>(lo: I, hi: I) -> Result<()> {
    error::ensure!(lo <= hi, Error::InvalidRange);
    Ok(())
}

fn add_size<I: Index>(start: I, size: u128) -> Result<I> {
    error::ensure!(size > 0, Error::InvalidRange);
    let end = start
        .to_u128()
        .checked_add(size - 1)
        .and_then(I::from_u128)
        .ok_or(Error::InvalidRange)?;
    Ok(end)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_then_get_round_trips() {
        let tree: RangeTree<u32, &'static str> = RangeTree::new();
        tree.insert(10, 20, "hello").unwrap();
        assert_eq!(tree.get(15), Some("hello"));
        assert_eq!(tree.get(21), None);
    }

    #[test]
    fn insert_over_occupied_range_is_rejected() {
        let tree: RangeTree<u32, &'static str> = RangeTree::new();
        tree.insert(10, 20, "a").unwrap();
        assert_eq!(tree.insert(15, 25, "b"), Err(Error::Overlap));
        assert_eq!(tree.get(15), Some("a"));
    }

    #[test]
    fn store_overwrites_across_boundaries() {
        let tree: RangeTree<u32, &'static str> = RangeTree::new();
        tree.insert(10, 20, "a").unwrap();
        tree.store(15, 25, "b").unwrap();
        assert_eq!(tree.get(12), Some("a"));
        assert_eq!(tree.get(18), Some("b"));
        assert_eq!(tree.get(25), Some("b"));
    }

    #[test]
    fn erase_punches_a_hole() {
        let tree: RangeTree<u32, &'static str> = RangeTree::new();
        tree.insert(0, 99, "a").unwrap();
        tree.erase(40, 59).unwrap();
        assert_eq!(tree.get(39), Some("a"));
        assert_eq!(tree.get(40), None);
        assert_eq!(tree.get(59), None);
        assert_eq!(tree.get(60), Some("a"));
    }

    #[test]
    fn alloc_range_finds_lowest_fit_and_claims_it() {
        let tree: RangeTree<u32, &'static str> = RangeTree::new();
        tree.insert(0, 9, "a").unwrap();
        let start = tree.alloc_range(0, 99, 5, "b").unwrap();
        assert_eq!(start, 10);
        assert_eq!(tree.get(10), Some("b"));
        assert_eq!(tree.get(14), Some("b"));
    }

    #[test]
    fn alloc_rrange_finds_highest_fit() {
        let tree: RangeTree<u32, &'static str> = RangeTree::new();
        tree.insert(90, 99, "a").unwrap();
        let start = tree.alloc_rrange(0, 99, 5, "b").unwrap();
        assert_eq!(start, 85);
    }

    #[test]
    fn clear_empties_the_tree() {
        let tree: RangeTree<u32, &'static str> = RangeTree::new();
        tree.insert(0, 9, "a").unwrap();
        tree.clear();
        assert_eq!(tree.get(5), None);
        assert_eq!(tree.iter().count(), 0);
    }

    #[test]
    fn duplicate_copies_entries_independently() {
        let tree: RangeTree<u32, &'static str> = RangeTree::new();
        tree.insert(0, 9, "a").unwrap();
        let copy = tree.duplicate();
        tree.insert(10, 19, "b").unwrap();
        assert_eq!(copy.get(15), None);
        assert_eq!(copy.get(5), Some("a"));
    }
}
