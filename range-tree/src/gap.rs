//! Maximum-empty-gap tracking and the empty-area search it powers.
//!
//! A leaf's gap is recomputed by direct scan whenever the leaf is rewritten
//! (see `crate::store`); an internal node's `gaps[i]` is the max gap of the
//! subtree rooted at `children[i]`, which in allocation mode is read back out
//! of that child's own (already-finalized, because the rewrite walk is
//! bottom-up) gap state rather than rescanned.

use crate::TreeFlags;
use crate::index::Index;
use crate::node::{self, Node};

/// The longest run of empty slots in `node`, clipped to `[min, max]`.
///
/// Used both to populate an internal node's `gaps[i]` entry for a leaf child
/// and, outside allocation mode, as the exact (if `O(n)`) fallback the search
/// below falls back on.
pub(crate) fn leaf_max_gap<I: Index, V>(node: &Node<I, V>, min: I, max: I) -> u128 {
    let mut best = 0u128;
    let mut run_start: Option<I> = None;
    for i in 0..node.slot_count() {
        let (lo, hi) = node.slot_bounds(i, min, max);
        if node.leaf_slots()[i].is_some() {
            run_start = None;
            continue;
        }
        let start = run_start.unwrap_or(lo);
        run_start = Some(start);
        let len = hi.span_len(start);
        if len > best {
            best = len;
        }
    }
    best
}

/// Find the lowest `s` such that `[s, s + size - 1]` lies entirely within a
/// single empty run inside `node`, clipped to the query window `[lo, hi]`.
pub(crate) fn find_forward_leaf<I: Index, V>(
    node: &Node<I, V>,
    min: I,
    max: I,
    lo: I,
    hi: I,
    size: u128,
) -> Option<I> {
    let mut run_start: Option<I> = None;
    let mut run_end: Option<I> = None;
    for i in 0..node.slot_count() {
        let (slo, shi) = node.slot_bounds(i, min, max);
        if shi < lo {
            continue;
        }
        if slo > hi {
            break;
        }
        if node.leaf_slots()[i].is_some() {
            run_start = None;
            run_end = None;
            continue;
        }
        let clipped_lo = if slo < lo { lo } else { slo };
        let clipped_hi = if shi > hi { hi } else { shi };
        let start = run_start.unwrap_or(clipped_lo);
        run_start = Some(start);
        run_end = Some(clipped_hi);
        if clipped_hi.span_len(start) >= size {
            return Some(start);
        }
    }
    let _ = run_end;
    None
}

/// Symmetric to [`find_forward_leaf`], but returns the *highest* `s`.
pub(crate) fn find_reverse_leaf<I: Index, V>(
    node: &Node<I, V>,
    min: I,
    max: I,
    lo: I,
    hi: I,
    size: u128,
) -> Option<I> {
    let mut run_start: Option<I> = None;
    let mut run_end: Option<I> = None;
    for i in (0..node.slot_count()).rev() {
        let (slo, shi) = node.slot_bounds(i, min, max);
        if slo > hi {
            continue;
        }
        if shi < lo {
            break;
        }
        if node.leaf_slots()[i].is_some() {
            run_start = None;
            run_end = None;
            continue;
        }
        let clipped_lo = if slo < lo { lo } else { slo };
        let clipped_hi = if shi > hi { hi } else { shi };
        let end = run_end.unwrap_or(clipped_hi);
        run_end = Some(end);
        run_start = Some(clipped_lo);
        if end.span_len(clipped_lo) >= size {
            let start = end.to_u128().checked_sub(size - 1)?;
            return I::from_u128(start);
        }
    }
    let _ = run_start;
    None
}

impl<I: Index, V> crate::Inner<I, V> {
    /// The max empty-gap size anywhere within the subtree rooted at `id`,
    /// whose implied bounds are `[min, max]`.
    ///
    /// In allocation mode, internal nodes answer this from their own
    /// (already up to date) `gaps` array in `O(children)`; otherwise every
    /// call rescans the subtree, which is correct but `O(subtree size)`.
    pub(crate) fn child_gap(&self, id: crate::arena::NodeId, height: u8, min: I, max: I) -> u128 {
        if height == 0 {
            return leaf_max_gap(self.arena.get(id), min, max);
        }
        let node = self.arena.get(id);
        if self.flags.contains(TreeFlags::ALLOCATION_MODE) {
            return node.gaps().iter().copied().max().unwrap_or(0);
        }
        let pivots = node.pivots();
        let children = node.children();
        let mut best = 0u128;
        for i in 0..children.len() {
            let (lo, hi) = node::slot_bounds(pivots, i, min, max);
            let g = self.child_gap(children[i], height - 1, lo, hi);
            if g > best {
                best = g;
            }
        }
        best
    }

    pub(crate) fn alloc_forward(&self, lo: I, hi: I, size: u128) -> Option<I> {
        if lo > hi || size == 0 {
            return None;
        }
        let Some(root) = self.root else {
            return if hi.span_len(lo) >= size { Some(lo) } else { None };
        };
        self.alloc_forward_node(root, self.height, I::ZERO, I::MAX, lo, hi, size)
    }

    fn alloc_forward_node(
        &self,
        id: crate::arena::NodeId,
        height: u8,
        min: I,
        max: I,
        lo: I,
        hi: I,
        size: u128,
    ) -> Option<I> {
        if lo > hi {
            return None;
        }
        let node = self.arena.get(id);
        if height == 0 {
            return find_forward_leaf(node, min, max, lo, hi, size);
        }
        let pivots = node.pivots();
        let children = node.children();
        let start_i = node::find_slot(pivots, lo);
        for i in start_i..children.len() {
            let (clo, chi) = node::slot_bounds(pivots, i, min, max);
            if clo > hi {
                break;
            }
            let fully_covered = clo >= lo && chi <= hi;
            if fully_covered {
                let g = self.child_gap(children[i], height - 1, clo, chi);
                if g < size {
                    continue;
                }
            }
            let eff_lo = if clo < lo { lo } else { clo };
            let eff_hi = if chi > hi { hi } else { chi };
            if let Some(found) =
                self.alloc_forward_node(children[i], height - 1, clo, chi, eff_lo, eff_hi, size)
            {
                return Some(found);
            }
        }
        None
    }

    pub(crate) fn alloc_reverse(&self, lo: I, hi: I, size: u128) -> Option<I> {
        if lo > hi || size == 0 {
            return None;
        }
        let Some(root) = self.root else {
            return if hi.span_len(lo) >= size {
                let start = hi.to_u128().checked_sub(size - 1)?;
                I::from_u128(start)
            } else {
                None
            };
        };
        self.alloc_reverse_node(root, self.height, I::ZERO, I::MAX, lo, hi, size)
    }

    fn alloc_reverse_node(
        &self,
        id: crate::arena::NodeId,
        height: u8,
        min: I,
        max: I,
        lo: I,
        hi: I,
        size: u128,
    ) -> Option<I> {
        if lo > hi {
            return None;
        }
        let node = self.arena.get(id);
        if height == 0 {
            return find_reverse_leaf(node, min, max, lo, hi, size);
        }
        let pivots = node.pivots();
        let children = node.children();
        let start_i = node::find_slot(pivots, hi);
        for i in (0..=start_i.min(children.len().saturating_sub(1))).rev() {
            let (clo, chi) = node::slot_bounds(pivots, i, min, max);
            if chi < lo {
                break;
            }
            let fully_covered = clo >= lo && chi <= hi;
            if fully_covered {
                let g = self.child_gap(children[i], height - 1, clo, chi);
                if g < size {
                    continue;
                }
            }
            let eff_lo = if clo < lo { lo } else { clo };
            let eff_hi = if chi > hi { hi } else { chi };
            if let Some(found) =
                self.alloc_reverse_node(children[i], height - 1, clo, chi, eff_lo, eff_hi, size)
            {
                return Some(found);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeData;
    use arrayvec::ArrayVec;

    fn leaf(entries: &[(u32, Option<&'static str>)], max: u32) -> Node<u32, &'static str> {
        let mut pivots: ArrayVec<u32, { crate::node::PIVOT_BUF_CAPACITY }> = ArrayVec::new();
        let mut slots: ArrayVec<Option<&'static str>, { crate::node::BUF_CAPACITY }> = ArrayVec::new();
        for (i, (pivot, value)) in entries.iter().enumerate() {
            if i + 1 < entries.len() {
                pivots.push(*pivot);
            } else {
                debug_assert_eq!(*pivot, max);
            }
            slots.push(*value);
        }
        Node {
            parent: None,
            data: NodeData::Leaf { pivots, slots },
        }
    }

    #[test]
    fn leaf_gap_finds_largest_empty_run() {
        let node = leaf(&[(9, None), (19, Some("a")), (99, None)], 99);
        assert_eq!(leaf_max_gap(&node, 0, 99), 80);
    }

    #[test]
    fn forward_search_returns_lowest_fit() {
        let node = leaf(&[(9, None), (19, Some("a")), (99, None)], 99);
        assert_eq!(find_forward_leaf(&node, 0, 99, 0, 99, 10), Some(0));
        assert_eq!(find_forward_leaf(&node, 0, 99, 0, 99, 11), Some(20));
    }

    #[test]
    fn reverse_search_returns_highest_fit() {
        let node = leaf(&[(9, None), (19, Some("a")), (99, None)], 99);
        assert_eq!(find_reverse_leaf(&node, 0, 99, 0, 99, 10), Some(90));
    }
}
