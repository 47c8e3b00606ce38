//! The mutating write path: range store (insert/overwrite/erase).
//!
//! A write that lands entirely inside one leaf is handled directly there
//! (`store_leaf`), splitting the leaf if it overflows. A write whose range
//! crosses more than one of a node's children (`store_spanning`) is handled
//! by flattening the affected boundary children and the new entry into one
//! run list and rebuilding a single replacement subtree from it, which is
//! this crate's equivalent of the spec's "spanning-store engine" (see
//! SPEC_FULL.md §4.5.1). Every rewrite propagates split/underflow feedback
//! to its parent via [`Outcome`], which borrows from or merges with a
//! sibling to restore the occupancy invariant before ascending further.

use arrayvec::ArrayVec;

use crate::TreeFlags;
use crate::arena::NodeId;
use crate::error::{Error, Result, ensure};
use crate::index::Index;
use crate::node::{self, BUF_CAPACITY, CAPACITY, MIN_SLOTS, Node, NodeData, PIVOT_BUF_CAPACITY, Parent};

/// What a subtree rewrite reports back to the level above it.
pub(crate) enum Outcome<I> {
    /// The subtree's own slot count is within bounds; nothing further to do.
    Done,
    /// The subtree split in two; the parent must insert `right` as a new
    /// sibling immediately after the original child, with `split_key` as the
    /// new pivot between them.
    Split { right: NodeId, split_key: I },
    /// The subtree now holds fewer than `MIN_SLOTS` occupied slots; the
    /// parent must borrow from or merge it with an adjacent sibling.
    Underflow,
}

#[derive(Clone, Copy)]
enum FlattenSide<I> {
    /// Keep entries below `I`, trimming the one straddling the boundary.
    Below(I),
    /// Keep entries above `I`, trimming the one straddling the boundary.
    Above(I),
}

enum PairOutcome<I> {
    Merged,
    Redistributed { new_boundary: I },
}

/// Append `(upper, val)`, coalescing with a preceding `None` run.
fn push_merge<I: Index, V>(out: &mut Vec<(I, Option<V>)>, upper: I, val: Option<V>) {
    if val.is_none() {
        if let Some(last) = out.last_mut() {
            if last.1.is_none() {
                last.0 = upper;
                return;
            }
        }
    }
    out.push((upper, val));
}

/// Rebuild one leaf's slot list after applying `[first, last] = value`.
///
/// `pivots`/`slots` are the leaf's content before the write; `min`/`max` are
/// its implied bounds. The write is assumed to fall entirely within
/// `[min, max]`. Adjacent `None` runs left behind by a trimmed slot are
/// coalesced (`extend_null` in the spec's vocabulary).
fn rebuild_leaf_slots<I: Index, V: Clone>(
    pivots: &[I],
    slots: Vec<Option<V>>,
    min: I,
    max: I,
    first: I,
    last: I,
    value: Option<V>,
) -> Vec<(I, Option<V>)> {
    let mut out = Vec::with_capacity(slots.len() + 2);
    let mut inserted = false;
    for (i, val) in slots.into_iter().enumerate() {
        let (slo, shi) = node::slot_bounds(pivots, i, min, max);
        if shi < first {
            push_merge(&mut out, shi, val);
            continue;
        }
        if slo > last {
            if !inserted {
                push_merge(&mut out, last, value.clone());
                inserted = true;
            }
            push_merge(&mut out, shi, val);
            continue;
        }
        // This slot overlaps [first, last].
        if slo < first {
            let residue_end = first.checked_sub(1).expect("slo < first implies first > min");
            push_merge(&mut out, residue_end, val.clone());
        }
        if shi > last {
            if !inserted {
                push_merge(&mut out, last, value.clone());
                inserted = true;
            }
            push_merge(&mut out, shi, val);
        }
        // Otherwise the slot is fully consumed by the write; drop it.
    }
    if !inserted {
        push_merge(&mut out, last, value);
    }
    out
}

impl<I: Index, V: Clone> crate::Inner<I, V> {
    /// Store `value` (or erase, if `None`) over `[first, last]`.
    ///
    /// `require_vacant` implements `insert`'s `-EEXIST` semantics: it is
    /// checked as a read-only pre-pass before any mutation begins, so a
    /// rejected insert never touches the tree (§7: "a partial spanning store
    /// that fails mid-build leaves the old tree untouched").
    pub(crate) fn store_range(
        &mut self,
        first: I,
        last: I,
        value: Option<V>,
        require_vacant: bool,
    ) -> Result<()> {
        ensure!(first <= last, Error::InvalidRange);
        if require_vacant && value.is_some() && self.is_vacant_check_fails(first, last) {
            return Err(Error::Overlap);
        }
        let Some(root) = self.root else {
            let new_root = self.build_subtree_from_runs(vec![(last, value)], 0)?;
            self.root = Some(new_root);
            self.height = 0;
            return Ok(());
        };
        match self.store_subtree(root, self.height, I::ZERO, I::MAX, first, last, value)? {
            Outcome::Done => {}
            Outcome::Split { right, split_key } => self.grow_root(split_key, right)?,
            Outcome::Underflow => self.maybe_demote(),
        }
        Ok(())
    }

    /// `true` if any occupied slot overlaps `[first, last]`.
    fn is_vacant_check_fails(&self, first: I, last: I) -> bool {
        !self.is_vacant(first, last)
    }

    pub(crate) fn is_vacant(&self, first: I, last: I) -> bool {
        let Some(root) = self.root else {
            return true;
        };
        self.is_vacant_subtree(root, self.height, I::ZERO, I::MAX, first, last)
    }

    fn is_vacant_subtree(&self, id: NodeId, height: u8, min: I, max: I, first: I, last: I) -> bool {
        let node = self.arena.get(id);
        let pivots = node.pivots();
        if height == 0 {
            for i in 0..node.slot_count() {
                let (slo, shi) = node::slot_bounds(pivots, i, min, max);
                if shi < first || slo > last {
                    continue;
                }
                if node.leaf_slots()[i].is_some() {
                    return false;
                }
            }
            return true;
        }
        let children = node.children();
        let start_i = node::find_slot(pivots, first);
        let end_i = node::find_slot(pivots, last);
        for i in start_i..=end_i {
            let (clo, chi) = node::slot_bounds(pivots, i, min, max);
            if !self.is_vacant_subtree(children[i], height - 1, clo, chi, first, last) {
                return false;
            }
        }
        true
    }

    fn store_subtree(
        &mut self,
        id: NodeId,
        height: u8,
        min: I,
        max: I,
        first: I,
        last: I,
        value: Option<V>,
    ) -> Result<Outcome<I>> {
        if height == 0 {
            self.store_leaf(id, min, max, first, last, value)
        } else {
            self.store_internal(id, height, min, max, first, last, value)
        }
    }

    fn store_leaf(
        &mut self,
        id: NodeId,
        min: I,
        max: I,
        first: I,
        last: I,
        value: Option<V>,
    ) -> Result<Outcome<I>> {
        let pivots = self.arena.get(id).pivots().to_vec();
        let slots: Vec<Option<V>> = self.arena.get_mut(id).leaf_slots_mut().drain(..).collect();
        let rebuilt = rebuild_leaf_slots(&pivots, slots, min, max, first, last, value);
        self.write_leaf(id, rebuilt)
    }

    fn write_leaf(&mut self, id: NodeId, rebuilt: Vec<(I, Option<V>)>) -> Result<Outcome<I>> {
        if rebuilt.len() <= CAPACITY {
            let count = rebuilt.len();
            self.install_leaf(id, rebuilt);
            return Ok(if count < MIN_SLOTS {
                Outcome::Underflow
            } else {
                Outcome::Done
            });
        }
        self.arena.try_reserve(1)?;
        let split_at = rebuilt.len() / 2;
        let split_key = rebuilt[split_at - 1].0;
        let mut iter = rebuilt.into_iter();
        let left: Vec<(I, Option<V>)> = (&mut iter).take(split_at).collect();
        let right: Vec<(I, Option<V>)> = iter.collect();
        self.install_leaf(id, left);
        let right_id = self.arena.insert(Node::new_leaf());
        self.install_leaf(right_id, right);
        Ok(Outcome::Split {
            right: right_id,
            split_key,
        })
    }

    fn install_leaf(&mut self, id: NodeId, entries: Vec<(I, Option<V>)>) {
        let len = entries.len();
        let mut pivots: ArrayVec<I, PIVOT_BUF_CAPACITY> = ArrayVec::new();
        let mut slots: ArrayVec<Option<V>, BUF_CAPACITY> = ArrayVec::new();
        for (i, (pivot, val)) in entries.into_iter().enumerate() {
            if i + 1 < len {
                pivots.push(pivot);
            }
            slots.push(val);
        }
        self.arena.get_mut(id).data = NodeData::Leaf { pivots, slots };
    }

    fn store_internal(
        &mut self,
        id: NodeId,
        height: u8,
        min: I,
        max: I,
        first: I,
        last: I,
        value: Option<V>,
    ) -> Result<Outcome<I>> {
        let pivots = self.arena.get(id).pivots().to_vec();
        let children: Vec<NodeId> = self.arena.get(id).children().iter().copied().collect();
        let start_i = node::find_slot(&pivots, first);
        let end_i = node::find_slot(&pivots, last);
        if start_i == end_i {
            let (clo, chi) = node::slot_bounds(&pivots, start_i, min, max);
            let outcome = self.store_subtree(children[start_i], height - 1, clo, chi, first, last, value)?;
            self.apply_child_outcome(id, height, min, max, start_i, outcome)
        } else {
            self.store_spanning(id, height, min, max, &pivots, &children, start_i, end_i, first, last, value)
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn store_spanning(
        &mut self,
        id: NodeId,
        height: u8,
        min: I,
        max: I,
        pivots: &[I],
        children: &[NodeId],
        start_i: usize,
        end_i: usize,
        first: I,
        last: I,
        value: Option<V>,
    ) -> Result<Outcome<I>> {
        let (s_min, s_max) = node::slot_bounds(pivots, start_i, min, max);
        let (e_min, e_max) = node::slot_bounds(pivots, end_i, min, max);
        let mut runs: Vec<(I, Option<V>)> = Vec::new();
        self.flatten_side(children[start_i], height - 1, s_min, s_max, FlattenSide::Below(first), &mut runs);
        runs.push((last, value));
        self.flatten_side(children[end_i], height - 1, e_min, e_max, FlattenSide::Above(last), &mut runs);
        for &mid in &children[start_i + 1..end_i] {
            self.free_subtree(mid, height - 1);
        }
        // `runs` can hold up to roughly twice a node's capacity (both
        // boundary children's kept residues plus the new entry), so it does
        // not always fit back into a single node at `height - 1`: this is
        // the three-way split the spec's §4.5 describes. `build_forest_from_runs`
        // returns however many siblings (bounded at three) are needed to
        // hold it at exactly that height, and they are spliced in here in
        // place of the whole spanned range; if that overflows this node's
        // own capacity, `finish_node` below reports `Outcome::Split` to the
        // caller exactly as a single-child split would.
        let replacement = self.build_forest_from_runs(runs, height - 1)?;
        {
            let node = self.arena.get_mut(id);
            for _ in start_i..end_i {
                node.pivots_mut().remove(start_i);
            }
            for _ in start_i..=end_i {
                node.children_mut().remove(start_i);
                if let NodeData::Internal { gaps, .. } = &mut node.data {
                    gaps.remove(start_i);
                }
            }
            for (offset, &(child, _)) in replacement.iter().enumerate() {
                node.children_mut().insert(start_i + offset, child);
                if let NodeData::Internal { gaps, .. } = &mut node.data {
                    gaps.insert(start_i + offset, 0);
                }
            }
            for (offset, &(_, upper)) in replacement[..replacement.len() - 1].iter().enumerate() {
                node.pivots_mut().insert(start_i + offset, upper);
            }
        }
        self.fix_children_parents(id);
        self.finish_node(id, height, min, max)
    }

    fn apply_child_outcome(
        &mut self,
        id: NodeId,
        height: u8,
        min: I,
        max: I,
        idx: usize,
        outcome: Outcome<I>,
    ) -> Result<Outcome<I>> {
        match outcome {
            Outcome::Done => {}
            Outcome::Split { right, split_key } => {
                self.arena.try_reserve(1)?;
                let node = self.arena.get_mut(id);
                node.pivots_mut().insert(idx, split_key);
                node.children_mut().insert(idx + 1, right);
                if let NodeData::Internal { gaps, .. } = &mut node.data {
                    gaps.insert(idx + 1, 0);
                }
                self.fix_children_parents(id);
            }
            Outcome::Underflow => self.fix_underflow_child(id, height, min, max, idx)?,
        }
        self.finish_node(id, height, min, max)
    }

    fn fix_underflow_child(&mut self, parent: NodeId, height: u8, min: I, max: I, idx: usize) -> Result<()> {
        let pivots = self.arena.get(parent).pivots().to_vec();
        let children: Vec<NodeId> = self.arena.get(parent).children().iter().copied().collect();
        if children.len() <= 1 {
            // No sibling to borrow from or merge with; the occupancy
            // invariant's single-child exception applies (resolved up the
            // spine on the next mutation, or demoted if this is the root).
            return Ok(());
        }
        let (left_idx, right_idx) = if idx > 0 { (idx - 1, idx) } else { (idx, idx + 1) };
        let l_id = children[left_idx];
        let r_id = children[right_idx];
        let (l_min, l_max) = node::slot_bounds(&pivots, left_idx, min, max);
        let (_, r_max) = node::slot_bounds(&pivots, right_idx, min, max);
        let child_height = height - 1;
        let outcome = if child_height == 0 {
            self.rebalance_leaf_pair(l_id, r_id, l_max)
        } else {
            self.rebalance_internal_pair(l_id, r_id, child_height, l_max, l_min, r_max)
        };
        match outcome {
            PairOutcome::Merged => {
                let node = self.arena.get_mut(parent);
                node.children_mut().remove(right_idx);
                node.pivots_mut().remove(left_idx);
                if let NodeData::Internal { gaps, .. } = &mut node.data {
                    gaps.remove(right_idx);
                }
                self.fix_children_parents(parent);
            }
            PairOutcome::Redistributed { new_boundary } => {
                self.arena.get_mut(parent).pivots_mut()[left_idx] = new_boundary;
            }
        }
        Ok(())
    }

    fn rebalance_leaf_pair(&mut self, left: NodeId, right: NodeId, lmax: I) -> PairOutcome<I> {
        let mut pivots: Vec<I> = self.arena.get(left).pivots().to_vec();
        pivots.push(lmax);
        pivots.extend_from_slice(self.arena.get(right).pivots());
        let l_slots: Vec<Option<V>> = self.arena.get_mut(left).leaf_slots_mut().drain(..).collect();
        let r_slots: Vec<Option<V>> = self.arena.get_mut(right).leaf_slots_mut().drain(..).collect();
        let mut slots = l_slots;
        slots.extend(r_slots);
        let total = slots.len();
        if total <= CAPACITY {
            self.install_leaf(left, pivots.into_iter().zip(slots).collect());
            self.arena.remove(right);
            PairOutcome::Merged
        } else {
            let split_at = total / 2;
            let new_boundary = pivots[split_at - 1];
            let mut piv_iter = pivots.into_iter();
            let left_pivots: Vec<I> = (&mut piv_iter).take(split_at - 1).collect();
            let right_pivots: Vec<I> = piv_iter.collect();
            let mut slot_iter = slots.into_iter();
            let left_slots: Vec<Option<V>> = (&mut slot_iter).take(split_at).collect();
            let right_slots: Vec<Option<V>> = slot_iter.collect();
            self.install_leaf(left, left_pivots.into_iter().zip(left_slots).collect());
            self.install_leaf(right, right_pivots.into_iter().zip(right_slots).collect());
            PairOutcome::Redistributed { new_boundary }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn rebalance_internal_pair(
        &mut self,
        left: NodeId,
        right: NodeId,
        height: u8,
        lmax: I,
        l_min: I,
        r_max: I,
    ) -> PairOutcome<I> {
        let mut pivots: Vec<I> = self.arena.get(left).pivots().to_vec();
        pivots.push(lmax);
        pivots.extend_from_slice(self.arena.get(right).pivots());
        let l_children: Vec<NodeId> = self.arena.get_mut(left).children_mut().drain(..).collect();
        let r_children: Vec<NodeId> = self.arena.get_mut(right).children_mut().drain(..).collect();
        let mut children = l_children;
        children.extend(r_children);
        let l_gaps: Vec<u128> = self.arena.get_mut(left).gaps_mut().drain(..).collect();
        let r_gaps: Vec<u128> = self.arena.get_mut(right).gaps_mut().drain(..).collect();
        let mut gaps = l_gaps;
        gaps.extend(r_gaps);
        let total = children.len();
        if total <= CAPACITY {
            self.install_internal(left, pivots, children, gaps);
            self.arena.remove(right);
            self.fix_children_parents(left);
            self.recompute_gaps(left, height, l_min, r_max);
            PairOutcome::Merged
        } else {
            let split_at = total / 2;
            let new_boundary = pivots[split_at - 1];
            let mut piv_iter = pivots.into_iter();
            let left_pivots: Vec<I> = (&mut piv_iter).take(split_at - 1).collect();
            let right_pivots: Vec<I> = piv_iter.collect();
            let mut child_iter = children.into_iter();
            let left_children: Vec<NodeId> = (&mut child_iter).take(split_at).collect();
            let right_children: Vec<NodeId> = child_iter.collect();
            let mut gap_iter = gaps.into_iter();
            let left_gaps: Vec<u128> = (&mut gap_iter).take(split_at).collect();
            let right_gaps: Vec<u128> = gap_iter.collect();
            self.install_internal(left, left_pivots, left_children, left_gaps);
            self.install_internal(right, right_pivots, right_children, right_gaps);
            self.fix_children_parents(left);
            self.fix_children_parents(right);
            self.recompute_gaps(left, height, l_min, new_boundary);
            let r_min = new_boundary.checked_add(1).expect("new_boundary < r_max");
            self.recompute_gaps(right, height, r_min, r_max);
            PairOutcome::Redistributed { new_boundary }
        }
    }

    fn install_internal(&mut self, id: NodeId, pivots: Vec<I>, children: Vec<NodeId>, gaps: Vec<u128>) {
        let node = self.arena.get_mut(id);
        node.data = NodeData::Internal {
            pivots: pivots.into_iter().collect(),
            children: children.into_iter().collect(),
            gaps: gaps.into_iter().collect(),
        };
    }

    fn finish_node(&mut self, id: NodeId, height: u8, min: I, max: I) -> Result<Outcome<I>> {
        let count = self.arena.get(id).slot_count();
        if count > CAPACITY {
            return self.split_internal(id, height, min, max);
        }
        self.recompute_gaps(id, height, min, max);
        Ok(if count < MIN_SLOTS {
            Outcome::Underflow
        } else {
            Outcome::Done
        })
    }

    fn split_internal(&mut self, id: NodeId, height: u8, min: I, max: I) -> Result<Outcome<I>> {
        self.arena.try_reserve(1)?;
        let (pivots, children, gaps) = {
            let node = self.arena.get_mut(id);
            match &mut node.data {
                NodeData::Internal { pivots, children, gaps } => (
                    core::mem::take(pivots).into_iter().collect::<Vec<_>>(),
                    core::mem::take(children).into_iter().collect::<Vec<_>>(),
                    core::mem::take(gaps).into_iter().collect::<Vec<_>>(),
                ),
                NodeData::Leaf { .. } => unreachable!("split_internal called on a leaf"),
            }
        };
        let total = children.len();
        let split_at = total / 2;
        let split_key = pivots[split_at - 1];
        let mut piv_iter = pivots.into_iter();
        let left_pivots: Vec<I> = (&mut piv_iter).take(split_at - 1).collect();
        let right_pivots: Vec<I> = piv_iter.collect();
        let mut child_iter = children.into_iter();
        let left_children: Vec<NodeId> = (&mut child_iter).take(split_at).collect();
        let right_children: Vec<NodeId> = child_iter.collect();
        let mut gap_iter = gaps.into_iter();
        let left_gaps: Vec<u128> = (&mut gap_iter).take(split_at).collect();
        let right_gaps: Vec<u128> = gap_iter.collect();
        self.install_internal(id, left_pivots, left_children, left_gaps);
        let right_id = self.arena.insert(Node::new_internal());
        self.install_internal(right_id, right_pivots, right_children, right_gaps);
        self.fix_children_parents(id);
        self.fix_children_parents(right_id);
        self.recompute_gaps(id, height, min, split_key);
        let right_min = split_key.checked_add(1).expect("split_key < max");
        self.recompute_gaps(right_id, height, right_min, max);
        Ok(Outcome::Split {
            right: right_id,
            split_key,
        })
    }

    fn recompute_gaps(&mut self, id: NodeId, height: u8, min: I, max: I) {
        if !self.flags.contains(TreeFlags::ALLOCATION_MODE) {
            return;
        }
        let pivots = self.arena.get(id).pivots().to_vec();
        let children: Vec<NodeId> = self.arena.get(id).children().iter().copied().collect();
        let mut new_gaps: ArrayVec<u128, BUF_CAPACITY> = ArrayVec::new();
        for (i, child) in children.iter().enumerate() {
            let (clo, chi) = node::slot_bounds(&pivots, i, min, max);
            new_gaps.push(self.child_gap(*child, height - 1, clo, chi));
        }
        *self.arena.get_mut(id).gaps_mut() = new_gaps;
    }

    /// Set every direct child's `parent` back-pointer to `(id, slot)`.
    pub(crate) fn fix_children_parents(&mut self, id: NodeId) {
        let children: Vec<NodeId> = self.arena.get(id).children().iter().copied().collect();
        for (slot, child) in children.into_iter().enumerate() {
            self.arena.get_mut(child).parent = Some(Parent {
                node: id,
                slot: u8::try_from(slot).expect("child slot fits in u8"),
            });
        }
    }

    fn flatten_side(&mut self, id: NodeId, height: u8, min: I, max: I, side: FlattenSide<I>, out: &mut Vec<(I, Option<V>)>) {
        if height == 0 {
            let pivots = self.arena.get(id).pivots().to_vec();
            let slot_count = self.arena.get(id).slot_count();
            let values: Vec<Option<V>> = self.arena.get_mut(id).leaf_slots_mut().drain(..).collect();
            for (i, val) in values.into_iter().enumerate().take(slot_count) {
                let (slo, shi) = node::slot_bounds(&pivots, i, min, max);
                match side {
                    FlattenSide::Below(bound) => {
                        if shi < bound {
                            push_merge(out, shi, val);
                        } else if slo < bound {
                            push_merge(out, bound.checked_sub(1).expect("slo < bound"), val);
                        }
                    }
                    FlattenSide::Above(bound) => {
                        if slo > bound {
                            push_merge(out, shi, val);
                        } else if shi > bound {
                            push_merge(out, shi, val);
                        }
                    }
                }
            }
        } else {
            let pivots = self.arena.get(id).pivots().to_vec();
            let children: Vec<NodeId> = self.arena.get(id).children().iter().copied().collect();
            for (i, child) in children.into_iter().enumerate() {
                let (clo, chi) = node::slot_bounds(&pivots, i, min, max);
                let keep = match side {
                    FlattenSide::Below(bound) => clo < bound,
                    FlattenSide::Above(bound) => chi > bound,
                };
                if keep {
                    self.flatten_side(child, height - 1, clo, chi, side, out);
                } else {
                    self.free_subtree(child, height - 1);
                }
            }
        }
        self.arena.remove(id);
    }

    pub(crate) fn free_subtree(&mut self, id: NodeId, height: u8) {
        if height > 0 {
            let children: Vec<NodeId> = self.arena.get(id).children().iter().copied().collect();
            for child in children {
                self.free_subtree(child, height - 1);
            }
        }
        self.arena.remove(id);
    }

    /// Build a forest of fresh subtrees, each of exactly `target_height`,
    /// from a flat, ascending `(upper_bound, value)` run list. Returns more
    /// than one node only when `runs` doesn't fit in a single subtree of
    /// that height (the three-way split a spanning store can produce, see
    /// `store_spanning`); the caller splices the whole forest in where a
    /// single replacement child used to sit. Never grows a level taller than
    /// `target_height` to force a single result -- that would desync the
    /// replacement's height from its siblings.
    fn build_forest_from_runs(&mut self, runs: Vec<(I, Option<V>)>, target_height: u8) -> Result<Vec<(NodeId, I)>> {
        self.arena.try_reserve(1)?;
        let mut level: Vec<(NodeId, I)> = Vec::new();
        let mut iter = runs.into_iter().peekable();
        while iter.peek().is_some() {
            let chunk: Vec<(I, Option<V>)> = (&mut iter).take(CAPACITY).collect();
            let last_pivot = chunk.last().expect("chunk is non-empty").0;
            let id = self.arena.insert(Node::new_leaf());
            self.install_leaf(id, chunk);
            level.push((id, last_pivot));
        }
        if level.is_empty() {
            let id = self.arena.insert(Node::new_leaf());
            level.push((id, I::MAX));
        }
        let mut height = 0u8;
        while height < target_height {
            self.arena.try_reserve(1)?;
            let mut next: Vec<(NodeId, I)> = Vec::new();
            let mut chunk_iter = level.into_iter().peekable();
            while chunk_iter.peek().is_some() {
                let chunk: Vec<(NodeId, I)> = (&mut chunk_iter).take(CAPACITY).collect();
                let len = chunk.len();
                let last_pivot = chunk[len - 1].1;
                let mut pivots: ArrayVec<I, PIVOT_BUF_CAPACITY> = ArrayVec::new();
                let mut children: ArrayVec<NodeId, BUF_CAPACITY> = ArrayVec::new();
                for (i, (child_id, child_max)) in chunk.into_iter().enumerate() {
                    if i + 1 < len {
                        pivots.push(child_max);
                    }
                    children.push(child_id);
                }
                let gaps: ArrayVec<u128, BUF_CAPACITY> = core::iter::repeat(0u128).take(children.len()).collect();
                let id = self.arena.insert(Node {
                    parent: None,
                    data: NodeData::Internal { pivots, children, gaps },
                });
                self.fix_children_parents(id);
                next.push((id, last_pivot));
            }
            level = next;
            height += 1;
        }
        Ok(level)
    }

    /// Build a fresh subtree of exactly `target_height` from a flat,
    /// ascending `(upper_bound, value)` run list. Only ever called where the
    /// run list is known to fit in one subtree (the empty-tree case in
    /// `store_range`); `store_spanning` calls `build_forest_from_runs`
    /// directly since it must tolerate more than one result.
    pub(crate) fn build_subtree_from_runs(&mut self, runs: Vec<(I, Option<V>)>, target_height: u8) -> Result<NodeId> {
        let forest = self.build_forest_from_runs(runs, target_height)?;
        debug_assert_eq!(forest.len(), 1);
        Ok(forest[0].0)
    }

    fn grow_root(&mut self, split_key: I, right: NodeId) -> Result<()> {
        let old_root = self.root.expect("grow_root called with no root");
        self.arena.try_reserve(1)?;
        let mut pivots: ArrayVec<I, PIVOT_BUF_CAPACITY> = ArrayVec::new();
        pivots.push(split_key);
        let mut children: ArrayVec<NodeId, BUF_CAPACITY> = ArrayVec::new();
        children.push(old_root);
        children.push(right);
        let gaps: ArrayVec<u128, BUF_CAPACITY> = [0u128, 0u128].into_iter().collect();
        let new_root = self.arena.insert(Node {
            parent: None,
            data: NodeData::Internal { pivots, children, gaps },
        });
        self.fix_children_parents(new_root);
        self.height += 1;
        self.root = Some(new_root);
        self.recompute_gaps(new_root, self.height, I::ZERO, I::MAX);
        Ok(())
    }

    /// If the root is internal with exactly one child, collapse it: the
    /// child becomes the new root and tree height shrinks by one.
    pub(crate) fn maybe_demote(&mut self) {
        loop {
            let Some(root) = self.root else { return };
            if self.height == 0 {
                return;
            }
            let node = self.arena.get(root);
            if node.children().len() != 1 {
                return;
            }
            let only_child = node.children()[0];
            self.arena.remove(root);
            self.arena.get_mut(only_child).parent = None;
            self.root = Some(only_child);
            self.height -= 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rebuild_leaf_slots_splits_existing_entry_around_new_write() {
        let pivots = [99u32];
        let slots = vec![Some("A")];
        let out = rebuild_leaf_slots(&pivots, slots, 0, 99, 40, 60, Some("B"));
        assert_eq!(out, vec![(39, Some("A")), (60, Some("B")), (99, Some("A"))]);
    }

    #[test]
    fn rebuild_leaf_slots_coalesces_adjacent_none_runs() {
        let pivots = [19u32, 39];
        let slots = vec![None, Some("A"), None];
        let out = rebuild_leaf_slots(&pivots, slots, 0, 99, 20, 39, None);
        assert_eq!(out, vec![(99, None)]);
    }
}
