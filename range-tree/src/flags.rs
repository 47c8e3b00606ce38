//! Tree-wide behavior knobs.
//!
//! Mirrors the spec's tree-flags bit layout (allocation mode in bit 0, RCU
//! mode in bit 1) as a `bitflags` type. The third field in that layout --
//! the cached tree height -- is realized as a plain `u8` on `Inner` instead
//! of being packed into the same word: there is no pointer-tagging budget to
//! economize on here, so packing it would only cost readability.

use bitflags::bitflags;

bitflags! {
    /// Construction-time knobs for a [`crate::RangeTree`].
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct TreeFlags: u8 {
        /// Track per-child maximum-empty-gap summaries on internal nodes,
        /// so `alloc_range`/`alloc_rrange` run in time proportional to tree
        /// height rather than to the number of stored ranges.
        const ALLOCATION_MODE = 0b0000_0001;
        /// Disallow in-place mutation of live nodes: every rewrite allocates
        /// a fresh node and republishes the parent link, rather than patching
        /// the existing node's slots. Meaningless under this crate's `RwLock`
        /// concurrency model (readers can never observe a live node mid-edit
        /// either way, see DESIGN.md) but kept for interface parity and
        /// because it is still an observable allocation-churn knob.
        const RCU_MODE = 0b0000_0010;
    }
}
