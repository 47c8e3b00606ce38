//! The key space the tree indexes over.
//!
//! The spec fixes keys to "fixed-width unsigned integers"; this crate keeps
//! that constraint but stays generic over the width, the way the retrieval
//! pack's own `range-tree` fuzz harness (`RangeTreeIndex`) does, rather than
//! hard-coding `u64`/`usize`.

/// A fixed-width unsigned integer usable as a tree key.
///
/// Implemented for the built-in unsigned integer types. `ZERO`/`MAX` are the
/// bounds of the whole index space (`[0, UINT_MAX]` in the spec's
/// vocabulary); `checked_add`/`checked_sub` are used throughout to detect
/// the `UINT_MAX` boundary cases called out in §8.
pub trait Index: Copy + Ord + Eq + core::fmt::Debug + core::hash::Hash + 'static {
    const ZERO: Self;
    const MAX: Self;

    fn checked_add(self, rhs: u8) -> Option<Self>;
    fn checked_sub(self, rhs: u8) -> Option<Self>;

    /// Saturating distance `self - rhs + 1`, i.e. the number of integers in
    /// `[rhs, self]` inclusive. Saturates (rather than overflows) when the
    /// range spans the entire index space.
    fn span_len(self, rhs: Self) -> u128;

    /// Widen to a `u128` for gap-size arithmetic that must work uniformly
    /// across every width this trait is implemented for.
    fn to_u128(self) -> u128;

    /// Narrow back down from a `u128`, failing if it doesn't fit `Self`.
    fn from_u128(v: u128) -> Option<Self>;
}

macro_rules! impl_index {
    ($($t:ty),* $(,)?) => {
        $(
            impl Index for $t {
                const ZERO: Self = 0;
                const MAX: Self = <$t>::MAX;

                fn checked_add(self, rhs: u8) -> Option<Self> {
                    self.checked_add(<$t>::from(rhs))
                }

                fn checked_sub(self, rhs: u8) -> Option<Self> {
                    self.checked_sub(<$t>::from(rhs))
                }

                fn span_len(self, rhs: Self) -> u128 {
                    debug_assert!(rhs <= self);
                    // `self - rhs + 1` overflows `u128` only when `Self =
                    // u128` and the span is the entire index space;
                    // saturate rather than widen further, since the
                    // returned value is used only for size comparisons.
                    //
                    // `usize` has no `From<usize> for u128` in core (its
                    // width isn't fixed), so every arm goes through
                    // `try_from`, which can't fail for any width this trait
                    // is implemented for.
                    (self.to_u128() - rhs.to_u128()).checked_add(1).unwrap_or(u128::MAX)
                }

                fn to_u128(self) -> u128 {
                    u128::try_from(self).expect("every Index width fits in u128")
                }

                fn from_u128(v: u128) -> Option<Self> {
                    <$t>::try_from(v).ok()
                }
            }
        )*
    };
}

impl_index!(u8, u16, u32, u64, u128, usize);

/// An inclusive range `[start, end]` over an [`Index`] type.
///
/// A hand-rolled replacement for the nightly `core::range::RangeInclusive`
/// used by the retrieval pack's fuzz harness, so this crate builds on
/// stable.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct RangeInclusive<I> {
    pub start: I,
    pub end: I,
}

impl<I: core::fmt::Debug> core::fmt::Debug for RangeInclusive<I> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:?}..={:?}", self.start, self.end)
    }
}

impl<I: Index> RangeInclusive<I> {
    pub fn new(start: I, end: I) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, i: I) -> bool {
        self.start <= i && i <= self.end
    }

    pub fn is_well_formed(&self) -> bool {
        self.start <= self.end
    }
}
