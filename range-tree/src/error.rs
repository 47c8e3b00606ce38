//! Error taxonomy.
//!
//! Mirrors the boundary error codes of the spec (`-EINVAL`, `-ENOMEM`,
//! `-EEXIST`, `-EBUSY`, `-ENOENT`) as a closed Rust enum instead of raw
//! `errno` integers.

use core::fmt;

/// Everything that can go wrong calling into a [`crate::RangeTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The requested range is empty, out of order (`last < first`), or
    /// otherwise malformed.
    InvalidRange,
    /// The tree's node arena could not grow to hold the new nodes this
    /// mutation requires.
    OutOfMemory,
    /// `insert`/`try_insert` found the range already (partially) occupied.
    Overlap,
    /// `alloc_range`/`alloc_rrange` found no empty sub-range of the
    /// requested size within the requested bounds.
    NoFit,
    /// Iteration has been exhausted (no more entries in the requested
    /// direction).
    Exhausted,
    /// The supplied value collides with an internal reserved encoding.
    ///
    /// Unreachable through the generic `RangeTree<I, V>` API (see
    /// DESIGN.md); kept for taxonomy parity with the spec's §6.
    Reserved,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Error::InvalidRange => "range is empty or out of order",
            Error::OutOfMemory => "failed to allocate a tree node",
            Error::Overlap => "range overlaps an existing entry",
            Error::NoFit => "no empty range of the requested size was found",
            Error::Exhausted => "iteration exhausted",
            Error::Reserved => "value collides with a reserved internal encoding",
        };
        f.write_str(msg)
    }
}

impl core::error::Error for Error {}

pub type Result<T> = core::result::Result<T, Error>;

/// Like `assert!`, but returns `Err($err)` instead of panicking.
///
/// Used at API boundaries for recoverable precondition failures; genuine
/// internal invariant violations still use `debug_assert!`/`assert!` per
/// §7 ("invariant violations are fatal").
macro_rules! ensure {
    ($cond:expr, $err:expr) => {
        if !($cond) {
            return Err($err);
        }
    };
}

pub(crate) use ensure;
