//! Error types for cell construction and parsing.

use thiserror::Error;

/// Errors raised while writing to a [`super::CellBuilder`] or reading from
/// a [`super::CellSlice`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CellError {
    /// Writing would exceed the 1023-bit data capacity of a cell.
    #[error("cell bit overflow: requested {requested} bits, {available} available")]
    BitOverflow {
        /// Bits the write needed.
        requested: usize,
        /// Bits left in the cell.
        available: usize,
    },

    /// A fifth child reference was attached.
    #[error("cell reference overflow: a cell holds at most 4 references")]
    RefOverflow,

    /// An unsigned value does not fit in the requested bit width.
    #[error("value {value} does not fit in {bits} bits")]
    ValueOutOfRange {
        /// The offending value, rendered for diagnostics.
        value: String,
        /// Requested field width.
        bits: usize,
    },

    /// Bit width above the 64 supported by integer accessors.
    #[error("unsupported integer width: {0} bits")]
    UnsupportedWidth(usize),

    /// A coin amount above 2^120 - 1 (VarUInteger 16 limit).
    #[error("coin amount {0} exceeds the 120-bit VarUInteger 16 range")]
    CoinsOutOfRange(u128),

    /// Reading past the end of the cell's data.
    #[error("cell underflow: requested {requested} bits, {remaining} remaining")]
    BitUnderflow {
        /// Bits the read needed.
        requested: usize,
        /// Bits left unread.
        remaining: usize,
    },

    /// Reading a reference that does not exist.
    #[error("cell reference underflow: no references left")]
    RefUnderflow,

    /// The address prefix is neither `addr_none` nor `addr_std`.
    #[error("unsupported address tag 0b{0:02b}")]
    UnsupportedAddressTag(u8),

    /// `addr_std` with the anycast bit set.
    #[error("anycast addresses are not supported")]
    AnycastAddress,

    /// Tail string data does not line up on byte boundaries.
    #[error("string data is not byte aligned ({0} bits)")]
    UnalignedString(usize),

    /// Tail string data is not valid UTF-8.
    #[error("string data is not valid UTF-8")]
    InvalidUtf8,
}
