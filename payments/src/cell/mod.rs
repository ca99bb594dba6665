//! # Cells, Slices and Bags of Cells
//!
//! Everything that travels to the chain as a message body is a tree of
//! cells. A cell holds up to 1023 data bits and up to four references to
//! child cells; a message is serialized for transport as a "bag of cells"
//! (BOC), which is what the wallet provider expects base64-encoded in the
//! `payload` field of a transaction request.
//!
//! ```text
//! builder.rs  - CellBuilder: bit-level writer (uints, coins, addresses, refs)
//! slice.rs    - CellSlice: the matching reader
//! types.rs    - Cell: immutable node with representation hash and depth
//! boc.rs      - bag-of-cells serialization and parsing (CRC-32C trailer)
//! address.rs  - TonAddress: raw and user-friendly address forms
//! ```
//!
//! Only ordinary (non-exotic) cells are supported. Library, pruned and
//! Merkle cells are rejected by the parser.

pub mod address;
pub mod boc;
pub mod builder;
pub mod slice;
pub mod types;

mod error;

pub use address::{AddressError, FriendlyFlags, TonAddress};
pub use boc::BocError;
pub use builder::CellBuilder;
pub use error::CellError;
pub use slice::CellSlice;
pub use types::{Cell, MAX_CELL_BITS, MAX_CELL_REFS};
