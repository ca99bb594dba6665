//! The immutable [`Cell`] node.
//!
//! A cell is created once by [`super::CellBuilder::build`] (or by the BOC
//! parser) and never changes afterwards. Its representation hash and depth
//! are computed at construction so that the BOC serializer can deduplicate
//! identical subtrees without re-hashing.

use std::fmt;
use std::sync::Arc;

use sha2::{Digest, Sha256};

use super::error::CellError;
use super::slice::CellSlice;

/// Maximum number of data bits in a single cell.
pub const MAX_CELL_BITS: usize = 1023;

/// Maximum number of child references in a single cell.
pub const MAX_CELL_REFS: usize = 4;

// ---------------------------------------------------------------------------
// Cell
// ---------------------------------------------------------------------------

/// An ordinary cell: up to 1023 bits of data and up to 4 child references.
///
/// Data bits are packed big-endian, most significant bit first. Bits past
/// `bit_len` in the final byte are always zero, which makes `data()` usable
/// directly as a canonical byte view.
#[derive(Clone, PartialEq, Eq)]
pub struct Cell {
    data: Vec<u8>,
    bit_len: usize,
    references: Vec<Arc<Cell>>,
    hash: [u8; 32],
    depth: u16,
}

impl Cell {
    /// Creates a cell from packed data bits and child references.
    ///
    /// # Errors
    ///
    /// Returns [`CellError::BitOverflow`] when `bit_len` exceeds 1023 or the
    /// buffer is too short, and [`CellError::RefOverflow`] for more than four
    /// references.
    pub fn new(
        mut data: Vec<u8>,
        bit_len: usize,
        references: Vec<Arc<Cell>>,
    ) -> Result<Self, CellError> {
        if bit_len > MAX_CELL_BITS {
            return Err(CellError::BitOverflow {
                requested: bit_len,
                available: MAX_CELL_BITS,
            });
        }
        let byte_len = bit_len.div_ceil(8);
        if data.len() < byte_len {
            return Err(CellError::BitOverflow {
                requested: bit_len,
                available: data.len() * 8,
            });
        }
        if references.len() > MAX_CELL_REFS {
            return Err(CellError::RefOverflow);
        }

        data.truncate(byte_len);
        if bit_len % 8 != 0 {
            if let Some(last) = data.last_mut() {
                *last &= 0xFFu8 << (8 - bit_len % 8);
            }
        }

        let depth = references
            .iter()
            .map(|r| r.depth.saturating_add(1))
            .max()
            .unwrap_or(0);

        let mut cell = Self {
            data,
            bit_len,
            references,
            hash: [0u8; 32],
            depth,
        };
        cell.hash = cell.compute_hash();
        Ok(cell)
    }

    /// An empty cell with no data and no references.
    pub fn empty() -> Self {
        let mut cell = Self {
            data: Vec::new(),
            bit_len: 0,
            references: Vec::new(),
            hash: [0u8; 32],
            depth: 0,
        };
        cell.hash = cell.compute_hash();
        cell
    }

    /// Packed data bytes (trailing unused bits are zero).
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Number of meaningful data bits.
    pub fn bit_len(&self) -> usize {
        self.bit_len
    }

    /// Child references in storage order.
    pub fn references(&self) -> &[Arc<Cell>] {
        &self.references
    }

    /// SHA-256 representation hash.
    pub fn hash(&self) -> [u8; 32] {
        self.hash
    }

    /// Hex-encoded representation hash, for logging.
    pub fn hash_hex(&self) -> String {
        hex::encode(self.hash)
    }

    /// Maximum distance to a leaf (0 for cells without references).
    pub fn depth(&self) -> u16 {
        self.depth
    }

    /// Opens a reader positioned at the first bit and first reference.
    pub fn parse(&self) -> CellSlice<'_> {
        CellSlice::new(self)
    }

    /// Descriptor byte d1: reference count (ordinary cell, level 0).
    pub(crate) fn refs_descriptor(&self) -> u8 {
        self.references.len() as u8
    }

    /// Descriptor byte d2: `floor(bits / 8) + ceil(bits / 8)`.
    pub(crate) fn bits_descriptor(&self) -> u8 {
        (self.bit_len / 8 + self.bit_len.div_ceil(8)) as u8
    }

    /// Data bytes with the completion tag applied: when the bit length is
    /// not a multiple of 8, a single `1` bit follows the data.
    pub(crate) fn augmented_data(&self) -> Vec<u8> {
        let mut out = self.data.clone();
        let rem = self.bit_len % 8;
        if rem != 0 {
            if let Some(last) = out.last_mut() {
                *last |= 0x80u8 >> rem;
            }
        }
        out
    }

    fn compute_hash(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update([self.refs_descriptor(), self.bits_descriptor()]);
        hasher.update(self.augmented_data());
        for child in &self.references {
            hasher.update(child.depth.to_be_bytes());
        }
        for child in &self.references {
            hasher.update(child.hash);
        }
        hasher.finalize().into()
    }
}

impl fmt::Debug for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cell")
            .field("bits", &self.bit_len)
            .field("data", &hex::encode(&self.data))
            .field("refs", &self.references)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_cell_hash_matches_known_value() {
        // Representation hash of the empty ordinary cell, as published by
        // every TON SDK.
        assert_eq!(
            Cell::empty().hash_hex(),
            "96a296d224f285c67bee93c30f8a309157f0daa35dc5b87e410b78630a09cfc7"
        );
    }

    #[test]
    fn trailing_bits_are_masked() {
        let cell = Cell::new(vec![0xFF], 3, Vec::new()).unwrap();
        assert_eq!(cell.data(), &[0xE0]);
        assert_eq!(cell.augmented_data(), vec![0xF0]);
        assert_eq!(cell.bits_descriptor(), 1);
    }

    #[test]
    fn depth_counts_levels_of_references() {
        let leaf = Arc::new(Cell::empty());
        let mid = Arc::new(Cell::new(Vec::new(), 0, vec![leaf.clone()]).unwrap());
        let root = Cell::new(Vec::new(), 0, vec![mid, leaf]).unwrap();
        assert_eq!(root.depth(), 2);
    }

    #[test]
    fn rejects_oversized_cells() {
        assert!(matches!(
            Cell::new(vec![0; 128], 1024, Vec::new()),
            Err(CellError::BitOverflow { .. })
        ));
        let refs = (0..5).map(|_| Arc::new(Cell::empty())).collect();
        assert_eq!(Cell::new(Vec::new(), 0, refs), Err(CellError::RefOverflow));
    }
}
