//! Bag-of-cells (BOC) container format.
//!
//! Layout written by [`serialize`]:
//!
//! ```text
//! b5ee9c72                      magic
//! flags:u8                      has_idx(0x80) | has_crc32c(0x40) | size_bytes
//! off_bytes:u8
//! cells:size  roots:size  absent:size  total_cells_size:off_bytes
//! root_index:size
//! cell*                         d1 d2 data ref_index*
//! crc32c:u32 LE                 optional
//! ```
//!
//! Cells are written parents first and deduplicated by representation hash,
//! so identical subtrees are stored once.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use crc::{Crc, CRC_32_ISCSI};
use thiserror::Error;

use super::error::CellError;
use super::types::{Cell, MAX_CELL_REFS};

const BOC_MAGIC: [u8; 4] = [0xb5, 0xee, 0x9c, 0x72];
const FLAG_HAS_IDX: u8 = 0x80;
const FLAG_HAS_CRC: u8 = 0x40;
const SIZE_MASK: u8 = 0x07;

/// CRC-32C (Castagnoli) of the trailer.
const CASTAGNOLI: Crc<u32> = Crc::<u32>::new(&CRC_32_ISCSI);

/// BOC encoding and decoding failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BocError {
    /// The input does not start with the `b5ee9c72` magic.
    #[error("invalid BOC magic")]
    BadMagic,

    /// The input ended before the header or a cell was complete.
    #[error("BOC truncated at offset {0}")]
    Truncated(usize),

    /// Reference or offset width outside what the format allows.
    #[error("unsupported BOC size field: {0} bytes")]
    BadSizeField(usize),

    /// The CRC-32C trailer does not match the payload.
    #[error("BOC checksum mismatch")]
    CrcMismatch,

    /// The container declares no root cell.
    #[error("BOC has no root cell")]
    NoRoot,

    /// More roots are declared than cells.
    #[error("BOC declares {roots} roots for {cells} cells")]
    RootCount {
        /// Declared roots.
        roots: usize,
        /// Declared cells.
        cells: usize,
    },

    /// A root index points past the last cell.
    #[error("BOC root index {0} out of range")]
    BadRoot(usize),

    /// A cell refers to itself, a parent, or an index past the end.
    #[error("invalid reference from cell {from} to {to}")]
    BadReference {
        /// Index of the referring cell.
        from: usize,
        /// Referenced index.
        to: usize,
    },

    /// Exotic cells (pruned, library, Merkle) are not handled.
    #[error("exotic or higher-level cell at index {0}")]
    UnsupportedCell(usize),

    /// A partial-byte cell is missing its completion tag.
    #[error("missing completion tag in cell {0}")]
    MissingCompletionTag(usize),

    /// Base64 wrapper could not be decoded.
    #[error("invalid base64 BOC")]
    Base64,

    /// Cell content itself is invalid.
    #[error(transparent)]
    Cell(#[from] CellError),
}

/// Serializes the tree rooted at `root` into a single-root BOC.
pub fn serialize(root: &Cell, with_crc: bool) -> Vec<u8> {
    let order = topological_order(root);
    let index: HashMap<[u8; 32], usize> = order
        .iter()
        .enumerate()
        .map(|(i, cell)| (cell.hash(), i))
        .collect();

    let size_bytes = min_bytes(order.len() as u64);
    let cell_bytes: Vec<u8> = order
        .iter()
        .flat_map(|cell| encode_cell(cell, &index, size_bytes))
        .collect();
    let off_bytes = min_bytes(cell_bytes.len() as u64);

    let mut out = Vec::with_capacity(16 + cell_bytes.len());
    out.extend_from_slice(&BOC_MAGIC);
    let flags = if with_crc { FLAG_HAS_CRC } else { 0 };
    out.push(flags | size_bytes as u8);
    out.push(off_bytes as u8);
    write_be(&mut out, order.len() as u64, size_bytes);
    write_be(&mut out, 1, size_bytes);
    write_be(&mut out, 0, size_bytes);
    write_be(&mut out, cell_bytes.len() as u64, off_bytes);
    write_be(&mut out, 0, size_bytes);
    out.extend_from_slice(&cell_bytes);

    if with_crc {
        let crc = CASTAGNOLI.checksum(&out);
        out.extend_from_slice(&crc.to_le_bytes());
    }
    out
}

/// Parses a BOC and returns its first root.
pub fn deserialize(bytes: &[u8]) -> Result<Cell, BocError> {
    let mut r = Reader { bytes, pos: 0 };

    if r.take(4)? != BOC_MAGIC {
        return Err(BocError::BadMagic);
    }
    let flags = r.byte()?;
    let has_idx = flags & FLAG_HAS_IDX != 0;
    let has_crc = flags & FLAG_HAS_CRC != 0;
    let size_bytes = usize::from(flags & SIZE_MASK);
    if size_bytes == 0 || size_bytes > 4 {
        return Err(BocError::BadSizeField(size_bytes));
    }
    let off_bytes = usize::from(r.byte()?);
    if off_bytes == 0 || off_bytes > 8 {
        return Err(BocError::BadSizeField(off_bytes));
    }

    let cell_count = r.uint(size_bytes)? as usize;
    let root_count = r.uint(size_bytes)? as usize;
    let _absent = r.uint(size_bytes)?;
    let total_size = r.uint(off_bytes)? as usize;
    if root_count == 0 {
        return Err(BocError::NoRoot);
    }
    // Every cell takes at least its two descriptor bytes.
    if cell_count > (bytes.len() - r.pos) / 2 {
        return Err(BocError::Truncated(r.pos));
    }
    if root_count > cell_count {
        return Err(BocError::RootCount {
            roots: root_count,
            cells: cell_count,
        });
    }
    let mut roots = Vec::with_capacity(root_count);
    for _ in 0..root_count {
        let root = r.uint(size_bytes)? as usize;
        if root >= cell_count {
            return Err(BocError::BadRoot(root));
        }
        roots.push(root);
    }
    if has_idx {
        r.take(cell_count * off_bytes)?;
    }

    let cells_start = r.pos;
    let mut raw = Vec::with_capacity(cell_count);
    for i in 0..cell_count {
        raw.push(read_raw_cell(&mut r, i, cell_count, size_bytes)?);
    }
    if r.pos - cells_start != total_size {
        return Err(BocError::Truncated(r.pos));
    }

    if has_crc {
        let body_end = r.pos;
        let trailer = r.take(4)?;
        let expected = u32::from_le_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
        if CASTAGNOLI.checksum(&bytes[..body_end]) != expected {
            return Err(BocError::CrcMismatch);
        }
    }

    // Children always carry a higher index, so build from the back.
    let mut built: Vec<Option<Arc<Cell>>> = vec![None; cell_count];
    for i in (0..cell_count).rev() {
        let RawCell { data, bit_len, refs } = &raw[i];
        let children = refs
            .iter()
            .map(|&to| built[to].clone().ok_or(BocError::BadReference { from: i, to }))
            .collect::<Result<Vec<_>, _>>()?;
        built[i] = Some(Arc::new(Cell::new(data.clone(), *bit_len, children)?));
    }

    let root = roots[0];
    built
        .get(root)
        .and_then(Option::as_ref)
        .map(|cell| cell.as_ref().clone())
        .ok_or(BocError::NoRoot)
}

/// Serializes with a CRC trailer and encodes as standard base64.
pub fn to_base64(root: &Cell) -> String {
    STANDARD.encode(serialize(root, true))
}

/// Decodes a standard base64 BOC.
pub fn from_base64(text: &str) -> Result<Cell, BocError> {
    let bytes = STANDARD
        .decode(text.trim())
        .map_err(|_| BocError::Base64)?;
    deserialize(&bytes)
}

// ---------------------------------------------------------------------------
// Internals
// ---------------------------------------------------------------------------

struct RawCell {
    data: Vec<u8>,
    bit_len: usize,
    refs: Vec<usize>,
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], BocError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.bytes.len())
            .ok_or(BocError::Truncated(self.pos))?;
        let out = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    fn byte(&mut self) -> Result<u8, BocError> {
        Ok(self.take(1)?[0])
    }

    fn uint(&mut self, width: usize) -> Result<u64, BocError> {
        Ok(self
            .take(width)?
            .iter()
            .fold(0u64, |acc, b| (acc << 8) | u64::from(*b)))
    }
}

fn read_raw_cell(
    r: &mut Reader<'_>,
    index: usize,
    cell_count: usize,
    size_bytes: usize,
) -> Result<RawCell, BocError> {
    let d1 = r.byte()?;
    let d2 = r.byte()?;
    let ref_count = usize::from(d1 & 0x07);
    let exotic = d1 & 0x08 != 0;
    let level = d1 >> 5;
    if exotic || level != 0 || ref_count > MAX_CELL_REFS {
        return Err(BocError::UnsupportedCell(index));
    }

    let data_len = usize::from(d2).div_ceil(2);
    let mut data = r.take(data_len)?.to_vec();
    let bit_len = if d2 % 2 == 0 {
        data_len * 8
    } else {
        let last = data.last().copied().unwrap_or(0);
        if last == 0 {
            return Err(BocError::MissingCompletionTag(index));
        }
        let trailing = last.trailing_zeros() as usize;
        if let Some(byte) = data.last_mut() {
            *byte &= !(1u8 << trailing);
        }
        data_len * 8 - trailing - 1
    };

    let mut refs = Vec::with_capacity(ref_count);
    for _ in 0..ref_count {
        let to = r.uint(size_bytes)? as usize;
        if to <= index || to >= cell_count {
            return Err(BocError::BadReference { from: index, to });
        }
        refs.push(to);
    }
    Ok(RawCell {
        data,
        bit_len,
        refs,
    })
}

/// Reverse postorder over the DAG: every parent precedes its children.
fn topological_order(root: &Cell) -> Vec<&Cell> {
    fn visit<'a>(cell: &'a Cell, seen: &mut HashSet<[u8; 32]>, post: &mut Vec<&'a Cell>) {
        if !seen.insert(cell.hash()) {
            return;
        }
        for child in cell.references().iter().rev() {
            visit(child.as_ref(), seen, post);
        }
        post.push(cell);
    }

    let mut seen = HashSet::new();
    let mut post = Vec::new();
    visit(root, &mut seen, &mut post);
    post.reverse();
    post
}

fn encode_cell(cell: &Cell, index: &HashMap<[u8; 32], usize>, size_bytes: usize) -> Vec<u8> {
    let mut out = vec![cell.refs_descriptor(), cell.bits_descriptor()];
    out.extend(cell.augmented_data());
    for child in cell.references() {
        // Every reachable child was indexed by `topological_order`.
        let i = index.get(&child.hash()).copied().unwrap_or_default();
        write_be(&mut out, i as u64, size_bytes);
    }
    out
}

fn min_bytes(value: u64) -> usize {
    let bits = 64 - value.leading_zeros() as usize;
    bits.div_ceil(8).max(1)
}

fn write_be(out: &mut Vec<u8>, value: u64, width: usize) {
    out.extend_from_slice(&value.to_be_bytes()[8 - width..]);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::CellBuilder;

    #[test]
    fn crc32c_check_value() {
        assert_eq!(CASTAGNOLI.checksum(b"123456789"), 0xE306_9283);
    }

    #[test]
    fn empty_cell_matches_reference_encoding() {
        assert_eq!(to_base64(&Cell::empty()), "te6cckEBAQEAAgAAAEysuc0=");
        assert_eq!(from_base64("te6cckEBAQEAAgAAAEysuc0=").unwrap(), Cell::empty());
    }

    #[test]
    fn shared_subtrees_are_stored_once() {
        let leaf = Arc::new(CellBuilder::new().store_uint(7, 5).unwrap().build().unwrap());
        let mut root = CellBuilder::new();
        root.store_ref(leaf.clone())
            .unwrap()
            .store_ref(leaf.clone())
            .unwrap();
        let root = root.build().unwrap();

        let bytes = serialize(&root, false);
        // size_bytes = 1, so the cell count sits right after flags + off_bytes.
        assert_eq!(bytes[6], 2);
        let parsed = deserialize(&bytes).unwrap();
        assert_eq!(parsed.hash(), root.hash());
        assert_eq!(parsed.references()[1].bit_len(), 5);
    }

    #[test]
    fn corrupted_crc_is_rejected() {
        let cell = CellBuilder::new().store_uint(0xdead, 16).unwrap().build().unwrap();
        let mut bytes = serialize(&cell, true);
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        assert_eq!(deserialize(&bytes), Err(BocError::CrcMismatch));
    }

    #[test]
    fn truncated_input_is_rejected() {
        let bytes = serialize(&Cell::empty(), true);
        assert!(matches!(
            deserialize(&bytes[..bytes.len() - 6]),
            Err(BocError::Truncated(_))
        ));
        assert_eq!(deserialize(&[0, 1, 2, 3, 4]), Err(BocError::BadMagic));
    }

    #[test]
    fn oversized_cell_count_is_rejected_before_allocating() {
        // Four-byte counts claiming 0xFFFFFFFF cells, one root, empty body.
        let header = hex::decode(concat!(
            "b5ee9c72", "04", "01", "ffffffff", "00000001", "00000000", "00", "00000000"
        ))
        .unwrap();
        assert_eq!(header.len(), 23);
        assert!(matches!(
            from_base64(&STANDARD.encode(&header)),
            Err(BocError::Truncated(_))
        ));
    }

    #[test]
    fn root_outside_the_cell_table_is_rejected() {
        let mut bytes = serialize(&Cell::empty(), false);
        // Single root index right before the two descriptor bytes.
        let root_at = bytes.len() - 3;
        bytes[root_at] = 1;
        assert_eq!(deserialize(&bytes), Err(BocError::BadRoot(1)));

        let mut bytes = serialize(&Cell::empty(), false);
        // Root count sits after magic, flags, off_bytes and the cell count.
        bytes[7] = 2;
        assert!(matches!(
            deserialize(&bytes),
            Err(BocError::RootCount { roots: 2, cells: 1 })
        ));
    }
}
