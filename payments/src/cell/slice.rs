//! Bit-level cell reader.

use std::sync::Arc;

use super::address::TonAddress;
use super::error::CellError;
use super::types::Cell;

/// A read cursor over one [`Cell`].
///
/// Reads consume bits from the front; references are consumed in storage
/// order. Cloning a slice forks the cursor without touching the cell.
#[derive(Debug, Clone)]
pub struct CellSlice<'a> {
    cell: &'a Cell,
    bit_pos: usize,
    ref_pos: usize,
}

impl<'a> CellSlice<'a> {
    pub(crate) fn new(cell: &'a Cell) -> Self {
        Self {
            cell,
            bit_pos: 0,
            ref_pos: 0,
        }
    }

    /// Unread data bits.
    pub fn remaining_bits(&self) -> usize {
        self.cell.bit_len() - self.bit_pos
    }

    /// Unread references.
    pub fn remaining_refs(&self) -> usize {
        self.cell.references().len() - self.ref_pos
    }

    pub(crate) fn remaining_ref_cells(&self) -> &'a [Arc<Cell>] {
        &self.cell.references()[self.ref_pos..]
    }

    /// True when both bits and references are exhausted.
    pub fn is_empty(&self) -> bool {
        self.remaining_bits() == 0 && self.remaining_refs() == 0
    }

    fn ensure_bits(&self, requested: usize) -> Result<(), CellError> {
        let remaining = self.remaining_bits();
        if requested > remaining {
            return Err(CellError::BitUnderflow {
                requested,
                remaining,
            });
        }
        Ok(())
    }

    fn bit_at(&self, pos: usize) -> bool {
        (self.cell.data()[pos / 8] >> (7 - pos % 8)) & 1 == 1
    }

    /// Reads one bit.
    pub fn load_bit(&mut self) -> Result<bool, CellError> {
        self.ensure_bits(1)?;
        let bit = self.bit_at(self.bit_pos);
        self.bit_pos += 1;
        Ok(bit)
    }

    /// Reads an unsigned big-endian integer of up to 64 bits.
    pub fn load_uint(&mut self, bits: usize) -> Result<u64, CellError> {
        if bits > 64 {
            return Err(CellError::UnsupportedWidth(bits));
        }
        self.ensure_bits(bits)?;
        let mut value = 0u64;
        for _ in 0..bits {
            value = (value << 1) | u64::from(self.bit_at(self.bit_pos));
            self.bit_pos += 1;
        }
        Ok(value)
    }

    /// Reads a two's-complement integer of up to 64 bits.
    pub fn load_int(&mut self, bits: usize) -> Result<i64, CellError> {
        if bits == 0 || bits > 64 {
            return Err(CellError::UnsupportedWidth(bits));
        }
        let raw = self.load_uint(bits)?;
        if bits == 64 {
            return Ok(raw as i64);
        }
        let shift = 64 - bits;
        Ok(((raw << shift) as i64) >> shift)
    }

    /// Reads `len` whole bytes.
    pub fn load_bytes(&mut self, len: usize) -> Result<Vec<u8>, CellError> {
        self.ensure_bits(len * 8)?;
        let mut out = Vec::with_capacity(len);
        for _ in 0..len {
            out.push(self.load_uint(8)? as u8);
        }
        Ok(out)
    }

    /// Reads a `Coins` amount (VarUInteger 16).
    pub fn load_coins(&mut self) -> Result<u128, CellError> {
        let len = self.load_uint(4)? as usize;
        let bytes = self.load_bytes(len)?;
        Ok(bytes
            .iter()
            .fold(0u128, |acc, b| (acc << 8) | u128::from(*b)))
    }

    /// Reads a `MsgAddressInt`; `addr_none` yields `None`.
    pub fn load_address(&mut self) -> Result<Option<TonAddress>, CellError> {
        let tag = self.load_uint(2)? as u8;
        match tag {
            0b00 => Ok(None),
            0b10 => {
                if self.load_bit()? {
                    return Err(CellError::AnycastAddress);
                }
                let workchain = self.load_int(8)? as i8;
                let bytes = self.load_bytes(32)?;
                let mut hash = [0u8; 32];
                hash.copy_from_slice(&bytes);
                Ok(Some(TonAddress::new(workchain, hash)))
            }
            other => Err(CellError::UnsupportedAddressTag(other)),
        }
    }

    /// Takes the next child reference.
    pub fn load_ref(&mut self) -> Result<&'a Arc<Cell>, CellError> {
        let child = self
            .cell
            .references()
            .get(self.ref_pos)
            .ok_or(CellError::RefUnderflow)?;
        self.ref_pos += 1;
        Ok(child)
    }

    /// Reads snake-encoded bytes: the rest of this cell's data followed by
    /// the chain of first references.
    pub fn load_bytes_tail(&mut self) -> Result<Vec<u8>, CellError> {
        let mut out = self.load_aligned_rest()?;
        if self.remaining_refs() == 0 {
            return Ok(out);
        }
        let mut next = self.load_ref()?;
        loop {
            let mut chunk = CellSlice::new(next.as_ref());
            out.extend(chunk.load_aligned_rest()?);
            if chunk.remaining_refs() == 0 {
                return Ok(out);
            }
            next = chunk.load_ref()?;
        }
    }

    fn load_aligned_rest(&mut self) -> Result<Vec<u8>, CellError> {
        let bits = self.remaining_bits();
        if bits % 8 != 0 {
            return Err(CellError::UnalignedString(bits));
        }
        self.load_bytes(bits / 8)
    }

    /// Reads a snake-encoded UTF-8 string.
    pub fn load_string_tail(&mut self) -> Result<String, CellError> {
        String::from_utf8(self.load_bytes_tail()?).map_err(|_| CellError::InvalidUtf8)
    }

    /// Skips `bits` data bits.
    pub fn skip_bits(&mut self, bits: usize) -> Result<(), CellError> {
        self.ensure_bits(bits)?;
        self.bit_pos += bits;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
