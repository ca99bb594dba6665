//! Bit-level cell writer.
//!
//! [`CellBuilder`] mirrors the TL-B primitives that the jetton transfer
//! message needs: fixed-width unsigned and signed integers, `Coins`
//! (VarUInteger 16), `MsgAddressInt` in its `addr_std` form, child
//! references, inlined slices, and snake-encoded string tails.

use std::sync::Arc;

use super::address::TonAddress;
use super::error::CellError;
use super::slice::CellSlice;
use super::types::{Cell, MAX_CELL_BITS, MAX_CELL_REFS};

/// Largest amount representable as `Coins`: 15 bytes of payload.
pub const MAX_COINS: u128 = (1u128 << 120) - 1;

/// Fluent, fallible writer for a single [`Cell`].
#[derive(Debug, Clone, Default)]
pub struct CellBuilder {
    data: Vec<u8>,
    bit_len: usize,
    references: Vec<Arc<Cell>>,
}

impl CellBuilder {
    /// Starts an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bits written so far.
    pub fn bit_len(&self) -> usize {
        self.bit_len
    }

    /// Bits still available in this cell.
    pub fn available_bits(&self) -> usize {
        MAX_CELL_BITS - self.bit_len
    }

    /// References still available in this cell.
    pub fn available_refs(&self) -> usize {
        MAX_CELL_REFS - self.references.len()
    }

    fn ensure_bits(&self, requested: usize) -> Result<(), CellError> {
        if requested > self.available_bits() {
            return Err(CellError::BitOverflow {
                requested,
                available: self.available_bits(),
            });
        }
        Ok(())
    }

    fn push_bit(&mut self, bit: bool) {
        let byte = self.bit_len / 8;
        if byte == self.data.len() {
            self.data.push(0);
        }
        if bit {
            self.data[byte] |= 0x80 >> (self.bit_len % 8);
        }
        self.bit_len += 1;
    }

    /// Appends a single bit.
    pub fn store_bit(&mut self, bit: bool) -> Result<&mut Self, CellError> {
        self.ensure_bits(1)?;
        self.push_bit(bit);
        Ok(self)
    }

    /// Appends `value` as a big-endian unsigned integer of `bits` width.
    ///
    /// # Errors
    ///
    /// [`CellError::ValueOutOfRange`] if `value` needs more than `bits`
    /// bits; [`CellError::UnsupportedWidth`] for widths above 64.
    pub fn store_uint(&mut self, value: u64, bits: usize) -> Result<&mut Self, CellError> {
        if bits > 64 {
            return Err(CellError::UnsupportedWidth(bits));
        }
        if bits < 64 && value >> bits != 0 {
            return Err(CellError::ValueOutOfRange {
                value: value.to_string(),
                bits,
            });
        }
        self.ensure_bits(bits)?;
        for i in (0..bits).rev() {
            self.push_bit((value >> i) & 1 == 1);
        }
        Ok(self)
    }

    /// Appends `value` as a two's-complement integer of `bits` width.
    pub fn store_int(&mut self, value: i64, bits: usize) -> Result<&mut Self, CellError> {
        if bits == 0 || bits > 64 {
            return Err(CellError::UnsupportedWidth(bits));
        }
        if bits < 64 {
            let min = -(1i64 << (bits - 1));
            let max = (1i64 << (bits - 1)) - 1;
            if value < min || value > max {
                return Err(CellError::ValueOutOfRange {
                    value: value.to_string(),
                    bits,
                });
            }
        }
        let raw = if bits == 64 {
            value as u64
        } else {
            (value as u64) & ((1u64 << bits) - 1)
        };
        self.store_uint(raw, bits)
    }

    /// Appends whole bytes.
    pub fn store_bytes(&mut self, bytes: &[u8]) -> Result<&mut Self, CellError> {
        self.ensure_bits(bytes.len() * 8)?;
        if self.bit_len % 8 == 0 {
            self.data.extend_from_slice(bytes);
            self.bit_len += bytes.len() * 8;
        } else {
            for byte in bytes {
                for i in (0..8).rev() {
                    self.push_bit((byte >> i) & 1 == 1);
                }
            }
        }
        Ok(self)
    }

    /// Appends a `Coins` amount: a 4-bit byte length followed by the
    /// minimal big-endian encoding. Zero is written as four zero bits.
    pub fn store_coins(&mut self, amount: u128) -> Result<&mut Self, CellError> {
        if amount > MAX_COINS {
            return Err(CellError::CoinsOutOfRange(amount));
        }
        let be = amount.to_be_bytes();
        let skip = be.iter().take_while(|b| **b == 0).count();
        let payload = &be[skip..];
        self.ensure_bits(4 + payload.len() * 8)?;
        self.store_uint(payload.len() as u64, 4)?;
        self.store_bytes(payload)
    }

    /// Appends a `MsgAddressInt`. `Some` is written as `addr_std`
    /// (`10`, no anycast, 8-bit workchain, 256-bit hash); `None` as
    /// `addr_none` (`00`).
    pub fn store_address(&mut self, address: Option<&TonAddress>) -> Result<&mut Self, CellError> {
        match address {
            None => self.store_uint(0, 2),
            Some(addr) => {
                self.ensure_bits(267)?;
                self.store_uint(0b10, 2)?;
                self.store_bit(false)?;
                self.store_int(i64::from(addr.workchain), 8)?;
                self.store_bytes(&addr.hash)
            }
        }
    }

    /// Attaches a child reference.
    pub fn store_ref(&mut self, cell: impl Into<Arc<Cell>>) -> Result<&mut Self, CellError> {
        if self.references.len() >= MAX_CELL_REFS {
            return Err(CellError::RefOverflow);
        }
        self.references.push(cell.into());
        Ok(self)
    }

    /// Inlines the unread remainder of a slice: its bits and its references.
    pub fn store_slice(&mut self, slice: &CellSlice<'_>) -> Result<&mut Self, CellError> {
        let bits = slice.remaining_bits();
        let refs = slice.remaining_ref_cells();
        self.ensure_bits(bits)?;
        if refs.len() > self.available_refs() {
            return Err(CellError::RefOverflow);
        }
        let mut reader = slice.clone();
        for _ in 0..bits {
            let bit = reader.load_bit()?;
            self.push_bit(bit);
        }
        self.references.extend(refs.iter().cloned());
        Ok(self)
    }

    /// Appends every bit and reference of a complete cell.
    pub fn store_cell_contents(&mut self, cell: &Cell) -> Result<&mut Self, CellError> {
        self.store_slice(&cell.parse())
    }

    /// Writes bytes "snake" style: as many whole bytes as fit here, the rest
    /// continued in a chained child reference.
    pub fn store_bytes_tail(&mut self, bytes: &[u8]) -> Result<&mut Self, CellError> {
        if bytes.is_empty() {
            return Ok(self);
        }
        let fit = self.available_bits() / 8;
        if bytes.len() <= fit {
            return self.store_bytes(bytes);
        }
        if self.available_refs() == 0 {
            return Err(CellError::RefOverflow);
        }
        let (head, rest) = bytes.split_at(fit);
        self.store_bytes(head)?;
        let mut tail = CellBuilder::new();
        tail.store_bytes_tail(rest)?;
        self.store_ref(tail.build()?)
    }

    /// Writes a UTF-8 string with [`Self::store_bytes_tail`].
    pub fn store_string_tail(&mut self, text: &str) -> Result<&mut Self, CellError> {
        self.store_bytes_tail(text.as_bytes())
    }

    /// Finalizes the cell.
    pub fn build(&self) -> Result<Cell, CellError> {
        Cell::new(self.data.clone(), self.bit_len, self.references.clone())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
