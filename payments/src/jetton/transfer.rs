//! Jetton `transfer` message construction and decoding.
//!
//! The [`JettonTransferBuilder`] collects the fields, `.build()` packs them
//! into a [`Cell`] and returns a [`TransferMessage`] that can be serialized
//! to a BOC for the wallet provider.
//!
//! # Layout
//!
//! ```text
//! transfer#0f8a7ea5
//!   query_id:uint64
//!   amount:Coins
//!   destination:MsgAddress
//!   response_destination:MsgAddress
//!   custom_payload:(Maybe ^Cell)      -- always 0
//!   forward_ton_amount:Coins
//!   forward_payload:(Either Cell ^Cell)
//! ```
//!
//! The forward payload selector:
//!
//! | [`ForwardPayload`] | selector | content                              |
//! |--------------------|----------|--------------------------------------|
//! | `Comment(text)`    | `1`      | ref: 32-bit zero + UTF-8 snake text  |
//! | `Structured(cell)` | `0`      | cell bits and refs inlined           |
//! | `Raw(bytes)`       | `1`      | ref: snake-encoded bytes             |
//! | `None`             | `0`      | nothing                              |

use std::sync::Arc;

use bytes::Bytes;
use thiserror::Error;

use crate::cell::boc::{self, BocError};
use crate::cell::builder::MAX_COINS;
use crate::cell::{Cell, CellBuilder, CellError, CellSlice, TonAddress};
use crate::config::{COMMENT_PREFIX, DEFAULT_QUERY_ID, JETTON_TRANSFER_OPCODE};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failures building or decoding a transfer body.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransferError {
    /// An amount does not fit the `Coins` encoding.
    #[error("{field} out of range: {value}")]
    AmountOutOfRange {
        /// Which amount.
        field: &'static str,
        /// The rejected value.
        value: u128,
    },

    /// The body did not start with the transfer opcode.
    #[error("unexpected opcode {0:#010x}")]
    UnexpectedOpcode(u32),

    /// The destination was `addr_none`.
    #[error("transfer has no destination")]
    MissingDestination,

    /// A non-empty custom payload was present.
    #[error("custom payloads are not supported")]
    CustomPayload,

    /// Cell packing or reading failed.
    #[error(transparent)]
    Cell(#[from] CellError),

    /// The serialized container was invalid.
    #[error(transparent)]
    Boc(#[from] BocError),
}

// ---------------------------------------------------------------------------
// Forward payload
// ---------------------------------------------------------------------------

/// What travels to the destination along with the transfer notification.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ForwardPayload {
    /// No payload.
    #[default]
    None,
    /// A plain-text comment.
    Comment(String),
    /// An already-built cell, inlined into the body.
    Structured(Arc<Cell>),
    /// Opaque bytes, placed in a referenced cell.
    Raw(Bytes),
}

impl ForwardPayload {
    fn store(&self, builder: &mut CellBuilder) -> Result<(), TransferError> {
        match self {
            ForwardPayload::None => {
                builder.store_bit(false)?;
            }
            ForwardPayload::Comment(text) => {
                let mut comment = CellBuilder::new();
                comment
                    .store_uint(u64::from(COMMENT_PREFIX), 32)?
                    .store_string_tail(text)?;
                builder.store_bit(true)?.store_ref(comment.build()?)?;
            }
            ForwardPayload::Structured(cell) => {
                builder.store_bit(false)?.store_cell_contents(cell)?;
            }
            ForwardPayload::Raw(bytes) => {
                let mut raw = CellBuilder::new();
                raw.store_bytes_tail(bytes)?;
                builder.store_bit(true)?.store_ref(raw.build()?)?;
            }
        }
        Ok(())
    }

    fn load(slice: &mut CellSlice<'_>) -> Result<Self, TransferError> {
        if slice.load_bit()? {
            let nested = slice.load_ref()?;
            return Ok(Self::from_nested(nested));
        }
        if slice.is_empty() {
            return Ok(ForwardPayload::None);
        }
        let mut rest = CellBuilder::new();
        rest.store_slice(slice)?;
        Ok(ForwardPayload::Structured(Arc::new(rest.build()?)))
    }

    // A referenced payload that reads as prefix-0 UTF-8 is a comment; anything
    // else is kept as raw bytes, or as a structured cell if it is not
    // byte-aligned.
    fn from_nested(nested: &Arc<Cell>) -> Self {
        let mut reader = nested.parse();
        let prefixed = reader.remaining_bits() >= 32
            && reader.load_uint(32).ok() == Some(u64::from(COMMENT_PREFIX));
        if prefixed {
            if let Ok(text) = reader.load_string_tail() {
                return ForwardPayload::Comment(text);
            }
        }
        match nested.parse().load_bytes_tail() {
            Ok(bytes) => ForwardPayload::Raw(Bytes::from(bytes)),
            Err(_) => ForwardPayload::Structured(Arc::clone(nested)),
        }
    }

    /// The comment text, if this is a comment.
    pub fn comment(&self) -> Option<&str> {
        match self {
            ForwardPayload::Comment(text) => Some(text),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Transfer fields
// ---------------------------------------------------------------------------

/// Field values of a jetton transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JettonTransfer {
    /// Opcode. Always [`JETTON_TRANSFER_OPCODE`] for built messages.
    pub opcode: u32,
    /// Caller-chosen query id.
    pub query_id: u64,
    /// Jetton amount in the token's smallest unit.
    pub amount: u128,
    /// Owner account that receives the jettons.
    pub destination: TonAddress,
    /// Where excess gas is returned. `None` encodes `addr_none`.
    pub response_destination: Option<TonAddress>,
    /// Native amount forwarded with the notification (nanotons).
    pub forward_amount: u128,
    /// Notification payload.
    pub forward_payload: ForwardPayload,
}

impl JettonTransfer {
    /// Packs the fields into a message body cell.
    pub fn encode(&self) -> Result<Cell, TransferError> {
        check_coins("amount", self.amount)?;
        check_coins("forward_amount", self.forward_amount)?;

        let mut body = CellBuilder::new();
        body.store_uint(u64::from(self.opcode), 32)?
            .store_uint(self.query_id, 64)?
            .store_coins(self.amount)?
            .store_address(Some(&self.destination))?
            .store_address(self.response_destination.as_ref())?
            .store_bit(false)?
            .store_coins(self.forward_amount)?;
        self.forward_payload.store(&mut body)?;
        Ok(body.build()?)
    }

    /// Reads a transfer body back into its fields.
    pub fn decode(body: &Cell) -> Result<Self, TransferError> {
        let mut slice = body.parse();
        let opcode = slice.load_uint(32)? as u32;
        if opcode != JETTON_TRANSFER_OPCODE {
            return Err(TransferError::UnexpectedOpcode(opcode));
        }
        let query_id = slice.load_uint(64)?;
        let amount = slice.load_coins()?;
        let destination = slice
            .load_address()?
            .ok_or(TransferError::MissingDestination)?;
        let response_destination = slice.load_address()?;
        if slice.load_bit()? {
            return Err(TransferError::CustomPayload);
        }
        let forward_amount = slice.load_coins()?;
        let forward_payload = ForwardPayload::load(&mut slice)?;

        Ok(Self {
            opcode,
            query_id,
            amount,
            destination,
            response_destination,
            forward_amount,
            forward_payload,
        })
    }
}

fn check_coins(field: &'static str, value: u128) -> Result<(), TransferError> {
    if value > MAX_COINS {
        return Err(TransferError::AmountOutOfRange { field, value });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// TransferMessage
// ---------------------------------------------------------------------------

/// A built transfer: its fields and the packed body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferMessage {
    transfer: JettonTransfer,
    body: Cell,
}

impl TransferMessage {
    /// Field values.
    pub fn transfer(&self) -> &JettonTransfer {
        &self.transfer
    }

    /// The packed body cell.
    pub fn body(&self) -> &Cell {
        &self.body
    }

    /// Body serialized as a bag of cells with a CRC trailer.
    pub fn to_boc(&self) -> Vec<u8> {
        boc::serialize(&self.body, true)
    }

    /// Base64 BOC, the form wallet providers take as `payload`.
    pub fn to_base64(&self) -> String {
        boc::to_base64(&self.body)
    }

    /// Parses a base64 BOC payload.
    pub fn from_base64(payload: &str) -> Result<Self, TransferError> {
        let body = boc::from_base64(payload)?;
        let transfer = JettonTransfer::decode(&body)?;
        Ok(Self { transfer, body })
    }
}

// ---------------------------------------------------------------------------
// JettonTransferBuilder
// ---------------------------------------------------------------------------

/// Fluent builder for [`TransferMessage`].
///
/// ```rust,no_run
/// use academy_payments::cell::TonAddress;
/// use academy_payments::jetton::JettonTransferBuilder;
///
/// let shop = TonAddress::new(0, [0x11; 32]);
/// let buyer = TonAddress::new(0, [0x22; 32]);
/// let message = JettonTransferBuilder::new(500, shop)
///     .response_destination(buyer)
///     .forward_amount(1)
///     .comment("INV-42")
///     .build()
///     .unwrap();
/// let payload = message.to_base64();
/// ```
///
/// Defaults: query id 0, no response destination, zero forward amount, no
/// payload.
#[derive(Debug, Clone)]
pub struct JettonTransferBuilder {
    transfer: JettonTransfer,
}

impl JettonTransferBuilder {
    /// Starts a transfer of `amount` jettons to `destination`.
    pub fn new(amount: u128, destination: TonAddress) -> Self {
        Self {
            transfer: JettonTransfer {
                opcode: JETTON_TRANSFER_OPCODE,
                query_id: DEFAULT_QUERY_ID,
                amount,
                destination,
                response_destination: None,
                forward_amount: 0,
                forward_payload: ForwardPayload::None,
            },
        }
    }

    /// Sets the query id.
    pub fn query_id(mut self, query_id: u64) -> Self {
        self.transfer.query_id = query_id;
        self
    }

    /// Sets where excess gas goes.
    pub fn response_destination(mut self, address: TonAddress) -> Self {
        self.transfer.response_destination = Some(address);
        self
    }

    /// Sets the forwarded native amount.
    pub fn forward_amount(mut self, nano: u128) -> Self {
        self.transfer.forward_amount = nano;
        self
    }

    /// Attaches a text comment. Replaces any previous payload.
    pub fn comment(mut self, text: impl Into<String>) -> Self {
        self.transfer.forward_payload = ForwardPayload::Comment(text.into());
        self
    }

    /// Attaches an arbitrary payload. Replaces any previous payload.
    pub fn forward_payload(mut self, payload: ForwardPayload) -> Self {
        self.transfer.forward_payload = payload;
        self
    }

    /// Packs the body.
    pub fn build(self) -> Result<TransferMessage, TransferError> {
        let body = self.transfer.encode()?;
        Ok(TransferMessage {
            transfer: self.transfer,
            body,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
