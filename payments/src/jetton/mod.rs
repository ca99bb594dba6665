//! # Jetton Transfers
//!
//! Message bodies for the jetton wallet `transfer` operation. The body is
//! sent to the buyer's own jetton wallet (the address derived from the
//! token master and the buyer's account), which then moves the jettons to
//! the destination owner.

pub mod transfer;

pub use transfer::{
    ForwardPayload, JettonTransfer, JettonTransferBuilder, TransferError, TransferMessage,
};
