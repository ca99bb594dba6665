//! # Purchases
//!
//! ```text
//! invoice.rs       - TransferInvoice (validated input), PurchaseOutcome (result)
//! state.rs         - PurchaseState and its legal transitions
//! orchestrator.rs  - TransferOrchestrator: one attempt, start to finish
//! ```

pub mod invoice;
pub mod orchestrator;
pub mod state;

pub use invoice::{
    parse_token_amount, InvoiceError, PurchaseOutcome, PurchaseStatus, TransferInvoice,
    SERVICE_CARD, SERVICE_CHAIN,
};
pub use orchestrator::{PurchaseAttempt, TransferOrchestrator, TransferSettings};
pub use state::PurchaseState;
