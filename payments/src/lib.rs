// Copyright (c) 2026 Gradosphera Academy. MIT License.
// See LICENSE for details.

//! # Academy Payments
//!
//! Client-side payment plumbing for the academy mini-app: paying for course
//! levels with a TON jetton from the student's own wallet, and talking to the
//! academy backend with short-lived bearer credentials.
//!
//! ## Architecture
//!
//! - **auth** - Credential pair storage and single-flight refresh.
//! - **api** - Authenticated gateway (refresh once, replay once) and the
//!   typed academy endpoints.
//! - **wallet** - Wallet provider seam and the session controller that
//!   resets stale sessions before every purchase.
//! - **chain** - Chain reads over toncenter and the balance verifier.
//! - **cell** - TVM cells, addresses and bag-of-cells serialization.
//! - **jetton** - The standard jetton transfer message, built and parsed.
//! - **purchase** - Invoices, the purchase state machine and its driver.
//! - **events** - Toasts and state changes fanned out to the UI.
//! - **config** - Protocol constants and deployment settings.
//!
//! ## Flow
//!
//! ```text
//! invoice ──► disconnect + reset ──► connect ──► balances ──► transfer body ──► sign
//!                                                   │
//!                                                   └─ insufficient ──► Failed + toast
//! ```
//!
//! Nothing here touches a private key: signing happens in the user's wallet.

pub mod api;
pub mod auth;
pub mod cell;
pub mod chain;
pub mod config;
pub mod error;
pub mod events;
pub mod http;
pub mod jetton;
pub mod metrics;
pub mod purchase;
pub mod wallet;

pub use api::{AcademyApi, AuthenticatedGateway, GatewayError};
pub use auth::{AuthError, CredentialPair, SessionTokenManager};
pub use cell::{Cell, CellBuilder, TonAddress};
pub use chain::{BalanceVerifier, ChainReader, TonCenterClient};
pub use config::ClientConfig;
pub use error::PaymentError;
pub use events::{Notifier, PaymentEvent, Toast};
pub use jetton::{JettonTransfer, JettonTransferBuilder, TransferMessage};
pub use purchase::{
    PurchaseAttempt, PurchaseOutcome, PurchaseState, TransferInvoice, TransferOrchestrator,
};
pub use wallet::{WalletProvider, WalletSessionController};

/// Version of this crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
