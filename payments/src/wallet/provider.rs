//! The wallet-connect provider seam and its transaction request format.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cell::TonAddress;

/// Failures reported by a wallet provider.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// The user declined the prompt.
    #[error("user declined the request")]
    Rejected,

    /// The validity window lapsed before the user signed.
    #[error("transaction request expired")]
    Expired,

    /// The provider or its bridge could not be reached.
    #[error("wallet provider unreachable: {0}")]
    Unreachable(String),
}

/// One outgoing message of a transaction request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletMessage {
    /// Recipient contract, user-friendly form.
    pub address: String,
    /// Attached native amount in nanotons, as a decimal string.
    pub amount: String,
    /// Base64 BOC of the message body.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
}

/// `sendTransaction` request handed to the wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRequest {
    /// Unix time (seconds) after which the wallet must refuse to sign.
    pub valid_until: i64,
    /// Messages to send.
    pub messages: Vec<WalletMessage>,
}

impl TransactionRequest {
    /// Whether the validity window has passed at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now.timestamp() > self.valid_until
    }
}

/// What the wallet returns after signing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionReceipt {
    /// Base64 BOC of the signed external message.
    pub boc: String,
}

/// A wallet-connect provider (TON Connect or a test double).
///
/// The provider may persist session artifacts and silently resume from
/// them in [`open_session`](Self::open_session); the session controller
/// clears them first when a fresh binding is required.
#[async_trait]
pub trait WalletProvider: Send + Sync {
    /// Whether the provider currently holds a live session.
    fn is_connected(&self) -> bool;

    /// Opens a session, prompting the user if needed, and returns the bound
    /// account.
    async fn open_session(&self) -> Result<TonAddress, ProviderError>;

    /// Closes the current session.
    async fn close_session(&self) -> Result<(), ProviderError>;

    /// Asks the user to sign and send `request`.
    async fn send_transaction(
        &self,
        request: &TransactionRequest,
    ) -> Result<TransactionReceipt, ProviderError>;
}
