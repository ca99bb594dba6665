//! Top-level error of the payment flow.
//!
//! Module errors carry the detail; [`PaymentError`] is what callers match on
//! to decide what to show the user and whether to send them to sign in.

use thiserror::Error;

use crate::api::GatewayError;
use crate::auth::AuthError;
use crate::chain::{BalanceError, ChainError};
use crate::jetton::TransferError;
use crate::purchase::InvoiceError;
use crate::wallet::WalletError;

/// Failures a consumer of the payment flow has to handle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PaymentError {
    /// The refresh token is absent or was rejected; sign in again.
    #[error("session expired: {0}")]
    CredentialsExpired(String),

    /// Still unauthorized after one refresh and replay.
    #[error("unauthorized: {path}")]
    Unauthorized {
        /// Rejected path.
        path: String,
    },

    /// No wallet could be connected.
    #[error("wallet unavailable: {0}")]
    WalletUnavailable(String),

    /// The user declined to sign.
    #[error("user rejected the transaction: {0}")]
    UserRejected(String),

    /// Not enough tokens and not enough native funds for the gas-only path.
    #[error("insufficient funds: need {required} tokens, have {token_balance}")]
    InsufficientFunds {
        /// Tokens required.
        required: u128,
        /// Tokens held.
        token_balance: u128,
        /// Native balance, nanotons.
        native_balance: u128,
    },

    /// A balance read failed or timed out.
    #[error("balance query failed: {0}")]
    BalanceQueryFailed(String),

    /// The invoice cannot be turned into a transfer.
    #[error("malformed invoice: {0}")]
    MalformedInvoice(String),

    /// Transport or backend failure passed through unchanged.
    #[error("request failed: {0}")]
    Transport(String),

    /// Another attempt for the same invoice is still running.
    #[error("a purchase attempt for {reference_id} is already in progress")]
    AttemptInProgress {
        /// Invoice reference.
        reference_id: String,
    },
}

impl PaymentError {
    /// Translation key of the toast shown for this error.
    pub fn toast_key(&self) -> &'static str {
        match self {
            PaymentError::CredentialsExpired(_) | PaymentError::Unauthorized { .. } => {
                "session_expired"
            }
            PaymentError::WalletUnavailable(_) => "wallet_unavailable",
            PaymentError::UserRejected(_) => "transaction_rejected",
            PaymentError::InsufficientFunds { .. } => "not_enough_money",
            PaymentError::BalanceQueryFailed(_) => "balance_unavailable",
            PaymentError::MalformedInvoice(_) => "invalid_invoice",
            PaymentError::Transport(_) => "payment_failed",
            PaymentError::AttemptInProgress { .. } => "payment_in_progress",
        }
    }

    /// Whether the caller should send the user back to sign-in.
    pub fn requires_sign_in(&self) -> bool {
        matches!(
            self,
            PaymentError::CredentialsExpired(_) | PaymentError::Unauthorized { .. }
        )
    }
}

impl From<AuthError> for PaymentError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Transport(inner) => PaymentError::Transport(inner.to_string()),
            AuthError::RefreshInterrupted => {
                PaymentError::Transport(AuthError::RefreshInterrupted.to_string())
            }
            other => PaymentError::CredentialsExpired(other.to_string()),
        }
    }
}

impl From<GatewayError> for PaymentError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Auth(auth) => auth.into(),
            GatewayError::Unauthorized { path } => PaymentError::Unauthorized { path },
            other => PaymentError::Transport(other.to_string()),
        }
    }
}

impl From<WalletError> for PaymentError {
    fn from(err: WalletError) -> Self {
        match err {
            WalletError::UserRejected(reason) => PaymentError::UserRejected(reason),
            other => PaymentError::WalletUnavailable(other.to_string()),
        }
    }
}

impl From<BalanceError> for PaymentError {
    fn from(err: BalanceError) -> Self {
        PaymentError::BalanceQueryFailed(err.to_string())
    }
}

impl From<ChainError> for PaymentError {
    fn from(err: ChainError) -> Self {
        PaymentError::BalanceQueryFailed(err.to_string())
    }
}

impl From<InvoiceError> for PaymentError {
    fn from(err: InvoiceError) -> Self {
        PaymentError::MalformedInvoice(err.to_string())
    }
}

impl From<TransferError> for PaymentError {
    fn from(err: TransferError) -> Self {
        PaymentError::MalformedInvoice(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::TransportError;

    #[test]
    fn auth_failures_require_sign_in() {
        let err: PaymentError = AuthError::CredentialsExpired("rejected".into()).into();
        assert!(err.requires_sign_in());

        let err: PaymentError = GatewayError::Unauthorized {
            path: "/app".into(),
        }
        .into();
        assert!(err.requires_sign_in());
        assert_eq!(err.toast_key(), "session_expired");
    }

    #[test]
    fn gateway_transport_failures_pass_through() {
        let err: PaymentError = GatewayError::Transport(TransportError::Timeout {
            url: "https://api/app".into(),
        })
        .into();
        assert!(matches!(err, PaymentError::Transport(_)));
        assert!(!err.requires_sign_in());
    }

    #[test]
    fn wallet_rejection_maps_to_user_rejected() {
        let err: PaymentError = WalletError::UserRejected("declined".into()).into();
        assert_eq!(err, PaymentError::UserRejected("declined".into()));
        let err: PaymentError = WalletError::NotConnected.into();
        assert_eq!(err.toast_key(), "wallet_unavailable");
    }

    #[test]
    fn insufficient_funds_uses_the_money_toast() {
        let err = PaymentError::InsufficientFunds {
            required: 500,
            token_balance: 100,
            native_balance: 0,
        };
        assert_eq!(err.toast_key(), "not_enough_money");
    }
}
