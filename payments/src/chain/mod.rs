//! # Chain Reads
//!
//! Everything the payment flow needs to know about on-chain state comes
//! through [`ChainReader`]: the native balance of an account, the address
//! of an owner's jetton wallet, and the data of that jetton wallet.
//!
//! ```text
//! toncenter.rs  - TonCenterClient: ChainReader over the toncenter v2 HTTP API
//! balance.rs    - BalanceVerifier: concurrent native + token read, sufficiency
//! ```

pub mod balance;
pub mod toncenter;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::cell::{BocError, Cell, CellError, TonAddress};
use crate::config::EXIT_CODE_UNINITIALIZED;
use crate::http::TransportError;

pub use balance::{BalanceCheck, BalanceError, BalanceSnapshot, BalanceVerifier, SufficiencyPolicy};
pub use toncenter::TonCenterClient;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Chain query failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    /// Transport failure.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Non-2xx status without a structured error body.
    #[error("chain API returned status {status}: {body}")]
    Status {
        /// HTTP status.
        status: u16,
        /// Response body, lossily decoded.
        body: String,
    },

    /// The API answered `ok: false`.
    #[error("chain API error {code:?}: {message}")]
    Api {
        /// API error code, when given.
        code: Option<i64>,
        /// API error text.
        message: String,
    },

    /// A get-method ran but exited with a non-zero code.
    #[error("get-method {method} exited with code {exit_code}")]
    GetMethod {
        /// Method name.
        method: String,
        /// TVM exit code.
        exit_code: i64,
    },

    /// The response did not have the expected shape.
    #[error("unexpected chain response: {0}")]
    Decode(String),

    /// A returned cell could not be parsed.
    #[error(transparent)]
    Boc(#[from] BocError),

    /// A returned cell did not hold the expected fields.
    #[error(transparent)]
    Cell(#[from] CellError),
}

impl ChainError {
    /// True for the exit code of a get-method on a contract that was never
    /// deployed.
    pub fn is_uninitialized(&self) -> bool {
        matches!(self, ChainError::GetMethod { exit_code, .. } if *exit_code == EXIT_CODE_UNINITIALIZED)
    }
}

// ---------------------------------------------------------------------------
// ChainReader
// ---------------------------------------------------------------------------

/// Result of a jetton wallet's `get_wallet_data`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JettonWalletData {
    /// Token balance in the smallest unit.
    pub balance: u128,
    /// Account that owns the wallet.
    pub owner: TonAddress,
    /// Token master contract.
    pub master: TonAddress,
    /// Wallet contract code.
    pub code: Arc<Cell>,
}

/// Read access to chain state.
#[async_trait]
pub trait ChainReader: Send + Sync {
    /// Native balance of `account` in nanotons.
    async fn native_balance(&self, account: &TonAddress) -> Result<u128, ChainError>;

    /// The jetton wallet address of `owner` under `master`.
    async fn jetton_wallet_address(
        &self,
        master: &TonAddress,
        owner: &TonAddress,
    ) -> Result<TonAddress, ChainError>;

    /// `get_wallet_data` of a jetton wallet.
    async fn jetton_wallet_data(&self, wallet: &TonAddress)
        -> Result<JettonWalletData, ChainError>;

    /// Token balance held by `wallet`. A wallet that was never deployed holds
    /// nothing.
    async fn jetton_balance(&self, wallet: &TonAddress) -> Result<u128, ChainError> {
        match self.jetton_wallet_data(wallet).await {
            Ok(data) => Ok(data.balance),
            Err(err) if err.is_uninitialized() => Ok(0),
            Err(err) => Err(err),
        }
    }
}
