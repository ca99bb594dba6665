//! Balance verification for a purchase.
//!
//! Both reads (native balance of the account, token balance of its jetton
//! wallet) run concurrently under one deadline. Either failing fails the
//! whole check; a snapshot is never assembled from half the data.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use super::{ChainError, ChainReader};
use crate::cell::TonAddress;
use crate::config::ClientConfig;
use crate::metrics::PaymentMetrics;

/// Balance read failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BalanceError {
    /// A chain read failed.
    #[error("balance query failed: {0}")]
    Query(#[from] ChainError),

    /// The reads did not finish in time.
    #[error("balance query timed out after {0:?}")]
    Timeout(Duration),
}

/// When a balance counts as sufficient.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SufficiencyPolicy {
    /// Native balance (nanotons) at or above which the account passes even
    /// with too few tokens. `None` disables this path.
    pub gas_only_threshold_nano: Option<u128>,
}

impl SufficiencyPolicy {
    /// Policy from the runtime config.
    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            gas_only_threshold_nano: config.gas_only_threshold_nano,
        }
    }

    /// Tokens cover the amount, or native funds reach the threshold.
    pub fn is_sufficient(&self, snapshot: &BalanceSnapshot, required: u128) -> bool {
        snapshot.token_balance >= required
            || self
                .gas_only_threshold_nano
                .is_some_and(|threshold| snapshot.native_balance >= threshold)
    }
}

/// Balances read for one attempt. Never reused across attempts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BalanceSnapshot {
    /// Native balance of the account, nanotons.
    pub native_balance: u128,
    /// Token balance of the account's jetton wallet.
    pub token_balance: u128,
    /// The jetton wallet the token balance was read from.
    pub token_wallet: TonAddress,
    /// When both reads completed.
    pub fetched_at: DateTime<Utc>,
}

/// Outcome of [`BalanceVerifier::check_sufficiency`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BalanceCheck {
    /// The balances.
    #[serde(flatten)]
    pub snapshot: BalanceSnapshot,
    /// Tokens the purchase needs.
    pub required: u128,
    /// Whether the purchase may go ahead.
    pub sufficient: bool,
}

/// Reads balances and applies the [`SufficiencyPolicy`].
pub struct BalanceVerifier {
    chain: Arc<dyn ChainReader>,
    jetton_master: TonAddress,
    policy: SufficiencyPolicy,
    timeout: Duration,
    metrics: Option<Arc<PaymentMetrics>>,
}

impl BalanceVerifier {
    /// Verifier for the token issued by `jetton_master`.
    pub fn new(
        chain: Arc<dyn ChainReader>,
        jetton_master: TonAddress,
        policy: SufficiencyPolicy,
        timeout: Duration,
    ) -> Self {
        Self {
            chain,
            jetton_master,
            policy,
            timeout,
            metrics: None,
        }
    }

    /// Attaches metrics.
    pub fn with_metrics(mut self, metrics: Arc<PaymentMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// The token master.
    pub fn jetton_master(&self) -> &TonAddress {
        &self.jetton_master
    }

    /// Derived jetton wallet of `owner`.
    pub async fn resolve_token_wallet(&self, owner: &TonAddress) -> Result<TonAddress, BalanceError> {
        let lookup = self.chain.jetton_wallet_address(&self.jetton_master, owner);
        let wallet = tokio::time::timeout(self.timeout, lookup)
            .await
            .map_err(|_| BalanceError::Timeout(self.timeout))??;
        debug!(%owner, %wallet, "resolved jetton wallet");
        Ok(wallet)
    }

    /// Resolves the jetton wallet of `account`, then checks it.
    pub async fn check_sufficiency(
        &self,
        account: &TonAddress,
        required: u128,
    ) -> Result<BalanceCheck, BalanceError> {
        let wallet = self.resolve_token_wallet(account).await?;
        self.check_sufficiency_at(account, &wallet, required).await
    }

    /// Checks `account` against `required` with an already resolved jetton
    /// wallet.
    pub async fn check_sufficiency_at(
        &self,
        account: &TonAddress,
        token_wallet: &TonAddress,
        required: u128,
    ) -> Result<BalanceCheck, BalanceError> {
        let started = Instant::now();
        let reads = async {
            tokio::join!(
                self.chain.native_balance(account),
                self.chain.jetton_balance(token_wallet)
            )
        };
        let outcome = tokio::time::timeout(self.timeout, reads).await;
        if let Some(metrics) = &self.metrics {
            metrics
                .balance_query_seconds
                .observe(started.elapsed().as_secs_f64());
        }

        let (native, token) = outcome.map_err(|_| BalanceError::Timeout(self.timeout))?;
        let snapshot = BalanceSnapshot {
            native_balance: native?,
            token_balance: token?,
            token_wallet: *token_wallet,
            fetched_at: Utc::now(),
        };
        let sufficient = self.policy.is_sufficient(&snapshot, required);
        info!(
            %account,
            native = %snapshot.native_balance,
            token = %snapshot.token_balance,
            required = %required,
            sufficient,
            "balance checked"
        );
        Ok(BalanceCheck {
            snapshot,
            required,
            sufficient,
        })
    }
}

impl std::fmt::Debug for BalanceVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BalanceVerifier")
            .field("jetton_master", &self.jetton_master)
            .field("policy", &self.policy)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
