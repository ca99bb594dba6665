//! The purchase state machine.
//!
//! One call to [`TransferOrchestrator::purchase`] is one attempt, a single
//! pass through
//!
//! ```text
//! Idle -> Disconnecting -> Connecting -> Verifying -> Building -> Submitting -> Paid
//! ```
//!
//! with any error moving straight to `Failed`. Nothing is retried; the UI
//! decides whether to offer another attempt. Each transition is published as
//! a [`PaymentEvent::StateChanged`], a failure additionally as an error
//! [`Toast`], and the final [`PurchaseOutcome`] as
//! [`PaymentEvent::OutcomeRecorded`].
//!
//! Attempts are serialized per invoice: a second call for a reference id
//! that is still in flight fails with [`PaymentError::AttemptInProgress`]
//! without touching the wallet.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{info, warn};
use uuid::Uuid;

use super::invoice::{PurchaseOutcome, TransferInvoice};
use super::state::PurchaseState;
use crate::cell::{FriendlyFlags, TonAddress};
use crate::chain::BalanceVerifier;
use crate::config::{ClientConfig, TRANSACTION_VALIDITY};
use crate::error::PaymentError;
use crate::events::{Notifier, PaymentEvent, Toast};
use crate::jetton::{JettonTransferBuilder, TransferMessage};
use crate::metrics::PaymentMetrics;
use crate::wallet::{
    TransactionReceipt, TransactionRequest, WalletMessage, WalletSessionController,
};

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Amounts and deadlines of the transaction sent to the wallet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferSettings {
    /// Native amount attached to the message for jetton wallet gas.
    pub gas_fee_nano: u128,
    /// Native amount forwarded to the destination with the notification.
    pub forward_amount_nano: u128,
    /// How long the wallet may take to sign.
    pub validity: Duration,
}

impl TransferSettings {
    /// Settings from the runtime config.
    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            gas_fee_nano: config.gas_fee_nano,
            forward_amount_nano: config.forward_amount_nano,
            validity: TRANSACTION_VALIDITY,
        }
    }

    /// Wallet request carrying `message` to the payer's own jetton wallet,
    /// with the gas fee attached and a deadline of now plus the validity.
    pub fn transaction_request(
        &self,
        token_wallet: &TonAddress,
        message: &TransferMessage,
    ) -> TransactionRequest {
        TransactionRequest {
            valid_until: Utc::now().timestamp() + self.validity.as_secs() as i64,
            messages: vec![WalletMessage {
                address: token_wallet.to_friendly(FriendlyFlags::default(), true),
                amount: self.gas_fee_nano.to_string(),
                payload: Some(message.to_base64()),
            }],
        }
    }
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self::from_config(&ClientConfig::default())
    }
}

// ---------------------------------------------------------------------------
// Attempt
// ---------------------------------------------------------------------------

/// Record of a finished attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchaseAttempt {
    /// Unique id, also carried by every event of the attempt.
    pub attempt_id: Uuid,
    /// `Paid` or `Failed`.
    pub state: PurchaseState,
    /// What the purchase UI should record.
    pub outcome: PurchaseOutcome,
    /// The wallet's receipt when paid.
    pub receipt: Option<TransactionReceipt>,
    /// Why the attempt failed.
    pub error: Option<PaymentError>,
}

impl PurchaseAttempt {
    /// True when the wallet confirmed the transaction.
    pub fn is_paid(&self) -> bool {
        self.state == PurchaseState::Paid
    }
}

/// Per-invoice busy flag; released on drop, including when the purchase
/// future is cancelled.
struct InFlight<'a> {
    attempts: &'a DashMap<String, Uuid>,
    reference_id: String,
}

impl<'a> InFlight<'a> {
    fn acquire(
        attempts: &'a DashMap<String, Uuid>,
        reference_id: &str,
        attempt_id: Uuid,
    ) -> Result<Self, PaymentError> {
        match attempts.entry(reference_id.to_string()) {
            Entry::Occupied(_) => Err(PaymentError::AttemptInProgress {
                reference_id: reference_id.to_string(),
            }),
            Entry::Vacant(slot) => {
                slot.insert(attempt_id);
                Ok(Self {
                    attempts,
                    reference_id: reference_id.to_string(),
                })
            }
        }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.attempts.remove(&self.reference_id);
    }
}

/// Tracks the current state and publishes every transition.
struct Progress<'a> {
    notifier: &'a Notifier,
    attempt_id: Uuid,
    reference_id: &'a str,
    state: PurchaseState,
}

impl Progress<'_> {
    fn enter(&mut self, next: PurchaseState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "invalid transition {} -> {}",
            self.state,
            next
        );
        let from = std::mem::replace(&mut self.state, next);
        info!(
            attempt_id = %self.attempt_id,
            reference_id = self.reference_id,
            %from,
            to = %next,
            "purchase state"
        );
        self.notifier.publish(&PaymentEvent::StateChanged {
            attempt_id: self.attempt_id,
            reference_id: self.reference_id.to_string(),
            from,
            to: next,
        });
    }
}

// ---------------------------------------------------------------------------
// TransferOrchestrator
// ---------------------------------------------------------------------------

/// Drives one purchase attempt across the wallet, the balance verifier and
/// the message builder.
pub struct TransferOrchestrator {
    wallet: Arc<WalletSessionController>,
    verifier: Arc<BalanceVerifier>,
    notifier: Notifier,
    settings: TransferSettings,
    in_flight: DashMap<String, Uuid>,
    metrics: Option<Arc<PaymentMetrics>>,
}

impl TransferOrchestrator {
    /// Creates an orchestrator publishing to `notifier`.
    pub fn new(
        wallet: Arc<WalletSessionController>,
        verifier: Arc<BalanceVerifier>,
        notifier: Notifier,
        settings: TransferSettings,
    ) -> Self {
        Self {
            wallet,
            verifier,
            notifier,
            settings,
            in_flight: DashMap::new(),
            metrics: None,
        }
    }

    /// Attaches metrics.
    pub fn with_metrics(mut self, metrics: Arc<PaymentMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// The event fan-out.
    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    /// Whether an attempt for `reference_id` is running.
    pub fn is_in_progress(&self, reference_id: &str) -> bool {
        self.in_flight.contains_key(reference_id)
    }

    /// Runs one purchase attempt for `invoice`.
    ///
    /// Returns `Err` only when another attempt for the same invoice is in
    /// flight. Every other failure is reported in the returned
    /// [`PurchaseAttempt`] with a `failed` outcome.
    pub async fn purchase(&self, invoice: &TransferInvoice) -> Result<PurchaseAttempt, PaymentError> {
        let attempt_id = Uuid::new_v4();
        let _guard = InFlight::acquire(&self.in_flight, invoice.reference_id(), attempt_id)?;

        let mut progress = Progress {
            notifier: &self.notifier,
            attempt_id,
            reference_id: invoice.reference_id(),
            state: PurchaseState::Idle,
        };

        let result = self.run(invoice, &mut progress).await;
        let attempt = match result {
            Ok(receipt) => {
                progress.enter(PurchaseState::Paid);
                PurchaseAttempt {
                    attempt_id,
                    state: PurchaseState::Paid,
                    outcome: PurchaseOutcome::paid(invoice.target_entity_id()),
                    receipt: Some(receipt),
                    error: None,
                }
            }
            Err(err) => {
                warn!(
                    %attempt_id,
                    reference_id = invoice.reference_id(),
                    state = %progress.state,
                    error = %err,
                    "purchase failed"
                );
                progress.enter(PurchaseState::Failed);
                self.notifier
                    .publish(&PaymentEvent::Toast(Toast::error(err.toast_key())));
                PurchaseAttempt {
                    attempt_id,
                    state: PurchaseState::Failed,
                    outcome: PurchaseOutcome::failed(invoice.target_entity_id()),
                    receipt: None,
                    error: Some(err),
                }
            }
        };

        if let Some(metrics) = &self.metrics {
            metrics
                .purchases_total
                .with_label_values(&[&attempt.state.to_string()])
                .inc();
        }
        self.notifier.publish(&PaymentEvent::OutcomeRecorded {
            attempt_id,
            outcome: attempt.outcome.clone(),
        });
        Ok(attempt)
    }

    async fn run(
        &self,
        invoice: &TransferInvoice,
        progress: &mut Progress<'_>,
    ) -> Result<TransactionReceipt, PaymentError> {
        progress.enter(PurchaseState::Disconnecting);
        self.wallet.disconnect().await?;
        self.wallet.reset_local_artifacts().await?;

        progress.enter(PurchaseState::Connecting);
        let account = self.wallet.connect().await?;

        progress.enter(PurchaseState::Verifying);
        let token_wallet = self.verifier.resolve_token_wallet(&account).await?;
        let check = self
            .verifier
            .check_sufficiency_at(&account, &token_wallet, invoice.amount_token())
            .await?;
        if !check.sufficient {
            return Err(PaymentError::InsufficientFunds {
                required: check.required,
                token_balance: check.snapshot.token_balance,
                native_balance: check.snapshot.native_balance,
            });
        }

        progress.enter(PurchaseState::Building);
        let message = self.build_message(invoice, &account)?;
        let request = self.settings.transaction_request(&token_wallet, &message);

        progress.enter(PurchaseState::Submitting);
        let receipt = self.wallet.send_transaction(&request).await?;
        Ok(receipt)
    }

    /// Transfer of the invoice amount to its destination, commented with the
    /// invoice reference; excess gas returns to the paying account.
    fn build_message(
        &self,
        invoice: &TransferInvoice,
        account: &TonAddress,
    ) -> Result<TransferMessage, PaymentError> {
        Ok(
            JettonTransferBuilder::new(invoice.amount_token(), *invoice.destination())
                .response_destination(*account)
                .forward_amount(self.settings.forward_amount_nano)
                .comment(invoice.reference_id())
                .build()?,
        )
    }
}

impl std::fmt::Debug for TransferOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferOrchestrator")
            .field("settings", &self.settings)
            .field("in_flight", &self.in_flight.len())
            .finish_non_exhaustive()
    }
}
