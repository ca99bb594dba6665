//! Purchase inputs and outputs.

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use crate::cell::{AddressError, TonAddress};
use crate::config::JETTON_DECIMALS;

/// Why an invoice was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvoiceError {
    /// The destination is not a valid address.
    #[error("invalid destination: {0}")]
    Destination(#[from] AddressError),

    /// The amount is not a non-negative decimal in token precision.
    #[error("invalid amount: {0}")]
    Amount(String),

    /// Nothing to pay.
    #[error("amount must be positive")]
    ZeroAmount,

    /// No reference to put in the transfer comment.
    #[error("missing reference id")]
    MissingReference,
}

#[derive(Deserialize)]
struct RawInvoice {
    destination_address: String,
    amount_token: u128,
    reference_id: String,
    target_entity_id: String,
}

/// A validated request to pay `amount_token` to `destination_address`.
///
/// Construction validates; a deserialized invoice is validated the same way.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferInvoice {
    destination_address: String,
    #[serde(skip)]
    destination: TonAddress,
    amount_token: u128,
    reference_id: String,
    target_entity_id: String,
}

impl TransferInvoice {
    /// Validates and builds an invoice.
    pub fn new(
        destination_address: impl Into<String>,
        amount_token: u128,
        reference_id: impl Into<String>,
        target_entity_id: impl Into<String>,
    ) -> Result<Self, InvoiceError> {
        let destination_address = destination_address.into();
        let reference_id = reference_id.into();
        let destination = TonAddress::parse(destination_address.trim())?;
        if amount_token == 0 {
            return Err(InvoiceError::ZeroAmount);
        }
        if reference_id.trim().is_empty() {
            return Err(InvoiceError::MissingReference);
        }
        Ok(Self {
            destination_address,
            destination,
            amount_token,
            reference_id,
            target_entity_id: target_entity_id.into(),
        })
    }

    /// Destination as given.
    pub fn destination_address(&self) -> &str {
        &self.destination_address
    }

    /// Parsed destination.
    pub fn destination(&self) -> &TonAddress {
        &self.destination
    }

    /// Tokens to transfer, smallest unit.
    pub fn amount_token(&self) -> u128 {
        self.amount_token
    }

    /// Backend payment id; becomes the transfer comment.
    pub fn reference_id(&self) -> &str {
        &self.reference_id
    }

    /// What is being bought.
    pub fn target_entity_id(&self) -> &str {
        &self.target_entity_id
    }
}

impl<'de> Deserialize<'de> for TransferInvoice {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = RawInvoice::deserialize(deserializer)?;
        Self::new(
            raw.destination_address,
            raw.amount_token,
            raw.reference_id,
            raw.target_entity_id,
        )
        .map_err(serde::de::Error::custom)
    }
}

/// Converts a decimal amount (`"500"`, `"500.00"`) to the token's smallest
/// unit. Digits beyond the token precision must be zero.
pub fn parse_token_amount(text: &str) -> Result<u128, InvoiceError> {
    let text = text.trim();
    let (whole, fraction) = text.split_once('.').unwrap_or((text, ""));
    let all_digits = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
    if whole.is_empty() || !all_digits(whole) || !all_digits(fraction) {
        return Err(InvoiceError::Amount(text.to_string()));
    }

    let decimals = JETTON_DECIMALS as usize;
    let significant = fraction.trim_end_matches('0');
    if significant.len() > decimals {
        return Err(InvoiceError::Amount(format!(
            "{text} has more than {decimals} decimal places"
        )));
    }

    let scale = 10u128.pow(JETTON_DECIMALS);
    let overflow = || InvoiceError::Amount(format!("{text} is too large"));
    let whole: u128 = whole.parse().map_err(|_| overflow())?;
    let fraction: u128 = if significant.is_empty() {
        0
    } else {
        format!("{significant:0<decimals$}")
            .parse()
            .map_err(|_| overflow())?
    };
    whole
        .checked_mul(scale)
        .and_then(|units| units.checked_add(fraction))
        .ok_or_else(overflow)
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// Status the purchase UI acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PurchaseStatus {
    /// Awaiting confirmation (card checkout).
    Pending,
    /// Paid; content may be unlocked.
    Paid,
    /// Not paid.
    Failed,
}

/// Payment service of an on-chain purchase.
pub const SERVICE_CHAIN: &str = "chain";

/// Payment service of a card checkout.
pub const SERVICE_CARD: &str = "wayforpay";

/// Result of a purchase as the UI sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOutcome {
    /// Status.
    pub status: PurchaseStatus,
    /// What was bought.
    pub target_entity_id: String,
    /// How it was paid.
    pub service_used: String,
}

impl PurchaseOutcome {
    /// Paid on chain.
    pub fn paid(target_entity_id: impl Into<String>) -> Self {
        Self {
            status: PurchaseStatus::Paid,
            target_entity_id: target_entity_id.into(),
            service_used: SERVICE_CHAIN.to_string(),
        }
    }

    /// Failed on chain.
    pub fn failed(target_entity_id: impl Into<String>) -> Self {
        Self {
            status: PurchaseStatus::Failed,
            target_entity_id: target_entity_id.into(),
            service_used: SERVICE_CHAIN.to_string(),
        }
    }

    /// Redirected to the card checkout; stays pending until the backend
    /// confirms.
    pub fn pending_card(target_entity_id: impl Into<String>) -> Self {
        Self {
            status: PurchaseStatus::Pending,
            target_entity_id: target_entity_id.into(),
            service_used: SERVICE_CARD.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn destination() -> String {
        format!("0:{}", "ab".repeat(32))
    }

    #[test]
    fn valid_invoice_keeps_parsed_destination() {
        let invoice = TransferInvoice::new(destination(), 500, "INV-42", "level-1").unwrap();
        assert_eq!(invoice.destination(), &TonAddress::new(0, [0xAB; 32]));
        assert_eq!(invoice.destination_address(), destination());
    }

    #[test]
    fn malformed_invoices_are_refused() {
        assert!(matches!(
            TransferInvoice::new("W1", 500, "INV-42", "x"),
            Err(InvoiceError::Destination(_))
        ));
        assert_eq!(
            TransferInvoice::new(destination(), 0, "INV-42", "x"),
            Err(InvoiceError::ZeroAmount)
        );
        assert_eq!(
            TransferInvoice::new(destination(), 1, " ", "x"),
            Err(InvoiceError::MissingReference)
        );
    }

    #[test]
    fn deserialization_validates() {
        let ok = serde_json::json!({
            "destination_address": destination(),
            "amount_token": 5,
            "reference_id": "INV-1",
            "target_entity_id": "level-1"
        });
        assert!(serde_json::from_value::<TransferInvoice>(ok).is_ok());

        let bad = serde_json::json!({
            "destination_address": "nowhere",
            "amount_token": 5,
            "reference_id": "INV-1",
            "target_entity_id": "level-1"
        });
        assert!(serde_json::from_value::<TransferInvoice>(bad).is_err());
    }

    #[test]
    fn amounts_parse_at_token_precision() {
        assert_eq!(parse_token_amount("500").unwrap(), 500);
        assert_eq!(parse_token_amount("500.00").unwrap(), 500);
        assert!(parse_token_amount("12.5").is_err());
        assert!(parse_token_amount("-3").is_err());
        assert!(parse_token_amount("").is_err());
        assert!(parse_token_amount("1e3").is_err());
    }

    #[test]
    fn outcomes_name_their_service() {
        assert_eq!(PurchaseOutcome::paid("l").service_used, "chain");
        assert_eq!(PurchaseOutcome::pending_card("l").status, PurchaseStatus::Pending);
        assert_eq!(PurchaseOutcome::pending_card("l").service_used, "wayforpay");
    }
}
