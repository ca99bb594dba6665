//! Typed calls for the payment-relevant backend endpoints.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

use super::gateway::AuthenticatedGateway;
use super::transport::ApiRequest;
use super::GatewayError;
use crate::auth::{CredentialPair, JwtResponse};
use crate::purchase::{InvoiceError, TransferInvoice};

/// Payment services a level can be bought with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentService {
    /// On-chain jetton transfer.
    Ton,
    /// Card payment through a hosted checkout.
    WayForPay,
}

impl PaymentService {
    /// Path segment of `/app/level/:id/buy/{service}`.
    pub fn path_segment(self) -> &'static str {
        match self {
            PaymentService::Ton => "ton",
            PaymentService::WayForPay => "wayforpay",
        }
    }
}

impl fmt::Display for PaymentService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path_segment())
    }
}

/// Backend payment status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// Created, not yet confirmed.
    Pending,
    /// Confirmed by the backend.
    Completed,
    /// Rejected or expired.
    Failed,
    /// Paid back.
    Refunded,
    /// Refund requested.
    PendingRefund,
}

/// Payment record as returned by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRecord {
    /// Payment id. Used as the transfer comment on chain.
    pub id: String,
    /// Level being bought.
    #[serde(default)]
    pub product_level_id: Option<String>,
    /// Amount in `currency` units. The backend serializes decimals as
    /// strings, older responses as numbers.
    pub amount: Value,
    /// Currency code.
    #[serde(default)]
    pub currency: String,
    /// Backend status.
    pub status: PaymentStatus,
    /// Destination: the receiving address for TON, the checkout page for
    /// card payments.
    pub url: String,
    /// Human-readable description.
    #[serde(default)]
    pub comment: String,
}

impl PaymentRecord {
    /// Amount rendered as a decimal string.
    pub fn amount_text(&self) -> String {
        match &self.amount {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        }
    }

    /// Maps a TON payment into the orchestrator's invoice.
    pub fn into_invoice(self) -> Result<TransferInvoice, InvoiceError> {
        let amount_token = crate::purchase::parse_token_amount(&self.amount_text())?;
        TransferInvoice::new(
            self.url,
            amount_token,
            self.id,
            self.product_level_id.unwrap_or_default(),
        )
    }
}

#[derive(Deserialize)]
struct PaymentEnvelope {
    payment: PaymentRecord,
}

/// Filter body of `POST /app/payments`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PaymentsFilter {
    /// Statuses to include; empty means all.
    pub status: Vec<PaymentStatus>,
    /// Page size.
    pub limit: u32,
    /// Page offset.
    pub offset: u32,
}

/// Page of payments.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PaymentsPage {
    /// Records on this page.
    #[serde(default)]
    pub payments: Vec<PaymentRecord>,
    /// Total matching records.
    #[serde(default)]
    pub total: u64,
}

/// Typed facade over [`AuthenticatedGateway`].
#[derive(Debug, Clone)]
pub struct AcademyApi {
    gateway: Arc<AuthenticatedGateway>,
    mini_app_name: String,
}

impl AcademyApi {
    /// Facade for the mini-app called `mini_app_name`.
    pub fn new(gateway: Arc<AuthenticatedGateway>, mini_app_name: impl Into<String>) -> Self {
        Self {
            gateway,
            mini_app_name: mini_app_name.into(),
        }
    }

    /// Signs in with Telegram init data, optionally claiming an invite, and
    /// installs the issued pair.
    pub async fn sign_in(
        &self,
        init_data: &str,
        invite_id: Option<&str>,
    ) -> Result<CredentialPair, GatewayError> {
        let (path, body) = match invite_id {
            Some(invite) => (
                "/auth/signin/invite",
                json!({"mini_app_name": self.mini_app_name, "init_data": init_data, "invite_id": invite}),
            ),
            None => (
                "/auth/signin",
                json!({"mini_app_name": self.mini_app_name, "init_data": init_data}),
            ),
        };
        let response = self
            .gateway
            .send_anonymous(ApiRequest::post(path, body))
            .await?;
        let pair = response.json::<JwtResponse>()?.jwt_info.into_pair()?;
        self.gateway.tokens().install(&pair)?;
        info!(invite = invite_id.is_some(), "signed in");
        Ok(pair)
    }

    /// `GET /user/me`.
    pub async fn me(&self) -> Result<Value, GatewayError> {
        self.gateway.send(ApiRequest::get("/user/me")).await?.json()
    }

    /// Creates a pending payment for a level.
    pub async fn buy_level(
        &self,
        level_id: &str,
        service: PaymentService,
    ) -> Result<PaymentRecord, GatewayError> {
        let path = format!("/app/level/{level_id}/buy/{}", service.path_segment());
        let request = ApiRequest::get(path).without_transient_retry();
        let envelope: PaymentEnvelope = self.gateway.send(request).await?.json()?;
        info!(payment_id = %envelope.payment.id, %service, "payment created");
        Ok(envelope.payment)
    }

    /// `POST /app/payments`.
    pub async fn payments(&self, filter: &PaymentsFilter) -> Result<PaymentsPage, GatewayError> {
        let body = serde_json::to_value(filter).map_err(|err| GatewayError::Decode(err.to_string()))?;
        self.gateway
            .send(ApiRequest::post("/app/payments", body))
            .await?
            .json()
    }
}
