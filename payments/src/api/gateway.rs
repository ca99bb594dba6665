//! Authenticated request gateway.
//!
//! Every authenticated call goes through [`AuthenticatedGateway::send`]:
//!
//! 1. attach the current access token (refreshing only if it is absent or
//!    expired);
//! 2. on `401`, if the request has not been replayed yet, mark it, force a
//!    refresh and dispatch it again;
//! 3. a second `401` is [`GatewayError::Unauthorized`]. There is no third
//!    attempt.
//!
//! Every other status and every transport failure is returned unchanged.

use std::sync::Arc;

use tracing::{debug, warn};

use super::transport::{ApiRequest, ApiResponse, HttpTransport};
use super::GatewayError;
use crate::auth::SessionTokenManager;
use crate::metrics::PaymentMetrics;

const STATUS_UNAUTHORIZED: u16 = 401;

/// Bearer-authenticating wrapper around an [`HttpTransport`].
pub struct AuthenticatedGateway {
    transport: Arc<dyn HttpTransport>,
    tokens: Arc<SessionTokenManager>,
    metrics: Option<Arc<PaymentMetrics>>,
}

impl AuthenticatedGateway {
    /// Creates a gateway using `tokens` for credentials.
    pub fn new(transport: Arc<dyn HttpTransport>, tokens: Arc<SessionTokenManager>) -> Self {
        Self {
            transport,
            tokens,
            metrics: None,
        }
    }

    /// Attaches metrics.
    pub fn with_metrics(mut self, metrics: Arc<PaymentMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// The session manager backing this gateway.
    pub fn tokens(&self) -> &Arc<SessionTokenManager> {
        &self.tokens
    }

    /// Sends an authenticated request with the single-replay policy.
    pub async fn send(&self, mut request: ApiRequest) -> Result<ApiResponse, GatewayError> {
        let mut token = self.tokens.get_valid_access_token().await?;
        loop {
            let response = self.transport.execute(&request, Some(&token)).await?;
            if response.status != STATUS_UNAUTHORIZED {
                debug!(path = %request.path, status = response.status, "request completed");
                return response.into_result();
            }
            if request.is_retried() {
                warn!(path = %request.path, "unauthorized after refresh");
                return Err(GatewayError::Unauthorized {
                    path: request.path,
                });
            }

            debug!(path = %request.path, "401, refreshing and replaying once");
            request.mark_retried();
            if let Some(metrics) = &self.metrics {
                metrics.gateway_replays_total.inc();
            }
            token = self.tokens.refresh().await?;
        }
    }

    /// Sends a request without credentials (sign-in). No refresh, no replay.
    pub async fn send_anonymous(&self, request: ApiRequest) -> Result<ApiResponse, GatewayError> {
        self.transport.execute(&request, None).await?.into_result()
    }
}

impl std::fmt::Debug for AuthenticatedGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthenticatedGateway")
            .field("tokens", &self.tokens)
            .finish_non_exhaustive()
    }
}
