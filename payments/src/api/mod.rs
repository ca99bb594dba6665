//! # Academy Backend API
//!
//! ```text
//! transport.rs  - ApiRequest / ApiResponse and the HttpTransport seam
//! gateway.rs    - AuthenticatedGateway: bearer auth, one replay after 401
//! endpoints.rs  - AcademyApi: sign-in, buy level, payments, profile
//! ```

pub mod endpoints;
pub mod gateway;
pub mod transport;

use thiserror::Error;

use crate::auth::AuthError;
use crate::http::TransportError;

pub use endpoints::{
    AcademyApi, PaymentRecord, PaymentService, PaymentStatus, PaymentsFilter, PaymentsPage,
};
pub use gateway::AuthenticatedGateway;
pub use transport::{ApiMethod, ApiRequest, ApiResponse, HttpTransport, ReqwestTransport};

/// Failures of an authenticated backend call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// Credentials could not be obtained or refreshed.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// The replayed request was rejected again.
    #[error("unauthorized: {path} rejected after credential refresh")]
    Unauthorized {
        /// Path of the rejected request.
        path: String,
    },

    /// Non-2xx status other than the handled 401.
    #[error("backend returned status {status}: {body}")]
    Status {
        /// HTTP status.
        status: u16,
        /// Response body, lossily decoded.
        body: String,
    },

    /// Transport failure.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Response body did not match the expected shape.
    #[error("unexpected response body: {0}")]
    Decode(String),
}
